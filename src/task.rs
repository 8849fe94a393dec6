use log::{debug, info};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{TaskError, TaskResult};
use crate::patch::Patch;

/// A unit of work run against one patch at a time.
///
/// Implementations hold only validated, read-only settings, so one task can
/// be shared between threads. Each call needs exclusive access to the patch.
pub trait PatchTask: Send + Sync {
    /// Read input features from `patch` and write output features back.
    fn execute(&self, patch: &mut Patch) -> TaskResult<()>;

    /// Human-readable name for this task (used in logs and debug folders)
    fn name(&self) -> &str;
}

/// Ordered list of tasks applied to a patch.
pub struct TaskChain {
    tasks: Vec<Arc<dyn PatchTask>>,
    verbose: bool,
    /// Root directory for debug outputs
    debug_dir: Option<PathBuf>,
}

impl TaskChain {
    /// Create a new empty chain
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            verbose: false,
            debug_dir: None,
        }
    }

    /// Log every step at info level instead of debug
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Enable debug mode with output directory.
    /// The directory must be empty or non-existent.
    pub fn with_debug(mut self, output_dir: PathBuf) -> TaskResult<Self> {
        if output_dir.exists() {
            let entries = std::fs::read_dir(&output_dir)?;
            if entries.count() > 0 {
                return Err(TaskError::Io(std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    format!("Debug directory is not empty: {}", output_dir.display()),
                )));
            }
        } else {
            std::fs::create_dir_all(&output_dir)?;
        }

        self.debug_dir = Some(output_dir);
        Ok(self)
    }

    pub fn add_task(mut self, task: Arc<dyn PatchTask>) -> Self {
        self.tasks.push(task);
        self
    }

    /// Helper method to add a task from a Box (for convenience)
    pub fn add_task_boxed(mut self, task: Box<dyn PatchTask>) -> Self {
        self.tasks.push(Arc::from(task));
        self
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Run every task in order. Stops at the first failing task; the patch
    /// keeps whatever earlier tasks wrote.
    pub fn run(&self, patch: &mut Patch) -> TaskResult<()> {
        self.run_partial(patch, self.tasks.len())
    }

    /// Run only the first `num_tasks` tasks (useful for debugging)
    pub fn run_partial(&self, patch: &mut Patch, num_tasks: usize) -> TaskResult<()> {
        if let Some(debug_dir) = &self.debug_dir {
            save_patch(patch, &debug_dir.join("00_input"))?;
        }

        for (task_idx, task) in self.tasks.iter().take(num_tasks).enumerate() {
            if self.verbose {
                info!("Running task {}: {} ({} features)", task_idx + 1, task.name(), patch.len());
            } else {
                debug!("Running task {}: {}", task_idx + 1, task.name());
            }

            task.execute(patch)?;

            if let Some(debug_dir) = &self.debug_dir {
                let step_dir_name = format!(
                    "{:02}_{}",
                    task_idx + 1,
                    task.name().to_lowercase().replace(' ', "_")
                );
                save_patch(patch, &debug_dir.join(&step_dir_name))?;
                if self.verbose {
                    info!("  Debug: saved {} images to {}/", patch.len(), step_dir_name);
                }
            }
        }

        Ok(())
    }
}

impl Default for TaskChain {
    fn default() -> Self {
        Self::new()
    }
}

/// Write every image of `patch` to `dir/<type>/<name>.png`.
pub fn save_patch(patch: &Patch, dir: &Path) -> TaskResult<()> {
    for (feature_type, name, image) in patch.iter() {
        let type_dir = dir.join(feature_type.to_string());
        std::fs::create_dir_all(&type_dir)?;
        image.save(type_dir.join(format!("{}.png", name)))?;
    }
    Ok(())
}
