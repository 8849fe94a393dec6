//! JSON task files.
//!
//! ```json
//! {
//!   "features": ["bands", ["mask", "clouds", "clouds_segments"]],
//!   "blur": { "method": "medianBlur", "median_ksize": 3 },
//!   "threshold": { "simple_th_value": 127, "simple_th_max_value": 255, "otsu": true }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use crate::blurring::{BlurConfig, BlurMethod, BlurParams, BlurTask};
use crate::error::ConfigurationError;
use crate::features::FeatureSpec;
use crate::task::TaskChain;
use crate::thresholding::{ThresholdConfig, ThresholdParams};

fn default_features() -> Vec<FeatureSpec> {
    vec![FeatureSpec::Name("bands".to_string())]
}

/// Contents of a task file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskFile {
    #[serde(default = "default_features")]
    pub features: Vec<FeatureSpec>,
    #[serde(default)]
    pub blur: BlurParams,
    pub threshold: ThresholdParams,
}

impl TaskFile {
    pub fn new(threshold: ThresholdParams) -> Self {
        Self {
            features: default_features(),
            blur: BlurParams::default(),
            threshold,
        }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read task file {}: {}", path.display(), e))?;
        Self::from_json(&text)
            .map_err(|e| anyhow::anyhow!("Failed to parse task file {}: {}", path.display(), e))
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Validate both sections and build the blur-then-threshold chain.
    /// A blur method of `none` adds no blur task.
    pub fn build_chain(&self) -> Result<(TaskChain, Arc<ThresholdConfig>), ConfigurationError> {
        let blur = BlurConfig::new(&self.blur)?;
        let threshold = Arc::new(ThresholdConfig::new(&self.features, &self.threshold)?);

        let mut chain = TaskChain::new();
        if blur.method() != BlurMethod::None {
            // Blur writes back over the input so thresholding sees the smoothed bands
            let inputs: Vec<FeatureSpec> = threshold
                .features()
                .iter()
                .map(|f| FeatureSpec::Typed(f.feature_type, f.name.clone()))
                .collect();
            chain = chain.add_task(Arc::new(BlurTask::new(&inputs, blur)));
        }
        chain = chain.add_task(threshold.clone());

        Ok((chain, threshold))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{FeatureRef, FeatureType};
    use crate::imgproc::SimpleMethod;

    #[test]
    fn test_minimal_file_uses_defaults() {
        let file = TaskFile::from_json(r#"{"threshold": {"simple_th_value": 100, "simple_th_max_value": 200}}"#)
            .unwrap();
        assert_eq!(file, TaskFile::new(ThresholdParams::new(100, 200)));

        let (chain, threshold) = file.build_chain().unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(
            threshold.features(),
            &[FeatureRef::new(FeatureType::Data, "bands", "bands_THRESH")]
        );
    }

    #[test]
    fn test_full_file() {
        let file = TaskFile::from_json(
            r#"{
                "features": [["mask", "clouds", "segments"]],
                "blur": {"method": "GaussianBlur", "gaussian_ksize": [3, 3], "border_type": "BORDER_REPLICATE"},
                "threshold": {
                    "adaptive_method": "ADAPTIVE_THRESH_GAUSSIAN_C",
                    "simple_method": "THRESH_TOZERO",
                    "block_size": 7,
                    "otsu": true,
                    "simple_th_value": 0,
                    "simple_th_max_value": 255
                }
            }"#,
        )
        .unwrap();
        assert_eq!(file.threshold.simple_method, SimpleMethod::ToZero);
        assert_eq!(file.blur.gaussian_ksize, (3, 3));

        let (chain, threshold) = file.build_chain().unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(threshold.features()[0].new_name, "segments");
    }

    #[test]
    fn test_unknown_method_fails_to_parse() {
        let err = TaskFile::from_json(
            r#"{"threshold": {"simple_method": "THRESH_MASK", "simple_th_value": 1, "simple_th_max_value": 2}}"#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_invalid_values_fail_to_build() {
        let mut file = TaskFile::new(ThresholdParams::new(127, 255));
        file.threshold.block_size = 10;
        assert!(matches!(file.build_chain(), Err(ConfigurationError::InvalidBlockSize(10))));

        let mut file = TaskFile::new(ThresholdParams::new(127, 255));
        file.blur.median_ksize = 2;
        assert!(file.build_chain().is_err());
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("task.json");
        std::fs::write(&path, r#"{"threshold": {"simple_th_value": 5, "simple_th_max_value": 6}}"#).unwrap();
        let file = TaskFile::load(&path).unwrap();
        assert_eq!(file.threshold.simple_th_value, 5);
        assert!(TaskFile::load(&dir.path().join("missing.json")).is_err());
    }
}
