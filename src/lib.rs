pub mod blurring;
pub mod config;
pub mod error;
pub mod features;
pub mod imgproc;
pub mod patch;
pub mod task;
pub mod thresholding;

pub use blurring::{BlurConfig, BlurMethod, BlurParams, BlurTask};
pub use config::TaskFile;
pub use error::{ConfigurationError, ImageFormatError, TaskError, TaskResult};
pub use features::{FeatureRef, FeatureSpec, FeatureType};
pub use imgproc::{AdaptiveMethod, AdaptiveType, BorderType, SimpleMethod};
pub use patch::Patch;
pub use task::{PatchTask, TaskChain};
pub use thresholding::{ThresholdConfig, ThresholdParams, SENTINEL};
