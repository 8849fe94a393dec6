mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from eothresh for tests
pub use eothresh::{
    BlurConfig, BlurMethod, BlurParams, BlurTask, FeatureSpec, FeatureType, Patch, PatchTask,
    TaskChain, TaskFile, ThresholdConfig, ThresholdParams, SENTINEL,
};
