use image::ColorType;
use std::fmt::Display;
use std::str::FromStr;
use strum::IntoEnumIterator;

use crate::features::FeatureType;

/// Raised while building a config. A config that was built successfully
/// never produces one of these later.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("{parameter} must be one of [{expected}], got '{value}'")]
    UnknownVariant {
        parameter: &'static str,
        value: String,
        expected: String,
    },

    #[error("{parameter} must be between {min} and {max}, got {value}")]
    OutOfRange {
        parameter: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("block size must be an odd number greater than 1, got {0}")]
    InvalidBlockSize(i32),

    #[error("{parameter} {reason}, got {value}")]
    InvalidKernel {
        parameter: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("feature '{0}' must be written as name, type:name or type:name:new_name")]
    InvalidFeature(String),

    #[error("border mode {border} is not supported by {method}")]
    UnsupportedBorder { border: String, method: String },
}

impl ConfigurationError {
    /// Builds an [`ConfigurationError::UnknownVariant`] listing every
    /// accepted spelling of `T`.
    pub fn unknown_variant<T>(parameter: &'static str, value: &str) -> Self
    where
        T: IntoEnumIterator + Display,
    {
        let expected = T::iter()
            .map(|variant| variant.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        ConfigurationError::UnknownVariant {
            parameter,
            value: value.to_string(),
            expected,
        }
    }
}

/// Parse a method name into its enum, reporting the accepted names on failure.
pub fn parse_variant<T>(parameter: &'static str, value: &str) -> Result<T, ConfigurationError>
where
    T: FromStr + IntoEnumIterator + Display,
{
    value
        .parse::<T>()
        .map_err(|_| ConfigurationError::unknown_variant::<T>(parameter, value))
}

/// Checks `min <= value <= max` and names the parameter on failure.
pub(crate) fn check_range(
    parameter: &'static str,
    value: i32,
    min: i32,
    max: i32,
) -> Result<(), ConfigurationError> {
    if value < min || value > max {
        return Err(ConfigurationError::OutOfRange {
            parameter,
            value: value.into(),
            min: min.into(),
            max: max.into(),
        });
    }
    Ok(())
}

/// Raised at call time when an image buffer cannot be fed to a primitive.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ImageFormatError {
    #[error("{operation} requires an 8-bit grayscale or 8-bit RGB image, got {color:?}")]
    UnsupportedLayout {
        operation: &'static str,
        color: ColorType,
    },
}

impl ImageFormatError {
    pub(crate) fn unsupported(operation: &'static str, color: ColorType) -> Self {
        ImageFormatError::UnsupportedLayout { operation, color }
    }
}

/// Everything that can go wrong while a task runs against a patch.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    ImageFormat(#[from] ImageFormatError),

    #[error("feature {feature_type}:{name} is not present in the patch")]
    MissingFeature {
        feature_type: FeatureType,
        name: String,
    },

    #[error("failed to save debug image: {0}")]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type TaskResult<T> = Result<T, TaskError>;
