//! Blur pre-filter. Smoothing an image before thresholding sometimes gives
//! cleaner segments.

use image::DynamicImage;
use log::debug;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use crate::error::{ConfigurationError, ImageFormatError, TaskResult};
use crate::features::{parse_features, FeatureRef, FeatureSpec, FeatureType};
use crate::imgproc::{self, BorderType};
use crate::patch::Patch;
use crate::task::PatchTask;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, EnumIter, Serialize, Deserialize,
)]
pub enum BlurMethod {
    #[default]
    #[strum(to_string = "none")]
    #[serde(rename = "none")]
    None,
    #[strum(to_string = "medianBlur")]
    #[serde(rename = "medianBlur")]
    MedianBlur,
    #[strum(to_string = "GaussianBlur")]
    #[serde(rename = "GaussianBlur")]
    GaussianBlur,
    #[strum(to_string = "bilateralFilter")]
    #[serde(rename = "bilateralFilter")]
    BilateralFilter,
}

/// Largest kernel side or bilateral diameter accepted.
pub const MAX_KERNEL: i32 = 3001;

/// Largest spatial sigma accepted. The kernel derived from it still fits in
/// [`MAX_KERNEL`].
pub const MAX_SIGMA: f64 = 500.0;

fn default_gaussian_ksize() -> (i32, i32) {
    (5, 5)
}

fn default_median_ksize() -> i32 {
    5
}

fn default_diameter() -> i32 {
    9
}

fn default_sigma() -> f64 {
    75.0
}

/// Unvalidated blur parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlurParams {
    pub method: BlurMethod,

    /// Gaussian kernel `(width, height)`: both odd and positive, or both zero
    /// to derive them from the sigmas.
    pub gaussian_ksize: (i32, i32),
    pub sigma_x: f64,
    /// Zero means "same as `sigma_x`".
    pub sigma_y: f64,

    /// Median aperture, odd and greater than 1.
    pub median_ksize: i32,

    /// Bilateral neighbourhood diameter; non-positive derives it from `sigma_space`.
    pub diameter: i32,
    pub sigma_color: f64,
    pub sigma_space: f64,

    pub border_type: BorderType,
}

impl Default for BlurParams {
    fn default() -> Self {
        Self {
            method: BlurMethod::None,
            gaussian_ksize: default_gaussian_ksize(),
            sigma_x: 0.0,
            sigma_y: 0.0,
            median_ksize: default_median_ksize(),
            diameter: default_diameter(),
            sigma_color: default_sigma(),
            sigma_space: default_sigma(),
            border_type: BorderType::default(),
        }
    }
}

impl BlurParams {
    pub fn with_method(method: BlurMethod) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }
}

/// Validated blur settings.
#[derive(Debug, Clone, PartialEq)]
pub struct BlurConfig {
    method: BlurMethod,
    gaussian_ksize: (u32, u32),
    sigma_x: f64,
    sigma_y: f64,
    median_ksize: u32,
    diameter: i32,
    sigma_color: f64,
    sigma_space: f64,
    border_type: BorderType,
}

impl BlurConfig {
    pub fn new(params: &BlurParams) -> Result<Self, ConfigurationError> {
        let (gw, gh) = params.gaussian_ksize;
        let odd_positive = |k: i32| k > 0 && k % 2 == 1 && k <= MAX_KERNEL;
        if !((gw == 0 && gh == 0) || (odd_positive(gw) && odd_positive(gh))) {
            return Err(ConfigurationError::InvalidKernel {
                parameter: "gaussian_ksize",
                value: format!("({}, {})", gw, gh),
                reason: "sides must be odd, positive and at most 3001, or both zero",
            });
        }

        if params.median_ksize <= 1 || params.median_ksize % 2 != 1 || params.median_ksize > MAX_KERNEL {
            return Err(ConfigurationError::InvalidKernel {
                parameter: "median_ksize",
                value: params.median_ksize.to_string(),
                reason: "must be odd, greater than 1 and at most 3001",
            });
        }

        if params.diameter > MAX_KERNEL {
            return Err(ConfigurationError::InvalidKernel {
                parameter: "diameter",
                value: params.diameter.to_string(),
                reason: "must be at most 3001",
            });
        }

        for (parameter, sigma) in [
            ("sigma_x", params.sigma_x),
            ("sigma_y", params.sigma_y),
            ("sigma_space", params.sigma_space),
        ] {
            if !sigma.is_finite() || sigma > MAX_SIGMA {
                return Err(ConfigurationError::InvalidKernel {
                    parameter,
                    value: sigma.to_string(),
                    reason: "must be finite and at most 500",
                });
            }
        }
        if !params.sigma_color.is_finite() {
            return Err(ConfigurationError::InvalidKernel {
                parameter: "sigma_color",
                value: params.sigma_color.to_string(),
                reason: "must be finite",
            });
        }

        match params.method {
            BlurMethod::GaussianBlur if (gw, gh) == (0, 0) && params.sigma_x <= 0.0 => {
                return Err(ConfigurationError::InvalidKernel {
                    parameter: "sigma_x",
                    value: params.sigma_x.to_string(),
                    reason: "must be positive when gaussian_ksize is (0, 0)",
                });
            }
            BlurMethod::GaussianBlur | BlurMethod::BilateralFilter
                if params.border_type == BorderType::Wrap =>
            {
                return Err(ConfigurationError::UnsupportedBorder {
                    border: params.border_type.to_string(),
                    method: params.method.to_string(),
                });
            }
            _ => {}
        }

        Ok(Self {
            method: params.method,
            gaussian_ksize: (gw as u32, gh as u32),
            sigma_x: params.sigma_x,
            sigma_y: params.sigma_y,
            median_ksize: params.median_ksize as u32,
            diameter: params.diameter,
            sigma_color: params.sigma_color,
            sigma_space: params.sigma_space,
            border_type: params.border_type,
        })
    }

    pub fn method(&self) -> BlurMethod {
        self.method
    }

    /// Blur `image` with the configured method. `none` returns an equal copy.
    pub fn apply(&self, image: &DynamicImage) -> Result<DynamicImage, ImageFormatError> {
        debug!("blur {} ({}x{})", self.method, image.width(), image.height());
        match self.method {
            BlurMethod::None => Ok(image.clone()),
            BlurMethod::MedianBlur => imgproc::median_blur(image, self.median_ksize),
            BlurMethod::GaussianBlur => imgproc::gaussian_blur(
                image,
                self.gaussian_ksize,
                self.sigma_x,
                self.sigma_y,
                self.border_type,
            ),
            BlurMethod::BilateralFilter => imgproc::bilateral_filter(
                image,
                self.diameter,
                self.sigma_color,
                self.sigma_space,
                self.border_type,
            ),
        }
    }
}

/// Runs a [`BlurConfig`] over patch features. Without an explicit output
/// name the blurred image replaces its input.
#[derive(Debug, Clone, PartialEq)]
pub struct BlurTask {
    features: Vec<FeatureRef>,
    config: BlurConfig,
}

impl BlurTask {
    pub fn new(features: &[FeatureSpec], config: BlurConfig) -> Self {
        Self {
            features: parse_features(features, FeatureType::Data, str::to_string),
            config,
        }
    }
}

impl PatchTask for BlurTask {
    fn execute(&self, patch: &mut Patch) -> TaskResult<()> {
        for feature in &self.features {
            let blurred = self.config.apply(patch.require(feature.feature_type, &feature.name)?)?;
            patch.insert(feature.feature_type, feature.new_name.clone(), blurred);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "Blurring"
    }
}
