//! Adaptive plus simple thresholding of raster features.
//!
//! Adaptive thresholding picks out edges; pixels it marks dark are painted
//! with [`SENTINEL`] in the source image, and a simple threshold then joins
//! fields into connected areas.

use image::{DynamicImage, GrayImage, Rgb, RgbImage};
use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::error::{check_range, ConfigurationError, ImageFormatError, TaskResult};
use crate::features::{parse_features, thresh_name, FeatureRef, FeatureSpec, FeatureType};
use crate::imgproc::{self, AdaptiveMethod, AdaptiveType, SimpleMethod};
use crate::patch::Patch;
use crate::task::PatchTask;

/// Colour written over masked pixels, in the buffer's native channel order.
pub const SENTINEL: Rgb<u8> = Rgb([255, 0, 0]);

fn default_block_size() -> i32 {
    11
}

fn default_c() -> f64 {
    2.0
}

fn default_mask_th() -> i32 {
    10
}

fn default_max_value() -> i32 {
    255
}

/// Unvalidated thresholding parameters, as read from a task file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdParams {
    #[serde(default)]
    pub adaptive_method: AdaptiveMethod,
    /// Polarity of the adaptive stage
    #[serde(default)]
    pub thresh_type: AdaptiveType,
    #[serde(default)]
    pub simple_method: SimpleMethod,
    /// Side of the adaptive neighbourhood, odd
    #[serde(default = "default_block_size")]
    pub block_size: i32,
    /// Subtracted from the neighbourhood statistic
    #[serde(default = "default_c")]
    pub c: f64,
    /// Adaptive output below this is painted with [`SENTINEL`]
    #[serde(default = "default_mask_th")]
    pub mask_th: i32,
    #[serde(default = "default_max_value")]
    pub max_value: i32,
    #[serde(default)]
    pub otsu: bool,
    pub simple_th_value: i32,
    pub simple_th_max_value: i32,
}

impl ThresholdParams {
    pub fn new(simple_th_value: i32, simple_th_max_value: i32) -> Self {
        Self {
            adaptive_method: AdaptiveMethod::default(),
            thresh_type: AdaptiveType::default(),
            simple_method: SimpleMethod::default(),
            block_size: default_block_size(),
            c: default_c(),
            mask_th: default_mask_th(),
            max_value: default_max_value(),
            otsu: false,
            simple_th_value,
            simple_th_max_value,
        }
    }
}

fn byte(parameter: &'static str, value: i32) -> Result<u8, ConfigurationError> {
    check_range(parameter, value, 0, 255)?;
    Ok(value as u8)
}

/// Validated thresholding task. Built once, reused for every patch.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdConfig {
    features: Vec<FeatureRef>,
    adaptive_method: AdaptiveMethod,
    adaptive_type: AdaptiveType,
    simple_method: SimpleMethod,
    block_size: u32,
    c: f64,
    mask_th: u8,
    max_value: u8,
    otsu: bool,
    simple_th_value: u8,
    simple_th_max_value: u8,
}

impl ThresholdConfig {
    /// Validate `params` for the given features. Features without an output
    /// name are written to `<name>_THRESH`.
    pub fn new(features: &[FeatureSpec], params: &ThresholdParams) -> Result<Self, ConfigurationError> {
        if params.block_size < 3 || params.block_size % 2 != 1 {
            return Err(ConfigurationError::InvalidBlockSize(params.block_size));
        }

        Ok(Self {
            features: parse_features(features, FeatureType::Data, thresh_name),
            adaptive_method: params.adaptive_method,
            adaptive_type: params.thresh_type,
            simple_method: params.simple_method,
            block_size: params.block_size as u32,
            c: params.c,
            mask_th: byte("mask_th", params.mask_th)?,
            max_value: byte("max_value", params.max_value)?,
            otsu: params.otsu,
            simple_th_value: byte("simple_th_value", params.simple_th_value)?,
            simple_th_max_value: byte("simple_th_max_value", params.simple_th_max_value)?,
        })
    }

    pub fn features(&self) -> &[FeatureRef] {
        &self.features
    }

    /// Which of the four adaptive variants [`apply`](Self::apply) runs.
    pub fn adaptive_variant(&self) -> (AdaptiveMethod, AdaptiveType) {
        (self.adaptive_method, self.adaptive_type)
    }

    /// Which of the ten simple variants [`apply`](Self::apply) runs.
    pub fn simple_variant(&self) -> (SimpleMethod, bool) {
        (self.simple_method, self.otsu)
    }

    /// First stage: the two-level adaptive map of a grayscale image.
    pub fn adaptive_mask(&self, gray: &GrayImage) -> GrayImage {
        debug!(
            "adaptive threshold {} / {} (block {}, c {}, max {})",
            self.adaptive_method, self.adaptive_type, self.block_size, self.c, self.max_value
        );
        imgproc::adaptive_threshold(
            gray,
            self.max_value,
            self.adaptive_method,
            self.adaptive_type,
            self.block_size,
            self.c,
        )
    }

    /// Last stage: simple threshold of the channel-reordered image.
    /// With Otsu enabled the configured threshold value is ignored.
    pub fn simple_threshold(&self, rgb: &RgbImage) -> RgbImage {
        let thresh = if self.otsu {
            imgproc::otsu_threshold(rgb)
        } else {
            self.simple_th_value
        };
        debug!(
            "simple threshold {} (otsu {}, thresh {}, max {})",
            self.simple_method, self.otsu, thresh, self.simple_th_max_value
        );
        imgproc::threshold(rgb, thresh, self.simple_th_max_value, self.simple_method)
    }

    /// Threshold one image.
    ///
    /// `image` is modified as a side effect: a grayscale buffer is expanded
    /// to three channels and masked pixels are painted with [`SENTINEL`].
    /// The returned image is the final result; `image` is never left holding
    /// it. On error `image` is untouched.
    pub fn apply(&self, image: &mut DynamicImage) -> Result<DynamicImage, ImageFormatError> {
        let gray = match &*image {
            DynamicImage::ImageLuma8(gray) => gray.clone(),
            DynamicImage::ImageRgb8(bgr) => imgproc::bgr_to_gray(bgr),
            other => return Err(ImageFormatError::unsupported("adaptiveThreshold", other.color())),
        };
        let adaptive = self.adaptive_mask(&gray);

        if matches!(image, DynamicImage::ImageLuma8(_)) {
            *image = DynamicImage::ImageRgb8(image.to_rgb8());
        }
        let color = image.color();
        let bgr = image
            .as_mut_rgb8()
            .ok_or(ImageFormatError::unsupported("cvtColor", color))?;

        let recolored = recolor_masked(bgr, &adaptive, self.mask_th);
        trace!("painted {} pixels below mask threshold {}", recolored, self.mask_th);

        let rgb = imgproc::bgr_to_rgb(bgr);
        Ok(DynamicImage::ImageRgb8(self.simple_threshold(&rgb)))
    }

    /// Replace `patch[type][new_name]` with the thresholded
    /// `patch[type][name]` for every configured feature, in order.
    pub fn execute(&self, patch: &mut Patch) -> TaskResult<()> {
        for feature in &self.features {
            let input = patch.require_mut(feature.feature_type, &feature.name)?;
            let result = self.apply(input)?;
            debug!("thresholded {}", feature);
            patch.insert(feature.feature_type, feature.new_name.clone(), result);
        }
        Ok(())
    }
}

impl PatchTask for ThresholdConfig {
    fn execute(&self, patch: &mut Patch) -> TaskResult<()> {
        ThresholdConfig::execute(self, patch)
    }

    fn name(&self) -> &str {
        "Thresholding"
    }
}

/// Paint every pixel whose adaptive level is below `mask_th` with
/// [`SENTINEL`]. Returns how many pixels were painted.
pub fn recolor_masked(image: &mut RgbImage, adaptive: &GrayImage, mask_th: u8) -> usize {
    let mut painted = 0;
    for (pixel, level) in image.pixels_mut().zip(adaptive.pixels()) {
        if level[0] < mask_th {
            *pixel = SENTINEL;
            painted += 1;
        }
    }
    painted
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use strum::IntoEnumIterator;

    fn bands() -> Vec<FeatureSpec> {
        vec![FeatureSpec::from((FeatureType::Data, "bands"))]
    }

    fn config(params: ThresholdParams) -> ThresholdConfig {
        ThresholdConfig::new(&bands(), &params).unwrap()
    }

    /// 7x7 image at 100 with a single bright pixel in the middle
    fn bright_spot() -> GrayImage {
        let mut gray = GrayImage::from_pixel(7, 7, Luma([100]));
        gray.put_pixel(3, 3, Luma([190]));
        gray
    }

    /// 7x7 image at 100 with a single black pixel in the middle
    fn dark_spot() -> GrayImage {
        let mut gray = GrayImage::from_pixel(7, 7, Luma([100]));
        gray.put_pixel(3, 3, Luma([0]));
        gray
    }

    #[test]
    fn test_rejects_even_block_size() {
        let params = ThresholdParams { block_size: 10, ..ThresholdParams::new(127, 255) };
        assert_eq!(
            ThresholdConfig::new(&bands(), &params).unwrap_err(),
            ConfigurationError::InvalidBlockSize(10)
        );
        let params = ThresholdParams { block_size: 1, ..ThresholdParams::new(127, 255) };
        assert!(ThresholdConfig::new(&bands(), &params).is_err());
        let params = ThresholdParams { block_size: -3, ..ThresholdParams::new(127, 255) };
        assert!(ThresholdConfig::new(&bands(), &params).is_err());
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        let cases = [
            ("mask_th", ThresholdParams { mask_th: 300, ..ThresholdParams::new(127, 255) }),
            ("max_value", ThresholdParams { max_value: -1, ..ThresholdParams::new(127, 255) }),
            ("simple_th_value", ThresholdParams::new(256, 255)),
            ("simple_th_max_value", ThresholdParams::new(127, -1)),
        ];
        for (parameter, params) in cases {
            match ThresholdConfig::new(&bands(), &params) {
                Err(ConfigurationError::OutOfRange { parameter: p, .. }) => assert_eq!(p, parameter),
                other => panic!("{} should be rejected, got {:?}", parameter, other),
            }
        }
    }

    #[test]
    fn test_accepts_bounds() {
        let params = ThresholdParams {
            mask_th: 0,
            max_value: 255,
            ..ThresholdParams::new(0, 255)
        };
        assert!(ThresholdConfig::new(&bands(), &params).is_ok());
    }

    #[test]
    fn test_rejects_unknown_method_names() {
        use crate::error::parse_variant;
        assert!(parse_variant::<AdaptiveMethod>("adaptive_method", "ADAPTIVE_THRESH_MEDIAN_C").is_err());
        assert!(parse_variant::<AdaptiveType>("thresh_type", "THRESH_TRUNC").is_err());
        assert!(parse_variant::<SimpleMethod>("simple_method", "THRESH_MASK").is_err());
        assert_eq!(
            parse_variant::<SimpleMethod>("simple_method", "THRESH_TOZERO_INV").unwrap(),
            SimpleMethod::ToZeroInv
        );
    }

    #[test]
    fn test_default_output_name() {
        let cfg = config(ThresholdParams::new(127, 255));
        assert_eq!(cfg.features()[0].new_name, "bands_THRESH");
    }

    #[test]
    fn test_each_adaptive_variant_is_distinguishable() {
        // Probe the diagonal neighbour of the spot and a far corner.
        // Mean sees the spot at -10, the 3x3 Gaussian at -6; c = 8 splits them.
        let gray = bright_spot();
        let expected = [
            ((AdaptiveMethod::Mean, AdaptiveType::Binary), (0, 255)),
            ((AdaptiveMethod::Gaussian, AdaptiveType::Binary), (255, 255)),
            ((AdaptiveMethod::Mean, AdaptiveType::BinaryInv), (255, 0)),
            ((AdaptiveMethod::Gaussian, AdaptiveType::BinaryInv), (0, 0)),
        ];

        for ((method, kind), (diagonal, corner)) in expected {
            let cfg = config(ThresholdParams {
                adaptive_method: method,
                thresh_type: kind,
                block_size: 3,
                c: 8.0,
                ..ThresholdParams::new(127, 255)
            });
            assert_eq!(cfg.adaptive_variant(), (method, kind));
            let out = cfg.adaptive_mask(&gray);
            assert_eq!(out.get_pixel(4, 4)[0], diagonal, "{} / {}", method, kind);
            assert_eq!(out.get_pixel(0, 0)[0], corner, "{} / {}", method, kind);
        }
    }

    #[test]
    fn test_adaptive_output_has_two_levels() {
        let gray = GrayImage::from_fn(8, 8, |x, y| Luma([if (x + y) % 2 == 0 { 255 } else { 0 }]));
        let cfg = config(ThresholdParams { max_value: 200, block_size: 3, ..ThresholdParams::new(127, 255) });
        let out = cfg.adaptive_mask(&gray);
        assert!(out.pixels().all(|p| p[0] == 0 || p[0] == 200));
        assert_eq!(out.get_pixel(2, 2)[0], 200);
        assert_eq!(out.get_pixel(2, 3)[0], 0);
    }

    #[test]
    fn test_each_simple_variant() {
        let rgb = RgbImage::from_fn(16, 16, |x, y| Rgb([(x * 16) as u8, (y * 16) as u8, 128]));
        let otsu_level = imgproc::otsu_threshold(&rgb);

        for method in SimpleMethod::iter() {
            for otsu in [false, true] {
                let cfg = config(ThresholdParams {
                    simple_method: method,
                    otsu,
                    ..ThresholdParams::new(90, 200)
                });
                assert_eq!(cfg.simple_variant(), (method, otsu));

                let out = cfg.simple_threshold(&rgb);
                assert_eq!(out.dimensions(), rgb.dimensions());

                let thresh = if otsu { otsu_level } else { 90 };
                assert_eq!(out, imgproc::threshold(&rgb, thresh, 200, method), "{} otsu={}", method, otsu);

                if matches!(method, SimpleMethod::Binary | SimpleMethod::BinaryInv) {
                    assert!(out.iter().all(|&v| v == 0 || v == 200));
                }
            }
        }
    }

    #[test]
    fn test_recolor_only_below_cutoff() {
        let mut img = RgbImage::from_pixel(3, 1, Rgb([10, 20, 30]));
        let adaptive = GrayImage::from_raw(3, 1, vec![5, 10, 50]).unwrap();
        assert_eq!(recolor_masked(&mut img, &adaptive, 10), 1);
        assert_eq!(img.get_pixel(0, 0), &SENTINEL);
        assert_eq!(img.get_pixel(1, 0), &Rgb([10, 20, 30]));
        assert_eq!(img.get_pixel(2, 0), &Rgb([10, 20, 30]));
    }

    #[test]
    fn test_apply_mutates_input_and_returns_result() {
        let cfg = config(ThresholdParams { block_size: 3, ..ThresholdParams::new(127, 255) });
        let mut input = DynamicImage::ImageRgb8(DynamicImage::ImageLuma8(dark_spot()).to_rgb8());

        let result = cfg.apply(&mut input).unwrap().to_rgb8();

        // The input only carries the painted mask
        let painted = input.to_rgb8();
        assert_eq!(painted.get_pixel(3, 3), &SENTINEL);
        assert_eq!(painted.get_pixel(0, 0), &Rgb([100, 100, 100]));

        // The result was channel swapped before the simple threshold
        assert_eq!(result.get_pixel(3, 3), &Rgb([0, 0, 255]));
        assert_eq!(result.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_ne!(DynamicImage::ImageRgb8(result), input);
    }

    #[test]
    fn test_apply_with_extreme_c() {
        // A huge negative c masks every pixel, a huge positive c none
        for (c, painted) in [(-3.0e9, true), (3.0e9, false)] {
            let cfg = config(ThresholdParams { block_size: 3, c, ..ThresholdParams::new(127, 255) });
            let mut input = DynamicImage::ImageLuma8(GrayImage::from_pixel(4, 4, Luma([60])));

            let result = cfg.apply(&mut input).unwrap();

            assert_eq!(result.color(), image::ColorType::Rgb8);
            assert!(input.to_rgb8().pixels().all(|p| (*p == SENTINEL) == painted), "c = {}", c);
        }
    }

    #[test]
    fn test_apply_expands_grayscale_input() {
        let cfg = config(ThresholdParams { block_size: 3, ..ThresholdParams::new(127, 255) });
        let mut input = DynamicImage::ImageLuma8(dark_spot());

        let result = cfg.apply(&mut input).unwrap();

        assert_eq!(input.color(), image::ColorType::Rgb8);
        assert_eq!(result.color(), image::ColorType::Rgb8);
        assert_eq!(input.to_rgb8().get_pixel(3, 3), &SENTINEL);
        assert_eq!((result.width(), result.height()), (7, 7));
    }

    #[test]
    fn test_apply_rejects_unsupported_layout() {
        let cfg = config(ThresholdParams::new(127, 255));
        let mut input = DynamicImage::new_rgba8(4, 4);
        let err = cfg.apply(&mut input).unwrap_err();
        assert!(matches!(err, ImageFormatError::UnsupportedLayout { operation: "adaptiveThreshold", .. }));
        assert_eq!(input, DynamicImage::new_rgba8(4, 4));
    }
}
