use eothresh::{FeatureSpec, FeatureType, Patch, ThresholdConfig, ThresholdParams};
use image::{DynamicImage, Rgb, RgbImage};

/// 16x16 BGR image: bright fields split by a dark cross, plus speckles.
pub fn field_image() -> DynamicImage {
    let img = RgbImage::from_fn(16, 16, |x, y| {
        if x == 8 || y == 8 {
            Rgb([20u8, 30, 25])
        } else if (x * 7 + y * 3) % 11 == 0 {
            Rgb([90, 120, 60])
        } else {
            Rgb([180, 200, 170])
        }
    });
    DynamicImage::ImageRgb8(img)
}

/// Patch holding `field_image()` as `data/bands`.
pub fn bands_patch() -> Patch {
    Patch::new().with_feature(FeatureType::Data, "bands", field_image())
}

/// Threshold config for `data/bands` with a small neighbourhood.
pub fn bands_threshold() -> ThresholdConfig {
    ThresholdConfig::new(
        &[FeatureSpec::from((FeatureType::Data, "bands"))],
        &ThresholdParams {
            block_size: 3,
            ..ThresholdParams::new(127, 255)
        },
    )
    .expect("Failed to build threshold config")
}
