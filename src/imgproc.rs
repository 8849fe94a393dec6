//! 8-bit image primitives with OpenCV-compatible semantics.
//!
//! Each primitive works on `Luma8` and `Rgb8` buffers. Anything else is
//! reported as an [`ImageFormatError`] naming the OpenCV routine it mirrors.

use image::{imageops, DynamicImage, GrayImage, Luma, RgbImage};
use imageproc::contrast::otsu_level;
use imageproc::filter::median_filter;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use crate::error::ImageFormatError;

/// How the local threshold of the adaptive stage is computed.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, EnumIter, Serialize, Deserialize,
)]
pub enum AdaptiveMethod {
    /// Mean of the block neighbourhood.
    #[default]
    #[strum(to_string = "ADAPTIVE_THRESH_MEAN_C")]
    #[serde(rename = "ADAPTIVE_THRESH_MEAN_C")]
    Mean,
    /// Gaussian-weighted sum of the block neighbourhood.
    #[strum(to_string = "ADAPTIVE_THRESH_GAUSSIAN_C")]
    #[serde(rename = "ADAPTIVE_THRESH_GAUSSIAN_C")]
    Gaussian,
}

/// Output polarity of the adaptive stage.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, EnumIter, Serialize, Deserialize,
)]
pub enum AdaptiveType {
    #[default]
    #[strum(to_string = "THRESH_BINARY")]
    #[serde(rename = "THRESH_BINARY")]
    Binary,
    #[strum(to_string = "THRESH_BINARY_INV")]
    #[serde(rename = "THRESH_BINARY_INV")]
    BinaryInv,
}

/// Fixed-level threshold applied to every sample.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, EnumIter, Serialize, Deserialize,
)]
pub enum SimpleMethod {
    /// `v > t ? max : 0`
    #[default]
    #[strum(to_string = "THRESH_BINARY")]
    #[serde(rename = "THRESH_BINARY")]
    Binary,
    /// `v > t ? 0 : max`
    #[strum(to_string = "THRESH_BINARY_INV")]
    #[serde(rename = "THRESH_BINARY_INV")]
    BinaryInv,
    /// `v > t ? t : v`
    #[strum(to_string = "THRESH_TRUNC")]
    #[serde(rename = "THRESH_TRUNC")]
    Trunc,
    /// `v > t ? v : 0`
    #[strum(to_string = "THRESH_TOZERO")]
    #[serde(rename = "THRESH_TOZERO")]
    ToZero,
    /// `v > t ? 0 : v`
    #[strum(to_string = "THRESH_TOZERO_INV")]
    #[serde(rename = "THRESH_TOZERO_INV")]
    ToZeroInv,
}

/// Pixel extrapolation used when a kernel reaches past the image edge.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, EnumIter, Serialize, Deserialize,
)]
pub enum BorderType {
    /// `000000|abcdefgh|0000000`
    #[strum(to_string = "BORDER_CONSTANT")]
    #[serde(rename = "BORDER_CONSTANT")]
    Constant,
    /// `aaaaaa|abcdefgh|hhhhhhh`
    #[strum(to_string = "BORDER_REPLICATE")]
    #[serde(rename = "BORDER_REPLICATE")]
    Replicate,
    /// `fedcba|abcdefgh|hgfedcb`
    #[strum(to_string = "BORDER_REFLECT")]
    #[serde(rename = "BORDER_REFLECT")]
    Reflect,
    /// `cdefgh|abcdefgh|abcdefg`
    #[strum(to_string = "BORDER_WRAP")]
    #[serde(rename = "BORDER_WRAP")]
    Wrap,
    /// `gfedcb|abcdefgh|gfedcba`, also accepted as `BORDER_DEFAULT`.
    #[default]
    #[strum(to_string = "BORDER_REFLECT_101", serialize = "BORDER_DEFAULT")]
    #[serde(rename = "BORDER_REFLECT_101", alias = "BORDER_DEFAULT")]
    Reflect101,
}

/// Map a possibly out-of-range coordinate back into `0..len`.
/// `None` means the sample lies in a constant (zero) border.
fn border_index(index: isize, len: usize, border: BorderType) -> Option<usize> {
    let n = len as isize;
    if (0..n).contains(&index) {
        return Some(index as usize);
    }

    match border {
        BorderType::Constant => None,
        BorderType::Replicate => Some(index.clamp(0, n - 1) as usize),
        BorderType::Wrap => Some(index.rem_euclid(n) as usize),
        BorderType::Reflect | BorderType::Reflect101 => {
            if n == 1 {
                return Some(0);
            }
            let delta = isize::from(border == BorderType::Reflect101);
            let mut p = index;
            while !(0..n).contains(&p) {
                p = if p < 0 {
                    -p - 1 + delta
                } else {
                    n - 1 - (p - n) - delta
                };
            }
            Some(p as usize)
        }
    }
}

/// Run `filter(src, dst, width, height, channels)` on the raw samples of an
/// 8-bit grayscale or RGB image.
fn map_samples<F>(
    image: &DynamicImage,
    operation: &'static str,
    mut filter: F,
) -> Result<DynamicImage, ImageFormatError>
where
    F: FnMut(&[u8], &mut [u8], usize, usize, usize),
{
    match image {
        DynamicImage::ImageLuma8(gray) => {
            let (width, height) = gray.dimensions();
            let mut out = GrayImage::new(width, height);
            filter(gray.as_raw(), &mut *out, width as usize, height as usize, 1);
            Ok(DynamicImage::ImageLuma8(out))
        }
        DynamicImage::ImageRgb8(rgb) => {
            let (width, height) = rgb.dimensions();
            let mut out = RgbImage::new(width, height);
            filter(rgb.as_raw(), &mut *out, width as usize, height as usize, 3);
            Ok(DynamicImage::ImageRgb8(out))
        }
        other => Err(ImageFormatError::unsupported(operation, other.color())),
    }
}

/// 1D Gaussian kernel of `size` taps, normalised to sum to one.
///
/// With `sigma <= 0` the sigma is derived from the size, and the small odd
/// sizes use the same fixed binomial taps OpenCV does.
pub fn gaussian_kernel(size: usize, sigma: f64) -> Vec<f32> {
    const SMALL_KERNELS: [&[f32]; 4] = [
        &[1.0],
        &[0.25, 0.5, 0.25],
        &[0.0625, 0.25, 0.375, 0.25, 0.0625],
        &[0.03125, 0.109375, 0.21875, 0.28125, 0.21875, 0.109375, 0.03125],
    ];
    if size % 2 == 1 && size <= 7 && sigma <= 0.0 {
        return SMALL_KERNELS[size / 2].to_vec();
    }

    let sigma = if sigma > 0.0 {
        sigma
    } else {
        ((size as f64 - 1.0) * 0.5 - 1.0) * 0.3 + 0.8
    };
    let scale = -0.5 / (sigma * sigma);
    let center = (size as f64 - 1.0) * 0.5;

    let weights: Vec<f64> = (0..size)
        .map(|i| {
            let x = i as f64 - center;
            (scale * x * x).exp()
        })
        .collect();
    let sum: f64 = weights.iter().sum();
    weights.iter().map(|w| (w / sum) as f32).collect()
}

/// Kernel size OpenCV picks for an 8-bit image when only sigma is given.
fn kernel_size_for_sigma(sigma: f64) -> usize {
    ((sigma * 3.0 * 2.0 + 1.0).round() as usize) | 1
}

#[allow(clippy::too_many_arguments)]
fn separable_filter(
    src: &[u8],
    dst: &mut [u8],
    width: usize,
    height: usize,
    channels: usize,
    kernel_x: &[f32],
    kernel_y: &[f32],
    border: BorderType,
) {
    let rx = (kernel_x.len() / 2) as isize;
    let ry = (kernel_y.len() / 2) as isize;
    let stride = width * channels;

    let mut horizontal = vec![0f32; src.len()];
    for y in 0..height {
        let row = &src[y * stride..(y + 1) * stride];
        for x in 0..width {
            for c in 0..channels {
                let mut acc = 0.0;
                for (k, &weight) in kernel_x.iter().enumerate() {
                    if let Some(sx) = border_index(x as isize + k as isize - rx, width, border) {
                        acc += weight * row[sx * channels + c] as f32;
                    }
                }
                horizontal[y * stride + x * channels + c] = acc;
            }
        }
    }

    for y in 0..height {
        for x in 0..width {
            for c in 0..channels {
                let mut acc = 0.0;
                for (k, &weight) in kernel_y.iter().enumerate() {
                    if let Some(sy) = border_index(y as isize + k as isize - ry, height, border) {
                        acc += weight * horizontal[sy * stride + x * channels + c];
                    }
                }
                dst[y * stride + x * channels + c] = acc.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
}

/// Block mean with replicated borders, rounded once from the exact sum.
fn box_mean(gray: &GrayImage, block_size: u32) -> GrayImage {
    let (width, height) = (gray.width() as usize, gray.height() as usize);
    let radius = (block_size / 2) as isize;
    let src = gray.as_raw();

    let mut rows = vec![0u64; src.len()];
    for y in 0..height {
        for x in 0..width {
            rows[y * width + x] = (-radius..=radius)
                .filter_map(|k| border_index(x as isize + k, width, BorderType::Replicate))
                .map(|sx| src[y * width + sx] as u64)
                .sum();
        }
    }

    let area = block_size as u64 * block_size as u64;
    let mut out = GrayImage::new(width as u32, height as u32);
    for y in 0..height {
        for x in 0..width {
            let sum: u64 = (-radius..=radius)
                .filter_map(|k| border_index(y as isize + k, height, BorderType::Replicate))
                .map(|sy| rows[sy * width + x])
                .sum();
            out.put_pixel(x as u32, y as u32, Luma([((2 * sum + area) / (2 * area)).min(255) as u8]));
        }
    }
    out
}

/// Local adaptive threshold of a grayscale image (`cv::adaptiveThreshold`).
///
/// The neighbourhood statistic is taken over a `block_size` square with
/// replicated borders; `c` is subtracted from it before comparing.
pub fn adaptive_threshold(
    gray: &GrayImage,
    max_value: u8,
    method: AdaptiveMethod,
    kind: AdaptiveType,
    block_size: u32,
    c: f64,
) -> GrayImage {
    let (width, height) = gray.dimensions();

    let local = match method {
        AdaptiveMethod::Mean => box_mean(gray, block_size),
        AdaptiveMethod::Gaussian => {
            let kernel = gaussian_kernel(block_size as usize, 0.0);
            let mut blurred = GrayImage::new(width, height);
            separable_filter(
                gray.as_raw(),
                &mut *blurred,
                width as usize,
                height as usize,
                1,
                &kernel,
                &kernel,
                BorderType::Replicate,
            );
            blurred
        }
    };

    // Integer comparison against a rounded delta, as OpenCV does for 8-bit input.
    // Beyond +-256 every 8-bit difference lands on the same side.
    let delta = match kind {
        AdaptiveType::Binary => c.ceil(),
        AdaptiveType::BinaryInv => c.floor(),
    }
    .clamp(-256.0, 256.0) as i32;

    let mut out = GrayImage::new(width, height);
    for ((dst, &src), &mean) in out.iter_mut().zip(gray.iter()).zip(local.iter()) {
        let diff = src as i32 - mean as i32;
        let on = match kind {
            AdaptiveType::Binary => diff > -delta,
            AdaptiveType::BinaryInv => diff <= -delta,
        };
        *dst = if on { max_value } else { 0 };
    }
    out
}

fn threshold_sample(value: u8, thresh: u8, max_value: u8, method: SimpleMethod) -> u8 {
    match (method, value > thresh) {
        (SimpleMethod::Binary, true) | (SimpleMethod::BinaryInv, false) => max_value,
        (SimpleMethod::Trunc, true) => thresh,
        (SimpleMethod::Trunc, false) | (SimpleMethod::ToZero, true) | (SimpleMethod::ToZeroInv, false) => value,
        (SimpleMethod::Binary, false)
        | (SimpleMethod::BinaryInv, true)
        | (SimpleMethod::ToZero, false)
        | (SimpleMethod::ToZeroInv, true) => 0,
    }
}

/// Fixed-level threshold of every sample (`cv::threshold`).
pub fn threshold(image: &RgbImage, thresh: u8, max_value: u8, method: SimpleMethod) -> RgbImage {
    let (width, height) = image.dimensions();
    let mut out = RgbImage::new(width, height);
    for (dst, &src) in out.iter_mut().zip(image.iter()) {
        *dst = threshold_sample(src, thresh, max_value, method);
    }
    out
}

/// Otsu level of an RGB image, computed on its luma.
pub fn otsu_threshold(image: &RgbImage) -> u8 {
    otsu_level(&imageops::grayscale(image))
}

/// Swap the first and third channel (`cv::COLOR_BGR2RGB`).
pub fn bgr_to_rgb(image: &RgbImage) -> RgbImage {
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        pixel.0.swap(0, 2);
    }
    out
}

/// Luma of a BGR-ordered image (`cv::COLOR_BGR2GRAY`).
pub fn bgr_to_gray(image: &RgbImage) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let [b, g, r] = image.get_pixel(x, y).0;
        let luma = 0.114 * b as f32 + 0.587 * g as f32 + 0.299 * r as f32;
        Luma([luma.round().clamp(0.0, 255.0) as u8])
    })
}

/// Median filter with a square aperture of `ksize` (`cv::medianBlur`).
pub fn median_blur(image: &DynamicImage, ksize: u32) -> Result<DynamicImage, ImageFormatError> {
    let radius = ksize / 2;
    match image {
        DynamicImage::ImageLuma8(gray) => Ok(DynamicImage::ImageLuma8(median_filter(gray, radius, radius))),
        DynamicImage::ImageRgb8(rgb) => Ok(DynamicImage::ImageRgb8(median_filter(rgb, radius, radius))),
        other => Err(ImageFormatError::unsupported("medianBlur", other.color())),
    }
}

/// Gaussian blur (`cv::GaussianBlur`).
///
/// A zero kernel side is derived from the matching sigma; a zero `sigma_y`
/// falls back to `sigma_x`, and zero sigmas are derived from the kernel size.
pub fn gaussian_blur(
    image: &DynamicImage,
    ksize: (u32, u32),
    sigma_x: f64,
    sigma_y: f64,
    border: BorderType,
) -> Result<DynamicImage, ImageFormatError> {
    let sigma_y = if sigma_y <= 0.0 { sigma_x } else { sigma_y };
    let width = match ksize.0 {
        0 => kernel_size_for_sigma(sigma_x),
        k => k as usize,
    };
    let height = match ksize.1 {
        0 => kernel_size_for_sigma(sigma_y),
        k => k as usize,
    };
    let kernel_x = gaussian_kernel(width, sigma_x);
    let kernel_y = gaussian_kernel(height, sigma_y);

    map_samples(image, "GaussianBlur", |src, dst, w, h, channels| {
        separable_filter(src, dst, w, h, channels, &kernel_x, &kernel_y, border)
    })
}

/// Edge-preserving bilateral filter (`cv::bilateralFilter`).
///
/// A non-positive `diameter` is derived from `sigma_space`. Colour distance
/// between RGB pixels is the sum of absolute channel differences.
pub fn bilateral_filter(
    image: &DynamicImage,
    diameter: i32,
    sigma_color: f64,
    sigma_space: f64,
    border: BorderType,
) -> Result<DynamicImage, ImageFormatError> {
    let sigma_color = if sigma_color <= 0.0 { 1.0 } else { sigma_color };
    let sigma_space = if sigma_space <= 0.0 { 1.0 } else { sigma_space };
    let radius = if diameter <= 0 {
        (sigma_space * 1.5).round() as isize
    } else {
        (diameter / 2) as isize
    }
    .max(1);

    let color_coeff = -0.5 / (sigma_color * sigma_color);
    let space_coeff = -0.5 / (sigma_space * sigma_space);

    let mut window = Vec::new();
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let r = ((dx * dx + dy * dy) as f64).sqrt();
            if r > radius as f64 {
                continue;
            }
            window.push((dx, dy, (r * r * space_coeff).exp() as f32));
        }
    }

    map_samples(image, "bilateralFilter", |src, dst, width, height, channels| {
        const ZERO: [u8; 3] = [0; 3];
        let color_weight: Vec<f32> = (0..=255 * channels)
            .map(|d| ((d * d) as f64 * color_coeff).exp() as f32)
            .collect();

        for y in 0..height {
            for x in 0..width {
                let at = (y * width + x) * channels;
                let center = &src[at..at + channels];
                let mut sum = [0f32; 3];
                let mut weight_sum = 0f32;

                for &(dx, dy, space_weight) in &window {
                    let nx = border_index(x as isize + dx, width, border);
                    let ny = border_index(y as isize + dy, height, border);
                    let neighbour = match (nx, ny) {
                        (Some(nx), Some(ny)) => {
                            let n_at = (ny * width + nx) * channels;
                            &src[n_at..n_at + channels]
                        }
                        _ => &ZERO[..channels],
                    };

                    let distance: usize = center
                        .iter()
                        .zip(neighbour)
                        .map(|(&a, &b)| a.abs_diff(b) as usize)
                        .sum();
                    let weight = space_weight * color_weight[distance];
                    for (acc, &v) in sum.iter_mut().zip(neighbour) {
                        *acc += weight * v as f32;
                    }
                    weight_sum += weight;
                }

                for (c, out) in dst[at..at + channels].iter_mut().enumerate() {
                    *out = (sum[c] / weight_sum).round().clamp(0.0, 255.0) as u8;
                }
            }
        }
    })
}
