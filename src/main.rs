use clap::Parser;
use flexi_logger::Logger;
use image::{DynamicImage, ImageReader};
use log::info;
use std::path::{Path, PathBuf};

use eothresh::error::parse_variant;
use eothresh::features::FeatureSpec;
use eothresh::imgproc::bgr_to_rgb;
use eothresh::{Patch, TaskFile, ThresholdParams};

#[derive(Parser)]
#[command(name = "eothresh")]
#[command(about = "Segment fields in raster images with adaptive and simple thresholding")]
struct Cli {
    /// Path to input image file
    #[arg(value_name = "IMAGE")]
    image_path: PathBuf,

    /// JSON task file with features, blur and threshold parameters
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Where to write the result (defaults to <IMAGE stem>_THRESH.png)
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Feature name the input image is stored under when no task file is given
    #[arg(long, default_value = "bands")]
    feature: String,

    /// Blur method to run before thresholding, overrides the task file
    #[arg(long, value_name = "METHOD")]
    blur: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Save debug outputs to directory (must be empty)
    #[arg(long, value_name = "DIR")]
    debug_out: Option<PathBuf>,
}

/// Decode into one of the two layouts the tasks accept, in BGR order.
fn load_bgr(path: &Path) -> anyhow::Result<DynamicImage> {
    let img = ImageReader::open(path)?
        .decode()
        .map_err(|e| anyhow::anyhow!("Failed to decode image: {}", e))?;

    Ok(match img {
        DynamicImage::ImageLuma8(_) => img,
        DynamicImage::ImageLumaA8(_) | DynamicImage::ImageLuma16(_) | DynamicImage::ImageLumaA16(_) => {
            DynamicImage::ImageLuma8(img.to_luma8())
        }
        // Decoders hand back RGB; the patch holds BGR like the bands it models
        _ => DynamicImage::ImageRgb8(bgr_to_rgb(&img.to_rgb8())),
    })
}

fn output_path(args: &Cli, new_name: &str, single: bool) -> PathBuf {
    if single {
        if let Some(output) = &args.output {
            return output.clone();
        }
    }
    let stem = args
        .image_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    let file_name = if single {
        format!("{}_THRESH.png", stem)
    } else {
        format!("{}_{}.png", stem, new_name)
    };
    args.image_path.with_file_name(file_name)
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    let level = if args.verbose { "debug" } else { "info" };
    let _logger = Logger::try_with_env_or_str(level)?.start()?;

    let mut task_file = match &args.config {
        Some(path) => TaskFile::load(path)?,
        None => {
            let mut file = TaskFile::new(ThresholdParams::new(127, 255));
            file.features = vec![FeatureSpec::Name(args.feature.clone())];
            file
        }
    };
    if let Some(method) = &args.blur {
        task_file.blur.method = parse_variant("blur method", method)?;
    }

    info!("Loading image: {:?}", args.image_path);
    let img = load_bgr(&args.image_path)?;
    info!("Image loaded: {}x{} {:?}", img.width(), img.height(), img.color());

    let (mut chain, threshold) = task_file.build_chain()?;
    chain = chain.with_verbose(args.verbose);
    if let Some(debug_dir) = args.debug_out.clone() {
        chain = chain.with_debug(debug_dir)?;
    }

    let mut patch = Patch::new();
    for feature in threshold.features() {
        if !patch.contains(feature.feature_type, &feature.name) {
            patch.insert(feature.feature_type, feature.name.clone(), img.clone());
        }
    }

    chain.run(&mut patch)?;

    let outputs = threshold.features();
    println!("\n=== Thresholding Results ===");
    for feature in outputs {
        let Some(result) = patch.get(feature.feature_type, &feature.new_name) else {
            continue;
        };
        let path = output_path(&args, &feature.new_name, outputs.len() == 1);
        result
            .save(&path)
            .map_err(|e| anyhow::anyhow!("Failed to save {}: {}", path.display(), e))?;
        println!("  {} -> {}", feature, path.display());
    }

    Ok(())
}
