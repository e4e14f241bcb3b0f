//! Command line front end: decode, quantize, encode, report.

use std::{
    fs,
    path::PathBuf,
    time::{Instant, SystemTime, UNIX_EPOCH},
};

use anyhow::{Context, Result};
use clap::Parser;
use kquant::{Centroids, ClusterCount, PixelSlice};

/// Lossy image compression via data-parallel k-means color quantization.
#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// Image to quantize.
    input_file: PathBuf,

    /// Where to write the quantized image.
    #[arg(default_value = "compressed.png")]
    output_file: PathBuf,

    /// Number of palette colors (clusters), at least 2.
    #[arg(short = 'K', default_value_t = 64, value_parser = clap::value_parser!(u16).range(2..))]
    clusters: u16,

    /// Number of k-means iterations, at least 1.
    #[arg(short = 'I', default_value_t = 50, value_parser = clap::value_parser!(u32).range(1..))]
    iterations: u32,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let start = Instant::now();

    let img = image::open(&args.input_file)
        .with_context(|| format!("image load error: {}", args.input_file.display()))?
        .into_rgba8();
    let pixels = PixelSlice::try_from(&img).context("unsupported image size")?;

    let k = ClusterCount::try_from(args.clusters)?;
    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos() as u64);

    let centroids = Centroids::from_random_pixels(pixels, k, seed);
    let output = kquant::indexed_palette(pixels, args.iterations, centroids, seed)?;

    let quantized = kquant::to_rgba_image(&output, img.width(), img.height());
    quantized
        .save(&args.output_file)
        .with_context(|| format!("failed to save {}", args.output_file.display()))?;

    println!("Input file: {}", args.input_file.display());
    println!("Output file: {}", args.output_file.display());
    println!("I: {} K: {k}", args.iterations);
    println!("Time: {:.3}s", start.elapsed().as_secs_f64());

    let in_size = fs::metadata(&args.input_file)?.len();
    let out_size = fs::metadata(&args.output_file)?.len();
    if in_size > 0 {
        let reduction = 100.0 * (1.0 - out_size as f64 / in_size as f64);
        println!("File size reduction: {reduction:.2}%");
    }

    Ok(())
}
