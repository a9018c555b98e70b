//! Decode a light-pollution atlas into a grayscale lightmap for globe rendering.

#![deny(unsafe_code, unsafe_op_in_unsafe_fn)]
#![warn(
    clippy::pedantic,
    clippy::cargo,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::todo,
    clippy::unimplemented,
    clippy::unwrap_used,
    clippy::unwrap_in_result,
    clippy::unneeded_field_pattern,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::unnecessary_self_imports,
    clippy::str_to_string,
    clippy::string_to_string,
    clippy::string_slice,
    missing_docs,
    clippy::missing_docs_in_private_items,
    rustdoc::all,
    clippy::float_cmp_const,
    clippy::lossy_float_literal
)]
#![allow(
    clippy::doc_markdown,
    clippy::module_name_repetitions,
    clippy::missing_panics_doc,
    clippy::unreadable_literal
)]

mod cli;

#[allow(clippy::wildcard_imports)]
use cli::*;

use std::{
    path::{Path, PathBuf},
    process::ExitCode,
    time::Instant,
};

use clap::Parser;
use colored::Colorize;
use image::RgbImage;
use nightglow::{
    CalibrationTable, DecodeOptions, Decoded, DirectChannel, FilterType, KmeansOptions,
    SampleSize, Strategy, ToneCurve,
};
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Record the running time of a function and print the elapsed time
macro_rules! time {
    ($name: literal, $verbose: expr, $func_call: expr) => {{
        let start = Instant::now();
        let result = $func_call;
        if $verbose {
            println!("{} took {}ms", $name, start.elapsed().as_millis());
        }
        result
    }};
}

/// Everything that can stop a run
#[derive(Debug, Error)]
enum AppError {
    /// Failed to read or decode the atlas image
    #[error("Failed to load the atlas image: {0}")]
    ImageLoad(#[source] image::ImageError),
    /// Failed to encode or write the lightmap
    #[error("Failed to save the lightmap: {0}")]
    ImageSave(#[source] image::ImageError),
    /// Failed to read the calibration table file
    #[error("Failed to read the calibration table {}: {source}", path.display())]
    TableRead {
        /// The table path
        path: PathBuf,
        /// The IO error
        source: std::io::Error,
    },
    /// The calibration table is not valid JSON or not a valid table
    #[error("Failed to parse the calibration table: {0}")]
    TableParse(#[source] serde_json::Error),
    /// Failed to serialize the calibration table
    #[error("Failed to write the calibration table: {0}")]
    TableWrite(#[source] serde_json::Error),
    /// Failed to serialize statistics
    #[error("Failed to write statistics: {0}")]
    Stats(#[source] serde_json::Error),
    /// The decoder rejected the atlas or the parameters
    #[error(transparent)]
    Decode(#[from] nightglow::Error),
    /// The thread pool could not be created
    #[cfg(feature = "threads")]
    #[error("Failed to create the thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

fn main() -> ExitCode {
    let options = Options::parse();

    init_logging(options.verbose);

    let result = run_decode_atlas(&options);

    // Returning Result<_> uses Debug printing instead of Display
    if let Err(e) = result {
        eprintln!("{e}");
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// Install a stderr log subscriber honoring `RUST_LOG`
fn init_logging(verbose: bool) {
    let default = if verbose {
        "nightglow=debug"
    } else {
        "nightglow=warn"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_writer(std::io::stderr),
        )
        .init();
}

/// Builds a thread pool and then runs `decode_atlas`
#[cfg(feature = "threads")]
fn run_decode_atlas(options: &Options) -> Result<(), AppError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(usize::from(options.threads))
        .build()?;

    pool.install(|| decode_atlas(options))
}

/// Runs `decode_atlas` on a single thread
#[cfg(not(feature = "threads"))]
fn run_decode_atlas(options: &Options) -> Result<(), AppError> {
    decode_atlas(options)
}

/// Load an atlas, decode it, write the lightmap and print what was asked for
fn decode_atlas(options: &Options) -> Result<(), AppError> {
    let decode_options = decode_options(options)?;

    if options.print_table {
        println!(
            "{}",
            decode_options.table.to_json().map_err(AppError::TableWrite)?
        );
    }

    // Input
    let atlas = time!("Image loading", options.verbose, load_image(&options.input))?;
    if options.verbose {
        println!("Loaded a {}x{} atlas", atlas.width(), atlas.height());
    }

    // Processing
    let decoded = time!(
        "Decoding",
        options.verbose,
        nightglow::decode(&atlas, &decode_options)
    )?;

    // Output
    time!(
        "Saving",
        options.verbose,
        save_lightmap(&decoded, &options.output, options.gray)
    )?;

    match options.stats {
        Some(StatsFormat::Text) => print_stats(&decoded),
        Some(StatsFormat::Json) => println!(
            "{}",
            serde_json::to_string_pretty(&decoded.diagnostics).map_err(AppError::Stats)?
        ),
        None => (),
    }

    Ok(())
}

/// Read a calibration table from a JSON file
fn load_table(path: &Path) -> Result<CalibrationTable, AppError> {
    let json = std::fs::read_to_string(path).map_err(|source| AppError::TableRead {
        path: path.to_owned(),
        source,
    })?;

    let table = CalibrationTable::from_json(&json).map_err(AppError::TableParse)?;
    tracing::debug!(path = %path.display(), categories = table.len(), "loaded calibration table");
    Ok(table)
}

/// Translate the command line into decoder options
fn decode_options(options: &Options) -> Result<DecodeOptions, AppError> {
    let table = match &options.table {
        Some(path) => load_table(path)?,
        None => match options.builtin_table {
            BuiltinTable::Sixteen => CalibrationTable::cinzano16(),
            BuiltinTable::Eight => CalibrationTable::cinzano8(),
        },
    };

    let (strategy, default_contrast) = match options.strategy {
        StrategyOption::Classified => (Strategy::Classified, 1.3),
        StrategyOption::Direct => (
            Strategy::DirectChannel(DirectChannel {
                max_raw: options.max_raw,
                exponent: options.exponent,
            }),
            1.2,
        ),
    };

    let (sample_width, sample_height) = options.sample_size;

    Ok(DecodeOptions {
        strategy,
        sample_size: SampleSize::new(sample_width, sample_height),
        filter: FilterType::Lanczos3,
        kmeans: KmeansOptions {
            k: options.k,
            trials: options.trials,
            convergence_threshold: options.convergence_threshold,
            max_iter: options.max_iter,
            seed: options.seed,
        },
        table,
        tone: ToneCurve {
            contrast: options.contrast.unwrap_or(default_contrast),
            pivot: options.pivot,
            brightness: options.brightness,
            gamma: options.gamma,
        },
        output_size: if options.no_resize {
            None
        } else {
            Some(options.output_size)
        },
    })
}

/// Load the image at the given path as 8-bit RGB
fn load_image(path: &Path) -> Result<RgbImage, AppError> {
    Ok(image::open(path).map_err(AppError::ImageLoad)?.into_rgb8())
}

/// Write the lightmap as a single channel or broadcast into RGB
fn save_lightmap(decoded: &Decoded, path: &Path, gray: bool) -> Result<(), AppError> {
    let saved = if gray {
        decoded.lightmap.save(path)
    } else {
        decoded.rgb().save(path)
    };
    saved.map_err(AppError::ImageSave)
}

/// Print the per-cluster table and lightmap summary
fn print_stats(decoded: &Decoded) {
    let diagnostics = &decoded.diagnostics;

    if let (Some(distinct), Some(iterations), Some(variance)) = (
        diagnostics.sample_distinct_colors,
        diagnostics.iterations,
        diagnostics.variance,
    ) {
        println!("Sample had {distinct} distinct colors");
        println!("k-means took {iterations} iterations with a variance of {variance:.4}");
        println!();
    }

    if !diagnostics.top_colors.is_empty() {
        println!("Most frequent sampled colors:");
        for (i, count) in diagnostics.top_colors.iter().enumerate() {
            let color = count.color;
            println!(
                "{:>2}. {} {:X} {:>10} px ({:>5.2}%)",
                i + 1,
                "   ".on_truecolor(color.red, color.green, color.blue),
                color,
                count.pixels,
                count.percentage,
            );
        }
        println!();
    }

    if !diagnostics.brightness_tiers.is_empty() {
        println!("Brightness tiers:");
        for tier in &diagnostics.brightness_tiers {
            println!(
                "Tier {} (~{:>3}): {:>4} colors {:>10} px ({:>5.2}%)",
                tier.tier,
                u16::from(tier.tier) * 32 + 16,
                tier.colors,
                tier.pixels,
                tier.percentage,
            );
        }
        println!();
    }

    for cluster in &diagnostics.clusters {
        let binding = &cluster.binding;
        let color = binding.centroid;
        let intensity = if binding.category.border {
            "border".to_owned()
        } else {
            binding.category.intensity.to_string()
        };

        println!(
            "{:>2} {} {:X} {:>6.1} {:<12} {:>6.2}% {:>10} px  {:<16} {:<14} -> {}",
            binding.rank,
            "   ".on_truecolor(color.red, color.green, color.blue),
            color,
            binding.brightness,
            binding.class.to_string(),
            binding.percentage,
            cluster.pixels,
            binding.category.name,
            binding.category.ratio.to_string(),
            intensity,
        );
    }

    if !diagnostics.clusters.is_empty() {
        println!();
    }

    let (width, height) = diagnostics.output_size;
    println!("Lightmap: {width}x{height}");
    println!("Intensity levels: {}", diagnostics.intensity_levels);
    println!("Light coverage: {:.1}%", diagnostics.coverage);
}
