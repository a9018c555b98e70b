//! Decode light-pollution atlas images into grayscale lightmaps.
//!
//! Atlases come in two flavors. Pseudo-colored atlases draw each light-pollution level
//! with a palette color, so the palette has to be recovered before anything can be read.
//! Grayscale atlases store the level itself in every channel.
//!
//! For pseudo-colored atlases the decoder:
//! 1. resamples the atlas to a smaller grid ([`sample`]),
//! 2. clusters the sampled colors with k-means ([`classify`]),
//! 3. binds each cluster to a category of a calibration table by brightness rank ([`calibrate`]),
//! 4. replaces every full-resolution pixel by its cluster's intensity ([`remap_classified`]),
//! 5. adjusts contrast and resizes to the output resolution ([`finish`]).
//!
//! Grayscale atlases skip straight to step 4 with [`remap_direct`].
//!
//! # Examples
//!
//! ## Decode a pseudo-colored atlas with the default settings.
//!
//! ```no_run
//! let atlas = image::open("world_atlas.png").unwrap().into_rgb8();
//! let decoded = nightglow::decode(&atlas, &nightglow::DecodeOptions::default()).unwrap();
//! decoded.rgb().save("lightmap.png").unwrap();
//! ```
//!
//! ## Decode a grayscale atlas.
//!
//! ```no_run
//! use nightglow::{DecodeOptions, DirectChannel, Strategy, ToneCurve};
//!
//! let atlas = image::open("world2024.png").unwrap().into_rgb8();
//! let options = DecodeOptions {
//! 	strategy: Strategy::DirectChannel(DirectChannel::default()),
//! 	tone: ToneCurve { contrast: 1.2, ..ToneCurve::identity() },
//! 	..DecodeOptions::default()
//! };
//! let decoded = nightglow::decode(&atlas, &options).unwrap();
//! ```
//!
//! ## Run the stages by hand and reuse the clustering with another table.
//!
//! ```no_run
//! use nightglow::{CalibrationTable, FilterType, KmeansOptions, SampleSize};
//!
//! let atlas = image::open("world_atlas.png").unwrap().into_rgb8();
//! let samples = nightglow::sample(&atlas, SampleSize::default(), FilterType::Lanczos3).unwrap();
//!
//! let options = KmeansOptions { k: 8, ..KmeansOptions::default() };
//! let centroids = nightglow::classify(samples.pixels(), &options).unwrap();
//! let calibration = nightglow::calibrate(centroids, &CalibrationTable::cinzano8()).unwrap();
//! let lightmap = nightglow::remap_classified(&atlas, &calibration).unwrap();
//! ```
//!
//! # Arguments
//!
//! ## Sample Size
//!
//! Clustering only sees a resampled copy of the atlas. The default of 1000x400 keeps rare
//! palette entries while staying fast. Smaller samples cluster faster but may merge or
//! lose the least common colors.
//!
//! ## K
//!
//! The number of clusters, which must equal the number of categories in the calibration table.
//! The sample must hold at least `k` distinct colors.
//!
//! ## Trials and Seed
//!
//! k-means is run `trials` times from k-means++ starting points and the trial with the lowest
//! variance is kept. Trial `i` is seeded with `seed ^ i`, so a given seed always gives the
//! same clusters, with or without the `threads` feature.
//!
//! ## Calibration Table
//!
//! The table lists categories from darkest to brightest. Clusters are sorted by brightness
//! (the mean of their RGB channels) and the `n`-th darkest cluster gets the `n`-th category.
//! Border categories mark non-data pixels like coastlines and always give intensity 0.
//!
//! ## Tone Curve
//!
//! Contrast, brightness and gamma are explicit factors; nothing is estimated from the image,
//! so the mapping from category to output intensity stays monotonic. Intensity 0 is left at 0
//! by every curve, which keeps unlit and border pixels dark.

#![deny(unsafe_code)]
#![warn(clippy::pedantic, clippy::cargo)]
#![warn(clippy::use_debug, clippy::dbg_macro, clippy::todo, clippy::unimplemented)]
#![warn(clippy::unwrap_used, clippy::unwrap_in_result)]
#![warn(clippy::unneeded_field_pattern, clippy::rest_pat_in_fully_bound_structs)]
#![warn(clippy::unnecessary_self_imports)]
#![warn(clippy::str_to_string, clippy::string_to_string, clippy::string_slice)]
#![warn(missing_docs, clippy::missing_docs_in_private_items, rustdoc::all)]
#![warn(clippy::float_cmp_const, clippy::lossy_float_literal)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::enum_glob_use)]
#![allow(clippy::unreadable_literal)]

mod calibrate;
mod error;
mod kmeans;
mod pipeline;
mod remap;
mod sample;
mod tone;

pub use calibrate::{calibrate, Binding, BrightnessClass, Calibration, CalibrationTable, Category, RatioRange};
pub use error::Error;
pub use image::imageops::FilterType;
pub use kmeans::{classify, Centroids, KmeansOptions};
pub use pipeline::{decode, BrightnessTier, ClusterStats, ColorCount, DecodeOptions, Decoded, Diagnostics};
pub use remap::{remap, remap_classified, remap_direct, DirectChannel, Strategy};
pub use sample::{pixel_grid, resize_gray, sample, SampleSet, SampleSize};
pub use tone::{broadcast_rgb, finish, ToneCurve};
