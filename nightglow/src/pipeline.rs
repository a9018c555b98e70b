//! The full decoding pipeline and its diagnostics

use crate::{
	calibrate, classify, finish, remap, sample, Binding, Calibration, CalibrationTable, Error, KmeansOptions, SampleSize,
	Strategy, ToneCurve,
};
use image::{imageops::FilterType, GrayImage, RgbImage};
use palette::Srgb;
use serde::Serialize;
use std::collections::HashMap;

/// Everything needed to decode an atlas
#[derive(Debug, Clone)]
pub struct DecodeOptions {
	/// How pixels are converted to intensities
	pub strategy: Strategy,
	/// Size of the grid used for clustering
	pub sample_size: SampleSize,
	/// Filter used for sampling and for the final resize
	pub filter: FilterType,
	/// Clustering parameters
	pub kmeans: KmeansOptions,
	/// Categories bound to clusters, darkest first
	pub table: CalibrationTable,
	/// Final tone adjustment
	pub tone: ToneCurve,
	/// Output resolution, or `None` to keep the atlas resolution
	pub output_size: Option<(u32, u32)>,
}

impl Default for DecodeOptions {
	fn default() -> Self {
		Self {
			strategy: Strategy::Classified,
			sample_size: SampleSize::default(),
			filter: FilterType::Lanczos3,
			kmeans: KmeansOptions::default(),
			table: CalibrationTable::cinzano16(),
			tone: ToneCurve::default(),
			output_size: Some((2000, 1000)),
		}
	}
}

/// Statistics for one cluster
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterStats {
	/// The cluster's calibration
	#[serde(flatten)]
	pub binding: Binding,
	/// Number of full-resolution pixels nearest to the cluster
	pub pixels: u64,
}

/// A sampled color and how often it occurred
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColorCount {
	/// The exact sampled color
	pub color: Srgb<u8>,
	/// Number of sampled pixels with this color
	pub pixels: u64,
	/// Share of the sample set, in percent
	pub percentage: f64,
}

/// Sampled colors grouped by their channel mean in steps of 32
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BrightnessTier {
	/// `0..=7`, the channel mean divided by 32
	pub tier: u8,
	/// Number of distinct colors in the tier
	pub colors: usize,
	/// Number of sampled pixels in the tier
	pub pixels: u64,
	/// Share of the sample set, in percent
	pub percentage: f64,
}

/// What the decoder saw and produced
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostics {
	/// `"classified"` or `"direct"`
	pub strategy: &'static str,
	/// Size of the input grid
	pub input_size: (u32, u32),
	/// Size of the output lightmap
	pub output_size: (u32, u32),
	/// Number of distinct colors in the sample set
	#[serde(skip_serializing_if = "Option::is_none")]
	pub sample_distinct_colors: Option<usize>,
	/// The most frequent sampled colors, most frequent first; empty for the direct strategy
	pub top_colors: Vec<ColorCount>,
	/// Non-empty brightness tiers of the sample set, darkest first; empty for the direct strategy
	pub brightness_tiers: Vec<BrightnessTier>,
	/// Iterations of the best k-means trial
	#[serde(skip_serializing_if = "Option::is_none")]
	pub iterations: Option<u32>,
	/// Within-cluster variance of the best k-means trial
	#[serde(skip_serializing_if = "Option::is_none")]
	pub variance: Option<f64>,
	/// Per-cluster statistics from darkest to brightest; empty for the direct strategy
	pub clusters: Vec<ClusterStats>,
	/// Number of distinct intensities in the output lightmap
	pub intensity_levels: usize,
	/// Share of non-zero output pixels, in percent
	pub coverage: f64,
}

/// The output of [`decode`]
#[derive(Debug, Clone)]
pub struct Decoded {
	/// The finished single-channel lightmap
	pub lightmap: GrayImage,
	/// Statistics about the run
	pub diagnostics: Diagnostics,
}

impl Decoded {
	/// The lightmap with its intensity copied into all three channels
	#[must_use]
	pub fn rgb(&self) -> RgbImage {
		crate::broadcast_rgb(&self.lightmap)
	}
}

/// Number of colors reported in [`Diagnostics::top_colors`]
const TOP_COLORS: usize = 20;

/// Color frequencies of the sample set
#[derive(Debug, Clone, PartialEq)]
struct ColorCensus {
	/// Number of distinct sampled colors
	distinct: usize,
	/// See [`Diagnostics::top_colors`]
	top_colors: Vec<ColorCount>,
	/// See [`Diagnostics::brightness_tiers`]
	brightness_tiers: Vec<BrightnessTier>,
}

impl ColorCensus {
	/// Count the sampled colors; ties keep the order of first appearance
	fn of(samples: &[Srgb<u8>]) -> Self {
		let mut index = HashMap::new();
		let mut counts: Vec<(Srgb<u8>, u64)> = Vec::new();
		for &color in samples {
			let i = *index.entry(color.into_u32::<palette::rgb::channels::Rgba>()).or_insert_with(|| {
				counts.push((color, 0));
				counts.len() - 1
			});
			counts[i].1 += 1;
		}

		#[allow(clippy::cast_precision_loss)]
		let total = samples.len() as f64;
		#[allow(clippy::cast_precision_loss)]
		let percentage = |pixels: u64| if total == 0.0 { 0.0 } else { 100.0 * pixels as f64 / total };

		let mut tiers = [(0, 0); 8];
		for &(color, pixels) in &counts {
			let sum = u16::from(color.red) + u16::from(color.green) + u16::from(color.blue);
			let tier = &mut tiers[usize::from(sum / 96)];
			tier.0 += 1;
			tier.1 += pixels;
		}

		let brightness_tiers = (0..)
			.zip(tiers)
			.filter(|&(_, (colors, _))| colors > 0)
			.map(|(tier, (colors, pixels))| BrightnessTier { tier, colors, pixels, percentage: percentage(pixels) })
			.collect();

		let distinct = counts.len();
		counts.sort_by(|x, y| y.1.cmp(&x.1));
		let top_colors = counts
			.into_iter()
			.take(TOP_COLORS)
			.map(|(color, pixels)| ColorCount { color, pixels, percentage: percentage(pixels) })
			.collect();

		Self { distinct, top_colors, brightness_tiers }
	}
}

/// Per-cluster statistics with the full-resolution pixels nearest to each cluster
fn cluster_stats(grid: &RgbImage, calibration: &Calibration) -> Vec<ClusterStats> {
	let centroids = calibration.centroids();
	let pixels: &[Srgb<u8>] = palette::cast::from_component_slice(grid.as_raw());

	let mut nearest = HashMap::new();
	let mut counts = vec![0; centroids.len()];
	for &pixel in pixels {
		let cluster = *nearest
			.entry(pixel.into_u32::<palette::rgb::channels::Rgba>())
			.or_insert_with(|| centroids.nearest(pixel));

		counts[usize::from(cluster)] += 1;
	}

	calibration
		.bindings()
		.iter()
		.map(|binding| ClusterStats {
			binding: binding.clone(),
			pixels: counts[usize::from(binding.cluster)],
		})
		.collect()
}

/// Number of distinct intensities and the percentage of non-zero pixels
fn coverage(lightmap: &GrayImage) -> (usize, f64) {
	let mut histogram = [0_u64; 256];
	for pixel in lightmap.pixels() {
		histogram[usize::from(pixel.0[0])] += 1;
	}

	let levels = histogram.iter().filter(|&&count| count > 0).count();
	let total: u64 = histogram.iter().sum();

	#[allow(clippy::cast_precision_loss)]
	let coverage = if total == 0 {
		0.0
	} else {
		100.0 * (total - histogram[0]) as f64 / total as f64
	};

	(levels, coverage)
}

/// Check every option before any pixel work
fn validate(grid: &RgbImage, options: &DecodeOptions) -> Result<(), Error> {
	let (width, height) = grid.dimensions();
	SampleSize::new(width, height).validate()?;
	options.tone.validate()?;
	if let Some((width, height)) = options.output_size {
		SampleSize::new(width, height).validate()?;
	}

	match options.strategy {
		Strategy::Classified => {
			options.sample_size.validate()?;
			options.kmeans.validate()?;
			let clusters = usize::from(options.kmeans.k);
			if clusters == options.table.len() {
				Ok(())
			} else {
				Err(Error::CalibrationMismatch { clusters, categories: options.table.len() })
			}
		},
		Strategy::DirectChannel(params) => params.validate(),
	}
}

/// Decode an atlas into a lightmap
///
/// The classified strategy samples, clusters, calibrates, remaps and then tone maps.
/// The direct-channel strategy only remaps and tone maps.
/// Options that do not depend on the pixels, including `k` against the table length,
/// are checked before any pixel work starts.
///
/// # Errors
/// [`Error::InvalidDimension`] for an empty grid or a zero-sided sample or output size,
/// [`Error::InvalidParameter`] for invalid clustering, remapping or tone parameters,
/// [`Error::CalibrationMismatch`] if `k` differs from the table length,
/// and any error from [`classify`].
pub fn decode(grid: &RgbImage, options: &DecodeOptions) -> Result<Decoded, Error> {
	validate(grid, options)?;

	let (calibration, census) = match options.strategy {
		Strategy::Classified => {
			let samples = sample(grid, options.sample_size, options.filter)?;
			let census = ColorCensus::of(samples.pixels());
			let centroids = classify(samples.pixels(), &options.kmeans)?;
			(Some(calibrate(centroids, &options.table)?), Some(census))
		},
		Strategy::DirectChannel(_) => (None, None),
	};

	let raw = remap(grid, options.strategy, calibration.as_ref())?;
	let lightmap = finish(&raw, &options.tone, options.output_size, options.filter)?;
	let (intensity_levels, coverage) = coverage(&lightmap);

	let (sample_distinct_colors, top_colors, brightness_tiers) = match census {
		Some(ColorCensus { distinct, top_colors, brightness_tiers }) => (Some(distinct), top_colors, brightness_tiers),
		None => (None, Vec::new(), Vec::new()),
	};

	let diagnostics = Diagnostics {
		strategy: options.strategy.name(),
		input_size: grid.dimensions(),
		output_size: lightmap.dimensions(),
		sample_distinct_colors,
		top_colors,
		brightness_tiers,
		iterations: calibration.as_ref().map(|calibration| calibration.centroids().iterations()),
		variance: calibration.as_ref().map(|calibration| calibration.centroids().variance()),
		clusters: calibration
			.as_ref()
			.map(|calibration| cluster_stats(grid, calibration))
			.unwrap_or_default(),
		intensity_levels,
		coverage,
	};

	tracing::debug!(
		strategy = diagnostics.strategy,
		levels = diagnostics.intensity_levels,
		coverage = diagnostics.coverage,
		"decoded atlas"
	);

	Ok(Decoded { lightmap, diagnostics })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
	use super::*;
	use crate::DirectChannel;
	use image::{Luma, Rgb};

	#[test]
	fn empty_grid_is_rejected() {
		assert_eq!(
			decode(&RgbImage::new(0, 0), &DecodeOptions::default()).unwrap_err(),
			Error::InvalidDimension { width: 0, height: 0 }
		);
	}

	#[test]
	fn parameters_are_checked_before_work() {
		let grid = RgbImage::new(4, 4);

		let options = DecodeOptions {
			tone: ToneCurve { gamma: 0.0, ..ToneCurve::identity() },
			..DecodeOptions::default()
		};
		assert!(matches!(decode(&grid, &options), Err(Error::InvalidParameter { name: "gamma", .. })));

		let options = DecodeOptions { output_size: Some((10, 0)), ..DecodeOptions::default() };
		assert!(matches!(decode(&grid, &options), Err(Error::InvalidDimension { .. })));
	}

	#[test]
	fn single_color_grid_is_degenerate() {
		let grid = RgbImage::from_pixel(8, 8, Rgb([30, 30, 30]));
		let options = DecodeOptions { sample_size: SampleSize::new(8, 8), ..DecodeOptions::default() };
		assert_eq!(decode(&grid, &options).unwrap_err(), Error::DegenerateClustering { k: 16, distinct: 1 });
	}

	#[test]
	fn table_mismatch_is_reported_before_clustering() {
		// three colors cannot form 16 clusters, but the table length is checked first
		let grid = RgbImage::from_fn(4, 4, |x, _| Rgb([[0, 0, 0], [90, 90, 90], [200, 200, 200], [200, 200, 200]][x as usize]));
		let options = DecodeOptions {
			sample_size: SampleSize::new(4, 4),
			table: CalibrationTable::cinzano8(),
			..DecodeOptions::default()
		};
		assert_eq!(
			decode(&grid, &options).unwrap_err(),
			Error::CalibrationMismatch { clusters: 16, categories: 8 }
		);

		let options = DecodeOptions {
			kmeans: KmeansOptions { trials: 0, ..KmeansOptions::default() },
			..options
		};
		assert!(matches!(decode(&grid, &options), Err(Error::InvalidParameter { name: "trials", .. })));
	}

	#[test]
	fn census_counts_sampled_colors() {
		let mut samples = vec![Srgb::new(0, 0, 0); 5];
		samples.extend([Srgb::new(255, 255, 255); 3]);
		samples.extend([Srgb::new(40, 40, 40), Srgb::new(10, 50, 40), Srgb::new(250, 140, 0)]);
		samples.extend([Srgb::new(30, 30, 30); 1]);

		let census = ColorCensus::of(&samples);
		assert_eq!(census.distinct, 6);

		let top = census.top_colors.iter().map(|count| (count.color, count.pixels)).collect::<Vec<_>>();
		assert_eq!(
			top,
			vec![
				(Srgb::new(0, 0, 0), 5),
				(Srgb::new(255, 255, 255), 3),
				(Srgb::new(40, 40, 40), 1),
				(Srgb::new(10, 50, 40), 1),
				(Srgb::new(250, 140, 0), 1),
				(Srgb::new(30, 30, 30), 1),
			]
		);
		approx::assert_relative_eq!(census.top_colors[0].percentage, 100.0 * 5.0 / 12.0);

		// channel sums 0 and 90 fall in tier 0, 100 and 120 in tier 1, 390 in tier 4, 765 in tier 7
		let tiers = census
			.brightness_tiers
			.iter()
			.map(|tier| (tier.tier, tier.colors, tier.pixels))
			.collect::<Vec<_>>();
		assert_eq!(tiers, vec![(0, 2, 6), (1, 2, 2), (4, 1, 1), (7, 1, 3)]);
		approx::assert_relative_eq!(census.brightness_tiers.iter().map(|tier| tier.percentage).sum::<f64>(), 100.0);
	}

	#[test]
	fn census_keeps_only_the_most_frequent_colors() {
		#[allow(clippy::cast_possible_truncation)]
		let samples = (0..30_u32)
			.flat_map(|i| std::iter::repeat(Srgb::new(i as u8 * 8, 0, 0)).take(i as usize + 1))
			.collect::<Vec<_>>();

		let census = ColorCensus::of(&samples);
		assert_eq!(census.distinct, 30);
		assert_eq!(census.top_colors.len(), TOP_COLORS);
		assert_eq!(census.top_colors[0].pixels, 30);
		assert_eq!(census.top_colors[TOP_COLORS - 1].pixels, 11);
	}

	#[test]
	fn direct_strategy_has_no_clusters() {
		#[allow(clippy::cast_possible_truncation)]
		let grid = RgbImage::from_fn(8, 4, |x, _| Rgb([(x * 5) as u8; 3]));
		let options = DecodeOptions {
			strategy: Strategy::DirectChannel(DirectChannel::default()),
			tone: ToneCurve::identity(),
			output_size: None,
			..DecodeOptions::default()
		};

		let decoded = decode(&grid, &options).unwrap();
		assert_eq!(decoded.lightmap.dimensions(), (8, 4));
		assert_eq!(decoded.diagnostics.strategy, "direct");
		assert!(decoded.diagnostics.clusters.is_empty());
		assert!(decoded.diagnostics.top_colors.is_empty());
		assert!(decoded.diagnostics.brightness_tiers.is_empty());
		assert_eq!(decoded.diagnostics.iterations, None);
		assert_eq!(decoded.lightmap.get_pixel(0, 0).0[0], 0);
	}

	#[test]
	fn coverage_counts_non_zero_pixels() {
		let lightmap = GrayImage::from_fn(4, 1, |x, _| Luma([if x < 3 { 0 } else { 9 }]));
		let (levels, coverage) = coverage(&lightmap);
		assert_eq!(levels, 2);
		approx::assert_relative_eq!(coverage, 25.0);
	}
}
