//! Specifies the CLI and handles arg parsing

use clap::{Parser, ValueEnum};
use std::{
	fmt::{Debug, Display},
	num::ParseFloatError,
	ops::RangeBounds,
	path::PathBuf,
	str::FromStr,
};

/// How atlas pixels are read
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum StrategyOption {
	/// Pseudo-colored atlas: cluster the palette and calibrate it against a table
	Classified,
	/// Grayscale atlas: read the gray level directly
	Direct,
}

/// Calibration tables shipped with the decoder
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum BuiltinTable {
	/// The 16-bin scale of the 2024 world atlas, with a border entry
	#[value(name = "16")]
	Sixteen,
	/// The original 8-color scale
	#[value(name = "8")]
	Eight,
}

/// Formats for the decoding statistics
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum StatsFormat {
	/// Human readable table with color swatches
	Text,
	/// JSON document
	Json,
}

/// Decode a light-pollution atlas into a grayscale lightmap for globe rendering.
///
/// Pseudo-colored atlases are sampled, clustered with k-means, and each cluster is bound to a
/// category of a calibration table in brightness order. Grayscale atlases are read directly.
#[allow(clippy::struct_excessive_bools)]
#[derive(Parser, Debug)]
#[command(version)]
pub struct Options {
	/// The path to the atlas image
	pub input: PathBuf,

	/// Where to write the lightmap; the format follows the file extension
	pub output: PathBuf,

	/// How to read the atlas
	#[arg(long, default_value = "classified")]
	pub strategy: StrategyOption,

	/// The number of clusters, which must match the number of table categories
	#[arg(short, default_value_t = 16)]
	pub k: u8,

	/// The number of trials of k-means to run
	///
	/// The trial with the lowest variance is picked.
	#[arg(short = 'n', long, default_value_t = 10)]
	pub trials: u32,

	/// The seed value used for choosing the starting centroids
	#[arg(long, default_value_t = 42)]
	pub seed: u64,

	/// The maximum number of iterations for each k-means trial
	#[arg(short = 'i', long, default_value_t = 300)]
	pub max_iter: u32,

	/// The threshold used to determine k-means convergence
	///
	/// Centroid movement is measured in normalized RGB units.
	#[arg(short = 'e', long, default_value_t = 1e-4, value_parser = parse_non_negative)]
	pub convergence_threshold: f32,

	/// The size of the resampled grid used for clustering, as WIDTHxHEIGHT
	#[arg(long, default_value = "1000x400", value_parser = parse_size)]
	pub sample_size: (u32, u32),

	/// A JSON calibration table to use instead of a built-in one
	#[arg(long, conflicts_with = "builtin_table")]
	pub table: Option<PathBuf>,

	/// The built-in calibration table to use
	#[arg(long, default_value = "16")]
	pub builtin_table: BuiltinTable,

	/// The raw gray level that maps to full intensity (direct strategy)
	#[arg(long, default_value_t = 37.0, value_parser = parse_positive)]
	pub max_raw: f32,

	/// The power applied to normalized gray levels (direct strategy)
	#[arg(long, default_value_t = 0.7, value_parser = parse_positive)]
	pub exponent: f32,

	/// Contrast around the pivot [default: 1.3 for classified, 1.2 for direct]
	#[arg(long, value_parser = parse_non_negative)]
	pub contrast: Option<f32>,

	/// The intensity left fixed by the contrast adjustment
	#[arg(long, default_value_t = 128.0, value_parser = parse_intensity)]
	pub pivot: f32,

	/// Multiplier applied after contrast
	#[arg(long, default_value_t = 1.0, value_parser = parse_non_negative)]
	pub brightness: f32,

	/// Gamma applied last; values above 1 brighten midtones
	#[arg(long, default_value_t = 1.0, value_parser = parse_positive)]
	pub gamma: f32,

	/// The resolution of the lightmap, as WIDTHxHEIGHT
	#[arg(long, default_value = "2000x1000", value_parser = parse_size)]
	pub output_size: (u32, u32),

	/// Keep the atlas resolution instead of resizing to --output-size
	#[arg(long)]
	pub no_resize: bool,

	/// Write a single-channel image instead of copying the intensity into RGB
	#[arg(long)]
	pub gray: bool,

	/// Print statistics about the clusters and the lightmap
	#[arg(long)]
	pub stats: Option<StatsFormat>,

	/// Print the calibration table in use as JSON
	#[arg(long)]
	pub print_table: bool,

	/// The number of threads to use
	///
	/// A value of 0 indicates to automatically choose the number of threads.
	#[cfg(feature = "threads")]
	#[arg(short, long, default_value_t = 0)]
	pub threads: u8,

	/// Print stage timings and debug logs
	#[arg(short, long)]
	pub verbose: bool,
}

/// Parse a float value and ensure it in the provided, valid range
fn parse_float_in_range<T>(s: &str, range: impl RangeBounds<T> + Debug) -> Result<T, String>
where
	T: FromStr<Err = ParseFloatError> + Display + PartialOrd,
{
	let value: T = s.parse().map_err(|e| format!("{e}"))?;
	if range.contains(&value) {
		Ok(value)
	} else {
		Err(format!("{value} is not in {range:?}"))
	}
}

/// Parse a float and ensure it is >= `0.0`
fn parse_non_negative(s: &str) -> Result<f32, String> {
	parse_float_in_range(s, 0.0..)
}

/// Parse a float and ensure it is > `0.0`
fn parse_positive(s: &str) -> Result<f32, String> {
	let value = parse_float_in_range(s, 0.0..)?;
	if value > 0.0 {
		Ok(value)
	} else {
		Err(format!("{value} is not positive"))
	}
}

/// Parse a float and ensure it is in `0.0..=255.0`
fn parse_intensity(s: &str) -> Result<f32, String> {
	parse_float_in_range(s, 0.0..=255.0)
}

/// Parse a `WIDTHxHEIGHT` pair with non-zero sides
fn parse_size(s: &str) -> Result<(u32, u32), String> {
	let (width, height) = s
		.split_once(['x', 'X'])
		.ok_or_else(|| format!("{s} is not of the form WIDTHxHEIGHT"))?;

	let width: u32 = width.trim().parse().map_err(|e| format!("invalid width: {e}"))?;
	let height: u32 = height.trim().parse().map_err(|e| format!("invalid height: {e}"))?;

	if width == 0 || height == 0 {
		Err(format!("{width}x{height} has a zero side"))
	} else {
		Ok((width, height))
	}
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
	use super::*;
	use clap::CommandFactory;

	#[test]
	fn command_is_valid() {
		Options::command().debug_assert();
	}

	#[test]
	fn sizes() {
		assert_eq!(parse_size("1000x400"), Ok((1000, 400)));
		assert_eq!(parse_size("20X10"), Ok((20, 10)));
		assert!(parse_size("1000").is_err());
		assert!(parse_size("0x400").is_err());
		assert!(parse_size("ax4").is_err());
	}

	#[test]
	fn float_ranges() {
		assert_eq!(parse_positive("0.7"), Ok(0.7));
		assert!(parse_positive("0").is_err());
		assert!(parse_positive("-1").is_err());
		assert_eq!(parse_non_negative("0"), Ok(0.0));
		assert!(parse_intensity("256").is_err());
		assert!(parse_non_negative("NaN").is_err());
	}

	#[test]
	fn defaults() {
		let options = Options::try_parse_from(["nightglow", "atlas.png", "lightmap.png"]).unwrap();
		assert_eq!(options.strategy, StrategyOption::Classified);
		assert_eq!(options.k, 16);
		assert_eq!(options.sample_size, (1000, 400));
		assert_eq!(options.output_size, (2000, 1000));
		assert_eq!(options.builtin_table, BuiltinTable::Sixteen);
		assert_eq!(options.contrast, None);
	}

	#[test]
	fn table_conflicts_with_builtin() {
		assert!(Options::try_parse_from([
			"nightglow",
			"atlas.png",
			"lightmap.png",
			"--table",
			"table.json",
			"--builtin-table",
			"8"
		])
		.is_err());
	}
}
