//! The error type shared by every stage of the decoding pipeline

use thiserror::Error;

/// Errors that stop the decoding pipeline before any output is produced
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
	/// A resize target or input grid has a zero width or height
	#[error("invalid dimensions {width}x{height}: width and height must be non-zero")]
	InvalidDimension {
		/// Requested width
		width: u32,
		/// Requested height
		height: u32,
	},

	/// There were no pixels to cluster
	#[error("the sample set has no pixels to cluster")]
	EmptySample,

	/// More clusters were requested than there are distinct colors in the sample
	#[error("cannot form {k} clusters from only {distinct} distinct sampled colors")]
	DegenerateClustering {
		/// Requested number of clusters
		k: u8,
		/// Number of distinct colors in the sample set
		distinct: usize,
	},

	/// The number of clusters does not match the number of calibration categories
	#[error("calibration table has {categories} categories but {clusters} clusters were found")]
	CalibrationMismatch {
		/// Number of clusters
		clusters: usize,
		/// Number of categories in the calibration table
		categories: usize,
	},

	/// The calibration table cannot give a monotonic mapping
	#[error("invalid calibration table: {reason}")]
	InvalidTable {
		/// What is wrong with the table
		reason: String,
	},

	/// A numeric parameter is out of its valid range
	#[error("invalid value for {name}: {reason}")]
	InvalidParameter {
		/// Parameter name
		name: &'static str,
		/// Why the value was rejected
		reason: String,
	},

	/// A raw pixel buffer does not hold exactly width * height RGB triples
	#[error("malformed pixel grid: expected {expected} bytes, got {actual}")]
	MalformedGrid {
		/// Expected buffer length in bytes
		expected: usize,
		/// Actual buffer length in bytes
		actual: usize,
	},
}

impl Error {
	/// Shorthand for [`Error::InvalidParameter`]
	pub(crate) fn parameter(name: &'static str, reason: impl Into<String>) -> Self {
		Self::InvalidParameter { name, reason: reason.into() }
	}

	/// Shorthand for [`Error::InvalidTable`]
	pub(crate) fn table(reason: impl Into<String>) -> Self {
		Self::InvalidTable { reason: reason.into() }
	}
}
