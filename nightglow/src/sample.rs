//! Grid construction and resampling
//!
//! The sampler only ever produces copies: the full-resolution grid handed to the pipeline is never modified.

use crate::Error;
use image::{imageops, imageops::FilterType, GrayImage, ImageBuffer, Pixel, RgbImage};
use palette::Srgb;

/// Width and height of a resampled grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleSize {
	/// Width in pixels
	pub width: u32,
	/// Height in pixels
	pub height: u32,
}

impl SampleSize {
	/// Create a new [`SampleSize`]
	#[must_use]
	pub const fn new(width: u32, height: u32) -> Self {
		Self { width, height }
	}

	/// Number of pixels in a grid of this size
	#[must_use]
	pub fn pixels(self) -> u64 {
		u64::from(self.width) * u64::from(self.height)
	}

	/// Fails with [`Error::InvalidDimension`] if either side is zero
	pub(crate) fn validate(self) -> Result<Self, Error> {
		if self.width == 0 || self.height == 0 {
			Err(Error::InvalidDimension { width: self.width, height: self.height })
		} else {
			Ok(self)
		}
	}
}

impl Default for SampleSize {
	/// 1000x400, enough to keep rare palette entries while clustering quickly
	fn default() -> Self {
		Self::new(1000, 400)
	}
}

/// A reduced copy of a pixel grid used only for palette analysis
#[derive(Debug, Clone)]
pub struct SampleSet {
	/// Resampled pixels
	image: RgbImage,
}

impl SampleSet {
	/// The sampled pixels in row-major order
	#[must_use]
	pub fn pixels(&self) -> &[Srgb<u8>] {
		palette::cast::from_component_slice(self.image.as_raw())
	}

	/// Number of sampled pixels
	#[must_use]
	pub fn len(&self) -> usize {
		self.pixels().len()
	}

	/// Whether there are no sampled pixels
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.image.as_raw().is_empty()
	}

	/// Dimensions of the sample grid
	#[must_use]
	pub fn dimensions(&self) -> (u32, u32) {
		self.image.dimensions()
	}
}

/// Build a pixel grid from a raw row-major RGB buffer
///
/// # Errors
/// [`Error::InvalidDimension`] if either side is zero and
/// [`Error::MalformedGrid`] if `raw` does not hold exactly `width * height` RGB triples.
pub fn pixel_grid(width: u32, height: u32, raw: Vec<u8>) -> Result<RgbImage, Error> {
	SampleSize::new(width, height).validate()?;

	#[allow(clippy::cast_possible_truncation)]
	let expected = (SampleSize::new(width, height).pixels() * 3) as usize;
	let actual = raw.len();
	if actual != expected {
		return Err(Error::MalformedGrid { expected, actual });
	}

	ImageBuffer::from_raw(width, height, raw).ok_or(Error::MalformedGrid { expected, actual })
}

/// Resize any image buffer, copying it unchanged if it already has the target size
fn resize<P>(image: &ImageBuffer<P, Vec<P::Subpixel>>, size: SampleSize, filter: FilterType) -> ImageBuffer<P, Vec<P::Subpixel>>
where
	P: Pixel + 'static,
	P::Subpixel: 'static,
{
	if image.dimensions() == (size.width, size.height) {
		image.clone()
	} else {
		imageops::resize(image, size.width, size.height, filter)
	}
}

/// Produce the sample set used for clustering
///
/// An empty grid gives an empty sample set, which the classifier rejects.
///
/// # Errors
/// [`Error::InvalidDimension`] if the target size has a zero side.
pub fn sample(grid: &RgbImage, size: SampleSize, filter: FilterType) -> Result<SampleSet, Error> {
	let size = size.validate()?;

	let image = if grid.as_raw().is_empty() {
		RgbImage::new(0, 0)
	} else {
		resize(grid, size, filter)
	};

	tracing::debug!(
		from = ?grid.dimensions(),
		to = ?image.dimensions(),
		?filter,
		"sampled grid for clustering"
	);

	Ok(SampleSet { image })
}

/// Resize a single-channel grid with the same filter kind used for sampling
///
/// # Errors
/// [`Error::InvalidDimension`] if the target size has a zero side.
pub fn resize_gray(lightmap: &GrayImage, size: SampleSize, filter: FilterType) -> Result<GrayImage, Error> {
	Ok(resize(lightmap, size.validate()?, filter))
}
