//! Per-pixel conversion of a full-resolution atlas into a lightmap

use crate::{Calibration, Error};
use image::{GrayImage, ImageBuffer, RgbImage};
use palette::Srgb;
use std::collections::HashMap;

/// Parameters for atlases that already store intensity as gray levels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectChannel {
	/// The raw value that maps to full intensity; larger values are clamped
	pub max_raw: f32,
	/// Power applied to the normalized value; below 1 brightens midtones
	pub exponent: f32,
}

impl Default for DirectChannel {
	/// The grayscale 2024 atlas stores levels `0..=37`
	fn default() -> Self {
		Self { max_raw: 37.0, exponent: 0.7 }
	}
}

impl DirectChannel {
	/// Check that both parameters are finite and positive
	///
	/// # Errors
	/// [`Error::InvalidParameter`] naming the offending parameter.
	pub fn validate(&self) -> Result<(), Error> {
		if !(self.max_raw.is_finite() && self.max_raw > 0.0) {
			return Err(Error::parameter("max raw value", format!("{} is not a positive number", self.max_raw)));
		}
		if !(self.exponent.is_finite() && self.exponent > 0.0) {
			return Err(Error::parameter("exponent", format!("{} is not a positive number", self.exponent)));
		}
		Ok(())
	}

	/// The intensity for a raw channel value
	#[must_use]
	pub fn intensity(&self, raw: u8) -> u8 {
		let normalized = (f32::from(raw) / self.max_raw).clamp(0.0, 1.0);

		// in 0.0..=255.0
		#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
		{
			(normalized.powf(self.exponent) * 255.0) as u8
		}
	}
}

/// How atlas pixels are turned into intensities
///
/// The caller picks the strategy for the atlas format at hand; it is never guessed from the image.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Strategy {
	/// Pseudo-colored atlases: nearest cluster, then its calibrated category
	#[default]
	Classified,
	/// Grayscale atlases: power curve over the raw gray level
	DirectChannel(DirectChannel),
}

impl Strategy {
	/// Short name used in diagnostics
	#[must_use]
	pub const fn name(&self) -> &'static str {
		match self {
			Self::Classified => "classified",
			Self::DirectChannel(_) => "direct",
		}
	}
}

/// Packed lookup key for a color
fn key(color: Srgb<u8>) -> u32 {
	color.into_u32::<palette::rgb::channels::Rgba>()
}

/// Apply `intensity` to every pixel
#[cfg(not(feature = "threads"))]
fn map_pixels(pixels: &[Srgb<u8>], intensity: impl Fn(Srgb<u8>) -> u8 + Sync) -> Vec<u8> {
	pixels.iter().map(|&pixel| intensity(pixel)).collect()
}

/// Apply `intensity` to every pixel
#[cfg(feature = "threads")]
fn map_pixels(pixels: &[Srgb<u8>], intensity: impl Fn(Srgb<u8>) -> u8 + Sync) -> Vec<u8> {
	use rayon::prelude::*;

	pixels.par_iter().with_min_len(4096).map(|&pixel| intensity(pixel)).collect()
}

/// Wrap a remapped buffer into a lightmap of the grid's size
fn lightmap(grid: &RgbImage, intensities: Vec<u8>) -> Result<GrayImage, Error> {
	let (width, height) = grid.dimensions();
	let actual = intensities.len();
	ImageBuffer::from_raw(width, height, intensities).ok_or(Error::MalformedGrid {
		expected: width as usize * height as usize,
		actual,
	})
}

/// Remap a pseudo-colored atlas through its calibration
///
/// Every distinct color is classified once; border clusters give 0.
///
/// # Errors
/// [`Error::MalformedGrid`] if the grid's buffer does not match its dimensions.
pub fn remap_classified(grid: &RgbImage, calibration: &Calibration) -> Result<GrayImage, Error> {
	let pixels: &[Srgb<u8>] = palette::cast::from_component_slice(grid.as_raw());

	let mut lookup = HashMap::new();
	for &pixel in pixels {
		lookup.entry(key(pixel)).or_insert_with(|| calibration.pixel_intensity(pixel));
	}

	tracing::debug!(distinct = lookup.len(), pixels = pixels.len(), "classified full-resolution colors");

	let intensities = map_pixels(pixels, |pixel| lookup.get(&key(pixel)).copied().unwrap_or(0));
	lightmap(grid, intensities)
}

/// Remap a grayscale atlas by reading its red channel directly
///
/// # Errors
/// [`Error::InvalidParameter`] for invalid `params`
/// and [`Error::MalformedGrid`] if the grid's buffer does not match its dimensions.
pub fn remap_direct(grid: &RgbImage, params: &DirectChannel) -> Result<GrayImage, Error> {
	params.validate()?;

	let mut curve = [0; 256];
	for (raw, out) in (0..=u8::MAX).zip(&mut curve) {
		*out = params.intensity(raw);
	}

	tracing::debug!(max_raw = params.max_raw, exponent = params.exponent, "remapping gray levels");

	let pixels: &[Srgb<u8>] = palette::cast::from_component_slice(grid.as_raw());
	let intensities = map_pixels(pixels, |pixel| curve[usize::from(pixel.red)]);
	lightmap(grid, intensities)
}

/// Remap using the given strategy
///
/// `calibration` is only used by [`Strategy::Classified`].
///
/// # Errors
/// See [`remap_classified`] and [`remap_direct`].
pub fn remap(grid: &RgbImage, strategy: Strategy, calibration: Option<&Calibration>) -> Result<GrayImage, Error> {
	match (strategy, calibration) {
		(Strategy::Classified, Some(calibration)) => remap_classified(grid, calibration),
		(Strategy::Classified, None) => Err(Error::parameter("calibration", "the classified strategy needs a calibration")),
		(Strategy::DirectChannel(params), _) => remap_direct(grid, &params),
	}
}
