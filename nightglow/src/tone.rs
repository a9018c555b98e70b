//! Final contrast, brightness and gamma adjustment of a lightmap

use crate::{resize_gray, Error, SampleSize};
use image::{imageops::FilterType, GrayImage, RgbImage};

/// An order-preserving intensity curve built from explicit factors
///
/// Intensity 0 always stays 0, so unlit and border pixels stay dark under any curve.
/// Every other intensity `x` is mapped as follows:
/// 1. `v = pivot + contrast * (x - pivot)`
/// 2. `v = v * brightness`
/// 3. `v` is clamped to `0.0..=255.0`
/// 4. `v = 255 * (v / 255)^(1 / gamma)`, rounded to the nearest integer
///
/// Nothing is derived from image statistics, so the same curve maps the same intensity
/// identically in every lightmap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneCurve {
	/// Stretch around `pivot`; `1.0` leaves intensities unchanged
	pub contrast: f32,
	/// The intensity left fixed by `contrast`
	pub pivot: f32,
	/// Multiplier applied after contrast
	pub brightness: f32,
	/// Gamma; values above `1.0` brighten midtones
	pub gamma: f32,
}

impl Default for ToneCurve {
	/// A mild contrast boost around the middle gray
	fn default() -> Self {
		Self { contrast: 1.3, pivot: 128.0, brightness: 1.0, gamma: 1.0 }
	}
}

impl ToneCurve {
	/// The curve that maps every intensity to itself
	#[must_use]
	pub const fn identity() -> Self {
		Self { contrast: 1.0, pivot: 128.0, brightness: 1.0, gamma: 1.0 }
	}

	/// Check that every factor is usable
	///
	/// # Errors
	/// [`Error::InvalidParameter`] if any factor is non-finite,
	/// `contrast` or `brightness` is negative, or `gamma` is not positive.
	pub fn validate(&self) -> Result<(), Error> {
		let Self { contrast, pivot, brightness, gamma } = *self;

		for (name, value) in [("contrast", contrast), ("pivot", pivot), ("brightness", brightness), ("gamma", gamma)] {
			if !value.is_finite() {
				return Err(Error::parameter(name, format!("{value} is not finite")));
			}
		}

		if contrast < 0.0 {
			Err(Error::parameter("contrast", format!("{contrast} is negative")))
		} else if brightness < 0.0 {
			Err(Error::parameter("brightness", format!("{brightness} is negative")))
		} else if gamma <= 0.0 {
			Err(Error::parameter("gamma", format!("{gamma} is not positive")))
		} else {
			Ok(())
		}
	}

	/// Map a single intensity
	#[must_use]
	pub fn map(&self, intensity: u8) -> u8 {
		if intensity == 0 {
			return 0;
		}

		let x = f32::from(intensity);
		let v = ((self.pivot + self.contrast * (x - self.pivot)) * self.brightness).clamp(0.0, 255.0);
		let v = 255.0 * (v / 255.0).powf(self.gamma.recip());

		// clamped above, powf of a value in 0.0..=1.0 stays in range
		#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
		{
			v.round().clamp(0.0, 255.0) as u8
		}
	}

	/// The curve as a lookup table over every intensity
	///
	/// # Errors
	/// See [`ToneCurve::validate`].
	pub fn lut(&self) -> Result<[u8; 256], Error> {
		self.validate()?;

		let mut lut = [0; 256];
		for (x, out) in (0..=u8::MAX).zip(&mut lut) {
			*out = self.map(x);
		}
		Ok(lut)
	}

	/// Apply the curve to every pixel of a lightmap
	///
	/// # Errors
	/// See [`ToneCurve::validate`].
	pub fn apply(&self, lightmap: &GrayImage) -> Result<GrayImage, Error> {
		let lut = self.lut()?;
		let mut out = lightmap.clone();
		for pixel in out.pixels_mut() {
			pixel.0[0] = lut[usize::from(pixel.0[0])];
		}
		Ok(out)
	}
}

/// Tone map a lightmap and bring it to the output resolution
///
/// No resize happens when `output_size` is `None` or equals the lightmap's size.
///
/// # Errors
/// [`Error::InvalidParameter`] for an invalid curve
/// and [`Error::InvalidDimension`] for an output size with a zero side.
pub fn finish(lightmap: &GrayImage, curve: &ToneCurve, output_size: Option<(u32, u32)>, filter: FilterType) -> Result<GrayImage, Error> {
	let toned = curve.apply(lightmap)?;

	let finished = match output_size {
		Some((width, height)) => resize_gray(&toned, SampleSize::new(width, height), filter)?,
		None => toned,
	};

	tracing::debug!(
		contrast = curve.contrast,
		brightness = curve.brightness,
		gamma = curve.gamma,
		size = ?finished.dimensions(),
		"finished lightmap"
	);

	Ok(finished)
}

/// Copy the single intensity channel into all three RGB channels
#[must_use]
pub fn broadcast_rgb(lightmap: &GrayImage) -> RgbImage {
	RgbImage::from_fn(lightmap.width(), lightmap.height(), |x, y| {
		let v = lightmap.get_pixel(x, y).0[0];
		image::Rgb([v, v, v])
	})
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
	use super::*;
	use image::Luma;

	fn ramp() -> GrayImage {
		#[allow(clippy::cast_possible_truncation)]
		GrayImage::from_fn(16, 16, |x, y| Luma([(y * 16 + x) as u8]))
	}

	fn curves() -> Vec<ToneCurve> {
		vec![
			ToneCurve::default(),
			ToneCurve::identity(),
			ToneCurve { contrast: 1.2, pivot: 128.0, brightness: 1.0, gamma: 1.0 },
			ToneCurve { contrast: 3.0, pivot: 40.0, brightness: 1.5, gamma: 2.2 },
			ToneCurve { contrast: 0.5, pivot: 200.0, brightness: 0.8, gamma: 0.4 },
			ToneCurve { contrast: 0.0, pivot: 128.0, brightness: 1.0, gamma: 1.0 },
		]
	}

	#[test]
	fn identity_is_a_no_op() {
		let lightmap = ramp();
		assert_eq!(ToneCurve::identity().apply(&lightmap).unwrap(), lightmap);
	}

	#[test]
	fn curves_preserve_order() {
		for curve in curves() {
			let lut = curve.lut().unwrap();
			for pair in lut.windows(2) {
				assert!(pair[0] <= pair[1], "{curve:?}");
			}
		}
	}

	#[test]
	fn zero_stays_zero() {
		for curve in curves() {
			assert_eq!(curve.lut().unwrap()[0], 0, "{curve:?}");
		}

		// a low contrast lifts dark intensities but never unlit ones
		let lut = ToneCurve { contrast: 0.5, ..ToneCurve::identity() }.lut().unwrap();
		assert_eq!(lut[0], 0);
		assert!(lut[1] > 60);
	}

	#[test]
	fn contrast_clamps_extremes() {
		let lut = ToneCurve::default().lut().unwrap();
		assert_eq!(lut[0], 0);
		assert_eq!(lut[128], 128);
		assert_eq!(lut[255], 255);
		assert!(lut[64] < 64);
		assert!(lut[192] > 192);
	}

	#[test]
	fn gamma_lifts_midtones() {
		let curve = ToneCurve { gamma: 2.0, ..ToneCurve::identity() };
		let lut = curve.lut().unwrap();
		assert_eq!(lut[0], 0);
		assert_eq!(lut[255], 255);
		assert!(lut[64] > 64);
	}

	#[test]
	fn invalid_factors_are_rejected() {
		let base = ToneCurve::identity();
		for curve in [
			ToneCurve { contrast: -0.1, ..base },
			ToneCurve { brightness: -1.0, ..base },
			ToneCurve { gamma: 0.0, ..base },
			ToneCurve { gamma: f32::NAN, ..base },
			ToneCurve { pivot: f32::INFINITY, ..base },
		] {
			assert!(matches!(curve.validate(), Err(Error::InvalidParameter { .. })), "{curve:?}");
		}
	}

	#[test]
	fn finish_resizes_only_when_asked() {
		let lightmap = ramp();
		let same = finish(&lightmap, &ToneCurve::identity(), None, FilterType::Lanczos3).unwrap();
		assert_eq!(same, lightmap);

		let same = finish(&lightmap, &ToneCurve::identity(), Some((16, 16)), FilterType::Lanczos3).unwrap();
		assert_eq!(same, lightmap);

		let larger = finish(&lightmap, &ToneCurve::default(), Some((40, 20)), FilterType::Lanczos3).unwrap();
		assert_eq!(larger.dimensions(), (40, 20));

		assert!(matches!(
			finish(&lightmap, &ToneCurve::default(), Some((0, 20)), FilterType::Lanczos3),
			Err(Error::InvalidDimension { .. })
		));
	}

	#[test]
	fn broadcast_copies_channel() {
		let lightmap = ramp();
		let rgb = broadcast_rgb(&lightmap);
		assert_eq!(rgb.dimensions(), lightmap.dimensions());
		for (gray, color) in lightmap.pixels().zip(rgb.pixels()) {
			assert_eq!(color.0, [gray.0[0]; 3]);
		}
	}
}
