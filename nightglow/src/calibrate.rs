//! Binds clusters to an ordinal table of brightness-ratio categories
//!
//! Clusters are ranked by the mean of their centroid's channels,
//! and the cluster of rank `i` is bound to entry `i` of the [`CalibrationTable`].
//! The table is a calibration constant for a specific atlas version:
//! nothing here checks that the atlas really encodes the ratio ranges the table claims.
//! If an atlas uses a different scale, clusters are bound to neighboring categories without any warning.

use crate::{Centroids, Error};
use palette::Srgb;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// A range of artificial to natural sky brightness ratios
///
/// A missing bound is open. A range with neither bound marks non-data (border) categories.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RatioRange {
	/// Lower bound
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub min: Option<f32>,
	/// Upper bound
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub max: Option<f32>,
}

impl RatioRange {
	/// Ratios below `max`
	#[must_use]
	pub const fn below(max: f32) -> Self {
		Self { min: None, max: Some(max) }
	}

	/// Ratios between `min` and `max`
	#[must_use]
	pub const fn between(min: f32, max: f32) -> Self {
		Self { min: Some(min), max: Some(max) }
	}

	/// Ratios above `min`
	#[must_use]
	pub const fn above(min: f32) -> Self {
		Self { min: Some(min), max: None }
	}

	/// No ratio, e.g. borders and coastlines
	pub const NONE: Self = Self { min: None, max: None };
}

impl Display for RatioRange {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match (self.min, self.max) {
			(None, None) => write!(f, "none"),
			(None, Some(max)) => write!(f, "<{max}"),
			(Some(min), None) => write!(f, ">{min}"),
			(Some(min), Some(max)) => write!(f, "{min}-{max}"),
		}
	}
}

/// An entry of the calibration table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
	/// Human readable name, e.g. the palette color
	pub name: String,
	/// The brightness ratios this category stands for
	#[serde(default)]
	pub ratio: RatioRange,
	/// Lightmap intensity written for this category
	pub intensity: u8,
	/// Whether this palette entry is not data (borders, anti-aliased outlines)
	#[serde(default)]
	pub border: bool,
}

impl Category {
	/// Create a data category
	#[must_use]
	pub fn new(name: &str, ratio: RatioRange, intensity: u8) -> Self {
		Self { name: name.to_owned(), ratio, intensity, border: false }
	}

	/// Create a border category, which always maps to intensity 0
	#[must_use]
	pub fn border(name: &str) -> Self {
		Self { name: name.to_owned(), ratio: RatioRange::NONE, intensity: 0, border: true }
	}

	/// The intensity actually written for pixels of this category
	#[must_use]
	pub fn output(&self) -> u8 {
		if self.border {
			0
		} else {
			self.intensity
		}
	}
}

/// An ordered list of categories from darkest to brightest
///
/// A table is guaranteed to
/// - have between 1 and 256 categories
/// - map its first category to intensity 0
/// - have non-decreasing intensities across its data (non-border) categories
///
/// Tables deserialize from a JSON array of [`Category`] objects, which are validated the same way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Category>", into = "Vec<Category>")]
pub struct CalibrationTable {
	/// Categories in ascending brightness order
	categories: Vec<Category>,
}

impl CalibrationTable {
	/// Validate and create a table
	///
	/// # Errors
	/// [`Error::InvalidTable`] if any of the guarantees listed on [`CalibrationTable`] do not hold.
	pub fn new(categories: Vec<Category>) -> Result<Self, Error> {
		let Some(first) = categories.first() else {
			return Err(Error::table("the table has no categories"));
		};

		if categories.len() > usize::from(u8::MAX) + 1 {
			return Err(Error::table(format!("{} categories is more than 256", categories.len())));
		}

		if first.output() != 0 {
			return Err(Error::table(format!(
				"the darkest category '{}' has intensity {} instead of 0",
				first.name, first.intensity
			)));
		}

		let mut data = categories.iter().filter(|category| !category.border);
		if let Some(mut previous) = data.next() {
			for category in data {
				if category.intensity < previous.intensity {
					return Err(Error::table(format!(
						"'{}' ({}) is darker than the preceding '{}' ({})",
						category.name, category.intensity, previous.name, previous.intensity
					)));
				}
				previous = category;
			}
		}

		Ok(Self { categories })
	}

	/// Parse and validate a table from JSON
	///
	/// # Errors
	/// Returns an error for malformed JSON or a table failing validation.
	pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
		serde_json::from_str(json)
	}

	/// Serialize the table as pretty printed JSON
	///
	/// # Errors
	/// Returns an error if a category cannot be represented in JSON.
	pub fn to_json(&self) -> Result<String, serde_json::Error> {
		serde_json::to_string_pretty(&self.categories)
	}

	/// The categories in ascending brightness order
	#[must_use]
	pub fn categories(&self) -> &[Category] {
		&self.categories
	}

	/// Number of categories
	#[must_use]
	pub fn len(&self) -> usize {
		self.categories.len()
	}

	/// Always `false`, tables have at least one category
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.categories.is_empty()
	}

	/// The expanded 16-bin scale of the 2024 world atlas
	///
	/// Bins are a factor of about 1.73 apart in brightness ratio.
	/// The brightest palette entry is the white used for borders and coastlines.
	#[must_use]
	pub fn cinzano16() -> Self {
		Self {
			categories: vec![
				Category::new("Black 1", RatioRange::below(0.01), 0),
				Category::new("Black 2", RatioRange::between(0.01, 0.06), 8),
				Category::new("Dark Gray 1", RatioRange::between(0.06, 0.11), 16),
				Category::new("Dark Gray 2", RatioRange::between(0.11, 0.19), 24),
				Category::new("Blue 1", RatioRange::between(0.19, 0.33), 32),
				Category::new("Blue 2", RatioRange::between(0.33, 0.58), 48),
				Category::new("Green 1", RatioRange::between(0.58, 1.00), 64),
				Category::new("Green 2", RatioRange::between(1.00, 1.73), 80),
				Category::new("Yellow 1", RatioRange::between(1.73, 3.00), 96),
				Category::new("Yellow 2", RatioRange::between(3.00, 5.20), 128),
				Category::new("Orange 1", RatioRange::between(5.20, 9.00), 160),
				Category::new("Orange 2", RatioRange::between(9.00, 15.59), 192),
				Category::new("Red 1", RatioRange::between(15.59, 27.00), 224),
				Category::new("Red 2", RatioRange::between(27.00, 46.77), 240),
				Category::new("White 1", RatioRange::above(46.77), 255),
				Category::border("White 2/Border"),
			],
		}
	}

	/// The original eight-color scale, a factor of 3 apart in brightness ratio
	///
	/// Apart from black, each bin covers two neighboring bins of [`CalibrationTable::cinzano16`]
	/// and takes the intensity of the brighter one. There is no separate border entry.
	#[must_use]
	pub fn cinzano8() -> Self {
		Self {
			categories: vec![
				Category::new("Black", RatioRange::below(0.01), 0),
				Category::new("Dark Gray", RatioRange::between(0.01, 0.11), 16),
				Category::new("Blue", RatioRange::between(0.11, 0.33), 32),
				Category::new("Green", RatioRange::between(0.33, 1.0), 64),
				Category::new("Yellow", RatioRange::between(1.0, 3.0), 96),
				Category::new("Orange", RatioRange::between(3.0, 9.0), 160),
				Category::new("Red", RatioRange::between(9.0, 27.0), 224),
				Category::new("White", RatioRange::above(27.0), 255),
			],
		}
	}
}

impl TryFrom<Vec<Category>> for CalibrationTable {
	type Error = Error;

	fn try_from(categories: Vec<Category>) -> Result<Self, Self::Error> {
		Self::new(categories)
	}
}

impl From<CalibrationTable> for Vec<Category> {
	fn from(table: CalibrationTable) -> Self {
		table.categories
	}
}

/// Coarse description of a centroid's brightness
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BrightnessClass {
	/// Below 10
	VeryDark,
	/// 10 to 30
	Dark,
	/// 30 to 60
	MediumDark,
	/// 60 to 100
	Medium,
	/// 100 to 150
	MediumLight,
	/// 150 to 200
	Light,
	/// 200 and above
	VeryLight,
}

impl BrightnessClass {
	/// Classify a brightness on the 8-bit scale
	#[must_use]
	pub fn of(brightness: f32) -> Self {
		use BrightnessClass::*;
		match brightness {
			b if b < 10.0 => VeryDark,
			b if b < 30.0 => Dark,
			b if b < 60.0 => MediumDark,
			b if b < 100.0 => Medium,
			b if b < 150.0 => MediumLight,
			b if b < 200.0 => Light,
			_ => VeryLight,
		}
	}
}

impl Display for BrightnessClass {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		use BrightnessClass::*;
		f.write_str(match self {
			VeryDark => "very dark",
			Dark => "dark",
			MediumDark => "medium dark",
			Medium => "medium",
			MediumLight => "medium light",
			Light => "light",
			VeryLight => "very light",
		})
	}
}

/// A cluster bound to its category
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Binding {
	/// Cluster id
	pub cluster: u8,
	/// Position in brightness order, which is also the category's position in the table
	pub rank: usize,
	/// The bound category
	pub category: Category,
	/// Centroid color
	pub centroid: Srgb<u8>,
	/// Mean of the centroid's channels on the 8-bit scale
	pub brightness: f32,
	/// Coarse label for `brightness`
	pub class: BrightnessClass,
	/// Number of sampled pixels in the cluster
	pub samples: u32,
	/// Share of the sampled pixels in the cluster, in percent
	pub percentage: f64,
}

/// The result of binding every cluster to a category
#[derive(Debug, Clone, PartialEq)]
pub struct Calibration {
	/// The clustered palette
	centroids: Centroids,
	/// Bindings in rank order
	bindings: Vec<Binding>,
	/// Cluster id -> rank
	ranks: Vec<usize>,
}

impl Calibration {
	/// The centroids that were calibrated
	#[must_use]
	pub fn centroids(&self) -> &Centroids {
		&self.centroids
	}

	/// Bindings from darkest to brightest
	#[must_use]
	pub fn bindings(&self) -> &[Binding] {
		&self.bindings
	}

	/// The binding of a cluster, if it has one
	#[must_use]
	pub fn binding(&self, cluster: u8) -> Option<&Binding> {
		self.ranks.get(usize::from(cluster)).map(|&rank| &self.bindings[rank])
	}

	/// The lightmap intensity for a cluster
	///
	/// Border clusters give 0. A cluster without a category also gives 0 instead of an error.
	#[must_use]
	pub fn intensity(&self, cluster: u8) -> u8 {
		if let Some(binding) = self.binding(cluster) {
			binding.category.output()
		} else {
			tracing::warn!(cluster, "cluster has no bound category, writing intensity 0");
			0
		}
	}

	/// The lightmap intensity for a full-resolution pixel
	#[must_use]
	pub fn pixel_intensity(&self, color: Srgb<u8>) -> u8 {
		self.intensity(self.centroids.nearest(color))
	}
}

/// Bind each cluster to the table category of the same brightness rank
///
/// Clusters of equal brightness are ranked by id.
///
/// # Errors
/// [`Error::CalibrationMismatch`] if the number of clusters differs from the table length.
pub fn calibrate(centroids: Centroids, table: &CalibrationTable) -> Result<Calibration, Error> {
	if centroids.len() != table.len() {
		return Err(Error::CalibrationMismatch { clusters: centroids.len(), categories: table.len() });
	}

	// at most 256 clusters
	#[allow(clippy::cast_possible_truncation)]
	let mut order = (0..centroids.len()).map(|i| i as u8).collect::<Vec<_>>();
	order.sort_by(|&x, &y| f32::total_cmp(&centroids.brightness(x), &centroids.brightness(y)));

	let mut ranks = vec![0; centroids.len()];
	let bindings = order
		.into_iter()
		.zip(table.categories())
		.enumerate()
		.map(|(rank, (cluster, category))| {
			ranks[usize::from(cluster)] = rank;
			let brightness = centroids.brightness(cluster);
			Binding {
				cluster,
				rank,
				category: category.clone(),
				centroid: centroids.colors()[usize::from(cluster)].into_format(),
				brightness,
				class: BrightnessClass::of(brightness),
				samples: centroids.counts()[usize::from(cluster)],
				percentage: centroids.percentage(cluster),
			}
		})
		.collect::<Vec<_>>();

	for binding in &bindings {
		tracing::debug!(
			cluster = binding.cluster,
			rank = binding.rank,
			category = %binding.category.name,
			ratio = %binding.category.ratio,
			intensity = binding.category.output(),
			brightness = binding.brightness,
			"bound cluster"
		);
	}

	Ok(Calibration { centroids, bindings, ranks })
}
