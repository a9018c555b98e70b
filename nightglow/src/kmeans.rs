//! Provides the implementation for (sort) k-means over sampled atlas colors

use crate::Error;
use palette::Srgb;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

/// Parameters for clustering the sample set
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KmeansOptions {
	/// The number of clusters to find
	///
	/// This has to match the length of the calibration table the clusters are bound to.
	pub k: u8,
	/// The number of k-means runs, keeping the one with the lowest variance
	pub trials: u32,
	/// Stop iterating once the centroids move less than this in total (in normalized RGB units)
	pub convergence_threshold: f32,
	/// The maximum number of iterations for each trial
	pub max_iter: u32,
	/// Seed for choosing the starting centroids
	pub seed: u64,
}

impl KmeansOptions {
	/// Check the options that do not depend on the samples
	///
	/// # Errors
	/// [`Error::InvalidParameter`] if `k` or `trials` is zero
	/// or the convergence threshold is negative or NaN.
	pub fn validate(&self) -> Result<(), Error> {
		if self.k == 0 {
			Err(Error::parameter("k", "at least one cluster is required"))
		} else if self.trials == 0 {
			Err(Error::parameter("trials", "at least one trial is required"))
		} else if self.convergence_threshold.is_nan() || self.convergence_threshold < 0.0 {
			let threshold = self.convergence_threshold;
			Err(Error::parameter("convergence threshold", format!("{threshold} is not >= 0")))
		} else {
			Ok(())
		}
	}
}

impl Default for KmeansOptions {
	fn default() -> Self {
		Self {
			k: 16,
			trials: 10,
			convergence_threshold: 1e-4,
			max_iter: 300,
			seed: 42,
		}
	}
}

/// Distinct sampled colors
#[derive(Debug, Clone)]
struct ColorCounts {
	/// Colors in order of first appearance
	colors: Vec<Srgb<f32>>,
	/// The number of sampled pixels having each color
	counts: Vec<u32>,
}

impl ColorCounts {
	/// Merge duplicate pixels into weighted colors
	fn from_srgb(pixels: &[Srgb<u8>]) -> Self {
		let mut colors = Vec::new();
		let mut counts: Vec<u32> = Vec::new();

		// Packed Srgb -> index
		let mut memo: HashMap<u32, u32> = HashMap::new();

		for &srgb in pixels {
			let key = srgb.into_u32::<palette::rgb::channels::Rgba>();
			let index = *memo.entry(key).or_insert_with(|| {
				// there are only (2^8)^3 < u32::MAX possible colors
				#[allow(clippy::cast_possible_truncation)]
				let index = colors.len() as u32;

				colors.push(srgb.into_format());
				counts.push(0);
				index
			});

			counts[index as usize] += 1;
		}

		Self { colors, counts }
	}

	/// Each color with its pixel count
	fn pairs(&self) -> impl Iterator<Item = (Srgb<f32>, u32)> + '_ {
		self.colors.iter().copied().zip(self.counts.iter().copied())
	}

	/// Number of distinct colors
	fn num_colors(&self) -> u32 {
		// bounded by the number of possible 8-bit colors
		#[allow(clippy::cast_possible_truncation)]
		{
			self.colors.len() as u32
		}
	}
}

/// Squared euclidean distance in RGB
fn squared_distance(x: Srgb<f32>, y: Srgb<f32>) -> f32 {
	let dr = x.red - y.red;
	let dg = x.green - y.green;
	let db = x.blue - y.blue;
	dr * dr + dg * dg + db * db
}

/// A zeroed color sum
const ZERO_SUM: Srgb<f64> = Srgb::new(0.0, 0.0, 0.0);

/// Bookkeeping for each k-means data point
struct PointData {
	/// Center assignment for this data point
	assignment: Vec<u8>,
	/// Weight used by k-means++ and when re-seeding empty centers
	weight: Vec<f32>,
}

impl PointData {
	/// Create a [`PointData`] with the given number data points
	fn new(n: u32) -> Self {
		let n = n as usize;
		Self {
			assignment: vec![0; n],
			weight: vec![f32::INFINITY; n],
		}
	}

	/// Reset data for the next k-means trial
	fn reset(&mut self) {
		self.assignment.fill(0);
		self.weight.fill(f32::INFINITY);
	}
}

/// Data for each center/centroid
struct CenterData {
	/// The centroid point
	centroid: Vec<Srgb<f32>>,
	/// Vector sum for all data points in this center
	sum: Vec<Srgb<f64>>,
	/// Number of points in this center
	count: Vec<u32>,
}

impl CenterData {
	/// Create a [`CenterData`] with the given number of centers
	fn new(k: u8) -> Self {
		let k = usize::from(k);
		Self {
			centroid: Vec::with_capacity(k),
			sum: vec![ZERO_SUM; k],
			count: vec![0; k],
		}
	}

	/// Reset data for the next k-means trial
	fn reset(&mut self) {
		self.centroid.clear();
		self.sum.fill(ZERO_SUM);
		self.count.fill(0);
	}
}

/// Holds all the state used by k-means
struct KmeansState {
	/// Data for each center
	centers: CenterData,
	/// One fourth of the squared distance between each pairs of centers
	distances: Vec<(u8, f32)>,
	/// Data for each point
	points: PointData,
}

impl KmeansState {
	/// Initialize a new [`KmeansState`] with `k` centers and `n` data points
	fn new(k: u8, n: u32) -> Self {
		Self {
			centers: CenterData::new(k),
			distances: vec![(0, 0.0); usize::from(k) * usize::from(k)],
			points: PointData::new(n),
		}
	}
}

/// The cluster centroids found for a sample set
///
/// Cluster ids are indices into [`Centroids::colors`].
#[derive(Debug, Clone, PartialEq)]
pub struct Centroids {
	/// Centroid colors, components in `0.0..=1.0`
	colors: Vec<Srgb<f32>>,
	/// Number of sampled pixels nearest to each centroid
	counts: Vec<u32>,
	/// Within-cluster sum of squared distances
	variance: f64,
	/// Number of elapsed iterations
	iterations: u32,
}

impl Centroids {
	/// Use a known palette as centroids instead of clustering
	///
	/// Member counts are zero.
	///
	/// # Errors
	/// [`Error::InvalidParameter`] if the palette is empty or has more than 256 colors.
	pub fn from_palette(palette: &[Srgb<u8>]) -> Result<Self, Error> {
		if palette.is_empty() || palette.len() > usize::from(u8::MAX) + 1 {
			return Err(Error::parameter("palette", format!("{} colors is not in 1..=256", palette.len())));
		}

		Ok(Self {
			colors: palette.iter().map(|color| color.into_format()).collect(),
			counts: vec![0; palette.len()],
			variance: 0.0,
			iterations: 0,
		})
	}

	/// Centroid colors indexed by cluster id
	#[must_use]
	pub fn colors(&self) -> &[Srgb<f32>] {
		&self.colors
	}

	/// Sampled pixel counts indexed by cluster id
	#[must_use]
	pub fn counts(&self) -> &[u32] {
		&self.counts
	}

	/// Within-cluster sum of squared distances; lower is a tighter fit
	#[must_use]
	pub fn variance(&self) -> f64 {
		self.variance
	}

	/// Number of iterations the best trial took
	#[must_use]
	pub fn iterations(&self) -> u32 {
		self.iterations
	}

	/// Number of clusters
	#[must_use]
	pub fn len(&self) -> usize {
		self.colors.len()
	}

	/// Whether there are no clusters
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.colors.is_empty()
	}

	/// Total number of sampled pixels
	#[must_use]
	pub fn total(&self) -> u64 {
		self.counts.iter().copied().map(u64::from).sum()
	}

	/// Share of the sampled pixels in the given cluster, in percent
	#[must_use]
	pub fn percentage(&self, cluster: u8) -> f64 {
		let total = self.total();
		if total == 0 {
			0.0
		} else {
			#[allow(clippy::cast_precision_loss)]
			{
				100.0 * f64::from(self.counts[usize::from(cluster)]) / total as f64
			}
		}
	}

	/// The mean of the centroid's channels on the 8-bit scale
	#[must_use]
	pub fn brightness(&self, cluster: u8) -> f32 {
		let color = self.colors[usize::from(cluster)];
		255.0 * (color.red + color.green + color.blue) / 3.0
	}

	/// Id of the centroid nearest to `color`; ties go to the lowest id
	#[must_use]
	pub fn nearest(&self, color: Srgb<u8>) -> u8 {
		let color = color.into_format();
		let mut min_dist = f32::INFINITY;
		let mut min_center = 0;
		for (i, &centroid) in self.colors.iter().enumerate() {
			let dist = squared_distance(color, centroid);
			if dist < min_dist {
				min_dist = dist;
				min_center = i;
			}
		}

		// there are at most u8::MAX + 1 centroids
		#[allow(clippy::cast_possible_truncation)]
		{
			min_center as u8
		}
	}
}

/// Choose the starting centroids using the k-means++ algorithm
fn kmeans_plus_plus(k: u8, rng: &mut impl Rng, colors: &[Srgb<f32>], centroids: &mut Vec<Srgb<f32>>, weights: &mut [f32]) {
	use rand::{
		distributions::{WeightedError::*, WeightedIndex},
		prelude::Distribution,
	};

	// Pick any random first centroid
	centroids.push(colors[rng.gen_range(0..colors.len())]);

	// Pick each next centroid with a weighted probability based off the squared distance to its closest centroid
	for i in 1..usize::from(k) {
		let centroid = centroids[i - 1];
		for (weight, &color) in weights.iter_mut().zip(colors) {
			*weight = f32::min(*weight, squared_distance(color, centroid));
		}

		match WeightedIndex::new(&*weights) {
			Ok(sampler) => centroids.push(colors[sampler.sample(rng)]),
			Err(AllWeightsZero) => return, // all points exactly match a centroid
			Err(InvalidWeight | NoItem | TooMany) => {
				unreachable!("distances are >= 0 and colors.len() is in 1..=2.pow(24)")
			},
		}
	}
}

/// Initializes the center sums and counts based off the initial centroids
fn compute_initial_sums(colors: &ColorCounts, centers: &mut CenterData, assignment: &[u8]) {
	for ((color, n), &center) in colors.pairs().zip(assignment) {
		let i = usize::from(center);
		let nf = f64::from(n);
		let sum = &mut centers.sum[i];
		sum.red += nf * f64::from(color.red);
		sum.green += nf * f64::from(color.green);
		sum.blue += nf * f64::from(color.blue);
		centers.count[i] += n;
	}
}

/// For each pair of centers, update their distances and sort each center's row by increasing distance
// i and j are < centroids.len() <= u8::MAX
#[allow(clippy::cast_possible_truncation)]
fn update_distances(centroids: &[Srgb<f32>], distances: &mut [(u8, f32)]) {
	let k = centroids.len();
	for i in 0..k {
		let ci = centroids[i];
		distances[i * k + i] = (i as u8, 0.0);
		for j in (i + 1)..k {
			let cj = centroids[j];
			let dist = squared_distance(ci, cj) / 4.0;
			distances[j * k + i] = (i as u8, dist);
			distances[i * k + j] = (j as u8, dist);
		}
	}

	for row in distances[..(k * k)].chunks_exact_mut(k) {
		row.sort_by(|(_, x), (_, y)| f32::total_cmp(x, y));
	}
}

/// Find the closest center to `color`, starting from its current `center`
fn closest_center(color: Srgb<f32>, center: u8, centroids: &[Srgb<f32>], distances: &[(u8, f32)]) -> u8 {
	let k = centroids.len();
	let ci = usize::from(center);
	let dist = squared_distance(color, centroids[ci]);

	let mut min_dist = dist;
	let mut min_center = center;
	for &(other_center, half_dist) in &distances[(ci * k + 1)..((ci + 1) * k)] {
		if dist < half_dist {
			break;
		}

		let other_dist = squared_distance(color, centroids[usize::from(other_center)]);
		if other_dist < min_dist {
			min_dist = other_dist;
			min_center = other_center;
		}
	}

	min_center
}

/// The closest center for each data point
#[cfg(not(feature = "threads"))]
fn closest_centers(colors: &ColorCounts, centroids: &[Srgb<f32>], distances: &[(u8, f32)], assignment: &[u8]) -> Vec<u8> {
	colors
		.colors
		.iter()
		.zip(assignment)
		.map(|(&color, &center)| closest_center(color, center, centroids, distances))
		.collect()
}

/// The closest center for each data point
#[cfg(feature = "threads")]
fn closest_centers(colors: &ColorCounts, centroids: &[Srgb<f32>], distances: &[(u8, f32)], assignment: &[u8]) -> Vec<u8> {
	use rayon::prelude::*;

	let num_points = colors.colors.len();
	colors
		.colors
		.par_iter()
		.with_min_len((num_points / rayon::current_num_threads()).max(1))
		.zip(assignment)
		.map(|(&color, &center)| closest_center(color, center, centroids, distances))
		.collect()
}

/// For each data point, update its assigned center
///
/// The search runs in parallel with the `threads` feature,
/// but sums are always updated in point order so that results do not depend on scheduling.
fn update_assignments(colors: &ColorCounts, centers: &mut CenterData, distances: &[(u8, f32)], points: &mut PointData) {
	let closest = closest_centers(colors, &centers.centroid, distances, &points.assignment);

	for (((color, n), center), min_center) in colors.pairs().zip(&mut points.assignment).zip(closest) {
		if min_center != *center {
			let nf = f64::from(n);
			let r = nf * f64::from(color.red);
			let g = nf * f64::from(color.green);
			let b = nf * f64::from(color.blue);

			let ci = usize::from(*center);
			let old_sum = &mut centers.sum[ci];
			old_sum.red -= r;
			old_sum.green -= g;
			old_sum.blue -= b;
			centers.count[ci] -= n;

			let cj = usize::from(min_center);
			let new_sum = &mut centers.sum[cj];
			new_sum.red += r;
			new_sum.green += g;
			new_sum.blue += b;
			centers.count[cj] += n;

			*center = min_center;
		}
	}
}

/// For each center, update its centroid using the vector sums and compute deltas
///
/// An empty center is moved onto the point farthest from its current centroid.
fn update_centroids(colors: &ColorCounts, centers: &mut CenterData, points: &mut PointData) -> f32 {
	if centers.count.contains(&0) {
		for ((weight, &color), &center) in points.weight.iter_mut().zip(&colors.colors).zip(&points.assignment) {
			*weight = squared_distance(color, centers.centroid[usize::from(center)]);
		}
	}

	let mut total_delta = 0.0;
	for ((centroid, &n), sum) in centers.centroid.iter_mut().zip(&centers.count).zip(&centers.sum) {
		let new_centroid = if n == 0 {
			let farthest = points
				.weight
				.iter()
				.enumerate()
				.fold((0, f32::NEG_INFINITY), |(i, max), (j, &w)| if w > max { (j, w) } else { (i, max) })
				.0;

			// a point can only be claimed by one empty center
			points.weight[farthest] = f32::NEG_INFINITY;
			colors.colors[farthest]
		} else {
			let n = f64::from(n);
			// Sums may need greater precision, but the average can fall back down to a reduced precision
			#[allow(clippy::cast_possible_truncation)]
			Srgb::new((sum.red / n) as f32, (sum.green / n) as f32, (sum.blue / n) as f32)
		};

		total_delta += squared_distance(*centroid, new_centroid).sqrt();
		*centroid = new_centroid;
	}

	total_delta
}

/// Run a trial of sort k-means
fn kmeans(
	colors: &ColorCounts,
	KmeansState { centers, distances, points }: &mut KmeansState,
	k: u8,
	max_iter: u32,
	convergence: f32,
	seed: u64,
) -> Centroids {
	let mut rng = rand_xoshiro::Xoshiro256PlusPlus::seed_from_u64(seed);
	kmeans_plus_plus(k, &mut rng, &colors.colors, &mut centers.centroid, &mut points.weight);
	compute_initial_sums(colors, centers, &points.assignment);

	let mut iterations = 0;
	let mut total_delta = f32::INFINITY;
	while iterations < max_iter && total_delta > convergence {
		update_distances(&centers.centroid, distances);
		update_assignments(colors, centers, distances, points);
		total_delta = update_centroids(colors, centers, points);
		iterations += 1;
	}

	// Counts should describe the centroids that are returned
	update_distances(&centers.centroid, distances);
	update_assignments(colors, centers, distances, points);

	let variance = colors
		.pairs()
		.zip(&points.assignment)
		.map(|((color, n), &center)| {
			f64::from(n) * f64::from(squared_distance(color, centers.centroid[usize::from(center)]))
		})
		.sum();

	let result = Centroids {
		colors: centers.centroid.clone(),
		counts: centers.count[..centers.centroid.len()].to_vec(),
		variance,
		iterations,
	};

	tracing::trace!(seed, iterations, variance, "k-means trial finished");

	centers.reset();
	points.reset();

	result
}

/// Run multiple trials of k-means, taking the trial with the lowest variance
fn run_trials(colors: &ColorCounts, trials: u32, k: u8, max_iter: u32, convergence: f32, seed: u64) -> Option<Centroids> {
	let mut state = KmeansState::new(k, colors.num_colors());

	(0..trials)
		.map(|i| kmeans(colors, &mut state, k, max_iter, convergence, seed ^ u64::from(i)))
		.min_by(|x, y| f64::total_cmp(&x.variance, &y.variance))
}

/// Partition the sampled pixels into `options.k` clusters
///
/// The result always has exactly `k` centroids and is fully determined by the samples and options.
///
/// # Errors
/// - [`Error::InvalidParameter`] if `k` or `trials` is zero
/// - [`Error::EmptySample`] if there are no samples
/// - [`Error::DegenerateClustering`] if `k` exceeds the number of distinct sampled colors
pub fn classify(samples: &[Srgb<u8>], options: &KmeansOptions) -> Result<Centroids, Error> {
	let KmeansOptions { k, trials, convergence_threshold, max_iter, seed } = *options;

	options.validate()?;
	if samples.is_empty() {
		return Err(Error::EmptySample);
	}
	if u32::try_from(samples.len()).is_err() {
		return Err(Error::parameter("sample size", "more than u32::MAX sampled pixels"));
	}

	let colors = ColorCounts::from_srgb(samples);
	let distinct = colors.colors.len();
	if usize::from(k) > distinct {
		return Err(Error::DegenerateClustering { k, distinct });
	}

	tracing::debug!(samples = samples.len(), distinct, k, trials, "clustering sampled colors");

	let centroids = run_trials(&colors, trials, k, max_iter, convergence_threshold, seed).ok_or(Error::EmptySample)?;

	tracing::debug!(
		iterations = centroids.iterations,
		variance = centroids.variance,
		"k-means converged"
	);

	Ok(centroids)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
	use super::*;
	use approx::assert_relative_eq;

	fn test_srgb() -> Vec<Srgb<u8>> {
		vec![
			Srgb::new(0, 0, 0),
			Srgb::new(20, 20, 24),
			Srgb::new(40, 44, 48),
			Srgb::new(0, 64, 200),
			Srgb::new(20, 90, 210),
			Srgb::new(0, 160, 40),
			Srgb::new(40, 180, 60),
			Srgb::new(230, 230, 0),
			Srgb::new(250, 140, 0),
			Srgb::new(240, 20, 20),
			Srgb::new(255, 255, 255),
			Srgb::new(250, 248, 252),
		]
	}

	fn test_data() -> ColorCounts {
		ColorCounts {
			colors: test_srgb().into_iter().map(|color| color.into_format()).collect(),
			counts: vec![12, 11, 10, 9, 8, 7, 6, 5, 4, 3, 2, 1],
		}
	}

	fn kmeans_plus_plus_num_centroids(k: u8, n: u32) {
		let data = test_data();
		let mut state = KmeansState::new(k, n);

		kmeans_plus_plus(
			k,
			&mut rand_xoshiro::Xoshiro256PlusPlus::seed_from_u64(0),
			&data.colors[..(n as usize)],
			&mut state.centers.centroid,
			&mut state.points.weight,
		);

		assert_eq!(state.centers.centroid.len(), usize::min(usize::from(k), n as usize));
	}

	#[test]
	fn kmeans_plus_plus_k_greater_than_n() {
		kmeans_plus_plus_num_centroids(6, 2);
	}

	#[test]
	fn kmeans_plus_plus_k_equals_n() {
		kmeans_plus_plus_num_centroids(4, 4);
	}

	#[test]
	fn kmeans_plus_plus_k_less_than_n() {
		kmeans_plus_plus_num_centroids(2, 6);
	}

	#[test]
	fn duplicate_pixels_are_merged() {
		let pixels = [Srgb::new(1, 2, 3), Srgb::new(4, 5, 6), Srgb::new(1, 2, 3), Srgb::new(1, 2, 3)];
		let data = ColorCounts::from_srgb(&pixels);

		assert_eq!(data.num_colors(), 2);
		assert_eq!(data.counts, vec![3, 1]);
		assert_eq!(data.colors[1], Srgb::new(4u8, 5, 6).into_format());
	}

	#[test]
	fn update_distances_sorts_each_row() {
		let centroids = test_data().colors;
		let len = centroids.len();
		let mut distances = vec![(0, 0.0); len * len];

		update_distances(&centroids, &mut distances);

		#[allow(clippy::cast_possible_truncation)]
		for (i, row) in distances.chunks_exact(len).enumerate() {
			assert!(row[0] == (i as u8, 0.0));
			for j in 0..(len - 1) {
				assert!(row[j].1 <= row[j + 1].1);
			}
		}
	}

	fn initialize(k: u8) -> (ColorCounts, KmeansState) {
		let data = test_data();
		let mut state = KmeansState::new(k, data.num_colors());
		let mut rng = rand_xoshiro::Xoshiro256PlusPlus::seed_from_u64(0);

		kmeans_plus_plus(k, &mut rng, &data.colors, &mut state.centers.centroid, &mut state.points.weight);
		compute_initial_sums(&data, &mut state.centers, &state.points.assignment);
		update_distances(&state.centers.centroid, &mut state.distances);

		(data, state)
	}

	fn center_sum(sums: &[Srgb<f64>]) -> Srgb<f64> {
		let mut center_sum = ZERO_SUM;
		for sum in sums {
			center_sum.red += sum.red;
			center_sum.green += sum.green;
			center_sum.blue += sum.blue;
		}
		center_sum
	}

	#[test]
	fn compute_initial_sums_preserves_sum() {
		let (data, state) = initialize(4);

		let mut expected_sum = ZERO_SUM;
		let mut expected_count = 0;
		for (color, count) in data.pairs() {
			expected_count += count;
			let n = f64::from(count);
			expected_sum.red += n * f64::from(color.red);
			expected_sum.green += n * f64::from(color.green);
			expected_sum.blue += n * f64::from(color.blue);
		}

		assert_eq!(expected_count, state.centers.count.iter().sum::<u32>());
		assert_relative_eq!(expected_sum, center_sum(&state.centers.sum));
	}

	#[test]
	fn update_assignments_preserves_sum() {
		let (data, mut state) = initialize(4);

		let expected_sum = center_sum(&state.centers.sum);
		let expected_count = state.centers.count.iter().sum::<u32>();

		update_assignments(&data, &mut state.centers, &state.distances, &mut state.points);

		assert_eq!(expected_count, state.centers.count.iter().sum::<u32>());
		assert_relative_eq!(expected_sum, center_sum(&state.centers.sum), epsilon = 1e-9);
	}

	#[test]
	fn update_assignments_sum_reflects_assignment() {
		let (data, mut state) = initialize(4);

		update_assignments(&data, &mut state.centers, &state.distances, &mut state.points);

		for ((color, count), &center) in data.pairs().zip(&state.points.assignment) {
			let center = usize::from(center);
			let n = f64::from(count);
			let sum = &mut state.centers.sum[center];
			sum.red -= n * f64::from(color.red);
			sum.green -= n * f64::from(color.green);
			sum.blue -= n * f64::from(color.blue);
			state.centers.count[center] -= count;
		}

		for &sum in &state.centers.sum {
			assert_relative_eq!(sum, ZERO_SUM, epsilon = 1e-9);
		}

		for &count in &state.centers.count {
			assert_eq!(count, 0);
		}
	}

	#[test]
	fn update_assignments_picks_the_nearest_center() {
		let (data, mut state) = initialize(4);

		update_assignments(&data, &mut state.centers, &state.distances, &mut state.points);

		for (&color, &center) in data.colors.iter().zip(&state.points.assignment) {
			let assigned = squared_distance(color, state.centers.centroid[usize::from(center)]);
			for &other in &state.centers.centroid {
				assert!(assigned <= squared_distance(color, other));
			}
		}
	}

	#[test]
	fn update_centroids_total_delta() {
		let (data, mut state) = initialize(4);

		let old_centroids = state.centers.centroid.clone();

		update_assignments(&data, &mut state.centers, &state.distances, &mut state.points);

		let total_delta = update_centroids(&data, &mut state.centers, &mut state.points);

		let expected = old_centroids
			.iter()
			.zip(&state.centers.centroid)
			.map(|(&old, &new)| squared_distance(old, new).sqrt())
			.sum::<f32>();

		assert!((total_delta - expected).abs() <= 1e-6);
	}

	#[test]
	fn empty_center_moves_to_farthest_point() {
		let data = ColorCounts {
			colors: vec![Srgb::new(0.0, 0.0, 0.0), Srgb::new(0.1, 0.1, 0.1), Srgb::new(1.0, 1.0, 1.0)],
			counts: vec![1, 1, 1],
		};
		let mut state = KmeansState::new(2, data.num_colors());
		state.centers.centroid = vec![Srgb::new(0.0, 0.0, 0.0), Srgb::new(0.5, 0.0, 0.0)];
		compute_initial_sums(&data, &mut state.centers, &state.points.assignment);

		assert_eq!(state.centers.count, vec![3, 0]);

		update_centroids(&data, &mut state.centers, &mut state.points);

		assert_eq!(state.centers.centroid[1], Srgb::new(1.0, 1.0, 1.0));
	}

	#[test]
	fn result_has_k_centroids_and_all_counts() {
		let pixels = test_srgb();
		let options = KmeansOptions { k: 5, ..KmeansOptions::default() };
		let centroids = classify(&pixels, &options).unwrap();

		assert_eq!(centroids.len(), 5);
		assert_eq!(centroids.counts().len(), 5);
		assert_eq!(centroids.total(), pixels.len() as u64);
	}

	#[test]
	fn two_flat_colors_give_exact_centroids() {
		let mut pixels = vec![Srgb::new(0, 0, 0); 12];
		pixels.extend([Srgb::new(200, 200, 200); 4]);

		let centroids = classify(&pixels, &KmeansOptions { k: 2, ..KmeansOptions::default() }).unwrap();

		let mut found = centroids
			.colors()
			.iter()
			.zip(centroids.counts())
			.map(|(&color, &count)| (color.into_format::<u8>(), count))
			.collect::<Vec<_>>();
		found.sort_by_key(|&(color, _)| color.red);

		assert_eq!(found, vec![(Srgb::new(0, 0, 0), 12), (Srgb::new(200, 200, 200), 4)]);
	}

	#[test]
	fn same_seed_same_result() {
		let pixels = test_srgb();
		let options = KmeansOptions { k: 4, trials: 3, ..KmeansOptions::default() };

		assert_eq!(classify(&pixels, &options).unwrap(), classify(&pixels, &options).unwrap());
	}

	#[test]
	fn lower_convergence_gives_lower_variance() {
		let pixels = test_srgb();
		let base = KmeansOptions { k: 3, trials: 1, seed: 7, ..KmeansOptions::default() };

		let higher = classify(&pixels, &KmeansOptions { convergence_threshold: 10.0, ..base }).unwrap();
		let lower = classify(&pixels, &KmeansOptions { convergence_threshold: 0.0, ..base }).unwrap();

		assert_eq!(higher.iterations(), 1);
		assert!(lower.variance() <= higher.variance() + 1e-12);
	}

	#[test]
	fn max_iter_reached() {
		let pixels = test_srgb();
		let options = KmeansOptions { k: 4, trials: 1, convergence_threshold: 0.0, max_iter: 1, seed: 0 };

		assert_eq!(classify(&pixels, &options).unwrap().iterations(), 1);
	}

	#[test]
	fn invalid_inputs_are_rejected() {
		let options = KmeansOptions { k: 2, ..KmeansOptions::default() };

		assert_eq!(classify(&[], &options).unwrap_err(), Error::EmptySample);
		assert_eq!(
			classify(&[Srgb::new(9, 9, 9); 10], &options).unwrap_err(),
			Error::DegenerateClustering { k: 2, distinct: 1 }
		);
		assert!(matches!(
			classify(&test_srgb(), &KmeansOptions { k: 0, ..options }),
			Err(Error::InvalidParameter { name: "k", .. })
		));
		assert!(matches!(
			classify(&test_srgb(), &KmeansOptions { trials: 0, ..options }),
			Err(Error::InvalidParameter { name: "trials", .. })
		));
	}

	#[test]
	fn nearest_breaks_ties_by_lowest_id() {
		let centroids = Centroids::from_palette(&[Srgb::new(10, 0, 0), Srgb::new(0, 10, 0)]).unwrap();
		assert_eq!(centroids.nearest(Srgb::new(0, 0, 0)), 0);

		let duplicated = Centroids::from_palette(&[Srgb::new(5, 5, 5), Srgb::new(50, 50, 50), Srgb::new(50, 50, 50)]).unwrap();
		assert_eq!(duplicated.nearest(Srgb::new(60, 60, 60)), 1);
		assert_eq!(duplicated.nearest(Srgb::new(0, 0, 0)), 0);
	}

	#[test]
	fn palette_size_is_checked() {
		assert!(Centroids::from_palette(&[]).is_err());
		assert!(Centroids::from_palette(&vec![Srgb::new(1, 2, 3); 257]).is_err());
		assert_eq!(Centroids::from_palette(&vec![Srgb::new(1, 2, 3); 256]).unwrap().len(), 256);
	}

	#[test]
	fn brightness_is_channel_mean() {
		let centroids = Centroids::from_palette(&[Srgb::new(30, 60, 90)]).unwrap();
		assert_relative_eq!(centroids.brightness(0), 60.0, epsilon = 1e-3);
	}
}
