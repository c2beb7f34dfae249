//! Sampled estimation of the quantization interval count and of a dominant
//! background value.

use ndarray::ArrayView3;

/// Every this many-th sample (in flat order) is analysed
const SAMPLE_DISTANCE: usize = 100;

/// Largest analysed quantization radius
const MAX_RANGE_RADIUS: usize = 32768;

/// Fraction of samples that should be predictable with the interval count
const PREDICTION_THRESHOLD: f64 = 0.99;

/// Smallest interval count that is ever chosen
const MIN_INTERVALS: u32 = 32;

/// Number of precision-sized bins on either side of the mean in the value
/// histogram
const VALUE_RADIUS: usize = 4096;

/// Outcome of the interval count estimation.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct IntervalFit {
    /// Estimated number of quantization intervals, a power of two
    pub intervals: u32,
    /// Centre of the most frequent pair of value bins
    pub dense_position: f64,
    /// Fraction of samples that the Lorenzo predictor predicts within the
    /// precision
    pub correct_frequency: f64,
    /// Fraction of samples in the most frequent pair of value bins
    pub background_frequency: f64,
}

impl IntervalFit {
    /// Whether the dominant value is frequent enough to be worth substituting
    /// directly.
    #[must_use]
    pub fn uses_background(&self) -> bool {
        self.background_frequency > 0.5 || self.background_frequency > self.correct_frequency
    }
}

/// Estimates the number of quantization intervals for the `volume` at the
/// given `precision` from the Lorenzo prediction errors of a sample of its
/// interior points, and locates its most frequent value.
#[must_use]
pub fn fit_interval_count_and_background(volume: ArrayView3<f32>, precision: f64) -> IntervalFit {
    let mean = strided_mean(volume);

    let mut radii = vec![0_usize; MAX_RANGE_RADIUS];
    let mut values = vec![0_usize; VALUE_RADIUS * 2];
    let mut sample_count = 0_usize;
    let mut correct_count = 0_usize;

    for (index, ((i, j, k), value)) in volume.indexed_iter().enumerate() {
        if index % SAMPLE_DISTANCE != 0 || i == 0 || j == 0 || k == 0 {
            continue;
        }

        let at = |x: usize, y: usize, z: usize| volume.get([x, y, z]).copied().unwrap_or(0.0);
        let predicted = at(i, j, k - 1) + at(i, j - 1, k) + at(i - 1, j, k)
            - at(i, j - 1, k - 1)
            - at(i - 1, j, k - 1)
            - at(i - 1, j - 1, k)
            + at(i - 1, j - 1, k - 1);
        let error = f64::from((predicted - value).abs());

        #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let radius = (((error / precision + 1.0) / 2.0) as usize).min(MAX_RANGE_RADIUS - 1);
        if let Some(count) = radii.get_mut(radius) {
            *count += 1;
        }
        if error < precision {
            correct_count += 1;
        }

        if let Some(count) = values.get_mut(value_bin(f64::from(*value) - mean, precision)) {
            *count += 1;
        }

        sample_count += 1;
    }

    if sample_count == 0 {
        return IntervalFit {
            intervals: MIN_INTERVALS,
            dense_position: mean,
            correct_frequency: 0.0,
            background_frequency: 0.0,
        };
    }

    #[expect(clippy::cast_precision_loss)]
    let target_count = sample_count as f64 * PREDICTION_THRESHOLD;

    let mut covered = 0_usize;
    #[expect(clippy::cast_precision_loss)]
    let radius = radii
        .iter()
        .position(|count| {
            covered += count;
            covered as f64 > target_count
        })
        .unwrap_or(MAX_RANGE_RADIUS - 1);

    let intervals = u32::try_from((2 * (radius + 1)).next_power_of_two())
        .unwrap_or(u32::MAX)
        .max(MIN_INTERVALS);

    let mut max_index = 0;
    let mut max_count = 0;
    for index in 1..(VALUE_RADIUS * 2 - 2) {
        let count = values.get(index).copied().unwrap_or(0)
            + values.get(index + 1).copied().unwrap_or(0);
        if count > max_count {
            max_index = index;
            max_count = count;
        }
    }

    #[expect(clippy::cast_precision_loss)]
    let dense_position = mean + precision * (max_index as f64 + 1.0 - VALUE_RADIUS as f64);

    #[expect(clippy::cast_precision_loss)]
    let (correct_frequency, background_frequency) = (
        correct_count as f64 / sample_count as f64,
        max_count as f64 / sample_count as f64,
    );

    IntervalFit {
        intervals,
        dense_position,
        correct_frequency,
        background_frequency,
    }
}

/// Computes the background value as the mean of all samples that lie strictly
/// within the `precision` of the `dense_position`, or zero if there are none.
#[must_use]
pub fn background_value(volume: ArrayView3<f32>, dense_position: f64, precision: f64) -> f32 {
    let (sum, count) = volume
        .iter()
        .map(|value| f64::from(*value))
        .filter(|value| (value - dense_position).abs() < precision)
        .fold((0.0_f64, 0_usize), |(sum, count), value| {
            (sum + value, count + 1)
        });

    if count == 0 {
        return 0.0;
    }

    #[expect(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    let mean = (sum / count as f64) as f32;
    mean
}

/// Mean over a stride of roughly the square root of the number of samples.
fn strided_mean(volume: ArrayView3<f32>) -> f64 {
    let stride = volume.len().isqrt().max(1);

    let (sum, count) = volume
        .iter()
        .step_by(stride)
        .fold((0.0_f64, 0_usize), |(sum, count), value| {
            (sum + f64::from(*value), count + 1)
        });

    if count == 0 {
        return 0.0;
    }

    #[expect(clippy::cast_precision_loss)]
    let mean = sum / count as f64;
    mean
}

/// Histogram bin of a value at `offset` from the mean.
fn value_bin(offset: f64, precision: f64) -> usize {
    #[expect(clippy::cast_possible_truncation)]
    let steps = (offset / precision) as i64;
    let steps = if offset > 0.0 { steps } else { steps - 1 };

    #[expect(clippy::cast_possible_wrap)]
    let bin = steps.saturating_add(VALUE_RADIUS as i64);

    #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let bin = bin.clamp(0, (VALUE_RADIUS * 2 - 1) as i64) as usize;
    bin
}
