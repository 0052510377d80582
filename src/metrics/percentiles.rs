use hdrhistogram::Histogram;
use serde::Serialize;

/// Quantile levels reported for every distribution.
const LEVELS: [f64; 5] = [0.5, 0.75, 0.95, 0.99, 0.999];

/// A complete percentile breakdown of one distribution.
/// Serialized straight into the JSON snapshot and into sink payloads.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PercentileSet {
    pub count: u64,
    pub min: i64,
    pub max: i64,
    pub mean: f64,
    pub stddev: f64,
    pub p50: f64,
    pub p75: f64,
    pub p95: f64,
    pub p99: f64,
    pub p999: f64,
}

impl PercentileSet {
    /// Summarise a reservoir of sampled values.
    ///
    /// `count` is the number of observations ever recorded, which is larger
    /// than `values.len()` once the reservoir has started evicting.
    #[allow(clippy::cast_precision_loss)]
    pub fn from_samples(count: u64, values: &mut [i64]) -> Self {
        if values.is_empty() {
            return Self::empty();
        }
        values.sort_unstable();
        let values: &[i64] = values;

        let n = values.len() as f64;
        let mean = values.iter().map(|&v| v as f64).sum::<f64>() / n;
        let variance = values
            .iter()
            .map(|&v| (v as f64 - mean).powi(2))
            .sum::<f64>()
            / n;
        let [p50, p75, p95, p99, p999] = LEVELS.map(|q| interpolate(values, q));

        Self {
            count,
            min: values[0],
            max: values[values.len() - 1],
            mean,
            stddev: variance.sqrt(),
            p50,
            p75,
            p95,
            p99,
            p999,
        }
    }

    /// Extract a full percentile set from an HdrHistogram.
    /// Returns zeroed values if the histogram is empty.
    #[allow(clippy::cast_possible_wrap)]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_histogram(hist: &Histogram<u64>) -> Self {
        if hist.len() == 0 {
            return Self::empty();
        }

        let [p50, p75, p95, p99, p999] =
            LEVELS.map(|q| hist.value_at_quantile(q) as f64);

        Self {
            count: hist.len(),
            min: hist.min() as i64,
            max: hist.max() as i64,
            mean: hist.mean(),
            stddev: hist.stdev(),
            p50,
            p75,
            p95,
            p99,
            p999,
        }
    }

    /// All-zero placeholder used before any samples are recorded.
    pub fn empty() -> Self {
        Self {
            count: 0,
            min: 0,
            max: 0,
            mean: 0.0,
            stddev: 0.0,
            p50: 0.0,
            p75: 0.0,
            p95: 0.0,
            p99: 0.0,
            p999: 0.0,
        }
    }

    pub fn has_data(&self) -> bool {
        self.count > 0
    }
}

/// Linear interpolation between the two closest ranks of a sorted slice,
/// using the `(n + 1)·q` rank convention.
#[allow(clippy::cast_precision_loss)]
#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
fn interpolate(sorted: &[i64], q: f64) -> f64 {
    let n = sorted.len();
    let pos = q * (n as f64 + 1.0);
    if pos < 1.0 {
        return sorted[0] as f64;
    }
    if pos >= n as f64 {
        return sorted[n - 1] as f64;
    }
    let lower = sorted[pos as usize - 1] as f64;
    let upper = sorted[pos as usize] as f64;
    lower + (pos - pos.floor()) * (upper - lower)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_sets_are_zeroed() {
        assert!(!PercentileSet::from_samples(0, &mut []).has_data());
        let hist = Histogram::<u64>::new(3).unwrap();
        assert_eq!(PercentileSet::from_histogram(&hist), PercentileSet::empty());
    }

    #[test]
    fn samples_one_to_hundred() {
        let mut values: Vec<i64> = (1..=100).rev().collect();
        let set = PercentileSet::from_samples(250, &mut values);

        assert_eq!(set.count, 250);
        assert_eq!(set.min, 1);
        assert_eq!(set.max, 100);
        assert!((set.mean - 50.5).abs() < 1e-9);
        assert!((set.p50 - 50.5).abs() < 1e-9);
        assert!((set.p75 - 75.75).abs() < 1e-9);
        assert_eq!(set.p999, 100.0);
    }

    #[test]
    fn single_sample() {
        let set = PercentileSet::from_samples(1, &mut [7]);
        assert_eq!(set.min, 7);
        assert_eq!(set.p50, 7.0);
        assert_eq!(set.p99, 7.0);
        assert_eq!(set.stddev, 0.0);
    }
}
