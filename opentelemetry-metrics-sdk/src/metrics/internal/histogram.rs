use std::sync::Arc;

use crate::metrics::data::HistogramValue;

use super::Number;

/// Bucket layout shared by every accumulation of one histogram storage.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct HistogramConfig {
    pub(crate) bounds: Arc<[f64]>,
    pub(crate) record_min_max: bool,
}

impl HistogramConfig {
    pub(crate) fn new(bounds: Vec<f64>, record_min_max: bool) -> Self {
        HistogramConfig {
            bounds: bounds.into(),
            record_min_max,
        }
    }

    pub(crate) fn bucket_count(&self) -> usize {
        self.bounds.len().max(1)
    }
}

/// Returns the bucket `value` falls into.
///
/// Bucket `i` covers `[bounds[i], bounds[i + 1])`, the last bucket extends to
/// +∞ and values below `bounds[0]` are counted in the first bucket. With
/// boundaries `[0, 100]` the values `10` and `11` both land in bucket 0.
pub(crate) fn bucket_index(bounds: &[f64], value: f64) -> usize {
    bounds.partition_point(|&b| b <= value).saturating_sub(1)
}

#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct Buckets<T> {
    pub(crate) counts: Vec<u64>,
    pub(crate) count: u64,
    pub(crate) total: T,
    pub(crate) min: T,
    pub(crate) max: T,
}

impl<T: Number> Buckets<T> {
    /// returns buckets with `n` bins.
    pub(crate) fn new(n: usize) -> Buckets<T> {
        Buckets {
            counts: vec![0; n],
            min: T::max(),
            max: T::min(),
            ..Default::default()
        }
    }

    pub(crate) fn bin(&mut self, idx: usize, value: T) {
        self.counts[idx] += 1;
        self.count += 1;
        self.total = self.total.wrapping_add(value);
        if value < self.min {
            self.min = value;
        }
        if value > self.max {
            self.max = value
        }
    }

    pub(crate) fn to_value(&self, config: &HistogramConfig) -> HistogramValue<T> {
        let (min, max) = if config.record_min_max && self.count > 0 {
            (Some(self.min), Some(self.max))
        } else {
            (None, None)
        };
        HistogramValue {
            bounds: config.bounds.to_vec(),
            bucket_counts: self.counts.clone(),
            count: self.count,
            sum: self.total,
            min,
            max,
        }
    }

    /// The change since `baseline`.
    ///
    /// Min and max cannot be derived from two snapshots, they are only known
    /// when the baseline is empty.
    pub(crate) fn since(
        &self,
        baseline: &Buckets<T>,
        config: &HistogramConfig,
    ) -> HistogramValue<T> {
        let bucket_counts = self
            .counts
            .iter()
            .zip(baseline.counts.iter().chain(std::iter::repeat(&0)))
            .map(|(current, prev)| current.saturating_sub(*prev))
            .collect();
        let (min, max) = if config.record_min_max && baseline.count == 0 && self.count > 0 {
            (Some(self.min), Some(self.max))
        } else {
            (None, None)
        };
        HistogramValue {
            bounds: config.bounds.to_vec(),
            bucket_counts,
            count: self.count.saturating_sub(baseline.count),
            sum: self.total.wrapping_sub(baseline.total),
            min,
            max,
        }
    }
}
