use crate::metrics::data::PointValue;

use super::histogram::{bucket_index, Buckets, HistogramConfig};
use super::Number;

/// How measurements of one storage are combined.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Aggregator {
    /// Arithmetic sum of all measurements.
    Sum { monotonic: bool },
    /// The last observed value.
    LastValue,
    /// Explicit bucket histogram.
    Histogram(HistogramConfig),
}

/// Running state of one attribute set.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Accumulation<T> {
    Sum(T),
    LastValue(T),
    Histogram(Buckets<T>),
}

impl Aggregator {
    pub(crate) fn create<T: Number>(&self) -> Accumulation<T> {
        match self {
            Aggregator::Sum { .. } => Accumulation::Sum(T::default()),
            Aggregator::LastValue => Accumulation::LastValue(T::default()),
            Aggregator::Histogram(config) => {
                Accumulation::Histogram(Buckets::new(config.bucket_count()))
            }
        }
    }

    /// Applies a single measurement.
    pub(crate) fn update<T: Number>(&self, acc: &mut Accumulation<T>, value: T) {
        match (self, acc) {
            (Aggregator::Sum { .. }, Accumulation::Sum(sum)) => *sum = sum.wrapping_add(value),
            (Aggregator::LastValue, Accumulation::LastValue(last)) => *last = value,
            (Aggregator::Histogram(config), Accumulation::Histogram(buckets)) => {
                buckets.bin(bucket_index(&config.bounds, value.into_float()), value)
            }
            // accumulations are always created by their own aggregator
            _ => {}
        }
    }

    /// The running value, as reported to a cumulative collector.
    pub(crate) fn cumulative<T: Number>(&self, acc: &Accumulation<T>) -> PointValue<T> {
        match acc {
            Accumulation::Sum(value) => PointValue::Sum {
                value: *value,
                is_monotonic: self.is_monotonic(),
            },
            Accumulation::LastValue(value) => PointValue::Gauge(*value),
            Accumulation::Histogram(buckets) => match self {
                Aggregator::Histogram(config) => PointValue::Histogram(buckets.to_value(config)),
                _ => PointValue::Histogram(buckets.to_value(&HistogramConfig::new(vec![], false))),
            },
        }
    }

    fn is_monotonic(&self) -> bool {
        matches!(self, Aggregator::Sum { monotonic: true })
    }

    /// The change since `baseline`, as reported to a delta collector.
    ///
    /// A missing baseline means the collector never saw this attribute set.
    /// Gauges report the current value as is.
    pub(crate) fn delta<T: Number>(
        &self,
        acc: &Accumulation<T>,
        baseline: Option<&Accumulation<T>>,
    ) -> PointValue<T> {
        match (self, acc, baseline) {
            (
                Aggregator::Sum { monotonic },
                Accumulation::Sum(value),
                Some(Accumulation::Sum(prev)),
            ) => PointValue::Sum {
                value: value.wrapping_sub(*prev),
                is_monotonic: *monotonic,
            },
            (
                Aggregator::Histogram(config),
                Accumulation::Histogram(buckets),
                Some(Accumulation::Histogram(prev)),
            ) => PointValue::Histogram(buckets.since(prev, config)),
            _ => self.cumulative(acc),
        }
    }
}
