use std::fmt;

use crate::metrics::error::{MetricError, MetricResult};
use crate::metrics::instrument::InstrumentKind;
use crate::metrics::internal::{Aggregator, HistogramConfig};

/// Histogram boundaries used when neither a view nor the instrument supplies
/// any.
pub const DEFAULT_HISTOGRAM_BOUNDARIES: [f64; 15] = [
    0.0, 5.0, 10.0, 25.0, 50.0, 75.0, 100.0, 250.0, 500.0, 750.0, 1000.0, 2500.0, 5000.0, 7500.0,
    10000.0,
];

/// The way recorded measurements are summarized.
#[derive(Clone, Debug, Default, PartialEq)]
#[non_exhaustive]
pub enum Aggregation {
    /// An aggregation that uses the default selection for the instrument kind.
    ///
    /// Counters and up/down counters are summed, histograms use
    /// [DEFAULT_HISTOGRAM_BOUNDARIES] (or the boundaries advised by the
    /// instrument) and observable gauges keep their last value.
    #[default]
    Default,

    /// An aggregation that drops all recorded data. No storage is created.
    Drop,

    /// An aggregation that summarizes a set of measurements as their arithmetic
    /// sum.
    Sum,

    /// An aggregation that summarizes a set of measurements as the last one made.
    LastValue,

    /// An aggregation that summarizes a set of measurements as a histogram with
    /// explicitly defined buckets.
    ExplicitBucketHistogram {
        /// The strictly increasing lower bounds of the buckets.
        ///
        /// Bucket `i` holds measurements in `[boundaries[i], boundaries[i + 1])`,
        /// the last bucket is unbounded above and measurements below the first
        /// boundary are counted in the first bucket. Boundaries `[0.0, 100.0]`
        /// define the buckets `[0, 100)` and `[100, +∞)`.
        boundaries: Vec<f64>,

        /// Whether the min and max of the distribution are recorded.
        record_min_max: bool,
    },
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Aggregation::Drop => "Drop",
            Aggregation::Default => "Default",
            Aggregation::Sum => "Sum",
            Aggregation::LastValue => "LastValue",
            Aggregation::ExplicitBucketHistogram { .. } => "ExplicitBucketHistogram",
        };

        f.write_str(name)
    }
}

impl Aggregation {
    /// Validate that this aggregation has correct configuration
    pub fn validate(&self) -> MetricResult<()> {
        match self {
            Aggregation::ExplicitBucketHistogram { boundaries, .. } => {
                validate_bucket_boundaries(boundaries)
            }
            _ => Ok(()),
        }
    }

    /// Checks that this aggregation can summarize measurements of `kind`.
    pub fn check_compatible(&self, kind: InstrumentKind) -> MetricResult<()> {
        let compatible = match self {
            Aggregation::Default | Aggregation::Drop => true,
            Aggregation::Sum => matches!(
                kind,
                InstrumentKind::Counter
                    | InstrumentKind::UpDownCounter
                    | InstrumentKind::Histogram
                    | InstrumentKind::ObservableCounter
                    | InstrumentKind::ObservableUpDownCounter
            ),
            Aggregation::LastValue => kind == InstrumentKind::ObservableGauge,
            Aggregation::ExplicitBucketHistogram { .. } => kind == InstrumentKind::Histogram,
        };
        if compatible {
            Ok(())
        } else {
            Err(MetricError::Config(format!(
                "{self} aggregation is not compatible with {kind:?} instruments"
            )))
        }
    }

    /// Resolves [Aggregation::Default] to the aggregation used for `kind`.
    pub(crate) fn resolve(&self, kind: InstrumentKind, advisory: Option<&[f64]>) -> Aggregation {
        match self {
            Aggregation::Default => match kind {
                InstrumentKind::Counter
                | InstrumentKind::UpDownCounter
                | InstrumentKind::ObservableCounter
                | InstrumentKind::ObservableUpDownCounter => Aggregation::Sum,
                InstrumentKind::ObservableGauge => Aggregation::LastValue,
                InstrumentKind::Histogram => Aggregation::ExplicitBucketHistogram {
                    boundaries: advisory
                        .map(<[f64]>::to_vec)
                        .unwrap_or_else(|| DEFAULT_HISTOGRAM_BOUNDARIES.to_vec()),
                    record_min_max: true,
                },
            },
            other => other.clone(),
        }
    }

    /// Returns the aggregator for `kind`, or `None` when data is dropped.
    pub(crate) fn aggregator(
        &self,
        kind: InstrumentKind,
        advisory: Option<&[f64]>,
    ) -> MetricResult<Option<Aggregator>> {
        self.check_compatible(kind)?;
        let aggregator = match self.resolve(kind, advisory) {
            Aggregation::Drop => None,
            Aggregation::Sum => Some(Aggregator::Sum {
                monotonic: kind.is_monotonic(),
            }),
            Aggregation::LastValue => Some(Aggregator::LastValue),
            Aggregation::ExplicitBucketHistogram {
                boundaries,
                record_min_max,
            } => Some(Aggregator::Histogram(HistogramConfig::new(
                boundaries,
                record_min_max,
            ))),
            Aggregation::Default => None,
        };
        Ok(aggregator)
    }
}

pub(crate) fn validate_bucket_boundaries(boundaries: &[f64]) -> MetricResult<()> {
    // Validate boundaries do not contain f64::NaN, f64::INFINITY, or f64::NEG_INFINITY
    if boundaries.iter().any(|x| !x.is_finite()) {
        return Err(MetricError::Config(
            "Bucket boundaries must not contain NaN, +Inf, or -Inf".to_string(),
        ));
    }
    for x in boundaries.windows(2) {
        if x[0] >= x[1] {
            return Err(MetricError::Config(format!(
                "aggregation: explicit bucket histogram: non-monotonic boundaries: {boundaries:?}",
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Aggregation::Sum, InstrumentKind::Counter, true)]
    #[case(Aggregation::Sum, InstrumentKind::Histogram, true)]
    #[case(Aggregation::Sum, InstrumentKind::ObservableGauge, false)]
    #[case(Aggregation::LastValue, InstrumentKind::ObservableGauge, true)]
    #[case(Aggregation::LastValue, InstrumentKind::Counter, false)]
    #[case(Aggregation::ExplicitBucketHistogram { boundaries: vec![1.0], record_min_max: true }, InstrumentKind::Histogram, true)]
    #[case(Aggregation::ExplicitBucketHistogram { boundaries: vec![1.0], record_min_max: true }, InstrumentKind::UpDownCounter, false)]
    #[case(Aggregation::Drop, InstrumentKind::ObservableUpDownCounter, true)]
    #[case(Aggregation::Default, InstrumentKind::ObservableCounter, true)]
    fn compatibility(
        #[case] aggregation: Aggregation,
        #[case] kind: InstrumentKind,
        #[case] compatible: bool,
    ) {
        assert_eq!(aggregation.check_compatible(kind).is_ok(), compatible);
    }

    #[test]
    fn default_resolution() {
        assert_eq!(
            Aggregation::Default.resolve(InstrumentKind::UpDownCounter, None),
            Aggregation::Sum
        );
        assert_eq!(
            Aggregation::Default.resolve(InstrumentKind::ObservableGauge, None),
            Aggregation::LastValue
        );
        assert_eq!(
            Aggregation::Default.resolve(InstrumentKind::Histogram, None),
            Aggregation::ExplicitBucketHistogram {
                boundaries: DEFAULT_HISTOGRAM_BOUNDARIES.to_vec(),
                record_min_max: true,
            }
        );
        assert_eq!(
            Aggregation::Default.resolve(InstrumentKind::Histogram, Some(&[1.0, 2.0])),
            Aggregation::ExplicitBucketHistogram {
                boundaries: vec![1.0, 2.0],
                record_min_max: true,
            }
        );
    }

    #[test]
    fn sum_monotonicity_follows_kind() {
        assert_eq!(
            Aggregation::Default
                .aggregator(InstrumentKind::Counter, None)
                .unwrap(),
            Some(Aggregator::Sum { monotonic: true })
        );
        assert_eq!(
            Aggregation::Default
                .aggregator(InstrumentKind::ObservableUpDownCounter, None)
                .unwrap(),
            Some(Aggregator::Sum { monotonic: false })
        );
        assert_eq!(
            Aggregation::Drop
                .aggregator(InstrumentKind::Counter, None)
                .unwrap(),
            None
        );
    }

    #[test]
    fn invalid_boundaries() {
        let invalid = [
            vec![f64::NAN],
            vec![0.0, f64::INFINITY],
            vec![1.0, 1.0],
            vec![2.0, 1.0],
        ];
        for boundaries in invalid {
            let agg = Aggregation::ExplicitBucketHistogram {
                boundaries,
                record_min_max: true,
            };
            assert!(agg.validate().is_err());
        }
        assert!(validate_bucket_boundaries(&[]).is_ok());
        assert!(validate_bucket_boundaries(&[-1.0, 0.0, 10.5]).is_ok());
    }
}
