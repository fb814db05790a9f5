use core::fmt;
use std::sync::Arc;

use opentelemetry::KeyValue;

use crate::metrics::aggregation::validate_bucket_boundaries;
use crate::metrics::error::{MetricError, MetricResult};
use crate::metrics::instrument::{InstrumentDescriptor, InstrumentKind};
use crate::metrics::internal::Number;

use super::{HistogramBuilder, SyncInstrument};

/// An instrument that records a distribution of values.
#[derive(Clone)]
#[non_exhaustive]
pub struct Histogram<T>(Arc<SyncInstrument<T>>);

impl<T> fmt::Debug for Histogram<T>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("Histogram<{}>", std::any::type_name::<T>()))
    }
}

impl<T: Number> Histogram<T> {
    pub(crate) fn new(inner: Arc<SyncInstrument<T>>) -> Self {
        Histogram(inner)
    }

    /// Adds an additional value to the distribution.
    ///
    /// Non-finite values are rejected.
    pub fn record(&self, value: T, attributes: &[KeyValue]) -> MetricResult<()> {
        self.0.measure(value, attributes)
    }
}

impl<T: Number> TryFrom<HistogramBuilder<'_, Histogram<T>>> for Histogram<T> {
    type Error = MetricError;

    fn try_from(builder: HistogramBuilder<'_, Histogram<T>>) -> MetricResult<Self> {
        if let Some(boundaries) = &builder.boundaries {
            validate_bucket_boundaries(boundaries)?;
        }
        let descriptor = InstrumentDescriptor::new(
            builder.name,
            InstrumentKind::Histogram,
            T::VALUE_TYPE,
            builder.description,
            builder.unit,
        );
        builder
            .meter
            .create_sync::<T>(descriptor, builder.boundaries.as_deref())
            .map(Histogram::new)
    }
}
