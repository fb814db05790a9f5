//! Types for delivery of aggregated metric time series data.

use std::time::SystemTime;

use opentelemetry::{InstrumentationScope, KeyValue};

use crate::metrics::error::MetricError;
use crate::metrics::instrument::InstrumentDescriptor;
use crate::Resource;

use super::Temporality;

/// The aggregated data of one instrument stream, produced for one collector in
/// one collection cycle.
///
/// The `descriptor` reflects any renaming done by the view that produced the
/// stream.
#[derive(Clone, Debug, PartialEq)]
pub struct MetricData {
    /// Identity of the stream (name, kind, unit, value type, description).
    pub descriptor: InstrumentDescriptor,
    /// The entity that produced the measurements.
    pub resource: Resource,
    /// The scope of the meter that created the instrument.
    pub scope: InstrumentationScope,
    /// The temporality preferred by the collector that collected this data.
    pub temporality: Temporality,
    /// One point per attribute set.
    pub points: AggregatedPoints,
}

impl MetricData {
    /// Name of the stream.
    pub fn name(&self) -> &str {
        self.descriptor.name()
    }
}

/// Data points of either value type.
#[derive(Clone, Debug, PartialEq)]
pub enum AggregatedPoints {
    /// Points of an `i64` instrument.
    I64(Vec<DataPoint<i64>>),
    /// Points of an `f64` instrument.
    F64(Vec<DataPoint<f64>>),
}

impl AggregatedPoints {
    /// Number of points.
    pub fn len(&self) -> usize {
        match self {
            AggregatedPoints::I64(points) => points.len(),
            AggregatedPoints::F64(points) => points.len(),
        }
    }

    /// Returns `true` if there are no points.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A single, immutable data point of a time series.
#[derive(Clone, Debug, PartialEq)]
pub struct DataPoint<T> {
    /// The set of key value pairs that uniquely identify the time series.
    pub attributes: Vec<KeyValue>,
    /// The time when the time series was started.
    pub start_time: SystemTime,
    /// The time when the time series was recorded.
    pub time: SystemTime,
    /// The aggregated value.
    pub value: PointValue<T>,
}

/// The aggregated value carried by a [DataPoint].
#[derive(Clone, Debug, PartialEq)]
pub enum PointValue<T> {
    /// Arithmetic sum of measurements.
    Sum {
        /// The sum, or its change for delta temporality.
        value: T,
        /// Whether the sum only ever increases.
        is_monotonic: bool,
    },
    /// The last observed value.
    Gauge(T),
    /// Explicit bucket histogram.
    Histogram(HistogramValue<T>),
}

/// Summary of measurements in explicitly defined buckets.
#[derive(Clone, Debug, PartialEq)]
pub struct HistogramValue<T> {
    /// The lower bounds of the buckets. The last bucket is unbounded above.
    pub bounds: Vec<f64>,
    /// The number of measurements that fell into each bucket.
    pub bucket_counts: Vec<u64>,
    /// The number of measurements.
    pub count: u64,
    /// The sum of the measurements.
    pub sum: T,
    /// The smallest measurement, when known.
    pub min: Option<T>,
    /// The largest measurement, when known.
    pub max: Option<T>,
}

/// Outcome of one collection.
///
/// Failures are isolated per instrument: `errors` holds one entry per
/// instrument that failed while `metrics` holds everything else.
#[derive(Debug, Default)]
pub struct CollectionResult {
    /// The collected streams. Streams with nothing to report are omitted.
    pub metrics: Vec<MetricData>,
    /// Per instrument collection failures.
    pub errors: Vec<MetricError>,
}
