//! The collection engine of the OpenTelemetry metrics SDK.
//!
//! ## Configuration
//!
//! The configuration is stored with each [SdkMeterProvider]. The [Resource],
//! the [View]s and the SDK start time can be specified. Export pipelines are
//! registered as [MetricCollector]s, each with its own [Temporality].
//!
//! ### Example
//!
//! ```
//! use std::time::SystemTime;
//! use opentelemetry::KeyValue;
//! use opentelemetry_metrics_sdk::metrics::{Aggregation, SdkMeterProvider, Temporality, View};
//! use opentelemetry_metrics_sdk::Resource;
//!
//! // Generate SDK configuration, resource, views, etc
//! let resource = Resource::builder()
//!     .with_attribute(KeyValue::new("service.name", "my_app"))
//!     .build();
//! let view = View::builder()
//!     .with_instrument_name("*.latency")
//!     .with_aggregation(Aggregation::ExplicitBucketHistogram {
//!         boundaries: vec![0.0, 0.1, 1.0],
//!         record_min_max: true,
//!     })
//!     .build()?;
//!
//! // Create a meter provider with the desired config
//! let meter_provider = SdkMeterProvider::builder()
//!     .with_resource(resource)
//!     .with_view(view)
//!     .build();
//! let collector = meter_provider.register_collector(Temporality::Cumulative);
//!
//! // Create instruments scoped to the meter
//! let meter = meter_provider.meter("my_app");
//! let counter = meter
//!     .counter::<i64>("power_consumption")
//!     .with_unit("kWh")
//!     .build()?;
//!
//! // use instruments to record measurements
//! counter.add(10, &[KeyValue::new("rate", "standard")])?;
//!
//! let result = meter_provider.collect_blocking(&collector, SystemTime::now());
//! assert_eq!(result.metrics[0].name(), "power_consumption");
//!
//! meter_provider.shutdown()?;
//! # Ok::<(), opentelemetry_metrics_sdk::metrics::MetricError>(())
//! ```
//!
//! [Resource]: crate::Resource

pub(crate) mod aggregation;
pub(crate) mod attribute_set;
pub(crate) mod collector;
pub mod data;
mod error;
pub(crate) mod instrument;
pub(crate) mod instruments;
pub(crate) mod internal;
pub(crate) mod meter;
mod meter_provider;
pub(crate) mod observer;
pub(crate) mod storage;
pub(crate) mod view;

pub use aggregation::{Aggregation, DEFAULT_HISTOGRAM_BOUNDARIES};
pub use collector::MetricCollector;
pub use error::{MetricError, MetricResult};
pub use instrument::{InstrumentDescriptor, InstrumentKind, ValueType};
pub use instruments::{
    AsyncInstrumentBuilder, Counter, Histogram, HistogramBuilder, InstrumentBuilder,
    ObservableCounter, ObservableGauge, ObservableUpDownCounter, UpDownCounter,
};
pub use internal::Number;
pub use meter::Meter;
pub use meter_provider::*;
pub use observer::{CallbackError, ObservableResult};
pub use view::{View, ViewBuilder};

/// Defines the window that an aggregation was calculated over.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Temporality {
    /// A measurement interval that continues to expand forward in time from a
    /// starting point.
    ///
    /// New measurements are added to all previous measurements since a start time.
    #[default]
    Cumulative,

    /// A measurement interval that resets each cycle.
    ///
    /// Measurements from one cycle are recorded independently, measurements from
    /// other cycles do not affect them.
    Delta,
}
