//! # OpenTelemetry Metrics SDK core
//!
//! The in-process collection engine behind an OpenTelemetry metrics SDK. It
//! turns instrument updates into aggregated, immutable data points that can be
//! handed to any number of independent export pipelines.
//!
//! The engine is organised around a few pieces:
//!
//! * [`SdkMeterProvider`] owns the state shared by every meter: the
//!   [`Resource`], the SDK start time, the registered [`View`]s and the
//!   registered [`MetricCollector`]s.
//! * A [`Meter`] creates instruments for one instrumentation scope. Each
//!   instrument is backed by one storage per matching view.
//! * A [`MetricCollector`] identifies one export pipeline and its preferred
//!   [`Temporality`]. Every storage keeps a separate cursor per collector, so a
//!   delta pipeline and a cumulative pipeline can read the same instruments
//!   without disturbing each other.
//!
//! ## Example
//!
//! ```
//! use std::time::SystemTime;
//! use opentelemetry::KeyValue;
//! use opentelemetry_metrics_sdk::metrics::{SdkMeterProvider, Temporality};
//!
//! let provider = SdkMeterProvider::builder().build();
//! let collector = provider.register_collector(Temporality::Delta);
//!
//! let meter = provider.meter("my_library");
//! let counter = meter.counter::<i64>("requests").with_unit("1").build()?;
//! counter.add(1, &[KeyValue::new("route", "/")])?;
//!
//! let result = provider.collect_blocking(&collector, SystemTime::now());
//! assert_eq!(result.metrics.len(), 1);
//! assert!(result.errors.is_empty());
//! # Ok::<(), opentelemetry_metrics_sdk::metrics::MetricError>(())
//! ```
//!
//! [`SdkMeterProvider`]: metrics::SdkMeterProvider
//! [`View`]: metrics::View
//! [`Meter`]: metrics::Meter
//! [`MetricCollector`]: metrics::MetricCollector
//! [`Temporality`]: metrics::Temporality
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![allow(clippy::needless_doctest_main)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]
#![doc(
    html_logo_url = "https://raw.githubusercontent.com/open-telemetry/opentelemetry-rust/main/assets/logo.svg"
)]

pub mod metrics;
pub mod resource;

pub use resource::Resource;
