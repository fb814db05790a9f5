//! Instrument handles and the builders that create them.

use core::fmt;
use std::borrow::Cow;
use std::future::Future;
use std::marker;
use std::sync::Arc;

use opentelemetry::{otel_debug, KeyValue};

use crate::metrics::error::{MetricError, MetricResult};
use crate::metrics::instrument::{InstrumentDescriptor, InstrumentKind};
use crate::metrics::internal::Number;
use crate::metrics::meter::Meter;
use crate::metrics::observer::{
    async_callback, sync_callback, Callback, CallbackError, ObservableResult,
};
use crate::metrics::storage::SyncMetricStorage;

mod counter;
mod gauge;
mod histogram;
mod up_down_counter;

pub use counter::{Counter, ObservableCounter};
pub use gauge::ObservableGauge;
pub use histogram::Histogram;
pub use up_down_counter::{ObservableUpDownCounter, UpDownCounter};

/// Rejects values an instrument cannot record.
///
/// Non-finite values are rejected by every instrument, negative values by
/// monotonic ones.
pub(crate) fn validate_measurement<T: Number>(
    descriptor: &InstrumentDescriptor,
    value: T,
) -> MetricResult<()> {
    if !value.into_float().is_finite() {
        return Err(MetricError::InvalidMeasurement {
            instrument: descriptor.name().to_owned(),
            reason: "value must be finite",
        });
    }
    if descriptor.kind().is_monotonic() && value < T::default() {
        return Err(MetricError::InvalidMeasurement {
            instrument: descriptor.name().to_owned(),
            reason: "monotonic instruments only accept non-negative values",
        });
    }
    Ok(())
}

/// The shared state behind every handle of one synchronous instrument.
#[derive(Debug)]
pub(crate) struct SyncInstrument<T> {
    descriptor: InstrumentDescriptor,
    storages: Vec<Arc<SyncMetricStorage<T>>>,
}

impl<T: Number> SyncInstrument<T> {
    pub(crate) fn new(
        descriptor: InstrumentDescriptor,
        storages: Vec<Arc<SyncMetricStorage<T>>>,
    ) -> Self {
        SyncInstrument {
            descriptor,
            storages,
        }
    }

    /// Validates a measurement once and hands it to every storage.
    pub(crate) fn measure(&self, value: T, attrs: &[KeyValue]) -> MetricResult<()> {
        if let Err(err) = validate_measurement(&self.descriptor, value) {
            otel_debug!(
                name: "Instrument.InvalidMeasurement",
                instrument_name = self.descriptor.name(),
                reason = format!("{err}"),
            );
            return Err(err);
        }
        for storage in &self.storages {
            storage.record(value, attrs);
        }
        Ok(())
    }
}

/// Configuration for building a sync instrument.
pub struct InstrumentBuilder<'a, T> {
    pub(crate) meter: &'a Meter,
    pub(crate) name: Cow<'static, str>,
    pub(crate) description: Option<Cow<'static, str>>,
    pub(crate) unit: Option<Cow<'static, str>>,
    _marker: marker::PhantomData<T>,
}

impl<'a, T> InstrumentBuilder<'a, T>
where
    T: TryFrom<Self, Error = MetricError>,
{
    /// Create a new instrument builder
    pub(crate) fn new(meter: &'a Meter, name: Cow<'static, str>) -> Self {
        InstrumentBuilder {
            meter,
            name,
            description: None,
            unit: None,
            _marker: marker::PhantomData,
        }
    }

    /// Set the description for this instrument
    pub fn with_description<S: Into<Cow<'static, str>>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the unit for this instrument.
    ///
    /// Unit is case sensitive(`kb` is not the same as `kB`).
    ///
    /// Unit must be:
    /// - ASCII string
    /// - No longer than 63 characters
    pub fn with_unit<S: Into<Cow<'static, str>>>(mut self, unit: S) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Validate the instrument configuration and creates a new instrument.
    pub fn build(self) -> MetricResult<T> {
        T::try_from(self)
    }

    pub(crate) fn descriptor<N: Number>(&self, kind: InstrumentKind) -> InstrumentDescriptor {
        InstrumentDescriptor::new(
            self.name.clone(),
            kind,
            N::VALUE_TYPE,
            self.description.clone(),
            self.unit.clone(),
        )
    }
}

impl<T> fmt::Debug for InstrumentBuilder<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstrumentBuilder")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("unit", &self.unit)
            .field("kind", &std::any::type_name::<T>())
            .finish()
    }
}

/// Configuration for building a Histogram.
pub struct HistogramBuilder<'a, T> {
    pub(crate) meter: &'a Meter,
    pub(crate) name: Cow<'static, str>,
    pub(crate) description: Option<Cow<'static, str>>,
    pub(crate) unit: Option<Cow<'static, str>>,
    pub(crate) boundaries: Option<Vec<f64>>,
    _marker: marker::PhantomData<T>,
}

impl<'a, T> HistogramBuilder<'a, T>
where
    T: TryFrom<Self, Error = MetricError>,
{
    /// Create a new instrument builder
    pub(crate) fn new(meter: &'a Meter, name: Cow<'static, str>) -> Self {
        HistogramBuilder {
            meter,
            name,
            description: None,
            unit: None,
            boundaries: None,
            _marker: marker::PhantomData,
        }
    }

    /// Set the description for this instrument
    pub fn with_description<S: Into<Cow<'static, str>>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the unit for this instrument.
    ///
    /// Unit is case sensitive(`kb` is not the same as `kB`).
    ///
    /// Unit must be:
    /// - ASCII string
    /// - No longer than 63 characters
    pub fn with_unit<S: Into<Cow<'static, str>>>(mut self, unit: S) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Set the boundaries for this histogram.
    ///
    /// Used when no view configures the aggregation of this histogram.
    /// Boundaries must be finite and strictly increasing.
    pub fn with_boundaries(mut self, boundaries: Vec<f64>) -> Self {
        self.boundaries = Some(boundaries);
        self
    }

    /// Validate the instrument configuration and creates a new instrument.
    pub fn build(self) -> MetricResult<T> {
        T::try_from(self)
    }
}

impl<T> fmt::Debug for HistogramBuilder<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HistogramBuilder")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("unit", &self.unit)
            .field("boundaries", &self.boundaries)
            .field("kind", &std::any::type_name::<T>())
            .finish()
    }
}

/// Configuration for building an async instrument.
pub struct AsyncInstrumentBuilder<'a, I, M> {
    pub(crate) meter: &'a Meter,
    pub(crate) name: Cow<'static, str>,
    pub(crate) description: Option<Cow<'static, str>>,
    pub(crate) unit: Option<Cow<'static, str>>,
    pub(crate) callbacks: Vec<Callback<M>>,
    _inst: marker::PhantomData<I>,
}

impl<'a, I, M> AsyncInstrumentBuilder<'a, I, M>
where
    I: TryFrom<Self, Error = MetricError>,
    M: Number,
{
    /// Create a new instrument builder
    pub(crate) fn new(meter: &'a Meter, name: Cow<'static, str>) -> Self {
        AsyncInstrumentBuilder {
            meter,
            name,
            description: None,
            unit: None,
            callbacks: Vec::new(),
            _inst: marker::PhantomData,
        }
    }

    /// Set the description for this instrument
    pub fn with_description<S: Into<Cow<'static, str>>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the unit for this instrument.
    ///
    /// Unit is case sensitive(`kb` is not the same as `kB`).
    ///
    /// Unit must be:
    /// - ASCII string
    /// - No longer than 63 characters
    pub fn with_unit<S: Into<Cow<'static, str>>>(mut self, unit: S) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Set a callback to be called for this instrument at every collection.
    pub fn with_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ObservableResult<M>) + Send + Sync + 'static,
    {
        self.callbacks.push(sync_callback(callback));
        self
    }

    /// Set a fallible, asynchronous callback to be awaited at every collection.
    ///
    /// An error or a panic fails the collection of this instrument only.
    pub fn with_async_callback<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn(ObservableResult<M>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), CallbackError>> + Send + 'static,
    {
        self.callbacks.push(async_callback(callback));
        self
    }

    /// Validate the instrument configuration and creates a new instrument.
    pub fn build(self) -> MetricResult<I> {
        I::try_from(self)
    }

    pub(crate) fn descriptor(&self, kind: InstrumentKind) -> InstrumentDescriptor {
        InstrumentDescriptor::new(
            self.name.clone(),
            kind,
            M::VALUE_TYPE,
            self.description.clone(),
            self.unit.clone(),
        )
    }
}

impl<I, M> fmt::Debug for AsyncInstrumentBuilder<'_, I, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstrumentBuilder")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("unit", &self.unit)
            .field("kind", &std::any::type_name::<I>())
            .field("callbacks_len", &self.callbacks.len())
            .finish()
    }
}
