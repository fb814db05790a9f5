use core::fmt;
use std::future::Future;
use std::sync::Arc;

use opentelemetry::KeyValue;

use crate::metrics::error::{MetricError, MetricResult};
use crate::metrics::instrument::InstrumentKind;
use crate::metrics::internal::Number;
use crate::metrics::observer::{
    async_callback, sync_callback, CallbackError, Callbacks, ObservableResult,
};

use super::{AsyncInstrumentBuilder, InstrumentBuilder, SyncInstrument};

/// An instrument that records increasing values.
///
/// Handles are cheap to clone and share the same storage.
#[derive(Clone)]
#[non_exhaustive]
pub struct Counter<T>(Arc<SyncInstrument<T>>);

impl<T> fmt::Debug for Counter<T>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("Counter<{}>", std::any::type_name::<T>()))
    }
}

impl<T: Number> Counter<T> {
    pub(crate) fn new(inner: Arc<SyncInstrument<T>>) -> Self {
        Counter(inner)
    }

    /// Records an increment to the counter.
    ///
    /// Negative and non-finite values are rejected and leave the counter
    /// unchanged.
    pub fn add(&self, value: T, attributes: &[KeyValue]) -> MetricResult<()> {
        self.0.measure(value, attributes)
    }
}

impl<T: Number> TryFrom<InstrumentBuilder<'_, Counter<T>>> for Counter<T> {
    type Error = MetricError;

    fn try_from(builder: InstrumentBuilder<'_, Counter<T>>) -> MetricResult<Self> {
        let descriptor = builder.descriptor::<T>(InstrumentKind::Counter);
        builder
            .meter
            .create_sync::<T>(descriptor, None)
            .map(Counter::new)
    }
}

/// An async instrument that reports increasing totals.
///
/// Every observation is the current total for its attribute set.
#[derive(Clone)]
#[non_exhaustive]
pub struct ObservableCounter<T>(Arc<Callbacks<T>>);

impl<T: Number> ObservableCounter<T> {
    pub(crate) fn new(callbacks: Arc<Callbacks<T>>) -> Self {
        ObservableCounter(callbacks)
    }

    /// Registers another callback, invoked at every collection together with
    /// the callbacks already registered.
    pub fn register_callback<F>(&self, callback: F)
    where
        F: Fn(&ObservableResult<T>) + Send + Sync + 'static,
    {
        self.0.push(sync_callback(callback))
    }

    /// Registers another fallible, asynchronous callback.
    pub fn register_async_callback<F, Fut>(&self, callback: F)
    where
        F: Fn(ObservableResult<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), CallbackError>> + Send + 'static,
    {
        self.0.push(async_callback(callback))
    }
}

impl<T> fmt::Debug for ObservableCounter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!(
            "ObservableCounter<{}>",
            std::any::type_name::<T>()
        ))
    }
}

impl<T: Number> TryFrom<AsyncInstrumentBuilder<'_, ObservableCounter<T>, T>>
    for ObservableCounter<T>
{
    type Error = MetricError;

    fn try_from(
        builder: AsyncInstrumentBuilder<'_, ObservableCounter<T>, T>,
    ) -> MetricResult<Self> {
        let descriptor = builder.descriptor(InstrumentKind::ObservableCounter);
        builder
            .meter
            .create_observable(descriptor, builder.callbacks)
            .map(ObservableCounter::new)
    }
}
