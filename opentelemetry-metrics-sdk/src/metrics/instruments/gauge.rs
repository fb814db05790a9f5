use core::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::metrics::error::{MetricError, MetricResult};
use crate::metrics::instrument::InstrumentKind;
use crate::metrics::internal::Number;
use crate::metrics::observer::{
    async_callback, sync_callback, CallbackError, Callbacks, ObservableResult,
};

use super::AsyncInstrumentBuilder;

/// An async instrument that reports the current value of something, such as
/// a temperature or a queue length.
#[derive(Clone)]
#[non_exhaustive]
pub struct ObservableGauge<T>(Arc<Callbacks<T>>);

impl<T: Number> ObservableGauge<T> {
    pub(crate) fn new(callbacks: Arc<Callbacks<T>>) -> Self {
        ObservableGauge(callbacks)
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

impl<T> fmt::Debug for ObservableGauge<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!(
            "ObservableGauge<{}>",
            std::any::type_name::<T>()
        ))
    }
}

impl<T: Number> TryFrom<AsyncInstrumentBuilder<'_, ObservableGauge<T>, T>> for ObservableGauge<T> {
    type Error = MetricError;

    fn try_from(
        builder: AsyncInstrumentBuilder<'_, ObservableGauge<T>, T>,
    ) -> MetricResult<Self> {
        let descriptor = builder.descriptor(InstrumentKind::ObservableGauge);
        builder
            .meter
            .create_observable(descriptor, builder.callbacks)
            .map(ObservableGauge::new)
    }
}
