use std::error::Error;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, RwLock};

use futures_util::future::{BoxFuture, FutureExt};
use opentelemetry::KeyValue;

/// Error type returned by fallible observable callbacks.
pub type CallbackError = Box<dyn Error + Send + Sync + 'static>;

pub(crate) type Callback<T> =
    Arc<dyn Fn(ObservableResult<T>) -> BoxFuture<'static, Result<(), CallbackError>> + Send + Sync>;

/// Receives the observations of one callback invocation.
///
/// A fresh result is handed to the callbacks of an instrument at every
/// collection. Observations are only read once every callback of that
/// collection completed.
pub struct ObservableResult<T> {
    observations: Arc<Mutex<Vec<(T, Vec<KeyValue>)>>>,
}

impl<T> Clone for ObservableResult<T> {
    fn clone(&self) -> Self {
        ObservableResult {
            observations: Arc::clone(&self.observations),
        }
    }
}

impl<T> fmt::Debug for ObservableResult<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableResult")
            .field("value_type", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T> ObservableResult<T> {
    pub(crate) fn new() -> Self {
        ObservableResult {
            observations: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Records the current value for a set of attributes.
    ///
    /// Observing the same attribute set twice in one collection keeps the
    /// last observation.
    pub fn observe(&self, value: T, attributes: &[KeyValue]) {
        if let Ok(mut observations) = self.observations.lock() {
            observations.push((value, attributes.to_vec()));
        }
    }

    pub(crate) fn take(&self) -> Vec<(T, Vec<KeyValue>)> {
        self.observations
            .lock()
            .map(|mut observations| std::mem::take(&mut *observations))
            .unwrap_or_else(|err| std::mem::take(&mut *err.into_inner()))
    }
}

/// The callbacks of one observable instrument, shared by its storages and
/// every handle returned for it.
pub(crate) struct Callbacks<T> {
    callbacks: RwLock<Vec<Callback<T>>>,
}

impl<T> fmt::Debug for Callbacks<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = self.callbacks.read().map(|c| c.len()).unwrap_or_default();
        f.debug_struct("Callbacks").field("len", &len).finish()
    }
}

impl<T> Default for Callbacks<T> {
    fn default() -> Self {
        Callbacks {
            callbacks: RwLock::new(Vec::new()),
        }
    }
}

impl<T: Send + 'static> Callbacks<T> {
    pub(crate) fn push(&self, callback: Callback<T>) {
        match self.callbacks.write() {
            Ok(mut callbacks) => callbacks.push(callback),
            Err(err) => err.into_inner().push(callback),
        }
    }

    pub(crate) fn snapshot(&self) -> Vec<Callback<T>> {
        match self.callbacks.read() {
            Ok(callbacks) => callbacks.clone(),
            Err(err) => err.into_inner().clone(),
        }
    }
}

/// Wraps an infallible, synchronous callback.
pub(crate) fn sync_callback<T, F>(callback: F) -> Callback<T>
where
    T: Send + 'static,
    F: Fn(&ObservableResult<T>) + Send + Sync + 'static,
{
    Arc::new(move |result: ObservableResult<T>| {
        callback(&result);
        futures_util::future::ready(Ok::<(), CallbackError>(())).boxed()
    })
}

/// Wraps a fallible callback that is awaited at collection.
pub(crate) fn async_callback<T, F, Fut>(callback: F) -> Callback<T>
where
    T: Send + 'static,
    F: Fn(ObservableResult<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), CallbackError>> + Send + 'static,
{
    Arc::new(move |result: ObservableResult<T>| callback(result).boxed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_executor::block_on;

    #[test]
    fn observations_are_shared_between_clones() {
        let result = ObservableResult::<i64>::new();
        let clone = result.clone();
        clone.observe(1, &[KeyValue::new("a", "b")]);
        result.observe(2, &[]);

        let observations = result.take();
        assert_eq!(observations.len(), 2);
        assert_eq!(observations[0].0, 1);
        assert!(result.take().is_empty());
    }

    #[test]
    fn wrapped_callbacks_observe() {
        let callbacks = Callbacks::<f64>::default();
        callbacks.push(sync_callback(|r: &ObservableResult<f64>| r.observe(1.5, &[])));
        callbacks.push(async_callback(|r: ObservableResult<f64>| async move {
            r.observe(2.5, &[]);
            Ok(())
        }));

        let result = ObservableResult::new();
        for callback in callbacks.snapshot() {
            block_on(callback(result.clone())).unwrap();
        }
        let values: Vec<f64> = result.take().into_iter().map(|(v, _)| v).collect();
        assert_eq!(values, vec![1.5, 2.5]);
    }
}
