use core::fmt;
use std::any::Any;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use futures_util::future::join_all;
use opentelemetry::{otel_debug, otel_warn, InstrumentationScope};

use crate::metrics::collector::MetricCollector;
use crate::metrics::data::MetricData;
use crate::metrics::error::{MetricError, MetricResult};
use crate::metrics::instrument::InstrumentDescriptor;
use crate::metrics::instruments::{
    AsyncInstrumentBuilder, Counter, Histogram, HistogramBuilder, InstrumentBuilder,
    ObservableCounter, ObservableGauge, ObservableUpDownCounter, SyncInstrument, UpDownCounter,
};
use crate::metrics::internal::Number;
use crate::metrics::meter_provider::MeterProviderSharedState;
use crate::metrics::observer::{Callback, Callbacks};
use crate::metrics::storage::{
    AsyncMetricStorage, CollectionRequest, MetricStorage, MultiMetricStorage, ObservedStream,
    SyncMetricStorage,
};
use crate::metrics::view::ViewRegistry;

// maximum length of instrument name
const INSTRUMENT_NAME_MAX_LENGTH: usize = 255;
// maximum length of instrument unit name
const INSTRUMENT_UNIT_NAME_MAX_LENGTH: usize = 63;
const INSTRUMENT_NAME_ALLOWED_NON_ALPHANUMERIC_CHARS: [char; 4] = ['_', '.', '-', '/'];

// instrument validation error strings
const INSTRUMENT_NAME_EMPTY: &str = "instrument name must be non-empty";
const INSTRUMENT_NAME_LENGTH: &str = "instrument name must be less than 256 characters";
const INSTRUMENT_NAME_INVALID_CHAR: &str =
    "characters in instrument name must be ASCII and belong to the alphanumeric characters, '_', '.', '-' and '/'";
const INSTRUMENT_NAME_FIRST_ALPHABETIC: &str =
    "instrument name must start with an alphabetic character";
const INSTRUMENT_UNIT_LENGTH: &str = "instrument unit must be less than 64 characters";
const INSTRUMENT_UNIT_INVALID_CHAR: &str = "characters in instrument unit must be ASCII";

/// One registered instrument.
///
/// `handle` is the shared state every handle of the instrument points to:
/// `SyncInstrument<T>` for sync instruments and `Callbacks<T>` for observable
/// ones. `storage` is `None` when every matching view drops the data.
struct InstrumentEntry {
    descriptor: InstrumentDescriptor,
    storage: Option<Arc<dyn MetricStorage>>,
    handle: Arc<dyn Any + Send + Sync>,
}

struct MeterInner {
    scope: InstrumentationScope,
    views: Arc<ViewRegistry>,
    instruments: RwLock<HashMap<String, InstrumentEntry>>,
}

/// Handles the creation and coordination of all metric instruments.
///
/// A meter represents a single instrumentation scope; all metric telemetry
/// produced by an instrumentation scope will use metric instruments from a
/// single meter.
///
/// Instrument names are case-insensitive within a meter. Creating an
/// instrument whose descriptor is identical to an existing one returns a
/// handle to the existing instrument, any other reuse of the name is a
/// [MetricError::InstrumentConflict].
#[derive(Clone)]
pub struct Meter {
    inner: Arc<MeterInner>,
}

impl fmt::Debug for Meter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let instruments = self
            .inner
            .instruments
            .read()
            .map(|i| i.len())
            .unwrap_or_default();
        f.debug_struct("Meter")
            .field("scope", &self.inner.scope)
            .field("instruments", &instruments)
            .finish()
    }
}

impl Meter {
    pub(crate) fn new(scope: InstrumentationScope, views: Arc<ViewRegistry>) -> Self {
        Meter {
            inner: Arc::new(MeterInner {
                scope,
                views,
                instruments: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// The instrumentation scope of this meter.
    pub fn scope(&self) -> &InstrumentationScope {
        &self.inner.scope
    }

    /// Creates a builder for a monotonic counter.
    pub fn counter<T: Number>(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> InstrumentBuilder<'_, Counter<T>> {
        InstrumentBuilder::new(self, name.into())
    }

    /// Creates a builder for a counter that accepts negative increments.
    pub fn up_down_counter<T: Number>(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> InstrumentBuilder<'_, UpDownCounter<T>> {
        InstrumentBuilder::new(self, name.into())
    }

    /// Creates a builder for a histogram.
    pub fn histogram<T: Number>(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> HistogramBuilder<'_, Histogram<T>> {
        HistogramBuilder::new(self, name.into())
    }

    /// Creates a builder for an observable counter.
    pub fn observable_counter<T: Number>(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> AsyncInstrumentBuilder<'_, ObservableCounter<T>, T> {
        AsyncInstrumentBuilder::new(self, name.into())
    }

    /// Creates a builder for an observable up-down counter.
    pub fn observable_up_down_counter<T: Number>(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> AsyncInstrumentBuilder<'_, ObservableUpDownCounter<T>, T> {
        AsyncInstrumentBuilder::new(self, name.into())
    }

    /// Creates a builder for an observable gauge.
    pub fn observable_gauge<T: Number>(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> AsyncInstrumentBuilder<'_, ObservableGauge<T>, T> {
        AsyncInstrumentBuilder::new(self, name.into())
    }

    /// Registers a sync instrument, or returns the identical one already
    /// registered under that name.
    ///
    /// `advisory` holds the histogram boundaries requested by the instrument
    /// builder, used by views without an explicit aggregation.
    pub(crate) fn create_sync<T: Number>(
        &self,
        descriptor: InstrumentDescriptor,
        advisory: Option<&[f64]>,
    ) -> MetricResult<Arc<SyncInstrument<T>>> {
        self.register(descriptor, |descriptor| {
            let storages = self.sync_storages::<T>(descriptor, advisory);
            let storage = combine(
                descriptor,
                storages
                    .iter()
                    .map(|s| Arc::clone(s) as Arc<dyn MetricStorage>)
                    .collect(),
            );
            let instrument = Arc::new(SyncInstrument::new(descriptor.clone(), storages));
            (storage, instrument)
        })
    }

    /// Registers an observable instrument and its callbacks.
    ///
    /// When an identical instrument already exists the callbacks are added
    /// to it, every handle then observes through all of them.
    pub(crate) fn create_observable<T: Number>(
        &self,
        descriptor: InstrumentDescriptor,
        callbacks: Vec<Callback<T>>,
    ) -> MetricResult<Arc<Callbacks<T>>> {
        let shared = self.register(descriptor, |descriptor| {
            let shared = Arc::new(Callbacks::default());
            let streams = self.observed_streams::<T>(descriptor);
            let storage = if streams.is_empty() {
                None
            } else {
                Some(Arc::new(AsyncMetricStorage::new(
                    descriptor.clone(),
                    Arc::clone(&shared),
                    streams,
                )) as Arc<dyn MetricStorage>)
            };
            (storage, shared)
        })?;
        for callback in callbacks {
            shared.push(callback);
        }
        Ok(shared)
    }

    fn register<H, F>(&self, descriptor: InstrumentDescriptor, create: F) -> MetricResult<Arc<H>>
    where
        H: Any + Send + Sync,
        F: FnOnce(&InstrumentDescriptor) -> (Option<Arc<dyn MetricStorage>>, Arc<H>),
    {
        validate_instrument_name(descriptor.name())?;
        validate_instrument_unit(descriptor.unit())?;

        let key = descriptor.normalized_name();
        let mut instruments = self.inner.instruments.write()?;
        if let Some(existing) = instruments.get(&key) {
            return self.reuse(existing, &descriptor);
        }

        let (storage, handle) = create(&descriptor);
        otel_debug!(
            name: "Meter.InstrumentCreated",
            meter_name = self.inner.scope.name(),
            instrument = format!("{descriptor}"),
            streams = storage.is_some(),
        );
        instruments.insert(
            key,
            InstrumentEntry {
                descriptor,
                storage,
                handle: Arc::clone(&handle) as Arc<dyn Any + Send + Sync>,
            },
        );
        Ok(handle)
    }

    fn reuse<H: Any + Send + Sync>(
        &self,
        existing: &InstrumentEntry,
        requested: &InstrumentDescriptor,
    ) -> MetricResult<Arc<H>> {
        let conflict = || MetricError::InstrumentConflict {
            name: requested.name().to_owned(),
            existing: format!("{}", existing.descriptor),
            requested: format!("{requested}"),
        };
        if !existing.descriptor.is_identical(requested) {
            otel_warn!(
                name: "Meter.InstrumentConflict",
                meter_name = self.inner.scope.name(),
                existing = format!("{}", existing.descriptor),
                requested = format!("{requested}"),
            );
            return Err(conflict());
        }
        otel_debug!(
            name: "Meter.ExistingInstrumentReturned",
            meter_name = self.inner.scope.name(),
            instrument_name = requested.name(),
        );
        Arc::clone(&existing.handle)
            .downcast::<H>()
            .map_err(|_| conflict())
    }

    /// Returns the storages of `descriptor`, one per matching view.
    fn sync_storages<T: Number>(
        &self,
        descriptor: &InstrumentDescriptor,
        advisory: Option<&[f64]>,
    ) -> Vec<Arc<SyncMetricStorage<T>>> {
        let mut storages = Vec::new();
        for view in self.inner.views.find_views(descriptor, &self.inner.scope) {
            let aggregator = match view.aggregation().aggregator(descriptor.kind(), advisory) {
                Ok(Some(aggregator)) => aggregator,
                Ok(None) => {
                    otel_debug!(
                        name: "Meter.StreamDropped",
                        instrument_name = descriptor.name(),
                    );
                    continue;
                }
                Err(err) => {
                    otel_warn!(
                        name: "Meter.IncompatibleView",
                        instrument_name = descriptor.name(),
                        reason = format!("{err}"),
                    );
                    continue;
                }
            };
            storages.push(Arc::new(SyncMetricStorage::new(
                view.stream_descriptor(descriptor),
                aggregator,
                view.attribute_filter(),
            )));
        }
        storages
    }

    /// Returns one stream per matching view. The callbacks of the instrument
    /// are invoked once per collection and feed every stream.
    fn observed_streams<T: Number>(
        &self,
        descriptor: &InstrumentDescriptor,
    ) -> Vec<ObservedStream<T>> {
        let mut streams = Vec::new();
        for view in self.inner.views.find_views(descriptor, &self.inner.scope) {
            let aggregator = match view.aggregation().aggregator(descriptor.kind(), None) {
                Ok(Some(aggregator)) => aggregator,
                Ok(None) => {
                    otel_debug!(
                        name: "Meter.StreamDropped",
                        instrument_name = descriptor.name(),
                    );
                    continue;
                }
                Err(err) => {
                    otel_warn!(
                        name: "Meter.IncompatibleView",
                        instrument_name = descriptor.name(),
                        reason = format!("{err}"),
                    );
                    continue;
                }
            };
            streams.push(ObservedStream::new(
                view.stream_descriptor(descriptor),
                aggregator,
                view.attribute_filter(),
            ));
        }
        streams
    }

    /// Collects every instrument of this meter for `collector`.
    ///
    /// Storages are collected concurrently; each item is one stream or the
    /// isolated failure of one instrument.
    pub(crate) async fn collect(
        &self,
        shared: &MeterProviderSharedState,
        collector: MetricCollector,
        collection_time: SystemTime,
    ) -> Vec<MetricResult<MetricData>> {
        let storages: Vec<Arc<dyn MetricStorage>> = match self.inner.instruments.read() {
            Ok(instruments) => instruments
                .values()
                .filter_map(|entry| entry.storage.clone())
                .collect(),
            Err(err) => return vec![Err(err.into())],
        };
        otel_debug!(
            name: "Meter.Collect",
            meter_name = self.inner.scope.name(),
            storages = storages.len(),
        );

        let req = CollectionRequest {
            collector,
            resource: shared.resource(),
            scope: &self.inner.scope,
            sdk_start_time: shared.sdk_start_time(),
            collection_time,
        };
        join_all(storages.iter().map(|storage| storage.collect(&req)))
            .await
            .into_iter()
            .flatten()
            .collect()
    }
}

/// Wraps the storages of one instrument into the storage it is collected
/// through.
fn combine(
    descriptor: &InstrumentDescriptor,
    mut storages: Vec<Arc<dyn MetricStorage>>,
) -> Option<Arc<dyn MetricStorage>> {
    match storages.len() {
        0 => None,
        1 => storages.pop(),
        _ => Some(Arc::new(MultiMetricStorage::new(descriptor.clone(), storages))),
    }
}

pub(crate) fn validate_instrument_name(name: &str) -> MetricResult<()> {
    if name.is_empty() {
        return Err(MetricError::InvalidInstrumentConfiguration(
            INSTRUMENT_NAME_EMPTY,
        ));
    }
    if name.len() > INSTRUMENT_NAME_MAX_LENGTH {
        return Err(MetricError::InvalidInstrumentConfiguration(
            INSTRUMENT_NAME_LENGTH,
        ));
    }
    if name.starts_with(|c: char| !c.is_ascii_alphabetic()) {
        return Err(MetricError::InvalidInstrumentConfiguration(
            INSTRUMENT_NAME_FIRST_ALPHABETIC,
        ));
    }
    if name.contains(|c: char| {
        !c.is_ascii_alphanumeric() && !INSTRUMENT_NAME_ALLOWED_NON_ALPHANUMERIC_CHARS.contains(&c)
    }) {
        return Err(MetricError::InvalidInstrumentConfiguration(
            INSTRUMENT_NAME_INVALID_CHAR,
        ));
    }
    Ok(())
}

pub(crate) fn validate_instrument_unit(unit: &str) -> MetricResult<()> {
    if unit.len() > INSTRUMENT_UNIT_NAME_MAX_LENGTH {
        return Err(MetricError::InvalidInstrumentConfiguration(
            INSTRUMENT_UNIT_LENGTH,
        ));
    }
    if unit.contains(|c: char| !c.is_ascii()) {
        return Err(MetricError::InvalidInstrumentConfiguration(
            INSTRUMENT_UNIT_INVALID_CHAR,
        ));
    }
    Ok(())
}
