use core::fmt;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, RwLock,
    },
    time::SystemTime,
};

use futures_util::future::join_all;
use opentelemetry::{otel_debug, otel_error, otel_info, InstrumentationScope};

use crate::Resource;

use super::{
    collector::MetricCollector,
    data::CollectionResult,
    error::{MetricError, MetricResult},
    meter::Meter,
    view::{View, ViewRegistry},
    Temporality,
};

/// Handles the creation and coordination of [Meter]s.
///
/// All `Meter`s created by a `MeterProvider` will be associated with the same
/// [Resource] and have the same [View]s applied to them. Their data is read
/// by the [MetricCollector]s registered with the provider. This is a
/// clonable handle to the MeterProvider implementation itself, and cloning it
/// will create a new reference, not a new instance of a MeterProvider. Dropping
/// the last reference to it will trigger shutdown of the provider. Shutdown can
/// also be triggered manually by calling the `shutdown` method.
#[derive(Clone, Debug)]
pub struct SdkMeterProvider {
    inner: Arc<MeterProviderSharedState>,
}

/// The state shared by a provider and every meter it created.
///
/// Created when the provider is built and torn down at shutdown.
#[derive(Debug)]
pub(crate) struct MeterProviderSharedState {
    resource: Resource,
    sdk_start_time: SystemTime,
    views: Arc<ViewRegistry>,
    collectors: RwLock<Vec<MetricCollector>>,
    meters: Mutex<HashMap<InstrumentationScope, Meter>>,
    shutdown_invoked: AtomicBool,
}

impl MeterProviderSharedState {
    pub(crate) fn resource(&self) -> &Resource {
        &self.resource
    }

    pub(crate) fn sdk_start_time(&self) -> SystemTime {
        self.sdk_start_time
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown_invoked.load(Ordering::Relaxed)
    }

    fn is_registered(&self, collector: &MetricCollector) -> MetricResult<bool> {
        Ok(self.collectors.read()?.contains(collector))
    }

    fn shutdown(&self) -> MetricResult<()> {
        if self.shutdown_invoked.swap(true, Ordering::SeqCst) {
            // If the previous value was true, shutdown was already invoked.
            return Err(MetricError::AlreadyShutdown);
        }
        self.collectors.write()?.clear();
        self.meters.lock()?.clear();
        Ok(())
    }
}

impl Drop for MeterProviderSharedState {
    fn drop(&mut self) {
        // If user has already shutdown the provider manually by calling
        // shutdown(), then we don't need to call shutdown again.
        if self.is_shutdown() {
            otel_debug!(
                name: "MeterProvider.Drop.AlreadyShutdown",
                message = "MeterProvider was already shut down; drop will not attempt shutdown again."
            );
        } else {
            otel_info!(
                name: "MeterProvider.Drop",
                message = "Last reference of MeterProvider dropped, initiating shutdown."
            );
            if let Err(err) = self.shutdown() {
                otel_error!(
                    name: "MeterProvider.Drop.ShutdownFailed",
                    message = "Shutdown attempt failed during drop of MeterProvider.",
                    reason = format!("{}", err)
                );
            } else {
                otel_info!(
                    name: "MeterProvider.Drop.ShutdownCompleted",
                );
            }
        }
    }
}

impl Default for SdkMeterProvider {
    fn default() -> Self {
        SdkMeterProvider::builder().build()
    }
}

impl SdkMeterProvider {
    /// Return default [MeterProviderBuilder]
    pub fn builder() -> MeterProviderBuilder {
        MeterProviderBuilder::default()
    }

    /// Returns the meter of the instrumentation scope named `name`.
    pub fn meter(&self, name: &'static str) -> Meter {
        let scope = InstrumentationScope::builder(name).build();
        self.meter_with_scope(scope)
    }

    /// Returns the meter of `scope`.
    ///
    /// Requesting the same scope twice returns the same meter. After
    /// shutdown a detached meter is returned: instruments can still be
    /// created and written to, but nothing collects them.
    pub fn meter_with_scope(&self, scope: InstrumentationScope) -> Meter {
        if self.inner.is_shutdown() {
            otel_debug!(
                name: "MeterProvider.DetachedMeterReturned",
                meter_name = scope.name(),
            );
            return Meter::new(scope, Arc::clone(&self.inner.views));
        }

        if scope.name().is_empty() {
            otel_info!(name: "MeterNameEmpty", message = "Meter name is empty; consider providing a meaningful name. Meter will function normally and the provided name will be used as-is.");
        };

        if let Ok(mut meters) = self.inner.meters.lock() {
            if let Some(existing_meter) = meters.get(&scope) {
                otel_debug!(
                    name: "MeterProvider.ExistingMeterReturned",
                    meter_name = scope.name(),
                );
                existing_meter.clone()
            } else {
                let new_meter = Meter::new(scope.clone(), Arc::clone(&self.inner.views));
                meters.insert(scope.clone(), new_meter.clone());
                otel_debug!(
                    name: "MeterProvider.NewMeterCreated",
                    meter_name = scope.name(),
                );
                new_meter
            }
        } else {
            otel_debug!(
                name: "MeterProvider.DetachedMeterReturned",
                meter_name = scope.name(),
            );
            Meter::new(scope, Arc::clone(&self.inner.views))
        }
    }

    /// Registers a new export pipeline reading every meter of this provider.
    ///
    /// A collector registered after instruments were written to starts its
    /// first collection at the SDK start time and does not affect the
    /// collectors registered before it.
    pub fn register_collector(&self, temporality: Temporality) -> MetricCollector {
        let collector = MetricCollector::new(temporality);
        if self.inner.is_shutdown() {
            otel_debug!(
                name: "MeterProvider.RegisterCollectorAfterShutdown",
                temporality = format!("{temporality:?}"),
            );
            return collector;
        }
        match self.inner.collectors.write() {
            Ok(mut collectors) => collectors.push(collector),
            Err(err) => err.into_inner().push(collector),
        }
        otel_debug!(
            name: "MeterProvider.CollectorRegistered",
            temporality = format!("{temporality:?}"),
        );
        collector
    }

    /// Collects every instrument of every meter for `collector`.
    ///
    /// `collection_time` is the end time of every point produced. Meters and
    /// their storages are collected concurrently; a failing instrument is
    /// reported in [CollectionResult::errors] and does not prevent the other
    /// instruments from being collected. Nothing new to report yields an
    /// empty result.
    pub async fn collect(
        &self,
        collector: &MetricCollector,
        collection_time: SystemTime,
    ) -> CollectionResult {
        let mut result = CollectionResult::default();
        if self.inner.is_shutdown() {
            otel_debug!(
                name: "MeterProvider.CollectAfterShutdown",
                message = "Collection requested after the MeterProvider was shut down."
            );
            result.errors.push(MetricError::AlreadyShutdown);
            return result;
        }
        match self.inner.is_registered(collector) {
            Ok(true) => {}
            Ok(false) => {
                result
                    .errors
                    .push(MetricError::UnknownCollector(collector.id().get()));
                return result;
            }
            Err(err) => {
                result.errors.push(err);
                return result;
            }
        }

        let meters: Vec<Meter> = match self.inner.meters.lock() {
            Ok(meters) => meters.values().cloned().collect(),
            Err(err) => {
                result.errors.push(err.into());
                return result;
            }
        };

        let collected = join_all(
            meters
                .iter()
                .map(|meter| meter.collect(&self.inner, *collector, collection_time)),
        )
        .await;
        for item in collected.into_iter().flatten() {
            match item {
                Ok(data) => result.metrics.push(data),
                Err(err) => result.errors.push(err),
            }
        }
        otel_debug!(
            name: "MeterProvider.Collected",
            metrics = result.metrics.len(),
            errors = result.errors.len(),
        );
        result
    }

    /// Blocks the current thread on [SdkMeterProvider::collect].
    ///
    /// Must not be called from within an async runtime worker thread when
    /// callbacks depend on that runtime.
    pub fn collect_blocking(
        &self,
        collector: &MetricCollector,
        collection_time: SystemTime,
    ) -> CollectionResult {
        futures_executor::block_on(self.collect(collector, collection_time))
    }

    /// Shuts down the meter provider, releasing its collectors and meters.
    ///
    /// This call is idempotent. The first call will perform all releasing
    /// operations. Subsequent calls will perform no action and will return an
    /// error stating this.
    ///
    /// Measurements made by instruments from meters this MeterProvider created
    /// will not be collected after shutdown is called.
    pub fn shutdown(&self) -> MetricResult<()> {
        otel_info!(
            name: "MeterProvider.Shutdown",
            message = "User initiated shutdown of MeterProvider."
        );
        self.inner.shutdown()
    }
}

/// Configuration options for a [SdkMeterProvider].
#[derive(Default)]
pub struct MeterProviderBuilder {
    resource: Option<Resource>,
    views: Vec<View>,
    sdk_start_time: Option<SystemTime>,
}

impl MeterProviderBuilder {
    /// Associates a [Resource] with a [SdkMeterProvider].
    ///
    /// This [Resource] represents the entity producing telemetry and is associated
    /// with all [Meter]s the [SdkMeterProvider] will create.
    ///
    /// By default, if this option is not used, an empty [Resource] will be used.
    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.resource = Some(resource);
        self
    }

    /// Associates a [View] with a [SdkMeterProvider].
    ///
    /// Views are matched in the order they were added. An instrument matching
    /// several views produces one stream per view.
    pub fn with_view(mut self, view: View) -> Self {
        self.views.push(view);
        self
    }

    /// Sets the start time of cumulative points and of the first delta point
    /// of every collector.
    ///
    /// Defaults to the time the provider is built.
    pub fn with_sdk_start_time(mut self, start: SystemTime) -> Self {
        self.sdk_start_time = Some(start);
        self
    }

    /// Construct a new [SdkMeterProvider] with this configuration.
    pub fn build(self) -> SdkMeterProvider {
        otel_debug!(
            name: "MeterProvider.Building",
            builder = format!("{:?}", &self),
        );

        let meter_provider = SdkMeterProvider {
            inner: Arc::new(MeterProviderSharedState {
                resource: self.resource.unwrap_or_default(),
                sdk_start_time: self.sdk_start_time.unwrap_or_else(SystemTime::now),
                views: Arc::new(ViewRegistry::new(self.views)),
                collectors: Default::default(),
                meters: Default::default(),
                shutdown_invoked: AtomicBool::new(false),
            }),
        };

        otel_info!(
            name: "MeterProvider.Built",
        );
        meter_provider
    }
}

impl fmt::Debug for MeterProviderBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeterProviderBuilder")
            .field("resource", &self.resource)
            .field("views", &self.views.len())
            .field("sdk_start_time", &self.sdk_start_time)
            .finish()
    }
}
