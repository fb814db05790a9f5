use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, PoisonError};

use futures_util::future::{join_all, BoxFuture, FutureExt};
use opentelemetry::{otel_debug, otel_warn, KeyValue};

use crate::metrics::attribute_set::AttributeSet;
use crate::metrics::data::MetricData;
use crate::metrics::error::{MetricError, MetricResult};
use crate::metrics::instrument::InstrumentDescriptor;
use crate::metrics::instruments::validate_measurement;
use crate::metrics::internal::{Accumulation, Aggregator, AttributeSetFilter, Number};
use crate::metrics::observer::{Callback, Callbacks, ObservableResult};

use super::{metric_data, CollectionRequest, CollectorCursors, MetricStorage, Snapshot, Source};

/// Storage of an observable instrument.
///
/// Nothing is kept between collections except the per collector cursors of
/// each stream: the callbacks are invoked once per collection and their
/// observations are the current state of every stream for that collection
/// only.
#[derive(Debug)]
pub(crate) struct AsyncMetricStorage<T> {
    instrument: InstrumentDescriptor,
    callbacks: Arc<Callbacks<T>>,
    streams: Vec<ObservedStream<T>>,
}

/// One view of an observable instrument.
#[derive(Debug)]
pub(crate) struct ObservedStream<T> {
    descriptor: InstrumentDescriptor,
    aggregator: Aggregator,
    filter: AttributeSetFilter,
    cursors: CollectorCursors<T>,
}

impl<T: Number> ObservedStream<T> {
    pub(crate) fn new(
        descriptor: InstrumentDescriptor,
        aggregator: Aggregator,
        filter: AttributeSetFilter,
    ) -> Self {
        ObservedStream {
            descriptor,
            aggregator,
            filter,
            cursors: CollectorCursors::default(),
        }
    }

    /// Reduces the observations of one cycle to one accumulation per
    /// filtered attribute set.
    fn accumulate(&self, observations: &HashMap<AttributeSet, T>) -> Vec<Snapshot<T>> {
        let mut merged: HashMap<AttributeSet, Accumulation<T>> =
            HashMap::with_capacity(observations.len());
        for (attrs, value) in observations {
            let acc = merged
                .entry(self.filter.apply_set(attrs))
                .or_insert_with(|| self.aggregator.create());
            // observed sums are totals, sets collapsed by the filter are added
            self.aggregator.update(acc, *value);
        }

        merged
            .into_iter()
            .map(|(attributes, accumulation)| Snapshot {
                attributes,
                accumulation,
                updates: 0,
            })
            .collect()
    }

    fn collect(
        &self,
        observations: &HashMap<AttributeSet, T>,
        req: &CollectionRequest<'_>,
    ) -> Option<MetricData> {
        let snapshots = self.accumulate(observations);
        let cursor = self.cursors.get(req.collector.id());
        let mut cursor = cursor.lock().unwrap_or_else(PoisonError::into_inner);
        let points = cursor.advance(&self.aggregator, snapshots, Source::Observed, req);
        metric_data(&self.descriptor, points, req)
    }
}

impl<T: Number> AsyncMetricStorage<T> {
    /// `instrument` identifies the instrument the callbacks belong to, each
    /// stream one view of it.
    pub(crate) fn new(
        instrument: InstrumentDescriptor,
        callbacks: Arc<Callbacks<T>>,
        streams: Vec<ObservedStream<T>>,
    ) -> Self {
        AsyncMetricStorage {
            instrument,
            callbacks,
            streams,
        }
    }

    /// Invokes every callback and returns the observations of this cycle.
    async fn observe(&self) -> MetricResult<Vec<(T, Vec<KeyValue>)>> {
        let result = ObservableResult::new();
        let outcomes = join_all(
            self.callbacks
                .snapshot()
                .into_iter()
                .map(|callback| invoke(callback, result.clone())),
        )
        .await;

        let failures: Vec<String> = outcomes.into_iter().filter_map(Result::err).collect();
        if !failures.is_empty() {
            let reason = failures.join("; ");
            otel_warn!(
                name: "AsyncMetricStorage.CallbackFailed",
                instrument_name = self.instrument.name(),
                reason = reason.as_str(),
            );
            return Err(MetricError::CallbackFailed {
                instrument: self.instrument.name().to_owned(),
                reason,
            });
        }
        Ok(result.take())
    }

    /// Keeps the last valid observation of every attribute set.
    fn latest(&self, observations: Vec<(T, Vec<KeyValue>)>) -> HashMap<AttributeSet, T> {
        let mut latest: HashMap<AttributeSet, T> = HashMap::with_capacity(observations.len());
        for (value, attrs) in observations {
            if let Err(err) = validate_measurement(&self.instrument, value) {
                otel_warn!(
                    name: "AsyncMetricStorage.ObservationDropped",
                    instrument_name = self.instrument.name(),
                    reason = format!("{err}"),
                );
                continue;
            }
            if latest.insert(AttributeSet::from_vec(attrs), value).is_some() {
                otel_debug!(
                    name: "AsyncMetricStorage.DuplicateObservation",
                    instrument_name = self.instrument.name(),
                    message = "Attribute set observed more than once, keeping the last value",
                );
            }
        }
        latest
    }

    async fn collect_async(&self, req: &CollectionRequest<'_>) -> Vec<MetricResult<MetricData>> {
        let observations = match self.observe().await {
            Ok(observations) => self.latest(observations),
            Err(err) => return vec![Err(err)],
        };
        self.streams
            .iter()
            .filter_map(|stream| stream.collect(&observations, req))
            .map(Ok)
            .collect()
    }
}

/// Runs one callback, turning errors and panics into a failure reason.
async fn invoke<T>(callback: Callback<T>, result: ObservableResult<T>) -> Result<(), String> {
    let fut = match std::panic::catch_unwind(AssertUnwindSafe(|| callback(result))) {
        Ok(fut) => fut,
        Err(panic) => return Err(panic_reason(panic.as_ref())),
    };
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(err.to_string()),
        Err(panic) => Err(panic_reason(panic.as_ref())),
    }
}

fn panic_reason(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        format!("callback panicked: {msg}")
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        format!("callback panicked: {msg}")
    } else {
        "callback panicked".to_owned()
    }
}

impl<T: Number> MetricStorage for AsyncMetricStorage<T> {
    fn descriptor(&self) -> &InstrumentDescriptor {
        &self.instrument
    }

    fn collect<'a>(
        &'a self,
        req: &'a CollectionRequest<'a>,
    ) -> BoxFuture<'a, Vec<MetricResult<MetricData>>> {
        self.collect_async(req).boxed()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::time::{Duration, SystemTime};

    use opentelemetry::{InstrumentationScope, Key};

    use super::*;
    use crate::metrics::collector::MetricCollector;
    use crate::metrics::data::{AggregatedPoints, PointValue};
    use crate::metrics::instrument::{InstrumentKind, ValueType};
    use crate::metrics::observer::{async_callback, sync_callback, CallbackError};
    use crate::metrics::Temporality;
    use crate::Resource;

    fn storage(
        kind: InstrumentKind,
        aggregator: Aggregator,
        filter: AttributeSetFilter,
        callbacks: Arc<Callbacks<i64>>,
    ) -> AsyncMetricStorage<i64> {
        let descriptor = InstrumentDescriptor::new("observed".into(), kind, ValueType::Int, None, None);
        AsyncMetricStorage::new(
            descriptor.clone(),
            callbacks,
            vec![ObservedStream::new(descriptor, aggregator, filter)],
        )
    }

    async fn collect(
        storage: &AsyncMetricStorage<i64>,
        collector: MetricCollector,
        secs: u64,
    ) -> Vec<MetricResult<MetricData>> {
        let resource = Resource::empty();
        let scope = InstrumentationScope::default();
        let req = CollectionRequest {
            collector,
            resource: &resource,
            scope: &scope,
            sdk_start_time: SystemTime::UNIX_EPOCH,
            collection_time: SystemTime::UNIX_EPOCH + Duration::from_secs(secs),
        };
        storage.collect(&req).await
    }

    fn points(result: Vec<MetricResult<MetricData>>) -> Vec<(Vec<KeyValue>, PointValue<i64>)> {
        result
            .into_iter()
            .flat_map(|data| {
                let AggregatedPoints::I64(points) = data.expect("collect failed").points else {
                    panic!("unexpected value type");
                };
                points.into_iter().map(|p| (p.attributes, p.value))
            })
            .collect()
    }

    #[tokio::test]
    async fn duplicate_observations_keep_last_value() {
        let callbacks = Arc::new(Callbacks::default());
        callbacks.push(sync_callback(|r: &ObservableResult<i64>| {
            r.observe(1, &[KeyValue::new("cpu", 0)]);
            r.observe(5, &[KeyValue::new("cpu", 0)]);
        }));
        let storage = storage(
            InstrumentKind::ObservableGauge,
            Aggregator::LastValue,
            AttributeSetFilter::new(None),
            callbacks,
        );

        let points = points(collect(&storage, MetricCollector::new(Temporality::Cumulative), 1).await);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].1, PointValue::Gauge(5));
    }

    #[tokio::test]
    async fn filtered_sums_are_added() {
        let callbacks = Arc::new(Callbacks::default());
        callbacks.push(sync_callback(|r: &ObservableResult<i64>| {
            r.observe(10, &[KeyValue::new("cpu", 0), KeyValue::new("state", "user")]);
            r.observe(20, &[KeyValue::new("cpu", 1), KeyValue::new("state", "user")]);
        }));
        let allowed: HashSet<Key> = [Key::new("state")].into_iter().collect();
        let storage = storage(
            InstrumentKind::ObservableCounter,
            Aggregator::Sum { monotonic: true },
            AttributeSetFilter::new(Some(&allowed)),
            callbacks,
        );

        let points = points(collect(&storage, MetricCollector::new(Temporality::Cumulative), 1).await);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].0, vec![KeyValue::new("state", "user")]);
        assert_eq!(
            points[0].1,
            PointValue::Sum {
                value: 30,
                is_monotonic: true
            }
        );
    }

    #[tokio::test]
    async fn delta_diffs_observed_totals() {
        let total = Arc::new(std::sync::atomic::AtomicI64::new(0));
        let callbacks = Arc::new(Callbacks::default());
        let observed = Arc::clone(&total);
        callbacks.push(sync_callback(move |r: &ObservableResult<i64>| {
            r.observe(observed.load(std::sync::atomic::Ordering::SeqCst), &[]);
        }));
        let storage = storage(
            InstrumentKind::ObservableCounter,
            Aggregator::Sum { monotonic: true },
            AttributeSetFilter::new(None),
            callbacks,
        );
        let delta = MetricCollector::new(Temporality::Delta);

        total.store(3, std::sync::atomic::Ordering::SeqCst);
        let first = points(collect(&storage, delta, 1).await);
        total.store(7, std::sync::atomic::Ordering::SeqCst);
        let second = points(collect(&storage, delta, 2).await);

        assert_eq!(
            first[0].1,
            PointValue::Sum {
                value: 3,
                is_monotonic: true
            }
        );
        assert_eq!(
            second[0].1,
            PointValue::Sum {
                value: 4,
                is_monotonic: true
            }
        );
    }

    #[tokio::test]
    async fn failing_callbacks_are_reported() {
        let callbacks = Arc::new(Callbacks::default());
        callbacks.push(async_callback(|_: ObservableResult<i64>| async {
            Err::<(), CallbackError>("backend unavailable".into())
        }));
        let storage = storage(
            InstrumentKind::ObservableGauge,
            Aggregator::LastValue,
            AttributeSetFilter::new(None),
            Arc::clone(&callbacks),
        );

        let result = collect(&storage, MetricCollector::new(Temporality::Cumulative), 1).await;
        assert_eq!(result.len(), 1);
        assert!(matches!(
            &result[0],
            Err(MetricError::CallbackFailed { instrument, reason })
                if instrument == "observed" && reason.contains("backend unavailable")
        ));
    }

    #[tokio::test]
    async fn panicking_callbacks_are_reported() {
        let callbacks = Arc::new(Callbacks::default());
        callbacks.push(sync_callback(|_: &ObservableResult<i64>| panic!("boom")));
        let storage = storage(
            InstrumentKind::ObservableGauge,
            Aggregator::LastValue,
            AttributeSetFilter::new(None),
            callbacks,
        );

        let result = collect(&storage, MetricCollector::new(Temporality::Cumulative), 1).await;
        assert!(matches!(
            &result[0],
            Err(MetricError::CallbackFailed { reason, .. }) if reason.contains("boom")
        ));
    }

    #[tokio::test]
    async fn streams_share_one_callback_invocation() {
        let invocations = Arc::new(std::sync::atomic::AtomicI64::new(0));
        let callbacks = Arc::new(Callbacks::default());
        let counted = Arc::clone(&invocations);
        callbacks.push(sync_callback(move |r: &ObservableResult<i64>| {
            let total = counted.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
            r.observe(total * 10, &[]);
        }));
        let stream = |name: &'static str| {
            ObservedStream::new(
                InstrumentDescriptor::new(
                    name.into(),
                    InstrumentKind::ObservableCounter,
                    ValueType::Int,
                    None,
                    None,
                ),
                Aggregator::Sum { monotonic: true },
                AttributeSetFilter::new(None),
            )
        };
        let storage = AsyncMetricStorage::new(
            InstrumentDescriptor::new(
                "reads".into(),
                InstrumentKind::ObservableCounter,
                ValueType::Int,
                None,
                None,
            ),
            callbacks,
            vec![stream("reads.a"), stream("reads.b")],
        );

        let result = collect(&storage, MetricCollector::new(Temporality::Cumulative), 1).await;
        assert_eq!(invocations.load(std::sync::atomic::Ordering::SeqCst), 1);
        let mut streams: Vec<(String, Vec<(Vec<KeyValue>, PointValue<i64>)>)> = result
            .into_iter()
            .map(|data| {
                let data = data.expect("collect failed");
                (data.name().to_owned(), points(vec![Ok(data)]))
            })
            .collect();
        streams.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(streams.len(), 2);
        for (_, points) in &streams {
            assert_eq!(
                points[0].1,
                PointValue::Sum {
                    value: 10,
                    is_monotonic: true
                }
            );
        }
    }

    #[tokio::test]
    async fn negative_observable_counter_values_are_dropped() {
        let callbacks = Arc::new(Callbacks::default());
        callbacks.push(sync_callback(|r: &ObservableResult<i64>| {
            r.observe(-1, &[KeyValue::new("a", 1)]);
            r.observe(2, &[KeyValue::new("a", 2)]);
        }));
        let storage = storage(
            InstrumentKind::ObservableCounter,
            Aggregator::Sum { monotonic: true },
            AttributeSetFilter::new(None),
            callbacks,
        );

        let points = points(collect(&storage, MetricCollector::new(Temporality::Cumulative), 1).await);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].0, vec![KeyValue::new("a", 2)]);
    }
}
