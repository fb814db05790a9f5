use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use futures_util::future::{self, BoxFuture};
use opentelemetry::KeyValue;

use crate::metrics::attribute_set::AttributeSet;
use crate::metrics::data::MetricData;
use crate::metrics::error::MetricResult;
use crate::metrics::instrument::InstrumentDescriptor;
use crate::metrics::internal::{Accumulation, Aggregator, AttributeSetFilter, Number};

use super::{
    metric_data, CollectionRequest, CollectorCursors, MetricStorage, Snapshot, Source,
};

#[derive(Debug)]
struct Tracked<T> {
    accumulation: Accumulation<T>,
    updates: u64,
}

/// Storage of a synchronous instrument for one view.
///
/// Measurements are aggregated in place, one accumulation per (filtered)
/// attribute set. Collection only reads the accumulations, each collector
/// derives its own points through its cursor.
#[derive(Debug)]
pub(crate) struct SyncMetricStorage<T> {
    descriptor: InstrumentDescriptor,
    aggregator: Aggregator,
    filter: AttributeSetFilter,
    buckets: RwLock<HashMap<AttributeSet, Arc<Mutex<Tracked<T>>>>>,
    cursors: CollectorCursors<T>,
}

impl<T: Number> SyncMetricStorage<T> {
    pub(crate) fn new(
        descriptor: InstrumentDescriptor,
        aggregator: Aggregator,
        filter: AttributeSetFilter,
    ) -> Self {
        SyncMetricStorage {
            descriptor,
            aggregator,
            filter,
            buckets: RwLock::new(HashMap::new()),
            cursors: CollectorCursors::default(),
        }
    }

    /// Applies one measurement to the accumulation of its attribute set.
    ///
    /// The value must already be validated for the instrument. Accumulations
    /// only hold plain data, so a lock poisoned by a panicking writer still
    /// guards a usable value and is recovered.
    pub(crate) fn record(&self, value: T, attrs: &[KeyValue]) {
        let attrs = self.filter.apply(attrs);

        let buckets = self.buckets.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(tracked) = buckets.get(&attrs) {
            self.update(tracked, value);
            return;
        }
        drop(buckets);

        let mut buckets = self.buckets.write().unwrap_or_else(PoisonError::into_inner);
        // Recheck again in case another thread already inserted
        let tracked = buckets.entry(attrs).or_insert_with(|| {
            Arc::new(Mutex::new(Tracked {
                accumulation: self.aggregator.create(),
                updates: 0,
            }))
        });
        self.update(tracked, value);
    }

    fn update(&self, tracked: &Mutex<Tracked<T>>, value: T) {
        let mut tracked = tracked.lock().unwrap_or_else(PoisonError::into_inner);
        self.aggregator.update(&mut tracked.accumulation, value);
        tracked.updates += 1;
    }

    fn snapshots(&self) -> Vec<Snapshot<T>> {
        let buckets = self.buckets.read().unwrap_or_else(PoisonError::into_inner);
        buckets
            .iter()
            .map(|(attributes, tracked)| {
                let tracked = tracked.lock().unwrap_or_else(PoisonError::into_inner);
                Snapshot {
                    attributes: attributes.clone(),
                    accumulation: tracked.accumulation.clone(),
                    updates: tracked.updates,
                }
            })
            .collect()
    }

    fn collect_sync(&self, req: &CollectionRequest<'_>) -> Option<MetricData> {
        let cursor = self.cursors.get(req.collector.id());
        // held for the whole collection, concurrent collections by the same
        // collector are serialized
        let mut cursor = cursor.lock().unwrap_or_else(PoisonError::into_inner);
        let snapshots = self.snapshots();
        let points = cursor.advance(&self.aggregator, snapshots, Source::Recorded, req);
        metric_data(&self.descriptor, points, req)
    }
}

impl<T: Number> MetricStorage for SyncMetricStorage<T> {
    fn descriptor(&self) -> &InstrumentDescriptor {
        &self.descriptor
    }

    fn collect<'a>(
        &'a self,
        req: &'a CollectionRequest<'a>,
    ) -> BoxFuture<'a, Vec<MetricResult<MetricData>>> {
        let result: Vec<MetricResult<MetricData>> =
            self.collect_sync(req).map(Ok).into_iter().collect();
        Box::pin(future::ready(result))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, SystemTime};

    use futures_executor::block_on;
    use opentelemetry::InstrumentationScope;

    use super::*;
    use crate::metrics::collector::MetricCollector;
    use crate::metrics::data::{AggregatedPoints, PointValue};
    use crate::metrics::instrument::{InstrumentKind, ValueType};
    use crate::metrics::internal::HistogramConfig;
    use crate::metrics::Temporality;
    use crate::Resource;

    fn storage(kind: InstrumentKind, aggregator: Aggregator) -> SyncMetricStorage<i64> {
        SyncMetricStorage::new(
            InstrumentDescriptor::new("test".into(), kind, ValueType::Int, None, None),
            aggregator,
            AttributeSetFilter::new(None),
        )
    }

    fn collect(
        storage: &SyncMetricStorage<i64>,
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
        block_on(storage.collect(&req))
    }

    fn sums(result: Vec<MetricResult<MetricData>>) -> Vec<i64> {
        let mut values = Vec::new();
        for data in result {
            let data = data.expect("collect failed");
            let AggregatedPoints::I64(points) = data.points else {
                panic!("unexpected value type");
            };
            for point in points {
                let PointValue::Sum { value, .. } = point.value else {
                    panic!("unexpected point value");
                };
                values.push(value);
            }
        }
        values
    }

    #[test]
    fn empty_storage_reports_nothing() {
        let storage = storage(InstrumentKind::Counter, Aggregator::Sum { monotonic: true });
        assert!(collect(&storage, MetricCollector::new(Temporality::Cumulative), 1).is_empty());
        assert!(collect(&storage, MetricCollector::new(Temporality::Delta), 1).is_empty());
    }

    #[test]
    fn collectors_keep_independent_cursors() {
        let storage = storage(InstrumentKind::Counter, Aggregator::Sum { monotonic: true });
        let cumulative = MetricCollector::new(Temporality::Cumulative);
        let delta = MetricCollector::new(Temporality::Delta);

        storage.record(3, &[]);
        assert_eq!(sums(collect(&storage, cumulative, 1)), vec![3]);
        assert_eq!(sums(collect(&storage, delta, 1)), vec![3]);

        storage.record(4, &[]);
        assert_eq!(sums(collect(&storage, cumulative, 2)), vec![7]);
        assert_eq!(sums(collect(&storage, delta, 2)), vec![4]);

        // nothing new for the delta collector
        assert!(collect(&storage, delta, 3).is_empty());
        assert_eq!(sums(collect(&storage, cumulative, 3)), vec![7]);

        // a late collector sees everything since start
        let late = MetricCollector::new(Temporality::Delta);
        assert_eq!(sums(collect(&storage, late, 4)), vec![7]);
    }

    #[test]
    fn histogram_buckets() {
        let storage = storage(
            InstrumentKind::Histogram,
            Aggregator::Histogram(HistogramConfig::new(vec![0.0, 100.0], true)),
        );
        storage.record(10, &[]);
        storage.record(11, &[]);

        let result = collect(&storage, MetricCollector::new(Temporality::Cumulative), 1);
        let data = result.into_iter().next().unwrap().unwrap();
        let AggregatedPoints::I64(points) = data.points else {
            panic!("unexpected value type");
        };
        let PointValue::Histogram(h) = &points[0].value else {
            panic!("unexpected point value");
        };
        assert_eq!(h.bucket_counts, vec![2, 0]);
        assert_eq!(h.sum, 21);
        assert_eq!(h.count, 2);
    }

    #[test]
    fn integer_sums_wrap_instead_of_panicking() {
        let storage = storage(
            InstrumentKind::UpDownCounter,
            Aggregator::Sum { monotonic: false },
        );
        let delta = MetricCollector::new(Temporality::Delta);
        storage.record(i64::MAX, &[]);
        assert_eq!(sums(collect(&storage, delta, 1)), vec![i64::MAX]);

        storage.record(1, &[]);
        assert_eq!(
            sums(collect(&storage, MetricCollector::new(Temporality::Cumulative), 2)),
            vec![i64::MIN]
        );
        // the delta across the wrap is still the recorded increment
        assert_eq!(sums(collect(&storage, delta, 2)), vec![1]);
    }

    #[test]
    fn poisoned_bucket_is_recovered() {
        let storage = storage(InstrumentKind::Counter, Aggregator::Sum { monotonic: true });
        storage.record(2, &[]);

        let tracked = Arc::clone(
            storage
                .buckets
                .read()
                .unwrap()
                .values()
                .next()
                .expect("one bucket"),
        );
        let _ = thread::spawn(move || {
            let _guard = tracked.lock().unwrap();
            panic!("writer failed while holding the bucket");
        })
        .join();

        storage.record(3, &[]);
        assert_eq!(
            sums(collect(&storage, MetricCollector::new(Temporality::Cumulative), 1)),
            vec![5]
        );
    }

    #[test]
    fn concurrent_writes_are_not_lost() {
        let storage = Arc::new(storage(
            InstrumentKind::UpDownCounter,
            Aggregator::Sum { monotonic: false },
        ));
        let handles: Vec<_> = (0..4i64)
            .map(|i| {
                let storage = Arc::clone(&storage);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        storage.record(1, &[KeyValue::new("thread", i % 2)]);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let mut values = sums(collect(
            &storage,
            MetricCollector::new(Temporality::Cumulative),
            1,
        ));
        values.sort();
        assert_eq!(values, vec![2000, 2000]);
    }
}
