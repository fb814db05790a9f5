//! Collectible metric state.
//!
//! Every instrument stream is backed by a [MetricStorage]. Synchronous
//! instruments write into a [SyncMetricStorage] per view and fan out through
//! a [MultiMetricStorage] when several views match. Observable instruments
//! are read through one [AsyncMetricStorage] that invokes their callbacks
//! once per collection and feeds an [ObservedStream] per view.
//!
//! Storages keep one [CollectorCursor] per collector: the time of its last
//! collection and, for delta collectors, the accumulations it last exported.

mod async_storage;
mod multi;
mod sync_storage;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::SystemTime;

use futures_util::future::BoxFuture;
use opentelemetry::InstrumentationScope;

use crate::metrics::attribute_set::AttributeSet;
use crate::metrics::collector::{CollectorId, MetricCollector};
use crate::metrics::data::{DataPoint, MetricData};
use crate::metrics::error::MetricResult;
use crate::metrics::instrument::InstrumentDescriptor;
use crate::metrics::internal::{Accumulation, Aggregator, Number};
use crate::metrics::Temporality;
use crate::Resource;

pub(crate) use async_storage::{AsyncMetricStorage, ObservedStream};
pub(crate) use multi::MultiMetricStorage;
pub(crate) use sync_storage::SyncMetricStorage;

/// Everything a storage needs to know about one collection.
///
/// `collection_time` is fixed once per collect call and shared by every
/// storage it reaches.
#[derive(Debug)]
pub(crate) struct CollectionRequest<'a> {
    pub(crate) collector: MetricCollector,
    pub(crate) resource: &'a Resource,
    pub(crate) scope: &'a InstrumentationScope,
    pub(crate) sdk_start_time: SystemTime,
    pub(crate) collection_time: SystemTime,
}

/// The unit of collectible state.
pub(crate) trait MetricStorage: Send + Sync {
    /// Identity of the stream(s) produced by this storage.
    fn descriptor(&self) -> &InstrumentDescriptor;

    /// Produces the data of this storage for one collector.
    ///
    /// Streams with nothing to report produce no entry. A failure is isolated
    /// to the entry of the failing stream.
    fn collect<'a>(
        &'a self,
        req: &'a CollectionRequest<'a>,
    ) -> BoxFuture<'a, Vec<MetricResult<MetricData>>>;
}

/// The state one accumulation had at some point, as seen by one collector.
#[derive(Debug)]
pub(crate) struct Snapshot<T> {
    pub(crate) attributes: AttributeSet,
    pub(crate) accumulation: Accumulation<T>,
    /// Number of updates applied to the accumulation, used to omit unchanged
    /// attribute sets from delta collections.
    pub(crate) updates: u64,
}

#[derive(Debug)]
struct Baseline<T> {
    accumulation: Accumulation<T>,
    updates: u64,
}

/// Per collector state of one storage.
#[derive(Debug)]
pub(crate) struct CollectorCursor<T> {
    last_collection: Option<SystemTime>,
    baselines: HashMap<AttributeSet, Baseline<T>>,
}

impl<T> Default for CollectorCursor<T> {
    fn default() -> Self {
        CollectorCursor {
            last_collection: None,
            baselines: HashMap::new(),
        }
    }
}

/// Where the snapshots handed to [CollectorCursor::advance] come from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Source {
    /// Live accumulations of a synchronous instrument. Attribute sets that
    /// were not updated since the last delta collection are omitted.
    Recorded,
    /// Callback observations of the current cycle. Every observation is
    /// reported, baselines of attribute sets no longer observed are dropped.
    Observed,
}

impl<T: Number> CollectorCursor<T> {
    /// Turns snapshots into points for the collector owning this cursor and
    /// moves the cursor to `req.collection_time`.
    pub(crate) fn advance(
        &mut self,
        aggregator: &Aggregator,
        snapshots: Vec<Snapshot<T>>,
        source: Source,
        req: &CollectionRequest<'_>,
    ) -> Vec<DataPoint<T>> {
        let end = req.collection_time;
        let mut points = Vec::with_capacity(snapshots.len());

        match req.collector.temporality() {
            Temporality::Cumulative => {
                let start = req.sdk_start_time.min(end);
                points.extend(snapshots.into_iter().map(|s| DataPoint {
                    value: aggregator.cumulative(&s.accumulation),
                    attributes: s.attributes.into_vec(),
                    start_time: start,
                    time: end,
                }));
            }
            Temporality::Delta => {
                let start = self
                    .last_collection
                    .unwrap_or(req.sdk_start_time)
                    .min(end);
                let mut baselines = match source {
                    Source::Recorded => std::mem::take(&mut self.baselines),
                    Source::Observed => {
                        let mut kept = HashMap::with_capacity(snapshots.len());
                        for s in &snapshots {
                            if let Some((k, v)) = self.baselines.remove_entry(&s.attributes) {
                                kept.insert(k, v);
                            }
                        }
                        self.baselines.clear();
                        kept
                    }
                };

                for s in snapshots {
                    let baseline = baselines.get(&s.attributes);
                    if source == Source::Recorded
                        && baseline.is_some_and(|b| b.updates == s.updates)
                    {
                        continue;
                    }
                    let value = aggregator.delta(&s.accumulation, baseline.map(|b| &b.accumulation));
                    points.push(DataPoint {
                        attributes: s.attributes.to_vec(),
                        start_time: start,
                        time: end,
                        value,
                    });
                    baselines.insert(
                        s.attributes,
                        Baseline {
                            accumulation: s.accumulation,
                            updates: s.updates,
                        },
                    );
                }
                self.baselines = baselines;
            }
        }

        self.last_collection = Some(self.last_collection.map_or(end, |prev| prev.max(end)));
        points
    }
}

/// The cursors of one storage, each locked independently.
#[derive(Debug)]
pub(crate) struct CollectorCursors<T> {
    cursors: RwLock<HashMap<CollectorId, Arc<Mutex<CollectorCursor<T>>>>>,
}

impl<T> Default for CollectorCursors<T> {
    fn default() -> Self {
        CollectorCursors {
            cursors: RwLock::new(HashMap::new()),
        }
    }
}

impl<T> CollectorCursors<T> {
    /// Returns the cursor of `collector`, creating it on its first collection.
    ///
    /// Cursors only hold plain data, a poisoned lock still guards a usable
    /// value and is recovered.
    pub(crate) fn get(&self, collector: CollectorId) -> Arc<Mutex<CollectorCursor<T>>> {
        if let Some(cursor) = self
            .cursors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&collector)
        {
            return Arc::clone(cursor);
        }
        let mut cursors = self.cursors.write().unwrap_or_else(PoisonError::into_inner);
        // Recheck again in case another collection already inserted it
        Arc::clone(cursors.entry(collector).or_default())
    }
}

/// Wraps the points of one storage into the data handed to exporters, or
/// `None` when there is nothing to report.
pub(crate) fn metric_data<T: Number>(
    descriptor: &InstrumentDescriptor,
    points: Vec<DataPoint<T>>,
    req: &CollectionRequest<'_>,
) -> Option<MetricData> {
    if points.is_empty() {
        return None;
    }
    Some(MetricData {
        descriptor: descriptor.clone(),
        resource: req.resource.clone(),
        scope: req.scope.clone(),
        temporality: req.collector.temporality(),
        points: T::into_aggregated(points),
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use opentelemetry::KeyValue;

    use super::*;
    use crate::metrics::data::PointValue;

    fn request<'a>(
        collector: MetricCollector,
        resource: &'a Resource,
        scope: &'a InstrumentationScope,
        start: SystemTime,
        secs: u64,
    ) -> CollectionRequest<'a> {
        CollectionRequest {
            collector,
            resource,
            scope,
            sdk_start_time: start,
            collection_time: start + Duration::from_secs(secs),
        }
    }

    fn snapshot(value: i64, updates: u64) -> Snapshot<i64> {
        Snapshot {
            attributes: AttributeSet::from(&[KeyValue::new("k", "v")][..]),
            accumulation: Accumulation::Sum(value),
            updates,
        }
    }

    #[test]
    fn delta_cursor_moves_start_time_and_skips_unchanged() {
        let resource = Resource::empty();
        let scope = InstrumentationScope::default();
        let start = SystemTime::UNIX_EPOCH + Duration::from_secs(1000);
        let collector = MetricCollector::new(Temporality::Delta);
        let agg = Aggregator::Sum { monotonic: true };
        let mut cursor = CollectorCursor::default();

        let req = request(collector, &resource, &scope, start, 10);
        let points = cursor.advance(&agg, vec![snapshot(3, 1)], Source::Recorded, &req);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].start_time, start);
        assert_eq!(points[0].time, req.collection_time);

        let req2 = request(collector, &resource, &scope, start, 20);
        let points = cursor.advance(&agg, vec![snapshot(7, 2)], Source::Recorded, &req2);
        assert_eq!(points[0].start_time, req.collection_time);
        assert_eq!(
            points[0].value,
            PointValue::Sum {
                value: 4,
                is_monotonic: true
            }
        );

        let req3 = request(collector, &resource, &scope, start, 30);
        let points = cursor.advance(&agg, vec![snapshot(7, 2)], Source::Recorded, &req3);
        assert!(points.is_empty());
    }

    #[test]
    fn observed_delta_reports_every_observation() {
        let resource = Resource::empty();
        let scope = InstrumentationScope::default();
        let start = SystemTime::UNIX_EPOCH;
        let collector = MetricCollector::new(Temporality::Delta);
        let agg = Aggregator::Sum { monotonic: true };
        let mut cursor = CollectorCursor::default();

        let req = request(collector, &resource, &scope, start, 1);
        cursor.advance(&agg, vec![snapshot(5, 0)], Source::Observed, &req);
        let req = request(collector, &resource, &scope, start, 2);
        let points = cursor.advance(&agg, vec![snapshot(5, 0)], Source::Observed, &req);
        assert_eq!(
            points[0].value,
            PointValue::Sum {
                value: 0,
                is_monotonic: true
            }
        );
    }

    #[test]
    fn start_never_exceeds_end() {
        let resource = Resource::empty();
        let scope = InstrumentationScope::default();
        let start = SystemTime::UNIX_EPOCH + Duration::from_secs(100);
        let agg = Aggregator::Sum { monotonic: false };

        for temporality in [Temporality::Cumulative, Temporality::Delta] {
            let collector = MetricCollector::new(temporality);
            let mut cursor = CollectorCursor::default();
            let mut req = request(collector, &resource, &scope, start, 0);
            req.collection_time = start - Duration::from_secs(50);
            let points = cursor.advance(&agg, vec![snapshot(1, 1)], Source::Recorded, &req);
            assert!(points[0].start_time <= points[0].time);
        }
    }
}
