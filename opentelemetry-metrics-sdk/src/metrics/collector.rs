use std::sync::atomic::{AtomicUsize, Ordering};

use super::Temporality;

static NEXT_COLLECTOR_ID: AtomicUsize = AtomicUsize::new(0);

/// Identity of one export pipeline.
///
/// Obtained from [SdkMeterProvider::register_collector]. Every storage keeps a
/// separate cursor for each collector, so collectors never observe or perturb
/// each other's accounting. The handle is a small value that can be copied
/// into whatever drives the export loop.
///
/// [SdkMeterProvider::register_collector]: crate::metrics::SdkMeterProvider::register_collector
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MetricCollector {
    id: CollectorId,
    temporality: Temporality,
}

/// Unique identity of a [MetricCollector] within the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct CollectorId(usize);

impl CollectorId {
    pub(crate) fn get(self) -> usize {
        self.0
    }
}

impl MetricCollector {
    pub(crate) fn new(temporality: Temporality) -> Self {
        MetricCollector {
            id: CollectorId(NEXT_COLLECTOR_ID.fetch_add(1, Ordering::Relaxed)),
            temporality,
        }
    }

    pub(crate) fn id(&self) -> CollectorId {
        self.id
    }

    /// The temporality this collector reports.
    pub fn temporality(&self) -> Temporality {
        self.temporality
    }
}
