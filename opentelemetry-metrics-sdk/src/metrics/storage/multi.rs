use std::sync::Arc;

use futures_util::future::{join_all, BoxFuture, FutureExt};

use crate::metrics::data::MetricData;
use crate::metrics::error::MetricResult;
use crate::metrics::instrument::InstrumentDescriptor;

use super::{CollectionRequest, MetricStorage};

/// The storages of one instrument matched by several views.
///
/// Collection fans out to every storage, one stream per view.
pub(crate) struct MultiMetricStorage {
    descriptor: InstrumentDescriptor,
    storages: Vec<Arc<dyn MetricStorage>>,
}

impl std::fmt::Debug for MultiMetricStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiMetricStorage")
            .field("descriptor", &self.descriptor)
            .field(
                "streams",
                &self
                    .storages
                    .iter()
                    .map(|s| s.descriptor().name())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl MultiMetricStorage {
    /// `descriptor` identifies the instrument the storages belong to.
    pub(crate) fn new(
        descriptor: InstrumentDescriptor,
        storages: Vec<Arc<dyn MetricStorage>>,
    ) -> Self {
        MultiMetricStorage {
            descriptor,
            storages,
        }
    }
}

impl MetricStorage for MultiMetricStorage {
    fn descriptor(&self) -> &InstrumentDescriptor {
        &self.descriptor
    }

    fn collect<'a>(
        &'a self,
        req: &'a CollectionRequest<'a>,
    ) -> BoxFuture<'a, Vec<MetricResult<MetricData>>> {
        let collections = join_all(self.storages.iter().map(|storage| storage.collect(req)));
        async move {
            let results: Vec<MetricResult<MetricData>> =
                collections.await.into_iter().flatten().collect();
            results
        }
        .boxed()
    }
}
