// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

use std::{sync::Arc, time::Duration};

use azure_core::http::StatusCode;
use tracing::{debug, warn};

use super::{ShouldRetryResult, StageDecision};
use crate::{
    constants::SubStatusCode,
    request::DocumentServiceRequest,
    routing::{CollectionCache, PartitionKeyRangeCache},
    Error,
};

/// Recovers from 410/1002 (partition key range gone), which the service returns after a
/// partition split or merge, by refreshing the collection's routing map and retrying once.
pub struct PartitionKeyRangeGoneRetryPolicy {
    collection_cache: Arc<dyn CollectionCache>,
    partition_key_range_cache: Arc<dyn PartitionKeyRangeCache>,
    retried: bool,
}

impl std::fmt::Debug for PartitionKeyRangeGoneRetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionKeyRangeGoneRetryPolicy")
            .field("retried", &self.retried)
            .finish_non_exhaustive()
    }
}

impl PartitionKeyRangeGoneRetryPolicy {
    pub fn new(
        collection_cache: Arc<dyn CollectionCache>,
        partition_key_range_cache: Arc<dyn PartitionKeyRangeCache>,
    ) -> Self {
        Self {
            collection_cache,
            partition_key_range_cache,
            retried: false,
        }
    }

    pub(crate) async fn should_retry(
        &mut self,
        error: &Error,
        request: Option<&DocumentServiceRequest>,
    ) -> StageDecision {
        if !error.is(StatusCode::Gone, SubStatusCode::PARTITION_KEY_RANGE_GONE) {
            return StageDecision::Defer;
        }
        if self.retried {
            warn!("partition key range still gone after refreshing the routing map");
            return StageDecision::Decided(ShouldRetryResult::Error(error.clone()));
        }
        let Some(request) = request else {
            return StageDecision::Decided(ShouldRetryResult::Error(error.clone()));
        };

        match self.refresh_routing_map(request).await {
            Ok(()) => {
                self.retried = true;
                StageDecision::Decided(ShouldRetryResult::RetryAfter(Duration::ZERO))
            }
            Err(e) => StageDecision::Decided(ShouldRetryResult::Error(e)),
        }
    }

    async fn refresh_routing_map(&self, request: &DocumentServiceRequest) -> crate::Result<()> {
        let collection = self.collection_cache.resolve_collection(request).await?;
        let routing_map = self
            .partition_key_range_cache
            .try_lookup(&collection.resource_id, None, &request.properties)
            .await?;

        if let Some(routing_map) = routing_map {
            // Handing back the current map forces the cache to fetch a newer one.
            self.partition_key_range_cache
                .try_lookup(&collection.resource_id, Some(routing_map), &request.properties)
                .await?;
        }

        debug!(collection = %collection.resource_id, "refreshed routing map after a split");
        Ok(())
    }
}
