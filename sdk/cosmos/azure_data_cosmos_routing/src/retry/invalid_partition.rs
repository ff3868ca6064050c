// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

use std::{sync::Arc, time::Duration};

use azure_core::http::StatusCode;
use tracing::{debug, warn};

use super::{ShouldRetryResult, StageDecision};
use crate::{
    constants::SubStatusCode, request::DocumentServiceRequest, routing::CollectionCache, Error,
};

/// Recovers from 410/1000 (name cache is stale), returned when a collection was deleted and
/// recreated under the same name, by refreshing the collection's identity and retrying once.
pub struct InvalidPartitionExceptionRetryPolicy {
    collection_cache: Arc<dyn CollectionCache>,
    collection_link: String,
    retried: bool,
}

impl std::fmt::Debug for InvalidPartitionExceptionRetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvalidPartitionExceptionRetryPolicy")
            .field("collection_link", &self.collection_link)
            .field("retried", &self.retried)
            .finish_non_exhaustive()
    }
}

impl InvalidPartitionExceptionRetryPolicy {
    pub fn new(collection_cache: Arc<dyn CollectionCache>, collection_link: impl Into<String>) -> Self {
        Self {
            collection_cache,
            collection_link: collection_link.into(),
            retried: false,
        }
    }

    pub(crate) async fn should_retry(
        &mut self,
        error: &Error,
        request: Option<&DocumentServiceRequest>,
    ) -> StageDecision {
        if !error.is(StatusCode::Gone, SubStatusCode::NAME_CACHE_IS_STALE) {
            return StageDecision::Defer;
        }
        if self.retried {
            warn!(collection = %self.collection_link, "collection identity still stale after refresh");
            return StageDecision::Decided(ShouldRetryResult::Error(error.clone()));
        }

        let empty = Default::default();
        let properties = request.map(|r| &r.properties).unwrap_or(&empty);
        if let Err(e) = self
            .collection_cache
            .refresh(&self.collection_link, properties)
            .await
        {
            return StageDecision::Decided(ShouldRetryResult::Error(e));
        }

        debug!(collection = %self.collection_link, "refreshed stale collection identity");
        self.retried = true;
        StageDecision::Decided(ShouldRetryResult::RetryAfter(Duration::ZERO))
    }
}
