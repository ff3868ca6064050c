// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

//! Collaborators the routing layer calls out to.
//!
//! None of these are implemented here. The HTTP transports, the collection metadata cache and
//! the partition map cache belong to the surrounding client; tests plug in mocks.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use url::Url;

use crate::{
    models::{CollectionRoutingMap, DatabaseAccount, DocumentCollection},
    request::{DocumentServiceRequest, RequestContext, StoreResponse},
    Result,
};

/// Sends a request to the service and returns its response.
///
/// A client has two of these: one for the gateway and one for direct connectivity. Failed
/// requests are reported as [`Error::Service`](crate::Error::Service) with the status,
/// sub-status and headers of the response, or [`Error::Transport`](crate::Error::Transport)
/// when no response was received.
#[async_trait]
pub trait StoreModel: Send + Sync {
    /// Sends `request` to the endpoint pinned on `ctx`.
    async fn process_message(
        &self,
        request: &DocumentServiceRequest,
        ctx: &RequestContext,
    ) -> Result<StoreResponse>;
}

/// Resolves collection names to collection identities.
#[async_trait]
pub trait CollectionCache: Send + Sync {
    /// Resolves the collection the request addresses.
    async fn resolve_collection(
        &self,
        request: &DocumentServiceRequest,
    ) -> Result<DocumentCollection>;

    /// Drops the cached identity of `collection_link` so the next resolution hits the service.
    async fn refresh(
        &self,
        collection_link: &str,
        properties: &HashMap<String, serde_json::Value>,
    ) -> Result<()>;
}

/// Caches the partition key ranges of collections.
#[async_trait]
pub trait PartitionKeyRangeCache: Send + Sync {
    /// Looks up the routing map of a collection.
    ///
    /// Passing the map a caller currently holds as `previous` forces a refresh when the cache
    /// still has that same snapshot. Returns `None` if the collection doesn't exist.
    async fn try_lookup(
        &self,
        collection_rid: &str,
        previous: Option<Arc<CollectionRoutingMap>>,
        properties: &HashMap<String, serde_json::Value>,
    ) -> Result<Option<Arc<CollectionRoutingMap>>>;
}

/// Reads the account topology document.
#[async_trait]
pub trait DatabaseAccountManager: Send + Sync {
    /// The account's global endpoint, e.g. `https://contoso.documents.azure.com:443/`.
    fn service_endpoint(&self) -> Url;

    async fn database_account_from_endpoint(&self, endpoint: &Url) -> Result<DatabaseAccount>;
}
