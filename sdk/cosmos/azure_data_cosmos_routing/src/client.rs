// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

//! The entry point that ties routing, session consistency and retries together.

use std::sync::Arc;

use azure_core::http::{headers::Headers, StatusCode};
use tracing::{debug, warn};

use crate::{
    constants::{self, SubStatusCode},
    paths,
    request::{DocumentServiceRequest, RequestContext, StoreResponse},
    retry::{
        execute_with_retry, ResetSessionTokenRetryPolicyFactory, RetryPolicyChain,
        RetryPolicyFactory,
    },
    routing::{
        resolve_partition_key_range, store_model_for_request, CollectionCache,
        DatabaseAccountManager, GlobalEndpointManager, PartitionKeyRangeCache, StoreModel,
        StoreModelKind,
    },
    session::SessionContainer,
    ConnectionPolicy, ConsistencyLevel, Error, ResourceId, Result, RoutingConfig,
};

/// Routes requests to the right region and transport, keeps session consistency and retries
/// failed attempts.
///
/// Obtain one with [`RoutingClient::builder()`]. The client owns a background task that keeps
/// the account topology fresh; call [`RoutingClient::close()`] to stop it.
pub struct RoutingClient {
    connection_policy: ConnectionPolicy,
    global_endpoint_manager: Arc<GlobalEndpointManager>,
    session_container: Arc<SessionContainer>,
    retry_policy_factory: ResetSessionTokenRetryPolicyFactory,
    gateway: Arc<dyn StoreModel>,
    direct: Arc<dyn StoreModel>,
    collection_cache: Option<Arc<dyn CollectionCache>>,
    partition_key_range_cache: Option<Arc<dyn PartitionKeyRangeCache>>,
}

impl std::fmt::Debug for RoutingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingClient")
            .field("connection_policy", &self.connection_policy)
            .field("global_endpoint_manager", &self.global_endpoint_manager)
            .finish_non_exhaustive()
    }
}

impl RoutingClient {
    /// Creates a new [`RoutingClientBuilder`].
    ///
    /// # Arguments
    ///
    /// * `account_manager` - Reads the account topology from an endpoint.
    /// * `gateway` - The transport used for gateway requests.
    /// * `direct` - The transport used for direct requests.
    pub fn builder(
        account_manager: Arc<dyn DatabaseAccountManager>,
        gateway: Arc<dyn StoreModel>,
        direct: Arc<dyn StoreModel>,
    ) -> RoutingClientBuilder {
        RoutingClientBuilder {
            account_manager,
            gateway,
            direct,
            connection_policy: ConnectionPolicy::default(),
            config: RoutingConfig::default(),
            collection_cache: None,
            partition_key_range_cache: None,
        }
    }

    pub fn session_container(&self) -> &Arc<SessionContainer> {
        &self.session_container
    }

    pub fn global_endpoint_manager(&self) -> &Arc<GlobalEndpointManager> {
        &self.global_endpoint_manager
    }

    pub fn connection_policy(&self) -> &ConnectionPolicy {
        &self.connection_policy
    }

    /// Stops the background topology refresh. Later calls to [`execute`](Self::execute) fail
    /// with [`Error::Closed`].
    pub fn close(&self) {
        self.global_endpoint_manager.close();
    }

    /// Executes `request`, retrying failed attempts as the retry policy allows.
    pub async fn execute(&self, request: DocumentServiceRequest) -> Result<StoreResponse> {
        if self.global_endpoint_manager.is_closed() {
            return Err(Error::Closed);
        }

        let request = &request;
        let mut policy = self.retry_policy(request);
        execute_with_retry(&mut policy, request, move |ctx| {
            self.execute_once(request, ctx)
        })
        .await
    }

    fn retry_policy(&self, request: &DocumentServiceRequest) -> RetryPolicyChain {
        match (&self.collection_cache, &self.partition_key_range_cache) {
            (Some(collection_cache), Some(partition_key_range_cache))
                if request.resource_type.is_collection_child() =>
            {
                let address = request.resource_address();
                let collection_link =
                    paths::collection_path(address).unwrap_or_else(|| address.to_string());
                self.retry_policy_factory.partition_aware_policy(
                    collection_cache.clone(),
                    partition_key_range_cache.clone(),
                    collection_link,
                )
            }
            _ => self.retry_policy_factory.request_policy(),
        }
    }

    async fn execute_once(
        &self,
        request: &DocumentServiceRequest,
        mut ctx: RequestContext,
    ) -> Result<StoreResponse> {
        if let (Some(collection_cache), Some(partition_key_range_cache)) =
            (&self.collection_cache, &self.partition_key_range_cache)
        {
            resolve_partition_key_range(
                request,
                &mut ctx,
                collection_cache.as_ref(),
                partition_key_range_cache.as_ref(),
            )
            .await?;
        }

        self.apply_session_token(request, &mut ctx);

        let connection_mode = self.connection_policy.connection_mode;
        let store_model = match store_model_for_request(request, connection_mode) {
            StoreModelKind::Gateway => &self.gateway,
            StoreModelKind::Direct => &self.direct,
        };

        match store_model.process_message(request, &ctx).await {
            Ok(response) => {
                if let Some(token) = response.session_token() {
                    self.capture_session_token(request, token, &response.headers)
                        .await;
                }
                Ok(response)
            }
            Err(error) => {
                // A 404/1002 token is no more recent than the one we sent.
                let session_not_available =
                    error.is(StatusCode::NotFound, SubStatusCode::READ_SESSION_NOT_AVAILABLE);
                if let Some(service_error) = error.as_service_error() {
                    let headers = &service_error.headers;
                    match headers.get_optional_str(&constants::SESSION_TOKEN) {
                        Some(token) if !session_not_available => {
                            self.capture_session_token(request, token, headers).await;
                        }
                        _ => {}
                    }
                }
                Err(error)
            }
        }
    }

    fn apply_session_token(&self, request: &DocumentServiceRequest, ctx: &mut RequestContext) {
        ctx.session_token = None;
        if !self.is_session_consistency(request) || request.is_reading_from_master() {
            return;
        }

        // Once a range is resolved only its own token is sent, or none at all.
        if let Some(range) = &ctx.resolved_partition_key_range {
            let range_id = range.range_id();
            ctx.session_token = self
                .session_container
                .resolve_partition_local_session_token(request, &range_id, ctx)
                .map(|token| format!("{range_id}:{token}"));
            return;
        }

        let token = self.session_container.resolve_global_session_token(request);
        if !token.is_empty() {
            ctx.session_token = Some(token);
        }
    }

    /// A request opts into session consistency through its `x-ms-consistency-level` header
    /// even when the client default is weaker.
    fn is_session_consistency(&self, request: &DocumentServiceRequest) -> bool {
        self.connection_policy.consistency_level == ConsistencyLevel::Session
            || request
                .headers
                .get_optional_str(&constants::CONSISTENCY_LEVEL)
                .is_some_and(|level| {
                    level.eq_ignore_ascii_case(ConsistencyLevel::Session.as_str())
                })
    }

    async fn capture_session_token(
        &self,
        request: &DocumentServiceRequest,
        token: &str,
        headers: &Headers,
    ) {
        let result = match &self.collection_cache {
            Some(collection_cache)
                if request.is_name_based()
                    && headers.get_optional_str(&constants::OWNER_ID).is_none()
                    && !request.is_reading_from_master() =>
            {
                match collection_cache.resolve_collection(request).await {
                    Ok(collection) => match collection.resource_id.parse::<ResourceId>() {
                        Ok(rid) => {
                            let full_name = headers
                                .get_optional_str(&constants::OWNER_FULL_NAME)
                                .unwrap_or(request.resource_address());
                            self.session_container
                                .set_session_token_for_collection(&rid, full_name, token)
                        }
                        Err(e) => {
                            debug!(error = %e, "collection resource id is not parseable");
                            Ok(())
                        }
                    },
                    Err(e) => {
                        debug!(error = %e, "could not resolve collection for session token");
                        Ok(())
                    }
                }
            }
            _ => self.session_container.set_session_token(request, headers),
        };

        if let Err(e) = result {
            warn!(error = %e, token, "failed to record session token");
        }
    }
}

/// Builder used to construct a [`RoutingClient`].
///
/// Obtain a [`RoutingClientBuilder`] by calling [`RoutingClient::builder()`].
pub struct RoutingClientBuilder {
    account_manager: Arc<dyn DatabaseAccountManager>,
    gateway: Arc<dyn StoreModel>,
    direct: Arc<dyn StoreModel>,
    connection_policy: ConnectionPolicy,
    config: RoutingConfig,
    collection_cache: Option<Arc<dyn CollectionCache>>,
    partition_key_range_cache: Option<Arc<dyn PartitionKeyRangeCache>>,
}

impl RoutingClientBuilder {
    pub fn with_connection_policy(mut self, connection_policy: ConnectionPolicy) -> Self {
        self.connection_policy = connection_policy;
        self
    }

    pub fn with_config(mut self, config: RoutingConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the collection cache. Together with a partition key range cache, it enables
    /// partition key range resolution and the partition-aware retry policies.
    pub fn with_collection_cache(mut self, collection_cache: Arc<dyn CollectionCache>) -> Self {
        self.collection_cache = Some(collection_cache);
        self
    }

    pub fn with_partition_key_range_cache(
        mut self,
        partition_key_range_cache: Arc<dyn PartitionKeyRangeCache>,
    ) -> Self {
        self.partition_key_range_cache = Some(partition_key_range_cache);
        self
    }

    /// Reads the account topology and returns the client.
    ///
    /// Fails if the topology can't be read from the global endpoint or any preferred region.
    pub async fn build(self) -> Result<RoutingClient> {
        let global_endpoint_manager = Arc::new(GlobalEndpointManager::new(
            self.account_manager,
            &self.connection_policy,
            &self.config,
        ));
        global_endpoint_manager.init().await?;

        let session_container = Arc::new(SessionContainer::new());
        let retry_policy_factory = ResetSessionTokenRetryPolicyFactory::new(
            RetryPolicyFactory::new(
                global_endpoint_manager.clone(),
                self.connection_policy.enable_endpoint_discovery,
                self.connection_policy.throttling_retry_options.clone(),
            ),
            session_container.clone(),
        );

        debug!(
            endpoint = %global_endpoint_manager.location_cache().default_endpoint(),
            "routing client initialized"
        );
        Ok(RoutingClient {
            connection_policy: self.connection_policy,
            global_endpoint_manager,
            session_container,
            retry_policy_factory,
            gateway: self.gateway,
            direct: self.direct,
            collection_cache: self.collection_cache,
            partition_key_range_cache: self.partition_key_range_cache,
        })
    }
}
