// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

use std::sync::Arc;

use super::{
    ClearingSessionContainerClientRetryPolicy, ClientRetryPolicy,
    InvalidPartitionExceptionRetryPolicy, PartitionKeyRangeGoneRetryPolicy,
    ResourceThrottleRetryPolicy, RetryPolicyChain, RetryPolicyStage,
};
use crate::{
    routing::{CollectionCache, GlobalEndpointManager, PartitionKeyRangeCache},
    session::SessionContainer,
    ThrottlingRetryOptions,
};

/// Creates the failover and throttling chain for each request.
#[derive(Debug, Clone)]
pub struct RetryPolicyFactory {
    global_endpoint_manager: Arc<GlobalEndpointManager>,
    enable_endpoint_discovery: bool,
    throttling_retry_options: ThrottlingRetryOptions,
}

impl RetryPolicyFactory {
    pub fn new(
        global_endpoint_manager: Arc<GlobalEndpointManager>,
        enable_endpoint_discovery: bool,
        throttling_retry_options: ThrottlingRetryOptions,
    ) -> Self {
        Self {
            global_endpoint_manager,
            enable_endpoint_discovery,
            throttling_retry_options,
        }
    }

    /// `ClientRetryPolicy` followed by `ResourceThrottleRetryPolicy`.
    pub fn request_policy(&self) -> RetryPolicyChain {
        RetryPolicyChain::new(vec![
            RetryPolicyStage::Client(ClientRetryPolicy::new(
                self.global_endpoint_manager.clone(),
                self.enable_endpoint_discovery,
            )),
            RetryPolicyStage::Throttle(ResourceThrottleRetryPolicy::new(
                &self.throttling_retry_options,
            )),
        ])
    }
}

/// Wraps the chain of a [`RetryPolicyFactory`] with a stage that clears stale session tokens.
#[derive(Debug, Clone)]
pub struct ResetSessionTokenRetryPolicyFactory {
    inner: RetryPolicyFactory,
    session_container: Arc<SessionContainer>,
}

impl ResetSessionTokenRetryPolicyFactory {
    pub fn new(inner: RetryPolicyFactory, session_container: Arc<SessionContainer>) -> Self {
        Self {
            inner,
            session_container,
        }
    }

    pub fn request_policy(&self) -> RetryPolicyChain {
        self.inner
            .request_policy()
            .prepend(RetryPolicyStage::ClearingSessionContainer(
                ClearingSessionContainerClientRetryPolicy::new(self.session_container.clone()),
            ))
    }

    /// The request chain with the partition recovery stages in front, for requests that
    /// target a partition of `collection_link`.
    pub fn partition_aware_policy(
        &self,
        collection_cache: Arc<dyn CollectionCache>,
        partition_key_range_cache: Arc<dyn PartitionKeyRangeCache>,
        collection_link: impl Into<String>,
    ) -> RetryPolicyChain {
        self.request_policy()
            .prepend(RetryPolicyStage::PartitionKeyRangeGone(
                PartitionKeyRangeGoneRetryPolicy::new(
                    collection_cache.clone(),
                    partition_key_range_cache,
                ),
            ))
            .prepend(RetryPolicyStage::InvalidPartition(
                InvalidPartitionExceptionRetryPolicy::new(collection_cache, collection_link),
            ))
    }
}
