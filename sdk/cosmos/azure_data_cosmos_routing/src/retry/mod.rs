// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

//! Retry policies.
//!
//! A logical request gets a fresh [`RetryPolicyChain`]: an ordered list of stages, outermost
//! first. When an attempt fails, the driver asks the chain what to do. Each stage either
//! decides or defers to the stages after it; observer stages never decide themselves but see
//! the decision the inner stages made.

use std::time::Duration;

use crate::{
    request::{DocumentServiceRequest, RequestContext},
    Error,
};

mod clearing_session;
mod client;
mod driver;
mod factory;
mod invalid_partition;
mod partition_key_range_gone;
mod throttle;

pub use clearing_session::*;
pub use client::*;
pub use driver::*;
pub use factory::*;
pub use invalid_partition::*;
pub use partition_key_range_gone::*;
pub use throttle::*;

/// What to do after a failed attempt.
#[derive(Debug, Clone)]
pub enum ShouldRetryResult {
    /// Retry after waiting for the given delay.
    RetryAfter(Duration),

    /// Give up and surface the error of the attempt.
    NoRetry,

    /// Give up and surface this error instead.
    Error(Error),
}

impl ShouldRetryResult {
    pub fn retry_after(delay: Duration) -> Self {
        ShouldRetryResult::RetryAfter(delay)
    }

    pub fn is_retry(&self) -> bool {
        matches!(self, ShouldRetryResult::RetryAfter(_))
    }
}

/// A stage's answer to a failed attempt.
#[derive(Debug)]
pub(crate) enum StageDecision {
    Decided(ShouldRetryResult),
    Defer,
}

/// One stage of a [`RetryPolicyChain`].
#[derive(Debug)]
pub enum RetryPolicyStage {
    InvalidPartition(InvalidPartitionExceptionRetryPolicy),
    PartitionKeyRangeGone(PartitionKeyRangeGoneRetryPolicy),
    ClearingSessionContainer(ClearingSessionContainerClientRetryPolicy),
    Client(ClientRetryPolicy),
    Throttle(ResourceThrottleRetryPolicy),
}

impl RetryPolicyStage {
    fn on_before_send_request(&mut self, request: &DocumentServiceRequest, ctx: &mut RequestContext) {
        if let RetryPolicyStage::Client(policy) = self {
            policy.on_before_send_request(request, ctx);
        }
    }

    fn is_observer(&self) -> bool {
        matches!(self, RetryPolicyStage::ClearingSessionContainer(_))
    }

    async fn should_retry(
        &mut self,
        error: &Error,
        request: Option<&DocumentServiceRequest>,
    ) -> StageDecision {
        match self {
            RetryPolicyStage::InvalidPartition(policy) => policy.should_retry(error, request).await,
            RetryPolicyStage::PartitionKeyRangeGone(policy) => {
                policy.should_retry(error, request).await
            }
            RetryPolicyStage::Client(policy) => policy.should_retry(error).await,
            RetryPolicyStage::Throttle(policy) => StageDecision::Decided(policy.should_retry(error)),
            RetryPolicyStage::ClearingSessionContainer(_) => StageDecision::Defer,
        }
    }

    fn observe(
        &mut self,
        error: &Error,
        request: Option<&DocumentServiceRequest>,
        decision: ShouldRetryResult,
    ) -> ShouldRetryResult {
        match self {
            RetryPolicyStage::ClearingSessionContainer(policy) => {
                policy.observe(error, request, decision)
            }
            _ => decision,
        }
    }
}

/// The retry policy of one logical request.
#[derive(Debug)]
pub struct RetryPolicyChain {
    stages: Vec<RetryPolicyStage>,
    request: Option<DocumentServiceRequest>,
}

impl RetryPolicyChain {
    /// Creates a chain from its stages, outermost first.
    pub fn new(stages: Vec<RetryPolicyStage>) -> Self {
        Self {
            stages,
            request: None,
        }
    }

    /// Adds a stage in front of the existing ones.
    pub fn prepend(mut self, stage: RetryPolicyStage) -> Self {
        self.stages.insert(0, stage);
        self
    }

    pub fn stages(&self) -> &[RetryPolicyStage] {
        &self.stages
    }

    /// Prepares the next attempt of `request`, routing it through `ctx`.
    pub fn on_before_send_request(
        &mut self,
        request: &DocumentServiceRequest,
        ctx: &mut RequestContext,
    ) {
        if self.request.is_none() {
            self.request = Some(request.clone());
        }
        for stage in &mut self.stages {
            stage.on_before_send_request(request, ctx);
        }
    }

    /// Decides whether the attempt that failed with `error` should be retried.
    pub async fn should_retry(&mut self, error: &Error) -> ShouldRetryResult {
        let request = self.request.as_ref();
        let mut observers = Vec::new();
        let mut decision = ShouldRetryResult::NoRetry;

        for (index, stage) in self.stages.iter_mut().enumerate() {
            if stage.is_observer() {
                observers.push(index);
                continue;
            }
            if let StageDecision::Decided(d) = stage.should_retry(error, request).await {
                decision = d;
                break;
            }
        }

        for index in observers.into_iter().rev() {
            decision = self.stages[index].observe(error, request, decision);
        }
        decision
    }
}
