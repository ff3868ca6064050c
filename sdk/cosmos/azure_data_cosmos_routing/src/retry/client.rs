// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

use std::{sync::Arc, time::Duration};

use azure_core::http::StatusCode;
use tracing::{debug, warn};
use url::Url;

use super::{ShouldRetryResult, StageDecision};
use crate::{
    constants::SubStatusCode,
    request::{DocumentServiceRequest, RequestContext},
    routing::GlobalEndpointManager,
    Error,
};

/// Upper bound on the number of failovers of a single request.
pub const MAX_RETRY_COUNT: u32 = 120;

const RETRY_INTERVAL: Duration = Duration::from_millis(1000);

/// Where the next attempt should be routed, captured when a retry is decided.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryContext {
    pub retry_count: usize,
    pub retry_request_on_preferred_locations: bool,
}

/// Fails requests over to other regions.
///
/// Reacts to regional outages (403/3 write forbidden, 403/1008 account not found in the
/// region, network failures) by marking the endpoint unavailable, refreshing the topology and
/// retrying elsewhere, and to 404/1002 (read session not available) by retrying on another
/// endpoint that may have caught up. Every other error is left to the stages after it.
#[derive(Debug)]
pub struct ClientRetryPolicy {
    global_endpoint_manager: Arc<GlobalEndpointManager>,
    enable_endpoint_discovery: bool,
    failover_retry_count: u32,
    session_token_retry_count: usize,
    is_read_request: bool,
    can_use_multiple_write_locations: bool,
    location_endpoint: Option<Url>,
    retry_context: Option<RetryContext>,
}

impl ClientRetryPolicy {
    pub fn new(
        global_endpoint_manager: Arc<GlobalEndpointManager>,
        enable_endpoint_discovery: bool,
    ) -> Self {
        Self {
            global_endpoint_manager,
            enable_endpoint_discovery,
            failover_retry_count: 0,
            session_token_retry_count: 0,
            is_read_request: false,
            can_use_multiple_write_locations: false,
            location_endpoint: None,
            retry_context: None,
        }
    }

    /// The endpoint the last attempt was pinned to.
    pub fn location_endpoint(&self) -> Option<&Url> {
        self.location_endpoint.as_ref()
    }

    pub fn failover_retry_count(&self) -> u32 {
        self.failover_retry_count
    }

    /// Resolves the endpoint for the next attempt and pins it on `ctx`.
    pub fn on_before_send_request(&mut self, request: &DocumentServiceRequest, ctx: &mut RequestContext) {
        self.is_read_request = request.is_read_only_request();
        self.can_use_multiple_write_locations = self
            .global_endpoint_manager
            .can_use_multiple_write_locations(request);

        ctx.clear_route_to_location();
        if let Some(retry_context) = self.retry_context {
            ctx.route_to_location_index(
                retry_context.retry_count,
                retry_context.retry_request_on_preferred_locations,
            );
        }

        let endpoint = self
            .global_endpoint_manager
            .resolve_service_endpoint(request, ctx);
        debug!(%endpoint, "routing request");
        ctx.route_to_location_endpoint(endpoint.clone());
        self.location_endpoint = Some(endpoint);
    }

    pub(crate) async fn should_retry(&mut self, error: &Error) -> StageDecision {
        self.retry_context = None;

        if error.is(StatusCode::Forbidden, SubStatusCode::FORBIDDEN_WRITEFORBIDDEN) {
            warn!("endpoint no longer accepts writes, refreshing the account topology");
            return self.should_retry_on_endpoint_failure(false, true).await;
        }

        if error.is(StatusCode::Forbidden, SubStatusCode::DATABASE_ACCOUNT_NOTFOUND)
            && self.is_read_request
        {
            warn!("account not found in the read region, failing over");
            return self.should_retry_on_endpoint_failure(true, false).await;
        }

        if error.is_network_failure() {
            warn!(error = %error, "network failure, failing over");
            return self
                .should_retry_on_endpoint_failure(self.is_read_request, false)
                .await;
        }

        if error.is(StatusCode::NotFound, SubStatusCode::READ_SESSION_NOT_AVAILABLE) {
            return StageDecision::Decided(self.should_retry_on_session_not_available());
        }

        StageDecision::Defer
    }

    async fn should_retry_on_endpoint_failure(
        &mut self,
        is_read_request: bool,
        force_refresh: bool,
    ) -> StageDecision {
        if !self.enable_endpoint_discovery || self.failover_retry_count > MAX_RETRY_COUNT {
            debug!(
                failover_retry_count = self.failover_retry_count,
                "not failing over"
            );
            return StageDecision::Decided(ShouldRetryResult::NoRetry);
        }

        self.failover_retry_count += 1;

        match &self.location_endpoint {
            Some(endpoint) if is_read_request => self
                .global_endpoint_manager
                .mark_endpoint_unavailable_for_read(endpoint),
            Some(endpoint) => self
                .global_endpoint_manager
                .mark_endpoint_unavailable_for_write(endpoint),
            None => debug!("no endpoint was resolved, nothing to mark unavailable"),
        }

        // The first write failover is immediate; later ones, and all read failovers, back off.
        let retry_delay = if !is_read_request && self.failover_retry_count <= 1 {
            Duration::ZERO
        } else {
            RETRY_INTERVAL
        };

        self.retry_context = Some(RetryContext {
            retry_count: self.failover_retry_count as usize,
            retry_request_on_preferred_locations: false,
        });

        if let Err(e) = self
            .global_endpoint_manager
            .refresh_location(None, force_refresh)
            .await
        {
            warn!(error = %e, "failed to refresh the account topology");
            return StageDecision::Decided(ShouldRetryResult::Error(e));
        }

        StageDecision::Decided(ShouldRetryResult::RetryAfter(retry_delay))
    }

    fn should_retry_on_session_not_available(&mut self) -> ShouldRetryResult {
        if !self.enable_endpoint_discovery {
            return ShouldRetryResult::NoRetry;
        }

        self.session_token_retry_count += 1;

        if self.can_use_multiple_write_locations {
            let endpoints = if self.is_read_request {
                self.global_endpoint_manager.read_endpoints()
            } else {
                self.global_endpoint_manager.write_endpoints()
            };

            if self.session_token_retry_count > endpoints.len() {
                return ShouldRetryResult::NoRetry;
            }

            self.retry_context = Some(RetryContext {
                retry_count: self.session_token_retry_count - 1,
                retry_request_on_preferred_locations: self.session_token_retry_count > 1,
            });
        } else {
            if self.session_token_retry_count > 1 {
                return ShouldRetryResult::NoRetry;
            }

            // Retry once on the write region, which always has the latest session.
            self.retry_context = Some(RetryContext {
                retry_count: self.session_token_retry_count - 1,
                retry_request_on_preferred_locations: false,
            });
        }

        debug!(
            session_token_retry_count = self.session_token_retry_count,
            "read session not available, retrying"
        );
        ShouldRetryResult::RetryAfter(Duration::ZERO)
    }
}
