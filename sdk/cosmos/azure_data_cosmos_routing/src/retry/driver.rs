// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

use std::future::Future;

use tracing::{debug, warn};

use super::{RetryPolicyChain, ShouldRetryResult};
use crate::{
    request::{DocumentServiceRequest, RequestContext},
    Result,
};

/// Runs `operation` until it succeeds or `policy` gives up.
///
/// Before every attempt the policy routes the request through a [`RequestContext`]; the
/// operation receives a snapshot of it. When the policy gives up, the error of the last attempt
/// is returned unchanged unless the policy supplied a different one.
pub async fn execute_with_retry<T, F, Fut>(
    policy: &mut RetryPolicyChain,
    request: &DocumentServiceRequest,
    mut operation: F,
) -> Result<T>
where
    F: FnMut(RequestContext) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut ctx = RequestContext::new();
    loop {
        policy.on_before_send_request(request, &mut ctx);
        if let Some(endpoint) = &ctx.location_endpoint_to_route {
            ctx.diagnostics.contacted_endpoints.push(endpoint.clone());
        }

        let error = match operation(ctx.clone()).await {
            Ok(response) => {
                debug!(
                    retry_count = ctx.diagnostics.retry_count,
                    contacted_endpoints = ctx.diagnostics.contacted_endpoints.len(),
                    "request completed"
                );
                return Ok(response);
            }
            Err(error) => error,
        };

        match policy.should_retry(&error).await {
            ShouldRetryResult::RetryAfter(delay) => {
                ctx.diagnostics.retry_count += 1;
                debug!(
                    retry_count = ctx.diagnostics.retry_count,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "retrying request"
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
            ShouldRetryResult::NoRetry => {
                warn!(
                    retry_count = ctx.diagnostics.retry_count,
                    error = %error,
                    "request failed"
                );
                return Err(error);
            }
            ShouldRetryResult::Error(error) => {
                warn!(
                    retry_count = ctx.diagnostics.retry_count,
                    error = %error,
                    "request failed"
                );
                return Err(error);
            }
        }
    }
}
