// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

use std::time::Duration;

use azure_core::http::StatusCode;
use tracing::{trace, warn};

use super::ShouldRetryResult;
use crate::{Error, ThrottlingRetryOptions};

/// Delay used when the service throttles without saying how long to wait.
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Retries throttled (429) requests after the delay the service asks for.
#[derive(Debug)]
pub struct ResourceThrottleRetryPolicy {
    max_attempt_count: u32,
    backoff_factor: u32,
    max_wait_time: Duration,
    current_attempt_count: u32,
    cumulative_retry_delay: Duration,
}

impl ResourceThrottleRetryPolicy {
    pub fn new(options: &ThrottlingRetryOptions) -> Self {
        Self {
            max_attempt_count: options.max_retry_attempts,
            backoff_factor: options.backoff_factor,
            max_wait_time: options.max_retry_wait_time,
            current_attempt_count: 0,
            cumulative_retry_delay: Duration::ZERO,
        }
    }

    pub fn should_retry(&mut self, error: &Error) -> ShouldRetryResult {
        let Some(service_error) = error
            .as_service_error()
            .filter(|e| e.status == StatusCode::TooManyRequests)
        else {
            return ShouldRetryResult::NoRetry;
        };

        if self.current_attempt_count < self.max_attempt_count {
            if let Some(delay) = self.check_if_retry_needed(service_error.retry_after()) {
                self.current_attempt_count += 1;
                warn!(
                    attempt = self.current_attempt_count,
                    delay_ms = delay.as_millis() as u64,
                    "request throttled, retrying"
                );
                return ShouldRetryResult::RetryAfter(delay);
            }
        }

        warn!(
            attempts = self.current_attempt_count,
            cumulative_delay_ms = self.cumulative_retry_delay.as_millis() as u64,
            "request throttled, retry budget exhausted"
        );
        ShouldRetryResult::NoRetry
    }

    fn check_if_retry_needed(&mut self, retry_after: Duration) -> Option<Duration> {
        let mut retry_delay = retry_after;
        if self.backoff_factor > 1 {
            retry_delay = retry_delay
                .checked_mul(self.backoff_factor)
                .unwrap_or(self.max_wait_time);
        }

        let within_budget = self
            .cumulative_retry_delay
            .checked_add(retry_delay)
            .is_some_and(|total| total <= self.max_wait_time);
        if retry_delay < self.max_wait_time && within_budget {
            if retry_delay.is_zero() {
                trace!("throttled without a retry-after delay");
                retry_delay = DEFAULT_RETRY_DELAY;
            }
            self.cumulative_retry_delay = self.cumulative_retry_delay.saturating_add(retry_delay);
            return Some(retry_delay);
        }
        None
    }
}
