// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

use std::sync::Arc;

use azure_core::http::StatusCode;
use tracing::warn;

use super::ShouldRetryResult;
use crate::{
    constants::SubStatusCode, request::DocumentServiceRequest, session::SessionContainer, Error,
};

/// Drops the session tokens of a collection when a name-based request keeps failing with
/// 404/1002 (read session not available).
///
/// That happens when the collection was recreated under the same name: the client holds
/// tokens from the old collection that the new one will never reach. The policy acts once,
/// after the inner policies gave up, and never changes their decision.
#[derive(Debug)]
pub struct ClearingSessionContainerClientRetryPolicy {
    session_container: Arc<SessionContainer>,
    has_triggered: bool,
}

impl ClearingSessionContainerClientRetryPolicy {
    pub fn new(session_container: Arc<SessionContainer>) -> Self {
        Self {
            session_container,
            has_triggered: false,
        }
    }

    pub(crate) fn observe(
        &mut self,
        error: &Error,
        request: Option<&DocumentServiceRequest>,
        decision: ShouldRetryResult,
    ) -> ShouldRetryResult {
        if decision.is_retry() || self.has_triggered {
            return decision;
        }

        let Some(request) = request else {
            return ShouldRetryResult::Error(error.clone());
        };

        if request.is_name_based()
            && error.is(StatusCode::NotFound, SubStatusCode::READ_SESSION_NOT_AVAILABLE)
        {
            warn!(
                address = request.resource_address(),
                "read session still not available, clearing the collection's session tokens"
            );
            self.session_container
                .clear_token_by_collection_full_name(request.resource_address());
            self.has_triggered = true;
        }

        decision
    }
}
