// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

use url::Url;

use crate::models::PartitionKeyRange;

/// Mutable state of a request across its attempts.
///
/// Retry policies write routing directives here; the endpoint manager reads them to pick the
/// endpoint for the next attempt.
#[derive(Clone, Debug)]
pub struct RequestContext {
    /// Index into the read or write endpoint list the next attempt should use.
    pub location_index_to_route: Option<usize>,

    /// When `false`, the request is routed by the account's own write-region order instead of
    /// the preferred locations.
    pub use_preferred_locations: bool,

    /// The endpoint the current attempt is pinned to. Takes precedence over the index.
    pub location_endpoint_to_route: Option<Url>,

    /// The partition key range the request targets, with its split lineage.
    pub resolved_partition_key_range: Option<PartitionKeyRange>,

    /// The session token sent with the current attempt.
    pub session_token: Option<String>,

    pub diagnostics: RequestDiagnostics,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            location_index_to_route: None,
            use_preferred_locations: true,
            location_endpoint_to_route: None,
            resolved_partition_key_range: None,
            session_token: None,
            diagnostics: RequestDiagnostics::default(),
        }
    }

    /// Routes the next attempt to the endpoint at `index`.
    pub fn route_to_location_index(&mut self, index: usize, use_preferred_locations: bool) {
        self.location_index_to_route = Some(index);
        self.use_preferred_locations = use_preferred_locations;
        self.location_endpoint_to_route = None;
    }

    /// Pins the current attempt to `endpoint`.
    pub fn route_to_location_endpoint(&mut self, endpoint: Url) {
        self.location_endpoint_to_route = Some(endpoint);
    }

    pub fn clear_route_to_location(&mut self) {
        self.location_index_to_route = None;
        self.use_preferred_locations = true;
        self.location_endpoint_to_route = None;
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// What happened while executing a request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestDiagnostics {
    /// Every endpoint an attempt was sent to, in order.
    pub contacted_endpoints: Vec<Url>,
    pub retry_count: u32,
}
