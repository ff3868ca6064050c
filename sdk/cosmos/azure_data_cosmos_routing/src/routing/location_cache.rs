// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::Duration,
};

use arc_swap::ArcSwap;
use dashmap::DashMap;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    models::{DatabaseAccount, DatabaseAccountLocation},
    request::{DocumentServiceRequest, OperationType, RequestContext, ResourceType},
};

/// The kinds of operation an endpoint can be unavailable for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OperationKinds {
    pub read: bool,
    pub write: bool,
}

impl OperationKinds {
    pub const READ: OperationKinds = OperationKinds {
        read: true,
        write: false,
    };
    pub const WRITE: OperationKinds = OperationKinds {
        read: false,
        write: true,
    };

    fn union(self, other: OperationKinds) -> OperationKinds {
        OperationKinds {
            read: self.read || other.read,
            write: self.write || other.write,
        }
    }

    fn intersects(self, other: OperationKinds) -> bool {
        (self.read && other.read) || (self.write && other.write)
    }
}

#[derive(Clone, Copy, Debug)]
struct LocationUnavailabilityInfo {
    last_unavailability_check: Instant,
    unavailable_operations: OperationKinds,
}

#[derive(Clone, Debug)]
struct LocationsInfo {
    preferred_locations: Vec<String>,
    available_write_locations: Vec<String>,
    available_read_locations: Vec<String>,
    /// Keyed by lowercase location name.
    available_write_endpoint_by_location: HashMap<String, Url>,
    available_read_endpoint_by_location: HashMap<String, Url>,
    write_endpoints: Vec<Url>,
    read_endpoints: Vec<Url>,
}

impl LocationsInfo {
    fn new(preferred_locations: Vec<String>, default_endpoint: &Url) -> Self {
        Self {
            preferred_locations,
            available_write_locations: Vec::new(),
            available_read_locations: Vec::new(),
            available_write_endpoint_by_location: HashMap::new(),
            available_read_endpoint_by_location: HashMap::new(),
            write_endpoints: vec![default_endpoint.clone()],
            read_endpoints: vec![default_endpoint.clone()],
        }
    }
}

/// The client's view of the account topology.
///
/// Holds the regions the account reports, the client's preferred regions and the endpoints
/// recently seen failing, and derives from them the ordered lists of endpoints reads and writes
/// should go to. Endpoints marked unavailable move to the back of those lists until the
/// expiration window passes.
#[derive(Debug)]
pub struct LocationCache {
    default_endpoint: Url,
    enable_endpoint_discovery: bool,
    use_multiple_write_locations: bool,
    unavailable_locations_expiration_time: Duration,
    enable_multiple_write_locations: AtomicBool,
    locations: ArcSwap<LocationsInfo>,
    location_unavailability: DashMap<Url, LocationUnavailabilityInfo>,
    /// Serializes recomputes and records when the last one happened.
    last_cache_update: Mutex<Instant>,
}

impl LocationCache {
    pub fn new(
        preferred_locations: Vec<String>,
        default_endpoint: Url,
        enable_endpoint_discovery: bool,
        use_multiple_write_locations: bool,
        unavailable_locations_expiration_time: Duration,
    ) -> Self {
        let locations = LocationsInfo::new(preferred_locations, &default_endpoint);
        Self {
            default_endpoint,
            enable_endpoint_discovery,
            use_multiple_write_locations,
            unavailable_locations_expiration_time,
            enable_multiple_write_locations: AtomicBool::new(false),
            locations: ArcSwap::from_pointee(locations),
            location_unavailability: DashMap::new(),
            last_cache_update: Mutex::new(Instant::now()),
        }
    }

    pub fn default_endpoint(&self) -> &Url {
        &self.default_endpoint
    }

    /// Endpoints to send reads to, most preferred first.
    pub fn read_endpoints(&self) -> Vec<Url> {
        self.refresh_stale_endpoints();
        self.locations.load().read_endpoints.clone()
    }

    /// Endpoints to send writes to, most preferred first.
    pub fn write_endpoints(&self) -> Vec<Url> {
        self.refresh_stale_endpoints();
        self.locations.load().write_endpoints.clone()
    }

    fn refresh_stale_endpoints(&self) {
        if self.location_unavailability.is_empty() {
            return;
        }
        let last_update = *self
            .last_cache_update
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if last_update.elapsed() > self.unavailable_locations_expiration_time {
            self.update_location_cache(None, None, None, None);
        }
    }

    /// Installs the regions reported by the account.
    pub fn on_database_account_read(&self, account: &DatabaseAccount) {
        self.update_location_cache(
            Some(&account.writable_locations),
            Some(&account.readable_locations),
            None,
            Some(account.enable_multiple_write_locations),
        );
    }

    pub fn on_location_preference_changed(&self, preferred_locations: Vec<String>) {
        self.update_location_cache(None, None, Some(preferred_locations), None);
    }

    pub fn mark_endpoint_unavailable_for_read(&self, endpoint: &Url) {
        self.mark_endpoint_unavailable(endpoint, OperationKinds::READ);
    }

    pub fn mark_endpoint_unavailable_for_write(&self, endpoint: &Url) {
        self.mark_endpoint_unavailable(endpoint, OperationKinds::WRITE);
    }

    fn mark_endpoint_unavailable(&self, endpoint: &Url, kinds: OperationKinds) {
        let now = Instant::now();
        self.location_unavailability
            .entry(endpoint.clone())
            .and_modify(|info| {
                info.last_unavailability_check = now;
                info.unavailable_operations = info.unavailable_operations.union(kinds);
            })
            .or_insert(LocationUnavailabilityInfo {
                last_unavailability_check: now,
                unavailable_operations: kinds,
            });

        warn!(%endpoint, ?kinds, "marked endpoint unavailable");
        self.update_location_cache(None, None, None, None);
    }

    /// Whether writes to any region are allowed, by both the client and the account.
    pub fn can_use_multiple_write_locations(&self) -> bool {
        self.use_multiple_write_locations
            && self.enable_multiple_write_locations.load(Ordering::Acquire)
    }

    /// Whether this request may be written to any region. Only document operations and stored
    /// procedure execution are.
    pub fn can_use_multiple_write_locations_for(&self, request: &DocumentServiceRequest) -> bool {
        self.can_use_multiple_write_locations()
            && (request.resource_type == ResourceType::Document
                || (request.resource_type == ResourceType::StoredProcedure
                    && request.operation_type == OperationType::ExecuteJavaScript))
    }

    /// Picks the endpoint for the next attempt of `request`.
    ///
    /// An endpoint pinned on the context wins. Otherwise writes that must go to a single region,
    /// and requests routed without preferred locations, alternate between the first two write
    /// regions of the account; everything else indexes into the read or write endpoint list.
    pub fn resolve_service_endpoint(
        &self,
        request: &DocumentServiceRequest,
        ctx: &RequestContext,
    ) -> Url {
        if let Some(endpoint) = &ctx.location_endpoint_to_route {
            return endpoint.clone();
        }

        let location_index = ctx.location_index_to_route.unwrap_or(0);
        let is_write = request.operation_type.is_write_operation();

        if !ctx.use_preferred_locations
            || (is_write && !self.can_use_multiple_write_locations_for(request))
        {
            let info = self.locations.load();
            if !self.enable_endpoint_discovery || info.available_write_locations.is_empty() {
                return self.default_endpoint.clone();
            }

            let index = (location_index % 2).min(info.available_write_locations.len() - 1);
            let location = info.available_write_locations[index].to_lowercase();
            return info
                .available_write_endpoint_by_location
                .get(&location)
                .cloned()
                .unwrap_or_else(|| self.default_endpoint.clone());
        }

        let endpoints = if is_write {
            self.write_endpoints()
        } else {
            self.read_endpoints()
        };
        endpoints
            .get(location_index % endpoints.len().max(1))
            .cloned()
            .unwrap_or_else(|| self.default_endpoint.clone())
    }

    /// Returns whether the account topology should be fetched again, and whether that can
    /// happen in the background (`false` when no usable endpoint is left).
    pub fn should_refresh_endpoints(&self) -> (bool, bool) {
        let mut can_refresh_in_background = true;
        if !self.enable_endpoint_discovery {
            return (false, can_refresh_in_background);
        }

        let info = self.locations.load();
        let most_preferred_location = info
            .preferred_locations
            .first()
            .map(|l| l.to_lowercase())
            .filter(|l| !l.is_empty());

        let mut should_refresh = self.use_multiple_write_locations
            && !self.enable_multiple_write_locations.load(Ordering::Acquire);

        let read_endpoints = &info.read_endpoints;
        if let Some(first) = read_endpoints.first() {
            if self.is_endpoint_unavailable(first, OperationKinds::READ) {
                can_refresh_in_background =
                    self.any_endpoints_available(read_endpoints, OperationKinds::READ);
                debug!(endpoint = %first, "most preferred read endpoint is unavailable");
                return (true, can_refresh_in_background);
            }
        }

        if let Some(location) = &most_preferred_location {
            match info.available_read_endpoint_by_location.get(location) {
                Some(endpoint) if read_endpoints.first() == Some(endpoint) => {}
                _ => return (true, can_refresh_in_background),
            }
        }

        let write_endpoints = &info.write_endpoints;
        if !self.can_use_multiple_write_locations() {
            if let Some(first) = write_endpoints.first() {
                if self.is_endpoint_unavailable(first, OperationKinds::WRITE) {
                    can_refresh_in_background =
                        self.any_endpoints_available(write_endpoints, OperationKinds::WRITE);
                    debug!(endpoint = %first, "most preferred write endpoint is unavailable");
                    return (true, can_refresh_in_background);
                }
            }
            return (should_refresh, can_refresh_in_background);
        }

        if let Some(location) = &most_preferred_location {
            return match info.available_write_endpoint_by_location.get(location) {
                Some(endpoint) => {
                    should_refresh |= write_endpoints.first() != Some(endpoint);
                    (should_refresh, can_refresh_in_background)
                }
                None => (true, can_refresh_in_background),
            };
        }

        (should_refresh, can_refresh_in_background)
    }

    /// The name of the region serving `endpoint`, if the account reported one.
    pub fn location_for_endpoint(&self, endpoint: &Url) -> Option<String> {
        let info = self.locations.load();
        let lookup = |locations: &[String], by_location: &HashMap<String, Url>| {
            locations
                .iter()
                .find(|l| by_location.get(&l.to_lowercase()) == Some(endpoint))
                .cloned()
        };
        lookup(
            &info.available_write_locations,
            &info.available_write_endpoint_by_location,
        )
        .or_else(|| {
            lookup(
                &info.available_read_locations,
                &info.available_read_endpoint_by_location,
            )
        })
    }

    fn is_endpoint_unavailable(&self, endpoint: &Url, expected: OperationKinds) -> bool {
        match self.location_unavailability.get(endpoint) {
            Some(info) => {
                info.unavailable_operations.intersects(expected)
                    && info.last_unavailability_check.elapsed()
                        <= self.unavailable_locations_expiration_time
            }
            None => false,
        }
    }

    fn any_endpoints_available(&self, endpoints: &[Url], expected: OperationKinds) -> bool {
        endpoints
            .iter()
            .any(|e| !self.is_endpoint_unavailable(e, expected))
    }

    fn clear_stale_endpoint_unavailability_info(&self) {
        let expiration = self.unavailable_locations_expiration_time;
        self.location_unavailability.retain(|endpoint, info| {
            let stale = info.last_unavailability_check.elapsed() > expiration;
            if stale {
                info!(%endpoint, "endpoint is available again");
            }
            !stale
        });
    }

    fn update_location_cache(
        &self,
        write_locations: Option<&[DatabaseAccountLocation]>,
        read_locations: Option<&[DatabaseAccountLocation]>,
        preferred_locations: Option<Vec<String>>,
        enable_multiple_write_locations: Option<bool>,
    ) {
        let mut last_update = self
            .last_cache_update
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let mut next = LocationsInfo::clone(&self.locations.load());
        if let Some(preferred_locations) = preferred_locations {
            next.preferred_locations = preferred_locations;
        }
        if let Some(enabled) = enable_multiple_write_locations {
            self.enable_multiple_write_locations
                .store(enabled, Ordering::Release);
        }

        self.clear_stale_endpoint_unavailability_info();

        if let Some(read_locations) = read_locations {
            (
                next.available_read_endpoint_by_location,
                next.available_read_locations,
            ) = endpoints_by_location(read_locations);
        }
        if let Some(write_locations) = write_locations {
            (
                next.available_write_endpoint_by_location,
                next.available_write_locations,
            ) = endpoints_by_location(write_locations);
        }

        next.write_endpoints = self.preferred_available_endpoints(
            &next,
            &next.available_write_endpoint_by_location,
            &next.available_write_locations,
            OperationKinds::WRITE,
            &self.default_endpoint,
        );
        let fallback = next
            .write_endpoints
            .first()
            .cloned()
            .unwrap_or_else(|| self.default_endpoint.clone());
        next.read_endpoints = self.preferred_available_endpoints(
            &next,
            &next.available_read_endpoint_by_location,
            &next.available_read_locations,
            OperationKinds::READ,
            &fallback,
        );

        debug!(
            read_endpoints = ?next.read_endpoints.iter().map(Url::as_str).collect::<Vec<_>>(),
            write_endpoints = ?next.write_endpoints.iter().map(Url::as_str).collect::<Vec<_>>(),
            "location cache updated"
        );
        self.locations.store(Arc::new(next));
        *last_update = Instant::now();
    }

    fn preferred_available_endpoints(
        &self,
        info: &LocationsInfo,
        endpoints_by_location: &HashMap<String, Url>,
        ordered_locations: &[String],
        expected: OperationKinds,
        fallback: &Url,
    ) -> Vec<Url> {
        let mut endpoints = Vec::new();

        if self.enable_endpoint_discovery {
            if self.can_use_multiple_write_locations() || expected == OperationKinds::READ {
                let mut unavailable = Vec::new();
                for location in &info.preferred_locations {
                    if let Some(endpoint) = endpoints_by_location.get(&location.to_lowercase()) {
                        if self.is_endpoint_unavailable(endpoint, expected) {
                            unavailable.push(endpoint.clone());
                        } else {
                            endpoints.push(endpoint.clone());
                        }
                    }
                }

                if endpoints.is_empty() {
                    endpoints.push(fallback.clone());
                }
                endpoints.extend(unavailable);
            } else {
                for location in ordered_locations {
                    if let Some(endpoint) = endpoints_by_location.get(&location.to_lowercase()) {
                        endpoints.push(endpoint.clone());
                    }
                }
            }
        }

        if endpoints.is_empty() {
            endpoints.push(fallback.clone());
        }
        endpoints
    }
}

fn endpoints_by_location(
    locations: &[DatabaseAccountLocation],
) -> (HashMap<String, Url>, Vec<String>) {
    let mut by_location = HashMap::new();
    let mut names = Vec::new();
    for location in locations {
        if location.name.is_empty() {
            continue;
        }
        match location.database_account_endpoint.parse::<Url>() {
            Ok(endpoint) => {
                by_location.insert(location.name.to_lowercase(), endpoint);
                names.push(location.name.clone());
            }
            Err(e) => warn!(
                location = %location.name,
                endpoint = %location.database_account_endpoint,
                error = %e,
                "ignoring location with an invalid endpoint"
            ),
        }
    }
    (by_location, names)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULT: &str = "https://contoso.documents.azure.com/";
    const WEST: &str = "https://contoso-westus.documents.azure.com/";
    const EAST: &str = "https://contoso-eastus.documents.azure.com/";
    const NORTH: &str = "https://contoso-northeurope.documents.azure.com/";

    fn url(s: &str) -> Url {
        s.parse().unwrap()
    }

    fn account(multi_write: bool) -> DatabaseAccount {
        DatabaseAccount::new(
            vec![
                DatabaseAccountLocation::new("West US", WEST),
                DatabaseAccountLocation::new("East US", EAST),
            ],
            vec![
                DatabaseAccountLocation::new("West US", WEST),
                DatabaseAccountLocation::new("East US", EAST),
                DatabaseAccountLocation::new("North Europe", NORTH),
            ],
        )
        .with_multiple_write_locations(multi_write)
    }

    fn cache(preferred: &[&str], multi_write: bool) -> LocationCache {
        let cache = LocationCache::new(
            preferred.iter().map(|s| s.to_string()).collect(),
            url(DEFAULT),
            true,
            multi_write,
            Duration::from_secs(300),
        );
        cache.on_database_account_read(&account(multi_write));
        cache
    }

    fn read_doc() -> DocumentServiceRequest {
        DocumentServiceRequest::new(
            OperationType::Read,
            ResourceType::Document,
            "dbs/db1/colls/coll1/docs/doc1",
        )
    }

    fn create_doc() -> DocumentServiceRequest {
        DocumentServiceRequest::new(
            OperationType::Create,
            ResourceType::Document,
            "dbs/db1/colls/coll1",
        )
    }

    #[test]
    fn endpoints_before_topology_is_known() {
        let cache = LocationCache::new(
            vec!["East US".into()],
            url(DEFAULT),
            true,
            false,
            Duration::from_secs(300),
        );
        assert_eq!(cache.read_endpoints(), vec![url(DEFAULT)]);
        assert_eq!(cache.write_endpoints(), vec![url(DEFAULT)]);
    }

    #[test]
    fn reads_follow_preferred_locations() {
        let cache = cache(&["North Europe", "east us"], false);
        assert_eq!(cache.read_endpoints(), vec![url(NORTH), url(EAST)]);
        // Single-write accounts write in the account's own order.
        assert_eq!(cache.write_endpoints(), vec![url(WEST), url(EAST)]);
    }

    #[test]
    fn reads_fall_back_to_first_write_endpoint() {
        let cache = cache(&[], false);
        assert_eq!(cache.read_endpoints(), vec![url(WEST)]);
    }

    #[test]
    fn multi_write_follows_preferred_locations() {
        let cache = cache(&["East US", "West US"], true);
        assert!(cache.can_use_multiple_write_locations());
        assert_eq!(cache.write_endpoints(), vec![url(EAST), url(WEST)]);

        let ctx = RequestContext::new();
        assert_eq!(cache.resolve_service_endpoint(&create_doc(), &ctx), url(EAST));

        let create_collection = DocumentServiceRequest::new(
            OperationType::Create,
            ResourceType::DocumentCollection,
            "dbs/db1",
        );
        assert!(!cache.can_use_multiple_write_locations_for(&create_collection));
        assert_eq!(
            cache.resolve_service_endpoint(&create_collection, &ctx),
            url(WEST)
        );
    }

    #[test]
    fn unavailable_endpoint_moves_to_the_end() {
        let cache = cache(&["West US", "East US"], false);
        cache.mark_endpoint_unavailable_for_read(&url(WEST));

        assert_eq!(cache.read_endpoints(), vec![url(EAST), url(WEST)]);
        // Only reads were affected.
        assert_eq!(cache.write_endpoints(), vec![url(WEST), url(EAST)]);
    }

    #[test]
    fn single_write_routing_alternates_between_first_two_write_regions() {
        let cache = cache(&["North Europe"], false);
        let mut ctx = RequestContext::new();

        assert_eq!(cache.resolve_service_endpoint(&create_doc(), &ctx), url(WEST));
        ctx.route_to_location_index(1, true);
        assert_eq!(cache.resolve_service_endpoint(&create_doc(), &ctx), url(EAST));
        ctx.route_to_location_index(2, true);
        assert_eq!(cache.resolve_service_endpoint(&create_doc(), &ctx), url(WEST));

        // Reads routed without preferred locations go to the write region too.
        ctx.route_to_location_index(0, false);
        assert_eq!(cache.resolve_service_endpoint(&read_doc(), &ctx), url(WEST));
    }

    #[test]
    fn pinned_endpoint_wins() {
        let cache = cache(&["West US"], false);
        let mut ctx = RequestContext::new();
        ctx.route_to_location_endpoint(url(NORTH));
        assert_eq!(cache.resolve_service_endpoint(&read_doc(), &ctx), url(NORTH));
    }

    #[test]
    fn discovery_disabled_uses_default_endpoint() {
        let cache = LocationCache::new(
            vec!["West US".into()],
            url(DEFAULT),
            false,
            false,
            Duration::from_secs(300),
        );
        cache.on_database_account_read(&account(false));

        let ctx = RequestContext::new();
        assert_eq!(cache.resolve_service_endpoint(&read_doc(), &ctx), url(DEFAULT));
        assert_eq!(cache.resolve_service_endpoint(&create_doc(), &ctx), url(DEFAULT));
        assert_eq!(cache.should_refresh_endpoints(), (false, true));
    }

    #[test]
    fn refresh_needed_when_preferred_read_endpoint_unavailable() {
        let cache = cache(&["West US", "East US"], false);
        assert_eq!(cache.should_refresh_endpoints(), (false, true));

        cache.mark_endpoint_unavailable_for_read(&url(WEST));
        // East US is now first, which isn't the most preferred location.
        assert_eq!(cache.should_refresh_endpoints(), (true, true));
    }

    #[test]
    fn refresh_in_foreground_when_every_write_endpoint_is_down() {
        let cache = cache(&["West US"], false);
        cache.mark_endpoint_unavailable_for_write(&url(WEST));
        cache.mark_endpoint_unavailable_for_write(&url(EAST));
        assert_eq!(cache.should_refresh_endpoints(), (true, false));
    }

    #[test]
    fn location_names_for_endpoints() {
        let cache = cache(&["West US"], false);
        assert_eq!(cache.location_for_endpoint(&url(NORTH)).as_deref(), Some("North Europe"));
        assert_eq!(cache.location_for_endpoint(&url(EAST)).as_deref(), Some("East US"));
        assert_eq!(cache.location_for_endpoint(&url(DEFAULT)), None);
    }

    #[tokio::test(start_paused = true)]
    async fn unavailability_expires() {
        let cache = cache(&["West US", "East US"], false);
        cache.mark_endpoint_unavailable_for_read(&url(WEST));

        tokio::time::advance(Duration::from_secs(299)).await;
        assert_eq!(cache.read_endpoints()[0], url(EAST));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.read_endpoints()[0], url(WEST));
        assert_eq!(cache.should_refresh_endpoints(), (false, true));
    }

    #[tokio::test(start_paused = true)]
    async fn preference_change_reorders_endpoints() {
        let cache = cache(&["West US"], false);
        cache.on_location_preference_changed(vec!["East US".into(), "West US".into()]);
        assert_eq!(cache.read_endpoints(), vec![url(EAST), url(WEST)]);
    }
}
