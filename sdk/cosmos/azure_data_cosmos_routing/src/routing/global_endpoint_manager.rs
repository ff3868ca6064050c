// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

use std::{
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
    time::Duration,
};

use tokio::sync::Notify;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
    models::DatabaseAccount,
    request::{DocumentServiceRequest, RequestContext},
    routing::{location_helper, DatabaseAccountManager, LocationCache},
    ConnectionPolicy, Error, Result, RoutingConfig,
};

/// Fetches the account topology from the global endpoint, then from each preferred region in
/// order, returning the first account read successfully.
///
/// If every endpoint fails, the last error is returned.
pub async fn database_account_from_any_location<F, Fut>(
    default_endpoint: &Url,
    preferred_locations: &[String],
    fetch: F,
) -> Result<DatabaseAccount>
where
    F: Fn(Url) -> Fut,
    Fut: Future<Output = Result<DatabaseAccount>>,
{
    let mut last_error = match fetch(default_endpoint.clone()).await {
        Ok(account) => return Ok(account),
        Err(e) => {
            warn!(endpoint = %default_endpoint, error = %e, "failed to read database account from the global endpoint");
            e
        }
    };

    for location in preferred_locations {
        let endpoint = match location_helper::location_endpoint(default_endpoint, location) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                warn!(location = %location, error = %e, "cannot derive a regional endpoint");
                last_error = e;
                continue;
            }
        };
        match fetch(endpoint.clone()).await {
            Ok(account) => return Ok(account),
            Err(e) => {
                warn!(%endpoint, error = %e, "failed to read database account from regional endpoint");
                last_error = e;
            }
        }
    }

    Err(last_error)
}

/// Clears the single-flight flag when a refresh ends, however it ends.
struct RefreshGuard<'a>(&'a AtomicBool);

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Keeps the [`LocationCache`] in sync with the account topology.
///
/// Topology is read once by [`init`](Self::init) and then periodically by a background task.
/// Retry policies call [`refresh_location`](Self::refresh_location) after a failover; only one
/// such refresh runs at a time.
pub struct GlobalEndpointManager {
    owner: Arc<dyn DatabaseAccountManager>,
    location_cache: LocationCache,
    default_endpoint: Url,
    preferred_locations: Vec<String>,
    background_refresh_period: Duration,
    is_refreshing: AtomicBool,
    refresh_in_background: AtomicBool,
    closed: AtomicBool,
    close_notify: Arc<Notify>,
}

impl std::fmt::Debug for GlobalEndpointManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalEndpointManager")
            .field("default_endpoint", &self.default_endpoint)
            .field("preferred_locations", &self.preferred_locations)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl GlobalEndpointManager {
    pub fn new(
        owner: Arc<dyn DatabaseAccountManager>,
        policy: &ConnectionPolicy,
        config: &RoutingConfig,
    ) -> Self {
        let default_endpoint = owner.service_endpoint();
        let location_cache = LocationCache::new(
            policy.preferred_locations.clone(),
            default_endpoint.clone(),
            policy.enable_endpoint_discovery,
            policy.use_multiple_write_locations,
            config.unavailable_locations_expiration_time,
        );
        Self {
            owner,
            location_cache,
            default_endpoint,
            preferred_locations: policy.preferred_locations.clone(),
            background_refresh_period: config.unavailable_locations_expiration_time,
            is_refreshing: AtomicBool::new(false),
            refresh_in_background: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            close_notify: Arc::new(Notify::new()),
        }
    }

    /// Reads the account topology and starts the background refresh.
    pub async fn init(self: &Arc<Self>) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        let account = self.database_account_from_any_location().await?;
        self.location_cache.on_database_account_read(&account);
        self.start_refresh_location_timer();
        Ok(())
    }

    /// Stops the background refresh. Requests already in flight are unaffected.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!("closing global endpoint manager");
            self.close_notify.notify_waiters();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn location_cache(&self) -> &LocationCache {
        &self.location_cache
    }

    pub fn read_endpoints(&self) -> Vec<Url> {
        self.location_cache.read_endpoints()
    }

    pub fn write_endpoints(&self) -> Vec<Url> {
        self.location_cache.write_endpoints()
    }

    pub fn resolve_service_endpoint(
        &self,
        request: &DocumentServiceRequest,
        ctx: &RequestContext,
    ) -> Url {
        self.location_cache.resolve_service_endpoint(request, ctx)
    }

    pub fn mark_endpoint_unavailable_for_read(&self, endpoint: &Url) {
        self.location_cache.mark_endpoint_unavailable_for_read(endpoint);
    }

    pub fn mark_endpoint_unavailable_for_write(&self, endpoint: &Url) {
        self.location_cache.mark_endpoint_unavailable_for_write(endpoint);
    }

    pub fn can_use_multiple_write_locations(&self, request: &DocumentServiceRequest) -> bool {
        self.location_cache.can_use_multiple_write_locations_for(request)
    }

    async fn database_account_from_any_location(&self) -> Result<DatabaseAccount> {
        let owner = &self.owner;
        database_account_from_any_location(
            &self.default_endpoint,
            &self.preferred_locations,
            |endpoint| async move { owner.database_account_from_endpoint(&endpoint).await },
        )
        .await
    }

    /// Brings the topology up to date.
    ///
    /// A forced refresh always reads the account. Otherwise `account`, when given, is applied
    /// and the account is read only if the cache needs a refresh that can't wait for the
    /// background task. Concurrent non-forced calls return immediately while one is running.
    pub async fn refresh_location(
        self: &Arc<Self>,
        account: Option<DatabaseAccount>,
        force_refresh: bool,
    ) -> Result<()> {
        if force_refresh {
            let account = self.database_account_from_any_location().await?;
            self.location_cache.on_database_account_read(&account);
            return Ok(());
        }

        if self
            .is_refreshing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("location refresh already in progress");
            return Ok(());
        }
        let _guard = RefreshGuard(&self.is_refreshing);
        self.refresh_location_private(account).await
    }

    async fn refresh_location_private(
        self: &Arc<Self>,
        account: Option<DatabaseAccount>,
    ) -> Result<()> {
        let has_account = account.is_some();
        if let Some(account) = account {
            self.location_cache.on_database_account_read(&account);
        }

        let (should_refresh, can_refresh_in_background) =
            self.location_cache.should_refresh_endpoints();
        if !should_refresh {
            return Ok(());
        }

        if !has_account && !can_refresh_in_background {
            info!("no endpoint available, refreshing the account topology in the foreground");
            let account = self.database_account_from_any_location().await?;
            self.location_cache.on_database_account_read(&account);
        }

        self.start_refresh_location_timer();
        Ok(())
    }

    fn start_refresh_location_timer(self: &Arc<Self>) {
        if self.is_closed()
            || self
                .refresh_in_background
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
        {
            return;
        }

        let weak = Arc::downgrade(self);
        let close_notify = Arc::clone(&self.close_notify);
        let period = self.background_refresh_period;
        tokio::spawn(async move {
            refresh_loop(weak, close_notify, period).await;
        });
    }

    async fn refresh_in_background_once(&self) {
        match self.database_account_from_any_location().await {
            Ok(account) => {
                if self.is_closed() {
                    return;
                }
                self.location_cache.on_database_account_read(&account);
            }
            Err(e) => error!(error = %e, "background refresh of the account topology failed"),
        }
    }
}

async fn refresh_loop(weak: Weak<GlobalEndpointManager>, close_notify: Arc<Notify>, period: Duration) {
    loop {
        let notified = close_notify.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a concurrent close can't be missed.
        notified.as_mut().enable();

        match weak.upgrade() {
            Some(manager) if !manager.is_closed() => {}
            _ => break,
        }

        tokio::select! {
            _ = tokio::time::sleep(period) => {}
            _ = &mut notified => break,
        }

        let Some(manager) = weak.upgrade() else {
            break;
        };
        if manager.is_closed() {
            break;
        }
        debug!("refreshing the account topology in the background");
        manager.refresh_in_background_once().await;
    }
    debug!("background location refresh stopped");
}

impl Drop for GlobalEndpointManager {
    fn drop(&mut self) {
        self.close_notify.notify_waiters();
    }
}
