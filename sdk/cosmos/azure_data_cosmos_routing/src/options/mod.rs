// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

use std::time::Duration;

use tracing::warn;

/// Environment variable overriding how long an endpoint stays marked unavailable, in seconds.
pub const UNAVAILABLE_LOCATIONS_EXPIRATION_TIME_ENV: &str =
    "AZURE_COSMOS_UNAVAILABLE_LOCATIONS_EXPIRATION_TIME_IN_SECONDS";

const DEFAULT_UNAVAILABLE_LOCATIONS_EXPIRATION_TIME: Duration = Duration::from_secs(300);

/// How requests reach the service.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionMode {
    /// Every request goes through the gateway.
    Gateway,

    /// Data-plane requests go straight to the replicas; metadata requests still use the gateway.
    #[default]
    Direct,
}

/// The consistency level requested by the client.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConsistencyLevel {
    Strong,
    BoundedStaleness,
    #[default]
    Session,
    ConsistentPrefix,
    Eventual,
}

impl ConsistencyLevel {
    /// The value of the `x-ms-consistency-level` header.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsistencyLevel::Strong => "Strong",
            ConsistencyLevel::BoundedStaleness => "BoundedStaleness",
            ConsistencyLevel::Session => "Session",
            ConsistencyLevel::ConsistentPrefix => "ConsistentPrefix",
            ConsistencyLevel::Eventual => "Eventual",
        }
    }
}

/// Options controlling how throttled (429) requests are retried.
#[derive(Clone, Debug, PartialEq)]
pub struct ThrottlingRetryOptions {
    /// The maximum number of retries of a throttled request.
    pub max_retry_attempts: u32,

    /// The maximum total time spent waiting between retries of a throttled request.
    pub max_retry_wait_time: Duration,

    /// Multiplier applied to the delay the service asks for. Values of 1 or less are ignored.
    pub backoff_factor: u32,
}

impl Default for ThrottlingRetryOptions {
    fn default() -> Self {
        Self {
            max_retry_attempts: 9,
            max_retry_wait_time: Duration::from_secs(60),
            backoff_factor: 1,
        }
    }
}

/// Options controlling endpoint selection and failover.
#[derive(Clone, Debug)]
pub struct ConnectionPolicy {
    /// Regions to prefer, in order, e.g. `["West US", "East US"]`.
    pub preferred_locations: Vec<String>,

    /// Whether the client discovers regional endpoints from the account topology.
    /// When disabled, every request goes to the account's global endpoint.
    pub enable_endpoint_discovery: bool,

    /// Whether writes may go to any preferred region when the account allows it.
    pub use_multiple_write_locations: bool,

    pub connection_mode: ConnectionMode,
    pub consistency_level: ConsistencyLevel,
    pub throttling_retry_options: ThrottlingRetryOptions,
}

impl Default for ConnectionPolicy {
    fn default() -> Self {
        Self {
            preferred_locations: Vec::new(),
            enable_endpoint_discovery: true,
            use_multiple_write_locations: false,
            connection_mode: ConnectionMode::default(),
            consistency_level: ConsistencyLevel::default(),
            throttling_retry_options: ThrottlingRetryOptions::default(),
        }
    }
}

impl ConnectionPolicy {
    /// Creates a new [`ConnectionPolicyBuilder`] that can be used to construct a [`ConnectionPolicy`].
    ///
    /// # Examples
    ///
    /// ```rust
    /// let policy = azure_data_cosmos_routing::ConnectionPolicy::builder()
    ///     .with_preferred_locations(["West US", "East US"])
    ///     .with_multiple_write_locations(true)
    ///     .build();
    /// assert_eq!(policy.preferred_locations.len(), 2);
    /// ```
    pub fn builder() -> ConnectionPolicyBuilder {
        ConnectionPolicyBuilder::default()
    }
}

/// Builder used to construct a [`ConnectionPolicy`].
///
/// Obtain a [`ConnectionPolicyBuilder`] by calling [`ConnectionPolicy::builder()`]
#[derive(Default)]
pub struct ConnectionPolicyBuilder(ConnectionPolicy);

impl ConnectionPolicyBuilder {
    pub fn with_preferred_locations<I, S>(mut self, locations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0.preferred_locations = locations.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_endpoint_discovery(mut self, enabled: bool) -> Self {
        self.0.enable_endpoint_discovery = enabled;
        self
    }

    pub fn with_multiple_write_locations(mut self, enabled: bool) -> Self {
        self.0.use_multiple_write_locations = enabled;
        self
    }

    pub fn with_connection_mode(mut self, mode: ConnectionMode) -> Self {
        self.0.connection_mode = mode;
        self
    }

    pub fn with_consistency_level(mut self, level: ConsistencyLevel) -> Self {
        self.0.consistency_level = level;
        self
    }

    pub fn with_throttling_retry_options(mut self, options: ThrottlingRetryOptions) -> Self {
        self.0.throttling_retry_options = options;
        self
    }

    /// Builds a [`ConnectionPolicy`] from the builder.
    ///
    /// This does not consume the builder, and can be called multiple times.
    pub fn build(&self) -> ConnectionPolicy {
        self.0.clone()
    }
}

/// Process-level tuning of the routing layer.
#[derive(Clone, Debug, PartialEq)]
pub struct RoutingConfig {
    /// How long an endpoint stays unavailable after a failure. Also the period of the
    /// background topology refresh.
    pub unavailable_locations_expiration_time: Duration,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            unavailable_locations_expiration_time: DEFAULT_UNAVAILABLE_LOCATIONS_EXPIRATION_TIME,
        }
    }
}

impl RoutingConfig {
    /// Reads the configuration from the process environment, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(value) = lookup(UNAVAILABLE_LOCATIONS_EXPIRATION_TIME_ENV) {
            match value.trim().parse::<u64>() {
                Ok(seconds) => {
                    config.unavailable_locations_expiration_time = Duration::from_secs(seconds)
                }
                Err(e) => warn!(
                    value = %value,
                    error = %e,
                    "ignoring invalid {}",
                    UNAVAILABLE_LOCATIONS_EXPIRATION_TIME_ENV
                ),
            }
        }
        config
    }

    pub fn with_unavailable_locations_expiration_time(mut self, expiration: Duration) -> Self {
        self.unavailable_locations_expiration_time = expiration;
        self
    }
}
