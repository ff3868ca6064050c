// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

use serde::{Deserialize, Serialize};

/// The account topology document returned by `GET /` on an account endpoint.
///
/// Only the properties the routing layer needs are modeled.
#[derive(Clone, Default, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseAccount {
    #[serde(default)]
    pub id: String,

    /// Regions that currently accept writes, in failover-priority order.
    #[serde(default)]
    pub writable_locations: Vec<DatabaseAccountLocation>,

    /// Regions that currently accept reads.
    #[serde(default)]
    pub readable_locations: Vec<DatabaseAccountLocation>,

    /// Whether the account allows writes in every region.
    #[serde(default)]
    pub enable_multiple_write_locations: bool,
}

impl DatabaseAccount {
    pub fn new(
        writable_locations: Vec<DatabaseAccountLocation>,
        readable_locations: Vec<DatabaseAccountLocation>,
    ) -> Self {
        Self {
            writable_locations,
            readable_locations,
            ..Default::default()
        }
    }

    pub fn with_multiple_write_locations(mut self, enabled: bool) -> Self {
        self.enable_multiple_write_locations = enabled;
        self
    }
}

/// A named region of the account together with its regional endpoint.
#[derive(Clone, Default, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseAccountLocation {
    pub name: String,
    pub database_account_endpoint: String,
}

impl DatabaseAccountLocation {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            database_account_endpoint: endpoint.into(),
        }
    }
}
