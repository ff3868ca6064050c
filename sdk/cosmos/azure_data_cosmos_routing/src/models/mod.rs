// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

//! Service models consumed by the routing layer.

use serde::{Deserialize, Serialize};

mod database_account;
mod partition_key_range;

pub use database_account::*;
pub use partition_key_range::*;

/// The identity of a collection, as resolved by a [`CollectionCache`](crate::routing::CollectionCache).
#[derive(Clone, Default, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct DocumentCollection {
    pub id: String,

    #[serde(rename = "_rid")]
    pub resource_id: String,

    /// The name-based link of the collection, `dbs/{db}/colls/{coll}`.
    #[serde(rename = "_altLink", default)]
    pub alt_link: String,
}

impl DocumentCollection {
    pub fn new(
        id: impl Into<String>,
        resource_id: impl Into<String>,
        alt_link: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            resource_id: resource_id.into(),
            alt_link: alt_link.into(),
        }
    }
}
