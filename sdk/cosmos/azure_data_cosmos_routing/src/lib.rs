// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

#![doc = include_str!("../README.md")]
// Docs.rs build is done with the nightly compiler, so we can enable nightly features in that build.
#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![cfg_attr(docsrs, feature(doc_cfg_hide))]

pub mod client;
pub mod constants;
mod error;
pub mod models;
mod options;
pub mod paths;
pub mod request;
mod resource_id;
pub mod retry;
pub mod routing;
pub mod session;

#[doc(inline)]
pub use client::RoutingClient;

pub use error::*;
pub use options::*;
pub use resource_id::ResourceId;

use std::fmt;

/// A logical sequence number (LSN) used in Cosmos DB replication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Lsn(u64);

impl Lsn {
    /// Creates a new LSN from a u64 value.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the inner u64 value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// A region identifier used in Cosmos DB multi-region operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegionId(u32);

impl RegionId {
    /// Creates a new RegionId from a u32 value.
    pub fn new(value: u32) -> Self {
        Self(value)
    }

    /// Returns the inner u32 value.
    pub fn value(&self) -> u32 {
        self.0
    }
}

/// The identifier of a partition key range within a collection, e.g. `"0"` or `"42"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartitionKeyRangeId(String);

impl PartitionKeyRangeId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn value(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartitionKeyRangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PartitionKeyRangeId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}
