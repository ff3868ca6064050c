// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

//! The request envelope that flows through routing and retry.
//!
//! A [`DocumentServiceRequest`] describes *what* the caller asked for and never changes once
//! issued. Everything decided while executing it (the endpoint, the partition key range, the
//! session token) lives on a [`RequestContext`] that retry policies and the client mutate
//! between attempts.

use std::collections::HashMap;

use azure_core::http::headers::{HeaderName, Headers};

use crate::{models::PartitionKeyRangeIdentity, paths, ResourceId};

mod context;
mod operation;
mod response;

pub use context::*;
pub use operation::*;
pub use response::*;

/// A request to the Cosmos DB service, addressed either by name or by resource id.
#[derive(Clone, Debug)]
pub struct DocumentServiceRequest {
    pub operation_type: OperationType,
    pub resource_type: ResourceType,
    resource_address: String,
    is_name_based: bool,
    resource_id: Option<String>,
    pub headers: Headers,

    /// Routes the request to a specific partition key range instead of resolving one.
    pub partition_key_range_identity: Option<PartitionKeyRangeIdentity>,

    /// Forces the request through the gateway regardless of resource and operation type.
    pub use_gateway_mode: bool,

    /// Opaque properties handed to the collection and partition key range caches.
    pub properties: HashMap<String, serde_json::Value>,
}

impl DocumentServiceRequest {
    /// Creates a request for the given address.
    ///
    /// Addresses starting with `dbs/` are full names (`dbs/db1/colls/coll1/docs/doc1`);
    /// anything else is treated as a resource id.
    pub fn new(
        operation_type: OperationType,
        resource_type: ResourceType,
        resource_address: impl Into<String>,
    ) -> Self {
        let resource_address = resource_address.into();
        let is_name_based = paths::is_name_based(&resource_address);
        let resource_id = (!is_name_based && !resource_address.is_empty())
            .then(|| resource_address.clone());
        Self {
            operation_type,
            resource_type,
            resource_address,
            is_name_based,
            resource_id,
            headers: Headers::new(),
            partition_key_range_identity: None,
            use_gateway_mode: false,
            properties: HashMap::new(),
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: impl Into<String>) -> Self {
        self.headers.insert(name, value.into());
        self
    }

    pub fn with_partition_key_range_identity(mut self, identity: PartitionKeyRangeIdentity) -> Self {
        self.partition_key_range_identity = Some(identity);
        self
    }

    pub fn with_gateway_mode(mut self, use_gateway_mode: bool) -> Self {
        self.use_gateway_mode = use_gateway_mode;
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    /// The full name or resource id the request was issued against.
    pub fn resource_address(&self) -> &str {
        &self.resource_address
    }

    pub fn is_name_based(&self) -> bool {
        self.is_name_based
    }

    /// The resource id of an id-based request.
    pub fn resource_id(&self) -> Option<&str> {
        self.resource_id.as_deref()
    }

    /// Parses the resource id of an id-based request, ignoring ids that don't decode.
    pub fn parsed_resource_id(&self) -> Option<ResourceId> {
        self.resource_id.as_deref().and_then(|rid| rid.parse().ok())
    }

    pub fn is_read_only_request(&self) -> bool {
        self.operation_type.is_read_only_operation()
    }

    /// Returns `true` if the request is served from the account's master partition, whose
    /// responses carry no collection-scoped session state.
    pub fn is_reading_from_master(&self) -> bool {
        match self.resource_type {
            ResourceType::PartitionKeyRange => !matches!(
                self.operation_type,
                OperationType::GetSplitPoint | OperationType::AbortSplit
            ),
            ResourceType::DocumentCollection => matches!(
                self.operation_type,
                OperationType::ReadFeed | OperationType::Query | OperationType::SqlQuery
            ),
            resource_type => resource_type.is_master_resource(),
        }
    }
}
