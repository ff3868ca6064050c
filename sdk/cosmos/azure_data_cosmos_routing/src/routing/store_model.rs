// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

use crate::{
    constants,
    request::{DocumentServiceRequest, OperationType, ResourceType},
    ConnectionMode,
};

/// Which transport a request is sent through.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreModelKind {
    Gateway,
    Direct,
}

/// Decides whether a request must go through the gateway.
///
/// Metadata operations, offers, script management and partition key range reads are only
/// served by the gateway, as are feeds over a collection's children that don't target a
/// specific partition key range.
pub fn select_store_model(
    resource_type: ResourceType,
    operation_type: OperationType,
    use_gateway_mode: bool,
    has_partition_key_range_identity: bool,
) -> StoreModelKind {
    use StoreModelKind::{Direct, Gateway};

    if use_gateway_mode {
        return Gateway;
    }

    if resource_type == ResourceType::Offer
        || (resource_type.is_script() && operation_type != OperationType::ExecuteJavaScript)
        || resource_type == ResourceType::PartitionKeyRange
    {
        return Gateway;
    }

    match operation_type {
        OperationType::Create | OperationType::Upsert => match resource_type {
            ResourceType::Database
            | ResourceType::User
            | ResourceType::DocumentCollection
            | ResourceType::Permission => Gateway,
            _ => Direct,
        },
        OperationType::Delete | OperationType::Read => match resource_type {
            ResourceType::Database | ResourceType::User | ResourceType::DocumentCollection => {
                Gateway
            }
            _ => Direct,
        },
        OperationType::Replace => match resource_type {
            ResourceType::DocumentCollection => Gateway,
            _ => Direct,
        },
        operation_type
            if operation_type.is_feed_operation()
                && resource_type.is_collection_child()
                && !has_partition_key_range_identity =>
        {
            Gateway
        }
        _ => Direct,
    }
}

/// Selects the transport for `request` under the client's connection mode.
pub fn store_model_for_request(
    request: &DocumentServiceRequest,
    connection_mode: ConnectionMode,
) -> StoreModelKind {
    let has_partition_key_range_identity = request.partition_key_range_identity.is_some()
        || request
            .headers
            .get_optional_str(&constants::PARTITION_KEY_RANGE_ID)
            .is_some();
    select_store_model(
        request.resource_type,
        request.operation_type,
        request.use_gateway_mode || connection_mode == ConnectionMode::Gateway,
        has_partition_key_range_identity,
    )
}
