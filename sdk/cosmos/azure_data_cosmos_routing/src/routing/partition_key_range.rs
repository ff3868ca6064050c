// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

use azure_core::http::StatusCode;
use tracing::debug;

use crate::{
    constants::SubStatusCode,
    request::{DocumentServiceRequest, RequestContext},
    routing::{CollectionCache, PartitionKeyRangeCache},
    Result, ServiceError,
};

/// Resolves the partition key range a request targets and records it on `ctx`.
///
/// Requests carrying a partition key range identity resolve to that range. Requests for a
/// collection's children in a collection with a single range resolve to it. Anything else
/// is left unresolved.
///
/// Fails with 410/1002 when the identity names a range the routing map doesn't have, and with
/// 410/1000 when the collection has no routing map, so the partition-aware retry policies can
/// refresh their caches and try again.
pub async fn resolve_partition_key_range(
    request: &DocumentServiceRequest,
    ctx: &mut RequestContext,
    collection_cache: &dyn CollectionCache,
    partition_key_range_cache: &dyn PartitionKeyRangeCache,
) -> Result<()> {
    ctx.resolved_partition_key_range = None;

    let identity = request.partition_key_range_identity.as_ref();
    if identity.is_none() && !request.resource_type.is_collection_child() {
        return Ok(());
    }

    let collection_rid = match identity.and_then(|i| i.collection_rid.clone()) {
        Some(rid) => rid,
        None => collection_cache.resolve_collection(request).await?.resource_id,
    };

    let Some(routing_map) = partition_key_range_cache
        .try_lookup(&collection_rid, None, &request.properties)
        .await?
    else {
        return Err(ServiceError::new(
            StatusCode::Gone,
            format!("no routing map for collection {collection_rid}"),
        )
        .with_sub_status(SubStatusCode::NAME_CACHE_IS_STALE)
        .into());
    };

    let range = match identity {
        Some(identity) => {
            let range = routing_map
                .range_by_id(&identity.partition_key_range_id)
                .ok_or_else(|| {
                    ServiceError::new(
                        StatusCode::Gone,
                        format!(
                            "partition key range {} of collection {} is gone",
                            identity.partition_key_range_id, collection_rid
                        ),
                    )
                    .with_sub_status(SubStatusCode::PARTITION_KEY_RANGE_GONE)
                })?;
            Some(range.clone())
        }
        None => match routing_map.ordered_ranges() {
            [only] => Some(only.clone()),
            _ => None,
        },
    };

    if let Some(range) = &range {
        debug!(
            collection = %collection_rid,
            partition_key_range = %range.id,
            "resolved partition key range"
        );
    }
    ctx.resolved_partition_key_range = range;
    Ok(())
}
