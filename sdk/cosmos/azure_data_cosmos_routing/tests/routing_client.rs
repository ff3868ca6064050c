// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

mod mock_transport;

use std::sync::Arc;

use azure_core::http::StatusCode;
use azure_data_cosmos_routing::{
    constants::{self, SubStatusCode},
    models::{DatabaseAccount, PartitionKeyRange, PartitionKeyRangeIdentity},
    request::{DocumentServiceRequest, OperationType, ResourceType},
    ConnectionPolicy, ConsistencyLevel, Error, RoutingClient, ServiceError,
};
use mock_transport::{
    ok, ok_with_session_token, service_error, two_region_account, MockAccountManager,
    MockCaches, MockStoreModel, COLLECTION_RID, EAST_US, GLOBAL_ENDPOINT, WEST_US,
};

struct Harness {
    client: RoutingClient,
    account_manager: Arc<MockAccountManager>,
    gateway: Arc<MockStoreModel>,
    direct: Arc<MockStoreModel>,
}

async fn harness(policy: ConnectionPolicy, caches: Option<Arc<MockCaches>>) -> Harness {
    harness_with_account(two_region_account(), policy, caches).await
}

async fn harness_with_account(
    account: DatabaseAccount,
    policy: ConnectionPolicy,
    caches: Option<Arc<MockCaches>>,
) -> Harness {
    let account_manager = MockAccountManager::new(account);
    let gateway = MockStoreModel::new();
    let direct = MockStoreModel::new();

    let mut builder = RoutingClient::builder(account_manager.clone(), gateway.clone(), direct.clone())
        .with_connection_policy(policy);
    if let Some(caches) = caches {
        builder = builder
            .with_collection_cache(caches.clone())
            .with_partition_key_range_cache(caches);
    }

    Harness {
        client: builder.build().await.unwrap(),
        account_manager,
        gateway,
        direct,
    }
}

fn two_region_policy() -> ConnectionPolicy {
    ConnectionPolicy::builder()
        .with_preferred_locations(["West US", "East US"])
        .build()
}

fn read_document() -> DocumentServiceRequest {
    DocumentServiceRequest::new(
        OperationType::Read,
        ResourceType::Document,
        "dbs/db1/colls/coll1/docs/doc1",
    )
}

fn create_document() -> DocumentServiceRequest {
    DocumentServiceRequest::new(
        OperationType::Create,
        ResourceType::Document,
        "dbs/db1/colls/coll1",
    )
}

#[tokio::test]
async fn reads_go_to_the_most_preferred_region() {
    let h = harness(two_region_policy(), None).await;

    h.client.execute(read_document()).await.unwrap();

    assert_eq!(h.direct.endpoints(), vec![WEST_US]);
    assert!(h.gateway.requests().is_empty());
    assert_eq!(h.account_manager.reads(), 1);
}

#[tokio::test]
async fn requests_use_the_global_endpoint_without_discovery() {
    let policy = ConnectionPolicy::builder()
        .with_preferred_locations(["East US"])
        .with_endpoint_discovery(false)
        .build();
    let h = harness(policy, None).await;

    h.client.execute(read_document()).await.unwrap();

    assert_eq!(h.direct.endpoints(), vec![GLOBAL_ENDPOINT]);
}

#[tokio::test]
async fn metadata_requests_go_through_the_gateway() {
    let h = harness(two_region_policy(), None).await;

    h.client
        .execute(DocumentServiceRequest::new(
            OperationType::Read,
            ResourceType::Database,
            "dbs/db1",
        ))
        .await
        .unwrap();
    h.client
        .execute(DocumentServiceRequest::new(
            OperationType::Query,
            ResourceType::Document,
            "dbs/db1/colls/coll1",
        ))
        .await
        .unwrap();
    h.client.execute(create_document()).await.unwrap();

    assert_eq!(h.gateway.requests().len(), 2);
    assert_eq!(h.direct.requests().len(), 1);
}

#[tokio::test]
async fn gateway_mode_sends_everything_to_the_gateway() {
    let policy = ConnectionPolicy::builder()
        .with_connection_mode(azure_data_cosmos_routing::ConnectionMode::Gateway)
        .build();
    let h = harness(policy, None).await;

    h.client.execute(create_document()).await.unwrap();

    assert_eq!(h.gateway.requests().len(), 1);
    assert!(h.direct.requests().is_empty());
}

#[tokio::test]
async fn write_forbidden_fails_over_to_the_next_write_region() {
    let h = harness(two_region_policy(), None).await;
    h.direct.push(Err(service_error(
        StatusCode::Forbidden,
        SubStatusCode::FORBIDDEN_WRITEFORBIDDEN,
    )));

    h.client.execute(create_document()).await.unwrap();

    assert_eq!(h.direct.endpoints(), vec![WEST_US, EAST_US]);
    // Once at startup, once forced by the failover.
    assert_eq!(h.account_manager.reads(), 2);
}

#[tokio::test(start_paused = true)]
async fn network_failure_on_read_retries_in_another_region() {
    let h = harness(two_region_policy(), None).await;
    h.direct.push(Err(Error::transport(
        Some(WEST_US.parse().unwrap()),
        "connection reset",
    )));

    h.client.execute(read_document()).await.unwrap();

    assert_eq!(h.direct.endpoints(), vec![WEST_US, EAST_US]);
    assert_eq!(
        h.client.global_endpoint_manager().read_endpoints()[0].as_str(),
        EAST_US
    );
}

#[tokio::test(start_paused = true)]
async fn network_failure_on_write_fails_over_to_the_next_write_region() {
    let h = harness(two_region_policy(), None).await;
    h.direct
        .push(Err(Error::transport(None, "connection reset")));

    h.client.execute(create_document()).await.unwrap();

    assert_eq!(h.direct.endpoints(), vec![WEST_US, EAST_US]);
    let write_endpoints = h.client.global_endpoint_manager().write_endpoints();
    assert_eq!(write_endpoints[0].as_str(), EAST_US);
    // The read side is untouched by a write failure.
    assert_eq!(
        h.client.global_endpoint_manager().read_endpoints()[0].as_str(),
        WEST_US
    );
}

#[tokio::test(start_paused = true)]
async fn throttled_requests_are_retried_until_the_budget_runs_out() {
    let h = harness(two_region_policy(), None).await;
    let throttled = || -> Error {
        ServiceError::new(StatusCode::TooManyRequests, "throttled")
            .with_header(constants::RETRY_AFTER_MS, "10")
            .into()
    };

    h.direct.push(Err(throttled()));
    h.client.execute(read_document()).await.unwrap();
    assert_eq!(h.direct.requests().len(), 2);

    for _ in 0..10 {
        h.direct.push(Err(throttled()));
    }
    let error = h.client.execute(read_document()).await.unwrap_err();
    assert_eq!(error.status(), Some(StatusCode::TooManyRequests));
    // One attempt plus nine retries.
    assert_eq!(h.direct.requests().len(), 2 + 10);
}

#[tokio::test]
async fn session_tokens_flow_from_writes_to_reads() {
    let h = harness(two_region_policy(), None).await;
    h.direct.push(ok_with_session_token("0:1#100"));

    h.client.execute(create_document()).await.unwrap();
    h.client.execute(read_document()).await.unwrap();

    let requests = h.direct.requests();
    assert_eq!(requests[0].session_token, None);
    assert_eq!(requests[1].session_token.as_deref(), Some("0:1#100"));
}

#[tokio::test]
async fn session_tokens_are_not_sent_outside_session_consistency() {
    let policy = ConnectionPolicy::builder()
        .with_consistency_level(ConsistencyLevel::Eventual)
        .build();
    let h = harness(policy, None).await;
    h.direct.push(ok_with_session_token("0:1#100"));

    h.client.execute(create_document()).await.unwrap();
    h.client.execute(read_document()).await.unwrap();

    assert_eq!(h.direct.requests()[1].session_token, None);
}

#[tokio::test]
async fn request_header_opts_into_session_consistency() {
    let policy = ConnectionPolicy::builder()
        .with_consistency_level(ConsistencyLevel::Eventual)
        .build();
    let h = harness(policy, None).await;
    h.direct.push(ok_with_session_token("0:1#100"));

    h.client.execute(create_document()).await.unwrap();
    h.client
        .execute(read_document().with_header(constants::CONSISTENCY_LEVEL, "Session"))
        .await
        .unwrap();
    h.client
        .execute(read_document().with_header(constants::CONSISTENCY_LEVEL, "Eventual"))
        .await
        .unwrap();

    let requests = h.direct.requests();
    assert_eq!(requests[1].session_token.as_deref(), Some("0:1#100"));
    assert_eq!(requests[2].session_token, None);
}

#[tokio::test]
async fn partition_local_token_is_sent_for_the_resolved_range() {
    let caches = MockCaches::new(vec![PartitionKeyRange::new("0", "", "FF")]);
    let h = harness(two_region_policy(), Some(caches)).await;
    h.direct.push(ok_with_session_token("0:1#100"));

    h.client.execute(create_document()).await.unwrap();
    h.client.execute(read_document()).await.unwrap();

    let read = &h.direct.requests()[1];
    assert_eq!(read.partition_key_range.as_deref(), Some("0"));
    assert_eq!(read.session_token.as_deref(), Some("0:1#100"));
}

#[tokio::test]
async fn split_children_inherit_the_parent_token() {
    let caches = MockCaches::new(vec![PartitionKeyRange::new("0", "", "FF")]);
    let h = harness(two_region_policy(), Some(caches.clone())).await;
    h.direct.push(ok_with_session_token("0:1#100"));
    h.client.execute(create_document()).await.unwrap();

    caches.set_ranges(vec![
        PartitionKeyRange::new("1", "", "7F").with_parents(["0"]),
        PartitionKeyRange::new("2", "7F", "FF").with_parents(["0"]),
    ]);
    let request = read_document().with_partition_key_range_identity(
        PartitionKeyRangeIdentity::new("1").with_collection_rid(COLLECTION_RID),
    );
    h.client.execute(request).await.unwrap();

    let read = &h.direct.requests()[1];
    assert_eq!(read.partition_key_range.as_deref(), Some("1"));
    assert_eq!(read.session_token.as_deref(), Some("1:1#100"));
}

#[tokio::test]
async fn resolved_range_without_a_token_sends_none() {
    let caches = MockCaches::new(vec![PartitionKeyRange::new("0", "", "FF")]);
    let h = harness(two_region_policy(), Some(caches.clone())).await;
    h.direct.push(ok_with_session_token("0:1#100"));
    h.client.execute(create_document()).await.unwrap();

    caches.set_ranges(vec![
        PartitionKeyRange::new("0", "", "7F"),
        PartitionKeyRange::new("5", "7F", "FF"),
    ]);
    let request = read_document().with_partition_key_range_identity(
        PartitionKeyRangeIdentity::new("5").with_collection_rid(COLLECTION_RID),
    );
    h.client.execute(request).await.unwrap();

    let read = &h.direct.requests()[1];
    assert_eq!(read.partition_key_range.as_deref(), Some("5"));
    // Range 0's token says nothing about range 5.
    assert_eq!(read.session_token, None);
}

#[tokio::test]
async fn partition_key_range_gone_refreshes_the_routing_map_once() {
    let caches = MockCaches::new(vec![PartitionKeyRange::new("0", "", "FF")]);
    let h = harness(two_region_policy(), Some(caches.clone())).await;
    let gone = || service_error(StatusCode::Gone, SubStatusCode::PARTITION_KEY_RANGE_GONE);

    h.direct.push(Err(gone()));
    h.client.execute(read_document()).await.unwrap();
    assert_eq!(h.direct.requests().len(), 2);
    assert_eq!(MockCaches::count(&caches.forced_lookups), 1);

    h.direct.push(Err(gone()));
    h.direct.push(Err(gone()));
    let error = h.client.execute(read_document()).await.unwrap_err();
    assert!(error.is(StatusCode::Gone, SubStatusCode::PARTITION_KEY_RANGE_GONE));
    assert_eq!(h.direct.requests().len(), 4);
}

#[tokio::test]
async fn unknown_partition_key_range_is_reported_as_gone() {
    let caches = MockCaches::new(vec![PartitionKeyRange::new("0", "", "FF")]);
    let h = harness(two_region_policy(), Some(caches.clone())).await;

    let request = read_document().with_partition_key_range_identity(
        PartitionKeyRangeIdentity::new("7").with_collection_rid(COLLECTION_RID),
    );
    let error = h.client.execute(request).await.unwrap_err();

    assert!(error.is(StatusCode::Gone, SubStatusCode::PARTITION_KEY_RANGE_GONE));
    assert!(h.direct.requests().is_empty());
    assert_eq!(MockCaches::count(&caches.forced_lookups), 1);
}

#[tokio::test]
async fn stale_name_cache_refreshes_the_collection() {
    let caches = MockCaches::new(vec![PartitionKeyRange::new("0", "", "FF")]);
    let h = harness(two_region_policy(), Some(caches.clone())).await;
    h.direct.push(Err(service_error(
        StatusCode::Gone,
        SubStatusCode::NAME_CACHE_IS_STALE,
    )));

    h.client.execute(read_document()).await.unwrap();

    assert_eq!(MockCaches::count(&caches.refreshes), 1);
    assert_eq!(h.direct.requests().len(), 2);
}

#[tokio::test]
async fn read_session_not_available_retries_on_the_write_region() {
    let h = harness(two_region_policy(), None).await;
    h.direct.push(Err(service_error(
        StatusCode::NotFound,
        SubStatusCode::READ_SESSION_NOT_AVAILABLE,
    )));

    h.client.execute(read_document()).await.unwrap();

    assert_eq!(h.direct.endpoints(), vec![WEST_US, WEST_US]);
}

#[tokio::test]
async fn read_session_not_available_walks_the_read_regions_with_multiple_write_locations() {
    let policy = ConnectionPolicy::builder()
        .with_preferred_locations(["East US", "West US"])
        .with_multiple_write_locations(true)
        .build();
    let h = harness_with_account(
        two_region_account().with_multiple_write_locations(true),
        policy,
        None,
    )
    .await;
    for _ in 0..5 {
        h.direct.push(Err(service_error(
            StatusCode::NotFound,
            SubStatusCode::READ_SESSION_NOT_AVAILABLE,
        )));
    }

    let error = h.client.execute(read_document()).await.unwrap_err();

    assert!(error.is(StatusCode::NotFound, SubStatusCode::READ_SESSION_NOT_AVAILABLE));
    // The first retry ignores preferences, the second walks them; then the regions run out.
    assert_eq!(h.direct.endpoints(), vec![EAST_US, WEST_US, WEST_US]);
}

#[tokio::test]
async fn session_tokens_are_cleared_when_reads_keep_missing_the_session() {
    let h = harness(two_region_policy(), None).await;
    h.direct.push(ok_with_session_token("0:1#100"));
    h.client.execute(create_document()).await.unwrap();
    assert_eq!(h.client.session_container().collection_count(), 1);

    let not_available =
        || service_error(StatusCode::NotFound, SubStatusCode::READ_SESSION_NOT_AVAILABLE);
    h.direct.push(Err(not_available()));
    h.direct.push(Err(not_available()));

    let error = h.client.execute(read_document()).await.unwrap_err();

    assert!(error.is(StatusCode::NotFound, SubStatusCode::READ_SESSION_NOT_AVAILABLE));
    assert_eq!(h.client.session_container().collection_count(), 0);

    h.client.execute(read_document()).await.unwrap();
    assert_eq!(h.direct.requests().last().unwrap().session_token, None);
}

#[tokio::test]
async fn closed_client_rejects_requests() {
    let h = harness(two_region_policy(), None).await;
    h.client.close();

    let error = h.client.execute(read_document()).await.unwrap_err();

    assert!(matches!(error, Error::Closed));
    assert!(h.direct.requests().is_empty());
}

#[tokio::test]
async fn successful_responses_pass_through_unchanged() {
    let h = harness(two_region_policy(), None).await;
    h.direct.push(ok());

    let response = h.client.execute(read_document()).await.unwrap();

    assert_eq!(response.status, StatusCode::Ok);
}
