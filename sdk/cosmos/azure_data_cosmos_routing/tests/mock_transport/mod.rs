// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

#![allow(dead_code)]

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use azure_core::http::{headers::Headers, StatusCode};
use azure_data_cosmos_routing::{
    constants::{self, SubStatusCode},
    models::{
        CollectionRoutingMap, DatabaseAccount, DatabaseAccountLocation, DocumentCollection,
        PartitionKeyRange,
    },
    request::{DocumentServiceRequest, RequestContext, StoreResponse},
    routing::{CollectionCache, DatabaseAccountManager, PartitionKeyRangeCache, StoreModel},
    Error, Result, ServiceError,
};
use url::Url;

pub const GLOBAL_ENDPOINT: &str = "https://contoso.documents.azure.com/";
pub const WEST_US: &str = "https://contoso-westus.documents.azure.com/";
pub const EAST_US: &str = "https://contoso-eastus.documents.azure.com/";
pub const COLLECTION_RID: &str = "1tAvAP4XWQE=";
pub const COLLECTION_LINK: &str = "dbs/db1/colls/coll1";

pub fn two_region_account() -> DatabaseAccount {
    let locations = vec![
        DatabaseAccountLocation::new("West US", WEST_US),
        DatabaseAccountLocation::new("East US", EAST_US),
    ];
    DatabaseAccount::new(locations.clone(), locations)
}

pub fn service_error(status: StatusCode, sub_status: SubStatusCode) -> Error {
    ServiceError::new(status, "scripted failure")
        .with_sub_status(sub_status)
        .into()
}

pub fn ok_with_session_token(token: &str) -> Result<StoreResponse> {
    let mut headers = Headers::new();
    headers.insert(constants::SESSION_TOKEN, token.to_string());
    headers.insert(constants::OWNER_FULL_NAME, COLLECTION_LINK);
    headers.insert(constants::OWNER_ID, COLLECTION_RID);
    Ok(StoreResponse::new(StatusCode::Ok, headers, Vec::new()))
}

pub fn ok() -> Result<StoreResponse> {
    Ok(StoreResponse::new(StatusCode::Ok, Headers::new(), Vec::new()))
}

/// An account manager that always returns the same topology.
pub struct MockAccountManager {
    account: Mutex<DatabaseAccount>,
    pub reads: AtomicUsize,
}

impl MockAccountManager {
    pub fn new(account: DatabaseAccount) -> Arc<Self> {
        Arc::new(Self {
            account: Mutex::new(account),
            reads: AtomicUsize::new(0),
        })
    }

    pub fn set_account(&self, account: DatabaseAccount) {
        *self.account.lock().unwrap() = account;
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DatabaseAccountManager for MockAccountManager {
    fn service_endpoint(&self) -> Url {
        GLOBAL_ENDPOINT.parse().unwrap()
    }

    async fn database_account_from_endpoint(&self, _endpoint: &Url) -> Result<DatabaseAccount> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.account.lock().unwrap().clone())
    }
}

/// One request seen by a [`MockStoreModel`].
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub endpoint: Option<Url>,
    pub session_token: Option<String>,
    pub partition_key_range: Option<String>,
}

/// A store model that replays scripted responses and records what it was sent.
///
/// Once the script runs out, every request succeeds with an empty response.
#[derive(Default)]
pub struct MockStoreModel {
    script: Mutex<VecDeque<Result<StoreResponse>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockStoreModel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_script(script: impl IntoIterator<Item = Result<StoreResponse>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn push(&self, response: Result<StoreResponse>) {
        self.script.lock().unwrap().push_back(response);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn endpoints(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .map(|r| r.endpoint.map(|e| e.to_string()).unwrap_or_default())
            .collect()
    }
}

#[async_trait]
impl StoreModel for MockStoreModel {
    async fn process_message(
        &self,
        _request: &DocumentServiceRequest,
        ctx: &RequestContext,
    ) -> Result<StoreResponse> {
        self.requests.lock().unwrap().push(RecordedRequest {
            endpoint: ctx.location_endpoint_to_route.clone(),
            session_token: ctx.session_token.clone(),
            partition_key_range: ctx.resolved_partition_key_range.as_ref().map(|r| r.id.clone()),
        });
        self.script.lock().unwrap().pop_front().unwrap_or_else(ok)
    }
}

/// Collection and partition key range caches backed by mutable in-memory state.
pub struct MockCaches {
    collection: Mutex<DocumentCollection>,
    ranges: Mutex<Vec<PartitionKeyRange>>,
    pub resolves: AtomicUsize,
    pub refreshes: AtomicUsize,
    pub forced_lookups: AtomicUsize,
}

impl MockCaches {
    pub fn new(ranges: Vec<PartitionKeyRange>) -> Arc<Self> {
        Arc::new(Self {
            collection: Mutex::new(DocumentCollection::new(
                "coll1",
                COLLECTION_RID,
                COLLECTION_LINK,
            )),
            ranges: Mutex::new(ranges),
            resolves: AtomicUsize::new(0),
            refreshes: AtomicUsize::new(0),
            forced_lookups: AtomicUsize::new(0),
        })
    }

    pub fn set_ranges(&self, ranges: Vec<PartitionKeyRange>) {
        *self.ranges.lock().unwrap() = ranges;
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CollectionCache for MockCaches {
    async fn resolve_collection(&self, _request: &DocumentServiceRequest) -> Result<DocumentCollection> {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        Ok(self.collection.lock().unwrap().clone())
    }

    async fn refresh(
        &self,
        _collection_link: &str,
        _properties: &HashMap<String, serde_json::Value>,
    ) -> Result<()> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl PartitionKeyRangeCache for MockCaches {
    async fn try_lookup(
        &self,
        collection_rid: &str,
        previous: Option<Arc<CollectionRoutingMap>>,
        _properties: &HashMap<String, serde_json::Value>,
    ) -> Result<Option<Arc<CollectionRoutingMap>>> {
        if previous.is_some() {
            self.forced_lookups.fetch_add(1, Ordering::SeqCst);
        }
        Ok(Some(Arc::new(CollectionRoutingMap::new(
            collection_rid,
            self.ranges.lock().unwrap().clone(),
            None,
        ))))
    }
}
