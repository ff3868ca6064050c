// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

//! Client-wide session state, keyed by collection.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use azure_core::http::headers::Headers;
use dashmap::{mapref::entry::Entry, DashMap};
use tracing::{debug, trace};

use crate::{
    constants, paths,
    request::{DocumentServiceRequest, RequestContext},
    session::{Error, PartitionSessionToken, VectorSessionToken},
    PartitionKeyRangeId, ResourceId,
};

type PartitionTokens = Arc<DashMap<PartitionKeyRangeId, VectorSessionToken>>;

#[derive(Debug, Default)]
struct CollectionIndex {
    /// Session tokens indexed by the collection's unique id.
    tokens: HashMap<u64, PartitionTokens>,
    rid_by_name: HashMap<String, u64>,
    name_by_rid: HashMap<u64, String>,
}

impl CollectionIndex {
    fn remove_collection(&mut self, rid: u64) -> bool {
        if let Some(name) = self.name_by_rid.remove(&rid) {
            self.rid_by_name.remove(&name);
        }
        self.tokens.remove(&rid).is_some()
    }
}

/// Tracks the session tokens of every collection the client has talked to.
///
/// A collection is known both by its resource id and by its full name (`dbs/db1/colls/coll1`).
/// Both keys lead to the same per-partition token map, and clearing a collection removes the
/// tokens together with the name/id cross reference in one step.
///
/// Tokens only ever move forward: a token received from the service is merged into the one
/// already held for the same partition key range.
#[derive(Debug, Default)]
pub struct SessionContainer {
    index: RwLock<CollectionIndex>,
}

impl SessionContainer {
    /// Creates a new empty session container.
    pub fn new() -> Self {
        Self::default()
    }

    fn read_index(&self) -> RwLockReadGuard<'_, CollectionIndex> {
        self.index.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_index(&self) -> RwLockWriteGuard<'_, CollectionIndex> {
        self.index.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn tokens_for_request(&self, request: &DocumentServiceRequest) -> Option<PartitionTokens> {
        let index = self.read_index();
        let rid = if request.is_name_based() {
            let name = paths::collection_path(request.resource_address())?;
            *index.rid_by_name.get(&name)?
        } else {
            request.parsed_resource_id()?.unique_collection_id()
        };
        index.tokens.get(&rid).cloned()
    }

    /// Builds the container session token for the collection the request addresses: every
    /// known partition token, comma separated and ordered by partition key range id.
    ///
    /// Returns an empty string if nothing is known about the collection.
    pub fn resolve_global_session_token(&self, request: &DocumentServiceRequest) -> String {
        let Some(tokens) = self.tokens_for_request(request) else {
            return String::new();
        };

        let mut entries: Vec<(PartitionKeyRangeId, VectorSessionToken)> = tokens
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        entries
            .into_iter()
            .map(|(id, token)| PartitionSessionToken::new(id, token).to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Finds the session token for one partition key range of the request's collection.
    ///
    /// A range created by a split has no token of its own until the service returns one, so
    /// on a miss the parents of the resolved range are searched, most recent first.
    pub fn resolve_partition_local_session_token(
        &self,
        request: &DocumentServiceRequest,
        pk_range_id: &PartitionKeyRangeId,
        ctx: &RequestContext,
    ) -> Option<VectorSessionToken> {
        let tokens = self.tokens_for_request(request)?;
        if let Some(token) = tokens.get(pk_range_id) {
            return Some(token.value().clone());
        }

        let range = ctx.resolved_partition_key_range.as_ref()?;
        range
            .parents
            .iter()
            .rev()
            .find_map(|parent| {
                tokens
                    .get(&PartitionKeyRangeId::new(parent.as_str()))
                    .map(|t| t.value().clone())
            })
    }

    /// Records the session token returned in `response_headers` for the request's collection.
    ///
    /// The collection is identified from the owner headers of the response, falling back to
    /// the request's own address. Responses from master resources and responses without a
    /// session token are ignored.
    pub fn set_session_token(
        &self,
        request: &DocumentServiceRequest,
        response_headers: &Headers,
    ) -> Result<(), Error> {
        let Some(token) = response_headers.get_optional_str(&constants::SESSION_TOKEN) else {
            return Ok(());
        };
        if request.is_reading_from_master() {
            return Ok(());
        }

        let full_name = response_headers
            .get_optional_str(&constants::OWNER_FULL_NAME)
            .or(request.is_name_based().then(|| request.resource_address()))
            .and_then(paths::collection_path);

        let owner_id = if request.is_name_based() {
            response_headers
                .get_optional_str(&constants::OWNER_ID)
                .or(request.resource_id())
        } else {
            request.resource_id()
        };
        let Some(rid) = owner_id.and_then(|id| id.parse::<ResourceId>().ok()) else {
            trace!(
                address = request.resource_address(),
                "collection identity unknown, ignoring session token"
            );
            return Ok(());
        };
        if !rid.is_collection_scoped() {
            return Ok(());
        }

        self.add_tokens(rid.unique_collection_id(), full_name, token)
    }

    /// Records `session_token_header` for a collection whose identity is already known.
    pub fn set_session_token_for_collection(
        &self,
        collection_rid: &ResourceId,
        collection_full_name: &str,
        session_token_header: &str,
    ) -> Result<(), Error> {
        if !collection_rid.is_collection_scoped() {
            return Ok(());
        }
        self.add_tokens(
            collection_rid.unique_collection_id(),
            paths::collection_path(collection_full_name),
            session_token_header,
        )
    }

    fn add_tokens(&self, rid: u64, full_name: Option<String>, header: &str) -> Result<(), Error> {
        let tokens = PartitionSessionToken::parse_list(header)?;

        {
            let index = self.read_index();
            let name_matches = full_name
                .as_ref()
                .is_none_or(|name| index.rid_by_name.get(name) == Some(&rid));
            if let Some(map) = index.tokens.get(&rid).filter(|_| name_matches) {
                return merge_all(map, tokens);
            }
        }

        let mut index = self.write_index();
        if let Some(name) = full_name {
            // A name that points at a different id means the collection was deleted and recreated.
            if let Some(previous) = index.rid_by_name.get(&name).copied().filter(|p| *p != rid) {
                debug!(collection = %name, "collection was recreated, dropping stale session tokens");
                index.remove_collection(previous);
            }
            if let Some(old_name) = index.name_by_rid.insert(rid, name.clone()) {
                if old_name != name {
                    index.rid_by_name.remove(&old_name);
                }
            }
            index.rid_by_name.insert(name, rid);
        }
        let map = index.tokens.entry(rid).or_default().clone();
        merge_all(&map, tokens)
    }

    /// Removes every session token of the collection with the given resource id.
    pub fn clear_token_by_resource_id(&self, resource_id: &str) {
        let Some(rid) = resource_id
            .parse::<ResourceId>()
            .ok()
            .filter(ResourceId::is_collection_scoped)
        else {
            return;
        };

        if self.write_index().remove_collection(rid.unique_collection_id()) {
            debug!(resource_id, "cleared session tokens");
        }
    }

    /// Removes every session token of the collection named by `full_name`, which may be the
    /// full name of the collection or of any resource inside it.
    pub fn clear_token_by_collection_full_name(&self, full_name: &str) {
        let Some(name) = paths::collection_path(full_name) else {
            return;
        };

        let mut index = self.write_index();
        if let Some(rid) = index.rid_by_name.get(&name).copied() {
            index.remove_collection(rid);
            debug!(collection = %name, "cleared session tokens");
        }
    }

    /// Forgets every session token.
    pub fn clear_all(&self) {
        *self.write_index() = CollectionIndex::default();
    }

    /// Returns the number of collections being tracked.
    pub fn collection_count(&self) -> usize {
        self.read_index().tokens.len()
    }
}

fn merge_all(
    map: &DashMap<PartitionKeyRangeId, VectorSessionToken>,
    tokens: Vec<PartitionSessionToken>,
) -> Result<(), Error> {
    let mut first_error = None;
    for PartitionSessionToken {
        pkrange_id,
        vector_token,
    } in tokens
    {
        match map.entry(pkrange_id) {
            Entry::Occupied(mut entry) => match entry.get().merge(&vector_token) {
                Ok(merged) => {
                    entry.insert(merged);
                }
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            },
            Entry::Vacant(entry) => {
                entry.insert(vector_token);
            }
        }
    }
    first_error.map_or(Ok(()), Err)
}
