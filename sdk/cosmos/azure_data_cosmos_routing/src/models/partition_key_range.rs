// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::PartitionKeyRangeId;

/// A contiguous slice of a collection's partition key space.
#[derive(Clone, Default, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionKeyRange {
    pub id: String,
    pub min_inclusive: String,
    pub max_exclusive: String,

    /// Ids of the ranges this range was split from, oldest first.
    #[serde(default)]
    pub parents: Vec<String>,
}

impl PartitionKeyRange {
    pub fn new(
        id: impl Into<String>,
        min_inclusive: impl Into<String>,
        max_exclusive: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            min_inclusive: min_inclusive.into(),
            max_exclusive: max_exclusive.into(),
            parents: Vec::new(),
        }
    }

    pub fn with_parents<I, S>(mut self, parents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parents = parents.into_iter().map(Into::into).collect();
        self
    }

    pub fn range_id(&self) -> PartitionKeyRangeId {
        PartitionKeyRangeId::new(self.id.clone())
    }
}

/// Addresses a partition key range explicitly, bypassing partition key resolution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartitionKeyRangeIdentity {
    /// The resource id of the collection, when known.
    pub collection_rid: Option<String>,
    pub partition_key_range_id: String,
}

impl PartitionKeyRangeIdentity {
    pub fn new(partition_key_range_id: impl Into<String>) -> Self {
        Self {
            collection_rid: None,
            partition_key_range_id: partition_key_range_id.into(),
        }
    }

    pub fn with_collection_rid(mut self, collection_rid: impl Into<String>) -> Self {
        self.collection_rid = Some(collection_rid.into());
        self
    }
}

/// A snapshot of the partition key ranges of one collection.
///
/// Routing maps are immutable. A refreshed map is a new value; caches hand out
/// `Arc<CollectionRoutingMap>` so a stale snapshot can be passed back to force a refresh.
#[derive(Clone, Debug, PartialEq)]
pub struct CollectionRoutingMap {
    collection_rid: String,
    ranges: Vec<PartitionKeyRange>,
    by_id: HashMap<String, usize>,
    change_feed_next_if_none_match: Option<String>,
}

impl CollectionRoutingMap {
    /// Creates a routing map, ordering the ranges by their lower bound.
    pub fn new(
        collection_rid: impl Into<String>,
        mut ranges: Vec<PartitionKeyRange>,
        change_feed_next_if_none_match: Option<String>,
    ) -> Self {
        ranges.sort_by(|a, b| a.min_inclusive.cmp(&b.min_inclusive));
        let by_id = ranges
            .iter()
            .enumerate()
            .map(|(i, r)| (r.id.clone(), i))
            .collect();
        Self {
            collection_rid: collection_rid.into(),
            ranges,
            by_id,
            change_feed_next_if_none_match,
        }
    }

    pub fn collection_rid(&self) -> &str {
        &self.collection_rid
    }

    pub fn ordered_ranges(&self) -> &[PartitionKeyRange] {
        &self.ranges
    }

    pub fn range_by_id(&self, id: &str) -> Option<&PartitionKeyRange> {
        self.by_id.get(id).map(|i| &self.ranges[*i])
    }

    /// The change feed continuation used to fetch only the ranges that changed since this snapshot.
    pub fn change_feed_next_if_none_match(&self) -> Option<&str> {
        self.change_feed_next_if_none_match.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_range_with_parents() {
        let json = r#"{ "id": "3", "minInclusive": "", "maxExclusive": "FF", "parents": ["0", "1"] }"#;
        let range: PartitionKeyRange = serde_json::from_str(json).unwrap();
        assert_eq!(range.parents, vec!["0", "1"]);
        assert_eq!(range.range_id().value(), "3");
    }

    #[test]
    fn routing_map_orders_and_indexes_ranges() {
        let map = CollectionRoutingMap::new(
            "1tAvAP4XWQE=",
            vec![
                PartitionKeyRange::new("2", "80", "FF"),
                PartitionKeyRange::new("1", "", "80"),
            ],
            Some("etag-1".to_string()),
        );

        assert_eq!(map.ordered_ranges()[0].id, "1");
        assert_eq!(map.range_by_id("2").map(|r| r.max_exclusive.as_str()), Some("FF"));
        assert!(map.range_by_id("9").is_none());
        assert_eq!(map.change_feed_next_if_none_match(), Some("etag-1"));
    }
}
