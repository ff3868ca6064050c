// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

use std::{fmt, str::FromStr};

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::Error;

/// A service-assigned resource id (`_rid`), such as `1tAvAP4XWQE=`.
///
/// Resource ids are base64 encoded byte strings where `/` is replaced by `-`.
/// The first four bytes identify the database and the next four bytes the collection
/// (or user) inside it. Only the pieces needed to key session state by collection are decoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceId {
    database: u32,
    document_collection: u32,
    bytes: Vec<u8>,
}

const COLLECTION_FLAG: u8 = 0x80;

impl ResourceId {
    /// Creates the resource id of a collection.
    ///
    /// The service tells collections apart from users by the high bit of the collection's
    /// first (least significant) byte; ids without it are not treated as collection-scoped.
    pub fn for_collection(database: u32, document_collection: u32) -> Self {
        let mut bytes = Vec::with_capacity(8);
        bytes.extend_from_slice(&database.to_le_bytes());
        bytes.extend_from_slice(&document_collection.to_le_bytes());
        Self {
            database,
            document_collection: if bytes[4] & COLLECTION_FLAG != 0 {
                document_collection
            } else {
                0
            },
            bytes,
        }
    }

    /// Creates the resource id of a document inside the given collection.
    pub fn for_document(database: u32, document_collection: u32, document: u64) -> Self {
        let mut rid = Self::for_collection(database, document_collection);
        rid.bytes.extend_from_slice(&document.to_le_bytes());
        rid
    }

    pub fn database(&self) -> u32 {
        self.database
    }

    /// The collection portion of the id, or `0` when the id isn't collection-scoped.
    pub fn document_collection(&self) -> u32 {
        self.document_collection
    }

    /// Returns `true` if this id belongs to a collection or to a resource inside a collection.
    pub fn is_collection_scoped(&self) -> bool {
        self.document_collection != 0
    }

    /// A number uniquely identifying the collection in the account.
    pub fn unique_collection_id(&self) -> u64 {
        ((self.document_collection as u64) << 32) | self.database as u64
    }
}

impl FromStr for ResourceId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidResourceId(s.to_string());

        let bytes = STANDARD
            .decode(s.replace('-', "/"))
            .map_err(|_| invalid())?;
        if bytes.len() < 4 {
            return Err(invalid());
        }

        let database = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let document_collection = if bytes.len() >= 8 && bytes[4] & COLLECTION_FLAG != 0 {
            u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]])
        } else {
            0
        };

        Ok(Self {
            database,
            document_collection,
            bytes,
        })
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&STANDARD.encode(&self.bytes).replace('/', "-"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_collection_rid() {
        let rid: ResourceId = "1tAvAP4XWQE=".parse().unwrap();
        assert!(rid.is_collection_scoped());
        assert_eq!(rid.to_string(), "1tAvAP4XWQE=");
    }

    #[test]
    fn document_rid_shares_collection_identity() {
        let collection: ResourceId = "1tAvAP4XWQE=".parse().unwrap();
        let document: ResourceId = "1tAvAP4XWQEBAAAAAAAAAA==".parse().unwrap();

        assert_eq!(
            document.unique_collection_id(),
            collection.unique_collection_id()
        );
        assert!(document.is_collection_scoped());
    }

    #[test]
    fn database_rid_is_not_collection_scoped() {
        let rid: ResourceId = "1tAvAA==".parse().unwrap();
        assert!(!rid.is_collection_scoped());
    }

    #[test]
    fn constructed_ids_roundtrip() {
        let rid = ResourceId::for_document(7, 0x0159_17fe, 3);
        let parsed: ResourceId = rid.to_string().parse().unwrap();
        assert_eq!(parsed, rid);
        assert_eq!(parsed.document_collection(), 0x0159_17fe);
    }

    #[test]
    fn invalid_rids_fail() {
        assert!(matches!(
            "!!".parse::<ResourceId>(),
            Err(Error::InvalidResourceId(_))
        ));
        assert!("AA==".parse::<ResourceId>().is_err());
    }
}
