// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

//! Constants defining HTTP headers and service sub-status codes used by the routing layer.

use std::fmt;

use azure_core::http::headers::HeaderName;

pub const SESSION_TOKEN: HeaderName = HeaderName::from_static("x-ms-session-token");
pub const SUB_STATUS: HeaderName = HeaderName::from_static("x-ms-substatus");
pub const RETRY_AFTER_MS: HeaderName = HeaderName::from_static("x-ms-retry-after-ms");
pub const CONSISTENCY_LEVEL: HeaderName = HeaderName::from_static("x-ms-consistency-level");
pub const PARTITION_KEY_RANGE_ID: HeaderName =
    HeaderName::from_static("x-ms-documentdb-partitionkeyrangeid");

/// The full name (e.g. `dbs/db1/colls/coll1`) of the collection that owns the resource in a response.
pub const OWNER_FULL_NAME: HeaderName = HeaderName::from_static("x-ms-alt-content-path");

/// The resource id of the collection that owns the resource in a response.
pub const OWNER_ID: HeaderName = HeaderName::from_static("x-ms-content-path");

/// A service-specific sub-status code, carried next to the HTTP status in the `x-ms-substatus` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubStatusCode(u32);

impl SubStatusCode {
    // 403: Forbidden
    pub const FORBIDDEN_WRITEFORBIDDEN: SubStatusCode = SubStatusCode(3);
    pub const DATABASE_ACCOUNT_NOTFOUND: SubStatusCode = SubStatusCode(1008);

    // 404: Not Found
    pub const READ_SESSION_NOT_AVAILABLE: SubStatusCode = SubStatusCode(1002);

    // 410: Gone
    pub const NAME_CACHE_IS_STALE: SubStatusCode = SubStatusCode(1000);
    pub const PARTITION_KEY_RANGE_GONE: SubStatusCode = SubStatusCode(1002);

    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for SubStatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for SubStatusCode {
    fn from(value: u32) -> Self {
        Self(value)
    }
}
