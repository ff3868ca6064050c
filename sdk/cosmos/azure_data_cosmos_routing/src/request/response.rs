// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

use azure_core::http::{headers::Headers, StatusCode};

use crate::constants;

/// A successful response from a store model.
#[derive(Clone, Debug)]
pub struct StoreResponse {
    pub status: StatusCode,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl StoreResponse {
    pub fn new(status: StatusCode, headers: Headers, body: Vec<u8>) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// The raw `x-ms-session-token` header, if present.
    pub fn session_token(&self) -> Option<&str> {
        self.headers.get_optional_str(&constants::SESSION_TOKEN)
    }
}
