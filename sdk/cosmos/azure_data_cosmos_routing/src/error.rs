// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

//! Error types surfaced by the routing layer.

use std::time::Duration;

use azure_core::{
    error::ErrorKind,
    http::{headers::Headers, StatusCode},
};
use url::Url;

use crate::constants::{self, SubStatusCode};

/// A specialized `Result` type for routing operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while routing, executing, or retrying a request.
///
/// Retry policies inspect these errors but never wrap them: when a request
/// ultimately fails, the caller sees the same value the transport produced.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// The service answered with a non-success status.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// The request never reached the service (connection refused, DNS failure, reset, ...).
    #[error("network failure talking to {}: {message}", endpoint.as_ref().map(Url::as_str).unwrap_or("<unknown endpoint>"))]
    Transport {
        endpoint: Option<Url>,
        message: String,
    },

    /// A session token could not be parsed or merged.
    #[error("session token error: {0}")]
    SessionToken(#[from] crate::session::Error),

    #[error("invalid resource id '{0}'")]
    InvalidResourceId(String),

    #[error("invalid endpoint '{0}'")]
    InvalidEndpoint(String),

    /// The client has been closed and no longer schedules work.
    #[error("the client has been closed")]
    Closed,
}

impl Error {
    /// Creates a transport error for a request sent to `endpoint`.
    pub fn transport(endpoint: Option<Url>, message: impl Into<String>) -> Self {
        Error::Transport {
            endpoint,
            message: message.into(),
        }
    }

    /// Gets the service error, if this error came back from the service.
    pub fn as_service_error(&self) -> Option<&ServiceError> {
        match self {
            Error::Service(e) => Some(e),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.as_service_error().map(|e| e.status)
    }

    pub fn sub_status(&self) -> Option<SubStatusCode> {
        self.as_service_error().and_then(|e| e.sub_status)
    }

    /// Returns `true` if this error carries exactly the given status and sub-status pair.
    pub fn is(&self, status: StatusCode, sub_status: SubStatusCode) -> bool {
        self.status() == Some(status) && self.sub_status() == Some(sub_status)
    }

    /// Returns `true` if the request failed before any response was received.
    pub fn is_network_failure(&self) -> bool {
        matches!(self, Error::Transport { .. })
    }
}

/// An error response returned by the Cosmos DB service.
#[derive(Debug, Clone, thiserror::Error)]
#[error("service returned status {status:?}, sub-status {}: {message}", sub_status.map(|s| s.value()).unwrap_or(0))]
pub struct ServiceError {
    pub status: StatusCode,
    pub sub_status: Option<SubStatusCode>,
    pub message: String,
    pub headers: Headers,
}

impl ServiceError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            sub_status: None,
            message: message.into(),
            headers: Headers::new(),
        }
    }

    /// Builds a service error from a response, reading the sub-status from the `x-ms-substatus` header.
    pub fn from_response(status: StatusCode, headers: Headers, message: impl Into<String>) -> Self {
        let sub_status = headers
            .get_optional_str(&constants::SUB_STATUS)
            .and_then(|s| s.trim().parse::<u32>().ok())
            .map(SubStatusCode::new);
        Self {
            status,
            sub_status,
            message: message.into(),
            headers,
        }
    }

    pub fn with_sub_status(mut self, sub_status: SubStatusCode) -> Self {
        self.sub_status = Some(sub_status);
        self
    }

    pub fn with_header(mut self, name: azure_core::http::headers::HeaderName, value: impl Into<String>) -> Self {
        self.headers.insert(name, value.into());
        self
    }

    /// The delay requested by the service through `x-ms-retry-after-ms`, or zero if absent.
    pub fn retry_after(&self) -> Duration {
        self.headers
            .get_optional_str(&constants::RETRY_AFTER_MS)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(Duration::ZERO)
    }
}

impl From<Error> for azure_core::Error {
    fn from(error: Error) -> Self {
        let kind = match &error {
            Error::Service(e) => ErrorKind::HttpResponse {
                status: e.status,
                error_code: e.sub_status.map(|s| s.to_string()),
                raw_response: None,
            },
            Error::Transport { .. } => ErrorKind::Io,
            _ => ErrorKind::Other,
        };
        azure_core::Error::with_error(kind, error, "cosmos request failed")
    }
}
