// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

//! Session token errors.

use std::fmt;

/// Errors that can occur when parsing, comparing, or merging session tokens.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// The input string is empty.
    EmptyInput,
    /// The input has fewer than the two required components (version and global LSN),
    /// or a partition token is missing its `{pkRangeId}:` prefix.
    MissingComponents,
    /// The version component could not be parsed as a u64.
    InvalidVersion(String),
    /// The global LSN component could not be parsed as a u64.
    InvalidGlobalLsn(String),
    /// A region ID component could not be parsed as a u32.
    InvalidRegionId(String),
    /// A region LSN component could not be parsed as a u64.
    InvalidRegionLsn(String),
    /// A regional component is not of the form `{regionId}={lsn}`.
    MalformedRegionalComponent(String),
    /// Two tokens with the same version disagree on their set of regions during validation.
    InvalidRegions { current: String, other: String },
    /// Two tokens with the same version disagree on their set of regions during a merge.
    TokensCannotBeMerged { current: String, other: String },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::EmptyInput => write!(f, "session token is empty"),
            Error::MissingComponents => {
                write!(f, "missing required components (version and global LSN)")
            }
            Error::InvalidVersion(s) => write!(f, "invalid version: '{}'", s),
            Error::InvalidGlobalLsn(s) => write!(f, "invalid global LSN: '{}'", s),
            Error::InvalidRegionId(s) => write!(f, "invalid region ID: '{}'", s),
            Error::InvalidRegionLsn(s) => write!(f, "invalid region LSN: '{}'", s),
            Error::MalformedRegionalComponent(s) => {
                write!(f, "malformed regional component: '{}'", s)
            }
            Error::InvalidRegions { current, other } => write!(
                f,
                "invalid regions in session token comparison: current='{}', other='{}'",
                current, other
            ),
            Error::TokensCannotBeMerged { current, other } => write!(
                f,
                "session tokens with the same version have different regions: current='{}', other='{}'",
                current, other
            ),
        }
    }
}

impl std::error::Error for Error {}

impl From<Error> for azure_core::Error {
    fn from(error: Error) -> Self {
        azure_core::Error::with_error(
            azure_core::error::ErrorKind::DataConversion,
            error,
            "session token invalid",
        )
    }
}
