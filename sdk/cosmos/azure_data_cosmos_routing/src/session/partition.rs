// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

//! Partition-scoped session tokens, as exchanged in the `x-ms-session-token` header.

use super::Error;
use crate::{session::VectorSessionToken, PartitionKeyRangeId};
use std::fmt;
use std::str::FromStr;

/// A session token scoped to one partition key range.
///
/// The string format is: `{pkrange_id}:{vector_session_token}`
/// For example: `42:1#123#4=500#5=600`
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionSessionToken {
    /// The partition key range ID this token applies to.
    pub pkrange_id: PartitionKeyRangeId,

    /// The vector session token containing version, global LSN, and regional LSNs.
    pub vector_token: VectorSessionToken,
}

impl PartitionSessionToken {
    pub fn new(pkrange_id: PartitionKeyRangeId, vector_token: VectorSessionToken) -> Self {
        Self {
            pkrange_id,
            vector_token,
        }
    }

    /// Parses a container session token: a comma-separated list of partition session tokens,
    /// such as `"0:1#100#1=20,1:1#98#1=19"`. Blank entries are skipped.
    pub fn parse_list(s: &str) -> Result<Vec<PartitionSessionToken>, Error> {
        if s.trim().is_empty() {
            return Err(Error::EmptyInput);
        }

        s.split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(PartitionSessionToken::from_str)
            .collect()
    }
}

impl FromStr for PartitionSessionToken {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(Error::EmptyInput);
        }

        let (pkrange_part, vector_part) = s.split_once(':').ok_or(Error::MissingComponents)?;

        if pkrange_part.is_empty() || vector_part.is_empty() {
            return Err(Error::MissingComponents);
        }

        Ok(PartitionSessionToken {
            pkrange_id: PartitionKeyRangeId::new(pkrange_part),
            vector_token: VectorSessionToken::from_str(vector_part)?,
        })
    }
}

impl fmt::Display for PartitionSessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.pkrange_id.value(), self.vector_token)
    }
}
