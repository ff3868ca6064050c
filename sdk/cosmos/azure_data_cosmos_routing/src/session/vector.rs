// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

//! Vector session token types for Cosmos DB.

use std::{
    cmp,
    collections::{BTreeMap, BTreeSet},
    fmt,
    str::FromStr,
};

use super::Error;
use crate::{Lsn, RegionId};

/// A vector session token for Cosmos DB operations.
///
/// Vector session tokens track logical sequence numbers (LSNs) at the global
/// level and per region. A client compares the token it holds with the token of
/// a replica to decide whether the replica has caught up with everything the
/// client has already observed.
///
/// The string form is `{version}#{globalLsn}#{regionId}={lsn}#...`, for example `1#100#1=20#2=5`.
/// Regions are always serialized in ascending region-id order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorSessionToken {
    /// The version of the token. It increases when the set of regions changes.
    pub version: u64,

    /// The global logical sequence number.
    pub global_lsn: Lsn,

    /// A mapping of region IDs to their respective logical sequence numbers.
    pub regional_lsns: BTreeMap<RegionId, Lsn>,
}

fn parse_digits<T>(s: &str) -> Result<T, ()>
where
    T: TryFrom<u64>,
{
    if s.is_empty() {
        return Err(());
    }

    // Parse manually so signs, whitespace and other forms `str::parse` tolerates are rejected.
    let mut result = 0u64;
    for byte in s.bytes() {
        let digit = match byte {
            b'0'..=b'9' => (byte - b'0') as u64,
            _ => return Err(()),
        };

        result = result.checked_mul(10).ok_or(())?;
        result = result.checked_add(digit).ok_or(())?;
    }

    T::try_from(result).map_err(|_| ())
}

impl FromStr for VectorSessionToken {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(Error::EmptyInput);
        }

        // Empty segments, as in `1#100#` or `1##100`, carry nothing and are skipped.
        let mut segments = s.split('#').filter(|segment| !segment.is_empty());

        let version_str = segments.next().ok_or(Error::MissingComponents)?;
        let global_lsn_str = segments.next().ok_or(Error::MissingComponents)?;

        let version = parse_digits::<u64>(version_str)
            .map_err(|_| Error::InvalidVersion(version_str.to_string()))?;
        let global_lsn = parse_digits::<u64>(global_lsn_str)
            .map(Lsn::new)
            .map_err(|_| Error::InvalidGlobalLsn(global_lsn_str.to_string()))?;

        let mut regional_lsns = BTreeMap::new();
        for component in segments {
            let (region_id_str, region_lsn_str) = component
                .split_once('=')
                .ok_or_else(|| Error::MalformedRegionalComponent(component.to_string()))?;

            if region_id_str.is_empty() || region_lsn_str.is_empty() {
                return Err(Error::MalformedRegionalComponent(component.to_string()));
            }

            let region_id = parse_digits::<u32>(region_id_str)
                .map_err(|_| Error::InvalidRegionId(region_id_str.to_string()))?;
            let region_lsn = parse_digits::<u64>(region_lsn_str)
                .map_err(|_| Error::InvalidRegionLsn(region_lsn_str.to_string()))?;

            regional_lsns.insert(RegionId::new(region_id), Lsn::new(region_lsn));
        }

        Ok(VectorSessionToken {
            version,
            global_lsn,
            regional_lsns,
        })
    }
}

impl VectorSessionToken {
    pub fn new(version: u64, global_lsn: Lsn, regional_lsns: BTreeMap<RegionId, Lsn>) -> Self {
        Self {
            version,
            global_lsn,
            regional_lsns,
        }
    }

    fn same_regions(&self, other: &VectorSessionToken) -> bool {
        self.regional_lsns.len() == other.regional_lsns.len()
            && self
                .regional_lsns
                .keys()
                .all(|r| other.regional_lsns.contains_key(r))
    }

    /// Checks whether `other` is at least as recent as this token, that is, whether a
    /// replica reporting `other` has caught up with everything this token has seen.
    ///
    /// Returns an error when both tokens have the same version but different region sets,
    /// which can only happen if the service violated the token protocol.
    pub fn is_valid(&self, other: &VectorSessionToken) -> Result<bool, Error> {
        if other.version < self.version || other.global_lsn < self.global_lsn {
            return Ok(false);
        }

        if other.version == self.version && !self.same_regions(other) {
            return Err(Error::InvalidRegions {
                current: self.to_string(),
                other: other.to_string(),
            });
        }

        for (region_id, other_lsn) in &other.regional_lsns {
            match self.regional_lsns.get(region_id) {
                Some(lsn) if other_lsn < lsn => return Ok(false),
                // A region we don't know about only matters when the versions match, which was checked above.
                _ => continue,
            }
        }

        Ok(true)
    }

    /// Merges this token with another token, producing a token that represents the
    /// progress of both. The merge is commutative.
    ///
    /// The version and global LSN are the maximum of both tokens and every region present
    /// in either token keeps its highest LSN. Tokens with the same version must agree on
    /// their set of regions.
    pub fn merge(&self, other: &VectorSessionToken) -> Result<VectorSessionToken, Error> {
        if self.version == other.version && !self.same_regions(other) {
            return Err(Error::TokensCannotBeMerged {
                current: self.to_string(),
                other: other.to_string(),
            });
        }

        let regions: BTreeSet<&RegionId> = self
            .regional_lsns
            .keys()
            .chain(other.regional_lsns.keys())
            .collect();

        let regional_lsns = regions
            .into_iter()
            .map(|region_id| {
                let lsn = match (
                    self.regional_lsns.get(region_id),
                    other.regional_lsns.get(region_id),
                ) {
                    (Some(a), Some(b)) => cmp::max(*a, *b),
                    (Some(a), None) | (None, Some(a)) => *a,
                    (None, None) => unreachable!("region ids come from one of the two tokens"),
                };
                (*region_id, lsn)
            })
            .collect();

        Ok(VectorSessionToken {
            version: cmp::max(self.version, other.version),
            global_lsn: cmp::max(self.global_lsn, other.global_lsn),
            regional_lsns,
        })
    }
}

impl fmt::Display for VectorSessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.version, self.global_lsn.value())?;

        for (region_id, region_lsn) in self.regional_lsns.iter() {
            write!(f, "#{}={}", region_id.value(), region_lsn.value())?;
        }

        Ok(())
    }
}
