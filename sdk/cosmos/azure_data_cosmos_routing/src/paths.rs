// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

//! Helpers for the slash-separated resource addresses (`dbs/{db}/colls/{coll}/docs/{doc}`)
//! used by name-based requests.

const DATABASES_SEGMENT: &str = "dbs";
const COLLECTIONS_SEGMENT: &str = "colls";

fn segments(address: &str) -> impl Iterator<Item = &str> {
    address.trim_matches('/').split('/').filter(|s| !s.is_empty())
}

/// Returns `true` if the address is a name-based full name rather than a resource id.
pub fn is_name_based(address: &str) -> bool {
    segments(address)
        .next()
        .is_some_and(|first| first.eq_ignore_ascii_case(DATABASES_SEGMENT))
}

/// Extracts the collection full name, `dbs/{db}/colls/{coll}`, from the full name of a
/// collection or of any resource inside it.
///
/// Returns `None` for addresses that aren't scoped to a collection, such as database paths.
pub fn collection_path(full_name: &str) -> Option<String> {
    let parts: Vec<&str> = segments(full_name).take(4).collect();
    match parts.as_slice() {
        [dbs, db, colls, coll]
            if dbs.eq_ignore_ascii_case(DATABASES_SEGMENT)
                && colls.eq_ignore_ascii_case(COLLECTIONS_SEGMENT) =>
        {
            Some(format!("{}/{}/{}/{}", dbs, db, colls, coll))
        }
        _ => None,
    }
}
