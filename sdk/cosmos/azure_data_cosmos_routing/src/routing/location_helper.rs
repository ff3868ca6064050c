// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

use url::Url;

use crate::{Error, Result};

/// Derives the regional endpoint of an account from its global endpoint.
///
/// `https://contoso.documents.azure.com:443/` in `"West US"` becomes
/// `https://contoso-westus.documents.azure.com:443/`.
pub fn location_endpoint(service_endpoint: &Url, location: &str) -> Result<Url> {
    let host = service_endpoint
        .host_str()
        .ok_or_else(|| Error::InvalidEndpoint(service_endpoint.to_string()))?;

    let (account, domain) = match host.split_once('.') {
        Some((account, domain)) => (account, Some(domain)),
        None => (host, None),
    };
    let region: String = location
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();

    let regional_host = match domain {
        Some(domain) => format!("{account}-{region}.{domain}"),
        None => format!("{account}-{region}"),
    };

    let mut endpoint = service_endpoint.clone();
    endpoint
        .set_host(Some(&regional_host))
        .map_err(|_| Error::InvalidEndpoint(regional_host))?;
    Ok(endpoint)
}
