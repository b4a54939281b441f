// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Response cacheability policy.
//!
//! An exchange impersonates an origin to every visitor, so a response that a
//! shared cache could not legitimately store must not be distributed. The
//! rules approximate HTTP cache semantics: explicit opt-outs in
//! `Cache-Control` always lose, and a response with neither a
//! default-cacheable status nor explicit freshness information is rejected.

use sxg_common::HeaderMap;

use crate::Logger;

/// Statuses a cache may store without explicit freshness information.
const DEFAULT_CACHEABLE_STATUS: &[u16] =
    &[200, 203, 204, 206, 300, 301, 404, 405, 410, 414, 501];

/// Directives that forbid reuse from a shared cache, with or without an
/// attached field-name argument.
const BANNED_DIRECTIVES: &[&str] = &["no-store", "private", "no-cache"];

/// Directives that grant explicit freshness.
const FRESHNESS_DIRECTIVES: &[&str] = &["max-age", "s-maxage"];

pub(crate) fn is_cacheable(status: u16, headers: &HeaderMap, logger: &mut dyn Logger) -> bool {
    let directives = cache_control_directives(headers);

    for directive in &directives {
        if BANNED_DIRECTIVES.contains(&directive.as_str()) {
            logger.log(&format!(
                "response is not cacheable: Cache-Control contains {directive:?}"
            ));
            return false;
        }
    }

    let has_freshness = directives
        .iter()
        .any(|d| FRESHNESS_DIRECTIVES.contains(&d.as_str()))
        || headers.contains("Expires");
    if DEFAULT_CACHEABLE_STATUS.contains(&status) || has_freshness {
        return true;
    }

    logger.log(&format!(
        "response is not cacheable: status {status} is not cacheable by default and no \
explicit freshness information is present"
    ));
    false
}

/// Lowercased `Cache-Control` directive names across all header values.
/// Unknown directives are kept (and later ignored); arguments are dropped.
fn cache_control_directives(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all("Cache-Control")
        .iter()
        .flat_map(|value| value.split(','))
        .filter_map(|token| {
            let name = token.split('=').next().unwrap_or(token).trim();
            if name.is_empty() {
                None
            } else {
                Some(name.to_ascii_lowercase())
            }
        })
        .collect()
}
