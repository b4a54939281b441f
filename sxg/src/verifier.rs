// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Exchange verification.
//!
//! Re-derives the signed message from the exchange's own fields, checks it
//! against the leaf of the fetched certificate chain, and unwraps the MI
//! framing. Every check collapses into one payload/ok outcome; the reason a
//! particular exchange was rejected is reported only through the diagnostic
//! logger so an attacker probing the verifier learns nothing from the result.

use std::time::SystemTime;

use signature::Verifier as _;

use sxg_common::structured_header::SignatureParams;
use sxg_common::{mice, HeaderMap, Version};

use crate::signer::{unix_seconds, MAX_SIGNATURE_DURATION};
use crate::{cacheability, signed_message, uri, CertFetcher, Exchange, Logger};

/// Request headers whose semantics depend on per-user state.
const STATEFUL_REQUEST_HEADERS: &[&str] = &[
    "authorization",
    "cookie",
    "cookie2",
    "proxy-authorization",
    "sec-websocket-key",
];

/// Response headers whose semantics depend on per-user state.
const STATEFUL_RESPONSE_HEADERS: &[&str] = &[
    "authentication-control",
    "authentication-info",
    "optional-www-authenticate",
    "proxy-authenticate",
    "proxy-authentication-info",
    "public-key-pins",
    "set-cookie",
    "set-cookie2",
    "setprofile",
    "strict-transport-security",
    "www-authenticate",
];

/// Hop-by-hop headers that never appear in a cached response.
const UNCACHED_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub(crate) fn verify_exchange(
    e: &Exchange,
    verification_time: SystemTime,
    fetcher: &mut dyn CertFetcher,
    logger: &mut dyn Logger,
) -> Option<Vec<u8>> {
    match verify_inner(e, verification_time, fetcher, logger) {
        Ok(payload) => {
            tracing::debug!(
                target: "sxg",
                version = e.version.token(),
                uri = %e.request_uri,
                "exchange verified"
            );
            Some(payload)
        }
        Err(reason) => {
            logger.log(&reason);
            None
        }
    }
}

fn verify_inner(
    e: &Exchange,
    verification_time: SystemTime,
    fetcher: &mut dyn CertFetcher,
    logger: &mut dyn Logger,
) -> std::result::Result<Vec<u8>, String> {
    let params = SignatureParams::parse(&e.signature_header_value)
        .map_err(|err| format!("bad signature header: {err}"))?;

    let now = unix_seconds(verification_time).map_err(|err| err.to_string())?;
    if now < params.date {
        return Err(format!(
            "exchange is not yet valid: date {} is after verification time {now}",
            params.date
        ));
    }
    if now > params.expires {
        return Err(format!(
            "exchange expired at {}, verification time is {now}",
            params.expires
        ));
    }
    if params.expires < params.date
        || params.expires - params.date > MAX_SIGNATURE_DURATION.as_secs()
    {
        return Err(format!(
            "signature lifetime {}..{} exceeds the 7-day limit",
            params.date, params.expires
        ));
    }

    check_urls(e, &params)?;

    if params.integrity != e.version.integrity_identifier() {
        return Err(format!(
            "integrity {:?} does not match {:?}",
            params.integrity,
            e.version.integrity_identifier()
        ));
    }

    if e.version.signs_request() && !matches!(e.request_method.as_str(), "GET" | "HEAD") {
        return Err(format!(
            "request method {:?} is not GET or HEAD",
            e.request_method
        ));
    }

    check_headers(e, logger)?;

    if e.version == Version::V1B3
        && !cacheability::is_cacheable(e.response_status, &e.response_headers, logger)
    {
        return Err("response is not cacheable".to_string());
    }

    let chain_bytes = fetcher
        .fetch(&params.cert_url)
        .map_err(|err| format!("failed to fetch {}: {err}", params.cert_url))?;
    let chain = sxg_x509::CertChain::parse(&chain_bytes)
        .map_err(|err| format!("bad certificate chain from {}: {err}", params.cert_url))?;
    let leaf = chain.leaf();
    if sxg_x509::cert_sha256(&leaf.cert_der).as_slice() != params.cert_sha256.as_slice() {
        return Err("cert-sha256 does not match the fetched leaf certificate".to_string());
    }
    let verifying_key = sxg_x509::verifying_key(&leaf.cert_der).map_err(|err| err.to_string())?;

    let message = signed_message::serialize_signed_message(e, &params)
        .map_err(|err| format!("could not rebuild signed message: {err}"))?;
    let signature = p256::ecdsa::Signature::from_der(&params.sig)
        .map_err(|err| format!("malformed signature: {err}"))?;
    verifying_key
        .verify(&message, &signature)
        .map_err(|_| "signature verification failed".to_string())?;

    let digest_value = e
        .response_headers
        .get(e.version.digest_header_name())
        .ok_or_else(|| format!("response has no {} header", e.version.digest_header_name()))?;
    if e.response_headers.get("Content-Encoding") != Some(e.version.content_encoding()) {
        return Err(format!(
            "Content-Encoding is not {}",
            e.version.content_encoding()
        ));
    }
    let digest = mice::parse_digest_header(e.version, digest_value)
        .map_err(|err| format!("bad digest header: {err}"))?;
    mice::decode(&e.payload, &digest).map_err(|err| format!("payload integrity: {err}"))
}

fn check_urls(e: &Exchange, params: &SignatureParams) -> std::result::Result<(), String> {
    let cert_url = uri::parse_absolute(&params.cert_url).map_err(|err| err.to_string())?;
    if !matches!(cert_url.scheme(), "https" | "data") {
        return Err(format!(
            "cert-url scheme {:?} is not https or data",
            cert_url.scheme()
        ));
    }

    let request_url = uri::parse_absolute(&e.request_uri).map_err(|err| err.to_string())?;
    if e.version == Version::V1B3 && request_url.scheme() != "https" {
        return Err("request URI scheme is not https".to_string());
    }

    let validity_url = uri::parse_absolute(&params.validity_url).map_err(|err| err.to_string())?;
    if validity_url.scheme() != "https" {
        return Err("validity-url scheme is not https".to_string());
    }
    if validity_url.origin() != request_url.origin() {
        return Err(format!(
            "validity-url {} is not same-origin with {}",
            params.validity_url, e.request_uri
        ));
    }
    Ok(())
}

fn check_headers(e: &Exchange, logger: &mut dyn Logger) -> std::result::Result<(), String> {
    if e.version != Version::V1B3 {
        // Earlier revisions did not police statefulness. Keep their laxity
        // but leave a trail for callers that care.
        for name in offending_response_headers(&e.response_headers) {
            logger.log(&format!(
                "response header {name:?} would be rejected by a 1b3 exchange"
            ));
        }
        return Ok(());
    }

    for (name, _) in e.request_headers.iter() {
        if contains(STATEFUL_REQUEST_HEADERS, name) {
            return Err(format!("stateful request header {name:?}"));
        }
    }

    if !e.response_headers.contains("Content-Type") {
        return Err("response has no Content-Type header".to_string());
    }

    if let Some(name) = offending_response_headers(&e.response_headers).into_iter().next() {
        return Err(format!("response header {name:?} is not allowed"));
    }
    Ok(())
}

/// Stateful and uncached response header names present in `headers`,
/// including hop-by-hop names listed in `Connection`.
fn offending_response_headers(headers: &HeaderMap) -> Vec<String> {
    let hop_by_hop: Vec<String> = headers
        .get_all("Connection")
        .iter()
        .flat_map(|value| value.split(','))
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|token| !token.is_empty())
        .collect();

    headers
        .iter()
        .filter(|(name, _)| {
            contains(STATEFUL_RESPONSE_HEADERS, name)
                || contains(UNCACHED_HEADERS, name)
                || hop_by_hop.iter().any(|h| name.eq_ignore_ascii_case(h))
        })
        .map(|(name, _)| name.to_string())
        .collect()
}

fn contains(set: &[&str], name: &str) -> bool {
    set.iter().any(|entry| name.eq_ignore_ascii_case(entry))
}
