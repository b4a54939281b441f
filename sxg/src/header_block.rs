// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Canonical CBOR form of an exchange's request/response metadata.
//!
//! b1/b2 encode `[request map, response map]`; b3 encodes the response map
//! alone. Header names are lowercased, multi-valued headers joined with
//! `", "` in insertion order, and the `:method`/`:url`/`:status` pseudo
//! entries ride in the same maps. Keys and values are CBOR byte strings.
//!
//! The same encoding serves two masters: the container's header block (with
//! the verbatim request URL) and the signed-message hash (with the canonical
//! URL).

use sxg_common::cbor::{self, Value};
use sxg_common::{Error, HeaderMap, Result, Version};

use crate::Exchange;

const PSEUDO_METHOD: &[u8] = b":method";
const PSEUDO_URL: &[u8] = b":url";
const PSEUDO_STATUS: &[u8] = b":status";

/// Encode the header block for `e`, embedding `url` as the request URL.
pub(crate) fn encode_block(e: &Exchange, url: &str) -> Result<Vec<u8>> {
    let response = response_entries(e.response_status, &e.response_headers);
    if e.version.signs_request() {
        let request = request_entries(&e.request_method, url, &e.request_headers);
        cbor::encode_two_map_block(request, response)
    } else {
        cbor::encode_map(response)
    }
}

fn header_entries(headers: &HeaderMap) -> Vec<(Vec<u8>, Value)> {
    headers
        .joined_entries()
        .into_iter()
        .map(|(name, value)| {
            (
                name.to_ascii_lowercase().into_bytes(),
                Value::Bytes(value.into_bytes()),
            )
        })
        .collect()
}

fn request_entries(method: &str, url: &str, headers: &HeaderMap) -> Vec<(Vec<u8>, Value)> {
    let mut entries = vec![
        (PSEUDO_METHOD.to_vec(), Value::Bytes(method.as_bytes().to_vec())),
        (PSEUDO_URL.to_vec(), Value::Bytes(url.as_bytes().to_vec())),
    ];
    entries.extend(header_entries(headers));
    entries
}

fn response_entries(status: u16, headers: &HeaderMap) -> Vec<(Vec<u8>, Value)> {
    let mut entries = vec![(
        PSEUDO_STATUS.to_vec(),
        Value::Bytes(status.to_string().into_bytes()),
    )];
    entries.extend(header_entries(headers));
    entries
}

/// Decoded header block contents.
pub(crate) struct ParsedHeaderBlock {
    pub request_method: Option<String>,
    pub request_headers: HeaderMap,
    pub response_status: u16,
    pub response_headers: HeaderMap,
}

/// Parse (and canonicity-check) a container header block.
pub(crate) fn parse_block(version: Version, block: &[u8]) -> Result<ParsedHeaderBlock> {
    if version.signs_request() {
        let (request, response) = cbor::decode_canonical_two_map_block(block)?;
        let (method, request_headers) = split_request_map(request)?;
        let (status, response_headers) = split_response_map(response)?;
        Ok(ParsedHeaderBlock {
            request_method: Some(method),
            request_headers,
            response_status: status,
            response_headers,
        })
    } else {
        let response = cbor::decode_canonical_map_block(block)?;
        let (status, response_headers) = split_response_map(response)?;
        Ok(ParsedHeaderBlock {
            request_method: None,
            request_headers: HeaderMap::new(),
            response_status: status,
            response_headers,
        })
    }
}

fn utf8(field: &str, bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes).map_err(|_| Error::ParseError(format!("{field} is not valid UTF-8")))
}

fn split_request_map(entries: Vec<(Vec<u8>, Vec<u8>)>) -> Result<(String, HeaderMap)> {
    let mut method = None;
    let mut headers = HeaderMap::new();
    for (key, value) in entries {
        if key == PSEUDO_METHOD {
            method = Some(utf8("request method", value)?);
        } else if key == PSEUDO_URL {
            utf8("request URL", value)?;
        } else {
            let name = header_name(key)?;
            headers.add(name, utf8("header value", value)?);
        }
    }
    let method =
        method.ok_or_else(|| Error::ParseError("request map has no :method".to_string()))?;
    Ok((method, headers))
}

fn split_response_map(entries: Vec<(Vec<u8>, Vec<u8>)>) -> Result<(u16, HeaderMap)> {
    let mut status = None;
    let mut headers = HeaderMap::new();
    for (key, value) in entries {
        if key == PSEUDO_STATUS {
            status = Some(parse_status(&value)?);
        } else {
            let name = header_name(key)?;
            headers.add(name, utf8("header value", value)?);
        }
    }
    let status =
        status.ok_or_else(|| Error::ParseError("response map has no :status".to_string()))?;
    Ok((status, headers))
}

fn header_name(key: Vec<u8>) -> Result<String> {
    let name = utf8("header name", key)?;
    if name.is_empty() || name.starts_with(':') {
        return Err(Error::ParseError(format!("unexpected header name {name:?}")));
    }
    Ok(name)
}

fn parse_status(value: &[u8]) -> Result<u16> {
    let text = std::str::from_utf8(value)
        .map_err(|_| Error::ParseError(":status is not valid UTF-8".to_string()))?;
    let status: u16 = text
        .parse()
        .map_err(|_| Error::ParseError(format!(":status {text:?} is not an integer")))?;
    if !(100..=999).contains(&status) || text.len() != 3 {
        return Err(Error::ParseError(format!(
            ":status {text:?} is not a 3-digit status code"
        )));
    }
    Ok(status)
}
