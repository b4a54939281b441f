// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Deterministic CBOR subset.
//!
//! Any bytes that feed a cryptographic hash must have exactly one encoding,
//! so this module restricts CBOR to: definite-length arrays and maps,
//! shortest-form integer heads, byte-string keys and values, and map keys
//! sorted by length first and then lexicographic byte order (RFC 7049 §3.9
//! canonical ordering, not plain lexicographic).
//!
//! Decoding enforces canonicity by re-encoding the decoded structure and
//! requiring byte equality with the input. That one comparison rejects
//! indefinite lengths, oversized integer heads, unsorted keys, and any other
//! non-canonical variation.

use std::cmp::Ordering;
use std::collections::HashSet;

use minicbor::{Decoder, Encoder};

use crate::error::{Error, Result};

/// Map values used by exchange header blocks and signature parameter maps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int(u64),
    Bytes(Vec<u8>),
}

/// Canonical map-key ordering: shorter keys first, ties broken bytewise.
pub fn key_order(a: &[u8], b: &[u8]) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn encode_err<E: std::fmt::Display>(e: minicbor::encode::Error<E>) -> Error {
    Error::InvalidInput(format!("cbor encode failed: {e}"))
}

fn decode_err(context: &str, e: minicbor::decode::Error) -> Error {
    Error::ParseError(format!("{context}: {e}"))
}

/// Encode a map with byte-string keys, sorting entries canonically.
///
/// Duplicate keys are rejected: a map that needs two values for one name is
/// malformed at this layer (multi-valued headers are joined before encoding).
pub fn encode_map(mut entries: Vec<(Vec<u8>, Value)>) -> Result<Vec<u8>> {
    entries.sort_by(|(a, _), (b, _)| key_order(a, b));
    for pair in entries.windows(2) {
        if pair[0].0 == pair[1].0 {
            return Err(Error::InvalidInput(format!(
                "duplicate map key: {:?}",
                String::from_utf8_lossy(&pair[0].0)
            )));
        }
    }

    let mut enc = Encoder::new(Vec::new());
    enc.map(entries.len() as u64).map_err(encode_err)?;
    for (key, value) in &entries {
        enc.bytes(key).map_err(encode_err)?;
        match value {
            Value::Int(i) => enc.u64(*i).map_err(encode_err)?,
            Value::Bytes(b) => enc.bytes(b).map_err(encode_err)?,
        };
    }
    Ok(enc.into_writer())
}

/// Decode one definite-length map of byte-string keys and values, in encoded
/// order, without canonicity checks.
pub fn decode_map_entries(dec: &mut Decoder<'_>) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
    let len = dec
        .map()
        .map_err(|e| decode_err("header block is not a map", e))?
        .ok_or_else(|| Error::ParseError("indefinite-length maps are not supported".to_string()))?;

    let mut entries = Vec::with_capacity(len as usize);
    for _ in 0..len {
        let key = dec
            .bytes()
            .map_err(|e| decode_err("map key is not a byte string", e))?
            .to_vec();
        let value = dec
            .bytes()
            .map_err(|e| decode_err("map value is not a byte string", e))?
            .to_vec();
        entries.push((key, value));
    }
    Ok(entries)
}

fn require_unique_keys(entries: &[(Vec<u8>, Vec<u8>)]) -> Result<()> {
    let mut seen = HashSet::new();
    for (key, _) in entries {
        if !seen.insert(key.as_slice()) {
            return Err(Error::ParseError(format!(
                "duplicate map key: {:?}",
                String::from_utf8_lossy(key)
            )));
        }
    }
    Ok(())
}

fn bytes_entries(entries: &[(Vec<u8>, Vec<u8>)]) -> Vec<(Vec<u8>, Value)> {
    entries
        .iter()
        .map(|(k, v)| (k.clone(), Value::Bytes(v.clone())))
        .collect()
}

/// Decode a block that must be exactly one canonical map.
pub fn decode_canonical_map_block(block: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
    let mut dec = Decoder::new(block);
    let entries = decode_map_entries(&mut dec)?;
    if dec.position() != block.len() {
        return Err(Error::ParseError("trailing bytes after header map".to_string()));
    }
    require_unique_keys(&entries)?;

    let reencoded = encode_map(bytes_entries(&entries))?;
    if reencoded != block {
        return Err(Error::ParseError("non-canonical CBOR header map".to_string()));
    }
    Ok(entries)
}

/// Decode a block that must be exactly a canonical two-element array of
/// canonical maps (request map, response map).
pub fn decode_canonical_two_map_block(
    block: &[u8],
) -> Result<(Vec<(Vec<u8>, Vec<u8>)>, Vec<(Vec<u8>, Vec<u8>)>)> {
    let mut dec = Decoder::new(block);
    let len = dec
        .array()
        .map_err(|e| decode_err("header block is not an array", e))?
        .ok_or_else(|| Error::ParseError("indefinite-length arrays are not supported".to_string()))?;
    if len != 2 {
        return Err(Error::ParseError(format!(
            "header block array has {len} elements, expected 2"
        )));
    }

    let request = decode_map_entries(&mut dec)?;
    let response = decode_map_entries(&mut dec)?;
    if dec.position() != block.len() {
        return Err(Error::ParseError("trailing bytes after header block".to_string()));
    }
    require_unique_keys(&request)?;
    require_unique_keys(&response)?;

    let reencoded = encode_two_map_block(bytes_entries(&request), bytes_entries(&response))?;
    if reencoded != block {
        return Err(Error::ParseError("non-canonical CBOR header block".to_string()));
    }
    Ok((request, response))
}

/// Encode `[request map, response map]` canonically.
pub fn encode_two_map_block(
    request: Vec<(Vec<u8>, Value)>,
    response: Vec<(Vec<u8>, Value)>,
) -> Result<Vec<u8>> {
    let mut enc = Encoder::new(Vec::new());
    enc.array(2).map_err(encode_err)?;
    let mut out = enc.into_writer();
    out.extend_from_slice(&encode_map(request)?);
    out.extend_from_slice(&encode_map(response)?);
    Ok(out)
}
