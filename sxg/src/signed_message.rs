// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Signed-message construction.
//!
//! Builds the exact byte string that the signature covers. The signer and
//! the verifier both call into here, so an exchange verifies iff it
//! reproduces these bytes bit-for-bit.
//!
//! Layout per version:
//!
//! ```text
//! b1/b2:  context || 0x00 || SHA-256(header block) || parameter map
//! b3:     0x20 * 64 || context || 0x00 || SHA-256(response map) || parameter map
//! ```
//!
//! where the header block is the canonical CBOR of §`header_block` built
//! over the canonical request URL, and the parameter map is the canonical
//! CBOR map of the signature parameters without `sig`.

use sha2::{Digest as _, Sha256};

use sxg_common::cbor::{self, Value};
use sxg_common::structured_header::SignatureParams;
use sxg_common::{Result, Version};

use crate::{header_block, uri, Exchange};

/// Number of 0x20 padding bytes that prefix the b3 message.
const B3_PADDING: usize = 64;

pub(crate) fn serialize_signed_message(e: &Exchange, params: &SignatureParams) -> Result<Vec<u8>> {
    let canonical_url = uri::canonicalize(&e.request_uri)?;
    let header_block = header_block::encode_block(e, &canonical_url)?;
    let header_hash = Sha256::digest(&header_block);
    let param_map = encode_parameter_map(params)?;

    let mut message = Vec::with_capacity(B3_PADDING + 32 + 64 + param_map.len());
    if e.version == Version::V1B3 {
        message.extend_from_slice(&[0x20; B3_PADDING]);
    }
    message.extend_from_slice(e.version.signature_context());
    message.push(0x00);
    message.extend_from_slice(&header_hash);
    message.extend_from_slice(&param_map);
    Ok(message)
}

/// Canonical CBOR map of every signature parameter except `sig` itself.
fn encode_parameter_map(params: &SignatureParams) -> Result<Vec<u8>> {
    cbor::encode_map(vec![
        (
            b"cert-sha256".to_vec(),
            Value::Bytes(params.cert_sha256.clone()),
        ),
        (
            b"cert-url".to_vec(),
            Value::Bytes(params.cert_url.as_bytes().to_vec()),
        ),
        (b"date".to_vec(), Value::Int(params.date)),
        (b"expires".to_vec(), Value::Int(params.expires)),
        (
            b"integrity".to_vec(),
            Value::Bytes(params.integrity.as_bytes().to_vec()),
        ),
        (
            b"validity-url".to_vec(),
            Value::Bytes(params.validity_url.as_bytes().to_vec()),
        ),
    ])
}
