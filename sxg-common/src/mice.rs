// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Merkle Integrity (`mi-sha256`) payload codec.
//!
//! The payload is split into records of a caller-chosen size and bound
//! together with one recursive SHA-256 proof:
//!
//! ```text
//! P(n) = SHA-256(R(n) || 0x00)
//! P(i) = SHA-256(R(i) || P(i+1) || 0x01)        for i < n
//! ```
//!
//! The framed body is the 8-byte big-endian record size followed by
//! `R(1), P(2), R(2), P(3), …, P(n), R(n)`; the advertised digest is `P(1)`.
//! A reader can therefore verify each record as soon as it arrives: the
//! proof that came just before it commits to the record and to the next
//! proof.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use sha2::{Digest as _, Sha256};

use crate::error::{Error, Result};
use crate::version::Version;

/// Size of each interleaved proof.
pub const PROOF_SIZE: usize = 32;

/// Largest permitted record size.
pub const MAX_RECORD_SIZE: u64 = u32::MAX as u64;

fn check_record_size(record_size: u64) -> Result<()> {
    if record_size == 0 || record_size > MAX_RECORD_SIZE {
        return Err(Error::InvalidInput(format!(
            "record size {record_size} out of range 1..={MAX_RECORD_SIZE}"
        )));
    }
    Ok(())
}

fn final_proof(record: &[u8]) -> [u8; PROOF_SIZE] {
    let mut h = Sha256::new();
    h.update(record);
    h.update([0x00]);
    h.finalize().into()
}

fn chained_proof(record: &[u8], next: &[u8; PROOF_SIZE]) -> [u8; PROOF_SIZE] {
    let mut h = Sha256::new();
    h.update(record);
    h.update(next);
    h.update([0x01]);
    h.finalize().into()
}

/// Encode `payload` into an MI-framed body, returning the frame and the
/// digest to advertise in the response headers.
///
/// A zero-length payload is encoded as a single empty record: the frame is
/// the record-size prefix alone and the digest is `SHA-256(0x00)`.
pub fn encode(payload: &[u8], record_size: u64) -> Result<(Vec<u8>, [u8; PROOF_SIZE])> {
    check_record_size(record_size)?;

    let records: Vec<&[u8]> = if payload.is_empty() {
        vec![&[]]
    } else {
        payload.chunks(record_size as usize).collect()
    };

    let mut proofs = vec![[0u8; PROOF_SIZE]; records.len()];
    let last = records.len() - 1;
    proofs[last] = final_proof(records[last]);
    for i in (0..last).rev() {
        let next = proofs[i + 1];
        proofs[i] = chained_proof(records[i], &next);
    }

    let mut framed =
        Vec::with_capacity(8 + payload.len() + PROOF_SIZE * records.len().saturating_sub(1));
    framed.extend_from_slice(&record_size.to_be_bytes());
    for (i, record) in records.iter().enumerate() {
        framed.extend_from_slice(record);
        if i + 1 < records.len() {
            framed.extend_from_slice(&proofs[i + 1]);
        }
    }

    Ok((framed, proofs[0]))
}

/// Decode an MI-framed body, verifying every record against `digest`.
///
/// Returns the original payload bytes. Framing damage surfaces as
/// `ParseError`; a proof chain that does not commit to `digest` surfaces as
/// `VerificationFailure`.
pub fn decode(framed: &[u8], digest: &[u8; PROOF_SIZE]) -> Result<Vec<u8>> {
    if framed.len() < 8 {
        return Err(Error::ParseError("missing record size prefix".to_string()));
    }
    let record_size = u64::from_be_bytes(
        framed[..8]
            .try_into()
            .map_err(|_| Error::ParseError("missing record size prefix".to_string()))?,
    );
    check_record_size(record_size).map_err(|_| {
        Error::ParseError(format!("framed record size {record_size} out of range"))
    })?;
    let record_size = record_size as usize;

    let mut body = &framed[8..];
    if body.is_empty() {
        if *digest != final_proof(&[]) {
            return Err(Error::VerificationFailure);
        }
        return Ok(Vec::new());
    }

    let mut payload = Vec::with_capacity(body.len());
    let mut expected = *digest;
    loop {
        if body.len() <= record_size {
            if final_proof(body) != expected {
                return Err(Error::VerificationFailure);
            }
            payload.extend_from_slice(body);
            return Ok(payload);
        }

        // A full record must be followed by a proof and a non-empty record.
        if body.len() < record_size + PROOF_SIZE + 1 {
            return Err(Error::ParseError("truncated integrity frame".to_string()));
        }
        let (record, rest) = body.split_at(record_size);
        let (proof, rest) = rest.split_at(PROOF_SIZE);
        let proof: [u8; PROOF_SIZE] = proof
            .try_into()
            .map_err(|_| Error::ParseError("truncated integrity frame".to_string()))?;
        if chained_proof(record, &proof) != expected {
            return Err(Error::VerificationFailure);
        }
        payload.extend_from_slice(record);
        expected = proof;
        body = rest;
    }
}

/// Format the digest header value for a version, e.g.
/// `mi-sha256-03=wmp4dRMYgxP3tSMCwV/I9CWlZi3FJbyrRqgmEwBKz60=`.
pub fn format_digest_header(version: Version, digest: &[u8; PROOF_SIZE]) -> String {
    let label = version.content_encoding();
    match version {
        Version::V1B1 => format!("{label}={}", URL_SAFE_NO_PAD.encode(digest)),
        Version::V1B2 | Version::V1B3 => format!("{label}={}", STANDARD.encode(digest)),
    }
}

/// Parse a digest header value back into the 32-byte proof.
pub fn parse_digest_header(version: Version, value: &str) -> Result<[u8; PROOF_SIZE]> {
    let label = version.content_encoding();
    let encoded = value
        .strip_prefix(label)
        .and_then(|rest| rest.strip_prefix('='))
        .ok_or_else(|| {
            Error::ParseError(format!("digest header does not start with \"{label}=\""))
        })?;

    let decoded = match version {
        Version::V1B1 => URL_SAFE_NO_PAD.decode(encoded),
        Version::V1B2 | Version::V1B3 => STANDARD.decode(encoded),
    }
    .map_err(|e| Error::ParseError(format!("digest header is not valid base64: {e}")))?;

    decoded
        .as_slice()
        .try_into()
        .map_err(|_| Error::ParseError(format!("digest is {} bytes, expected 32", decoded.len())))
}
