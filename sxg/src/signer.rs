// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Exchange signing.
//!
//! A [`Signer`] holds everything one signing operation needs: the validity
//! window, the certificate chain, the distribution URLs, the private key,
//! and a randomness source. Time is data here; the library never reads the
//! clock, so signatures are reproducible when the caller injects a fixed
//! randomness source.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand_core::CryptoRngCore;
use signature::RandomizedSigner as _;
use url::Url;

use sxg_common::structured_header::SignatureParams;
use sxg_common::{Error, Result};

use crate::{signed_message, uri, Exchange};

/// Longest allowed `expires - date` window.
pub const MAX_SIGNATURE_DURATION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Label emitted on the `Signature` header's parameterised item.
const SIGNATURE_LABEL: &str = "label";

/// Configuration for one signing operation. May be reused.
pub struct Signer<R: CryptoRngCore> {
    pub date: SystemTime,
    pub expires: SystemTime,
    /// Certificate chain, leaf first, DER encoded.
    pub certs: Vec<Vec<u8>>,
    pub cert_url: Url,
    pub validity_url: Url,
    pub private_key: p256::ecdsa::SigningKey,
    /// Randomness for the ECDSA nonce. A capability, not module state:
    /// production supplies a CSPRNG, tests may supply a fixed source to get
    /// bit-stable signatures.
    pub rand: R,
}

pub(crate) fn unix_seconds(time: SystemTime) -> Result<u64> {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|_| Error::InvalidInput("time predates the unix epoch".to_string()))
}

impl<R: CryptoRngCore> Signer<R> {
    pub(crate) fn signature_header_value(&mut self, e: &Exchange) -> Result<String> {
        if !matches!(self.cert_url.scheme(), "https" | "data") {
            return Err(Error::PolicyViolation(format!(
                "cert-url scheme {:?} is not https or data",
                self.cert_url.scheme()
            )));
        }

        let request_url = uri::parse_absolute(&e.request_uri)?;
        if self.validity_url.scheme() != "https" {
            return Err(Error::PolicyViolation(
                "validity-url scheme is not https".to_string(),
            ));
        }
        if self.validity_url.origin() != request_url.origin() {
            return Err(Error::PolicyViolation(format!(
                "validity-url {} is not same-origin with {}",
                self.validity_url, e.request_uri
            )));
        }

        if self.certs.is_empty() {
            return Err(Error::InvalidInput("empty certificate chain".to_string()));
        }
        // The leaf must carry an ECDSA P-256 key, and it must be the public
        // half of the key we are about to sign with; otherwise the exchange
        // could never verify against its own cert-sha256.
        let leaf_key = sxg_x509::verifying_key(&self.certs[0])?;
        if self.private_key.verifying_key() != &leaf_key {
            return Err(Error::InvalidInput(
                "leaf certificate public key does not match the signing key".to_string(),
            ));
        }

        let date = unix_seconds(self.date)?;
        let expires = unix_seconds(self.expires)?;
        if expires < date {
            return Err(Error::PolicyViolation(
                "expires precedes date".to_string(),
            ));
        }
        if expires - date > MAX_SIGNATURE_DURATION.as_secs() {
            return Err(Error::PolicyViolation(format!(
                "signature lifetime {}s exceeds {}s",
                expires - date,
                MAX_SIGNATURE_DURATION.as_secs()
            )));
        }

        let mut params = SignatureParams {
            label: SIGNATURE_LABEL.to_string(),
            sig: Vec::new(),
            validity_url: self.validity_url.to_string(),
            integrity: e.version.integrity_identifier().to_string(),
            cert_url: self.cert_url.to_string(),
            cert_sha256: sxg_x509::cert_sha256(&self.certs[0]).to_vec(),
            date,
            expires,
        };

        let message = signed_message::serialize_signed_message(e, &params)?;
        let signature: p256::ecdsa::Signature = self
            .private_key
            .try_sign_with_rng(&mut self.rand, &message)
            .map_err(|e| Error::InvalidInput(format!("signing failed: {e}")))?;
        params.sig = signature.to_der().as_bytes().to_vec();

        tracing::debug!(
            target: "sxg",
            version = e.version.token(),
            uri = %e.request_uri,
            "signed exchange"
        );
        Ok(params.serialize())
    }
}
