// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Certificate handling for signed HTTP exchanges.
//!
//! The exchange pipeline needs very little from X.509:
//! - Parse a PEM bundle into an ordered list of DER certificates.
//! - Parse an EC private key (SEC1 or PKCS#8 DER) into a P-256 signing key.
//! - Extract the leaf certificate's public key for signature verification.
//! - Hash the leaf DER for the `cert-sha256` binding.
//!
//! Chain path building and trust evaluation are someone else's job: the
//! verifier only checks the binding between an exchange and the leaf of the
//! chain it was handed.

pub mod cert_chain;

pub use cert_chain::CertChain;

use p256::elliptic_curve::sec1::ToEncodedPoint as _;
use p256::pkcs8::{DecodePrivateKey as _, DecodePublicKey as _};
use sha2::{Digest as _, Sha256};

use sxg_common::{Error, Result};

/// Parse a PEM bundle into DER certificates, in bundle order.
///
/// Non-certificate PEM blocks are skipped. Every certificate block must parse
/// as X.509, and at least one certificate must be present.
pub fn parse_certificates(pem: &[u8]) -> Result<Vec<Vec<u8>>> {
    let mut certs = Vec::new();
    for block in x509_parser::pem::Pem::iter_from_buffer(pem) {
        let block = block.map_err(|e| Error::InvalidInput(format!("bad PEM block: {e}")))?;
        if block.label != "CERTIFICATE" {
            continue;
        }
        x509_parser::parse_x509_certificate(&block.contents)
            .map_err(|e| Error::InvalidInput(format!("bad certificate DER: {e}")))?;
        certs.push(block.contents);
    }
    if certs.is_empty() {
        return Err(Error::InvalidInput("no certificates in PEM input".to_string()));
    }
    Ok(certs)
}

/// Parse a DER private key into a P-256 ECDSA signing key.
///
/// Accepts SEC1 `ECPrivateKey` and PKCS#8 `PrivateKeyInfo` encodings.
pub fn parse_private_key(der: &[u8]) -> Result<p256::ecdsa::SigningKey> {
    if let Ok(key) = p256::SecretKey::from_sec1_der(der) {
        return Ok(key.into());
    }
    p256::SecretKey::from_pkcs8_der(der)
        .map(Into::into)
        .map_err(|e| Error::InvalidInput(format!("unsupported private key: {e}")))
}

/// SHA-256 of a certificate's DER encoding, as carried in `cert-sha256`.
pub fn cert_sha256(cert_der: &[u8]) -> [u8; 32] {
    Sha256::digest(cert_der).into()
}

/// Extract a P-256 ECDSA verifying key from a DER certificate.
///
/// Fails when the certificate does not parse or its SubjectPublicKeyInfo is
/// not an ECDSA P-256 key.
pub fn verifying_key(cert_der: &[u8]) -> Result<p256::ecdsa::VerifyingKey> {
    let (_, cert) = x509_parser::parse_x509_certificate(cert_der)
        .map_err(|e| Error::InvalidInput(format!("bad certificate DER: {e}")))?;

    let spki = cert.tbs_certificate.subject_pki.raw;
    let pk = p256::PublicKey::from_public_key_der(spki)
        .map_err(|e| Error::InvalidInput(format!("leaf key is not ECDSA P-256: {e}")))?;

    let point = pk.to_encoded_point(false);
    p256::ecdsa::VerifyingKey::from_sec1_bytes(point.as_bytes())
        .map_err(|e| Error::InvalidInput(format!("leaf key is not ECDSA P-256: {e}")))
}
