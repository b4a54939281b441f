// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Signed HTTP exchange pipeline.
//!
//! A signed exchange binds an HTTP request URL to an HTTP response so a third
//! party can distribute the response while browsers still attribute it to the
//! origin. This crate implements the exchange side of that story:
//! - [`Exchange::mi_encode_payload`] frames the payload under Merkle
//!   Integrity and injects the digest header.
//! - [`Exchange::add_signature_header`] computes the signed message and
//!   attaches an ECDSA P-256 signature via a [`Signer`].
//! - [`Exchange::write`] / [`read_exchange`] serialize and parse the binary
//!   container (three wire revisions, selected by magic).
//! - [`Exchange::verify`] re-derives the signed message, checks it against
//!   the leaf of a fetched certificate chain, and unwraps the MI framing.
//!
//! All I/O happens through caller-supplied sinks, sources, and the injected
//! [`CertFetcher`]; the library never reads the clock or the network itself.

mod cacheability;
mod container;
mod header_block;
mod signed_message;
mod signer;
mod uri;
mod verifier;

pub use signer::Signer;
pub use sxg_common::structured_header::SignatureParams;
pub use sxg_common::{mice, Error, HeaderMap, Result, Version};
pub use sxg_x509::{cert_sha256, parse_certificates, parse_private_key, verifying_key, CertChain};

use std::io::{Read, Write};
use std::time::SystemTime;

/// Resolves a `cert-url` to the CBOR certificate-chain bytes during
/// verification. Implemented for closures, so tests can serve a canned chain:
///
/// ```ignore
/// let mut fetcher = |_url: &str| Ok(chain_bytes.clone());
/// exchange.verify(time, &mut fetcher, &mut NullLogger);
/// ```
pub trait CertFetcher {
    fn fetch(&mut self, cert_url: &str) -> std::result::Result<Vec<u8>, String>;
}

impl<F> CertFetcher for F
where
    F: FnMut(&str) -> std::result::Result<Vec<u8>, String>,
{
    fn fetch(&mut self, cert_url: &str) -> std::result::Result<Vec<u8>, String> {
        self(cert_url)
    }
}

/// Sink for verification diagnostics.
///
/// Verification answers with a payload/ok pair only; the reason an exchange
/// was rejected goes here and never changes the outcome.
pub trait Logger {
    fn log(&mut self, message: &str);
}

/// Discards all diagnostics.
pub struct NullLogger;

impl Logger for NullLogger {
    fn log(&mut self, _message: &str) {}
}

/// Forwards diagnostics to `tracing` at WARN level.
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&mut self, message: &str) {
        tracing::warn!(target: "sxg", "{message}");
    }
}

/// A signed HTTP exchange under construction or after parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub version: Version,
    /// Absolute request URL, stored verbatim. Canonicalization is applied
    /// only while computing the signed message.
    pub request_uri: String,
    /// Request method. Only b1/b2 sign it; b3 exchanges are implicitly GET.
    pub request_method: String,
    pub request_headers: HeaderMap,
    pub response_status: u16,
    pub response_headers: HeaderMap,
    /// Response body. After [`Exchange::mi_encode_payload`] this holds the
    /// MI-framed form.
    pub payload: Vec<u8>,
    /// `Signature` header value, populated by
    /// [`Exchange::add_signature_header`] or recovered by [`read_exchange`].
    pub signature_header_value: String,
}

impl Exchange {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        version: Version,
        request_uri: impl Into<String>,
        request_method: impl Into<String>,
        request_headers: HeaderMap,
        response_status: u16,
        response_headers: HeaderMap,
        payload: Vec<u8>,
    ) -> Exchange {
        Exchange {
            version,
            request_uri: request_uri.into(),
            request_method: request_method.into(),
            request_headers,
            response_status,
            response_headers,
            payload,
            signature_header_value: String::new(),
        }
    }

    /// Rewrite the payload into its MI-framed form and inject the digest and
    /// `Content-Encoding` response headers.
    ///
    /// The caller's `Content-Encoding` is overwritten; a pre-existing
    /// integrity digest header is an error.
    pub fn mi_encode_payload(&mut self, record_size: u64) -> Result<()> {
        for name in ["Mi-Draft2", "Digest"] {
            if self.response_headers.contains(name) {
                return Err(Error::InvalidInput(format!(
                    "response already carries a {name} header"
                )));
            }
        }

        let (framed, digest) = mice::encode(&self.payload, record_size)?;
        self.payload = framed;
        self.response_headers
            .set("Content-Encoding", self.version.content_encoding());
        self.response_headers.set(
            self.version.digest_header_name(),
            mice::format_digest_header(self.version, &digest),
        );
        Ok(())
    }

    /// Compute and attach the `Signature` header.
    ///
    /// Requires the payload to be MI-encoded already: the signature covers
    /// the digest header, so signing a raw payload would bind nothing.
    pub fn add_signature_header<R: rand_core::CryptoRngCore>(
        &mut self,
        signer: &mut Signer<R>,
    ) -> Result<()> {
        let digest_name = self.version.digest_header_name();
        let encoded = self.response_headers.contains(digest_name)
            && self.response_headers.get("Content-Encoding")
                == Some(self.version.content_encoding());
        if !encoded {
            return Err(Error::PreconditionNotMet(
                "payload is not MI-encoded; call mi_encode_payload first".to_string(),
            ));
        }

        self.signature_header_value = signer.signature_header_value(self)?;
        Ok(())
    }

    /// Serialize the exchange container. Requires a signature.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        container::write_exchange(self, writer)
    }

    /// Verify a signed exchange at `verification_time` against the
    /// certificate chain resolved through `fetcher`.
    ///
    /// Returns the decoded (unframed) payload on success and `None` on any
    /// failure; the failure reason is only reported through `logger`.
    pub fn verify(
        &self,
        verification_time: SystemTime,
        fetcher: &mut dyn CertFetcher,
        logger: &mut dyn Logger,
    ) -> Option<Vec<u8>> {
        verifier::verify_exchange(self, verification_time, fetcher, logger)
    }

    /// Whether the response may be served from cache under the rules applied
    /// to b3 exchanges.
    pub fn is_cacheable(&self, logger: &mut dyn Logger) -> bool {
        cacheability::is_cacheable(self.response_status, &self.response_headers, logger)
    }
}

/// Parse a serialized exchange container.
pub fn read_exchange<R: Read>(reader: &mut R) -> Result<Exchange> {
    container::read_exchange(reader)
}
