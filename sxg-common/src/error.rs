// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

/// Errors surfaced by the exchange pipeline.
///
/// Verification deliberately does not use this type on its public surface:
/// the verifier collapses every failure into a payload/ok pair and routes
/// detail to the diagnostic logger, so untrusted callers never see which
/// check rejected an exchange.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed caller input: bad URL, bad PEM/DER, unsupported key type,
    /// out-of-range record size, empty certificate chain.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A signing policy was violated: cert-url scheme, validity-url origin,
    /// or an expiry window longer than 7 days.
    #[error("policy violation: {0}")]
    PolicyViolation(String),

    /// An operation was invoked out of order, e.g. signing a payload that was
    /// never MI-encoded or serializing an unsigned exchange.
    #[error("precondition not met: {0}")]
    PreconditionNotMet(String),

    /// The input bytes are not a well-formed exchange: unknown magic,
    /// truncation, non-canonical CBOR, duplicate signature parameters.
    #[error("parse error: {0}")]
    ParseError(String),

    /// Opaque verification outcome bucket.
    #[error("verification failure")]
    VerificationFailure,

    /// A caller-supplied byte sink or source failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
