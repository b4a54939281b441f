// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Wire-format version registry.
//!
//! Three revisions of the exchange container coexist. Each carries its own
//! framing magic, payload-integrity header, and signed-message construction
//! parameters. Keeping them behind one enum confines the versioning matrix to
//! match arms instead of conditionals scattered through the pipeline.

use crate::error::{Error, Result};

/// Length of the container magic for every version.
pub const MAGIC_LEN: usize = 8;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Version {
    V1B1,
    V1B2,
    V1B3,
}

impl Version {
    /// All supported versions, oldest first.
    pub const ALL: [Version; 3] = [Version::V1B1, Version::V1B2, Version::V1B3];

    /// Container framing magic.
    pub fn magic(self) -> &'static [u8; MAGIC_LEN] {
        match self {
            Version::V1B1 => b"sxg1-b1\0",
            Version::V1B2 => b"sxg1-b2\0",
            Version::V1B3 => b"sxg1-b3\0",
        }
    }

    /// Resolve a version from container framing magic.
    pub fn from_magic(magic: &[u8]) -> Result<Version> {
        Version::ALL
            .into_iter()
            .find(|v| v.magic() == magic)
            .ok_or_else(|| Error::ParseError("unknown container magic".to_string()))
    }

    /// Short token used in diagnostics and test names.
    pub fn token(self) -> &'static str {
        match self {
            Version::V1B1 => "1b1",
            Version::V1B2 => "1b2",
            Version::V1B3 => "1b3",
        }
    }

    /// Whether the request method and request headers are part of the signed
    /// content. b3 dropped them: the exchange is implicitly a GET.
    pub fn signs_request(self) -> bool {
        match self {
            Version::V1B1 | Version::V1B2 => true,
            Version::V1B3 => false,
        }
    }

    /// Response header that carries the payload integrity digest.
    pub fn digest_header_name(self) -> &'static str {
        match self {
            Version::V1B1 => "Mi-Draft2",
            Version::V1B2 | Version::V1B3 => "Digest",
        }
    }

    /// `Content-Encoding` token for the MI-framed payload.
    pub fn content_encoding(self) -> &'static str {
        match self {
            Version::V1B1 => "mi-sha256-draft2",
            Version::V1B2 | Version::V1B3 => "mi-sha256-03",
        }
    }

    /// Value of the `integrity` signature parameter.
    pub fn integrity_identifier(self) -> &'static str {
        match self {
            Version::V1B1 => "mi-draft2",
            Version::V1B2 | Version::V1B3 => "digest/mi-sha256-03",
        }
    }

    /// Context string that domain-separates the signed message.
    pub fn signature_context(self) -> &'static [u8] {
        match self {
            Version::V1B1 => b"HTTP Exchange 1 b1",
            Version::V1B2 => b"HTTP Exchange 1 b2",
            Version::V1B3 => b"HTTP Exchange 1 b3",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_round_trips() {
        for v in Version::ALL {
            assert_eq!(Version::from_magic(v.magic()).unwrap(), v);
        }
    }

    #[test]
    fn unknown_magic_is_rejected() {
        assert!(Version::from_magic(b"sxg1-b4\0").is_err());
        assert!(Version::from_magic(b"").is_err());
    }

    #[test]
    fn per_version_parameters() {
        assert!(Version::V1B1.signs_request());
        assert!(Version::V1B2.signs_request());
        assert!(!Version::V1B3.signs_request());

        assert_eq!(Version::V1B1.digest_header_name(), "Mi-Draft2");
        assert_eq!(Version::V1B3.digest_header_name(), "Digest");
        assert_eq!(Version::V1B1.integrity_identifier(), "mi-draft2");
        assert_eq!(Version::V1B2.integrity_identifier(), "digest/mi-sha256-03");
    }
}
