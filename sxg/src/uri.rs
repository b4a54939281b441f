// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Request-URI canonicalization.
//!
//! The stored `request_uri` is preserved bit-for-bit; the signed message uses
//! a canonical form so that `https://example.com/%73%78%67` and
//! `https://example.com/sxg` produce the same signature input. Canonical
//! form: percent-decoded unreserved octets in the path, lowercase host, no
//! explicit default port. Reserved percent-escapes are left untouched.

use url::Url;

use sxg_common::{Error, Result};

pub(crate) fn canonicalize(uri: &str) -> Result<String> {
    let url = parse_absolute(uri)?;
    let host = url
        .host_str()
        .ok_or_else(|| Error::InvalidInput(format!("request URI {uri:?} has no host")))?;

    // `Url` already lowercases the host; `port()` is `None` for the scheme
    // default, which drops an explicit default port here.
    let mut out = format!("{}://{}", url.scheme(), host);
    if let Some(port) = url.port() {
        out.push(':');
        out.push_str(&port.to_string());
    }
    out.push_str(&decode_unreserved(url.path()));
    if let Some(query) = url.query() {
        out.push('?');
        out.push_str(query);
    }
    Ok(out)
}

pub(crate) fn parse_absolute(uri: &str) -> Result<Url> {
    Url::parse(uri).map_err(|e| Error::InvalidInput(format!("bad URL {uri:?}: {e}")))
}

fn is_unreserved(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~')
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

fn decode_unreserved(path: &str) -> String {
    let bytes = path.as_bytes();
    let mut out = String::with_capacity(path.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                let decoded = hi << 4 | lo;
                if is_unreserved(decoded) {
                    out.push(decoded as char);
                } else {
                    out.push_str(&path[i..i + 3]);
                }
                i += 3;
                continue;
            }
        }
        // Paths from `Url` are valid UTF-8; copy the whole character.
        let ch = path[i..].chars().next().unwrap_or('\u{fffd}');
        out.push(ch);
        i += ch.len_utf8();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_encoded_unreserved_octets_are_decoded() {
        assert_eq!(
            canonicalize("https://example.com/%73%78%67").unwrap(),
            "https://example.com/sxg"
        );
    }

    #[test]
    fn reserved_escapes_are_preserved() {
        assert_eq!(
            canonicalize("https://example.com/a%2Fb").unwrap(),
            "https://example.com/a%2Fb"
        );
    }

    #[test]
    fn host_is_lowercased_and_default_port_dropped() {
        assert_eq!(
            canonicalize("https://EXAMPLE.com:443/index.html").unwrap(),
            "https://example.com/index.html"
        );
        assert_eq!(
            canonicalize("https://example.com:8443/").unwrap(),
            "https://example.com:8443/"
        );
    }

    #[test]
    fn query_is_kept() {
        assert_eq!(
            canonicalize("https://example.com/search?q=%73").unwrap(),
            "https://example.com/search?q=%73"
        );
    }

    #[test]
    fn relative_uri_is_rejected() {
        assert!(canonicalize("/index.html").is_err());
    }
}
