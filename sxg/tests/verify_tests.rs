// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Verification scenarios: the happy path, signing policy rejections, and
//! every class of verify-time failure.

mod common;

use std::time::Duration;

use common::*;
use sxg::{Error, Exchange, NullLogger, SignatureParams, Signer, Version};

use url::Url;

/// Sign `e` and return a fetcher serving its certificate chain.
fn sign(
    e: &mut Exchange,
    signer: &mut Signer<ZeroRng>,
    chain: Vec<u8>,
) -> impl FnMut(&str) -> Result<Vec<u8>, String> {
    e.add_signature_header(signer).unwrap();
    move |_: &str| Ok(chain.clone())
}

#[test]
fn verify_succeeds_at_the_signing_date() {
    for_each_version(|version| {
        let (mut e, mut signer, chain) = create_test_exchange(version);
        let mut fetcher = sign(&mut e, &mut signer, chain);
        let payload = e
            .verify(signature_date(), &mut fetcher, &mut NullLogger)
            .unwrap_or_else(|| panic!("verification failed for {}", version.token()));
        assert_eq!(payload, PAYLOAD);
    });
}

#[test]
fn banned_cert_url_scheme_fails_at_signing() {
    for_each_version(|version| {
        let (mut e, mut signer, _) = create_test_exchange(version);
        signer.cert_url = Url::parse("http://example.com/cert.msg").unwrap();
        assert!(
            matches!(
                e.add_signature_header(&mut signer),
                Err(Error::PolicyViolation(_))
            ),
            "{}",
            version.token()
        );
    });
}

#[test]
fn cross_origin_validity_url_fails_at_signing() {
    for_each_version(|version| {
        let (mut e, mut signer, _) = create_test_exchange(version);
        signer.validity_url = Url::parse("https://subdomain.example.com/resource.validity").unwrap();
        assert!(
            matches!(
                e.add_signature_header(&mut signer),
                Err(Error::PolicyViolation(_))
            ),
            "{}",
            version.token()
        );
    });
}

#[test]
fn leaf_certificate_must_match_the_signing_key() {
    for_each_version(|version| {
        let (mut e, mut signer, _) = create_test_exchange(version);
        // A valid P-256 key, but not the one the certificate certifies.
        signer.private_key =
            p256::ecdsa::SigningKey::from_bytes(p256::FieldBytes::from_slice(&[0x01; 32]))
                .unwrap();
        assert!(
            matches!(
                e.add_signature_header(&mut signer),
                Err(Error::InvalidInput(_))
            ),
            "{}",
            version.token()
        );
    });
}

#[test]
fn unparsable_leaf_certificate_fails_at_signing() {
    for_each_version(|version| {
        let (mut e, mut signer, _) = create_test_exchange(version);
        signer.certs = vec![b"not a certificate".to_vec()];
        assert!(
            matches!(
                e.add_signature_header(&mut signer),
                Err(Error::InvalidInput(_))
            ),
            "{}",
            version.token()
        );
    });
}

#[test]
fn lifetime_over_seven_days_fails_at_signing() {
    for_each_version(|version| {
        let (mut e, mut signer, _) = create_test_exchange(version);
        signer.expires = signer.date + Duration::from_secs(7 * 24 * 3600 + 1);
        assert!(
            matches!(
                e.add_signature_header(&mut signer),
                Err(Error::PolicyViolation(_))
            ),
            "{}",
            version.token()
        );
    });
}

#[test]
fn not_yet_valid_exchange_fails() {
    for_each_version(|version| {
        let (mut e, mut signer, chain) = create_test_exchange(version);
        let mut fetcher = sign(&mut e, &mut signer, chain);
        let before = unix(SIGNATURE_DATE_UNIX - 1);
        assert!(
            e.verify(before, &mut fetcher, &mut NullLogger).is_none(),
            "{}",
            version.token()
        );
    });
}

#[test]
fn expired_exchange_fails() {
    for_each_version(|version| {
        let (mut e, mut signer, chain) = create_test_exchange(version);
        let mut fetcher = sign(&mut e, &mut signer, chain);
        let after = unix(SIGNATURE_DATE_UNIX + 3600 + 1);
        assert!(
            e.verify(after, &mut fetcher, &mut NullLogger).is_none(),
            "{}",
            version.token()
        );
    });
}

#[test]
fn window_boundaries_are_inclusive() {
    for_each_version(|version| {
        let (mut e, mut signer, chain) = create_test_exchange(version);
        let mut fetcher = sign(&mut e, &mut signer, chain);
        for at in [SIGNATURE_DATE_UNIX, SIGNATURE_DATE_UNIX + 3600] {
            assert!(
                e.verify(unix(at), &mut fetcher, &mut NullLogger).is_some(),
                "{} at {at}",
                version.token()
            );
        }
    });
}

#[test]
fn cross_origin_validity_url_fails_verification() {
    // The signer refuses to emit such a signature, so tamper with the header
    // after the fact: the origin check fires before the signature check.
    for_each_version(|version| {
        let (mut e, mut signer, chain) = create_test_exchange(version);
        let mut fetcher = sign(&mut e, &mut signer, chain);

        let mut params = SignatureParams::parse(&e.signature_header_value).unwrap();
        params.validity_url = "https://subdomain.example.com/resource.validity".to_string();
        e.signature_header_value = params.serialize();

        assert!(
            e.verify(signature_date(), &mut fetcher, &mut NullLogger)
                .is_none(),
            "{}",
            version.token()
        );
    });
}

#[test]
fn wrong_integrity_identifier_fails_verification() {
    for_each_version(|version| {
        let (mut e, mut signer, chain) = create_test_exchange(version);
        let mut fetcher = sign(&mut e, &mut signer, chain);

        let mut params = SignatureParams::parse(&e.signature_header_value).unwrap();
        params.integrity = "not-an-integrity-scheme".to_string();
        e.signature_header_value = params.serialize();

        assert!(
            e.verify(signature_date(), &mut fetcher, &mut NullLogger)
                .is_none(),
            "{}",
            version.token()
        );
    });
}

#[test]
fn method_other_than_get_or_head_fails_in_b1_and_b2() {
    // b3 has no request method, so the scenario only exists before it.
    for version in [Version::V1B1, Version::V1B2] {
        let (mut e, mut signer, chain) = create_test_exchange(version);
        e.request_method = "POST".to_string();
        let mut fetcher = sign(&mut e, &mut signer, chain);
        assert!(
            e.verify(signature_date(), &mut fetcher, &mut NullLogger)
                .is_none(),
            "{}",
            version.token()
        );
    }
}

#[test]
fn stateful_request_header_fails_in_b3() {
    for_each_version(|version| {
        let (mut e, mut signer, chain) = create_test_exchange(version);
        e.request_headers.set("Authorization", "Basic Zm9vOmJhcg==");
        let mut fetcher = sign(&mut e, &mut signer, chain);
        let ok = e
            .verify(signature_date(), &mut fetcher, &mut NullLogger)
            .is_some();
        // b1/b2 sign the request headers but do not police statefulness.
        assert_eq!(ok, version != Version::V1B3, "{}", version.token());
    });
}

#[test]
fn uncached_response_header_fails_in_b3() {
    for_each_version(|version| {
        let (mut e, mut signer, chain) = create_test_exchange(version);
        e.response_headers.set("Set-Cookie", "foo=bar");
        let mut fetcher = sign(&mut e, &mut signer, chain);

        let mut logger = CollectingLogger::default();
        let ok = e
            .verify(signature_date(), &mut fetcher, &mut logger)
            .is_some();
        assert_eq!(ok, version != Version::V1B3, "{}", version.token());
        // Older versions accept the exchange but still leave a diagnostic.
        assert!(!logger.messages.is_empty(), "{}", version.token());
    });
}

#[test]
fn connection_listed_header_fails_in_b3() {
    let (mut e, mut signer, chain) = create_test_exchange(Version::V1B3);
    e.response_headers.set("Connection", "x-custom");
    e.response_headers.set("X-Custom", "1");
    let mut fetcher = sign(&mut e, &mut signer, chain);
    assert!(e
        .verify(signature_date(), &mut fetcher, &mut NullLogger)
        .is_none());
}

#[test]
fn response_modified_after_signing_fails() {
    for_each_version(|version| {
        let (mut e, mut signer, chain) = create_test_exchange(version);
        let mut fetcher = sign(&mut e, &mut signer, chain);
        e.response_headers.add("Etag", "0123");
        assert!(
            e.verify(signature_date(), &mut fetcher, &mut NullLogger)
                .is_none(),
            "{}",
            version.token()
        );
    });
}

#[test]
fn payload_modified_after_signing_fails() {
    for_each_version(|version| {
        let (mut e, mut signer, chain) = create_test_exchange(version);
        let mut fetcher = sign(&mut e, &mut signer, chain);
        let last = e.payload.len() - 1;
        e.payload[last] ^= 0x01;
        assert!(
            e.verify(signature_date(), &mut fetcher, &mut NullLogger)
                .is_none(),
            "{}",
            version.token()
        );
    });
}

#[test]
fn missing_content_type_fails_only_in_b3() {
    for_each_version(|version| {
        let (mut e, mut signer, chain) = create_test_exchange(version);
        e.response_headers.remove("Content-Type");
        let mut fetcher = sign(&mut e, &mut signer, chain);
        let ok = e
            .verify(signature_date(), &mut fetcher, &mut NullLogger)
            .is_some();
        assert_eq!(ok, version != Version::V1B3, "{}", version.token());
    });
}

#[test]
fn non_cacheable_response_fails_only_in_b3() {
    for_each_version(|version| {
        let (mut e, mut signer, chain) = create_test_exchange(version);
        e.response_headers.add("Cache-Control", "no-store");
        let mut fetcher = sign(&mut e, &mut signer, chain);
        let ok = e
            .verify(signature_date(), &mut fetcher, &mut NullLogger)
            .is_some();
        assert_eq!(ok, version != Version::V1B3, "{}", version.token());
    });
}

#[test]
fn percent_encoded_request_uri_canonicalizes_and_verifies() {
    for_each_version(|version| {
        let (mut e, mut signer, chain) = create_test_exchange(version);
        // Canonicalizes to https://example.com/sxg on both sides.
        e.request_uri = "https://example.com/%73%78%67".to_string();
        let mut fetcher = sign(&mut e, &mut signer, chain);
        assert!(
            e.verify(signature_date(), &mut fetcher, &mut NullLogger)
                .is_some(),
            "{}",
            version.token()
        );
        // The stored URI keeps its original spelling.
        assert_eq!(e.request_uri, "https://example.com/%73%78%67");
    });
}

#[test]
fn mismatched_certificate_chain_fails() {
    for_each_version(|version| {
        let (mut e, mut signer, _) = create_test_exchange(version);
        e.add_signature_header(&mut signer).unwrap();

        // Serve a chain whose leaf hash cannot match cert-sha256.
        let mut certs = sxg::parse_certificates(PEM_CERTS.as_bytes()).unwrap();
        certs[0][7] ^= 0x01;
        let tampered = sxg::CertChain::new(&certs, b"dummy".to_vec(), None)
            .unwrap()
            .write()
            .unwrap();
        let mut fetcher = move |_: &str| -> Result<Vec<u8>, String> { Ok(tampered.clone()) };
        assert!(
            e.verify(signature_date(), &mut fetcher, &mut NullLogger)
                .is_none(),
            "{}",
            version.token()
        );
    });
}

#[test]
fn fetcher_failure_fails_verification() {
    for_each_version(|version| {
        let (mut e, mut signer, _) = create_test_exchange(version);
        e.add_signature_header(&mut signer).unwrap();
        let mut fetcher =
            |_: &str| -> Result<Vec<u8>, String> { Err("connection refused".to_string()) };
        let mut logger = CollectingLogger::default();
        assert!(
            e.verify(signature_date(), &mut fetcher, &mut logger)
                .is_none(),
            "{}",
            version.token()
        );
        assert!(logger.messages.iter().any(|m| m.contains("cert.msg")));
    });
}

#[test]
fn is_cacheable_matches_the_b3_policy() {
    let (e, _, _) = create_test_exchange(Version::V1B3);
    assert!(e.is_cacheable(&mut NullLogger));

    let (mut e, _, _) = create_test_exchange(Version::V1B3);
    e.response_headers.add("cache-control", "no-store");
    assert!(!e.is_cacheable(&mut NullLogger));

    let (mut e, _, _) = create_test_exchange(Version::V1B3);
    e.response_headers.add("cache-control", "max-age=300, private");
    assert!(!e.is_cacheable(&mut NullLogger));

    let (mut e, _, _) = create_test_exchange(Version::V1B3);
    e.response_status = 201;
    assert!(!e.is_cacheable(&mut NullLogger));

    let (mut e, _, _) = create_test_exchange(Version::V1B3);
    e.response_status = 201;
    e.response_headers.add("cache-control", "max-age=300");
    assert!(e.is_cacheable(&mut NullLogger));

    let (mut e, _, _) = create_test_exchange(Version::V1B3);
    e.response_status = 201;
    e.response_headers.add("expires", "Mon, 07 Jan 2019 07:29:39 GMT");
    assert!(e.is_cacheable(&mut NullLogger));
}
