// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! CBOR certificate-chain container.
//!
//! The `cert-url` of a signed exchange resolves to this container: a CBOR
//! array whose first element is the magic string `"📜⛓"` and whose remaining
//! elements are per-certificate maps carrying the DER certificate plus
//! optional stapled OCSP response and SCT list. The leaf certificate comes
//! first.

use minicbor::data::Type;
use minicbor::{Decoder, Encoder};

use sxg_common::{Error, Result};

const CHAIN_MAGIC: &str = "\u{1F4DC}\u{26D3}"; // 📜⛓

/// One certificate in the chain, with optional stapled data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AugmentedCertificate {
    pub cert_der: Vec<u8>,
    pub ocsp: Option<Vec<u8>>,
    pub sct: Option<Vec<u8>>,
}

/// An ordered certificate chain, leaf first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertChain {
    pub certs: Vec<AugmentedCertificate>,
}

impl CertChain {
    /// Build a chain from DER certificates. The stapled OCSP response and
    /// optional SCT list are attached to the leaf.
    pub fn new(certs_der: &[Vec<u8>], ocsp: Vec<u8>, sct: Option<Vec<u8>>) -> Result<CertChain> {
        let mut iter = certs_der.iter();
        let leaf = iter
            .next()
            .ok_or_else(|| Error::InvalidInput("empty certificate chain".to_string()))?;

        let mut certs = vec![AugmentedCertificate {
            cert_der: leaf.clone(),
            ocsp: Some(ocsp),
            sct,
        }];
        certs.extend(iter.map(|der| AugmentedCertificate {
            cert_der: der.clone(),
            ocsp: None,
            sct: None,
        }));
        Ok(CertChain { certs })
    }

    pub fn leaf(&self) -> &AugmentedCertificate {
        // `new` and `parse` both guarantee at least one certificate.
        &self.certs[0]
    }

    pub fn write(&self) -> Result<Vec<u8>> {
        let mut enc = Encoder::new(Vec::new());
        enc.array(1 + self.certs.len() as u64).map_err(enc_err)?;
        enc.str(CHAIN_MAGIC).map_err(enc_err)?;
        for cert in &self.certs {
            let len = 1 + cert.ocsp.is_some() as u64 + cert.sct.is_some() as u64;
            enc.map(len).map_err(enc_err)?;
            // Canonical text-key order: "sct" (shortest), then "cert", "ocsp".
            if let Some(sct) = &cert.sct {
                enc.str("sct").map_err(enc_err)?;
                enc.bytes(sct).map_err(enc_err)?;
            }
            enc.str("cert").map_err(enc_err)?;
            enc.bytes(&cert.cert_der).map_err(enc_err)?;
            if let Some(ocsp) = &cert.ocsp {
                enc.str("ocsp").map_err(enc_err)?;
                enc.bytes(ocsp).map_err(enc_err)?;
            }
        }
        Ok(enc.into_writer())
    }

    pub fn parse(input: &[u8]) -> Result<CertChain> {
        let mut dec = Decoder::new(input);
        let len = dec
            .array()
            .map_err(|e| dec_err("certificate chain is not an array", e))?
            .ok_or_else(|| {
                Error::ParseError("indefinite-length arrays are not supported".to_string())
            })?;
        if len < 2 {
            return Err(Error::ParseError(
                "certificate chain has no certificates".to_string(),
            ));
        }

        let magic = dec
            .str()
            .map_err(|e| dec_err("certificate chain magic is not a text string", e))?;
        if magic != CHAIN_MAGIC {
            return Err(Error::ParseError("unknown certificate chain magic".to_string()));
        }

        let mut certs = Vec::with_capacity(len as usize - 1);
        for _ in 1..len {
            certs.push(parse_augmented_certificate(&mut dec)?);
        }
        if dec.position() != input.len() {
            return Err(Error::ParseError(
                "trailing bytes after certificate chain".to_string(),
            ));
        }
        Ok(CertChain { certs })
    }
}

fn parse_augmented_certificate(dec: &mut Decoder<'_>) -> Result<AugmentedCertificate> {
    let len = dec
        .map()
        .map_err(|e| dec_err("chain entry is not a map", e))?
        .ok_or_else(|| Error::ParseError("indefinite-length maps are not supported".to_string()))?;

    let mut cert_der = None;
    let mut ocsp = None;
    let mut sct = None;
    for _ in 0..len {
        let key = dec
            .str()
            .map_err(|e| dec_err("chain entry key is not a text string", e))?
            .to_string();
        match key.as_str() {
            "cert" => cert_der = Some(read_bytes(dec, "cert")?),
            "ocsp" => ocsp = Some(read_bytes(dec, "ocsp")?),
            "sct" => sct = Some(read_bytes(dec, "sct")?),
            _ => {
                dec.skip()
                    .map_err(|e| dec_err("bad chain entry value", e))?;
            }
        }
    }

    Ok(AugmentedCertificate {
        cert_der: cert_der
            .ok_or_else(|| Error::ParseError("chain entry has no certificate".to_string()))?,
        ocsp,
        sct,
    })
}

fn read_bytes(dec: &mut Decoder<'_>, key: &str) -> Result<Vec<u8>> {
    if !matches!(
        dec.datatype().map_err(|e| dec_err("bad chain entry", e))?,
        Type::Bytes
    ) {
        return Err(Error::ParseError(format!(
            "chain entry {key} is not a byte string"
        )));
    }
    Ok(dec
        .bytes()
        .map_err(|e| dec_err("bad chain entry", e))?
        .to_vec())
}

fn enc_err<E: std::fmt::Display>(e: minicbor::encode::Error<E>) -> Error {
    Error::InvalidInput(format!("cbor encode failed: {e}"))
}

fn dec_err(context: &str, e: minicbor::decode::Error) -> Error {
    Error::ParseError(format!("{context}: {e}"))
}
