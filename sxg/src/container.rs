// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Container framing: serializer and parser.
//!
//! All three revisions share the shape
//! `magic || u16 url-len || url || u24 sig-len || sig || u24 hdr-len || hdr`,
//! followed by the payload: length-prefixed (u64) in b2, to end-of-input in
//! b1 and b3. All integers are big-endian. The parser bounds its allocations
//! by the length prefixes before reading each field.

use std::io::{Read, Write};

use sxg_common::structured_header::SignatureParams;
use sxg_common::version::MAGIC_LEN;
use sxg_common::{Error, Result, Version};

use crate::{header_block, Exchange};

const MAX_U16: usize = u16::MAX as usize;
const MAX_U24: usize = (1 << 24) - 1;

pub(crate) fn write_exchange<W: Write>(e: &Exchange, writer: &mut W) -> Result<()> {
    if e.signature_header_value.is_empty() {
        return Err(Error::PreconditionNotMet(
            "exchange has no signature header; call add_signature_header first".to_string(),
        ));
    }

    let url = e.request_uri.as_bytes();
    if url.len() > MAX_U16 {
        return Err(Error::InvalidInput(format!(
            "request URI is {} bytes, limit is {MAX_U16}",
            url.len()
        )));
    }
    let sig = e.signature_header_value.as_bytes();
    if sig.len() > MAX_U24 {
        return Err(Error::InvalidInput(format!(
            "signature header is {} bytes, limit is {MAX_U24}",
            sig.len()
        )));
    }
    let header_blk = header_block::encode_block(e, &e.request_uri)?;
    if header_blk.len() > MAX_U24 {
        return Err(Error::InvalidInput(format!(
            "header block is {} bytes, limit is {MAX_U24}",
            header_blk.len()
        )));
    }

    writer.write_all(e.version.magic())?;
    writer.write_all(&(url.len() as u16).to_be_bytes())?;
    writer.write_all(url)?;
    writer.write_all(&u24_bytes(sig.len()))?;
    writer.write_all(sig)?;
    writer.write_all(&u24_bytes(header_blk.len()))?;
    writer.write_all(&header_blk)?;
    if e.version == Version::V1B2 {
        writer.write_all(&(e.payload.len() as u64).to_be_bytes())?;
    }
    writer.write_all(&e.payload)?;
    Ok(())
}

fn u24_bytes(len: usize) -> [u8; 3] {
    [(len >> 16) as u8, (len >> 8) as u8, len as u8]
}

pub(crate) fn read_exchange<R: Read>(reader: &mut R) -> Result<Exchange> {
    let mut input = Vec::new();
    reader.read_to_end(&mut input)?;
    parse_exchange(&input)
}

fn parse_exchange(input: &[u8]) -> Result<Exchange> {
    let mut cursor = Cursor { input, pos: 0 };

    let version = Version::from_magic(cursor.take(MAGIC_LEN, "magic")?)?;

    let url_len = cursor.u16("fallback URL length")? as usize;
    let request_uri = utf8("fallback URL", cursor.take(url_len, "fallback URL")?)?;

    let sig_len = cursor.u24("signature length")?;
    let signature_header_value = utf8("signature header", cursor.take(sig_len, "signature header")?)?;
    SignatureParams::parse(&signature_header_value)?;

    let hdr_len = cursor.u24("header block length")?;
    let header_blk = cursor.take(hdr_len, "header block")?;
    let parsed = header_block::parse_block(version, header_blk)?;

    let payload = match version {
        Version::V1B2 => {
            let payload_len = cursor.u64("payload length")?;
            let payload_len = usize::try_from(payload_len)
                .map_err(|_| Error::ParseError("payload length overflows".to_string()))?;
            let payload = cursor.take(payload_len, "payload")?.to_vec();
            if !cursor.at_end() {
                return Err(Error::ParseError("trailing bytes after payload".to_string()));
            }
            payload
        }
        Version::V1B1 | Version::V1B3 => cursor.rest().to_vec(),
    };

    Ok(Exchange {
        version,
        request_uri,
        // b3 containers carry no request metadata: the method is implicitly
        // GET and request headers are discarded.
        request_method: parsed.request_method.unwrap_or_else(|| "GET".to_string()),
        request_headers: parsed.request_headers,
        response_status: parsed.response_status,
        response_headers: parsed.response_headers,
        payload,
        signature_header_value,
    })
}

fn utf8(field: &str, bytes: &[u8]) -> Result<String> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|_| Error::ParseError(format!("{field} is not valid UTF-8")))
}

struct Cursor<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize, field: &str) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.input.len())
            .ok_or_else(|| Error::ParseError(format!("truncated input while reading {field}")))?;
        let bytes = &self.input[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn u16(&mut self, field: &str) -> Result<u16> {
        let b = self.take(2, field)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u24(&mut self, field: &str) -> Result<usize> {
        let b = self.take(3, field)?;
        Ok(usize::from(b[0]) << 16 | usize::from(b[1]) << 8 | usize::from(b[2]))
    }

    fn u64(&mut self, field: &str) -> Result<u64> {
        let b: [u8; 8] = self
            .take(8, field)?
            .try_into()
            .map_err(|_| Error::ParseError(format!("truncated input while reading {field}")))?;
        Ok(u64::from_be_bytes(b))
    }

    fn rest(&mut self) -> &'a [u8] {
        let bytes = &self.input[self.pos..];
        self.pos = self.input.len();
        bytes
    }

    fn at_end(&self) -> bool {
        self.pos == self.input.len()
    }
}
