// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! `Signature` header parameter-list codec.
//!
//! One parameterised item in the structured-field style:
//!
//! ```text
//! label; sig=*<b64>*; validity-url="…"; integrity="…"; cert-url="…";
//! cert-sha256=*<b64>*; date=<unix-sec>; expires=<unix-sec>
//! ```
//!
//! Serialization always emits parameters in the order above so signatures are
//! easy to compare in tests; the parser accepts any order, ignores unknown
//! parameters, and rejects duplicates.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::error::{Error, Result};

/// Parsed form of a `Signature` header value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureParams {
    pub label: String,
    pub sig: Vec<u8>,
    pub validity_url: String,
    pub integrity: String,
    pub cert_url: String,
    pub cert_sha256: Vec<u8>,
    pub date: u64,
    pub expires: u64,
}

impl SignatureParams {
    pub fn serialize(&self) -> String {
        format!(
            "{}; sig=*{}*; validity-url=\"{}\"; integrity=\"{}\"; cert-url=\"{}\"; \
cert-sha256=*{}*; date={}; expires={}",
            self.label,
            STANDARD.encode(&self.sig),
            self.validity_url,
            self.integrity,
            self.cert_url,
            STANDARD.encode(&self.cert_sha256),
            self.date,
            self.expires,
        )
    }

    pub fn parse(input: &str) -> Result<SignatureParams> {
        let mut parser = Parser { input, pos: 0 };
        parser.skip_spaces();
        let label = parser.token()?;
        if label.is_empty() {
            return Err(Error::ParseError("signature header has no label".to_string()));
        }

        let mut sig = None;
        let mut validity_url = None;
        let mut integrity = None;
        let mut cert_url = None;
        let mut cert_sha256 = None;
        let mut date = None;
        let mut expires = None;

        loop {
            parser.skip_spaces();
            if parser.at_end() {
                break;
            }
            parser.expect(';')?;
            parser.skip_spaces();
            let name = parser.param_name()?;
            parser.expect('=')?;
            let value = parser.param_value()?;

            match name.as_str() {
                "sig" => set_bytes(&mut sig, &name, value)?,
                "validity-url" => set_string(&mut validity_url, &name, value)?,
                "integrity" => set_string(&mut integrity, &name, value)?,
                "cert-url" => set_string(&mut cert_url, &name, value)?,
                "cert-sha256" => set_bytes(&mut cert_sha256, &name, value)?,
                "date" => set_int(&mut date, &name, value)?,
                "expires" => set_int(&mut expires, &name, value)?,
                _ => {} // unknown parameters are ignored
            }
        }

        Ok(SignatureParams {
            label,
            sig: required(sig, "sig")?,
            validity_url: required(validity_url, "validity-url")?,
            integrity: required(integrity, "integrity")?,
            cert_url: required(cert_url, "cert-url")?,
            cert_sha256: required(cert_sha256, "cert-sha256")?,
            date: required(date, "date")?,
            expires: required(expires, "expires")?,
        })
    }
}

/// One parsed parameter value, before type checking.
#[derive(Debug)]
enum ParamValue {
    Binary(Vec<u8>),
    Quoted(String),
    Integer(u64),
}

fn duplicate(name: &str) -> Error {
    Error::ParseError(format!("duplicate signature parameter: {name}"))
}

fn wrong_type(name: &str, expected: &str) -> Error {
    Error::ParseError(format!("parameter {name} is not a {expected}"))
}

fn required<T>(value: Option<T>, name: &str) -> Result<T> {
    value.ok_or_else(|| Error::ParseError(format!("missing signature parameter: {name}")))
}

fn set_bytes(slot: &mut Option<Vec<u8>>, name: &str, value: ParamValue) -> Result<()> {
    if slot.is_some() {
        return Err(duplicate(name));
    }
    match value {
        ParamValue::Binary(b) => {
            *slot = Some(b);
            Ok(())
        }
        _ => Err(wrong_type(name, "binary value")),
    }
}

fn set_string(slot: &mut Option<String>, name: &str, value: ParamValue) -> Result<()> {
    if slot.is_some() {
        return Err(duplicate(name));
    }
    match value {
        ParamValue::Quoted(s) => {
            *slot = Some(s);
            Ok(())
        }
        _ => Err(wrong_type(name, "quoted string")),
    }
}

fn set_int(slot: &mut Option<u64>, name: &str, value: ParamValue) -> Result<()> {
    if slot.is_some() {
        return Err(duplicate(name));
    }
    match value {
        ParamValue::Integer(i) => {
            *slot = Some(i);
            Ok(())
        }
        _ => Err(wrong_type(name, "integer")),
    }
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos == self.input.len()
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn skip_spaces(&mut self) {
        while self.peek() == Some(' ') {
            self.pos += 1;
        }
    }

    fn expect(&mut self, c: char) -> Result<()> {
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            Ok(())
        } else {
            Err(Error::ParseError(format!(
                "expected {c:?} at offset {} of signature header",
                self.pos
            )))
        }
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if !pred(c) {
                break;
            }
            self.pos += c.len_utf8();
        }
        &self.input[start..self.pos]
    }

    fn token(&mut self) -> Result<String> {
        Ok(self
            .take_while(|c| c.is_ascii_alphanumeric() || "!#$%&'*+-.^_`|~".contains(c))
            .to_string())
    }

    fn param_name(&mut self) -> Result<String> {
        let name = self.take_while(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if name.is_empty() {
            return Err(Error::ParseError(format!(
                "empty parameter name at offset {} of signature header",
                self.pos
            )));
        }
        Ok(name.to_string())
    }

    fn param_value(&mut self) -> Result<ParamValue> {
        match self.peek() {
            Some('*') => {
                self.expect('*')?;
                let encoded = self.take_while(|c| c != '*');
                self.expect('*')?;
                let bytes = STANDARD.decode(encoded).map_err(|e| {
                    Error::ParseError(format!("binary parameter is not valid base64: {e}"))
                })?;
                Ok(ParamValue::Binary(bytes))
            }
            Some('"') => {
                self.expect('"')?;
                let s = self.take_while(|c| c != '"').to_string();
                self.expect('"')?;
                Ok(ParamValue::Quoted(s))
            }
            Some(c) if c.is_ascii_digit() => {
                let digits = self.take_while(|c| c.is_ascii_digit());
                let i = digits.parse::<u64>().map_err(|e| {
                    Error::ParseError(format!("integer parameter out of range: {e}"))
                })?;
                Ok(ParamValue::Integer(i))
            }
            _ => Err(Error::ParseError(format!(
                "unsupported parameter value at offset {} of signature header",
                self.pos
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SignatureParams {
        SignatureParams {
            label: "label".to_string(),
            sig: vec![0x30, 0x45, 0x02, 0x20],
            validity_url: "https://example.com/resource.validity".to_string(),
            integrity: "digest/mi-sha256-03".to_string(),
            cert_url: "https://example.com/cert.msg".to_string(),
            cert_sha256: vec![0xab; 32],
            date: 1_517_418_800,
            expires: 1_517_422_400,
        }
    }

    #[test]
    fn serialize_then_parse_round_trips() {
        let params = sample();
        assert_eq!(SignatureParams::parse(&params.serialize()).unwrap(), params);
    }

    #[test]
    fn serialized_order_is_stable() {
        let s = sample().serialize();
        assert!(s.starts_with("label; sig=*"));
        let fields = [
            "; validity-url=\"",
            "; integrity=\"",
            "; cert-url=\"",
            "; cert-sha256=*",
            "; date=1517418800",
            "; expires=1517422400",
        ];
        let mut last = 0;
        for f in fields {
            let at = s.find(f).unwrap();
            assert!(at > last, "{f} out of order in {s}");
            last = at;
        }
    }

    #[test]
    fn parses_reference_header_value() {
        let header = "label; sig=*MEUCIHNiDRQncQpVxW2x+woinMUTY8nuSQfi0mbJ5J6x7FZyAiEAgh6FH6Pd\
ncNCK8GHTwN3wfUUUFdjVswNi1PfIgCOwHk=*; validity-url=\"https://example.com/resource.validity\"; \
integrity=\"digest/mi-sha256-03\"; cert-url=\"https://example.com/cert.msg\"; \
cert-sha256=*eLWHusI0YcDcHSG5nkYbyZddE2sidVyhx6iSYoJ+SFc=*; date=1517418800; expires=1517422400";
        let params = SignatureParams::parse(header).unwrap();
        assert_eq!(params.label, "label");
        assert_eq!(params.integrity, "digest/mi-sha256-03");
        assert_eq!(params.cert_url, "https://example.com/cert.msg");
        assert_eq!(params.validity_url, "https://example.com/resource.validity");
        assert_eq!(params.date, 1517418800);
        assert_eq!(params.expires, 1517422400);
        assert_eq!(params.cert_sha256.len(), 32);
        assert_eq!(params.sig[0], 0x30);
        assert_eq!(params.serialize(), header);
    }

    #[test]
    fn accepts_any_parameter_order() {
        let header = "label; date=1; expires=2; cert-url=\"https://c\"; cert-sha256=**; \
integrity=\"mi-draft2\"; validity-url=\"https://v\"; sig=**";
        let params = SignatureParams::parse(header).unwrap();
        assert_eq!(params.date, 1);
        assert_eq!(params.validity_url, "https://v");
    }

    #[test]
    fn rejects_duplicate_parameter() {
        let header = "label; sig=**; sig=**; validity-url=\"https://v\"; integrity=\"i\"; \
cert-url=\"https://c\"; cert-sha256=**; date=1; expires=2";
        assert!(matches!(
            SignatureParams::parse(header),
            Err(Error::ParseError(_))
        ));
    }

    #[test]
    fn rejects_missing_parameter() {
        let header = "label; sig=**; integrity=\"i\"; cert-url=\"https://c\"; \
cert-sha256=**; date=1; expires=2";
        assert!(matches!(
            SignatureParams::parse(header),
            Err(Error::ParseError(_))
        ));
    }

    #[test]
    fn ignores_unknown_parameters() {
        let header = "label; sig=**; validity-url=\"https://v\"; integrity=\"i\"; \
cert-url=\"https://c\"; cert-sha256=**; date=1; expires=2; extra=\"x\"";
        assert!(SignatureParams::parse(header).is_ok());
    }

    #[test]
    fn rejects_bad_base64() {
        let header = "label; sig=*!!*; validity-url=\"https://v\"; integrity=\"i\"; \
cert-url=\"https://c\"; cert-sha256=**; date=1; expires=2";
        assert!(matches!(
            SignatureParams::parse(header),
            Err(Error::ParseError(_))
        ));
    }
}
