// SPDX-License-Identifier: GPL-3.0-or-later

//! Byte-level decoding and a thin element wrapper over `roxmltree` that turns every attribute
//! lookup into a located `ParseError`.

use regex::bytes::Regex;
use roxmltree::{Document, Node, ParsingOptions};

use super::ParseError;
use crate::util::{self, LiteralError};

pub const MAX_DOCUMENT_SIZE: usize = 64 * 1024 * 1024;

lazy_static::lazy_static! {
    static ref DECLARED_ENCODING: Regex =
        Regex::new(r#"^<\?xml[^>]*?encoding\s*=\s*["']([A-Za-z0-9._\-]+)["']"#).unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
    Latin1,
}

impl Encoding {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" | "us-ascii" | "ascii" => Some(Self::Utf8),
            "iso-8859-1" | "iso8859-1" | "latin1" | "latin-1" => Some(Self::Latin1),
            _ => None,
        }
    }
}

/// Turns raw document bytes into text, honoring a byte-order mark or the XML declaration unless
/// the caller forces an encoding.
pub fn decode(bytes: &[u8], forced: Option<Encoding>) -> Result<String, ParseError> {
    if bytes.len() > MAX_DOCUMENT_SIZE {
        return Err(ParseError::TooLarge { size: bytes.len() as u64, limit: MAX_DOCUMENT_SIZE as u64 });
    }

    if bytes.starts_with(&[0xFF, 0xFE]) || bytes.starts_with(&[0xFE, 0xFF]) {
        return Err(ParseError::Encoding("UTF-16".to_string()));
    }
    let (bytes, bom) = match bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        Some(rest) => (rest, true),
        None => (bytes, false),
    };

    let encoding = match forced {
        Some(e) => e,
        None => match DECLARED_ENCODING.captures(bytes).and_then(|c| c.get(1)) {
            Some(label) if !bom => {
                let label = String::from_utf8_lossy(label.as_bytes());
                Encoding::from_label(&label).ok_or_else(|| ParseError::Encoding(label.into_owned()))?
            }
            _ => Encoding::Utf8,
        },
    };

    match encoding {
        Encoding::Utf8 => String::from_utf8(bytes.to_vec())
            .map_err(|e| ParseError::Encoding(format!("invalid UTF-8 at byte {}", e.utf8_error().valid_up_to()))),
        Encoding::Latin1 => Ok(bytes.iter().map(|&b| b as char).collect()),
    }
}

pub fn parse_xml(text: &str) -> Result<Document<'_>, ParseError> {
    let mut opt = ParsingOptions::default();
    opt.allow_dtd = false;

    Document::parse_with_options(text, opt).map_err(|e| match e {
        roxmltree::Error::DtdDetected => ParseError::DtdRefused,
        e => ParseError::Xml(e.to_string()),
    })
}

#[derive(Clone, Copy)]
pub struct Element<'a, 'input> {
    node: Node<'a, 'input>,
}

impl<'a, 'input> Element<'a, 'input> {
    pub fn new(node: Node<'a, 'input>) -> Self {
        Self { node }
    }

    pub fn tag(&self) -> &'a str {
        self.node.tag_name().name()
    }

    /// XPath-like location used in diagnostics, e.g.
    /// `/avr-tools-device-file/modules/module[@name='UART']`.
    pub fn path(&self) -> String {
        let mut parts = self.node.ancestors()
            .filter(|n| n.is_element())
            .map(|n| match n.attribute("name") {
                Some(name) => format!("{}[@name='{}']", n.tag_name().name(), name),
                None => n.tag_name().name().to_string(),
            })
            .collect::<Vec<_>>();
        parts.reverse();
        format!("/{}", parts.join("/"))
    }

    pub fn children(&self, tag: &'static str) -> impl Iterator<Item = Element<'a, 'input>> {
        self.node.children()
            .filter(move |n| n.is_element() && n.tag_name().name() == tag)
            .map(Element::new)
    }

    /// Every child element, in document order.
    pub fn elements(&self) -> impl Iterator<Item = Element<'a, 'input>> {
        self.node.children().filter(|n| n.is_element()).map(Element::new)
    }

    pub fn child(&self, tag: &'static str) -> Option<Element<'a, 'input>> {
        self.children(tag).next()
    }

    pub fn required_child(&self, tag: &'static str) -> Result<Element<'a, 'input>, ParseError> {
        self.child(tag).ok_or_else(|| ParseError::MissingElement {
            path: self.path(),
            element: tag.to_string(),
        })
    }

    /// Children of an optional wrapper element, e.g. every `<param>` under `<parameters>`.
    pub fn nested(&self, wrapper: &'static str, tag: &'static str) -> Vec<Element<'a, 'input>> {
        self.children(wrapper).flat_map(|w| w.children(tag).collect::<Vec<_>>()).collect()
    }

    pub fn attr(&self, name: &str) -> Option<&'a str> {
        self.node.attribute(name)
    }

    pub fn text_attr(&self, name: &str) -> String {
        self.attr(name).map(str::trim).unwrap_or_default().to_string()
    }

    pub fn required_attr(&self, name: &str) -> Result<&'a str, ParseError> {
        self.attr(name).ok_or_else(|| ParseError::MissingAttribute {
            path: self.path(),
            attribute: name.to_string(),
        })
    }

    pub fn invalid(&self, attribute: &str, value: &str, reason: &str) -> ParseError {
        ParseError::InvalidValue {
            path: self.path(),
            attribute: attribute.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }

    fn literal_error(&self, attribute: &str, value: &str, e: LiteralError) -> ParseError {
        let (path, attribute, value) = (self.path(), attribute.to_string(), value.to_string());
        match e {
            LiteralError::Malformed => ParseError::BadNumber { path, attribute, value },
            LiteralError::OutOfRange => ParseError::OutOfRange { path, attribute, value },
        }
    }

    pub fn out_of_range(&self, attribute: &str, value: &str) -> ParseError {
        self.literal_error(attribute, value, LiteralError::OutOfRange)
    }

    pub fn u64_attr(&self, name: &str) -> Result<Option<u64>, ParseError> {
        self.attr(name)
            .map(|v| util::parse_u64(v).map_err(|e| self.literal_error(name, v, e)))
            .transpose()
    }

    pub fn required_u64(&self, name: &str) -> Result<u64, ParseError> {
        let v = self.required_attr(name)?;
        util::parse_u64(v).map_err(|e| self.literal_error(name, v, e))
    }

    pub fn required_i64(&self, name: &str) -> Result<i64, ParseError> {
        let v = self.required_attr(name)?;
        util::parse_i64(v).map_err(|e| self.literal_error(name, v, e))
    }

    pub fn bool_attr(&self, name: &str) -> Result<Option<bool>, ParseError> {
        match self.attr(name).map(str::trim) {
            None => Ok(None),
            Some(v) if v.eq_ignore_ascii_case("true") || v == "1" => Ok(Some(true)),
            Some(v) if v.eq_ignore_ascii_case("false") || v == "0" => Ok(Some(false)),
            Some(v) => Err(self.invalid(name, v, "is not a boolean")),
        }
    }

    /// A name that must be usable verbatim as a C identifier.
    pub fn identifier(&self, name: &str) -> Result<String, ParseError> {
        let v = self.required_attr(name)?.trim();
        if !util::is_c_identifier(v) {
            return Err(self.invalid(name, v, "is not a valid C identifier"));
        }
        Ok(v.to_string())
    }

    /// A name that only ever appears after a prefix, such as a bit-field or value name.
    pub fn identifier_part(&self, name: &str) -> Result<String, ParseError> {
        let v = self.required_attr(name)?.trim();
        if !util::is_c_identifier_part(v) {
            return Err(self.invalid(name, v, "is not a valid C identifier"));
        }
        Ok(v.to_string())
    }

    /// Space separated mode names.
    pub fn modes(&self) -> Result<Vec<String>, ParseError> {
        let raw = self.attr("modes").unwrap_or_default();
        raw.split_whitespace()
            .map(|m| match util::is_c_identifier(m) {
                true => Ok(m.to_string()),
                false => Err(self.invalid("modes", raw, "is not a list of C identifiers")),
            })
            .collect()
    }

    /// A parameter value that will be written into a header line or a compiler option.
    pub fn safe_value(&self, name: &str) -> Result<String, ParseError> {
        let v = self.attr(name).unwrap_or_default().trim();
        if !util::is_c_safe_value(v) {
            return Err(self.invalid(name, v, "cannot be written into generated C"));
        }
        Ok(v.to_string())
    }
}
