// SPDX-License-Identifier: GPL-3.0-or-later

use std::io::prelude::*;
use std::num::IntErrorKind;
use std::path::Path;
use anyhow::{Context, Result};
use regex::Regex;

lazy_static::lazy_static! {
    static ref C_IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
    static ref C_IDENTIFIER_PART: Regex = Regex::new(r"^[A-Za-z0-9_]+$").unwrap();
}

pub fn read_file(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    let path = path.as_ref();
    let mut file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let mut buf = Vec::new();
    file.read_to_end(&mut buf)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    Ok(buf)
}

pub fn read_file_str(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let content = read_file(path)?;
    let str = String::from_utf8(content)
        .with_context(|| format!("{} is not valid UTF-8", path.display()))?;
    Ok(str)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralError {
    Malformed,
    OutOfRange,
}

/// Parses a decimal or `0x`-prefixed hexadecimal literal.
pub fn parse_u64(src: &str) -> Result<u64, LiteralError> {
    let src = src.trim();
    let (digits, radix) = match src.strip_prefix("0x").or_else(|| src.strip_prefix("0X")) {
        Some(hex) => (hex, 16),
        None => (src, 10),
    };

    // from_str_radix() would also take a leading '+'
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return Err(LiteralError::Malformed);
    }

    u64::from_str_radix(digits, radix).map_err(|e| match e.kind() {
        IntErrorKind::PosOverflow => LiteralError::OutOfRange,
        _ => LiteralError::Malformed,
    })
}

/// Same as `parse_u64()` with an optional leading minus sign.
pub fn parse_i64(src: &str) -> Result<i64, LiteralError> {
    let src = src.trim();
    match src.strip_prefix('-') {
        Some(magnitude) => {
            let v = parse_u64(magnitude)?;
            if v > i64::MAX as u64 + 1 {
                return Err(LiteralError::OutOfRange);
            }
            Ok((v as i64).wrapping_neg())
        }
        None => {
            let v = parse_u64(src)?;
            i64::try_from(v).map_err(|_| LiteralError::OutOfRange)
        }
    }
}

pub fn is_c_identifier(s: &str) -> bool {
    C_IDENTIFIER.is_match(s)
}

/// Something that forms a valid identifier once appended to one, like `8BIT` in `MODE_8BIT`.
pub fn is_c_identifier_part(s: &str) -> bool {
    C_IDENTIFIER_PART.is_match(s)
}

/// Text that can sit on one line of a `#define` or compiler option.
pub fn is_c_safe_value(s: &str) -> bool {
    !s.contains(|c: char| c == '\n' || c == '\r' || c == '\\' || c.is_control())
        && !s.contains("/*")
        && !s.contains("*/")
        && !s.contains("//")
}

/// Flattens vendor captions into something that can sit inside a `/* */` comment.
pub fn comment_text(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace("*/", "* /")
        .replace("/*", "/ *")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_decimal_and_hex() {
        assert_eq!(parse_u64("0"), Ok(0));
        assert_eq!(parse_u64("4096"), Ok(4096));
        assert_eq!(parse_u64("0x20000000"), Ok(0x2000_0000));
        assert_eq!(parse_u64("0XfF"), Ok(255));
        assert_eq!(parse_u64("0x100000000"), Ok(0x1_0000_0000));
        assert_eq!(parse_u64(" 12 "), Ok(12));
    }

    #[test]
    fn rejects_malformed_literals() {
        assert_eq!(parse_u64(""), Err(LiteralError::Malformed));
        assert_eq!(parse_u64("0x"), Err(LiteralError::Malformed));
        assert_eq!(parse_u64("+5"), Err(LiteralError::Malformed));
        assert_eq!(parse_u64("12a"), Err(LiteralError::Malformed));
        assert_eq!(parse_u64("0x1g"), Err(LiteralError::Malformed));
        assert_eq!(parse_u64("-1"), Err(LiteralError::Malformed));
    }

    #[test]
    fn rejects_out_of_range_literals() {
        assert_eq!(parse_u64("0xFFFFFFFFFFFFFFFF"), Ok(u64::MAX));
        assert_eq!(parse_u64("0x10000000000000000"), Err(LiteralError::OutOfRange));
        assert_eq!(parse_u64("18446744073709551616"), Err(LiteralError::OutOfRange));
    }

    #[test]
    fn parses_signed() {
        assert_eq!(parse_i64("-15"), Ok(-15));
        assert_eq!(parse_i64("0x10"), Ok(16));
        assert_eq!(parse_i64("-9223372036854775808"), Ok(i64::MIN));
        assert_eq!(parse_i64("9223372036854775808"), Err(LiteralError::OutOfRange));
        assert_eq!(parse_i64("--1"), Err(LiteralError::Malformed));
    }

    #[test]
    fn identifiers_and_values() {
        assert!(is_c_identifier("SERCOM0"));
        assert!(is_c_identifier("_x1"));
        assert!(!is_c_identifier("1abc"));
        assert!(!is_c_identifier("a-b"));
        assert!(!is_c_identifier(""));
        assert!(is_c_identifier_part("8BIT"));
        assert!(!is_c_identifier_part("../x"));

        assert!(is_c_safe_value("0x1000"));
        assert!(is_c_safe_value("\"SAME54\""));
        assert!(!is_c_safe_value("1\n#include <evil.h>"));
        assert!(!is_c_safe_value("1 /* x */"));
    }

    #[test]
    fn captions_become_safe_comments() {
        assert_eq!(comment_text("Control\n   A */ evil"), "Control A * / evil");
    }
}
