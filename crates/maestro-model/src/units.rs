//! Byte-size parsing for resource limits.

use serde::Deserialize;

use crate::error::{ConfigError, Result};

/// Raw YAML shape of a byte size: a bare number or a suffixed string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum RawByteSize {
    Number(u64),
    Text(String),
}

/// Parses a byte size with an optional `k`/`m`/`g` suffix.
///
/// Suffixes are case-insensitive and binary: `"1g"` is 1073741824 bytes.
///
/// # Errors
///
/// Returns a [`ConfigError`] when the value is not a number with an
/// optional recognized suffix.
pub fn parse_byte_size(path: &str, value: &str) -> Result<u64> {
    let value = value.trim();
    let (digits, multiplier) = match value.chars().last() {
        Some(c) if c.eq_ignore_ascii_case(&'k') => (&value[..value.len() - 1], 1024),
        Some(c) if c.eq_ignore_ascii_case(&'m') => (&value[..value.len() - 1], 1024 * 1024),
        Some(c) if c.eq_ignore_ascii_case(&'g') => (&value[..value.len() - 1], 1024 * 1024 * 1024),
        _ => (value, 1),
    };
    let number = digits.parse::<u64>().map_err(|_| {
        ConfigError::invalid(path, format!("invalid byte size {value:?}"))
    })?;
    number.checked_mul(multiplier).ok_or_else(|| {
        ConfigError::invalid(path, format!("byte size {value:?} overflows"))
    })
}

pub(crate) fn parse_raw_byte_size(path: &str, raw: &RawByteSize) -> Result<u64> {
    match raw {
        RawByteSize::Number(n) => Ok(*n),
        RawByteSize::Text(s) => parse_byte_size(path, s),
    }
}
