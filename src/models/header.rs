//! HTTP header representation and normalization.

use super::text::sanitize;
use serde::{Deserialize, Serialize};

/// Sensitive header names whose values are redacted when redaction is enabled.
pub const SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "proxy-authorization",
    "cookie",
    "set-cookie",
    "x-api-key",
    "api-key",
    "x-auth-token",
    "auth-token",
    "x-access-token",
    "access-token",
];

/// Value written in place of a redacted header value.
pub const REDACTED: &str = "[REDACTED]";

/// One header line, in its normalized form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    /// Builds a header, normalizing both name and value.
    pub fn new(name: &str, value: &str) -> Self {
        Self {
            name: normalize_name(name),
            value: normalize_value(value),
        }
    }

    /// Returns `true` if this header carries credentials.
    pub fn is_sensitive(&self) -> bool {
        SENSITIVE_HEADERS
            .iter()
            .any(|sensitive| self.name.eq_ignore_ascii_case(sensitive))
    }
}

impl std::fmt::Display for Header {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.value)
    }
}

/// Normalizes a header name to canonical casing.
///
/// Each `-` separated segment gets an upper-case first letter and a
/// lower-case remainder: `content-TYPE` becomes `Content-Type`. Only ASCII
/// letters change case.
pub fn normalize_name(name: &str) -> String {
    let name = sanitize(name);
    let mut out = String::with_capacity(name.len());
    let mut segment_start = true;
    for c in name.trim().chars() {
        if c == '-' {
            segment_start = true;
            out.push(c);
        } else if segment_start {
            out.push(c.to_ascii_uppercase());
            segment_start = false;
        } else {
            out.push(c.to_ascii_lowercase());
        }
    }
    out
}

/// Collapses line breaks inside a header value to single spaces and trims it.
///
/// Obsolete line folding and stray CR/LF would otherwise break the
/// one-header-per-line cell layout. Characters a workbook cannot hold become
/// U+FFFD.
pub fn normalize_value(value: &str) -> String {
    let value = sanitize(value);
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                out.push(' ');
            }
            '\n' => out.push(' '),
            _ => out.push(c),
        }
    }
    out.trim().to_string()
}

/// Normalizes a list of raw header pairs, dropping headers without a name.
pub fn normalize_headers<I, N, V>(headers: I) -> Vec<Header>
where
    I: IntoIterator<Item = (N, V)>,
    N: AsRef<str>,
    V: AsRef<str>,
{
    headers
        .into_iter()
        .map(|(name, value)| Header::new(name.as_ref(), value.as_ref()))
        .filter(|header| !header.name.is_empty())
        .collect()
}
