//! Transaction ↔ row conversion.
//!
//! Encoding is pure and never fails: fields that do not fit in a cell are cut
//! and flagged. Decoding validates the row against its schema version;
//! malformed optional cells fall back to defaults, malformed required cells
//! reject the row.

use super::schema::{self, v1};
use super::{Cell, Row, RowError};
use crate::config::WorkbookConfig;
use crate::models::transaction::{
    normalize_annotation, normalize_latency, normalize_method, normalize_source,
    normalize_timestamp, normalize_url,
};
use crate::models::{Header, NormalizedExchange, Transaction, TruncationFlags, REDACTED};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, SecondsFormat, Utc};
use log::debug;
use std::time::Duration;

/// Largest integer an f64 cell holds exactly.
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// A row produced from a transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedRow {
    pub row: Row,
    /// Flags carried by the record plus anything cut while encoding.
    pub truncation: TruncationFlags,
}

impl EncodedRow {
    pub fn is_truncated(&self) -> bool {
        self.truncation.any()
    }
}

/// Converts transactions to and from rows.
#[derive(Debug, Clone)]
pub struct RowCodec {
    max_cell_chars: usize,
    redact_sensitive_headers: bool,
}

impl RowCodec {
    pub fn new(max_cell_chars: usize) -> Self {
        Self {
            max_cell_chars,
            redact_sensitive_headers: false,
        }
    }

    pub fn from_config(config: &WorkbookConfig) -> Self {
        Self {
            max_cell_chars: config.max_cell_chars,
            redact_sensitive_headers: config.redact_sensitive_headers,
        }
    }

    pub fn with_redaction(mut self, redact: bool) -> Self {
        self.redact_sensitive_headers = redact;
        self
    }

    pub fn max_cell_chars(&self) -> usize {
        self.max_cell_chars
    }

    /// Largest body, in bytes, that fits into one cell once base64 encoded.
    pub fn max_body_bytes(&self) -> usize {
        self.max_cell_chars / 4 * 3
    }

    /// Maps a record to a row of the current schema version.
    pub fn to_row(&self, record: &Transaction) -> EncodedRow {
        let mut truncation = record.truncation();

        let (url, cut) = self.fit_text(record.url());
        truncation.url |= cut;
        let (request_headers, cut) = self.encode_headers(record.request_headers());
        truncation.request_headers |= cut;
        let (request_body, cut) = self.encode_body(record.request_body());
        truncation.request_body |= cut;
        let (response_headers, cut) = self.encode_headers(record.response_headers());
        truncation.response_headers |= cut;
        let (response_body, cut) = self.encode_body(record.response_body());
        truncation.response_body |= cut;
        let (annotation, cut) = self.fit_text(record.annotation().unwrap_or_default());
        truncation.annotation |= cut;

        let status = match record.status() {
            Some(code) => Cell::Number(f64::from(code)),
            None => Cell::Empty,
        };

        let cells = vec![
            Cell::Number(record.sequence() as f64),
            Cell::Text(
                record
                    .timestamp()
                    .to_rfc3339_opts(SecondsFormat::Micros, true),
            ),
            Cell::text(record.source()),
            Cell::text(record.method()),
            Cell::Text(url),
            Cell::Text(record.host()),
            status,
            Cell::Text(request_headers),
            Cell::Text(request_body),
            Cell::Text(response_headers),
            Cell::Text(response_body),
            Cell::Number(record.latency().as_micros() as f64),
            Cell::Text(annotation),
            Cell::Text(truncation.to_label()),
        ];

        EncodedRow {
            row: Row::new(cells),
            truncation,
        }
    }

    /// Rebuilds a record from a row written under `schema_version`.
    ///
    /// # Errors
    ///
    /// - `RowError::SchemaMismatch` if the version is unknown or the row has
    ///   values beyond the version's last column
    /// - `RowError::MalformedCell` if a required cell cannot be coerced
    pub fn from_row(&self, row: &Row, schema_version: u32) -> Result<Transaction, RowError> {
        let columns = schema::columns(schema_version).ok_or_else(|| RowError::SchemaMismatch {
            detail: format!("unknown schema version {}", schema_version),
        })?;

        if let Some(extra) = row
            .cells()
            .iter()
            .enumerate()
            .skip(columns.len())
            .find(|(_, cell)| !cell.is_blank())
        {
            return Err(RowError::SchemaMismatch {
                detail: format!(
                    "expected {} columns, found a value in column {}",
                    columns.len(),
                    extra.0 + 1
                ),
            });
        }

        // Only version 1 exists; later versions get their own decoder here.
        self.decode_v1(row, columns)
    }

    fn decode_v1(&self, row: &Row, columns: &[schema::Column]) -> Result<Transaction, RowError> {
        let title = |index: usize| columns[index].title;

        let sequence = required_integer(row.get(v1::SEQ), title(v1::SEQ))?;
        let timestamp = required_timestamp(row.get(v1::TIME), title(v1::TIME))?;
        let method = normalize_method(required_text(row.get(v1::METHOD), title(v1::METHOD))?);
        let url = normalize_url(required_text(row.get(v1::URL), title(v1::URL))?);

        let status = match row.get(v1::STATUS) {
            cell if cell.is_blank() => None,
            cell => {
                let code = required_integer(cell, title(v1::STATUS))?;
                let code = u16::try_from(code).map_err(|_| RowError::MalformedCell {
                    column: title(v1::STATUS),
                    reason: format!("status code {} out of range", code),
                })?;
                Some(code)
            }
        };

        let request_headers =
            decode_headers(row.get(v1::REQUEST_HEADERS), title(v1::REQUEST_HEADERS))?;
        let request_body = decode_body(row.get(v1::REQUEST_BODY), title(v1::REQUEST_BODY))?;
        let response_headers =
            decode_headers(row.get(v1::RESPONSE_HEADERS), title(v1::RESPONSE_HEADERS))?;
        let response_body = decode_body(row.get(v1::RESPONSE_BODY), title(v1::RESPONSE_BODY))?;

        let source = match row.get(v1::TOOL) {
            Cell::Text(text) => normalize_source(text),
            Cell::Empty => normalize_source(""),
            other => {
                debug!("Ignoring malformed {} cell {:?}", title(v1::TOOL), other);
                normalize_source("")
            }
        };

        let latency = match row.get(v1::LATENCY) {
            Cell::Empty => Duration::ZERO,
            cell => match required_integer(cell, title(v1::LATENCY)) {
                Ok(micros) => normalize_latency(Duration::from_micros(micros)),
                Err(e) => {
                    debug!("Ignoring malformed latency: {}", e);
                    Duration::ZERO
                }
            },
        };

        let annotation = match row.get(v1::ANNOTATION) {
            Cell::Empty => None,
            cell => normalize_annotation(&cell.display_text()),
        };

        let truncation = match row.get(v1::TRUNCATED) {
            Cell::Text(label) => TruncationFlags::from_label(label),
            _ => TruncationFlags::default(),
        };

        let fields = NormalizedExchange {
            timestamp,
            method,
            url,
            request_headers,
            request_body,
            status,
            response_headers,
            response_body,
            source,
            annotation,
            latency,
            truncation,
        };
        Ok(Transaction::from_normalized(sequence, fields))
    }

    fn encode_headers(&self, headers: &[Header]) -> (String, bool) {
        let mut out = String::new();
        let mut used = 0usize;
        for header in headers {
            let value = if self.redact_sensitive_headers && header.is_sensitive() {
                REDACTED
            } else {
                header.value.as_str()
            };
            let line = if value.is_empty() {
                format!("{}:", header.name)
            } else {
                format!("{}: {}", header.name, value)
            };

            let separator = usize::from(!out.is_empty());
            let line_chars = line.chars().count();
            if used + separator + line_chars > self.max_cell_chars {
                return (out, true);
            }
            if separator == 1 {
                out.push('\n');
            }
            out.push_str(&line);
            used += separator + line_chars;
        }
        (out, false)
    }

    fn encode_body(&self, body: &[u8]) -> (String, bool) {
        let limit = self.max_body_bytes();
        if body.len() > limit {
            (STANDARD.encode(&body[..limit]), true)
        } else {
            (STANDARD.encode(body), false)
        }
    }

    /// Cuts free text to the cell limit at a character boundary.
    fn fit_text(&self, text: &str) -> (String, bool) {
        match text.char_indices().nth(self.max_cell_chars) {
            Some((end, _)) => (text[..end].to_string(), true),
            None => (text.to_string(), false),
        }
    }
}

impl Default for RowCodec {
    fn default() -> Self {
        Self::from_config(&WorkbookConfig::default())
    }
}

fn required_text<'a>(cell: &'a Cell, column: &'static str) -> Result<&'a str, RowError> {
    match cell {
        Cell::Text(text) if !text.trim().is_empty() => Ok(text),
        Cell::Text(_) | Cell::Empty => Err(RowError::MalformedCell {
            column,
            reason: "required value is missing".to_string(),
        }),
        Cell::Number(n) => Err(RowError::MalformedCell {
            column,
            reason: format!("expected text, found number {}", n),
        }),
    }
}

fn required_integer(cell: &Cell, column: &'static str) -> Result<u64, RowError> {
    let malformed = |reason: String| RowError::MalformedCell { column, reason };
    match cell {
        Cell::Number(n) => {
            if n.is_finite() && n.fract() == 0.0 && *n >= 0.0 && *n <= MAX_EXACT_INTEGER {
                Ok(*n as u64)
            } else {
                Err(malformed(format!("expected a whole number, found {}", n)))
            }
        }
        Cell::Text(text) => text
            .trim()
            .parse::<u64>()
            .map_err(|_| malformed(format!("not a number: {:?}", text))),
        Cell::Empty => Err(malformed("required value is missing".to_string())),
    }
}

fn required_timestamp(cell: &Cell, column: &'static str) -> Result<DateTime<Utc>, RowError> {
    let text = required_text(cell, column)?;
    DateTime::parse_from_rfc3339(text.trim())
        .map(|t| normalize_timestamp(t.with_timezone(&Utc)))
        .map_err(|e| RowError::MalformedCell {
            column,
            reason: format!("invalid timestamp {:?}: {}", text, e),
        })
}

fn decode_headers(cell: &Cell, column: &'static str) -> Result<Vec<Header>, RowError> {
    let text = match cell {
        Cell::Empty => return Ok(Vec::new()),
        Cell::Text(text) => text,
        Cell::Number(n) => {
            return Err(RowError::MalformedCell {
                column,
                reason: format!("expected header lines, found number {}", n),
            })
        }
    };

    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let (name, value) = match line.split_once(": ") {
                Some(pair) => pair,
                None => match line.trim_end().strip_suffix(':') {
                    Some(name) => (name, ""),
                    None => {
                        return Err(RowError::MalformedCell {
                            column,
                            reason: format!("header line without a colon: {:?}", line),
                        })
                    }
                },
            };
            let header = Header::new(name, value);
            if header.name.is_empty() {
                return Err(RowError::MalformedCell {
                    column,
                    reason: format!("header line without a name: {:?}", line),
                });
            }
            Ok(header)
        })
        .collect()
}

fn decode_body(cell: &Cell, column: &'static str) -> Result<Vec<u8>, RowError> {
    match cell {
        Cell::Empty => Ok(Vec::new()),
        Cell::Text(text) => STANDARD
            .decode(text.trim())
            .map_err(|e| RowError::MalformedCell {
                column,
                reason: format!("invalid base64: {}", e),
            }),
        Cell::Number(n) => Err(RowError::MalformedCell {
            column,
            reason: format!("expected base64 text, found number {}", n),
        }),
    }
}
