//! Captured HTTP exchanges.
//!
//! [`CapturedExchange`] is the raw data the host delivers for one intercepted
//! request/response pair. [`Transaction`] is the normalized, immutable record
//! the rest of the crate works with; it only comes into existence when the
//! capture buffer assigns it a sequence number.

use super::header::{normalize_headers, Header};
use super::text::sanitize;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use std::time::Duration;

/// Source tag used when the host does not name the originating tool.
pub const UNKNOWN_SOURCE: &str = "Unknown";

/// Raw exchange data as delivered by the host, before normalization.
#[derive(Debug, Clone, Default)]
pub struct CapturedExchange {
    pub method: String,
    pub url: String,
    pub request_headers: Vec<(String, String)>,
    pub request_body: Vec<u8>,
    /// `None` if no response was received.
    pub status: Option<u16>,
    pub response_headers: Vec<(String, String)>,
    pub response_body: Vec<u8>,
    /// Originating tool, e.g. `Proxy` or `Repeater`.
    pub source: String,
    pub annotation: Option<String>,
    pub latency: Duration,
    /// Interception time; the capture time is used when absent.
    pub timestamp: Option<DateTime<Utc>>,
}

impl CapturedExchange {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_request_header(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.request_headers.push((name.into(), value.into()));
        self
    }

    pub fn with_request_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.request_body = body.into();
        self
    }

    pub fn with_response(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_response_header(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.response_headers.push((name.into(), value.into()));
        self
    }

    pub fn with_response_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.response_body = body.into();
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_annotation(mut self, annotation: impl Into<String>) -> Self {
        self.annotation = Some(annotation.into());
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Normalizes the exchange into the field values a [`Transaction`] holds.
    ///
    /// Runs outside the capture buffer lock; only the sequence number is
    /// assigned under it.
    pub fn normalize(self) -> NormalizedExchange {
        NormalizedExchange {
            timestamp: normalize_timestamp(self.timestamp.unwrap_or_else(Utc::now)),
            method: normalize_method(&self.method),
            url: normalize_url(&self.url),
            request_headers: normalize_headers(self.request_headers),
            request_body: self.request_body,
            status: self.status,
            response_headers: normalize_headers(self.response_headers),
            response_body: self.response_body,
            source: normalize_source(&self.source),
            annotation: self.annotation.as_deref().and_then(normalize_annotation),
            latency: normalize_latency(self.latency),
            truncation: TruncationFlags::default(),
        }
    }
}

/// Exchange fields after normalization, waiting for a sequence number.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedExchange {
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub url: String,
    pub request_headers: Vec<Header>,
    pub request_body: Vec<u8>,
    pub status: Option<u16>,
    pub response_headers: Vec<Header>,
    pub response_body: Vec<u8>,
    pub source: String,
    pub annotation: Option<String>,
    pub latency: Duration,
    pub truncation: TruncationFlags,
}

/// Which fields of a record were cut to fit into a workbook cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TruncationFlags {
    pub url: bool,
    pub request_headers: bool,
    pub request_body: bool,
    pub response_headers: bool,
    pub response_body: bool,
    pub annotation: bool,
}

impl TruncationFlags {
    const LABELS: [&'static str; 6] = [
        "url",
        "request-headers",
        "request-body",
        "response-headers",
        "response-body",
        "annotation",
    ];

    pub fn any(&self) -> bool {
        self.bits().contains(&true)
    }

    pub fn union(self, other: TruncationFlags) -> TruncationFlags {
        TruncationFlags {
            url: self.url || other.url,
            request_headers: self.request_headers || other.request_headers,
            request_body: self.request_body || other.request_body,
            response_headers: self.response_headers || other.response_headers,
            response_body: self.response_body || other.response_body,
            annotation: self.annotation || other.annotation,
        }
    }

    fn bits(&self) -> [bool; 6] {
        [
            self.url,
            self.request_headers,
            self.request_body,
            self.response_headers,
            self.response_body,
            self.annotation,
        ]
    }

    /// Comma separated labels of the set flags, empty when nothing was cut.
    pub fn to_label(&self) -> String {
        Self::LABELS
            .iter()
            .zip(self.bits())
            .filter(|(_, set)| *set)
            .map(|(label, _)| *label)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Parses a label list, ignoring unknown entries.
    pub fn from_label(label: &str) -> TruncationFlags {
        let mut flags = TruncationFlags::default();
        for part in label.split(',').map(str::trim) {
            match part {
                "url" => flags.url = true,
                "request-headers" => flags.request_headers = true,
                "request-body" => flags.request_body = true,
                "response-headers" => flags.response_headers = true,
                "response-body" => flags.response_body = true,
                "annotation" => flags.annotation = true,
                _ => {}
            }
        }
        flags
    }
}

/// One captured HTTP exchange.
///
/// Immutable once built. Identity is the sequence number: two records are
/// equal exactly when their sequence numbers are, whatever their contents.
/// Use [`Transaction::same_exchange`] to compare contents.
#[derive(Debug, Clone)]
pub struct Transaction {
    sequence: u64,
    timestamp: DateTime<Utc>,
    method: String,
    url: String,
    request_headers: Vec<Header>,
    request_body: Vec<u8>,
    status: Option<u16>,
    response_headers: Vec<Header>,
    response_body: Vec<u8>,
    source: String,
    annotation: Option<String>,
    latency: Duration,
    truncation: TruncationFlags,
}

impl Transaction {
    /// Builds a record from raw host data, normalizing it first.
    pub fn from_exchange(sequence: u64, exchange: CapturedExchange) -> Self {
        Self::from_normalized(sequence, exchange.normalize())
    }

    /// Builds a record from already normalized fields.
    pub fn from_normalized(sequence: u64, fields: NormalizedExchange) -> Self {
        Self {
            sequence,
            timestamp: fields.timestamp,
            method: fields.method,
            url: fields.url,
            request_headers: fields.request_headers,
            request_body: fields.request_body,
            status: fields.status,
            response_headers: fields.response_headers,
            response_body: fields.response_body,
            source: fields.source,
            annotation: fields.annotation,
            latency: fields.latency,
            truncation: fields.truncation,
        }
    }

    /// Copy of this record under a new sequence number.
    pub fn with_sequence(&self, sequence: u64) -> Self {
        Self {
            sequence,
            ..self.clone()
        }
    }

    /// Moves this record under a new sequence number.
    pub fn resequenced(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Host part of the URL without a leading `www.`, or an empty string.
    pub fn host(&self) -> String {
        crate::capture::extract_domain(&self.url)
    }

    pub fn request_headers(&self) -> &[Header] {
        &self.request_headers
    }

    pub fn request_body(&self) -> &[u8] {
        &self.request_body
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn response_headers(&self) -> &[Header] {
        &self.response_headers
    }

    pub fn response_body(&self) -> &[u8] {
        &self.response_body
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn annotation(&self) -> Option<&str> {
        self.annotation.as_deref()
    }

    pub fn latency(&self) -> Duration {
        self.latency
    }

    pub fn truncation(&self) -> TruncationFlags {
        self.truncation
    }

    /// `true` if a response was received for this request.
    pub fn has_response(&self) -> bool {
        self.status.is_some()
    }

    /// Compares every field except the sequence number.
    pub fn same_exchange(&self, other: &Transaction) -> bool {
        self.timestamp == other.timestamp
            && self.method == other.method
            && self.url == other.url
            && self.request_headers == other.request_headers
            && self.request_body == other.request_body
            && self.status == other.status
            && self.response_headers == other.response_headers
            && self.response_body == other.response_body
            && self.source == other.source
            && self.annotation == other.annotation
            && self.latency == other.latency
            && self.truncation == other.truncation
    }
}

impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        self.sequence == other.sequence
    }
}

impl Eq for Transaction {}

impl Hash for Transaction {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.sequence.hash(state);
    }
}

impl PartialOrd for Transaction {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Transaction {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.sequence.cmp(&other.sequence)
    }
}

/// Truncates a timestamp to the microsecond precision stored in workbooks.
pub fn normalize_timestamp(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    timestamp.trunc_subsecs(6)
}

/// Truncates a latency to whole microseconds.
pub fn normalize_latency(latency: Duration) -> Duration {
    Duration::from_micros(latency.as_micros().min(u64::MAX as u128) as u64)
}

/// Upper-cases and trims a request method.
pub fn normalize_method(method: &str) -> String {
    sanitize(method).trim().to_ascii_uppercase()
}

pub fn normalize_url(url: &str) -> String {
    sanitize(url).trim().to_string()
}

/// Trims the originating tool name; a blank one becomes [`UNKNOWN_SOURCE`].
pub fn normalize_source(source: &str) -> String {
    let source = sanitize(source);
    let source = source.trim();
    if source.is_empty() {
        UNKNOWN_SOURCE.to_string()
    } else {
        source.to_string()
    }
}

/// Normalizes annotation line endings to `\n`; blank annotations become `None`.
pub fn normalize_annotation(annotation: &str) -> Option<String> {
    let normalized = sanitize(annotation).replace("\r\n", "\n").replace('\r', "\n");
    if normalized.trim().is_empty() {
        None
    } else {
        Some(normalized)
    }
}
