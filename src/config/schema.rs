//! Configuration schema for the traffic workbook extension.
//!
//! This module defines the configuration structure and validation logic for
//! every user-configurable capture and export setting.

use serde::{Deserialize, Serialize};

/// Largest number of characters a spreadsheet cell may hold.
pub const EXCEL_MAX_CELL_CHARS: usize = 32_767;

/// Largest number of data rows per sheet (the 1,048,576 row limit minus the header).
pub const EXCEL_MAX_DATA_ROWS: u32 = 1_048_575;

/// Smallest accepted `maxCellChars`, enough for one base64 quantum plus slack.
pub const MIN_CELL_CHARS: usize = 8;

/// Longest sheet base name; leaves room for the " (n)" overflow suffix within
/// the 31 character sheet name limit.
pub const MAX_SHEET_NAME_CHARS: usize = 24;

/// Main configuration structure for the extension.
///
/// All settings can be configured via the host's settings under the
/// "traffic-workbook" key. Missing settings fall back to defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkbookConfig {
    /// Maximum number of transactions held by the capture buffer.
    ///
    /// Must be > 0. Defaults to 10000.
    #[serde(default = "default_max_buffer_entries")]
    pub max_buffer_entries: usize,

    /// What the capture buffer does once `max_buffer_entries` is reached.
    #[serde(default)]
    pub overflow_policy: OverflowPolicy,

    /// Maximum characters written into a single cell.
    ///
    /// Bodies are base64 encoded, so a body may hold at most
    /// `max_cell_chars / 4 * 3` bytes before it is truncated.
    #[serde(default = "default_max_cell_chars")]
    pub max_cell_chars: usize,

    /// Lifts the spreadsheet cell limit on `max_cell_chars`.
    ///
    /// Documents written this way may not open in every spreadsheet tool.
    #[serde(default)]
    pub allow_oversized_cells: bool,

    /// Maximum number of data rows per sheet before a new sheet is opened.
    #[serde(default = "default_max_rows_per_sheet")]
    pub max_rows_per_sheet: u32,

    /// Base name of the worksheets. Overflow sheets get a " (n)" suffix.
    #[serde(default = "default_sheet_name")]
    pub sheet_name: String,

    /// Prefix of the suggested export file name.
    #[serde(default = "default_file_name_prefix")]
    pub file_name_prefix: String,

    /// How many row warnings an export or import summary keeps.
    #[serde(default = "default_max_warnings")]
    pub max_warnings: usize,

    /// Keep the rows written so far when an export is cancelled.
    ///
    /// When false a cancelled export leaves no file behind.
    #[serde(default = "default_keep_partial_on_cancel")]
    pub keep_partial_on_cancel: bool,

    /// Replace credential-bearing header values with `[REDACTED]` on export.
    #[serde(default)]
    pub redact_sensitive_headers: bool,

    /// Hosts whose traffic is never captured.
    #[serde(default)]
    pub excluded_domains: Vec<DomainRule>,
}

/// Capture buffer behaviour once it holds `max_buffer_entries` records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OverflowPolicy {
    /// Drop the oldest record to make room; the eviction is reported.
    #[default]
    EvictOldest,
    /// Reject new records with `CapacityExceeded` until the buffer is cleared.
    HaltCapture,
}

impl OverflowPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverflowPolicy::EvictOldest => "evictOldest",
            OverflowPolicy::HaltCapture => "haltCapture",
        }
    }
}

impl std::fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A domain excluded from capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainRule {
    /// Domain without a leading `www.`.
    pub domain: String,

    /// Also match any subdomain of `domain`.
    #[serde(default)]
    pub include_subdomains: bool,
}

impl DomainRule {
    pub fn new(domain: impl Into<String>, include_subdomains: bool) -> Self {
        Self {
            domain: domain.into(),
            include_subdomains,
        }
    }
}

impl std::fmt::Display for DomainRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.include_subdomains {
            write!(f, "{} (including subdomains)", self.domain)
        } else {
            f.write_str(&self.domain)
        }
    }
}

impl Default for WorkbookConfig {
    fn default() -> Self {
        Self {
            max_buffer_entries: default_max_buffer_entries(),
            overflow_policy: OverflowPolicy::default(),
            max_cell_chars: default_max_cell_chars(),
            allow_oversized_cells: false,
            max_rows_per_sheet: default_max_rows_per_sheet(),
            sheet_name: default_sheet_name(),
            file_name_prefix: default_file_name_prefix(),
            max_warnings: default_max_warnings(),
            keep_partial_on_cancel: default_keep_partial_on_cancel(),
            redact_sensitive_headers: false,
            excluded_domains: Vec::new(),
        }
    }
}

impl WorkbookConfig {
    /// Validates the configuration and returns errors if any settings are invalid.
    ///
    /// # Returns
    ///
    /// `Ok(())` if all settings are valid, or `Err` with a descriptive error message.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_buffer_entries == 0 {
            return Err("maxBufferEntries must be greater than 0".to_string());
        }

        if self.max_cell_chars < MIN_CELL_CHARS {
            return Err(format!(
                "maxCellChars must be at least {}",
                MIN_CELL_CHARS
            ));
        }
        if !self.allow_oversized_cells && self.max_cell_chars > EXCEL_MAX_CELL_CHARS {
            return Err(format!(
                "maxCellChars must not exceed {} unless allowOversizedCells is set",
                EXCEL_MAX_CELL_CHARS
            ));
        }

        if self.max_rows_per_sheet == 0 || self.max_rows_per_sheet > EXCEL_MAX_DATA_ROWS {
            return Err(format!(
                "maxRowsPerSheet must be between 1 and {}",
                EXCEL_MAX_DATA_ROWS
            ));
        }

        validate_sheet_name(&self.sheet_name)?;

        if self.file_name_prefix.trim().is_empty() {
            return Err("fileNamePrefix must not be empty".to_string());
        }

        if let Some(rule) = self
            .excluded_domains
            .iter()
            .find(|rule| rule.domain.trim().is_empty())
        {
            return Err(format!("excludedDomains contains an empty domain: {:?}", rule));
        }

        Ok(())
    }

    /// Merges this configuration with another, using values from `other` where present.
    ///
    /// # Arguments
    ///
    /// * `other` - Configuration to merge with (takes precedence)
    pub fn merge(&self, other: &WorkbookConfig) -> Self {
        Self {
            max_buffer_entries: other.max_buffer_entries,
            overflow_policy: other.overflow_policy,
            max_cell_chars: other.max_cell_chars,
            allow_oversized_cells: other.allow_oversized_cells,
            max_rows_per_sheet: other.max_rows_per_sheet,
            sheet_name: other.sheet_name.clone(),
            file_name_prefix: other.file_name_prefix.clone(),
            max_warnings: other.max_warnings,
            keep_partial_on_cancel: other.keep_partial_on_cancel,
            redact_sensitive_headers: other.redact_sensitive_headers,
            excluded_domains: other.excluded_domains.clone(),
        }
    }
}

fn validate_sheet_name(name: &str) -> Result<(), String> {
    let len = name.chars().count();
    if len == 0 || len > MAX_SHEET_NAME_CHARS {
        return Err(format!(
            "sheetName must be between 1 and {} characters",
            MAX_SHEET_NAME_CHARS
        ));
    }
    if let Some(c) = name.chars().find(|c| "[]:*?/\\".contains(*c)) {
        return Err(format!("sheetName must not contain '{}'", c));
    }
    if name.starts_with('\'') || name.ends_with('\'') {
        return Err("sheetName must not start or end with an apostrophe".to_string());
    }
    Ok(())
}

// Default value functions for serde

fn default_max_buffer_entries() -> usize {
    10_000
}

fn default_max_cell_chars() -> usize {
    EXCEL_MAX_CELL_CHARS
}

fn default_max_rows_per_sheet() -> u32 {
    EXCEL_MAX_DATA_ROWS
}

fn default_sheet_name() -> String {
    "Capture Log".to_string()
}

fn default_file_name_prefix() -> String {
    "CaptureLog".to_string()
}

fn default_max_warnings() -> usize {
    20
}

fn default_keep_partial_on_cancel() -> bool {
    true
}
