//! Row selection for exports.

use crate::models::Transaction;
use regex::Regex;
use std::fmt;

/// Field an [`ExportFilter`] matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterColumn {
    Host,
    Tool,
    Method,
    Url,
    Status,
    Annotation,
}

impl FilterColumn {
    pub fn title(&self) -> &'static str {
        match self {
            FilterColumn::Host => "Host",
            FilterColumn::Tool => "Tool",
            FilterColumn::Method => "Method",
            FilterColumn::Url => "URL",
            FilterColumn::Status => "Status",
            FilterColumn::Annotation => "Annotation",
        }
    }

    /// Parses a column title, ignoring case.
    pub fn from_title(title: &str) -> Option<Self> {
        [
            FilterColumn::Host,
            FilterColumn::Tool,
            FilterColumn::Method,
            FilterColumn::Url,
            FilterColumn::Status,
            FilterColumn::Annotation,
        ]
        .into_iter()
        .find(|column| column.title().eq_ignore_ascii_case(title.trim()))
    }

    fn value_of(&self, record: &Transaction) -> String {
        match self {
            FilterColumn::Host => record.host(),
            FilterColumn::Tool => record.source().to_string(),
            FilterColumn::Method => record.method().to_string(),
            FilterColumn::Url => record.url().to_string(),
            FilterColumn::Status => record.status().map(|s| s.to_string()).unwrap_or_default(),
            FilterColumn::Annotation => record.annotation().unwrap_or_default().to_string(),
        }
    }
}

impl fmt::Display for FilterColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// Keeps only the records whose `column` matches a pattern.
#[derive(Debug, Clone)]
pub struct ExportFilter {
    column: FilterColumn,
    pattern: Regex,
}

impl ExportFilter {
    /// Case-insensitive substring match on `keyword`.
    ///
    /// # Errors
    ///
    /// Fails only when the keyword exceeds the `regex` size limit.
    pub fn keyword(column: FilterColumn, keyword: &str) -> Result<Self, regex::Error> {
        Self::pattern(column, &format!("(?i){}", regex::escape(keyword)))
    }

    /// Match on a regular expression.
    ///
    /// # Errors
    ///
    /// Returns the `regex` error if `pattern` does not compile.
    pub fn pattern(column: FilterColumn, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            column,
            pattern: Regex::new(pattern)?,
        })
    }

    pub fn column(&self) -> FilterColumn {
        self.column
    }

    pub fn matches(&self, record: &Transaction) -> bool {
        self.pattern.is_match(&self.column.value_of(record))
    }
}

impl fmt::Display for ExportFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ~ /{}/", self.column, self.pattern.as_str())
    }
}
