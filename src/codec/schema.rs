//! Column layout of each workbook schema version.
//!
//! A document names its schema version in a marker cell at the end of the
//! header row. Readers accept every version up to [`SCHEMA_VERSION`]; column
//! order within a version never changes.

/// Schema version written by this build.
pub const SCHEMA_VERSION: u32 = 1;

/// Prefix of the schema marker cell; the version number follows it.
pub const SCHEMA_MARKER_PREFIX: &str = "traffic-workbook/schema=";

/// One column of a schema version.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Column {
    pub title: &'static str,
    /// Display width in character units.
    pub width: f64,
}

const fn column(title: &'static str, width: f64) -> Column {
    Column { title, width }
}

/// Column indices of schema version 1.
pub mod v1 {
    pub const SEQ: usize = 0;
    pub const TIME: usize = 1;
    pub const TOOL: usize = 2;
    pub const METHOD: usize = 3;
    pub const URL: usize = 4;
    pub const HOST: usize = 5;
    pub const STATUS: usize = 6;
    pub const REQUEST_HEADERS: usize = 7;
    pub const REQUEST_BODY: usize = 8;
    pub const RESPONSE_HEADERS: usize = 9;
    pub const RESPONSE_BODY: usize = 10;
    pub const LATENCY: usize = 11;
    pub const ANNOTATION: usize = 12;
    pub const TRUNCATED: usize = 13;
}

static COLUMNS_V1: [Column; 14] = [
    column("Seq", 8.0),
    column("Time", 28.0),
    column("Tool", 12.0),
    column("Method", 10.0),
    column("URL", 60.0),
    column("Host", 28.0),
    column("Status", 8.0),
    column("Request Headers", 48.0),
    column("Request Body", 40.0),
    column("Response Headers", 48.0),
    column("Response Body", 40.0),
    column("Latency (us)", 14.0),
    column("Annotation", 32.0),
    column("Truncated", 18.0),
];

/// Columns of `version`, or `None` if the version is unknown.
pub fn columns(version: u32) -> Option<&'static [Column]> {
    match version {
        1 => Some(&COLUMNS_V1),
        _ => None,
    }
}

/// Columns of the current schema version.
pub fn current_columns() -> &'static [Column] {
    &COLUMNS_V1
}

/// Text of the schema marker cell for `version`.
pub fn schema_marker(version: u32) -> String {
    format!("{}{}", SCHEMA_MARKER_PREFIX, version)
}

/// Parses a marker cell.
///
/// Returns `None` if `text` is not a marker at all, `Some(Err(text))` if it is
/// a marker whose version cannot be read.
pub fn parse_schema_marker(text: &str) -> Option<Result<u32, String>> {
    let version = text.trim().strip_prefix(SCHEMA_MARKER_PREFIX)?;
    Some(version.trim().parse::<u32>().map_err(|_| text.to_string()))
}

/// `true` if `version` can be read by this build.
pub fn is_supported(version: u32) -> bool {
    columns(version).is_some()
}
