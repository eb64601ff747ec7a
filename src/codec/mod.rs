//! Mapping between transactions and flat workbook rows.
//!
//! - **schema**: versioned column layouts and the schema marker
//! - **row**: [`RowCodec`], the transaction ↔ row conversion

pub mod row;
pub mod schema;

pub use row::{EncodedRow, RowCodec};
pub use schema::{Column, SCHEMA_VERSION};

/// A single typed cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Cell::Text(value.into())
    }

    /// `true` for empty cells and empty strings.
    pub fn is_blank(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(text) => text.is_empty(),
            Cell::Number(_) => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Text a spreadsheet would display for this cell.
    pub fn display_text(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(text) => text.clone(),
            Cell::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            Cell::Number(n) => n.to_string(),
        }
    }
}

/// Flat tuple of cells laid out per a schema version.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    cells: Vec<Cell>,
}

impl Row {
    pub fn new(cells: Vec<Cell>) -> Self {
        Self { cells }
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn into_cells(self) -> Vec<Cell> {
        self.cells
    }

    /// Cell at `index`; missing trailing cells read as [`Cell::Empty`].
    pub fn get(&self, index: usize) -> &Cell {
        self.cells.get(index).unwrap_or(&Cell::Empty)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// `true` if no cell holds a value.
    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(Cell::is_blank)
    }
}

/// Why a single row could not be turned into a transaction.
///
/// Row errors never abort an import; the row is skipped and reported.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RowError {
    /// The row does not fit the declared column layout.
    #[error("row does not match the column layout: {detail}")]
    SchemaMismatch { detail: String },

    /// A required cell could not be coerced to its expected type.
    #[error("malformed cell in column {column}: {reason}")]
    MalformedCell {
        column: &'static str,
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_get_pads_with_empty() {
        let row = Row::new(vec![Cell::Number(1.0)]);
        assert_eq!(row.get(0), &Cell::Number(1.0));
        assert_eq!(row.get(5), &Cell::Empty);
    }

    #[test]
    fn test_blank_rows() {
        assert!(Row::default().is_blank());
        assert!(Row::new(vec![Cell::Empty, Cell::text("")]).is_blank());
        assert!(!Row::new(vec![Cell::Empty, Cell::Number(0.0)]).is_blank());
    }

    #[test]
    fn test_display_text() {
        assert_eq!(Cell::Number(404.0).display_text(), "404");
        assert_eq!(Cell::Number(1.5).display_text(), "1.5");
        assert_eq!(Cell::text("x").display_text(), "x");
        assert_eq!(Cell::Empty.display_text(), "");
    }

    #[test]
    fn test_row_error_display() {
        let err = RowError::MalformedCell {
            column: "Status",
            reason: "not a number: \"abc\"".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "malformed cell in column Status: not a number: \"abc\""
        );
    }
}
