//! Streaming workbook writer.
//!
//! Rows go straight into the open worksheet part of the ZIP container; only
//! the current row is held in memory. The document is built in `<path>.part`
//! and renamed into place by [`WorkbookWriter::finalize`], so a failed or
//! abandoned export never leaves a half-written document at the target path.

use super::xml;
use super::WorkbookError;
use crate::codec::{schema, Cell, Row, SCHEMA_VERSION};
use crate::config::WorkbookConfig;
use log::{debug, info, warn};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Settings of one writer.
#[derive(Debug, Clone, PartialEq)]
pub struct WriterOptions {
    /// Name of the first sheet; overflow sheets are named `"<base> (n)"`.
    pub sheet_name: String,
    /// Data rows per sheet, header excluded.
    pub max_rows_per_sheet: u32,
}

impl WriterOptions {
    pub fn from_config(config: &WorkbookConfig) -> Self {
        Self {
            sheet_name: config.sheet_name.clone(),
            max_rows_per_sheet: config.max_rows_per_sheet,
        }
    }
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self::from_config(&WorkbookConfig::default())
    }
}

/// What a finalized document contains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkbookStats {
    pub path: PathBuf,
    /// Sheet names in workbook order.
    pub sheets: Vec<String>,
    /// Data rows across all sheets.
    pub rows: u64,
}

impl WorkbookStats {
    pub fn sheet_count(&self) -> usize {
        self.sheets.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    SheetOpen,
    Finalized,
    Discarded,
}

/// Streams rows into a new `.xlsx` document.
pub struct WorkbookWriter {
    path: PathBuf,
    part_path: PathBuf,
    options: WriterOptions,
    zip: Option<ZipWriter<BufWriter<File>>>,
    state: WriterState,
    sheets: Vec<String>,
    sheet_rows: u32,
    total_rows: u64,
    columns: &'static [schema::Column],
    scratch: String,
}

impl WorkbookWriter {
    /// Creates `<path>.part` and opens the first sheet with its header row.
    ///
    /// # Errors
    ///
    /// `WorkbookError::Io` if the file cannot be created.
    pub fn create(path: impl AsRef<Path>, options: WriterOptions) -> Result<Self, WorkbookError> {
        let path = path.as_ref().to_path_buf();
        let part_path = part_path_for(&path);
        let file = File::create(&part_path)?;

        let mut writer = Self {
            path,
            part_path,
            options,
            zip: Some(ZipWriter::new(BufWriter::new(file))),
            state: WriterState::SheetOpen,
            sheets: Vec::new(),
            sheet_rows: 0,
            total_rows: 0,
            columns: schema::current_columns(),
            scratch: String::with_capacity(4096),
        };

        if let Err(e) = writer.open_sheet() {
            writer.discard();
            return Err(e);
        }
        debug!("Writing workbook to {}", writer.part_path.display());
        Ok(writer)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Name of the sheet the next row goes to.
    pub fn current_sheet(&self) -> &str {
        self.sheets.last().map(String::as_str).unwrap_or_default()
    }

    /// Data rows written so far across all sheets.
    pub fn rows_written(&self) -> u64 {
        self.total_rows
    }

    pub fn is_finalized(&self) -> bool {
        self.state == WriterState::Finalized
    }

    /// Appends one data row, opening an overflow sheet when the current one is full.
    ///
    /// # Errors
    ///
    /// - `WorkbookError::ClosedWriter` after `finalize` or `discard`
    /// - `WorkbookError::Io` / `WorkbookError::Zip` on write failures
    pub fn write_row(&mut self, row: &Row) -> Result<(), WorkbookError> {
        if self.state != WriterState::SheetOpen {
            return Err(WorkbookError::ClosedWriter);
        }

        if self.sheet_rows >= self.options.max_rows_per_sheet {
            self.close_sheet()?;
            self.open_sheet()?;
            info!(
                "Sheet row limit reached; continuing in sheet '{}'",
                self.current_sheet()
            );
        }

        let row_number = self.sheet_rows + 2;
        self.scratch.clear();
        encode_row(&mut self.scratch, row_number, row.cells(), None);
        let zip = self.zip.as_mut().ok_or(WorkbookError::ClosedWriter)?;
        zip.write_all(self.scratch.as_bytes())?;

        self.sheet_rows += 1;
        self.total_rows += 1;
        Ok(())
    }

    /// Closes the last sheet, writes the workbook parts, and moves the
    /// document to its final path.
    ///
    /// On failure the part file is removed and the writer is closed.
    pub fn finalize(&mut self) -> Result<WorkbookStats, WorkbookError> {
        if self.state != WriterState::SheetOpen {
            return Err(WorkbookError::ClosedWriter);
        }

        match self.finish_container() {
            Ok(()) => {
                self.state = WriterState::Finalized;
                info!(
                    "Wrote {} rows in {} sheet(s) to {}",
                    self.total_rows,
                    self.sheets.len(),
                    self.path.display()
                );
                Ok(WorkbookStats {
                    path: self.path.clone(),
                    sheets: self.sheets.clone(),
                    rows: self.total_rows,
                })
            }
            Err(e) => {
                self.discard();
                Err(e)
            }
        }
    }

    /// Abandons the document and removes the part file.
    pub fn discard(&mut self) {
        if self.state == WriterState::Finalized {
            return;
        }
        self.state = WriterState::Discarded;
        // The container must be released before its file can be removed.
        drop(self.zip.take());
        match fs::remove_file(&self.part_path) {
            Ok(()) => debug!("Removed {}", self.part_path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {}: {}", self.part_path.display(), e),
        }
    }

    fn entry_options() -> SimpleFileOptions {
        SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(zip::DateTime::default())
    }

    fn open_sheet(&mut self) -> Result<(), WorkbookError> {
        let index = self.sheets.len() + 1;
        let name = if index == 1 {
            self.options.sheet_name.clone()
        } else {
            format!("{} ({})", self.options.sheet_name, index)
        };

        let zip = self.zip.as_mut().ok_or(WorkbookError::ClosedWriter)?;
        zip.start_file(format!("xl/worksheets/sheet{}.xml", index), Self::entry_options())?;
        zip.write_all(xml::sheet_prologue(self.columns).as_bytes())?;

        let mut header: Vec<Cell> = self.columns.iter().map(|c| Cell::text(c.title)).collect();
        header.push(Cell::Text(schema::schema_marker(SCHEMA_VERSION)));
        self.scratch.clear();
        encode_row(&mut self.scratch, 1, &header, Some(xml::HEADER_STYLE));
        zip.write_all(self.scratch.as_bytes())?;

        self.sheets.push(name);
        self.sheet_rows = 0;
        Ok(())
    }

    fn close_sheet(&mut self) -> Result<(), WorkbookError> {
        let zip = self.zip.as_mut().ok_or(WorkbookError::ClosedWriter)?;
        zip.write_all(xml::SHEET_EPILOGUE.as_bytes())?;
        Ok(())
    }

    fn finish_container(&mut self) -> Result<(), WorkbookError> {
        self.close_sheet()?;

        let parts = [
            ("xl/workbook.xml", xml::workbook_part(&self.sheets)),
            (
                "xl/_rels/workbook.xml.rels",
                xml::workbook_rels_part(self.sheets.len()),
            ),
            ("xl/styles.xml", xml::styles_part()),
            ("_rels/.rels", xml::root_rels_part()),
            ("[Content_Types].xml", xml::content_types_part(self.sheets.len())),
        ];

        let mut zip = self.zip.take().ok_or(WorkbookError::ClosedWriter)?;
        for (name, content) in parts {
            zip.start_file(name, Self::entry_options())?;
            zip.write_all(content.as_bytes())?;
        }

        let file = zip
            .finish()?
            .into_inner()
            .map_err(|e| WorkbookError::Io(e.into_error()))?;
        file.sync_all()?;
        drop(file);

        fs::rename(&self.part_path, &self.path)?;
        Ok(())
    }
}

impl Drop for WorkbookWriter {
    fn drop(&mut self) {
        if self.state == WriterState::SheetOpen {
            debug!(
                "Workbook writer for {} dropped before finalize",
                self.path.display()
            );
            self.discard();
        }
    }
}

impl std::fmt::Debug for WorkbookWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkbookWriter")
            .field("path", &self.path)
            .field("state", &self.state)
            .field("sheets", &self.sheets)
            .field("rows", &self.total_rows)
            .finish()
    }
}

/// Path of the temporary file a writer for `path` streams into.
pub fn part_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

fn encode_row(out: &mut String, row_number: u32, cells: &[Cell], style: Option<u32>) {
    use std::fmt::Write as _;
    let _ = write!(out, r#"<row r="{}">"#, row_number);
    for (index, cell) in cells.iter().enumerate() {
        let reference = format!("{}{}", xml::column_letters(index), row_number);
        match cell {
            Cell::Empty => {}
            Cell::Text(text) => xml::push_text_cell(out, &reference, text, style),
            Cell::Number(value) => xml::push_number_cell(out, &reference, *value),
        }
    }
    out.push_str("</row>");
}
