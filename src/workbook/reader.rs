//! Lazy workbook reader.
//!
//! [`WorkbookReader::open`] checks the container, resolves the sheet list and
//! validates the schema marker in the header row. [`WorkbookReader::rows`]
//! then yields data rows one at a time; only the worksheet being read is held
//! in memory.

use super::xml::{parse_cell_reference, MAX_COLUMNS};
use super::{ReadError, RowFault, SheetRow, WorkbookError};
use crate::codec::{schema, Cell, Row, SCHEMA_VERSION};
use log::{debug, info, warn};
use quick_xml::escape::{resolve_predefined_entity, unescape};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::{Path, PathBuf};
use zip::ZipArchive;

type Archive = ZipArchive<BufReader<File>>;

const WORKBOOK_PART: &str = "xl/workbook.xml";
const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";
const SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";

#[derive(Debug, Clone, PartialEq)]
struct SheetEntry {
    name: String,
    part: String,
}

/// An open workbook whose header has been validated.
pub struct WorkbookReader {
    path: PathBuf,
    archive: Archive,
    sheets: Vec<SheetEntry>,
    shared_strings: Vec<String>,
    schema_version: u32,
}

impl WorkbookReader {
    /// Opens a document and validates its header row.
    ///
    /// # Errors
    ///
    /// - `WorkbookError::Io` if the file cannot be read
    /// - `WorkbookError::CorruptDocument` if it is not a workbook
    /// - `WorkbookError::SchemaMismatch` if the header row carries no schema
    ///   marker or its titles do not match the marked version
    /// - `WorkbookError::UnsupportedSchema` if the marker names a newer version
    pub fn open(path: impl AsRef<Path>) -> Result<Self, WorkbookError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let mut archive = ZipArchive::new(BufReader::new(file)).map_err(|e| match e {
            zip::result::ZipError::Io(io) => WorkbookError::Io(io),
            other => WorkbookError::CorruptDocument(format!("not a ZIP container: {}", other)),
        })?;

        let sheets = read_sheet_list(&mut archive)?;
        let shared_strings = if archive.file_names().any(|name| name == SHARED_STRINGS_PART) {
            let bytes = read_part(&mut archive, SHARED_STRINGS_PART)?;
            parse_shared_strings(&bytes)?
        } else {
            Vec::new()
        };

        let first = &sheets[0];
        let bytes = read_part(&mut archive, &first.part)?;
        let mut cursor = SheetCursor::new(first.name.clone(), 1, bytes);
        let header = loop {
            match cursor.next_row(&shared_strings) {
                Ok(Some((_, row))) if row.is_blank() => continue,
                Ok(Some((_, row))) => break row,
                Ok(None) => {
                    return Err(WorkbookError::SchemaMismatch(format!(
                        "sheet '{}' has no header row",
                        first.name
                    )))
                }
                Err(fault) => {
                    return Err(WorkbookError::SchemaMismatch(format!(
                        "unreadable header row: {}",
                        fault
                    )))
                }
            }
        };
        let schema_version = check_header(&header)?;

        info!(
            "Opened {} (schema version {}, {} sheet(s))",
            path.display(),
            schema_version,
            sheets.len()
        );
        Ok(Self {
            path,
            archive,
            sheets,
            shared_strings,
            schema_version,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Schema version named by the document's marker.
    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    /// Sheet names in workbook order.
    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|s| s.name.clone()).collect()
    }

    /// Consumes the reader and yields its data rows in document order.
    pub fn rows(self) -> SheetRows {
        SheetRows {
            archive: self.archive,
            sheets: self.sheets,
            shared_strings: self.shared_strings,
            next_sheet: 0,
            current: None,
            done: false,
        }
    }
}

impl std::fmt::Debug for WorkbookReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkbookReader")
            .field("path", &self.path)
            .field("sheets", &self.sheets)
            .field("schema_version", &self.schema_version)
            .finish()
    }
}

/// Lazy iterator over the data rows of every sheet.
///
/// Yields `Err(ReadError::Row(_))` for a defective row and keeps going;
/// yields `Err(ReadError::Document(_))` at most once and then ends.
pub struct SheetRows {
    archive: Archive,
    sheets: Vec<SheetEntry>,
    shared_strings: Vec<String>,
    next_sheet: usize,
    current: Option<SheetCursor>,
    done: bool,
}

impl Iterator for SheetRows {
    type Item = Result<SheetRow, ReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }

            if self.current.is_none() {
                let Some(entry) = self.sheets.get(self.next_sheet).cloned() else {
                    self.done = true;
                    return None;
                };
                self.next_sheet += 1;
                match read_part(&mut self.archive, &entry.part) {
                    Ok(bytes) => {
                        debug!("Reading sheet '{}'", entry.name);
                        self.current = Some(SheetCursor::new(entry.name, self.next_sheet, bytes));
                    }
                    Err(e) => {
                        self.done = true;
                        return Some(Err(ReadError::Document(e)));
                    }
                }
            }

            let cursor = self.current.as_mut()?;
            match cursor.next_row(&self.shared_strings) {
                Ok(Some((_, row))) if row.is_blank() => continue,
                Ok(Some(_)) if !cursor.header_seen => {
                    cursor.header_seen = true;
                    continue;
                }
                Ok(Some((row_number, row))) => {
                    return Some(Ok(SheetRow {
                        sheet: cursor.name.clone(),
                        sheet_index: cursor.index,
                        row_number,
                        row,
                    }))
                }
                Ok(None) => {
                    self.current = None;
                }
                Err(fault) => {
                    if fault.row_number.is_none() {
                        warn!("Abandoning the rest of {}", fault);
                        self.current = None;
                    } else if !cursor.header_seen {
                        // A defective first row still counts as the header.
                        cursor.header_seen = true;
                    }
                    return Some(Err(ReadError::Row(fault)));
                }
            }
        }
    }
}

impl std::fmt::Debug for SheetRows {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SheetRows")
            .field("next_sheet", &self.next_sheet)
            .field("done", &self.done)
            .finish()
    }
}

/// Value type of a `<c>` element.
#[derive(Debug, Clone, Copy, PartialEq)]
enum CellKind {
    Number,
    Shared,
    Inline,
    FormulaString,
    Boolean,
    Error,
    Date,
}

impl CellKind {
    fn parse(value: Option<&str>) -> Result<Self, String> {
        match value {
            None | Some("n") => Ok(CellKind::Number),
            Some("s") => Ok(CellKind::Shared),
            Some("inlineStr") => Ok(CellKind::Inline),
            Some("str") => Ok(CellKind::FormulaString),
            Some("b") => Ok(CellKind::Boolean),
            Some("e") => Ok(CellKind::Error),
            Some("d") => Ok(CellKind::Date),
            Some(other) => Err(format!("unknown cell type {:?}", other)),
        }
    }
}

/// Which element's text is being collected.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Capture {
    None,
    Value,
    InlineText,
}

struct PendingCell {
    column: usize,
    kind: CellKind,
    value: String,
    inline: String,
}

/// Streaming position within one worksheet.
struct SheetCursor {
    name: String,
    index: usize,
    reader: Reader<Cursor<Vec<u8>>>,
    last_row: u32,
    header_seen: bool,
}

impl SheetCursor {
    fn new(name: String, index: usize, bytes: Vec<u8>) -> Self {
        Self {
            name,
            index,
            reader: Reader::from_reader(Cursor::new(bytes)),
            last_row: 0,
            header_seen: false,
        }
    }

    fn fault(&self, row_number: Option<u32>, reason: impl Into<String>) -> RowFault {
        RowFault {
            sheet: self.name.clone(),
            sheet_index: self.index,
            row_number,
            reason: reason.into(),
        }
    }

    /// Reads the next `<row>`.
    ///
    /// A fault with a row number covers only that row; one without a row
    /// number means the sheet's XML cannot be read any further.
    fn next_row(&mut self, shared_strings: &[String]) -> Result<Option<(u32, Row)>, RowFault> {
        let mut row_number: Option<u32> = None;
        let mut cells: Vec<Cell> = Vec::new();
        let mut defect: Option<String> = None;
        let mut pending: Option<PendingCell> = None;
        let mut next_column = 0usize;
        let mut capture = Capture::None;
        let mut in_phonetic = false;
        let mut buf = Vec::new();

        loop {
            buf.clear();
            let event = match self.reader.read_event_into(&mut buf) {
                Ok(event) => event,
                Err(e) => {
                    let position = self.reader.buffer_position();
                    return Err(self.fault(
                        None,
                        format!("malformed XML at byte {}: {}", position, e),
                    ));
                }
            };

            match event {
                Event::Start(ref e) | Event::Empty(ref e) if row_number.is_none() => {
                    if e.local_name().as_ref() == b"row" {
                        let number = match attribute(e, b"r") {
                            Some(r) => match r.trim().parse::<u32>() {
                                Ok(n) if n > 0 => n,
                                _ => {
                                    defect = Some(format!("invalid row number {:?}", r));
                                    self.implied_row_number(&mut defect)
                                }
                            },
                            None => self.implied_row_number(&mut defect),
                        };
                        self.last_row = number;
                        if matches!(event, Event::Empty(_)) {
                            return self.finish_row(number, cells, defect);
                        }
                        row_number = Some(number);
                    }
                }
                Event::Start(ref e) | Event::Empty(ref e) => {
                    let is_empty = matches!(event, Event::Empty(_));
                    match e.local_name().as_ref() {
                        b"c" => {
                            let column = match attribute(e, b"r") {
                                Some(r) => match parse_cell_reference(&r) {
                                    Some((column, _)) => column,
                                    None => {
                                        defect.get_or_insert(format!("bad cell reference {:?}", r));
                                        next_column
                                    }
                                },
                                None => next_column,
                            };
                            next_column = column + 1;
                            let kind = match CellKind::parse(attribute(e, b"t").as_deref()) {
                                Ok(kind) => kind,
                                Err(reason) => {
                                    defect.get_or_insert(reason);
                                    CellKind::Number
                                }
                            };
                            if !is_empty {
                                pending = Some(PendingCell {
                                    column,
                                    kind,
                                    value: String::new(),
                                    inline: String::new(),
                                });
                            }
                        }
                        b"v" if !is_empty && pending.is_some() => capture = Capture::Value,
                        b"rPh" if !is_empty => in_phonetic = true,
                        b"t" if !is_empty && pending.is_some() && !in_phonetic => {
                            capture = Capture::InlineText
                        }
                        _ => {}
                    }
                }
                Event::Text(ref e) if capture != Capture::None => {
                    let decoded = std::str::from_utf8(e.as_ref())
                        .map_err(|err| err.to_string())
                        .and_then(|raw| {
                            unescape(raw)
                                .map(|s| s.into_owned())
                                .map_err(|err| err.to_string())
                        });
                    match decoded {
                        Ok(text) => push_captured(&mut pending, capture, &text),
                        Err(reason) => {
                            defect.get_or_insert(format!("undecodable text: {}", reason));
                        }
                    }
                }
                Event::CData(ref e) if capture != Capture::None => {
                    let text = String::from_utf8_lossy(e.as_ref()).into_owned();
                    push_captured(&mut pending, capture, &text);
                }
                Event::GeneralRef(ref e) if capture != Capture::None => {
                    let resolved = match e.resolve_char_ref() {
                        Ok(Some(c)) => Some(c.to_string()),
                        Ok(None) => std::str::from_utf8(e.as_ref())
                            .ok()
                            .and_then(resolve_predefined_entity)
                            .map(str::to_string),
                        Err(_) => None,
                    };
                    match resolved {
                        Some(text) => push_captured(&mut pending, capture, &text),
                        None => {
                            defect.get_or_insert(format!(
                                "unknown entity &{};",
                                String::from_utf8_lossy(e.as_ref())
                            ));
                        }
                    }
                }
                Event::End(ref e) => match e.local_name().as_ref() {
                    b"v" | b"t" => capture = Capture::None,
                    b"rPh" => in_phonetic = false,
                    b"c" => {
                        if let Some(cell) = pending.take() {
                            match resolve_cell(&cell, shared_strings) {
                                Ok(value) => place(&mut cells, cell.column, value),
                                Err(reason) => {
                                    defect.get_or_insert(reason);
                                }
                            }
                        }
                    }
                    b"row" => {
                        if let Some(number) = row_number {
                            return self.finish_row(number, cells, defect);
                        }
                    }
                    b"sheetData" => return Ok(None),
                    _ => {}
                },
                Event::Eof => {
                    return match row_number {
                        Some(number) => Err(self.fault(
                            None,
                            format!("document ends inside row {}", number),
                        )),
                        None => Ok(None),
                    };
                }
                _ => {}
            }
        }
    }

    /// Number of a row that does not state a usable one of its own.
    fn implied_row_number(&self, defect: &mut Option<String>) -> u32 {
        match self.last_row.checked_add(1) {
            Some(number) => number,
            None => {
                defect.get_or_insert_with(|| {
                    format!("row number overflow after row {}", self.last_row)
                });
                self.last_row
            }
        }
    }

    fn finish_row(
        &self,
        number: u32,
        cells: Vec<Cell>,
        defect: Option<String>,
    ) -> Result<Option<(u32, Row)>, RowFault> {
        match defect {
            Some(reason) => Err(self.fault(Some(number), reason)),
            None => Ok(Some((number, Row::new(cells)))),
        }
    }
}

fn push_captured(pending: &mut Option<PendingCell>, capture: Capture, text: &str) {
    if let Some(cell) = pending.as_mut() {
        match capture {
            Capture::Value => cell.value.push_str(text),
            Capture::InlineText => cell.inline.push_str(text),
            Capture::None => {}
        }
    }
}

fn place(cells: &mut Vec<Cell>, column: usize, value: Cell) {
    if column >= MAX_COLUMNS {
        return;
    }
    if cells.len() <= column {
        cells.resize(column + 1, Cell::Empty);
    }
    cells[column] = value;
}

fn resolve_cell(cell: &PendingCell, shared_strings: &[String]) -> Result<Cell, String> {
    let value = cell.value.trim();
    match cell.kind {
        CellKind::Inline => Ok(Cell::Text(cell.inline.clone())),
        CellKind::Number if value.is_empty() => Ok(Cell::Empty),
        CellKind::Number => value
            .parse::<f64>()
            .map(Cell::Number)
            .map_err(|_| format!("unparsable number {:?}", value)),
        CellKind::Shared => {
            let index = value
                .parse::<usize>()
                .map_err(|_| format!("bad shared string index {:?}", value))?;
            shared_strings
                .get(index)
                .map(|s| Cell::Text(s.clone()))
                .ok_or_else(|| format!("shared string {} does not exist", index))
        }
        CellKind::FormulaString | CellKind::Error | CellKind::Date => {
            Ok(Cell::Text(cell.value.clone()))
        }
        CellKind::Boolean => match value {
            "1" | "true" => Ok(Cell::Number(1.0)),
            "0" | "false" => Ok(Cell::Number(0.0)),
            other => Err(format!("bad boolean {:?}", other)),
        },
    }
}

/// Unescaped value of the attribute whose local name is `name`.
fn attribute(element: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|attr| attr.key.local_name().as_ref() == name)
        .and_then(|attr| attr.unescape_value().ok().map(|v| v.into_owned()))
}

/// Validates a header row and returns the schema version it names.
fn check_header(header: &Row) -> Result<u32, WorkbookError> {
    let marker = header
        .cells()
        .iter()
        .filter_map(Cell::as_text)
        .find_map(schema::parse_schema_marker);

    let version = match marker {
        None => {
            return Err(WorkbookError::SchemaMismatch(
                "header row has no schema marker".to_string(),
            ))
        }
        Some(Err(text)) => {
            return Err(WorkbookError::SchemaMismatch(format!(
                "unreadable schema marker {:?}",
                text
            )))
        }
        Some(Ok(version)) => version,
    };

    let columns = match schema::columns(version) {
        Some(columns) => columns,
        None => {
            return Err(WorkbookError::UnsupportedSchema {
                found: version,
                supported: SCHEMA_VERSION,
            })
        }
    };

    for (index, column) in columns.iter().enumerate() {
        let found = header.get(index).display_text();
        if found.trim() != column.title {
            return Err(WorkbookError::SchemaMismatch(format!(
                "column {} is {:?}, expected {:?}",
                index + 1,
                found,
                column.title
            )));
        }
    }
    Ok(version)
}

fn read_part(archive: &mut Archive, name: &str) -> Result<Vec<u8>, WorkbookError> {
    let mut part = archive.by_name(name).map_err(|e| match e {
        zip::result::ZipError::FileNotFound => {
            WorkbookError::CorruptDocument(format!("missing part {}", name))
        }
        other => WorkbookError::from(other),
    })?;
    let mut bytes = Vec::with_capacity(part.size().min(64 * 1024 * 1024) as usize);
    part.read_to_end(&mut bytes)?;
    Ok(bytes)
}

/// Resolves the sheets named in `xl/workbook.xml`, in workbook order.
fn read_sheet_list(archive: &mut Archive) -> Result<Vec<SheetEntry>, WorkbookError> {
    let workbook = read_part(archive, WORKBOOK_PART)?;
    let rels = read_part(archive, WORKBOOK_RELS_PART)?;

    let targets = parse_relationships(&rels)?;
    let mut sheets = Vec::new();
    for (name, rel_id) in parse_sheet_refs(&workbook)? {
        let target = targets.get(&rel_id).ok_or_else(|| {
            WorkbookError::CorruptDocument(format!(
                "sheet '{}' refers to unknown relationship {}",
                name, rel_id
            ))
        })?;
        let part = match target.strip_prefix('/') {
            Some(absolute) => absolute.to_string(),
            None => format!("xl/{}", target),
        };
        sheets.push(SheetEntry { name, part });
    }

    if sheets.is_empty() {
        return Err(WorkbookError::CorruptDocument(
            "workbook has no sheets".to_string(),
        ));
    }

    let names: HashSet<&str> = archive.file_names().collect();
    if let Some(missing) = sheets.iter().find(|s| !names.contains(s.part.as_str())) {
        return Err(WorkbookError::CorruptDocument(format!(
            "sheet '{}' part {} is missing",
            missing.name, missing.part
        )));
    }
    Ok(sheets)
}

fn xml_error(part: &str, err: impl std::fmt::Display) -> WorkbookError {
    WorkbookError::Xml {
        part: part.to_string(),
        message: err.to_string(),
    }
}

fn parse_sheet_refs(bytes: &[u8]) -> Result<Vec<(String, String)>, WorkbookError> {
    let mut reader = Reader::from_reader(bytes);
    let mut buf = Vec::new();
    let mut refs = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e))
                if e.local_name().as_ref() == b"sheet" =>
            {
                if let (Some(name), Some(id)) = (attribute(e, b"name"), attribute(e, b"id")) {
                    refs.push((name, id));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(WORKBOOK_PART, e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(refs)
}

fn parse_relationships(bytes: &[u8]) -> Result<HashMap<String, String>, WorkbookError> {
    let mut reader = Reader::from_reader(bytes);
    let mut buf = Vec::new();
    let mut targets = HashMap::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e))
                if e.local_name().as_ref() == b"Relationship" =>
            {
                if let (Some(id), Some(target)) = (attribute(e, b"Id"), attribute(e, b"Target")) {
                    targets.insert(id, target);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(WORKBOOK_RELS_PART, e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(targets)
}

/// Reads `xl/sharedStrings.xml`; rich-text runs are concatenated and
/// phonetic hints dropped.
fn parse_shared_strings(bytes: &[u8]) -> Result<Vec<String>, WorkbookError> {
    let mut reader = Reader::from_reader(bytes);
    let mut buf = Vec::new();
    let mut strings = Vec::new();
    let mut current: Option<String> = None;
    let mut in_text = false;
    let mut in_phonetic = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"rPh" => in_phonetic = true,
                b"t" if !in_phonetic => in_text = true,
                _ => {}
            },
            Ok(Event::Empty(ref e)) if e.local_name().as_ref() == b"si" => {
                strings.push(String::new());
            }
            Ok(Event::Text(ref e)) if in_text => {
                let raw = std::str::from_utf8(e.as_ref())
                    .map_err(|err| xml_error(SHARED_STRINGS_PART, err))?;
                let text = unescape(raw).map_err(|err| xml_error(SHARED_STRINGS_PART, err))?;
                if let Some(s) = current.as_mut() {
                    s.push_str(&text);
                }
            }
            Ok(Event::GeneralRef(ref e)) if in_text => {
                let resolved = match e.resolve_char_ref() {
                    Ok(Some(c)) => Some(c.to_string()),
                    _ => std::str::from_utf8(e.as_ref())
                        .ok()
                        .and_then(resolve_predefined_entity)
                        .map(str::to_string),
                };
                if let (Some(s), Some(text)) = (current.as_mut(), resolved) {
                    s.push_str(&text);
                }
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"rPh" => in_phonetic = false,
                b"si" => {
                    if let Some(s) = current.take() {
                        strings.push(s);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(SHARED_STRINGS_PART, e)),
            _ => {}
        }
        buf.clear();
    }
    debug!("Loaded {} shared strings", strings.len());
    Ok(strings)
}
