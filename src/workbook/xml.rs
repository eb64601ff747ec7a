//! SpreadsheetML part templates and cell-level XML helpers.

use crate::codec::Column;
use crate::models::text::sanitize;
use quick_xml::escape::escape;
use std::borrow::Cow;
use std::fmt::Write as _;

pub const MAIN_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
pub const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

const XML_DECL: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;

/// Largest column count a sheet may have (`XFD`).
pub const MAX_COLUMNS: usize = 16_384;

/// Style index of the bold header font in `xl/styles.xml`.
pub const HEADER_STYLE: u32 = 1;

/// Converts a zero-based column index to its letters (`0` → `A`, `27` → `AB`).
pub fn column_letters(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// Splits a cell reference such as `AB12` into its zero-based column index
/// and one-based row number.
pub fn parse_cell_reference(reference: &str) -> Option<(usize, Option<u32>)> {
    let reference = reference.trim().replace('$', "");
    let split = reference
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(reference.len());
    let (letters, digits) = reference.split_at(split);
    if letters.is_empty() || letters.len() > 3 {
        return None;
    }

    let mut column = 0usize;
    for c in letters.chars() {
        column = column * 26 + (c.to_ascii_uppercase() as u8 - b'A') as usize + 1;
    }
    if column > MAX_COLUMNS {
        return None;
    }

    let row = if digits.is_empty() {
        None
    } else {
        Some(digits.parse::<u32>().ok().filter(|r| *r > 0)?)
    };
    Some((column - 1, row))
}

/// Escapes text for element content or attribute values.
///
/// Carriage returns are written as character references so XML end-of-line
/// handling in other readers cannot fold them into line feeds.
pub fn escape_text(text: &str) -> Cow<'_, str> {
    let escaped = match sanitize(text) {
        Cow::Borrowed(clean) => escape(clean),
        Cow::Owned(clean) => Cow::Owned(escape(clean.as_str()).into_owned()),
    };
    if escaped.contains('\r') {
        Cow::Owned(escaped.replace('\r', "&#13;"))
    } else {
        escaped
    }
}

/// Appends an inline string cell.
pub fn push_text_cell(out: &mut String, reference: &str, text: &str, style: Option<u32>) {
    let _ = write!(out, r#"<c r="{}""#, reference);
    if let Some(style) = style {
        let _ = write!(out, r#" s="{}""#, style);
    }
    let _ = write!(
        out,
        r#" t="inlineStr"><is><t xml:space="preserve">{}</t></is></c>"#,
        escape_text(text)
    );
}

/// Appends a numeric cell. Non-finite values are written as text.
pub fn push_number_cell(out: &mut String, reference: &str, value: f64) {
    if !value.is_finite() {
        push_text_cell(out, reference, &value.to_string(), None);
        return;
    }
    let _ = write!(
        out,
        r#"<c r="{}"><v>{}</v></c>"#,
        reference,
        format_number(value)
    );
}

/// Shortest text that reads back as `value`.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// Opening of a worksheet part, up to and including `<sheetData>`.
pub fn sheet_prologue(columns: &[Column]) -> String {
    let mut out = String::with_capacity(1024);
    out.push_str(XML_DECL);
    let _ = write!(
        out,
        r#"<worksheet xmlns="{}" xmlns:r="{}">"#,
        MAIN_NS, REL_NS
    );
    out.push_str(
        r#"<sheetViews><sheetView workbookViewId="0"><pane ySplit="1" topLeftCell="A2" activePane="bottomLeft" state="frozen"/></sheetView></sheetViews>"#,
    );
    out.push_str(r#"<sheetFormatPr defaultRowHeight="15"/><cols>"#);
    for (index, column) in columns.iter().enumerate() {
        let _ = write!(
            out,
            r#"<col min="{0}" max="{0}" width="{1}" customWidth="1"/>"#,
            index + 1,
            format_number(column.width)
        );
    }
    // Schema marker column.
    let _ = write!(
        out,
        r#"<col min="{0}" max="{0}" width="0" hidden="1" customWidth="1"/>"#,
        columns.len() + 1
    );
    out.push_str("</cols><sheetData>");
    out
}

pub const SHEET_EPILOGUE: &str = "</sheetData></worksheet>";

pub fn workbook_part(sheet_names: &[String]) -> String {
    let mut out = String::with_capacity(512);
    out.push_str(XML_DECL);
    let _ = write!(
        out,
        r#"<workbook xmlns="{}" xmlns:r="{}"><bookViews><workbookView/></bookViews><sheets>"#,
        MAIN_NS, REL_NS
    );
    for (index, name) in sheet_names.iter().enumerate() {
        let _ = write!(
            out,
            r#"<sheet name="{}" sheetId="{}" r:id="rId{}"/>"#,
            escape_text(name),
            index + 1,
            index + 1
        );
    }
    out.push_str("</sheets></workbook>");
    out
}

pub fn workbook_rels_part(sheet_count: usize) -> String {
    let mut out = String::with_capacity(512);
    out.push_str(XML_DECL);
    out.push_str(
        r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    );
    for index in 1..=sheet_count {
        let _ = write!(
            out,
            r#"<Relationship Id="rId{0}" Type="{1}/worksheet" Target="worksheets/sheet{0}.xml"/>"#,
            index, REL_NS
        );
    }
    let _ = write!(
        out,
        r#"<Relationship Id="rId{}" Type="{}/styles" Target="styles.xml"/>"#,
        sheet_count + 1,
        REL_NS
    );
    out.push_str("</Relationships>");
    out
}

pub fn root_rels_part() -> String {
    format!(
        r#"{}<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="{}/officeDocument" Target="xl/workbook.xml"/></Relationships>"#,
        XML_DECL, REL_NS
    )
}

pub fn content_types_part(sheet_count: usize) -> String {
    let mut out = String::with_capacity(1024);
    out.push_str(XML_DECL);
    out.push_str(
        r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>"#,
    );
    for index in 1..=sheet_count {
        let _ = write!(
            out,
            r#"<Override PartName="/xl/worksheets/sheet{}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#,
            index
        );
    }
    out.push_str("</Types>");
    out
}

/// Two fonts (regular, bold) and two cell formats; format 1 is the header.
pub fn styles_part() -> String {
    format!(
        r#"{}<styleSheet xmlns="{}"><fonts count="2"><font><sz val="11"/><name val="Calibri"/></font><font><b/><sz val="11"/><name val="Calibri"/></font></fonts><fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills><borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders><cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs><cellXfs count="2"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/><xf numFmtId="0" fontId="1" fillId="0" borderId="0" xfId="0" applyFont="1"/></cellXfs><cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles></styleSheet>"#,
        XML_DECL, MAIN_NS
    )
}
