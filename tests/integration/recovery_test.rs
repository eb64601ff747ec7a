//! Import of damaged and foreign documents.

use super::{init_test_env, sample_exchange};
use std::fs;
use std::io::Write;
use tempfile::TempDir;
use traffic_workbook::codec::schema::v1;
use traffic_workbook::codec::{Cell, Row, RowCodec};
use traffic_workbook::models::Transaction;
use traffic_workbook::transfer::{
    import_workbook, NeverCancel, TransferError, TransferOptions, TransferStatus,
};
use traffic_workbook::workbook::{WorkbookError, WorkbookWriter, WriterOptions};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

fn write_rows(path: &std::path::Path, rows: Vec<Row>) {
    let mut writer = WorkbookWriter::create(path, WriterOptions::default()).unwrap();
    for row in &rows {
        writer.write_row(row).unwrap();
    }
    writer.finalize().unwrap();
}

fn valid_row(codec: &RowCodec, n: usize) -> Row {
    codec
        .to_row(&Transaction::from_exchange(n as u64 + 1, sample_exchange(n)))
        .row
}

#[test]
fn test_one_malformed_row_among_valid_ones() {
    init_test_env();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("damaged.xlsx");
    let codec = RowCodec::default();
    let valid = 30;

    let mut rows: Vec<Row> = (0..valid).map(|n| valid_row(&codec, n)).collect();
    let mut broken = valid_row(&codec, 99).into_cells();
    broken[v1::TIME] = Cell::text("yesterday-ish");
    rows.insert(12, Row::new(broken));
    write_rows(&path, rows);

    let mut restored: Vec<Transaction> = Vec::new();
    let summary =
        import_workbook(&path, &TransferOptions::default(), &mut restored, &NeverCancel).unwrap();

    assert_eq!(summary.status, TransferStatus::Completed);
    assert_eq!(summary.rows_imported, valid as u64);
    assert_eq!(summary.rows_skipped, 1);
    assert_eq!(summary.warnings.len(), 1);
    assert!(summary.warnings[0].contains("row 14"), "{}", summary.warnings[0]);
}

#[test]
fn test_warnings_are_capped() {
    init_test_env();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("many-bad.xlsx");
    let codec = RowCodec::default();

    let rows: Vec<Row> = (0..8)
        .map(|n| {
            let mut cells = valid_row(&codec, n).into_cells();
            cells[v1::METHOD] = Cell::Empty;
            Row::new(cells)
        })
        .collect();
    write_rows(&path, rows);

    let options = TransferOptions {
        max_warnings: 3,
        ..Default::default()
    };
    let mut restored: Vec<Transaction> = Vec::new();
    let summary = import_workbook(&path, &options, &mut restored, &NeverCancel).unwrap();

    assert_eq!(summary.rows_skipped, 8);
    assert_eq!(summary.warnings.len(), 3);
    assert_eq!(summary.warnings_dropped, 5);
    assert!(restored.is_empty());
}

#[test]
fn test_foreign_spreadsheet_is_rejected() {
    init_test_env();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("foreign.xlsx");

    let file = fs::File::create(&path).unwrap();
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default();
    zip.start_file("[Content_Types].xml", options).unwrap();
    zip.write_all(b"<?xml version=\"1.0\"?><Types/>").unwrap();
    zip.start_file("xl/workbook.xml", options).unwrap();
    zip.write_all(
        br#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Budget" sheetId="1" r:id="rId1"/></sheets></workbook>"#,
    )
    .unwrap();
    zip.start_file("xl/_rels/workbook.xml.rels", options).unwrap();
    zip.write_all(
        br#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#,
    )
    .unwrap();
    zip.start_file("xl/worksheets/sheet1.xml", options).unwrap();
    zip.write_all(
        br#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData><row r="1"><c r="A1" t="inlineStr"><is><t>Item</t></is></c><c r="B1" t="inlineStr"><is><t>Cost</t></is></c></row></sheetData></worksheet>"#,
    )
    .unwrap();
    zip.finish().unwrap();

    let mut restored: Vec<Transaction> = Vec::new();
    let err = import_workbook(&path, &TransferOptions::default(), &mut restored, &NeverCancel)
        .unwrap_err();
    match err {
        TransferError::Open { source, .. } => assert!(
            matches!(source, WorkbookError::SchemaMismatch(_)),
            "unexpected error: {}",
            source
        ),
        other => panic!("unexpected error: {}", other),
    }
    assert!(restored.is_empty());
}

#[test]
fn test_truncated_container_is_corrupt() {
    init_test_env();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cut.xlsx");
    let codec = RowCodec::default();
    write_rows(&path, (0..5).map(|n| valid_row(&codec, n)).collect());

    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();

    let mut restored: Vec<Transaction> = Vec::new();
    let err = import_workbook(&path, &TransferOptions::default(), &mut restored, &NeverCancel)
        .unwrap_err();
    assert!(matches!(err, TransferError::Open { .. }));
}

/// Rewrites the archive at `path` without the entry `part`.
fn drop_part(path: &std::path::Path, part: &str) {
    let mut source = zip::ZipArchive::new(fs::File::open(path).unwrap()).unwrap();
    let mut entries = Vec::new();
    for index in 0..source.len() {
        let mut entry = source.by_index(index).unwrap();
        let name = entry.name().to_string();
        let mut bytes = Vec::new();
        std::io::Read::read_to_end(&mut entry, &mut bytes).unwrap();
        if name != part {
            entries.push((name, bytes));
        }
    }
    drop(source);

    let mut zip = ZipWriter::new(fs::File::create(path).unwrap());
    for (name, bytes) in entries {
        zip.start_file(name, SimpleFileOptions::default()).unwrap();
        zip.write_all(&bytes).unwrap();
    }
    zip.finish().unwrap();
}

#[test]
fn test_failure_on_later_sheet_reports_progress() {
    init_test_env();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("two-sheets.xlsx");
    let codec = RowCodec::default();

    let mut writer = WorkbookWriter::create(
        &path,
        WriterOptions {
            max_rows_per_sheet: 4,
            ..Default::default()
        },
    )
    .unwrap();
    for n in 0..7 {
        let mut cells = valid_row(&codec, n).into_cells();
        if n == 1 {
            cells[v1::STATUS] = Cell::text("teapot");
        }
        writer.write_row(&Row::new(cells)).unwrap();
    }
    writer.finalize().unwrap();
    drop_part(&path, "xl/worksheets/sheet2.xml");

    let mut restored: Vec<Transaction> = Vec::new();
    let err = import_workbook(&path, &TransferOptions::default(), &mut restored, &NeverCancel)
        .unwrap_err();

    assert!(matches!(err, TransferError::Read { .. }), "unexpected error: {}", err);
    let partial = err.partial_import().expect("read failures carry progress");
    assert_eq!(partial.rows_imported, 3);
    assert_eq!(partial.rows_skipped, 1);
    assert_eq!(partial.warnings.len(), 1);
    assert!(partial.warnings[0].contains("Status"), "{}", partial.warnings[0]);
    assert!(matches!(partial.status, TransferStatus::Failed { .. }));
    assert_eq!(restored.len(), 3);
}
