//! Export → import round trips and sheet overflow.

use super::{filled_buffer, init_test_env};
use std::fs;
use tempfile::TempDir;
use traffic_workbook::capture::CaptureBuffer;
use traffic_workbook::config::{OverflowPolicy, WorkbookConfig};
use traffic_workbook::models::Transaction;
use traffic_workbook::transfer::{
    export_snapshot, import_workbook, NeverCancel, TransferOptions, TransferStatus,
};
use traffic_workbook::workbook::WorkbookReader;
use traffic_workbook::TrafficWorkbook;

#[test]
fn test_round_trip_preserves_every_field() {
    init_test_env();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("round-trip.xlsx");
    let original = filled_buffer(40).snapshot();

    let exported =
        export_snapshot(&original, &path, &TransferOptions::default(), &NeverCancel).unwrap();
    assert_eq!(exported.rows_written, 40);
    assert_eq!(exported.rows_truncated, 0);

    let mut restored: Vec<Transaction> = Vec::new();
    let imported =
        import_workbook(&path, &TransferOptions::default(), &mut restored, &NeverCancel).unwrap();
    assert_eq!(imported.status, TransferStatus::Completed);
    assert_eq!(imported.rows_imported, 40);
    assert_eq!(imported.rows_skipped, 0);

    for (before, after) in original.iter().zip(&restored) {
        assert_eq!(before.sequence(), after.sequence());
        assert!(
            before.same_exchange(after),
            "record #{} changed in transit",
            before.sequence()
        );
    }
}

#[test]
fn test_reexport_is_byte_identical() {
    init_test_env();
    let dir = TempDir::new().unwrap();
    let first = dir.path().join("first.xlsx");
    let second = dir.path().join("second.xlsx");
    let options = TransferOptions::default();

    export_snapshot(&filled_buffer(25).snapshot(), &first, &options, &NeverCancel).unwrap();

    let reloaded = CaptureBuffer::new(100, OverflowPolicy::EvictOldest);
    let mut sink = &reloaded;
    import_workbook(&first, &options, &mut sink, &NeverCancel).unwrap();
    export_snapshot(&reloaded.snapshot(), &second, &options, &NeverCancel).unwrap();

    assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
}

#[test]
fn test_overflow_opens_second_sheet() {
    init_test_env();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("overflow.xlsx");
    let max_rows = 50u32;
    let options = TransferOptions {
        max_rows_per_sheet: max_rows,
        ..Default::default()
    };

    let snapshot = filled_buffer(max_rows as usize + 1).snapshot();
    let summary = export_snapshot(&snapshot, &path, &options, &NeverCancel).unwrap();
    assert_eq!(summary.sheets, vec!["Capture Log", "Capture Log (2)"]);

    let reader = WorkbookReader::open(&path).unwrap();
    assert_eq!(reader.sheet_names(), ["Capture Log", "Capture Log (2)"]);
    let rows: Vec<_> = reader.rows().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), max_rows as usize + 1);
    assert_eq!(rows[max_rows as usize - 1].sheet, "Capture Log");
    assert_eq!(rows[max_rows as usize].sheet, "Capture Log (2)");
    assert_eq!(rows[max_rows as usize].row_number, 2);
}

#[test]
fn test_exactly_full_sheet_stays_single() {
    init_test_env();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("full.xlsx");
    let options = TransferOptions {
        max_rows_per_sheet: 10,
        ..Default::default()
    };

    let summary =
        export_snapshot(&filled_buffer(10).snapshot(), &path, &options, &NeverCancel).unwrap();
    assert_eq!(summary.sheets.len(), 1);
}

#[test]
fn test_empty_buffer_exports_header_only() {
    init_test_env();
    let dir = TempDir::new().unwrap();
    let session = TrafficWorkbook::with_config(WorkbookConfig::default());

    let exported = session.export_to_path(dir.path().join("empty")).unwrap();
    assert_eq!(exported.rows_written, 0);
    assert!(exported.path.exists());

    let imported = session.import_from_path(&exported.path).unwrap();
    assert_eq!(imported.rows_imported, 0);
    assert!(session.buffer().is_empty());
}

#[test]
fn test_truncated_record_is_flagged_after_import() {
    init_test_env();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("truncated.xlsx");
    let buffer = CaptureBuffer::new(4, OverflowPolicy::EvictOldest);
    buffer
        .append(
            traffic_workbook::models::CapturedExchange::new("GET", "https://big.test/")
                .with_response(200)
                .with_response_body(vec![b'z'; 4_000]),
        )
        .unwrap();
    let options = TransferOptions {
        max_cell_chars: 1_000,
        ..Default::default()
    };

    let exported = export_snapshot(&buffer.snapshot(), &path, &options, &NeverCancel).unwrap();
    assert_eq!(exported.rows_truncated, 1);

    let mut restored: Vec<Transaction> = Vec::new();
    import_workbook(&path, &options, &mut restored, &NeverCancel).unwrap();
    assert!(restored[0].truncation().response_body);
    assert_eq!(restored[0].response_body().len(), 750);
}

#[test]
fn test_control_characters_survive_round_trip() {
    init_test_env();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("controls.xlsx");
    let buffer = CaptureBuffer::new(4, OverflowPolicy::EvictOldest);
    buffer
        .append(
            traffic_workbook::models::CapturedExchange::new("GET", "https://a.test/\u{1b}[1m")
                .with_request_header("X-Token", "ab\u{1}cd")
                .with_response(200)
                .with_response_header("X-Trace", "\u{0}\u{2}")
                .with_source("Proxy\u{7f}\u{8}")
                .with_annotation("beep\u{7}\r\nnext"),
        )
        .unwrap();
    let original = buffer.snapshot();

    let exported =
        export_snapshot(&original, &path, &TransferOptions::default(), &NeverCancel).unwrap();
    assert_eq!(exported.rows_truncated, 0);
    assert!(exported.warnings.is_empty());

    let mut restored: Vec<Transaction> = Vec::new();
    let imported =
        import_workbook(&path, &TransferOptions::default(), &mut restored, &NeverCancel).unwrap();
    assert_eq!(imported.rows_skipped, 0);
    assert!(original.records()[0].same_exchange(&restored[0]));
    assert_eq!(restored[0].request_headers()[0].value, "ab\u{FFFD}cd");
    assert_eq!(restored[0].annotation(), Some("beep\u{FFFD}\nnext"));
}

#[test]
fn test_long_url_and_annotation_are_flagged() {
    init_test_env();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("long-text.xlsx");
    let buffer = CaptureBuffer::new(4, OverflowPolicy::EvictOldest);
    let long_path = "segment/".repeat(10);
    buffer
        .append(
            traffic_workbook::models::CapturedExchange::new(
                "GET",
                format!("https://a.test/{}", long_path),
            )
            .with_annotation("n".repeat(40)),
        )
        .unwrap();
    let options = TransferOptions {
        max_cell_chars: 32,
        ..Default::default()
    };

    let exported = export_snapshot(&buffer.snapshot(), &path, &options, &NeverCancel).unwrap();
    assert_eq!(exported.rows_truncated, 1);
    assert_eq!(exported.warnings, vec!["record #1 truncated to fit: url,annotation"]);

    let mut restored: Vec<Transaction> = Vec::new();
    import_workbook(&path, &options, &mut restored, &NeverCancel).unwrap();
    assert_eq!(restored[0].url().chars().count(), 32);
    assert!(restored[0].truncation().url);
    assert!(restored[0].truncation().annotation);
    assert_eq!(restored[0].annotation().map(str::len), Some(32));
}
