//! Cancellation of long exports and imports.

use super::{filled_buffer, init_test_env};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;
use traffic_workbook::config::WorkbookConfig;
use traffic_workbook::models::Transaction;
use traffic_workbook::transfer::{
    export_snapshot, import_workbook, NeverCancel, TransferOptions, TransferStatus,
};
use traffic_workbook::workbook::writer::part_path_for;
use traffic_workbook::workbook::WorkbookReader;
use traffic_workbook::TrafficWorkbook;

#[test]
fn test_cancel_at_row_4999_of_10000() {
    init_test_env();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cancelled.xlsx");
    let snapshot = filled_buffer(10_000).snapshot();

    let summary = export_snapshot(
        &snapshot,
        &path,
        &TransferOptions::default(),
        &|rows: u64| rows >= 4_999,
    )
    .unwrap();

    assert_eq!(summary.status, TransferStatus::Cancelled { after_rows: 4_999 });
    assert_eq!(summary.rows_written, 4_999);
    assert!(summary.document_written);
    assert!(!part_path_for(&path).exists());

    let reader = WorkbookReader::open(&path).unwrap();
    let rows: Vec<_> = reader.rows().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 4_999);
}

#[test]
fn test_cancel_discarding_partial_leaves_nothing() {
    init_test_env();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("discarded.xlsx");
    let options = TransferOptions {
        keep_partial_on_cancel: false,
        ..Default::default()
    };

    let summary = export_snapshot(
        &filled_buffer(100).snapshot(),
        &path,
        &options,
        &|rows: u64| rows >= 50,
    )
    .unwrap();

    assert!(!summary.document_written);
    assert!(!path.exists());
    assert!(!part_path_for(&path).exists());
}

#[test]
fn test_cancelled_import_keeps_rows_read_so_far() {
    init_test_env();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("source.xlsx");
    export_snapshot(
        &filled_buffer(200).snapshot(),
        &path,
        &TransferOptions::default(),
        &NeverCancel,
    )
    .unwrap();

    let mut restored: Vec<Transaction> = Vec::new();
    let summary = import_workbook(
        &path,
        &TransferOptions::default(),
        &mut restored,
        &|rows: u64| rows >= 120,
    )
    .unwrap();

    assert_eq!(summary.status, TransferStatus::Cancelled { after_rows: 120 });
    assert_eq!(restored.len(), 120);
    assert_eq!(restored[119].sequence(), 120);
}

#[test]
fn test_host_cancels_running_export() {
    init_test_env();
    let dir = TempDir::new().unwrap();
    let session = Arc::new(TrafficWorkbook::with_config(WorkbookConfig::default()));
    for n in 0..2_000 {
        session.on_exchange(super::sample_exchange(n)).unwrap();
    }

    // The extra check parks the export at row 100 until the host has cancelled.
    let reached = Arc::new(AtomicU64::new(0));
    let export = {
        let session = Arc::clone(&session);
        let reached = Arc::clone(&reached);
        let path = dir.path().join("host-cancel.xlsx");
        thread::spawn(move || {
            let park = |rows: u64| {
                if rows == 100 {
                    reached.store(1, Ordering::SeqCst);
                    while reached.load(Ordering::SeqCst) != 2 {
                        thread::yield_now();
                    }
                }
                false
            };
            session.export_with(path, &session.transfer_options(), &park)
        })
    };

    while reached.load(Ordering::SeqCst) != 1 {
        thread::yield_now();
    }
    let cancelled = session.cancel_most_recent().unwrap();
    assert!(session.tracker().is_active(&cancelled).unwrap());
    reached.store(2, Ordering::SeqCst);

    let summary = export.join().unwrap().unwrap();
    assert_eq!(summary.status, TransferStatus::Cancelled { after_rows: 100 });
    assert_eq!(session.tracker().active_count().unwrap(), 0);
}
