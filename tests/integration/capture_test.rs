//! Concurrent capture and buffer policy tests.

use super::{init_test_env, sample_exchange};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use traffic_workbook::capture::{CaptureBuffer, CaptureError};
use traffic_workbook::config::{OverflowPolicy, WorkbookConfig};
use traffic_workbook::models::CapturedExchange;
use traffic_workbook::{CaptureOutcome, TrafficWorkbook};

#[test]
fn test_concurrent_appends_keep_per_thread_order() {
    init_test_env();
    const THREADS: usize = 8;
    const PER_THREAD: usize = 500;

    let buffer = Arc::new(CaptureBuffer::new(
        THREADS * PER_THREAD,
        OverflowPolicy::HaltCapture,
    ));
    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || {
                for i in 0..PER_THREAD {
                    buffer
                        .append(
                            CapturedExchange::new("GET", format!("https://t{}.test/{}", t, i))
                                .with_source(format!("worker-{}", t)),
                        )
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let snapshot = buffer.snapshot();
    assert_eq!(snapshot.len(), THREADS * PER_THREAD);

    let sequences: Vec<u64> = snapshot.iter().map(|r| r.sequence()).collect();
    let expected: Vec<u64> = (1..=(THREADS * PER_THREAD) as u64).collect();
    assert_eq!(sequences, expected);

    let mut next_index: HashMap<String, usize> = HashMap::new();
    for record in snapshot.iter() {
        let expected = next_index.entry(record.source().to_string()).or_insert(0);
        assert!(record.url().ends_with(&format!("/{}", expected)));
        *expected += 1;
    }
    assert!(next_index.values().all(|count| *count == PER_THREAD));
}

#[test]
fn test_snapshot_is_unaffected_by_later_changes() {
    init_test_env();
    let buffer = CaptureBuffer::new(10, OverflowPolicy::EvictOldest);
    for n in 0..3 {
        buffer.append(sample_exchange(n)).unwrap();
    }

    let snapshot = buffer.snapshot();
    buffer.append(sample_exchange(3)).unwrap();
    buffer.clear();

    assert_eq!(snapshot.len(), 3);
    assert!(buffer.is_empty());
}

#[test]
fn test_halt_policy_reports_capacity() {
    init_test_env();
    let session = TrafficWorkbook::with_config(WorkbookConfig {
        max_buffer_entries: 2,
        overflow_policy: OverflowPolicy::HaltCapture,
        ..Default::default()
    });

    for n in 0..2 {
        assert!(matches!(
            session.on_exchange(sample_exchange(n)).unwrap(),
            CaptureOutcome::Captured(_)
        ));
    }
    let err = session.on_exchange(sample_exchange(2)).unwrap_err();
    assert_eq!(err, CaptureError::CapacityExceeded { capacity: 2 });
    assert_eq!(session.stats().rejected, 1);

    session.clear_buffer();
    assert!(session.on_exchange(sample_exchange(3)).is_ok());
}

#[test]
fn test_evict_policy_reports_evictions() {
    init_test_env();
    let buffer = CaptureBuffer::new(2, OverflowPolicy::EvictOldest);
    buffer.append(sample_exchange(0)).unwrap();
    buffer.append(sample_exchange(1)).unwrap();

    let outcome = buffer.append(sample_exchange(2)).unwrap();
    assert_eq!(outcome.evicted, Some(1));
    assert_eq!(outcome.record.sequence(), 3);
    assert_eq!(buffer.stats().evicted, 1);
}
