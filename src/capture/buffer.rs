//! Thread-safe, bounded, ordered store of captured transactions.
//!
//! The host delivers exchanges from its own worker threads. Every mutation
//! goes through one mutex that is held only for the in-memory update:
//! normalization happens before the lock is taken and exports work on a
//! [`Snapshot`] after it is released.

use super::CaptureError;
use crate::config::{OverflowPolicy, WorkbookConfig};
use crate::models::{CapturedExchange, Transaction};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Result of a successful append.
#[derive(Debug, Clone)]
pub struct AppendOutcome {
    /// The stored record, with its sequence number.
    pub record: Arc<Transaction>,

    /// Sequence number of the record evicted to make room, if any.
    pub evicted: Option<u64>,
}

/// Counters describing the buffer's history since it was created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferStats {
    /// Records currently held.
    pub held: usize,
    /// Records ever accepted.
    pub captured_total: u64,
    /// Records dropped by the `EvictOldest` policy.
    pub evicted: u64,
    /// Appends refused by the `HaltCapture` policy.
    pub rejected: u64,
    /// Exchanges skipped because their host is excluded from capture.
    pub out_of_scope: u64,
    /// Accepted records per originating tool.
    pub by_source: BTreeMap<String, u64>,
}

/// Immutable, point-in-time view of the buffer.
///
/// Cheap to clone. Records appended or cleared after the snapshot was taken
/// never show up in it.
#[derive(Debug, Clone)]
pub struct Snapshot {
    records: Arc<[Arc<Transaction>]>,
    taken_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn from_records(records: Vec<Arc<Transaction>>) -> Self {
        Self {
            records: records.into(),
            taken_at: Utc::now(),
        }
    }

    pub fn records(&self) -> &[Arc<Transaction>] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &Transaction> {
        self.records.iter().map(|record| record.as_ref())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }
}

#[derive(Debug)]
struct BufferState {
    records: VecDeque<Arc<Transaction>>,
    next_sequence: u64,
    halted: bool,
    stats: BufferStats,
}

/// Ordered collection of captured transactions keyed by sequence number.
#[derive(Debug)]
pub struct CaptureBuffer {
    state: Mutex<BufferState>,
    capacity: usize,
    policy: OverflowPolicy,
}

impl CaptureBuffer {
    /// Creates an empty buffer.
    ///
    /// A `capacity` of zero is raised to one.
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            state: Mutex::new(BufferState {
                records: VecDeque::new(),
                next_sequence: 1,
                halted: false,
                stats: BufferStats::default(),
            }),
            capacity: capacity.max(1),
            policy,
        }
    }

    /// Creates a buffer sized and bounded per `config`.
    pub fn from_config(config: &WorkbookConfig) -> Self {
        Self::new(config.max_buffer_entries, config.overflow_policy)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Captures one host exchange.
    ///
    /// The exchange is normalized before the lock is taken; the sequence
    /// number is assigned under it, so concurrent callers always observe
    /// insertion order == sequence order.
    ///
    /// # Errors
    ///
    /// Returns `CaptureError::CapacityExceeded` when the buffer is full and
    /// the policy is `HaltCapture`. No sequence number is consumed.
    pub fn append(&self, exchange: CapturedExchange) -> Result<AppendOutcome, CaptureError> {
        let fields = exchange.normalize();
        self.insert(|sequence| Transaction::from_normalized(sequence, fields))
    }

    /// Stores an existing record, such as one read back from a workbook.
    ///
    /// The record is re-sequenced: sequence numbers belong to this buffer and
    /// are never taken from outside.
    pub fn restore(&self, record: Transaction) -> Result<AppendOutcome, CaptureError> {
        self.insert(|sequence| record.resequenced(sequence))
    }

    fn insert<F>(&self, build: F) -> Result<AppendOutcome, CaptureError>
    where
        F: FnOnce(u64) -> Transaction,
    {
        let mut state = self.lock();

        let mut evicted = None;
        if state.records.len() >= self.capacity {
            match self.policy {
                OverflowPolicy::EvictOldest => {
                    evicted = state.records.pop_front().map(|record| record.sequence());
                    state.stats.evicted += 1;
                }
                OverflowPolicy::HaltCapture => {
                    state.stats.rejected += 1;
                    let first_refusal = !state.halted;
                    state.halted = true;
                    drop(state);
                    if first_refusal {
                        warn!(
                            "Capture buffer full ({} records); rejecting traffic until cleared",
                            self.capacity
                        );
                    }
                    return Err(CaptureError::CapacityExceeded {
                        capacity: self.capacity,
                    });
                }
            }
        }

        let sequence = state.next_sequence;
        state.next_sequence += 1;

        let record = Arc::new(build(sequence));
        *state
            .stats
            .by_source
            .entry(record.source().to_string())
            .or_insert(0) += 1;
        state.stats.captured_total += 1;
        state.records.push_back(Arc::clone(&record));
        drop(state);

        if let Some(old) = evicted {
            debug!("Evicted transaction #{} to store #{}", old, sequence);
        }

        Ok(AppendOutcome { record, evicted })
    }

    /// Returns a consistent point-in-time copy of every held record.
    pub fn snapshot(&self) -> Snapshot {
        let records: Vec<Arc<Transaction>> = self.lock().records.iter().cloned().collect();
        Snapshot::from_records(records)
    }

    /// Empties the buffer and returns the number of records dropped.
    ///
    /// Sequence numbers keep counting up; snapshots already taken are unaffected.
    pub fn clear(&self) -> usize {
        let mut state = self.lock();
        let dropped = state.records.len();
        state.records.clear();
        state.halted = false;
        drop(state);

        info!("Capture buffer cleared ({} records dropped)", dropped);
        dropped
    }

    /// Counts an exchange that was skipped because its host is out of scope.
    pub fn note_out_of_scope(&self) {
        self.lock().stats.out_of_scope += 1;
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }

    pub fn stats(&self) -> BufferStats {
        let state = self.lock();
        BufferStats {
            held: state.records.len(),
            ..state.stats.clone()
        }
    }

    fn lock(&self) -> MutexGuard<'_, BufferState> {
        // The state is consistent after every statement, so a panic in
        // another thread cannot leave it half-updated.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn exchange(n: usize) -> CapturedExchange {
        CapturedExchange::new("GET", format!("https://example.com/{}", n)).with_source("Proxy")
    }

    #[test]
    fn test_append_assigns_increasing_sequence() {
        let buffer = CaptureBuffer::new(10, OverflowPolicy::EvictOldest);
        let first = buffer.append(exchange(1)).unwrap();
        let second = buffer.append(exchange(2)).unwrap();

        assert_eq!(first.record.sequence(), 1);
        assert_eq!(second.record.sequence(), 2);
        assert_eq!(buffer.len(), 2);
        assert!(first.evicted.is_none());
    }

    #[test]
    fn test_evict_oldest_reports_eviction() {
        let buffer = CaptureBuffer::new(2, OverflowPolicy::EvictOldest);
        buffer.append(exchange(1)).unwrap();
        buffer.append(exchange(2)).unwrap();
        let third = buffer.append(exchange(3)).unwrap();

        assert_eq!(third.evicted, Some(1));
        let sequences: Vec<u64> = buffer.snapshot().iter().map(|r| r.sequence()).collect();
        assert_eq!(sequences, vec![2, 3]);
        assert_eq!(buffer.stats().evicted, 1);
    }

    #[test]
    fn test_halt_capture_rejects_without_consuming_sequence() {
        let buffer = CaptureBuffer::new(1, OverflowPolicy::HaltCapture);
        buffer.append(exchange(1)).unwrap();

        let err = buffer.append(exchange(2)).unwrap_err();
        assert_eq!(err, CaptureError::CapacityExceeded { capacity: 1 });
        assert_eq!(buffer.stats().rejected, 1);

        buffer.clear();
        let next = buffer.append(exchange(3)).unwrap();
        assert_eq!(next.record.sequence(), 2);
    }

    #[test]
    fn test_clear_keeps_sequence_counter() {
        let buffer = CaptureBuffer::new(10, OverflowPolicy::EvictOldest);
        buffer.append(exchange(1)).unwrap();
        buffer.append(exchange(2)).unwrap();

        assert_eq!(buffer.clear(), 2);
        assert!(buffer.is_empty());
        assert_eq!(buffer.append(exchange(3)).unwrap().record.sequence(), 3);
    }

    #[test]
    fn test_snapshot_is_isolated() {
        let buffer = CaptureBuffer::new(10, OverflowPolicy::EvictOldest);
        buffer.append(exchange(1)).unwrap();
        let snapshot = buffer.snapshot();

        buffer.append(exchange(2)).unwrap();
        buffer.clear();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.records()[0].url(), "https://example.com/1");
    }

    #[test]
    fn test_restore_resequences() {
        let buffer = CaptureBuffer::new(10, OverflowPolicy::EvictOldest);
        buffer.append(exchange(1)).unwrap();

        let foreign = Transaction::from_exchange(900, exchange(9));
        let restored = buffer.restore(foreign.clone()).unwrap();

        assert_eq!(restored.record.sequence(), 2);
        assert!(restored.record.same_exchange(&foreign));
    }

    #[test]
    fn test_stats_by_source() {
        let buffer = CaptureBuffer::new(10, OverflowPolicy::EvictOldest);
        buffer.append(exchange(1)).unwrap();
        buffer
            .append(CapturedExchange::new("GET", "https://a.test/").with_source("Repeater"))
            .unwrap();
        buffer.append(exchange(2)).unwrap();
        buffer.note_out_of_scope();

        let stats = buffer.stats();
        assert_eq!(stats.held, 3);
        assert_eq!(stats.captured_total, 3);
        assert_eq!(stats.out_of_scope, 1);
        assert_eq!(stats.by_source.get("Proxy"), Some(&2));
        assert_eq!(stats.by_source.get("Repeater"), Some(&1));
    }

    #[test]
    fn test_concurrent_appends_keep_order() {
        let buffer = Arc::new(CaptureBuffer::new(10_000, OverflowPolicy::EvictOldest));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let buffer = Arc::clone(&buffer);
                thread::spawn(move || {
                    for i in 0..250 {
                        buffer.append(exchange(t * 1000 + i)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let sequences: Vec<u64> = buffer.snapshot().iter().map(|r| r.sequence()).collect();
        assert_eq!(sequences, (1..=2000).collect::<Vec<u64>>());
    }
}
