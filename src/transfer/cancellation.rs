//! Cooperative cancellation of running exports and imports.
//!
//! Row loops consult a [`CancelCheck`] before every row. The host cancels
//! through a [`CancellationToken`], usually reached via the
//! [`SharedOperationTracker`] that registers every running operation under a
//! UUID.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// Asked between rows whether the current operation should stop.
pub trait CancelCheck {
    /// `completed_rows` is the number of rows finished so far.
    fn should_stop(&self, completed_rows: u64) -> bool;
}

/// A check that never stops.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverCancel;

impl CancelCheck for NeverCancel {
    fn should_stop(&self, _completed_rows: u64) -> bool {
        false
    }
}

impl<F> CancelCheck for F
where
    F: Fn(u64) -> bool,
{
    fn should_stop(&self, completed_rows: u64) -> bool {
        self(completed_rows)
    }
}

/// Shared cancellation flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl CancelCheck for CancellationToken {
    fn should_stop(&self, _completed_rows: u64) -> bool {
        self.is_cancelled()
    }
}

/// Kind of a tracked operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Export,
    Import,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Export => f.write_str("export"),
            OperationKind::Import => f.write_str("import"),
        }
    }
}

/// A handle to a running operation that can be cancelled.
#[derive(Debug, Clone)]
pub struct OperationHandle {
    /// Unique identifier for this operation.
    pub operation_id: String,

    pub kind: OperationKind,

    /// Flag the operation's row loop polls.
    pub token: CancellationToken,
}

impl OperationHandle {
    /// Creates a new handle with a generated UUID.
    pub fn new(kind: OperationKind) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), kind)
    }

    /// Creates a new handle with a specific ID.
    pub fn with_id(operation_id: String, kind: OperationKind) -> Self {
        Self {
            operation_id,
            kind,
            token: CancellationToken::new(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn mark_cancelled(&self) {
        self.token.cancel();
    }
}

/// Error types for cancellation requests.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CancelError {
    /// No running operation has the given ID.
    #[error("Operation not found: {0}")]
    NotFound(String),

    /// Failed to acquire the tracker lock.
    #[error("Lock error: {0}")]
    LockError(String),
}

/// Registry of running operations.
#[derive(Debug, Default)]
pub struct OperationTracker {
    active: HashMap<String, OperationHandle>,

    /// Operation IDs by start time (oldest first).
    order: Vec<String>,
}

impl OperationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a running operation.
    ///
    /// # Returns
    ///
    /// The ID the operation was registered under.
    pub fn register(&mut self, handle: OperationHandle) -> String {
        let id = handle.operation_id.clone();
        self.order.push(id.clone());
        self.active.insert(id.clone(), handle);
        id
    }

    /// Removes an operation from tracking (called when it ends).
    ///
    /// # Returns
    ///
    /// `true` if the operation was tracked.
    pub fn unregister(&mut self, operation_id: &str) -> bool {
        if let Some(pos) = self.order.iter().position(|id| id == operation_id) {
            self.order.remove(pos);
        }
        self.active.remove(operation_id).is_some()
    }

    /// Requests cancellation of one operation.
    ///
    /// The operation stays registered until its row loop notices the flag
    /// and unregisters itself.
    pub fn cancel(&mut self, operation_id: &str) -> Result<(), CancelError> {
        let handle = self
            .active
            .get(operation_id)
            .ok_or_else(|| CancelError::NotFound(operation_id.to_string()))?;
        handle.mark_cancelled();
        Ok(())
    }

    /// Requests cancellation of the most recently started operation that is
    /// not already cancelled.
    ///
    /// # Returns
    ///
    /// The cancelled operation's ID.
    pub fn cancel_most_recent(&mut self) -> Result<String, CancelError> {
        let id = self
            .order
            .iter()
            .rev()
            .find(|id| self.active.get(*id).is_some_and(|h| !h.is_cancelled()))
            .cloned()
            .ok_or_else(|| CancelError::NotFound("no running operations".to_string()))?;
        self.cancel(&id)?;
        Ok(id)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// IDs of running operations, oldest first.
    pub fn active_ids(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn is_active(&self, operation_id: &str) -> bool {
        self.active.contains_key(operation_id)
    }

    pub fn kind_of(&self, operation_id: &str) -> Option<OperationKind> {
        self.active.get(operation_id).map(|h| h.kind)
    }
}

/// Thread-safe wrapper around [`OperationTracker`].
#[derive(Debug, Clone, Default)]
pub struct SharedOperationTracker {
    inner: Arc<Mutex<OperationTracker>>,
}

impl SharedOperationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, OperationTracker>, CancelError> {
        self.inner
            .lock()
            .map_err(|e| CancelError::LockError(e.to_string()))
    }

    /// Registers a new operation and returns a guard that unregisters it
    /// when dropped.
    pub fn start(&self, kind: OperationKind) -> Result<OperationGuard, CancelError> {
        let handle = OperationHandle::new(kind);
        let token = handle.token.clone();
        let id = self.lock()?.register(handle);
        Ok(OperationGuard {
            tracker: self.clone(),
            id,
            token,
        })
    }

    pub fn unregister(&self, operation_id: &str) -> Result<bool, CancelError> {
        Ok(self.lock()?.unregister(operation_id))
    }

    pub fn cancel(&self, operation_id: &str) -> Result<(), CancelError> {
        self.lock()?.cancel(operation_id)
    }

    pub fn cancel_most_recent(&self) -> Result<String, CancelError> {
        self.lock()?.cancel_most_recent()
    }

    pub fn active_count(&self) -> Result<usize, CancelError> {
        Ok(self.lock()?.active_count())
    }

    pub fn active_ids(&self) -> Result<Vec<String>, CancelError> {
        Ok(self.lock()?.active_ids())
    }

    pub fn is_active(&self, operation_id: &str) -> Result<bool, CancelError> {
        Ok(self.lock()?.is_active(operation_id))
    }
}

/// Registration of one running operation; unregisters on drop.
#[derive(Debug)]
pub struct OperationGuard {
    tracker: SharedOperationTracker,
    id: String,
    token: CancellationToken,
}

impl OperationGuard {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        let _ = self.tracker.unregister(&self.id);
    }
}

/// Stops when either check says so.
pub(crate) struct EitherCheck<'a> {
    pub first: &'a dyn CancelCheck,
    pub second: &'a dyn CancelCheck,
}

impl CancelCheck for EitherCheck<'_> {
    fn should_stop(&self, completed_rows: u64) -> bool {
        self.first.should_stop(completed_rows) || self.second.should_stop(completed_rows)
    }
}
