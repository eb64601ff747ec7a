//! Live capture of host traffic.
//!
//! - **buffer**: the bounded, thread-safe [`CaptureBuffer`] and its [`Snapshot`]s
//! - **scope**: domains excluded from capture

pub mod buffer;
pub mod scope;

pub use buffer::{AppendOutcome, BufferStats, CaptureBuffer, Snapshot};
pub use scope::{extract_domain, ScopeFilter};

/// Errors raised while capturing traffic.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    /// The buffer is full and its policy is `HaltCapture`.
    ///
    /// Recoverable: clear the buffer or raise `maxBufferEntries`.
    #[error("capture buffer is full ({capacity} records); clear it or raise the limit")]
    CapacityExceeded { capacity: usize },
}
