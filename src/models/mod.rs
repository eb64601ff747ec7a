//! Data models for captured HTTP exchanges.
//!
//! This module contains the raw exchange delivered by the host, the
//! normalized [`Transaction`] record, and header handling shared by both.
//! [`text`] decides which characters a record may hold.

pub mod header;
pub mod text;
pub mod transaction;

pub use header::{Header, REDACTED, SENSITIVE_HEADERS};
pub use transaction::{
    CapturedExchange, NormalizedExchange, Transaction, TruncationFlags, UNKNOWN_SOURCE,
};
