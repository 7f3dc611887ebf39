//! Byte sources and progress measurement for resumable uploads.
//!
//! The upload client reads arbitrary byte ranges from a [`ByteSource`]
//! (a file on disk or an in-memory buffer) and measures throughput with a
//! [`SpeedCalculator`].

mod progress;
mod source;

pub use progress::SpeedCalculator;
pub use source::{ByteSource, FileSource, MemorySource};

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("range {offset}+{len} is outside a source of {size} bytes")]
    OutOfRange { offset: u64, len: u64, size: u64 },

    #[error("source changed: expected {expected} bytes, found {actual}")]
    LengthMismatch { expected: u64, actual: u64 },

    #[error("short read at offset {offset}: wanted {wanted} bytes, got {got}")]
    ShortRead { offset: u64, wanted: u64, got: u64 },
}
