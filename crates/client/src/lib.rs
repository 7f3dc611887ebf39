//! Resumable upload client.
//!
//! An [`UploadOrchestrator`] drives one upload at a time per file: it probes
//! the server once, reuses or creates an upload resource through the
//! [`ResumeLedger`](roomdrop_ledger::ResumeLedger), asks the server how much
//! it already holds, and sends the rest through a [`Transport`].

pub mod engine;
pub mod error;
pub mod offset;
pub mod orchestrator;
pub mod transport;
pub mod types;

#[cfg(test)]
mod mock;

pub use engine::{ProgressObserver, TransferEngine};
pub use error::{FailureKind, Operation, UploadError};
pub use offset::resolve_offset;
pub use orchestrator::{EVENT_CHANNEL_CAPACITY, UploadHandle, UploadOrchestrator};
pub use transport::{
    HttpRequest, HttpResponse, ProgressSink, Transport, TransportError, TransportFuture,
    send_cancellable,
};
pub use types::{ClientConfig, RetryPolicy, TransferSession, UploadEvent, UploadState};
