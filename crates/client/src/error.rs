//! Upload error types.

use std::fmt;

use roomdrop_ledger::LedgerError;
use roomdrop_protocol::ProtocolError;
use roomdrop_protocol::constants::invalidates_resource;
use roomdrop_transfer::TransferError;
use serde::{Deserialize, Serialize};

use crate::transport::TransportError;

/// Errors produced by an upload.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// The server cannot serve this client; nothing was uploaded.
    #[error("server capability mismatch: {0}")]
    CapabilityMismatch(String),

    #[error("upload resource not found: {0}")]
    ResourceNotFound(String),

    #[error("unexpected status {status} from {operation}")]
    Protocol { operation: Operation, status: u16 },

    #[error("malformed server response: {0}")]
    Malformed(#[from] ProtocolError),

    /// The request cannot be expressed on the wire; sending it again would
    /// fail the same way.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("cancelled")]
    Cancelled,

    #[error("gave up after {attempts} retries: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<UploadError>,
    },

    #[error("an upload for {0} is already in progress")]
    AlreadyInFlight(String),

    #[error("upload of {size} bytes exceeds the server limit of {max} bytes")]
    TooLarge { size: u64, max: u64 },

    #[error("byte source error: {0}")]
    Source(#[from] TransferError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

/// Server exchange a protocol error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CapabilityProbe,
    ResourceCreation,
    OffsetQuery,
    ChunkTransfer,
}

impl Operation {
    /// Whether the request addressed an existing upload resource, so a
    /// rejection speaks about that resource rather than the server.
    pub fn targets_resource(self) -> bool {
        matches!(self, Operation::OffsetQuery | Operation::ChunkTransfer)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::CapabilityProbe => "capability probe",
            Operation::ResourceCreation => "resource creation",
            Operation::OffsetQuery => "offset query",
            Operation::ChunkTransfer => "chunk transfer",
        })
    }
}

/// Machine-readable reason attached to a failed upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    CapabilityMismatch,
    ResourceNotFound,
    Protocol,
    InvalidRequest,
    Network,
    Timeout,
    Cancelled,
    RetriesExhausted,
    AlreadyInFlight,
    TooLarge,
    Source,
    Ledger,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::CapabilityMismatch => "capability_mismatch",
            FailureKind::ResourceNotFound => "resource_not_found",
            FailureKind::Protocol => "protocol",
            FailureKind::InvalidRequest => "invalid_request",
            FailureKind::Network => "network",
            FailureKind::Timeout => "timeout",
            FailureKind::Cancelled => "cancelled",
            FailureKind::RetriesExhausted => "retries_exhausted",
            FailureKind::AlreadyInFlight => "already_in_flight",
            FailureKind::TooLarge => "too_large",
            FailureKind::Source => "source",
            FailureKind::Ledger => "ledger",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl UploadError {
    pub fn kind(&self) -> FailureKind {
        match self {
            UploadError::CapabilityMismatch(_) => FailureKind::CapabilityMismatch,
            UploadError::ResourceNotFound(_) => FailureKind::ResourceNotFound,
            UploadError::Protocol { .. } | UploadError::Malformed(_) => FailureKind::Protocol,
            UploadError::InvalidRequest(_) => FailureKind::InvalidRequest,
            UploadError::Network(_) => FailureKind::Network,
            UploadError::Timeout => FailureKind::Timeout,
            UploadError::Cancelled => FailureKind::Cancelled,
            UploadError::RetriesExhausted { .. } => FailureKind::RetriesExhausted,
            UploadError::AlreadyInFlight(_) => FailureKind::AlreadyInFlight,
            UploadError::TooLarge { .. } => FailureKind::TooLarge,
            UploadError::Source(_) => FailureKind::Source,
            UploadError::Ledger(_) => FailureKind::Ledger,
        }
    }

    /// Network failures and timeouts; everything else is final.
    pub fn is_retryable(&self) -> bool {
        matches!(self, UploadError::Network(_) | UploadError::Timeout)
    }

    /// HTTP status carried by a protocol error.
    pub fn status(&self) -> Option<u16> {
        match self {
            UploadError::Protocol { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the server said the resource a ledger entry points to is
    /// unusable. Rejections of the probe or of creation say nothing about it.
    pub fn invalidates_resource(&self) -> bool {
        match self {
            UploadError::Protocol { operation, status } => {
                operation.targets_resource() && invalidates_resource(*status)
            }
            _ => false,
        }
    }
}

impl From<TransportError> for UploadError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Network(msg) => UploadError::Network(msg),
            TransportError::InvalidRequest(msg) => UploadError::InvalidRequest(msg),
            TransportError::Timeout => UploadError::Timeout,
            TransportError::Cancelled => UploadError::Cancelled,
        }
    }
}
