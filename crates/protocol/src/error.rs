//! Protocol error types.

/// Errors produced while building requests or parsing server responses.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("missing header: {0}")]
    MissingHeader(&'static str),

    #[error("invalid {name} header: {value:?}")]
    InvalidHeader { name: &'static str, value: String },

    #[error("server offset {offset} exceeds upload length {length}")]
    OffsetBeyondLength { offset: u64, length: u64 },

    #[error("invalid resource location: {0:?}")]
    InvalidLocation(String),

    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),
}
