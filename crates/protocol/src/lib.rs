//! Wire protocol for resumable uploads.
//!
//! Builds the four request shapes of the upload protocol (capability probe,
//! resource creation, offset query, chunk transfer) and parses the headers
//! the server answers with. Nothing in this crate performs I/O.

pub mod constants;
pub mod error;
pub mod messages;
pub mod response;
pub mod types;

// Re-export primary types for convenience.
pub use constants::PROTOCOL_VERSION;
pub use error::ProtocolError;
pub use messages::{BodyRange, Headers, Method, RequestDescriptor};
pub use types::{FileFingerprint, ServerCapabilities, UploadTarget};
