use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};

use crate::ProtocolError;
use crate::constants::*;
use crate::types::UploadTarget;

/// Ordered list of `(name, value)` header pairs.
pub type Headers = Vec<(String, String)>;

/// HTTP methods used by the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Options,
    Post,
    Head,
    Patch,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Options => "OPTIONS",
            Method::Post => "POST",
            Method::Head => "HEAD",
            Method::Patch => "PATCH",
        }
    }
}

/// Byte range `[offset, offset + len)` of the source carried as the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BodyRange {
    pub offset: u64,
    pub len: u64,
}

/// Transport-independent description of one protocol request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDescriptor {
    pub method: Method,
    pub path: String,
    pub headers: Headers,
    pub expected_status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<BodyRange>,
}

impl RequestDescriptor {
    /// Returns the value of the first header named `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        crate::response::header_value(&self.headers, name)
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

/// `OPTIONS collection` — asks the server which versions and extensions it
/// supports.
pub fn capability_probe(collection: &str) -> RequestDescriptor {
    RequestDescriptor {
        method: Method::Options,
        path: collection.to_string(),
        headers: Vec::new(),
        expected_status: STATUS_NO_CONTENT,
        body: None,
    }
}

/// `POST collection` — creates an upload resource of `target.size_bytes`.
///
/// The server answers with the new resource in the `Location` header.
/// Fails if `target.container_id` cannot be sent as a header value; the
/// other target fields travel base64-encoded.
pub fn create_resource(collection: &str, target: &UploadTarget) -> Result<RequestDescriptor, ProtocolError> {
    if !is_header_safe(&target.container_id) {
        return Err(ProtocolError::InvalidHeader {
            name: HEADER_CONTAINER_ID,
            value: target.container_id.clone(),
        });
    }
    let metadata = encode_metadata(&[
        (METADATA_FILENAME, target.file_name.as_str()),
        (METADATA_FILETYPE, target.mime_type.as_str()),
    ]);
    Ok(RequestDescriptor {
        method: Method::Post,
        path: collection.to_string(),
        headers: vec![
            header(HEADER_RESUMABLE, PROTOCOL_VERSION),
            header(HEADER_UPLOAD_LENGTH, target.size_bytes.to_string()),
            header(HEADER_UPLOAD_METADATA, metadata),
            header(HEADER_CONTAINER_ID, &target.container_id),
        ],
        expected_status: STATUS_CREATED,
        body: None,
    })
}

/// `HEAD collection/{id}` — asks how many bytes the server holds.
pub fn offset_query(collection: &str, resource_id: &str) -> RequestDescriptor {
    RequestDescriptor {
        method: Method::Head,
        path: resource_path(collection, resource_id),
        headers: vec![header(HEADER_RESUMABLE, PROTOCOL_VERSION)],
        expected_status: STATUS_NO_CONTENT,
        body: None,
    }
}

/// `PATCH collection/{id}` — appends `len` bytes starting at `offset`.
pub fn chunk_transfer(collection: &str, resource_id: &str, offset: u64, len: u64) -> RequestDescriptor {
    RequestDescriptor {
        method: Method::Patch,
        path: resource_path(collection, resource_id),
        headers: vec![
            header(HEADER_RESUMABLE, PROTOCOL_VERSION),
            header(HEADER_CONTENT_TYPE, CONTENT_TYPE_OFFSET_OCTET_STREAM),
            header(HEADER_UPLOAD_OFFSET, offset.to_string()),
            header(HEADER_CONTENT_LENGTH, len.to_string()),
        ],
        expected_status: STATUS_NO_CONTENT,
        body: Some(BodyRange { offset, len }),
    }
}

/// Joins a collection path and a resource id with exactly one `/`.
pub fn resource_path(collection: &str, resource_id: &str) -> String {
    format!(
        "{}/{}",
        collection.trim_end_matches('/'),
        resource_id.trim_start_matches('/')
    )
}

fn header(name: &str, value: impl Into<String>) -> (String, String) {
    (name.to_string(), value.into())
}

/// Visible ASCII, space and tab only.
fn is_header_safe(value: &str) -> bool {
    value.bytes().all(|b| b == b'\t' || (0x20..0x7f).contains(&b))
}

// ---------------------------------------------------------------------------
// Upload-Metadata
// ---------------------------------------------------------------------------

/// Encodes metadata pairs as `key base64(value),key base64(value)`.
///
/// Values are base64-encoded (standard alphabet, padded) so that non-ASCII
/// filenames survive header transport.
pub fn encode_metadata(pairs: &[(&str, &str)]) -> String {
    pairs
        .iter()
        .map(|(key, value)| format!("{key} {}", STANDARD.encode(value.as_bytes())))
        .collect::<Vec<_>>()
        .join(",")
}

/// Decodes an `Upload-Metadata` header value back into pairs.
///
/// A key without a value decodes to an empty string.
pub fn decode_metadata(value: &str) -> Result<Vec<(String, String)>, ProtocolError> {
    let mut pairs = Vec::new();
    for item in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let mut parts = item.splitn(2, ' ');
        let key = parts.next().unwrap_or_default();
        let decoded = match parts.next() {
            Some(encoded) => {
                let bytes = STANDARD
                    .decode(encoded.trim())
                    .map_err(|e| ProtocolError::InvalidMetadata(format!("{key}: {e}")))?;
                String::from_utf8(bytes)
                    .map_err(|e| ProtocolError::InvalidMetadata(format!("{key}: {e}")))?
            }
            None => String::new(),
        };
        pairs.push((key.to_string(), decoded));
    }
    Ok(pairs)
}
