/// Protocol version spoken by this client.
pub const PROTOCOL_VERSION: &str = "1.0.0";

/// Default collection endpoint that upload resources are created under.
pub const DEFAULT_COLLECTION_PATH: &str = "/files/";

// ---------------------------------------------------------------------------
// Header names
// ---------------------------------------------------------------------------

/// Protocol version the request is written against.
pub const HEADER_RESUMABLE: &str = "Tus-Resumable";
/// Comma-separated list of versions the server supports.
pub const HEADER_VERSION: &str = "Tus-Version";
/// Comma-separated list of protocol extensions the server supports.
pub const HEADER_EXTENSION: &str = "Tus-Extension";
/// Maximum upload size the server accepts, in bytes.
pub const HEADER_MAX_SIZE: &str = "Tus-Max-Size";
/// Total length of the upload, fixed at creation.
pub const HEADER_UPLOAD_LENGTH: &str = "Upload-Length";
/// Byte offset of a chunk, or the server's received offset.
pub const HEADER_UPLOAD_OFFSET: &str = "Upload-Offset";
/// Base64-encoded `key value` metadata pairs.
pub const HEADER_UPLOAD_METADATA: &str = "Upload-Metadata";
/// Logical destination (e.g. a chat room) the upload belongs to.
pub const HEADER_CONTAINER_ID: &str = "Container-Id";
/// Location of a newly created upload resource.
pub const HEADER_LOCATION: &str = "Location";
pub const HEADER_CONTENT_TYPE: &str = "Content-Type";
pub const HEADER_CONTENT_LENGTH: &str = "Content-Length";

/// Content type of chunk transfer bodies.
pub const CONTENT_TYPE_OFFSET_OCTET_STREAM: &str = "application/offset+octet-stream";

// ---------------------------------------------------------------------------
// Extensions and metadata keys
// ---------------------------------------------------------------------------

/// Extension required to create upload resources with POST.
pub const EXTENSION_CREATION: &str = "creation";

pub const METADATA_FILENAME: &str = "filename";
pub const METADATA_FILETYPE: &str = "filetype";

// ---------------------------------------------------------------------------
// Status codes
// ---------------------------------------------------------------------------

pub const STATUS_CREATED: u16 = 201;
pub const STATUS_NO_CONTENT: u16 = 204;
pub const STATUS_FORBIDDEN: u16 = 403;
pub const STATUS_NOT_FOUND: u16 = 404;
pub const STATUS_CONFLICT: u16 = 409;
pub const STATUS_GONE: u16 = 410;

/// Returns `true` if `status` means the resource no longer exists.
pub fn is_resource_gone(status: u16) -> bool {
    matches!(status, STATUS_NOT_FOUND | STATUS_GONE)
}

/// Returns `true` if `status` means the resource can never be resumed by
/// this client (gone, or owned by someone else).
pub fn invalidates_resource(status: u16) -> bool {
    is_resource_gone(status) || status == STATUS_FORBIDDEN
}
