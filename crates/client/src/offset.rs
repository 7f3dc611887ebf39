//! Offset resolution: asks the server how many bytes of a resource it holds.

use roomdrop_protocol::constants::{STATUS_NO_CONTENT, is_resource_gone};
use roomdrop_protocol::{ProtocolError, messages, response};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Operation, UploadError};
use crate::transport::{HttpRequest, Transport, send_cancellable};
use crate::types::ClientConfig;

/// Returns the server-confirmed offset of `resource_id`.
///
/// 404 and 410 become [`UploadError::ResourceNotFound`]; an offset beyond
/// `total_length` means the resource does not belong to this file.
pub async fn resolve_offset(
    transport: &dyn Transport,
    config: &ClientConfig,
    resource_id: &str,
    total_length: u64,
    cancel: &CancellationToken,
) -> Result<u64, UploadError> {
    let descriptor = messages::offset_query(&config.collection_path, resource_id);
    let request = HttpRequest::from_descriptor(&descriptor, config.request_timeout);
    let response = send_cancellable(transport, request, cancel).await?;

    if is_resource_gone(response.status) {
        debug!(resource = %resource_id, status = response.status, "resource gone");
        return Err(UploadError::ResourceNotFound(resource_id.to_string()));
    }
    if response.status != STATUS_NO_CONTENT {
        return Err(UploadError::Protocol {
            operation: Operation::OffsetQuery,
            status: response.status,
        });
    }

    let offset = response::parse_offset(&response.headers)?;
    if offset > total_length {
        return Err(ProtocolError::OffsetBeyondLength {
            offset,
            length: total_length,
        }
        .into());
    }
    debug!(resource = %resource_id, offset, total_length, "offset resolved");
    Ok(offset)
}
