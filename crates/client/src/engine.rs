//! Transfer engine: moves the remaining bytes of a file to a known resource.

use std::sync::Arc;

use roomdrop_protocol::constants::{HEADER_UPLOAD_OFFSET, STATUS_NO_CONTENT};
use roomdrop_protocol::{ProtocolError, messages, response};
use roomdrop_transfer::{ByteSource, TransferError};
use tracing::{debug, trace};

use crate::error::{Operation, UploadError};
use crate::transport::{HttpRequest, ProgressSink, Transport, send_cancellable};
use crate::types::{ClientConfig, TransferSession};

/// Receives progress from a running transfer. Both values are absolute byte
/// counts from the start of the file.
pub trait ProgressObserver: Send + Sync {
    /// Bytes handed to the network, confirmed or not.
    fn on_sent(&self, bytes_sent: u64);

    /// Offset the server acknowledged after a chunk.
    fn on_confirmed(&self, offset: u64);
}

/// Sends `[session.offset, total)` as one PATCH, or as several when a chunk
/// size is configured.
///
/// Failures are returned as-is; the session keeps the last confirmed offset
/// so the caller can resume. Nothing is retried here.
pub struct TransferEngine<'a> {
    transport: &'a dyn Transport,
    config: &'a ClientConfig,
}

impl<'a> TransferEngine<'a> {
    pub fn new(transport: &'a dyn Transport, config: &'a ClientConfig) -> Self {
        Self { transport, config }
    }

    /// Size of the next PATCH starting at `offset`.
    fn chunk_len(&self, offset: u64, total: u64) -> u64 {
        let remaining = total - offset;
        match self.config.chunk_size {
            Some(size) if size > 0 => size.min(remaining),
            _ => remaining,
        }
    }

    pub async fn run(
        &self,
        session: &mut TransferSession,
        source: Arc<dyn ByteSource>,
        progress: Arc<dyn ProgressObserver>,
    ) -> Result<(), UploadError> {
        let total = session.total_length();
        if source.len() != total {
            return Err(TransferError::LengthMismatch {
                expected: total,
                actual: source.len(),
            }
            .into());
        }
        session.bytes_sent_this_attempt = 0;

        while !session.is_complete() {
            if session.is_cancelled() {
                return Err(UploadError::Cancelled);
            }

            let offset = session.offset;
            let len = self.chunk_len(offset, total);
            let body = read_chunk(source.clone(), offset, len).await?;

            let descriptor =
                messages::chunk_transfer(&self.config.collection_path, &session.resource_id, offset, len);
            let observer = progress.clone();
            let sink: ProgressSink = Arc::new(move |sent: u64| observer.on_sent(offset + sent));
            let request = HttpRequest::from_descriptor(&descriptor, self.config.transfer_timeout)
                .with_body(body)
                .with_progress(sink);

            trace!(resource = %session.resource_id, offset, len, "sending chunk");
            let response = send_cancellable(self.transport, request, &session.cancel).await?;
            if response.status != STATUS_NO_CONTENT {
                return Err(UploadError::Protocol {
                    operation: Operation::ChunkTransfer,
                    status: response.status,
                });
            }

            let confirmed = response::parse_offset(&response.headers)?;
            if confirmed <= offset || confirmed > offset + len {
                return Err(ProtocolError::InvalidHeader {
                    name: HEADER_UPLOAD_OFFSET,
                    value: confirmed.to_string(),
                }
                .into());
            }

            session.bytes_sent_this_attempt += confirmed - offset;
            session.offset = confirmed;
            progress.on_confirmed(confirmed);
            debug!(resource = %session.resource_id, offset = confirmed, total, "chunk confirmed");
        }

        Ok(())
    }
}

/// Reads a range off the async runtime; file sources block.
async fn read_chunk(
    source: Arc<dyn ByteSource>,
    offset: u64,
    len: u64,
) -> Result<Vec<u8>, UploadError> {
    let bytes = tokio::task::spawn_blocking(move || source.read_at(offset, len))
        .await
        .map_err(|e| TransferError::Io(std::io::Error::other(e)))??;
    Ok(bytes)
}
