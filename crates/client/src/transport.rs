//! Transport boundary.
//!
//! The upload logic never talks to an HTTP client directly; it hands an
//! [`HttpRequest`] to a [`Transport`] and gets back status, headers and body.
//! Any HTTP status counts as a successful transport call; only failures to
//! complete the exchange are [`TransportError`]s.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use roomdrop_protocol::response::header_value;
use roomdrop_protocol::{Headers, Method, RequestDescriptor};
use tokio_util::sync::CancellationToken;

/// Receives the cumulative number of body bytes handed to the network.
pub type ProgressSink = Arc<dyn Fn(u64) + Send + Sync>;

/// Boxed future returned by [`Transport::send`].
pub type TransportFuture<'a> =
    Pin<Box<dyn Future<Output = Result<HttpResponse, TransportError>> + Send + 'a>>;

/// Failures to complete an HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("cancelled")]
    Cancelled,

    /// The request could not be built, e.g. a header value that is not
    /// valid on the wire. Never succeeds on a resend.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// A request ready for the wire.
pub struct HttpRequest {
    pub method: Method,
    /// Path relative to the transport's base URL.
    pub path: String,
    pub headers: Headers,
    pub body: Option<Vec<u8>>,
    /// Upper bound for the whole exchange.
    pub timeout: Duration,
    pub progress: Option<ProgressSink>,
}

impl HttpRequest {
    /// Builds a body-less request from a protocol descriptor.
    pub fn from_descriptor(descriptor: &RequestDescriptor, timeout: Duration) -> Self {
        Self {
            method: descriptor.method,
            path: descriptor.path.clone(),
            headers: descriptor.headers.clone(),
            body: None,
            timeout,
            progress: None,
        }
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_progress(mut self, sink: ProgressSink) -> Self {
        self.progress = Some(sink);
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        header_value(&self.headers, name)
    }
}

impl fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpRequest")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("headers", &self.headers)
            .field("body_len", &self.body.as_ref().map(Vec::len))
            .field("timeout", &self.timeout)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

/// What the server answered.
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        header_value(&self.headers, name)
    }
}

/// HTTP-capable transport used by the upload client.
///
/// Implementations must honor `request.timeout` and stop work when `cancel`
/// fires. Callers additionally race every send against the token, so a
/// transport that ignores it is still interrupted (its future is dropped).
pub trait Transport: Send + Sync {
    fn send<'a>(&'a self, request: HttpRequest, cancel: &'a CancellationToken)
    -> TransportFuture<'a>;
}

/// Sends `request`, resolving to [`TransportError::Cancelled`] as soon as
/// `cancel` fires. The in-flight transport future is dropped on cancellation.
pub async fn send_cancellable(
    transport: &dyn Transport,
    request: HttpRequest,
    cancel: &CancellationToken,
) -> Result<HttpResponse, TransportError> {
    if cancel.is_cancelled() {
        return Err(TransportError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TransportError::Cancelled),
        result = transport.send(request, cancel) => result,
    }
}
