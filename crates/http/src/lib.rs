//! HTTP transport for the upload client.
//!
//! Async client using `reqwest` over rustls. Request bodies are streamed in
//! slices so the caller sees how many bytes have been handed to the
//! connection.

use std::sync::Arc;

use futures_util::stream;
use roomdrop_client::{HttpRequest, HttpResponse, ProgressSink, Transport, TransportError, TransportFuture};
use roomdrop_protocol::Method;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Size of each body slice written to the connection.
const UPLOAD_SLICE: usize = 64 * 1024;

/// Errors from building the transport.
#[derive(Debug, thiserror::Error)]
pub enum HttpTransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),
}

/// [`Transport`] that talks to a real server.
#[derive(Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Creates a transport for the server at `base_url` (`http` or `https`).
    pub fn new(base_url: &str) -> Result<Self, HttpTransportError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("roomdrop/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Self::with_client(http, base_url)
    }

    /// Creates a transport around an existing client.
    pub fn with_client(http: reqwest::Client, base_url: &str) -> Result<Self, HttpTransportError> {
        let trimmed = base_url.trim();
        if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
            return Err(HttpTransportError::InvalidBaseUrl(base_url.to_string()));
        }
        Ok(Self {
            http,
            base_url: trimmed.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}/{path}", self.base_url)
        }
    }

    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let url = self.url(&request.path);
        let method = match request.method {
            Method::Options => reqwest::Method::OPTIONS,
            Method::Post => reqwest::Method::POST,
            Method::Head => reqwest::Method::HEAD,
            Method::Patch => reqwest::Method::PATCH,
        };
        debug!("{} {url}", request.method.as_str());

        let mut builder = self.http.request(method, &url).timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = match request.progress {
                Some(sink) => builder.body(streamed_body(body, sink)),
                None => builder.body(body),
            };
        }

        let resp = builder.send().await.map_err(map_error)?;
        let status = resp.status().as_u16();
        let headers = resp
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();
        let body = resp.bytes().await.map_err(map_error)?.to_vec();
        trace!(status, url = %url, "response");

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

impl Transport for HttpTransport {
    fn send<'a>(&'a self, request: HttpRequest, cancel: &'a CancellationToken) -> TransportFuture<'a> {
        Box::pin(async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(TransportError::Cancelled),
                result = self.execute(request) => result,
            }
        })
    }
}

/// Wraps `body` in a stream that reports the cumulative bytes produced.
fn streamed_body(body: Vec<u8>, sink: ProgressSink) -> reqwest::Body {
    let body: Arc<[u8]> = body.into();
    let slices = stream::unfold(0usize, move |pos| {
        let body = body.clone();
        let sink = sink.clone();
        async move {
            if pos >= body.len() {
                return None;
            }
            let end = (pos + UPLOAD_SLICE).min(body.len());
            let slice = body[pos..end].to_vec();
            sink(end as u64);
            Some((Ok::<_, std::io::Error>(slice), end))
        }
    });
    reqwest::Body::wrap_stream(slices)
}

fn map_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_builder() {
        TransportError::InvalidRequest(err.to_string())
    } else {
        TransportError::Network(err.to_string())
    }
}
