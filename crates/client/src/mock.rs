//! In-process resumable upload server used by the client tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use roomdrop_protocol::constants::*;
use roomdrop_protocol::{Headers, Method, response};
use tokio_util::sync::CancellationToken;

use crate::transport::{HttpRequest, HttpResponse, Transport, TransportError, TransportFuture};

/// Deterministic test payload.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Scripted misbehavior for the next request of a method.
#[derive(Debug, Clone)]
pub enum Failure {
    /// Connection drops after `flush` body bytes reached the server.
    Network { flush: u64 },
    /// Request times out after `flush` body bytes reached the server.
    Timeout { flush: u64 },
    /// Stores `flush` body bytes, then never answers.
    Hang { flush: u64 },
    Status(u16),
}

#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub path: String,
    pub headers: Headers,
    pub upload_offset: Option<u64>,
    pub body_len: Option<u64>,
}

struct Resource {
    length: u64,
    data: Vec<u8>,
}

#[derive(Default)]
struct State {
    resources: HashMap<String, Resource>,
    gone: HashSet<String>,
    next_ids: VecDeque<String>,
    created: u32,
    requests: Vec<Recorded>,
    probe_headers: Option<Headers>,
    failures: HashMap<Method, VecDeque<Failure>>,
}

pub struct MockServer {
    state: Mutex<State>,
}

enum Outcome {
    Ready(Result<HttpResponse, TransportError>),
    Hang,
}

impl MockServer {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    /// Adds a resource of `length` bytes whose first `offset` bytes are stored.
    pub fn preset_resource(&self, id: &str, length: u64, offset: u64) {
        let data = pattern(length as usize)[..offset as usize].to_vec();
        self.state
            .lock()
            .unwrap()
            .resources
            .insert(id.to_string(), Resource { length, data });
    }

    /// Removes a resource; later requests for it answer 410.
    pub fn expire(&self, id: &str) {
        let mut s = self.state.lock().unwrap();
        s.resources.remove(id);
        s.gone.insert(id.to_string());
    }

    /// Id handed out by the next creation.
    pub fn next_id(&self, id: &str) {
        self.state.lock().unwrap().next_ids.push_back(id.to_string());
    }

    pub fn set_probe_headers(&self, headers: &[(&str, &str)]) {
        self.state.lock().unwrap().probe_headers = Some(
            headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
    }

    pub fn fail_next(&self, method: Method, failure: Failure) {
        self.state
            .lock()
            .unwrap()
            .failures
            .entry(method)
            .or_default()
            .push_back(failure);
    }

    pub fn data(&self, id: &str) -> Vec<u8> {
        self.state
            .lock()
            .unwrap()
            .resources
            .get(id)
            .map(|r| r.data.clone())
            .unwrap_or_default()
    }

    pub fn has_resource(&self, id: &str) -> bool {
        self.state.lock().unwrap().resources.contains_key(id)
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn requests_for(&self, method: Method) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method)
            .collect()
    }

    pub fn count(&self, method: Method) -> usize {
        self.requests_for(method).len()
    }

    fn handle(&self, request: &HttpRequest) -> Outcome {
        let mut s = self.state.lock().unwrap();
        s.requests.push(Recorded {
            method: request.method,
            path: request.path.clone(),
            headers: request.headers.clone(),
            upload_offset: request
                .header(HEADER_UPLOAD_OFFSET)
                .and_then(|v| v.parse().ok()),
            body_len: request.body.as_ref().map(|b| b.len() as u64),
        });

        let failure = s
            .failures
            .get_mut(&request.method)
            .and_then(VecDeque::pop_front);
        if matches!(failure, Some(Failure::Hang { .. })) && request.method != Method::Patch {
            return Outcome::Hang;
        }
        let id = request
            .path
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();

        match request.method {
            Method::Options => Outcome::Ready(match failure {
                Some(f) => simple_failure(f),
                None => {
                    let mut resp = HttpResponse::new(STATUS_NO_CONTENT);
                    resp.headers = s.probe_headers.clone().unwrap_or_else(|| {
                        vec![
                            (HEADER_RESUMABLE.into(), PROTOCOL_VERSION.into()),
                            (HEADER_VERSION.into(), PROTOCOL_VERSION.into()),
                            (HEADER_EXTENSION.into(), "creation,termination".into()),
                        ]
                    });
                    Ok(resp)
                }
            }),
            Method::Post => Outcome::Ready(match failure {
                Some(f) => simple_failure(f),
                None => {
                    let length = request
                        .header(HEADER_UPLOAD_LENGTH)
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(0);
                    s.created += 1;
                    let id = match s.next_ids.pop_front() {
                        Some(id) => id,
                        None => format!("res-{}", s.created),
                    };
                    s.resources.insert(
                        id.clone(),
                        Resource {
                            length,
                            data: Vec::new(),
                        },
                    );
                    Ok(HttpResponse::new(STATUS_CREATED)
                        .with_header(HEADER_LOCATION, format!("http://mock.local/files/{id}")))
                }
            }),
            Method::Head => Outcome::Ready(match failure {
                Some(f) => simple_failure(f),
                None => match s.resources.get(&id) {
                    Some(r) => Ok(HttpResponse::new(STATUS_NO_CONTENT)
                        .with_header(HEADER_UPLOAD_OFFSET, r.data.len().to_string())
                        .with_header(HEADER_UPLOAD_LENGTH, r.length.to_string())),
                    None => Ok(HttpResponse::new(missing_status(&s, &id))),
                },
            }),
            Method::Patch => {
                let missing = missing_status(&s, &id);
                let Some(resource) = s.resources.get_mut(&id) else {
                    return Outcome::Ready(Ok(HttpResponse::new(missing)));
                };
                let body = request.body.clone().unwrap_or_default();
                let offset = response::header_value(&request.headers, HEADER_UPLOAD_OFFSET)
                    .and_then(|v| v.parse::<u64>().ok());
                if offset != Some(resource.data.len() as u64) {
                    return Outcome::Ready(Ok(HttpResponse::new(STATUS_CONFLICT)));
                }

                let flush = |resource: &mut Resource, n: u64| {
                    let n = (n as usize).min(body.len());
                    resource.data.extend_from_slice(&body[..n]);
                    if let Some(sink) = &request.progress {
                        sink(n as u64);
                    }
                };
                match failure {
                    Some(Failure::Network { flush: n }) => {
                        flush(resource, n);
                        Outcome::Ready(Err(TransportError::Network("connection reset".into())))
                    }
                    Some(Failure::Timeout { flush: n }) => {
                        flush(resource, n);
                        Outcome::Ready(Err(TransportError::Timeout))
                    }
                    Some(Failure::Hang { flush: n }) => {
                        flush(resource, n);
                        Outcome::Hang
                    }
                    Some(f) => Outcome::Ready(simple_failure(f)),
                    None => {
                        let half = body.len() as u64 / 2;
                        if let Some(sink) = &request.progress {
                            sink(half);
                        }
                        flush(resource, body.len() as u64);
                        Outcome::Ready(Ok(HttpResponse::new(STATUS_NO_CONTENT)
                            .with_header(HEADER_UPLOAD_OFFSET, resource.data.len().to_string())))
                    }
                }
            }
        }
    }
}

fn missing_status(s: &State, id: &str) -> u16 {
    if s.gone.contains(id) {
        STATUS_GONE
    } else {
        STATUS_NOT_FOUND
    }
}

fn simple_failure(failure: Failure) -> Result<HttpResponse, TransportError> {
    match failure {
        Failure::Network { .. } => Err(TransportError::Network("connection reset".into())),
        Failure::Timeout { .. } | Failure::Hang { .. } => Err(TransportError::Timeout),
        Failure::Status(status) => Ok(HttpResponse::new(status)),
    }
}

impl Transport for MockServer {
    fn send<'a>(&'a self, request: HttpRequest, _cancel: &'a CancellationToken) -> TransportFuture<'a> {
        let outcome = self.handle(&request);
        Box::pin(async move {
            match outcome {
                Outcome::Ready(result) => {
                    tokio::task::yield_now().await;
                    result
                }
                Outcome::Hang => std::future::pending().await,
            }
        })
    }
}
