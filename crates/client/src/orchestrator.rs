//! Upload orchestration: capability probe, resource creation or reuse,
//! offset resolution, transfer, and bounded retry.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use roomdrop_ledger::ResumeLedger;
use roomdrop_protocol::constants::{STATUS_CREATED, STATUS_NO_CONTENT};
use roomdrop_protocol::{
    FileFingerprint, PROTOCOL_VERSION, ServerCapabilities, UploadTarget, messages, response,
};
use roomdrop_transfer::{ByteSource, SpeedCalculator};
use tokio::sync::{OnceCell, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::{ProgressObserver, TransferEngine};
use crate::error::{Operation, UploadError};
use crate::offset::resolve_offset;
use crate::transport::{HttpRequest, Transport, send_cancellable};
use crate::types::{ClientConfig, TransferSession, UploadEvent, UploadState};

/// Capacity of the event channel created by [`UploadOrchestrator::start`].
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Drives uploads against one server.
///
/// Cheap to clone; clones share the capability cache and the set of
/// fingerprints currently uploading.
#[derive(Clone)]
pub struct UploadOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    transport: Arc<dyn Transport>,
    ledger: ResumeLedger,
    config: ClientConfig,
    /// Definitive probe result: capabilities, or why they are unusable.
    capabilities: OnceCell<Result<ServerCapabilities, String>>,
    in_flight: Mutex<HashSet<String>>,
}

/// Next thing the state machine does.
enum Step {
    Probe,
    Resolve,
    Create,
    Query { resource_id: String },
    Transfer { resource_id: String, offset: u64 },
}

enum Next {
    Step(Step),
    Done(String),
}

impl UploadOrchestrator {
    pub fn new(transport: Arc<dyn Transport>, ledger: ResumeLedger, config: ClientConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                ledger,
                config,
                capabilities: OnceCell::new(),
                in_flight: Mutex::new(HashSet::new()),
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn ledger(&self) -> &ResumeLedger {
        &self.inner.ledger
    }

    /// Uploads `target`, reading its bytes from `source`, and returns the
    /// server-side resource id.
    ///
    /// Events are pushed to `events`; exactly one `Completed` or `Failed` is
    /// sent last. A second call for a fingerprint that is still uploading
    /// fails immediately with [`UploadError::AlreadyInFlight`].
    pub async fn upload(
        &self,
        target: UploadTarget,
        source: Arc<dyn ByteSource>,
        events: &mpsc::Sender<UploadEvent>,
        cancel: CancellationToken,
    ) -> Result<String, UploadError> {
        let fingerprint = target.fingerprint();
        let fp = fingerprint.to_string();

        let result = match InFlightGuard::claim(&self.inner, &fp) {
            Some(guard) => {
                info!(fingerprint = %fp, file = %target.file_name, size = target.size_bytes, "upload started");
                let result = self
                    .drive(&target, &fingerprint, source, events, &cancel)
                    .await;
                drop(guard);
                result
            }
            None => Err(UploadError::AlreadyInFlight(fp.clone())),
        };

        let terminal = match &result {
            Ok(resource_id) => {
                info!(fingerprint = %fp, resource = %resource_id, "upload completed");
                send_state(events, &fp, UploadState::Completed);
                UploadEvent::Completed {
                    fingerprint: fp,
                    resource_id: resource_id.clone(),
                }
            }
            Err(err) => {
                warn!(fingerprint = %fp, kind = ?err.kind(), "upload failed: {err}");
                send_state(events, &fp, UploadState::Failed);
                UploadEvent::Failed {
                    fingerprint: fp,
                    kind: err.kind(),
                    message: err.to_string(),
                }
            }
        };
        let _ = events.send(terminal).await;
        result
    }

    /// Spawns [`upload`](Self::upload) on the runtime and returns a handle
    /// with the event stream and a cancel switch.
    pub fn start(&self, target: UploadTarget, source: Arc<dyn ByteSource>) -> UploadHandle {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        let this = self.clone();
        let token = cancel.clone();
        let task = tokio::spawn(async move { this.upload(target, source, &tx, token).await });
        UploadHandle {
            events: rx,
            cancel,
            task,
        }
    }

    /// Returns the server's capabilities, probing on first use.
    ///
    /// Transport failures and unexpected statuses are not cached, so a later
    /// call probes again.
    async fn capabilities(&self, cancel: &CancellationToken) -> Result<ServerCapabilities, UploadError> {
        let inner = &self.inner;
        let verdict = inner
            .capabilities
            .get_or_try_init(|| async {
                let descriptor = messages::capability_probe(&inner.config.collection_path);
                let request = HttpRequest::from_descriptor(&descriptor, inner.config.request_timeout);
                let response = send_cancellable(inner.transport.as_ref(), request, cancel).await?;
                if response.status != STATUS_NO_CONTENT {
                    return Err(UploadError::Protocol {
                        operation: Operation::CapabilityProbe,
                        status: response.status,
                    });
                }
                let verdict = response::parse_capabilities(&response.headers)
                    .map_err(|e| e.to_string())
                    .and_then(|caps| {
                        response::check_capabilities(&caps, PROTOCOL_VERSION)?;
                        Ok(caps)
                    });
                match &verdict {
                    Ok(caps) => debug!(
                        version = %caps.protocol_version,
                        extensions = ?caps.extensions,
                        max_size = ?caps.max_upload_size_bytes,
                        "server capabilities"
                    ),
                    Err(reason) => warn!("server cannot serve uploads: {reason}"),
                }
                Ok(verdict)
            })
            .await?;
        verdict.clone().map_err(UploadError::CapabilityMismatch)
    }

    async fn drive(
        &self,
        target: &UploadTarget,
        fingerprint: &FileFingerprint,
        source: Arc<dyn ByteSource>,
        events: &mpsc::Sender<UploadEvent>,
        cancel: &CancellationToken,
    ) -> Result<String, UploadError> {
        let inner = &self.inner;
        let fp = fingerprint.as_str();
        let total = target.size_bytes;
        let reporter = Arc::new(ProgressReporter::new(fp, total, events.clone(), inner.config.progress_interval));

        let mut step = Step::Probe;
        let mut retries = 0u32;
        let mut progress_mark: Option<u64> = None;
        let mut not_found_before = false;

        loop {
            if cancel.is_cancelled() {
                return Err(UploadError::Cancelled);
            }

            let outcome = match step {
                Step::Probe => {
                    send_state(events, fp, UploadState::ProbingCapabilities);
                    self.probe(total, cancel).await
                }
                Step::Resolve => {
                    send_state(events, fp, UploadState::Resolving);
                    match inner.ledger.lookup(fingerprint) {
                        Ok(Some(resource_id)) => {
                            debug!(fingerprint = %fp, resource = %resource_id, "ledger hit");
                            Ok(Next::Step(Step::Query { resource_id }))
                        }
                        Ok(None) => Ok(Next::Step(Step::Create)),
                        Err(e) => Err(e.into()),
                    }
                }
                Step::Create => {
                    send_state(events, fp, UploadState::Creating);
                    self.create(target, fingerprint, cancel).await
                }
                Step::Query { resource_id } => {
                    send_state(events, fp, UploadState::QueryingOffset);
                    match resolve_offset(inner.transport.as_ref(), &inner.config, &resource_id, total, cancel).await {
                        Ok(offset) => {
                            not_found_before = false;
                            reporter.resume_from(offset);
                            if offset == total {
                                Ok(Next::Done(resource_id))
                            } else {
                                Ok(Next::Step(Step::Transfer { resource_id, offset }))
                            }
                        }
                        Err(UploadError::ResourceNotFound(id)) => {
                            info!(fingerprint = %fp, resource = %id, "resource no longer on server, forgetting it");
                            inner.ledger.delete(fingerprint)?;
                            if not_found_before {
                                return Err(UploadError::ResourceNotFound(id));
                            }
                            not_found_before = true;
                            Ok(Next::Step(Step::Create))
                        }
                        Err(e) => Err(e),
                    }
                }
                Step::Transfer { resource_id, offset } => {
                    send_state(events, fp, UploadState::Transferring);
                    let mut session = TransferSession::new(
                        target.clone(),
                        fingerprint.clone(),
                        resource_id,
                        offset,
                        cancel.clone(),
                    );
                    TransferEngine::new(inner.transport.as_ref(), &inner.config)
                        .run(&mut session, source.clone(), reporter.clone())
                        .await
                        .map(|()| Next::Done(session.resource_id))
                }
            };

            match outcome {
                Ok(Next::Step(next)) => step = next,
                Ok(Next::Done(resource_id)) => {
                    if inner.config.remove_ledger_on_success {
                        inner.ledger.delete(fingerprint)?;
                    }
                    return Ok(resource_id);
                }
                Err(err) if err.is_retryable() => {
                    let confirmed = reporter.confirmed();
                    if progress_mark.is_some_and(|mark| confirmed > mark) {
                        retries = 0;
                    }
                    progress_mark = Some(confirmed);
                    retries += 1;

                    let policy = &inner.config.retry;
                    if retries > policy.max_retries {
                        return Err(UploadError::RetriesExhausted {
                            attempts: policy.max_retries,
                            last: Box::new(err),
                        });
                    }

                    let delay = policy.delay_for_attempt(retries);
                    warn!(
                        fingerprint = %fp,
                        attempt = retries,
                        delay_secs = delay.as_secs_f64(),
                        "upload interrupted: {err}"
                    );
                    send_state(events, fp, UploadState::Retrying);
                    let _ = events.try_send(UploadEvent::Retrying {
                        fingerprint: fp.to_string(),
                        attempt: retries,
                        next_retry_secs: delay.as_secs_f64(),
                        reason: err.to_string(),
                    });

                    tokio::select! {
                        _ = cancel.cancelled() => return Err(UploadError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    step = Step::Probe;
                }
                Err(err) => {
                    if err.invalidates_resource() {
                        info!(fingerprint = %fp, "server rejected resource, forgetting it: {err}");
                        inner.ledger.delete(fingerprint)?;
                    }
                    return Err(err);
                }
            }
        }
    }

    async fn probe(&self, total: u64, cancel: &CancellationToken) -> Result<Next, UploadError> {
        let caps = self.capabilities(cancel).await?;
        if let Some(max) = caps.max_upload_size_bytes.filter(|_| !caps.accepts_size(total)) {
            return Err(UploadError::TooLarge { size: total, max });
        }
        Ok(Next::Step(Step::Resolve))
    }

    async fn create(
        &self,
        target: &UploadTarget,
        fingerprint: &FileFingerprint,
        cancel: &CancellationToken,
    ) -> Result<Next, UploadError> {
        let inner = &self.inner;
        let descriptor = messages::create_resource(&inner.config.collection_path, target)
            .map_err(|e| UploadError::InvalidRequest(e.to_string()))?;
        let request = HttpRequest::from_descriptor(&descriptor, inner.config.request_timeout);
        let response = send_cancellable(inner.transport.as_ref(), request, cancel).await?;
        if response.status != STATUS_CREATED {
            return Err(UploadError::Protocol {
                operation: Operation::ResourceCreation,
                status: response.status,
            });
        }

        let resource_id = response::parse_location(&response.headers)?;
        inner.ledger.store(fingerprint, &resource_id)?;
        info!(fingerprint = %fingerprint, resource = %resource_id, "created upload resource");
        Ok(Next::Step(Step::Query { resource_id }))
    }
}

/// Handle to an upload spawned with [`UploadOrchestrator::start`].
pub struct UploadHandle {
    events: mpsc::Receiver<UploadEvent>,
    cancel: CancellationToken,
    task: JoinHandle<Result<String, UploadError>>,
}

impl UploadHandle {
    /// Next event, or `None` once the upload has finished and every event
    /// was read.
    pub async fn next_event(&mut self) -> Option<UploadEvent> {
        self.events.recv().await
    }

    /// Requests cancellation. Bytes the server already holds stay there and
    /// the ledger entry is kept, so a later upload resumes.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Waits for the upload to finish. Unread events are discarded.
    pub async fn wait(self) -> Result<String, UploadError> {
        let UploadHandle { events, task, .. } = self;
        drop(events);
        match task.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => Err(UploadError::Cancelled),
        }
    }
}

/// Marks a fingerprint as uploading for as long as it lives.
struct InFlightGuard<'a> {
    inner: &'a Inner,
    fingerprint: String,
}

impl<'a> InFlightGuard<'a> {
    fn claim(inner: &'a Inner, fingerprint: &str) -> Option<Self> {
        let mut set = inner.in_flight.lock().unwrap();
        if !set.insert(fingerprint.to_string()) {
            return None;
        }
        Some(Self {
            inner,
            fingerprint: fingerprint.to_string(),
        })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.inner.in_flight.lock().unwrap().remove(&self.fingerprint);
    }
}

fn send_state(events: &mpsc::Sender<UploadEvent>, fingerprint: &str, state: UploadState) {
    let _ = events.try_send(UploadEvent::StateChanged {
        fingerprint: fingerprint.to_string(),
        state,
    });
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Turns raw byte counts into throttled, never-decreasing progress events.
struct ProgressReporter {
    fingerprint: String,
    total: u64,
    events: mpsc::Sender<UploadEvent>,
    interval: std::time::Duration,
    speed: SpeedCalculator,
    state: Mutex<ReporterState>,
}

#[derive(Default)]
struct ReporterState {
    reported: u64,
    confirmed: u64,
    sampled: u64,
    last_emit: Option<Instant>,
}

impl ProgressReporter {
    fn new(
        fingerprint: &str,
        total: u64,
        events: mpsc::Sender<UploadEvent>,
        interval: std::time::Duration,
    ) -> Self {
        Self {
            fingerprint: fingerprint.to_string(),
            total,
            events,
            interval,
            speed: SpeedCalculator::default(),
            state: Mutex::new(ReporterState::default()),
        }
    }

    /// Highest offset the server has acknowledged.
    fn confirmed(&self) -> u64 {
        self.state.lock().unwrap().confirmed
    }

    /// Records bytes the server already held before this transfer.
    fn resume_from(&self, offset: u64) {
        {
            let mut s = self.state.lock().unwrap();
            s.confirmed = s.confirmed.max(offset);
            s.sampled = s.sampled.max(offset);
        }
        self.report(offset, true);
    }

    fn report(&self, bytes: u64, force: bool) {
        let mut s = self.state.lock().unwrap();
        if bytes > s.sampled {
            self.speed.add_sample(bytes - s.sampled);
            s.sampled = bytes;
        }
        if bytes <= s.reported {
            return;
        }
        let now = Instant::now();
        if !force && s.last_emit.is_some_and(|t| now.duration_since(t) < self.interval) {
            return;
        }
        s.reported = bytes;
        s.last_emit = Some(now);
        drop(s);

        let _ = self.events.try_send(UploadEvent::Progress {
            fingerprint: self.fingerprint.clone(),
            bytes_sent: bytes,
            total_bytes: self.total,
            bytes_per_second: self.speed.bytes_per_second(),
        });
    }
}

impl ProgressObserver for ProgressReporter {
    fn on_sent(&self, bytes_sent: u64) {
        self.report(bytes_sent, false);
    }

    fn on_confirmed(&self, offset: u64) {
        {
            let mut s = self.state.lock().unwrap();
            s.confirmed = s.confirmed.max(offset);
        }
        self.report(offset, true);
    }
}
