//! Public types for the upload client.

use std::time::Duration;

use roomdrop_protocol::constants::DEFAULT_COLLECTION_PATH;
use roomdrop_protocol::{FileFingerprint, UploadTarget};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::FailureKind;

/// Client-side knobs for the upload protocol.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Collection endpoint, relative to the transport's base URL.
    pub collection_path: String,
    /// Timeout for probe, creation and offset requests.
    pub request_timeout: Duration,
    /// Timeout for a single chunk transfer request.
    pub transfer_timeout: Duration,
    /// Maximum bytes per PATCH. `None` sends the whole remainder at once.
    pub chunk_size: Option<u64>,
    /// Minimum spacing of unconfirmed progress events.
    pub progress_interval: Duration,
    /// Forget the ledger entry once an upload completes.
    pub remove_ledger_on_success: bool,
    pub retry: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            collection_path: DEFAULT_COLLECTION_PATH.to_string(),
            request_timeout: Duration::from_secs(30),
            transfer_timeout: Duration::from_secs(300),
            chunk_size: None,
            progress_interval: Duration::from_millis(250),
            remove_ledger_on_success: false,
            retry: RetryPolicy::default(),
        }
    }
}

/// Bounded retry with exponential backoff for network failures and timeouts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries allowed before the upload fails; the retry counter restarts
    /// whenever the server-confirmed offset advances.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between attempts (backoff cap).
    pub max_delay: Duration,
    /// Multiplier for each subsequent attempt.
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based), with ±25% jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(63) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exp);
        let capped = secs.min(self.max_delay.as_secs_f64());
        let jitter = capped * 0.25;
        let offset = (std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos() as f64
            / 1_000_000_000f64)
            * 2.0
            - 1.0; // [-1.0, 1.0)
        Duration::from_secs_f64((capped + jitter * offset).max(0.001))
    }
}

/// Orchestrator state, reported through [`UploadEvent::StateChanged`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadState {
    Idle,
    ProbingCapabilities,
    Resolving,
    Creating,
    QueryingOffset,
    Transferring,
    Retrying,
    Completed,
    Failed,
}

/// Events emitted while an upload runs.
///
/// Every upload ends with exactly one `Completed` or `Failed`.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadEvent {
    StateChanged {
        fingerprint: String,
        state: UploadState,
    },
    /// Bytes sent so far, counted from the start of the file. Never decreases
    /// within one upload.
    Progress {
        fingerprint: String,
        bytes_sent: u64,
        total_bytes: u64,
        bytes_per_second: f64,
    },
    Retrying {
        fingerprint: String,
        attempt: u32,
        next_retry_secs: f64,
        reason: String,
    },
    Completed {
        fingerprint: String,
        resource_id: String,
    },
    Failed {
        fingerprint: String,
        kind: FailureKind,
        message: String,
    },
}

impl UploadEvent {
    /// Returns `true` for `Completed` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadEvent::Completed { .. } | UploadEvent::Failed { .. })
    }
}

/// One attempt at moving bytes to a known resource.
///
/// Owned by the orchestrator for the duration of a transfer; `offset` always
/// holds the last offset the server confirmed.
#[derive(Debug)]
pub struct TransferSession {
    pub target: UploadTarget,
    pub fingerprint: FileFingerprint,
    pub resource_id: String,
    pub offset: u64,
    pub bytes_sent_this_attempt: u64,
    pub cancel: CancellationToken,
}

impl TransferSession {
    pub fn new(
        target: UploadTarget,
        fingerprint: FileFingerprint,
        resource_id: String,
        offset: u64,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            target,
            fingerprint,
            resource_id,
            offset,
            bytes_sent_this_attempt: 0,
            cancel,
        }
    }

    pub fn total_length(&self) -> u64 {
        self.target.size_bytes
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_complete(&self) -> bool {
        self.offset == self.total_length()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delay_grows_and_caps() {
        let policy = RetryPolicy {
            max_retries: 10,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
        };
        let first = policy.delay_for_attempt(1).as_secs_f64();
        assert!((0.075..=0.125).contains(&first), "first = {first}");

        let third = policy.delay_for_attempt(3).as_secs_f64();
        assert!((0.3..=0.5).contains(&third), "third = {third}");

        let capped = policy.delay_for_attempt(30).as_secs_f64();
        assert!((0.75..=1.25).contains(&capped), "capped = {capped}");
    }

    #[test]
    fn retry_delay_survives_huge_attempt_numbers() {
        let policy = RetryPolicy::default();
        let d = policy.delay_for_attempt(u32::MAX);
        assert!(d <= Duration::from_secs_f64(30.0 * 1.25));
    }

    #[test]
    fn default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.collection_path, "/files/");
        assert!(config.chunk_size.is_none());
        assert!(!config.remove_ledger_on_success);
        assert_eq!(config.retry.max_retries, 5);
    }

    #[test]
    fn terminal_events() {
        let done = UploadEvent::Completed {
            fingerprint: "f".into(),
            resource_id: "r".into(),
        };
        let progress = UploadEvent::Progress {
            fingerprint: "f".into(),
            bytes_sent: 1,
            total_bytes: 2,
            bytes_per_second: 0.0,
        };
        assert!(done.is_terminal());
        assert!(!progress.is_terminal());
    }

    #[test]
    fn state_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&UploadState::QueryingOffset).unwrap(),
            "\"querying_offset\""
        );
    }
}
