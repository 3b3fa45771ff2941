//! Async poll loop driving a [`PollMachine`].
//!
//! One loop per document id. Exactly one fetch is in flight at a time: the
//! next sleep only starts after the previous fetch resolved. Every sleep and
//! every fetch races the caller's [`CancellationToken`]; dropping the fetch
//! future aborts the underlying request, and the token is re-checked after a
//! fetch resolves so a late response is never applied.

use super::machine::{PollMachine, PollState, StopReason, Transition};
use super::scheduler::{Clock, Scheduler, SystemClock, TokioScheduler};
use crate::config::{ClientConfig, PollPolicy, ProcessingEstimates};
use crate::error::DocProcError;
use crate::model::{DocumentId, DocumentStatus, StatusRecord};
use crate::progress::{derive_progress, ProgressSnapshot, ProgressTracker, StatusCallback};
use crate::service::DocumentService;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Terminal observation of a document.
#[derive(Debug, Clone)]
pub struct PollOutcome {
    /// The record that ended the loop (`complete` or `failed`).
    pub record: StatusRecord,
    pub snapshot: ProgressSnapshot,
    /// Successful and failed fetches combined.
    pub fetches: u32,
}

impl PollOutcome {
    pub fn is_complete(&self) -> bool {
        self.record.status == DocumentStatus::Complete
    }

    /// Turn a server-reported failure into [`DocProcError::ProcessingFailed`].
    pub fn into_result(self) -> Result<StatusRecord, DocProcError> {
        match self.record.status {
            DocumentStatus::Failed => Err(DocProcError::ProcessingFailed {
                id: self.record.id.to_string(),
                message: self.record.failure_message(),
            }),
            _ => Ok(self.record),
        }
    }
}

/// Polls the status endpoint until a terminal state, exhaustion or
/// cancellation.
#[derive(Clone)]
pub struct StatusPoller {
    service: Arc<dyn DocumentService>,
    policy: PollPolicy,
    estimates: ProcessingEstimates,
    scheduler: Arc<dyn Scheduler>,
    clock: Arc<dyn Clock>,
    callback: Option<StatusCallback>,
}

impl StatusPoller {
    /// A poller with default timing, tokio timers and the system clock.
    pub fn new(service: Arc<dyn DocumentService>) -> Self {
        Self {
            service,
            policy: PollPolicy::default(),
            estimates: ProcessingEstimates::default(),
            scheduler: Arc::new(TokioScheduler),
            clock: Arc::new(SystemClock),
            callback: None,
        }
    }

    /// A poller using every knob and injection point from `config`.
    pub fn from_config(service: Arc<dyn DocumentService>, config: &ClientConfig) -> Self {
        Self {
            service,
            policy: config.poll,
            estimates: config.estimates,
            scheduler: config
                .scheduler
                .clone()
                .unwrap_or_else(|| Arc::new(TokioScheduler)),
            clock: config.clock.clone().unwrap_or_else(|| Arc::new(SystemClock)),
            callback: config.status_callback.clone(),
        }
    }

    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_callback(mut self, callback: StatusCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Derive the UI snapshot for a record, preferring the server's elapsed time.
    pub fn snapshot(&self, record: &StatusRecord) -> ProgressSnapshot {
        let elapsed = match record.elapsed_time {
            Some(secs) => Duration::from_secs(secs),
            None => (self.clock.now() - record.created_at)
                .to_std()
                .unwrap_or(Duration::ZERO),
        };
        derive_progress(
            record.status,
            elapsed,
            &record.processing_options,
            &self.estimates,
        )
    }

    /// Run the loop to completion.
    ///
    /// # Returns
    /// `Ok(PollOutcome)` for both `complete` and `failed`; inspect
    /// [`PollOutcome::is_complete`] or call [`PollOutcome::into_result`].
    ///
    /// # Errors
    /// - [`DocProcError::PollingExhausted`] after `max_consecutive_failures`
    ///   failed fetches in a row
    /// - [`DocProcError::Cancelled`] when `cancel` fires
    pub async fn poll(
        &self,
        id: &DocumentId,
        cancel: &CancellationToken,
    ) -> Result<PollOutcome, DocProcError> {
        info!("Polling status for document {}", id);
        if let Some(ref cb) = self.callback {
            cb.on_poll_start(id.as_str());
        }

        let mut machine = PollMachine::new(self.policy);
        let mut tracker = ProgressTracker::new();
        let mut last_snapshot: Option<ProgressSnapshot> = None;
        let mut next = machine.start();

        let reason = loop {
            let delay = match next {
                Transition::Stop(reason) => break reason,
                Transition::Schedule(delay) => delay,
            };

            if !delay.is_zero() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        next = machine.cancel();
                        continue;
                    }
                    _ = self.scheduler.sleep(delay) => {}
                }
            }
            if cancel.is_cancelled() {
                next = machine.cancel();
                continue;
            }

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    next = machine.cancel();
                    continue;
                }
                r = self.service.fetch_status(id) => r,
            };
            // Stopped while the response was on its way: discard it.
            if cancel.is_cancelled() {
                debug!("Document {}: discarding fetch result after cancellation", id);
                next = machine.cancel();
                continue;
            }

            let failed = result.as_ref().err().cloned();
            if let Ok(ref record) = result {
                if record.id != *id {
                    warn!("Status for {} came back with id {}", id, record.id);
                }
                record.check_invariants();
                let snapshot = tracker.observe(self.snapshot(record));
                debug!(
                    "Document {}: {} ({}%, server stage: {})",
                    id,
                    record.status,
                    snapshot.percentage,
                    record.progress_stage.as_deref().unwrap_or("-")
                );
                if let Some(ref cb) = self.callback {
                    cb.on_snapshot(id.as_str(), &snapshot);
                }
                last_snapshot = Some(snapshot);
            }

            next = machine.on_fetch(result);

            if let (Transition::Schedule(delay), Some(err)) = (&next, failed) {
                let failures = match machine.state() {
                    PollState::Polling {
                        consecutive_failures,
                    } => *consecutive_failures,
                    _ => 0,
                };
                warn!(
                    "Document {}: status fetch failed ({}/{}): {}; retrying in {:?}",
                    id, failures, self.policy.max_consecutive_failures, err, delay
                );
                if let Some(ref cb) = self.callback {
                    cb.on_retry(id.as_str(), failures, *delay, &err);
                }
            }
        };

        if let Some(ref cb) = self.callback {
            cb.on_poll_end(id.as_str(), reason.describe());
        }
        let fetches = machine.fetches();

        match reason {
            StopReason::Completed(record) | StopReason::Failed(record) => {
                info!(
                    "Document {} reached {} after {} fetches",
                    id, record.status, fetches
                );
                let snapshot = last_snapshot.unwrap_or_else(|| self.snapshot(&record));
                Ok(PollOutcome {
                    record,
                    snapshot,
                    fetches,
                })
            }
            StopReason::Exhausted {
                attempts,
                last_error,
            } => {
                warn!(
                    "Document {}: giving up after {} consecutive failed fetches",
                    id, attempts
                );
                Err(DocProcError::PollingExhausted {
                    id: id.to_string(),
                    attempts,
                    last_error: last_error.to_string(),
                })
            }
            StopReason::Cancelled => {
                info!("Polling for document {} cancelled", id);
                Err(DocProcError::Cancelled { id: id.to_string() })
            }
        }
    }

    /// Run the loop on a background task.
    pub fn spawn(&self, id: DocumentId) -> PollHandle {
        let poller = self.clone();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task_id = id.clone();
        let join = tokio::spawn(async move { poller.poll(&task_id, &token).await });
        PollHandle {
            id,
            cancel,
            join: Some(join),
        }
    }
}

/// A running poll loop. Dropping the handle stops the loop.
pub struct PollHandle {
    id: DocumentId,
    cancel: CancellationToken,
    join: Option<JoinHandle<Result<PollOutcome, DocProcError>>>,
}

impl PollHandle {
    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    /// Stop polling. Any in-flight fetch is abandoned and its result ignored.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map(|j| j.is_finished()).unwrap_or(true)
    }

    /// Wait for the loop to end.
    pub async fn wait(mut self) -> Result<PollOutcome, DocProcError> {
        let join = self
            .join
            .take()
            .ok_or_else(|| DocProcError::Internal("poll task already awaited".into()))?;
        join.await
            .map_err(|e| DocProcError::Internal(format!("poll task failed: {e}")))?
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
