//! Scripted fakes shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use workshop_docproc::poller::{FixedClock, Scheduler};
use workshop_docproc::{
    DocProcError, DocumentId, DocumentService, DocumentStatus, FetchError, ProcessingOptions,
    ProgressSnapshot, StatusProgressCallback, StatusRecord, UploadReceipt, UploadRequest,
};

pub const MB: u64 = 1024 * 1024;

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 19, 10, 0, 0).unwrap()
}

/// A clock pinned `secs` after [`t0`].
pub fn clock_at(secs: i64) -> Arc<FixedClock> {
    Arc::new(FixedClock(t0() + ChronoDuration::seconds(secs)))
}

/// One scripted answer to a status fetch.
#[derive(Clone)]
pub enum Step {
    Status(DocumentStatus),
    /// `complete`, but without a download reference.
    CompleteWithoutUrl,
    /// `failed` with this error message.
    FailedWith(&'static str),
    /// The fetch itself fails.
    NetworkError,
    /// The fetch signals `started`, then waits for `release`, then reports
    /// `complete`.
    Gate {
        started: Arc<Notify>,
        release: Arc<Notify>,
    },
    /// The fetch cancels `token` itself, then reports `complete`, so the
    /// response is already in hand when the loop sees the cancellation.
    CancelThenComplete(CancellationToken),
}

pub fn record(id: &str, status: DocumentStatus) -> StatusRecord {
    StatusRecord {
        id: DocumentId::new(id),
        filename: "report.pdf".into(),
        status,
        processing_options: ProcessingOptions::default(),
        created_at: t0(),
        completed_at: status.is_terminal().then(t0),
        error_message: None,
        progress_stage: None,
        elapsed_time: None,
        download_url: (status == DocumentStatus::Complete).then(|| format!("/api/download/{id}")),
    }
}

/// Answers status fetches from a per-id script and counts everything.
#[derive(Default)]
pub struct ScriptedService {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    pub uploads: AtomicU32,
    pub fetches: AtomicU32,
    pub downloads: AtomicU32,
    in_flight: AtomicU32,
    pub max_in_flight: AtomicU32,
    pub last_upload: Mutex<Option<UploadRequest>>,
    pub artifact: String,
}

impl ScriptedService {
    pub fn new() -> Self {
        Self {
            artifact: "# Quarterly Report\n\n| Q | Revenue |\n|---|---|\n| 3 | 42 |\n".into(),
            ..Self::default()
        }
    }

    /// Script the answers for `doc-1`, the id every upload receives.
    pub fn with_script(self, steps: Vec<Step>) -> Self {
        self.script("doc-1", steps)
    }

    pub fn script(self, id: &str, steps: Vec<Step>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(id.to_string(), steps.into());
        self
    }

    pub fn fetches(&self) -> u32 {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn uploads(&self) -> u32 {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn downloads(&self) -> u32 {
        self.downloads.load(Ordering::SeqCst)
    }

    fn next_step(&self, id: &str) -> Option<Step> {
        self.scripts
            .lock()
            .unwrap()
            .get_mut(id)
            .and_then(|q| q.pop_front())
    }
}

#[async_trait]
impl DocumentService for ScriptedService {
    async fn create_upload(&self, request: UploadRequest) -> Result<UploadReceipt, DocProcError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        let receipt = UploadReceipt {
            id: DocumentId::new("doc-1"),
            filename: request.filename.clone(),
            status: DocumentStatus::Queued,
            message: Some("File uploaded successfully".into()),
        };
        *self.last_upload.lock().unwrap() = Some(request);
        Ok(receipt)
    }

    async fn fetch_status(&self, id: &DocumentId) -> Result<StatusRecord, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        // Give any would-be concurrent fetch a chance to start.
        tokio::task::yield_now().await;

        let result = match self.next_step(id.as_str()) {
            Some(Step::Status(status)) => Ok(record(id.as_str(), status)),
            Some(Step::CompleteWithoutUrl) => {
                let mut r = record(id.as_str(), DocumentStatus::Complete);
                r.download_url = None;
                Ok(r)
            }
            Some(Step::FailedWith(msg)) => {
                let mut r = record(id.as_str(), DocumentStatus::Failed);
                r.error_message = Some(msg.to_string());
                Ok(r)
            }
            Some(Step::NetworkError) | None => {
                Err(FetchError::Network("connection reset by peer".into()))
            }
            Some(Step::Gate { started, release }) => {
                started.notify_one();
                release.notified().await;
                Ok(record(id.as_str(), DocumentStatus::Complete))
            }
            Some(Step::CancelThenComplete(token)) => {
                token.cancel();
                Ok(record(id.as_str(), DocumentStatus::Complete))
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn fetch_artifact(&self, url: &str) -> Result<Vec<u8>, DocProcError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        if url.contains("/api/download/") {
            Ok(self.artifact.clone().into_bytes())
        } else {
            Err(DocProcError::DownloadFailed {
                url: url.to_string(),
                reason: "HTTP 404".into(),
            })
        }
    }
}

/// Records every requested delay and returns immediately.
#[derive(Default)]
pub struct RecordingScheduler {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingScheduler {
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

#[async_trait]
impl Scheduler for RecordingScheduler {
    async fn sleep(&self, delay: Duration) {
        self.delays.lock().unwrap().push(delay);
        tokio::task::yield_now().await;
    }
}

/// Never wakes up: the loop parks in its first sleep.
pub struct PendingScheduler;

#[async_trait]
impl Scheduler for PendingScheduler {
    async fn sleep(&self, _delay: Duration) {
        std::future::pending::<()>().await;
    }
}

/// Records callback events as short strings.
#[derive(Default)]
pub struct RecordingCallback {
    pub events: Mutex<Vec<String>>,
    pub snapshots: Mutex<Vec<ProgressSnapshot>>,
    pub first_snapshot: Notify,
}

impl RecordingCallback {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn percentages(&self) -> Vec<u8> {
        self.snapshots
            .lock()
            .unwrap()
            .iter()
            .map(|s| s.percentage)
            .collect()
    }
}

impl StatusProgressCallback for RecordingCallback {
    fn on_poll_start(&self, id: &str) {
        self.events.lock().unwrap().push(format!("start:{id}"));
    }

    fn on_snapshot(&self, _id: &str, snapshot: &ProgressSnapshot) {
        self.events
            .lock()
            .unwrap()
            .push(format!("snapshot:{}", snapshot.status));
        self.snapshots.lock().unwrap().push(snapshot.clone());
        self.first_snapshot.notify_one();
    }

    fn on_retry(&self, _id: &str, failures: u32, delay: Duration, _error: &FetchError) {
        self.events
            .lock()
            .unwrap()
            .push(format!("retry:{failures}:{}s", delay.as_secs()));
    }

    fn on_poll_end(&self, _id: &str, outcome: &str) {
        self.events.lock().unwrap().push(format!("end:{outcome}"));
    }
}
