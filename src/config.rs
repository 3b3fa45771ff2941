//! Configuration types for the document-processor client.
//!
//! All client behaviour is controlled through [`ClientConfig`], built via its
//! [`ClientConfigBuilder`]. Limits, poll timing and progress heuristics live
//! in small plain structs so the pure functions in [`crate::validate`],
//! [`crate::progress`] and [`crate::poller`] can take exactly what they need.

use crate::error::DocProcError;
use crate::model::{FileKind, ProcessingMode, ProcessingOptions};
use crate::poller::{Clock, Scheduler};
use crate::progress::StatusCallback;
use crate::service::DocumentService;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Static upload limits, checked locally before any network call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadLimits {
    /// Maximum file size in bytes. Default: 10 MiB.
    pub max_file_size: u64,
    /// Accepted document kinds. Default: PDF, DOCX, PPTX, XLSX.
    pub allowed_kinds: Vec<FileKind>,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_file_size: 10 * 1024 * 1024,
            allowed_kinds: FileKind::ALL.to_vec(),
        }
    }
}

impl UploadLimits {
    /// "PDF, DOCX, PPTX, XLSX"
    pub fn allowed_labels(&self) -> String {
        self.allowed_kinds
            .iter()
            .map(|k| k.label())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Timing of the status poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay between fetches while healthy. Default: 2 s.
    pub interval: Duration,
    /// Consecutive failed fetches tolerated before giving up. Default: 5.
    pub max_consecutive_failures: u32,
    /// Upper bound on a single backoff delay. Default: 60 s.
    pub max_backoff: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_consecutive_failures: 5,
            max_backoff: Duration::from_secs(60),
        }
    }
}

/// Baselines for the client-side progress and time-remaining heuristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessingEstimates {
    /// Expected duration of a fast conversion. Default: 30 s.
    pub fast: Duration,
    /// Expected duration of a quality conversion. Default: 90 s.
    pub quality: Duration,
    /// Factor applied when OCR is enabled. Default: 2.
    pub ocr_multiplier: u32,
    /// Lower bound on the reported time remaining. Default: 5 s.
    pub eta_floor: Duration,
    /// Upper bound on the reported time remaining. Default: 300 s.
    pub eta_ceiling: Duration,
    /// A queued document younger than this is still shown as uploading. Default: 5 s.
    pub uploading_window: Duration,
    /// A processing document older than this is shown as finalizing. Default: 100 s.
    pub finalizing_after: Duration,
}

impl Default for ProcessingEstimates {
    fn default() -> Self {
        Self {
            fast: Duration::from_secs(30),
            quality: Duration::from_secs(90),
            ocr_multiplier: 2,
            eta_floor: Duration::from_secs(5),
            eta_ceiling: Duration::from_secs(300),
            uploading_window: Duration::from_secs(5),
            finalizing_after: Duration::from_secs(100),
        }
    }
}

impl ProcessingEstimates {
    /// Expected total duration for a document with these options.
    pub fn expected(&self, options: &ProcessingOptions) -> Duration {
        let base = match options.processing_mode {
            ProcessingMode::Fast => self.fast,
            ProcessingMode::Quality => self.quality,
        };
        if options.ocr_enabled {
            base * self.ocr_multiplier.max(1)
        } else {
            base
        }
    }
}

/// Configuration for the document-processor client.
///
/// # Example
/// ```rust
/// use workshop_docproc::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig::builder()
///     .api_url("http://localhost:8000")
///     .poll_interval(Duration::from_secs(2))
///     .max_consecutive_failures(5)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ClientConfig {
    /// Base URL of the processor API, e.g. `http://localhost:8000`.
    /// If None, `DOCPROC_API_URL` is consulted when a service is needed.
    pub api_url: Option<String>,

    /// Bearer token sent with every request.
    pub api_key: Option<String>,

    pub limits: UploadLimits,

    pub poll: PollPolicy,

    pub estimates: ProcessingEstimates,

    /// Per-request timeout for upload/status/health calls in seconds. Default: 30.
    pub request_timeout_secs: u64,

    /// Timeout for fetching the converted artifact in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Pre-constructed service. Takes precedence over `api_url`.
    pub service: Option<Arc<dyn DocumentService>>,

    /// Timer used between polls. Defaults to tokio's sleep.
    pub scheduler: Option<Arc<dyn Scheduler>>,

    /// Wall clock used for elapsed-time fallbacks. Defaults to the system clock.
    pub clock: Option<Arc<dyn Clock>>,

    /// Receives status and retry events while polling.
    pub status_callback: Option<StatusCallback>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            api_key: None,
            limits: UploadLimits::default(),
            poll: PollPolicy::default(),
            estimates: ProcessingEstimates::default(),
            request_timeout_secs: 30,
            download_timeout_secs: 120,
            service: None,
            scheduler: None,
            clock: None,
            status_callback: None,
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("limits", &self.limits)
            .field("poll", &self.poll)
            .field("estimates", &self.estimates)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("service", &self.service.as_ref().map(|_| "<dyn DocumentService>"))
            .field("scheduler", &self.scheduler.as_ref().map(|_| "<dyn Scheduler>"))
            .field("clock", &self.clock.as_ref().map(|_| "<dyn Clock>"))
            .field(
                "status_callback",
                &self.status_callback.as_ref().map(|_| "<dyn StatusProgressCallback>"),
            )
            .finish()
    }
}

impl ClientConfig {
    /// Create a new builder for `ClientConfig`.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_url = Some(url.into());
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.config.limits.max_file_size = bytes;
        self
    }

    pub fn allowed_kinds(mut self, kinds: Vec<FileKind>) -> Self {
        self.config.limits.allowed_kinds = kinds;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll.interval = interval;
        self
    }

    pub fn max_consecutive_failures(mut self, n: u32) -> Self {
        self.config.poll.max_consecutive_failures = n.max(1);
        self
    }

    pub fn max_backoff(mut self, d: Duration) -> Self {
        self.config.poll.max_backoff = d;
        self
    }

    pub fn estimates(mut self, estimates: ProcessingEstimates) -> Self {
        self.config.estimates = estimates;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs.max(1);
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs.max(1);
        self
    }

    pub fn service(mut self, service: Arc<dyn DocumentService>) -> Self {
        self.config.service = Some(service);
        self
    }

    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.config.scheduler = Some(scheduler);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.config.clock = Some(clock);
        self
    }

    pub fn status_callback(mut self, cb: StatusCallback) -> Self {
        self.config.status_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ClientConfig, DocProcError> {
        let c = &self.config;
        if c.limits.max_file_size == 0 {
            return Err(DocProcError::InvalidConfig(
                "Maximum file size must be > 0".into(),
            ));
        }
        if c.limits.allowed_kinds.is_empty() {
            return Err(DocProcError::InvalidConfig(
                "At least one file type must be allowed".into(),
            ));
        }
        if c.poll.interval.is_zero() {
            return Err(DocProcError::InvalidConfig(
                "Poll interval must be > 0".into(),
            ));
        }
        if c.poll.max_backoff < c.poll.interval {
            return Err(DocProcError::InvalidConfig(format!(
                "Max backoff ({:?}) must be ≥ poll interval ({:?})",
                c.poll.max_backoff, c.poll.interval
            )));
        }
        if c.estimates.eta_floor > c.estimates.eta_ceiling {
            return Err(DocProcError::InvalidConfig(format!(
                "ETA floor ({:?}) must be ≤ ceiling ({:?})",
                c.estimates.eta_floor, c.estimates.eta_ceiling
            )));
        }
        if let Some(ref url) = c.api_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(DocProcError::InvalidConfig(format!(
                    "API URL must start with http:// or https://, got '{}'",
                    url
                )));
            }
        }
        Ok(self.config)
    }
}
