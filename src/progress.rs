//! Progress heuristics and the status-callback trait.
//!
//! The status record carries no percentage. [`derive_progress`] turns
//! `(status, elapsed, options)` into a [`ProgressSnapshot`] using the fixed
//! baselines in [`ProcessingEstimates`]; it is pure so it can be tested
//! without a network or a timer. [`ProgressTracker`] sits on top and keeps
//! the reported percentage from moving backwards between polls.
//!
//! Inject an `Arc<dyn StatusProgressCallback>` via
//! [`crate::config::ClientConfigBuilder::status_callback`] to receive events
//! from the poll loop.
//!
//! # Example
//!
//! ```rust
//! use workshop_docproc::{ClientConfig, ProgressSnapshot, StatusProgressCallback};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl StatusProgressCallback for Printer {
//!     fn on_snapshot(&self, id: &str, snapshot: &ProgressSnapshot) {
//!         eprintln!("{id}: {}% {}", snapshot.percentage, snapshot.stage.label());
//!     }
//! }
//!
//! let config = ClientConfig::builder()
//!     .status_callback(Arc::new(Printer))
//!     .build()
//!     .unwrap();
//! ```

use crate::config::ProcessingEstimates;
use crate::error::FetchError;
use crate::model::{DocumentStatus, ProcessingOptions};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Human-readable stage shown next to the progress bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStage {
    Uploading,
    Queued,
    Converting,
    Finalizing,
    Complete,
    Failed,
}

impl ProgressStage {
    pub fn label(self) -> &'static str {
        match self {
            ProgressStage::Uploading => "Uploading file...",
            ProgressStage::Queued => "Queued for processing",
            ProgressStage::Converting => "Converting document",
            ProgressStage::Finalizing => "Finalizing...",
            ProgressStage::Complete => "Processing complete",
            ProgressStage::Failed => "Processing failed",
        }
    }
}

/// UI-facing view of one status observation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub status: DocumentStatus,
    pub stage: ProgressStage,
    /// 0–100. Exactly 100 only for `complete`, exactly 0 for `failed`.
    pub percentage: u8,
    pub elapsed: Duration,
    /// `None` once the document is terminal.
    pub estimated_remaining: Option<Duration>,
}

/// Share of the bar reserved for the queued phase.
const QUEUED_CEILING: u64 = 10;
/// Highest percentage a non-complete document can show.
const NON_COMPLETE_CEILING: u64 = 95;
/// Width of the processing band (10 → 90 before capping).
const PROCESSING_SPAN: u64 = 80;

/// Compute progress for one observation.
pub fn derive_progress(
    status: DocumentStatus,
    elapsed: Duration,
    options: &ProcessingOptions,
    estimates: &ProcessingEstimates,
) -> ProgressSnapshot {
    let expected = estimates.expected(options);
    let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
    let expected_ms = u64::try_from(expected.as_millis()).unwrap_or(u64::MAX).max(1);

    let (stage, percentage) = match status {
        DocumentStatus::Uploading => (ProgressStage::Uploading, 0),
        DocumentStatus::Queued => {
            let stage = if elapsed < estimates.uploading_window {
                ProgressStage::Uploading
            } else {
                ProgressStage::Queued
            };
            (stage, elapsed.as_secs().saturating_mul(2).min(QUEUED_CEILING))
        }
        DocumentStatus::Processing => {
            let stage = if elapsed >= estimates.finalizing_after {
                ProgressStage::Finalizing
            } else {
                ProgressStage::Converting
            };
            let pct = QUEUED_CEILING
                .saturating_add(elapsed_ms.saturating_mul(PROCESSING_SPAN) / expected_ms);
            (stage, pct.min(NON_COMPLETE_CEILING))
        }
        DocumentStatus::Finalizing => (ProgressStage::Finalizing, NON_COMPLETE_CEILING),
        DocumentStatus::Complete => (ProgressStage::Complete, 100),
        DocumentStatus::Failed => (ProgressStage::Failed, 0),
    };

    let estimated_remaining = if status.is_terminal() {
        None
    } else {
        Some(
            expected
                .saturating_sub(elapsed)
                .clamp(estimates.eta_floor, estimates.eta_ceiling),
        )
    };

    ProgressSnapshot {
        status,
        stage,
        percentage: percentage as u8,
        elapsed,
        estimated_remaining,
    }
}

/// Keeps the non-terminal percentage monotonically non-decreasing.
///
/// Heuristic inputs can wobble (a server clock correction, a status going
/// backwards); the user should never see the bar shrink before a terminal
/// state.
#[derive(Debug, Default, Clone)]
pub struct ProgressTracker {
    high_water: u8,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, mut snapshot: ProgressSnapshot) -> ProgressSnapshot {
        match snapshot.status {
            DocumentStatus::Complete | DocumentStatus::Failed => {}
            _ => {
                snapshot.percentage = snapshot.percentage.max(self.high_water).min(99);
                self.high_water = snapshot.percentage;
            }
        }
        snapshot
    }

    pub fn high_water(&self) -> u8 {
        self.high_water
    }
}

/// Called by the poll loop as it observes a document.
///
/// Implementations must be `Send + Sync`: several documents can be polled
/// concurrently, each from its own task. All methods have default no-op
/// implementations so callers only override what they care about.
pub trait StatusProgressCallback: Send + Sync {
    /// Called once before the first fetch.
    fn on_poll_start(&self, id: &str) {
        let _ = id;
    }

    /// Called after every successful fetch, including the terminal one.
    fn on_snapshot(&self, id: &str, snapshot: &ProgressSnapshot) {
        let _ = (id, snapshot);
    }

    /// Called after a failed fetch that will be retried.
    ///
    /// # Arguments
    /// * `failures` : consecutive failures so far (1-based)
    /// * `delay`    : time until the next attempt
    fn on_retry(&self, id: &str, failures: u32, delay: Duration, error: &FetchError) {
        let _ = (id, failures, delay, error);
    }

    /// Called once when the loop ends, whatever the reason.
    ///
    /// `outcome` is a short description: the terminal status, "exhausted",
    /// or "cancelled".
    fn on_poll_end(&self, id: &str, outcome: &str) {
        let _ = (id, outcome);
    }
}

/// A no-op implementation for callers that don't need events.
pub struct NoopStatusCallback;

impl StatusProgressCallback for NoopStatusCallback {}

/// Convenience alias matching the type stored in [`crate::config::ClientConfig`].
pub type StatusCallback = Arc<dyn StatusProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProcessingMode;

    fn fast() -> ProcessingOptions {
        ProcessingOptions::new(false, ProcessingMode::Fast)
    }

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn fast_mode_halfway_is_fifty_percent() {
        let est = ProcessingEstimates::default();
        let p = derive_progress(DocumentStatus::Processing, secs(15), &fast(), &est);
        assert_eq!(p.percentage, 50);
        assert_eq!(p.stage, ProgressStage::Converting);
        assert_eq!(p.estimated_remaining, Some(secs(15)));
    }

    #[test]
    fn quality_with_ocr_halfway_is_fifty_percent() {
        let opts = ProcessingOptions::new(true, ProcessingMode::Quality);
        let est = ProcessingEstimates::default();
        let p = derive_progress(DocumentStatus::Processing, secs(90), &opts, &est);
        assert_eq!(p.percentage, 50);
        assert_eq!(p.estimated_remaining, Some(secs(90)));
    }

    #[test]
    fn processing_caps_at_95_and_relabels_as_finalizing() {
        let est = ProcessingEstimates::default();
        let p = derive_progress(DocumentStatus::Processing, secs(200), &fast(), &est);
        assert_eq!(p.percentage, 95);
        assert_eq!(p.stage, ProgressStage::Finalizing);
        // Past the estimate the ETA bottoms out at the floor.
        assert_eq!(p.estimated_remaining, Some(secs(5)));
    }

    #[test]
    fn huge_server_elapsed_time_does_not_overflow() {
        let est = ProcessingEstimates::default();
        let expected = [
            (DocumentStatus::Uploading, 0),
            (DocumentStatus::Queued, 10),
            (DocumentStatus::Processing, 95),
            (DocumentStatus::Finalizing, 95),
        ];
        for (status, pct) in expected {
            let p = derive_progress(status, Duration::from_secs(u64::MAX), &fast(), &est);
            assert_eq!(p.percentage, pct, "{status}");
            assert_eq!(p.estimated_remaining, Some(est.eta_floor), "{status}");
        }
    }

    #[test]
    fn eta_is_capped_at_ceiling() {
        let est = ProcessingEstimates {
            quality: secs(600),
            ..ProcessingEstimates::default()
        };
        let opts = ProcessingOptions::new(true, ProcessingMode::Quality);
        let p = derive_progress(DocumentStatus::Queued, secs(0), &opts, &est);
        assert_eq!(p.estimated_remaining, Some(secs(300)));
    }

    #[test]
    fn queued_stages() {
        let est = ProcessingEstimates::default();
        let young = derive_progress(DocumentStatus::Queued, secs(2), &fast(), &est);
        assert_eq!(young.stage, ProgressStage::Uploading);
        assert_eq!(young.stage.label(), "Uploading file...");
        assert!(young.percentage <= 10);

        let old = derive_progress(DocumentStatus::Queued, secs(8), &fast(), &est);
        assert_eq!(old.stage.label(), "Queued for processing");
        assert_eq!(old.percentage, 10);
    }

    #[test]
    fn terminal_states() {
        let est = ProcessingEstimates::default();
        let done = derive_progress(DocumentStatus::Complete, secs(40), &fast(), &est);
        assert_eq!(done.percentage, 100);
        assert_eq!(done.estimated_remaining, None);
        assert_eq!(done.stage.label(), "Processing complete");

        let failed = derive_progress(DocumentStatus::Failed, secs(40), &fast(), &est);
        assert_eq!(failed.percentage, 0);
        assert_eq!(failed.estimated_remaining, None);
    }

    #[test]
    fn never_100_before_complete() {
        let est = ProcessingEstimates::default();
        for status in [
            DocumentStatus::Uploading,
            DocumentStatus::Queued,
            DocumentStatus::Processing,
            DocumentStatus::Finalizing,
        ] {
            for s in [0, 1, 10, 29, 30, 31, 100, 10_000] {
                let p = derive_progress(status, secs(s), &fast(), &est);
                assert!(p.percentage < 100, "{status} at {s}s gave {}", p.percentage);
                let eta = p.estimated_remaining.unwrap();
                assert!(eta >= est.eta_floor && eta <= est.eta_ceiling);
            }
        }
    }

    #[test]
    fn monotonic_along_the_happy_path() {
        let est = ProcessingEstimates::default();
        let mut last = 0;
        let steps = [
            (DocumentStatus::Queued, 0),
            (DocumentStatus::Queued, 4),
            (DocumentStatus::Processing, 6),
            (DocumentStatus::Processing, 20),
            (DocumentStatus::Processing, 60),
            (DocumentStatus::Finalizing, 61),
        ];
        for (status, s) in steps {
            let p = derive_progress(status, secs(s), &fast(), &est);
            assert!(p.percentage >= last, "{status}@{s}s: {} < {last}", p.percentage);
            last = p.percentage;
        }
    }

    #[test]
    fn tracker_never_goes_backwards() {
        let est = ProcessingEstimates::default();
        let mut tracker = ProgressTracker::new();
        let a = tracker.observe(derive_progress(
            DocumentStatus::Processing,
            secs(20),
            &fast(),
            &est,
        ));
        // Status regressed to queued on the server.
        let b = tracker.observe(derive_progress(DocumentStatus::Queued, secs(21), &fast(), &est));
        assert!(b.percentage >= a.percentage);
        // Failure still reports 0.
        let c = tracker.observe(derive_progress(DocumentStatus::Failed, secs(22), &fast(), &est));
        assert_eq!(c.percentage, 0);
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb: StatusCallback = Arc::new(NoopStatusCallback);
        let est = ProcessingEstimates::default();
        let snap = derive_progress(DocumentStatus::Queued, secs(1), &fast(), &est);
        cb.on_poll_start("doc");
        cb.on_snapshot("doc", &snap);
        cb.on_retry("doc", 1, secs(2), &FetchError::Network("reset".into()));
        cb.on_poll_end("doc", "complete");
    }
}
