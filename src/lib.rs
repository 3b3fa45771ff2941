//! # workshop-docproc
//!
//! Client for the workshop document processor: upload PDF, DOCX, PPTX and
//! XLSX files, follow their conversion, and fetch the resulting Markdown.
//!
//! ## Why this crate?
//!
//! Conversion runs asynchronously on the server and can take minutes. The
//! hard part on the client side is following a document through its
//! lifecycle without hammering the API, without giving up on a short network
//! blip, and without leaking a poll loop once nobody is watching. This crate
//! packages that as a tested state machine plus thin HTTP plumbing.
//!
//! ## Lifecycle Overview
//!
//! ```text
//! file
//!  │
//!  ├─ 1. Validate  size ≤ 10 MiB, type in {PDF, DOCX, PPTX, XLSX}   (local)
//!  ├─ 2. Submit    POST /api/upload → document id
//!  ├─ 3. Poll      GET /api/status/{id} every 2s, backoff on failure
//!  │                 queued → processing → finalizing → complete | failed
//!  ├─ 4. Retrieve  GET download_url → Markdown
//!  └─ 5. Assess    table/heading/text heuristics → quality report   (local)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use workshop_docproc::{process_file, ClientConfig, ProcessingMode, ProcessingOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::builder()
//!         .api_url("http://localhost:8000")
//!         .build()?;
//!     let options = ProcessingOptions::new(false, ProcessingMode::Fast);
//!     let doc = process_file("report.pdf", options, &config).await?;
//!     println!("{}", doc.markdown);
//!     eprintln!("{} status fetches", doc.stats.status_fetches);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docproc` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! workshop-docproc = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod model;
pub mod poller;
pub mod progress;
pub mod quality;
pub mod retrieve;
pub mod service;
pub mod stream;
pub mod validate;
pub mod workflow;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    ClientConfig, ClientConfigBuilder, PollPolicy, ProcessingEstimates, UploadLimits,
};
pub use error::{DocProcError, ErrorCategory, FetchError, RetryHint, ValidationError};
pub use model::{
    DocumentId, DocumentStatus, FileKind, HealthReport, ProcessingMode, ProcessingOptions,
    StatusRecord, UploadReceipt, UploadRequest,
};
pub use poller::{PollHandle, PollOutcome, StatusPoller};
pub use progress::{
    derive_progress, NoopStatusCallback, ProgressSnapshot, ProgressStage, StatusCallback,
    StatusProgressCallback,
};
pub use quality::{DocumentQualityReport, QualityMetric, QualityScore};
pub use service::{DocumentService, HttpDocumentService};
pub use stream::{watch_stream, SnapshotStream};
pub use validate::{validate_candidate, validate_path, FileCandidate};
pub use workflow::{
    fetch_result, health, poll_document, poll_many, process_file, process_file_sync,
    process_file_to_path, process_file_with_cancel, submit_bytes, submit_file,
    ProcessedDocument, SubmittedDocument, WorkflowStats,
};
