//! Error types for the workshop-docproc library.
//!
//! Three error types reflect three distinct failure modes:
//!
//! * [`DocProcError`] : **Fatal**: the operation cannot proceed (bad input
//!   file, server rejected the upload, poll budget exhausted, processing
//!   failed). Returned as `Err(DocProcError)` from every public entry point.
//!
//! * [`FetchError`] : **Transient**: a single status fetch failed. The poll
//!   loop absorbs these with exponential backoff and only escalates to
//!   [`DocProcError::PollingExhausted`] once the retry budget is spent.
//!
//! * [`ValidationError`] : a local file check failed before any network
//!   call. Wrapped by [`DocProcError::Validation`].
//!
//! [`DocProcError::category`] and [`DocProcError::retry_hint`] let callers
//! decide what to offer the user without matching on every variant.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the workshop-docproc library.
#[derive(Debug, Error)]
pub enum DocProcError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The file failed local validation and was never sent.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    // ── Submission errors ─────────────────────────────────────────────────
    /// The request never produced a parsable response (connect, DNS, timeout).
    #[error("Network error during {operation}: {reason}\nCheck your connection and retry the upload.")]
    Network { operation: String, reason: String },

    /// The server refused the request (4xx), usually its own validation.
    #[error("Server rejected the request ({code}): {message}")]
    Rejected {
        status: u16,
        code: String,
        message: String,
        details: Option<serde_json::Value>,
    },

    /// The server failed while handling the request (5xx).
    #[error("Server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    /// A 2xx response whose body did not match the expected shape.
    #[error("Invalid response from {operation}: {reason}")]
    InvalidResponse { operation: String, reason: String },

    // ── Polling errors ────────────────────────────────────────────────────
    /// The consecutive-failure budget ran out; the document may still be
    /// processing server-side.
    #[error("Unable to get status updates for document '{id}' after {attempts} consecutive failures.\nLast error: {last_error}")]
    PollingExhausted {
        id: String,
        attempts: u32,
        last_error: String,
    },

    /// The server reported `failed` for the document.
    #[error("Processing failed for document '{id}': {message}")]
    ProcessingFailed { id: String, message: String },

    /// Polling was stopped by the caller.
    #[error("Polling cancelled for document '{id}'")]
    Cancelled { id: String },

    // ── Retrieval errors ──────────────────────────────────────────────────
    /// A download was requested before the document reached `complete`.
    #[error("Document '{id}' is not ready for download (status: {status})")]
    NotComplete { id: String, status: String },

    /// Status is `complete` but the record carries no download reference.
    #[error("Document '{id}' is complete but the server returned no download reference")]
    MissingDownloadReference { id: String },

    /// Fetching the converted artifact failed.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Could not create or write the output Markdown file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// No document service could be resolved from config or environment.
    #[error("Document service is not configured.\n{hint}")]
    ServiceNotConfigured { hint: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse grouping of [`DocProcError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Local checks failed; nothing reached the network.
    ClientValidation,
    /// The upload call failed or was refused.
    Submission,
    /// Status updates could not be obtained.
    PollingExhausted,
    /// The server reported a processing failure.
    ProcessingFailed,
    /// The converted artifact could not be located or fetched.
    Retrieval,
    /// The caller stopped the operation.
    Cancelled,
    /// Configuration, file system or internal failures on this side.
    Local,
}

/// What a caller should offer the user after an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryHint {
    /// Pick a different or corrected file and submit again.
    ResubmitCorrected,
    /// Retry the whole upload.
    RetryUpload,
    /// The document id is still valid; start a fresh poll.
    PollAgain,
    /// Nothing to retry automatically.
    None,
}

impl DocProcError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            DocProcError::Validation(_) => ErrorCategory::ClientValidation,
            DocProcError::Network { .. }
            | DocProcError::Rejected { .. }
            | DocProcError::Server { .. }
            | DocProcError::InvalidResponse { .. } => ErrorCategory::Submission,
            DocProcError::PollingExhausted { .. } => ErrorCategory::PollingExhausted,
            DocProcError::ProcessingFailed { .. } => ErrorCategory::ProcessingFailed,
            DocProcError::NotComplete { .. }
            | DocProcError::MissingDownloadReference { .. }
            | DocProcError::DownloadFailed { .. } => ErrorCategory::Retrieval,
            DocProcError::Cancelled { .. } => ErrorCategory::Cancelled,
            DocProcError::FileNotFound { .. }
            | DocProcError::PermissionDenied { .. }
            | DocProcError::OutputWriteFailed { .. }
            | DocProcError::ServiceNotConfigured { .. }
            | DocProcError::InvalidConfig(_)
            | DocProcError::Internal(_) => ErrorCategory::Local,
        }
    }

    pub fn retry_hint(&self) -> RetryHint {
        match self {
            DocProcError::Validation(_) | DocProcError::Rejected { .. } => {
                RetryHint::ResubmitCorrected
            }
            DocProcError::Network { .. }
            | DocProcError::Server { .. }
            | DocProcError::InvalidResponse { .. }
            | DocProcError::ProcessingFailed { .. } => RetryHint::RetryUpload,
            DocProcError::PollingExhausted { .. } | DocProcError::Cancelled { .. } => {
                RetryHint::PollAgain
            }
            DocProcError::DownloadFailed { .. } => RetryHint::PollAgain,
            _ => RetryHint::None,
        }
    }
}

/// A single failed status fetch.
///
/// Never returned from public entry points on its own; the poll loop counts
/// these and reports the last one inside [`DocProcError::PollingExhausted`].
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum FetchError {
    /// No response (connect failure, timeout, reset).
    #[error("network error: {0}")]
    Network(String),

    /// The status endpoint answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The body could not be decoded as a status record.
    #[error("undecodable status record: {0}")]
    Decode(String),
}

/// A local file check failure. Messages are shown to the user verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("File is empty - choose a document with content.")]
    EmptyFile,

    #[error(
        "File too large ({:.1}MB, {size} bytes) - maximum size is {}MB ({max} bytes). \
Try compressing your file or splitting it into multiple files.",
        mib(.size),
        whole_mib(.max)
    )]
    FileTooLarge { size: u64, max: u64 },

    #[error("Cannot process .{extension} files - supported formats: {allowed}.")]
    UnsupportedType {
        extension: String,
        content_type: Option<String>,
        allowed: String,
    },
}

impl ValidationError {
    /// Machine-readable code, matching the codes the server uses.
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::EmptyFile => "EMPTY_FILE",
            ValidationError::FileTooLarge { .. } => "FILE_TOO_LARGE",
            ValidationError::UnsupportedType { .. } => "UNSUPPORTED_FORMAT",
        }
    }
}

fn mib(bytes: &u64) -> f64 {
    *bytes as f64 / (1024.0 * 1024.0)
}

fn whole_mib(bytes: &u64) -> String {
    let m = mib(bytes);
    if m.fract() == 0.0 {
        format!("{}", m as u64)
    } else {
        format!("{m:.1}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_too_large_mentions_both_sizes() {
        let e = ValidationError::FileTooLarge {
            size: 11 * 1024 * 1024,
            max: 10 * 1024 * 1024,
        };
        let msg = e.to_string();
        assert!(msg.contains("11.0MB"), "got: {msg}");
        assert!(msg.contains("11534336"), "got: {msg}");
        assert!(msg.contains("maximum size is 10MB"), "got: {msg}");
        assert_eq!(e.code(), "FILE_TOO_LARGE");
    }

    #[test]
    fn unsupported_type_lists_allowed() {
        let e = ValidationError::UnsupportedType {
            extension: "txt".into(),
            content_type: Some("text/plain".into()),
            allowed: "PDF, DOCX, PPTX, XLSX".into(),
        };
        assert_eq!(
            e.to_string(),
            "Cannot process .txt files - supported formats: PDF, DOCX, PPTX, XLSX."
        );
    }

    #[test]
    fn validation_is_transparent() {
        let e: DocProcError = ValidationError::EmptyFile.into();
        assert_eq!(e.to_string(), ValidationError::EmptyFile.to_string());
        assert_eq!(e.category(), ErrorCategory::ClientValidation);
        assert_eq!(e.retry_hint(), RetryHint::ResubmitCorrected);
    }

    #[test]
    fn exhausted_is_distinct_from_processing_failure() {
        let exhausted = DocProcError::PollingExhausted {
            id: "doc-1".into(),
            attempts: 5,
            last_error: "HTTP 503: unavailable".into(),
        };
        let failed = DocProcError::ProcessingFailed {
            id: "doc-1".into(),
            message: "Corrupted file".into(),
        };
        assert!(exhausted.to_string().contains("Unable to get status updates"));
        assert_eq!(exhausted.category(), ErrorCategory::PollingExhausted);
        assert_eq!(exhausted.retry_hint(), RetryHint::PollAgain);
        assert_eq!(failed.category(), ErrorCategory::ProcessingFailed);
        assert_eq!(failed.retry_hint(), RetryHint::RetryUpload);
    }

    #[test]
    fn submission_errors_split_by_hint() {
        let rejected = DocProcError::Rejected {
            status: 413,
            code: "FILE_TOO_LARGE".into(),
            message: "too big".into(),
            details: None,
        };
        let network = DocProcError::Network {
            operation: "upload".into(),
            reason: "connection refused".into(),
        };
        assert_eq!(rejected.category(), ErrorCategory::Submission);
        assert_eq!(network.category(), ErrorCategory::Submission);
        assert_eq!(rejected.retry_hint(), RetryHint::ResubmitCorrected);
        assert_eq!(network.retry_hint(), RetryHint::RetryUpload);
    }

    #[test]
    fn fetch_error_display() {
        let e = FetchError::Http {
            status: 503,
            message: "Service Unavailable".into(),
        };
        assert_eq!(e.to_string(), "HTTP 503: Service Unavailable");
    }
}
