//! End-to-end entry points: validate → submit → poll → retrieve.
//!
//! Each stage is also exposed on its own so callers that already hold a
//! document id (a page reload, a second process) can resume at polling.
//!
//! ```text
//! file ─▶ validate ─▶ create_upload ─▶ StatusPoller ─▶ fetch_markdown ─▶ .md
//!          (local)      (POST)          (GET × n)        (GET)
//! ```

use crate::config::ClientConfig;
use crate::error::DocProcError;
use crate::model::{
    DocumentId, FileKind, HealthReport, ProcessingOptions, StatusRecord, UploadReceipt,
    UploadRequest,
};
use crate::poller::{PollOutcome, StatusPoller};
use crate::quality::{self, DocumentQualityReport};
use crate::retrieve::{self, clean_filename};
use crate::service::{DocumentService, HttpDocumentService};
use crate::validate::{io_error, validate_candidate, validate_path, FileCandidate};
use futures::future::join_all;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Environment variable consulted when no URL is configured.
pub const API_URL_ENV: &str = "DOCPROC_API_URL";
/// Environment variable holding an optional bearer token.
pub const API_KEY_ENV: &str = "DOCPROC_API_KEY";

/// A file accepted by the upload endpoint.
#[derive(Debug, Clone)]
pub struct SubmittedDocument {
    pub id: DocumentId,
    pub filename: String,
    pub kind: FileKind,
    pub size: u64,
    pub options: ProcessingOptions,
    pub receipt: UploadReceipt,
}

/// Timing and volume figures for one processed document.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkflowStats {
    pub bytes_uploaded: u64,
    pub markdown_bytes: usize,
    pub status_fetches: u32,
    pub upload_duration_ms: u64,
    pub poll_duration_ms: u64,
    pub download_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// A converted document.
#[derive(Debug, Clone)]
pub struct ProcessedDocument {
    pub id: DocumentId,
    pub markdown: String,
    /// The terminal `complete` record.
    pub record: StatusRecord,
    /// Suggested file name for the Markdown, derived from the upload name.
    pub output_filename: String,
    pub stats: WorkflowStats,
    /// Heuristic assessment of the Markdown.
    pub quality: DocumentQualityReport,
}

/// Validate and upload a file from disk.
///
/// Size and type are checked from metadata before the file is read, so an
/// oversized or unsupported file never touches the network.
pub async fn submit_file(
    path: impl AsRef<Path>,
    options: ProcessingOptions,
    config: &ClientConfig,
) -> Result<SubmittedDocument, DocProcError> {
    let path = path.as_ref();
    let (candidate, kind) = validate_path(path, &config.limits).await?;
    let service = resolve_service(config)?;
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| io_error(path.to_path_buf(), e))?;
    submit_validated(service.as_ref(), candidate, kind, bytes, options).await
}

/// Validate and upload an in-memory file.
///
/// `content_type` is the caller's declared MIME type, if any. A file passes
/// when either its extension or this type is allowed.
pub async fn submit_bytes(
    bytes: Vec<u8>,
    filename: impl Into<String>,
    content_type: Option<&str>,
    options: ProcessingOptions,
    config: &ClientConfig,
) -> Result<SubmittedDocument, DocProcError> {
    let mut candidate = FileCandidate::new(filename, bytes.len() as u64);
    if let Some(ct) = content_type {
        candidate = candidate.with_content_type(ct);
    }
    let kind = validate_candidate(&candidate, &config.limits)?;
    let service = resolve_service(config)?;
    submit_validated(service.as_ref(), candidate, kind, bytes, options).await
}

async fn submit_validated(
    service: &dyn DocumentService,
    candidate: FileCandidate,
    kind: FileKind,
    bytes: Vec<u8>,
    options: ProcessingOptions,
) -> Result<SubmittedDocument, DocProcError> {
    let size = bytes.len() as u64;
    let request = UploadRequest {
        filename: candidate.filename.clone(),
        content_type: kind.mime_type().to_string(),
        bytes,
        options,
    };
    debug!("Submitting {:?}", request);
    let receipt = service.create_upload(request).await?;
    Ok(SubmittedDocument {
        id: receipt.id.clone(),
        filename: candidate.filename,
        kind,
        size,
        options,
        receipt,
    })
}

/// Poll one document until it is terminal.
pub async fn poll_document(
    id: &DocumentId,
    config: &ClientConfig,
    cancel: &CancellationToken,
) -> Result<PollOutcome, DocProcError> {
    let service = resolve_service(config)?;
    StatusPoller::from_config(service, config)
        .poll(id, cancel)
        .await
}

/// Poll several documents concurrently, each with its own loop.
///
/// Results come back in input order. A failure in one loop does not affect
/// the others; cancelling `cancel` stops all of them.
pub async fn poll_many(
    ids: &[DocumentId],
    config: &ClientConfig,
    cancel: &CancellationToken,
) -> Result<Vec<(DocumentId, Result<PollOutcome, DocProcError>)>, DocProcError> {
    let service = resolve_service(config)?;
    let poller = StatusPoller::from_config(service, config);
    info!("Polling {} documents concurrently", ids.len());

    let loops = ids.iter().map(|id| {
        let poller = poller.clone();
        let token = cancel.child_token();
        async move {
            let result = poller.poll(id, &token).await;
            (id.clone(), result)
        }
    });
    Ok(join_all(loops).await)
}

/// Download the Markdown for a `complete` record.
pub async fn fetch_result(
    record: &StatusRecord,
    config: &ClientConfig,
) -> Result<String, DocProcError> {
    let service = resolve_service(config)?;
    retrieve::fetch_markdown(service.as_ref(), record).await
}

/// Convert a document: submit, poll to completion, download the Markdown.
///
/// # Errors
/// - [`DocProcError::Validation`] before any network call
/// - submission errors from the upload endpoint
/// - [`DocProcError::ProcessingFailed`] when the server reports `failed`
/// - [`DocProcError::PollingExhausted`] when status updates stop arriving
/// - retrieval errors when the artifact cannot be fetched
pub async fn process_file(
    path: impl AsRef<Path>,
    options: ProcessingOptions,
    config: &ClientConfig,
) -> Result<ProcessedDocument, DocProcError> {
    process_file_with_cancel(path, options, config, &CancellationToken::new()).await
}

/// [`process_file`] with a caller-owned cancellation token.
pub async fn process_file_with_cancel(
    path: impl AsRef<Path>,
    options: ProcessingOptions,
    config: &ClientConfig,
    cancel: &CancellationToken,
) -> Result<ProcessedDocument, DocProcError> {
    let total_start = Instant::now();
    let path = path.as_ref();
    info!("Processing {}", path.display());

    // ── Step 1: Validate + upload ────────────────────────────────────────
    let (candidate, kind) = validate_path(path, &config.limits).await?;
    let service = resolve_service(config)?;
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| io_error(path.to_path_buf(), e))?;
    let upload_start = Instant::now();
    let submitted = submit_validated(service.as_ref(), candidate, kind, bytes, options).await?;
    let upload_duration_ms = upload_start.elapsed().as_millis() as u64;

    // ── Step 2: Poll ─────────────────────────────────────────────────────
    let poll_start = Instant::now();
    let outcome = StatusPoller::from_config(Arc::clone(&service), config)
        .poll(&submitted.id, cancel)
        .await?;
    let status_fetches = outcome.fetches;
    let record = outcome.into_result()?;
    let poll_duration_ms = poll_start.elapsed().as_millis() as u64;

    // ── Step 3: Retrieve ─────────────────────────────────────────────────
    let download_start = Instant::now();
    let markdown = retrieve::fetch_markdown(service.as_ref(), &record).await?;
    let download_duration_ms = download_start.elapsed().as_millis() as u64;

    let stats = WorkflowStats {
        bytes_uploaded: submitted.size,
        markdown_bytes: markdown.len(),
        status_fetches,
        upload_duration_ms,
        poll_duration_ms,
        download_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };
    info!(
        "Document {} converted: {} bytes of Markdown, {} status fetches, {}ms total",
        submitted.id, stats.markdown_bytes, stats.status_fetches, stats.total_duration_ms
    );

    let quality = quality::assess(&markdown, &submitted.filename, submitted.kind);
    if !quality.overall_passed {
        warn!(
            "Document {}: low conversion quality ({:.2})",
            submitted.id, quality.overall_score
        );
    }

    Ok(ProcessedDocument {
        id: submitted.id,
        output_filename: clean_filename(&submitted.filename),
        markdown,
        record,
        stats,
        quality,
    })
}

/// Convert a document and write the Markdown to `output_path`.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn process_file_to_path(
    path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    options: ProcessingOptions,
    config: &ClientConfig,
) -> Result<WorkflowStats, DocProcError> {
    let doc = process_file(path, options, config).await?;
    retrieve::write_artifact(output_path, &doc.markdown).await?;
    Ok(doc.stats)
}

/// Synchronous wrapper around [`process_file`].
///
/// Creates a temporary tokio runtime internally.
pub fn process_file_sync(
    path: impl AsRef<Path>,
    options: ProcessingOptions,
    config: &ClientConfig,
) -> Result<ProcessedDocument, DocProcError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| DocProcError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(process_file(path, options, config))
}

/// Query the processor's health endpoint.
pub async fn health(config: &ClientConfig) -> Result<HealthReport, DocProcError> {
    resolve_service(config)?.health().await
}

/// Resolve the document service, from most-specific to least-specific.
///
/// 1. **Injected service** (`config.service`), used as-is. Tests and callers
///    with custom middleware take this path.
/// 2. **Configured URL** (`config.api_url`), with `config.api_key`.
/// 3. **Environment** (`DOCPROC_API_URL`, optionally `DOCPROC_API_KEY`).
pub fn resolve_service(config: &ClientConfig) -> Result<Arc<dyn DocumentService>, DocProcError> {
    if let Some(ref service) = config.service {
        return Ok(Arc::clone(service));
    }

    if config.api_url.is_some() {
        return Ok(Arc::new(HttpDocumentService::from_config(config)?));
    }

    match std::env::var(API_URL_ENV) {
        Ok(url) if !url.trim().is_empty() => {
            debug!("Using {} from the environment", API_URL_ENV);
            let mut resolved = config.clone();
            resolved.api_url = Some(url.trim().to_string());
            if resolved.api_key.is_none() {
                resolved.api_key = std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty());
            }
            Ok(Arc::new(HttpDocumentService::from_config(&resolved)?))
        }
        _ => Err(DocProcError::ServiceNotConfigured {
            hint: format!("Set api_url on the config, pass --api-url, or export {API_URL_ENV}."),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn injected_service_wins() {
        let config = ClientConfig::builder()
            .service(Arc::new(HttpDocumentService::new("http://injected:1").unwrap()))
            .api_url("http://configured:2")
            .build()
            .unwrap();
        assert!(resolve_service(&config).is_ok());
    }

    #[test]
    fn configured_url_builds_http_service() {
        let config = ClientConfig::builder()
            .api_url("http://localhost:8000")
            .build()
            .unwrap();
        assert!(resolve_service(&config).is_ok());
    }

    #[tokio::test]
    async fn oversized_bytes_rejected_before_service_resolution() {
        // No service configured at all: validation must fail first.
        let config = ClientConfig::builder().max_file_size(10).build().unwrap();
        let err = submit_bytes(vec![1; 11], "a.pdf", None, ProcessingOptions::default(), &config)
            .await
            .unwrap_err();
        assert!(matches!(err, DocProcError::Validation(_)));
    }

    #[test]
    fn sync_wrapper_runs_without_an_outer_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig::builder()
            .api_url("http://localhost:8000")
            .build()
            .unwrap();
        let result = process_file_sync(
            dir.path().join("missing.pdf"),
            ProcessingOptions::default(),
            &config,
        );
        assert!(result.is_err());
    }
}
