//! Result retrieval: locate, download and save the converted Markdown.
//!
//! Retrieval is only reachable from a `complete` record. Both rules below
//! are enforced here rather than trusted to the server.
//!
//! 1. A record that is not `complete` has nothing to download.
//! 2. A `complete` record without a download reference is a server fault,
//!    reported as its own error instead of a failed request.

use crate::error::DocProcError;
use crate::model::{DocumentStatus, StatusRecord};
use crate::service::DocumentService;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use tracing::{debug, info, warn};

/// Longest stem kept by [`clean_filename`], extension excluded.
const MAX_STEM_CHARS: usize = 200;

const FALLBACK_STEM: &str = "document";

/// Return the download reference of a finished document.
///
/// # Errors
/// - [`DocProcError::NotComplete`] when the status is anything but `complete`
/// - [`DocProcError::MissingDownloadReference`] when `complete` but no URL
pub fn download_reference(record: &StatusRecord) -> Result<&str, DocProcError> {
    if record.status != DocumentStatus::Complete {
        return Err(DocProcError::NotComplete {
            id: record.id.to_string(),
            status: record.status.to_string(),
        });
    }
    record
        .download_url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| DocProcError::MissingDownloadReference {
            id: record.id.to_string(),
        })
}

/// Download the Markdown produced for `record`.
pub async fn fetch_markdown(
    service: &dyn DocumentService,
    record: &StatusRecord,
) -> Result<String, DocProcError> {
    let reference = download_reference(record)?;
    let url = service.resolve_download_url(reference);
    let bytes = service.fetch_artifact(&url).await?;
    info!(
        "Retrieved {} bytes of Markdown for document {}",
        bytes.len(),
        record.id
    );
    match String::from_utf8(bytes) {
        Ok(text) => Ok(text),
        Err(e) => {
            warn!(
                "Document {}: artifact is not valid UTF-8, replacing invalid sequences",
                record.id
            );
            Ok(String::from_utf8_lossy(e.as_bytes()).into_owned())
        }
    }
}

// ── Output file naming ───────────────────────────────────────────────────────

static RESERVED_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1f\x7f]"#).unwrap());

static UNDERSCORE_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"_{2,}").unwrap());

static RESERVED_DEVICE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(con|prn|aux|nul|com[1-9]|lpt[1-9])$").unwrap());

/// Derive a safe `.md` file name from the uploaded file's name.
///
/// Directory components and the original extension are dropped, characters
/// that are invalid on common file systems are removed, whitespace becomes
/// `_`, and the stem is capped at 200 characters. Names that end up empty,
/// still contain `..`, or collide with a Windows device name become
/// `document.md`.
///
/// ```rust
/// use workshop_docproc::retrieve::clean_filename;
///
/// assert_eq!(clean_filename("Q3 Report (final).pdf"), "Q3_Report_(final).md");
/// assert_eq!(clean_filename("../../etc/passwd"), "passwd.md");
/// assert_eq!(clean_filename("???.docx"), "document.md");
/// ```
pub fn clean_filename(original: &str) -> String {
    let base = original
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(original)
        .trim();
    let stem = match base.rfind('.') {
        Some(idx) if idx > 0 => &base[..idx],
        _ => base,
    };

    let stripped = RESERVED_CHARS.replace_all(stem, "");
    let spaced: String = stripped
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect();
    let collapsed = UNDERSCORE_RUNS.replace_all(&spaced, "_");
    let trimmed = collapsed.trim_matches(|c| c == '_' || c == '.');
    let capped: String = trimmed.chars().take(MAX_STEM_CHARS).collect();
    let capped = capped.trim_end_matches(|c| c == '_' || c == '.');

    let unsafe_stem =
        capped.is_empty() || capped.contains("..") || RESERVED_DEVICE.is_match(capped);
    let stem = if unsafe_stem { FALLBACK_STEM } else { capped };
    format!("{stem}.md")
}

/// Write `content` to `path` atomically (temp file + rename).
///
/// Parent directories are created as needed. A crash mid-write leaves at
/// most a `.md.tmp` file behind, never a truncated `.md`.
pub async fn write_artifact(path: impl AsRef<Path>, content: &str) -> Result<(), DocProcError> {
    let path = path.as_ref();
    let write_failed = |source: std::io::Error| DocProcError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_failed)?;
    }

    let tmp_path = path.with_extension("md.tmp");
    tokio::fs::write(&tmp_path, content)
        .await
        .map_err(write_failed)?;
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(write_failed(e));
    }
    debug!("Wrote {} bytes to {}", content.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DocumentId, ProcessingOptions};
    use chrono::Utc;

    fn record(status: DocumentStatus, url: Option<&str>) -> StatusRecord {
        StatusRecord {
            id: DocumentId::new("doc-9"),
            filename: "deck.pptx".into(),
            status,
            processing_options: ProcessingOptions::default(),
            created_at: Utc::now(),
            completed_at: None,
            error_message: None,
            progress_stage: None,
            elapsed_time: None,
            download_url: url.map(str::to_string),
        }
    }

    #[test]
    fn reference_requires_complete() {
        for status in [
            DocumentStatus::Queued,
            DocumentStatus::Processing,
            DocumentStatus::Finalizing,
            DocumentStatus::Failed,
        ] {
            let err = download_reference(&record(status, Some("/api/download/doc-9"))).unwrap_err();
            assert!(matches!(err, DocProcError::NotComplete { .. }), "{status}");
        }
    }

    #[test]
    fn complete_without_reference_is_its_own_error() {
        for url in [None, Some(""), Some("   ")] {
            let err = download_reference(&record(DocumentStatus::Complete, url)).unwrap_err();
            assert!(matches!(err, DocProcError::MissingDownloadReference { .. }));
        }
        assert_eq!(
            download_reference(&record(DocumentStatus::Complete, Some("/api/download/doc-9")))
                .unwrap(),
            "/api/download/doc-9"
        );
    }

    #[test]
    fn clean_filename_cases() {
        assert_eq!(clean_filename("report.pdf"), "report.md");
        assert_eq!(clean_filename("My  Annual   Report.docx"), "My_Annual_Report.md");
        assert_eq!(clean_filename(r"C:\Users\me\plan<v2>.xlsx"), "planv2.md");
        assert_eq!(clean_filename("archive.tar.pdf"), "archive.tar.md");
        assert_eq!(clean_filename("__.hidden__.pdf"), "hidden.md");
        assert_eq!(clean_filename(".pdf"), "pdf.md");
        assert_eq!(clean_filename(""), "document.md");
        assert_eq!(clean_filename("CON.pdf"), "document.md");
        assert_eq!(clean_filename("lpt3.docx"), "document.md");
        assert_eq!(clean_filename("console.pdf"), "console.md");
        assert_eq!(clean_filename("tab\there.pdf"), "tabhere.md");
    }

    #[test]
    fn clean_filename_rejects_dot_runs() {
        assert_eq!(clean_filename("a..b.pdf"), "document.md");
        assert_eq!(clean_filename("notes...final.docx"), "document.md");
        assert_eq!(clean_filename("v1.2.pdf"), "v1.2.md");
    }

    #[test]
    fn clean_filename_caps_length() {
        let long = format!("{}.pdf", "a".repeat(500));
        let cleaned = clean_filename(&long);
        assert_eq!(cleaned.len(), MAX_STEM_CHARS + 3);
        assert!(cleaned.ends_with(".md"));
    }

    #[tokio::test]
    async fn write_artifact_creates_parents_and_leaves_no_tmp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/nested/report.md");
        write_artifact(&path, "# Title\n").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# Title\n");
        assert!(!path.with_extension("md.tmp").exists());
    }
}
