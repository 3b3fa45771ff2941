//! Local file validation.
//!
//! These checks are a UX shortcut that saves a wasted upload; the server
//! re-applies its own. Everything here is a pure function of the candidate
//! and the configured [`UploadLimits`].

use crate::config::UploadLimits;
use crate::error::{DocProcError, ValidationError};
use crate::model::FileKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// What is known about a file before it is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCandidate {
    pub filename: String,
    pub size: u64,
    /// Declared MIME type, if the caller has one.
    pub content_type: Option<String>,
}

impl FileCandidate {
    pub fn new(filename: impl Into<String>, size: u64) -> Self {
        Self {
            filename: filename.into(),
            size,
            content_type: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Lowercase extension of the file name, without the dot.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
    }

    /// The kind the file will be uploaded as: extension first, then MIME type.
    pub fn kind(&self, limits: &UploadLimits) -> Option<FileKind> {
        let by_ext = self
            .extension()
            .and_then(|e| FileKind::from_extension(&e))
            .filter(|k| limits.allowed_kinds.contains(k));
        by_ext.or_else(|| {
            self.content_type
                .as_deref()
                .and_then(FileKind::from_mime_type)
                .filter(|k| limits.allowed_kinds.contains(k))
        })
    }
}

/// Check a candidate against the limits.
///
/// A file passes the type check when *either* its extension or its declared
/// content type is allowed.
pub fn validate_candidate(
    candidate: &FileCandidate,
    limits: &UploadLimits,
) -> Result<FileKind, ValidationError> {
    if candidate.size == 0 {
        return Err(ValidationError::EmptyFile);
    }
    if candidate.size > limits.max_file_size {
        return Err(ValidationError::FileTooLarge {
            size: candidate.size,
            max: limits.max_file_size,
        });
    }
    match candidate.kind(limits) {
        Some(kind) => {
            debug!(
                "Validated '{}' as {} ({} bytes)",
                candidate.filename,
                kind.label(),
                candidate.size
            );
            Ok(kind)
        }
        None => Err(ValidationError::UnsupportedType {
            extension: candidate.extension().unwrap_or_default(),
            content_type: candidate.content_type.clone(),
            allowed: limits.allowed_labels(),
        }),
    }
}

/// Stat a local file and validate it. Reads metadata only, not content.
pub async fn validate_path(
    path: impl AsRef<Path>,
    limits: &UploadLimits,
) -> Result<(FileCandidate, FileKind), DocProcError> {
    let path = path.as_ref();
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| io_error(path.to_path_buf(), e))?;
    if !meta.is_file() {
        return Err(DocProcError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let candidate = FileCandidate::new(filename, meta.len());
    let kind = validate_candidate(&candidate, limits)?;
    Ok((candidate, kind))
}

pub(crate) fn io_error(path: PathBuf, e: std::io::Error) -> DocProcError {
    if e.kind() == std::io::ErrorKind::PermissionDenied {
        DocProcError::PermissionDenied { path }
    } else {
        DocProcError::FileNotFound { path }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MB: u64 = 1024 * 1024;

    #[test]
    fn accepts_allowed_extensions_case_insensitively() {
        let limits = UploadLimits::default();
        for name in ["a.pdf", "b.DOCX", "c.pptx", "report.final.Xlsx"] {
            assert!(
                validate_candidate(&FileCandidate::new(name, MB), &limits).is_ok(),
                "{name}"
            );
        }
    }

    #[test]
    fn rejects_oversized_with_actual_and_limit() {
        let limits = UploadLimits::default();
        let err = validate_candidate(&FileCandidate::new("big.pdf", 11 * MB), &limits).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("11"), "got: {msg}");
        assert!(msg.contains("10MB"), "got: {msg}");
        assert_eq!(
            err,
            ValidationError::FileTooLarge {
                size: 11 * MB,
                max: 10 * MB
            }
        );
    }

    #[test]
    fn exactly_at_limit_passes() {
        let limits = UploadLimits::default();
        assert!(validate_candidate(&FileCandidate::new("a.pdf", 10 * MB), &limits).is_ok());
        assert!(validate_candidate(&FileCandidate::new("a.pdf", 10 * MB + 1), &limits).is_err());
    }

    #[test]
    fn rejects_txt_listing_allowed_types() {
        let limits = UploadLimits::default();
        let err = validate_candidate(
            &FileCandidate::new("notes.txt", 100).with_content_type("text/plain"),
            &limits,
        )
        .unwrap_err();
        let msg = err.to_string();
        for label in ["PDF", "DOCX", "PPTX", "XLSX"] {
            assert!(msg.contains(label), "missing {label} in: {msg}");
        }
        assert_eq!(err.code(), "UNSUPPORTED_FORMAT");
    }

    #[test]
    fn either_extension_or_content_type_suffices() {
        let limits = UploadLimits::default();
        // Wrong extension, right MIME type.
        let c = FileCandidate::new("upload.bin", 100).with_content_type("application/pdf");
        assert_eq!(validate_candidate(&c, &limits), Ok(FileKind::Pdf));
        // Right extension, wrong MIME type.
        let c = FileCandidate::new("slides.pptx", 100)
            .with_content_type("application/octet-stream");
        assert_eq!(validate_candidate(&c, &limits), Ok(FileKind::Pptx));
        // No extension at all, no MIME type.
        let c = FileCandidate::new("README", 100);
        assert!(validate_candidate(&c, &limits).is_err());
    }

    #[test]
    fn restricted_allow_list_is_honoured() {
        let limits = UploadLimits {
            max_file_size: MB,
            allowed_kinds: vec![FileKind::Pdf],
        };
        let err = validate_candidate(&FileCandidate::new("a.docx", 10), &limits).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot process .docx files - supported formats: PDF."
        );
    }

    #[test]
    fn empty_file_rejected() {
        let limits = UploadLimits::default();
        assert_eq!(
            validate_candidate(&FileCandidate::new("a.pdf", 0), &limits),
            Err(ValidationError::EmptyFile)
        );
    }

    #[tokio::test]
    async fn validate_path_reports_missing_file() {
        let err = validate_path("/definitely/not/here.pdf", &UploadLimits::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DocProcError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn validate_path_reads_size_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deck.pptx");
        std::fs::write(&path, vec![0u8; 2048]).unwrap();
        let (candidate, kind) = validate_path(&path, &UploadLimits::default()).await.unwrap();
        assert_eq!(candidate.size, 2048);
        assert_eq!(candidate.filename, "deck.pptx");
        assert_eq!(kind, FileKind::Pptx);
    }
}
