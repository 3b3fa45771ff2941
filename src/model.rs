//! Wire and domain types shared by every stage.
//!
//! The status record is owned by the external processing system; this crate
//! only ever reads it. Types here therefore describe what the server sends
//! and carry no mutation paths of their own.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Opaque identifier issued by the upload endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for DocumentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Lifecycle status of a document.
///
/// `Uploading` never comes from the server; it is the client-side state
/// between picking a file and receiving an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Uploading,
    Queued,
    Processing,
    Finalizing,
    Complete,
    Failed,
}

impl DocumentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, DocumentStatus::Complete | DocumentStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DocumentStatus::Uploading => "uploading",
            DocumentStatus::Queued => "queued",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Finalizing => "finalizing",
            DocumentStatus::Complete => "complete",
            DocumentStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Conversion speed/quality trade-off chosen at submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingMode {
    /// Basic extraction, no table structure analysis. (default)
    #[default]
    Fast,
    /// Full layout and table analysis.
    Quality,
}

impl ProcessingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessingMode::Fast => "fast",
            ProcessingMode::Quality => "quality",
        }
    }
}

impl fmt::Display for ProcessingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options fixed at submission time and never mutated afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProcessingOptions {
    #[serde(default)]
    pub ocr_enabled: bool,
    /// Some server builds store this under `mode`.
    #[serde(default, alias = "mode")]
    pub processing_mode: ProcessingMode,
}

impl ProcessingOptions {
    pub fn new(ocr_enabled: bool, processing_mode: ProcessingMode) -> Self {
        Self {
            ocr_enabled,
            processing_mode,
        }
    }
}

/// Document kinds the processor can convert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Pdf,
    Docx,
    Pptx,
    Xlsx,
}

impl FileKind {
    pub const ALL: [FileKind; 4] = [FileKind::Pdf, FileKind::Docx, FileKind::Pptx, FileKind::Xlsx];

    /// Lowercase extension without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            FileKind::Pdf => "pdf",
            FileKind::Docx => "docx",
            FileKind::Pptx => "pptx",
            FileKind::Xlsx => "xlsx",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            FileKind::Pdf => "application/pdf",
            FileKind::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            FileKind::Pptx => {
                "application/vnd.openxmlformats-officedocument.presentationml.presentation"
            }
            FileKind::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        }
    }

    /// Upper-case label used in user-facing messages.
    pub fn label(self) -> &'static str {
        match self {
            FileKind::Pdf => "PDF",
            FileKind::Docx => "DOCX",
            FileKind::Pptx => "PPTX",
            FileKind::Xlsx => "XLSX",
        }
    }

    /// Case-insensitive lookup by extension (with or without leading dot).
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        Self::ALL.into_iter().find(|k| k.extension() == ext)
    }

    /// Lookup by MIME type; parameters such as `; charset=` are ignored.
    pub fn from_mime_type(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|k| k.mime_type() == essence)
    }
}

/// The status record as returned by the status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub id: DocumentId,
    pub filename: String,
    pub status: DocumentStatus,
    #[serde(default)]
    pub processing_options: ProcessingOptions,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error_message: Option<String>,
    /// Server-side stage label. Informational only.
    #[serde(default)]
    pub progress_stage: Option<String>,
    /// Seconds since creation as measured by the server.
    #[serde(default)]
    pub elapsed_time: Option<u64>,
    #[serde(default)]
    pub download_url: Option<String>,
}

impl StatusRecord {
    /// Log any lifecycle invariant the server broke. Returns `true` when the
    /// record is consistent.
    pub fn check_invariants(&self) -> bool {
        let mut ok = true;
        let terminal = self.status.is_terminal();
        if terminal != self.completed_at.is_some() {
            warn!(
                "Document {}: completed_at is {} but status is {}",
                self.id,
                if self.completed_at.is_some() { "set" } else { "unset" },
                self.status
            );
            ok = false;
        }
        let failed = self.status == DocumentStatus::Failed;
        if failed != self.error_message.is_some() {
            warn!(
                "Document {}: error_message is {} but status is {}",
                self.id,
                if self.error_message.is_some() { "set" } else { "unset" },
                self.status
            );
            ok = false;
        }
        if self.download_url.is_some() && self.status != DocumentStatus::Complete {
            warn!(
                "Document {}: download reference present while status is {}",
                self.id, self.status
            );
            ok = false;
        }
        ok
    }

    /// The failure message, or a generic one when the server omitted it.
    pub fn failure_message(&self) -> String {
        self.error_message
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| "Processing failed".to_string())
    }
}

/// Response of the upload endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub id: DocumentId,
    pub filename: String,
    pub status: DocumentStatus,
    #[serde(default)]
    pub message: Option<String>,
}

/// A validated file ready to be sent.
#[derive(Clone)]
pub struct UploadRequest {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
    pub options: ProcessingOptions,
}

impl fmt::Debug for UploadRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadRequest")
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .field("bytes", &self.bytes.len())
            .field("options", &self.options)
            .finish()
    }
}

/// Response of the health endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    #[serde(default)]
    pub database_connected: bool,
    #[serde(default)]
    pub storage_connected: bool,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy" && self.database_connected && self.storage_connected
    }
}
