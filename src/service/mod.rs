//! The remote document processor.
//!
//! [`DocumentService`] is the seam between the workflow and the network.
//! [`HttpDocumentService`] talks to the real REST API; tests substitute
//! scripted fakes.

pub mod error_body;
pub mod http;

pub use error_body::{parse_error_body, ApiErrorBody};
pub use http::HttpDocumentService;

use crate::error::{DocProcError, FetchError};
use crate::model::{DocumentId, HealthReport, StatusRecord, UploadReceipt, UploadRequest};
use async_trait::async_trait;

/// Operations the processor exposes.
///
/// Implementations must be `Send + Sync`: one service is shared by every
/// concurrent poll loop.
#[async_trait]
pub trait DocumentService: Send + Sync {
    /// Submit a file. Returns the server-assigned id.
    async fn create_upload(&self, request: UploadRequest) -> Result<UploadReceipt, DocProcError>;

    /// Fetch the current status record. Every failure is transient from the
    /// caller's point of view.
    async fn fetch_status(&self, id: &DocumentId) -> Result<StatusRecord, FetchError>;

    /// Download the artifact behind a (resolved) download reference.
    async fn fetch_artifact(&self, url: &str) -> Result<Vec<u8>, DocProcError>;

    /// Turn a download reference from a status record into a fetchable URL.
    fn resolve_download_url(&self, reference: &str) -> String {
        reference.to_string()
    }

    /// Query the health endpoint.
    async fn health(&self) -> Result<HealthReport, DocProcError> {
        Err(DocProcError::Internal(
            "health check is not supported by this service".into(),
        ))
    }
}
