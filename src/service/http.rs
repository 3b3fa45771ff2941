//! `reqwest`-backed [`DocumentService`].

use super::error_body::parse_error_body;
use super::DocumentService;
use crate::config::ClientConfig;
use crate::error::{DocProcError, FetchError};
use crate::model::{DocumentId, HealthReport, StatusRecord, UploadReceipt, UploadRequest};
use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, Url};
use std::time::Duration;
use tracing::{debug, info};

/// Client for the processor's REST API.
#[derive(Debug, Clone)]
pub struct HttpDocumentService {
    client: reqwest::Client,
    /// Always ends with `/` so relative joins keep any path prefix.
    base: Url,
    api_key: Option<String>,
    request_timeout: Duration,
    transfer_timeout: Duration,
}

impl HttpDocumentService {
    /// A client for `api_url` with default timeouts and no credentials.
    pub fn new(api_url: &str) -> Result<Self, DocProcError> {
        let defaults = ClientConfig::default();
        Self::build(
            api_url,
            None,
            defaults.request_timeout_secs,
            defaults.download_timeout_secs,
        )
    }

    /// A client using the URL, key and timeouts from `config`.
    ///
    /// # Errors
    /// [`DocProcError::ServiceNotConfigured`] when `config.api_url` is unset.
    pub fn from_config(config: &ClientConfig) -> Result<Self, DocProcError> {
        let api_url = config
            .api_url
            .as_deref()
            .ok_or_else(|| DocProcError::ServiceNotConfigured {
                hint: "Set api_url on the config or the DOCPROC_API_URL environment variable."
                    .into(),
            })?;
        Self::build(
            api_url,
            config.api_key.clone(),
            config.request_timeout_secs,
            config.download_timeout_secs,
        )
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn build(
        api_url: &str,
        api_key: Option<String>,
        request_timeout_secs: u64,
        transfer_timeout_secs: u64,
    ) -> Result<Self, DocProcError> {
        let mut base = Url::parse(api_url)
            .map_err(|e| DocProcError::InvalidConfig(format!("API URL '{api_url}': {e}")))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = reqwest::Client::builder()
            .user_agent(concat!("workshop-docproc/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DocProcError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            base,
            api_key: api_key.filter(|k| !k.is_empty()),
            request_timeout: Duration::from_secs(request_timeout_secs),
            transfer_timeout: Duration::from_secs(transfer_timeout_secs),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, String> {
        self.base.join(path).map_err(|e| e.to_string())
    }

    /// `api/status/{id}` with the id percent-encoded as a single segment.
    fn status_url(&self, id: &DocumentId) -> Result<Url, String> {
        let mut url = self.endpoint("api/status/")?;
        url.path_segments_mut()
            .map_err(|_| format!("cannot append path segments to {}", self.base))?
            .pop_if_empty()
            .push(id.as_str());
        Ok(url)
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        match self.api_key {
            Some(ref key) => req.bearer_auth(key),
            None => req,
        }
    }

    fn network_error(&self, operation: &str, e: reqwest::Error, timeout: Duration) -> DocProcError {
        let reason = if e.is_timeout() {
            format!("timed out after {}s", timeout.as_secs())
        } else {
            e.to_string()
        };
        DocProcError::Network {
            operation: operation.to_string(),
            reason,
        }
    }
}

/// Map a non-2xx response to a fatal error.
async fn error_from_response(response: Response) -> DocProcError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let parsed = parse_error_body(status, &body);
    if (400..500).contains(&status) {
        DocProcError::Rejected {
            status,
            code: parsed.code,
            message: parsed.message,
            details: parsed.details,
        }
    } else {
        DocProcError::Server {
            status,
            message: parsed.message,
        }
    }
}

#[async_trait]
impl DocumentService for HttpDocumentService {
    async fn create_upload(&self, request: UploadRequest) -> Result<UploadReceipt, DocProcError> {
        let url = self
            .endpoint("api/upload")
            .map_err(DocProcError::InvalidConfig)?;
        info!(
            "Uploading '{}' ({} bytes, mode={}, ocr={})",
            request.filename,
            request.bytes.len(),
            request.options.processing_mode,
            request.options.ocr_enabled
        );

        let part = reqwest::multipart::Part::bytes(request.bytes)
            .file_name(request.filename.clone())
            .mime_str(&request.content_type)
            .map_err(|e| DocProcError::Internal(format!("content type: {e}")))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .authorized(self.client.post(url))
            .query(&[
                ("ocr_enabled", request.options.ocr_enabled.to_string()),
                (
                    "processing_mode",
                    request.options.processing_mode.as_str().to_string(),
                ),
            ])
            .multipart(form)
            .timeout(self.transfer_timeout)
            .send()
            .await
            .map_err(|e| self.network_error("upload", e, self.transfer_timeout))?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.network_error("upload", e, self.transfer_timeout))?;
        let receipt: UploadReceipt =
            serde_json::from_slice(&bytes).map_err(|e| DocProcError::InvalidResponse {
                operation: "upload".into(),
                reason: e.to_string(),
            })?;
        info!("Upload accepted: id={} status={}", receipt.id, receipt.status);
        Ok(receipt)
    }

    async fn fetch_status(&self, id: &DocumentId) -> Result<StatusRecord, FetchError> {
        let url = self.status_url(id).map_err(FetchError::Network)?;
        debug!("GET {}", url);

        let response = self
            .authorized(self.client.get(url))
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Network(format!(
                        "timed out after {}s",
                        self.request_timeout.as_secs()
                    ))
                } else {
                    FetchError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Http {
                status: status.as_u16(),
                message: parse_error_body(status.as_u16(), &body).message,
            });
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| FetchError::Decode(e.to_string()))
    }

    async fn fetch_artifact(&self, url: &str) -> Result<Vec<u8>, DocProcError> {
        info!("Downloading result from: {}", url);
        let failed = |reason: String| DocProcError::DownloadFailed {
            url: url.to_string(),
            reason,
        };

        let response = self
            .authorized(self.client.get(url))
            .timeout(self.transfer_timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    failed(format!("timed out after {}s", self.transfer_timeout.as_secs()))
                } else {
                    failed(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let parsed = parse_error_body(status.as_u16(), &body);
            return Err(failed(format!("HTTP {}: {}", status.as_u16(), parsed.message)));
        }
        let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;
        debug!("Downloaded {} bytes", bytes.len());
        Ok(bytes.to_vec())
    }

    fn resolve_download_url(&self, reference: &str) -> String {
        match Url::parse(reference) {
            Ok(absolute) => absolute.to_string(),
            Err(_) => self
                .base
                .join(reference)
                .map(|u| u.to_string())
                .unwrap_or_else(|_| reference.to_string()),
        }
    }

    async fn health(&self) -> Result<HealthReport, DocProcError> {
        let url = self
            .endpoint("api/health")
            .map_err(DocProcError::InvalidConfig)?;
        let response = self
            .authorized(self.client.get(url))
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| self.network_error("health check", e, self.request_timeout))?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.network_error("health check", e, self.request_timeout))?;
        serde_json::from_slice(&bytes).map_err(|e| DocProcError::InvalidResponse {
            operation: "health check".into(),
            reason: e.to_string(),
        })
    }
}
