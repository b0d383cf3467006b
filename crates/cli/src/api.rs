//! HTTP API client for the Barge server.

use anyhow::{Context, Result};
use barge_core::upload::{
    CHUNK_INDEX_HEADER, CHUNK_OFFSET_HEADER, ChunkAck, CleanupResponse, FinalizeRequest,
    FinalizeResponse, InitUploadRequest, InitUploadResponse, UploadStateResponse,
};
use bytes::Bytes;
use reqwest::Url;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Request failure, classified for the retry path.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// Connection reset, refused, or timed out. Transient.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// 5xx from the server. Transient.
    #[error("server error ({status}): {body}")]
    Server { status: u16, body: String },

    /// 4xx from the server. Retrying the same payload cannot succeed.
    #[error("request rejected ({status}): {body}")]
    Rejected { status: u16, body: String },

    /// Malformed request or response on the client side. Not retried.
    #[error("invalid request: {0}")]
    Invalid(String),
}

impl RequestError {
    /// Whether the failure feeds the retry-with-backoff path.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Server { .. })
    }
}

/// Typed client over the server's upload API.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
}

impl ApiClient {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url).context("invalid server URL")?;
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { http, base_url })
    }

    fn url(&self, path: &str) -> std::result::Result<Url, RequestError> {
        self.base_url
            .join(path)
            .map_err(|e| RequestError::Invalid(format!("bad URL path {path}: {e}")))
    }

    async fn execute(
        &self,
        req: reqwest::RequestBuilder,
    ) -> std::result::Result<reqwest::Response, RequestError> {
        let response = req.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        if status.is_server_error() {
            Err(RequestError::Server {
                status: status.as_u16(),
                body,
            })
        } else {
            Err(RequestError::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
    ) -> std::result::Result<T, RequestError> {
        let response = self.execute(req).await?;
        let body = response.text().await?;
        serde_json::from_str(&body)
            .map_err(|e| RequestError::Invalid(format!("unexpected response body: {e}")))
    }

    /// POST /api/upload/init
    pub async fn init_upload(
        &self,
        req: &InitUploadRequest,
    ) -> std::result::Result<InitUploadResponse, RequestError> {
        let url = self.url("/api/upload/init")?;
        self.send_json(self.http.post(url).json(req)).await
    }

    /// PUT /api/upload/{id}/chunk/{index}
    pub async fn put_chunk(
        &self,
        upload_id: &str,
        index: u64,
        offset: u64,
        body: Bytes,
    ) -> std::result::Result<(), RequestError> {
        let url = self.url(&format!("/api/upload/{upload_id}/chunk/{index}"))?;
        let _ack: ChunkAck = self
            .send_json(
                self.http
                    .put(url)
                    .header("Content-Type", "application/octet-stream")
                    .header(CHUNK_INDEX_HEADER, index.to_string())
                    .header(CHUNK_OFFSET_HEADER, offset.to_string())
                    .body(body),
            )
            .await?;
        Ok(())
    }

    /// POST /api/upload/{id}/finalize
    pub async fn finalize_upload(
        &self,
        upload_id: &str,
        req: &FinalizeRequest,
    ) -> std::result::Result<FinalizeResponse, RequestError> {
        let url = self.url(&format!("/api/upload/{upload_id}/finalize"))?;
        self.send_json(self.http.post(url).json(req)).await
    }

    /// GET /api/upload/{id}
    pub async fn get_state(
        &self,
        upload_id: &str,
    ) -> std::result::Result<UploadStateResponse, RequestError> {
        let url = self.url(&format!("/api/upload/{upload_id}"))?;
        self.send_json(self.http.get(url)).await
    }

    /// DELETE /api/files
    pub async fn cleanup(&self) -> std::result::Result<CleanupResponse, RequestError> {
        let url = self.url("/api/files")?;
        self.send_json(self.http.delete(url)).await
    }
}
