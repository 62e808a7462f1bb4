//! Client for the coordinator's HTTP API
//!
//! Used by storage nodes to register and heartbeat, and by the CLI for
//! everything else. Control calls (ping, register, heartbeat, status) are
//! bounded by a fixed timeout; uploads and downloads are not, since their
//! duration scales with file size.

use crate::api::{
    HeartbeatRequest, PAYLOAD_FIELD, PingResponse, RegisterResponse, StatusResponse,
    UploadResponse,
};
use crate::transport::error_from_response;
use bytes::Bytes;
use chunkfs_common::{Error, Result};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// A file fetched through `GET /download/{file_id}`
#[derive(Clone, Debug)]
pub struct DownloadedFile {
    /// Original filename from `Content-Disposition`, when present
    pub filename: Option<String>,
    pub bytes: Bytes,
}

/// HTTP client for one coordinator
#[derive(Clone)]
pub struct CoordinatorClient {
    base: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl CoordinatorClient {
    pub fn new(base: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base: base.into().trim_end_matches('/').to_string(),
            client,
            timeout,
        })
    }

    /// Base URL of the coordinator
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base
    }

    pub async fn ping(&self) -> Result<PingResponse> {
        let request = self.client.get(format!("{}/ping", self.base));
        self.send_json(request, Some(self.timeout)).await
    }

    /// Register a storage node. `info` is sent as the request body with
    /// `node_id` added.
    pub async fn register(
        &self,
        node_id: &str,
        mut info: serde_json::Map<String, serde_json::Value>,
    ) -> Result<RegisterResponse> {
        info.insert(
            "node_id".to_string(),
            serde_json::Value::String(node_id.to_string()),
        );
        let request = self
            .client
            .post(format!("{}/register", self.base))
            .json(&info);
        self.send_json(request, Some(self.timeout)).await
    }

    /// Send a heartbeat. A coordinator that does not know the node answers
    /// 404, surfaced as `Error::NodeNotFound`.
    pub async fn heartbeat(&self, node_id: &str) -> Result<()> {
        let request = self
            .client
            .post(format!("{}/heartbeat", self.base))
            .json(&HeartbeatRequest {
                node_id: node_id.to_string(),
            });
        let response = self.send(request, Some(self.timeout)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::NodeNotFound(node_id.to_string()));
        }
        if !response.status().is_success() {
            return Err(error_from_response(&self.base, response).await);
        }
        debug!("Heartbeat for {} acknowledged", node_id);
        Ok(())
    }

    pub async fn status(&self) -> Result<StatusResponse> {
        let request = self.client.get(format!("{}/status", self.base));
        self.send_json(request, Some(self.timeout)).await
    }

    /// Upload `data` under `filename`
    pub async fn upload(&self, filename: &str, data: Bytes) -> Result<UploadResponse> {
        let len = data.len() as u64;
        let part = reqwest::multipart::Part::stream_with_length(reqwest::Body::from(data), len)
            .file_name(filename.to_string());
        let form = reqwest::multipart::Form::new().part(PAYLOAD_FIELD, part);
        let request = self
            .client
            .post(format!("{}/upload", self.base))
            .multipart(form);
        self.send_json(request, None).await
    }

    /// Download a file by id. Unknown ids fail with `Error::FileNotFound`.
    pub async fn download(&self, file_id: &str) -> Result<DownloadedFile> {
        let request = self
            .client
            .get(format!("{}/download/{}", self.base, file_id));
        let response = self.send(request, None).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::FileNotFound(file_id.to_string()));
        }
        if !response.status().is_success() {
            return Err(error_from_response(&self.base, response).await);
        }

        let filename = response
            .headers()
            .get(reqwest::header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(attachment_filename);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::upstream(&self.base, e))?;
        Ok(DownloadedFile { filename, bytes })
    }

    async fn send(
        &self,
        request: RequestBuilder,
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response> {
        let send = request.send();
        let result = match timeout {
            Some(limit) => tokio::time::timeout(limit, send)
                .await
                .map_err(|_| Error::Timeout)?,
            None => send.await,
        };
        result.map_err(|e| Error::upstream(&self.base, e))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        timeout: Option<Duration>,
    ) -> Result<T> {
        let response = self.send(request, timeout).await?;
        if !response.status().is_success() {
            return Err(error_from_response(&self.base, response).await);
        }
        response
            .json::<T>()
            .await
            .map_err(|e| Error::Serialization(e.to_string()))
    }
}

/// Extract `filename` from an `attachment; filename="..."` header value
fn attachment_filename(header: &str) -> Option<String> {
    header
        .split(';')
        .map(str::trim)
        .find_map(|param| param.strip_prefix("filename="))
        .map(|name| name.trim_matches('"').to_string())
        .filter(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Json;
    use axum::Router;
    use axum::http::{StatusCode as AxumStatus, header};
    use axum::response::IntoResponse;
    use axum::routing::{get, post};

    async fn spawn(router: Router) -> CoordinatorClient {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
        CoordinatorClient::new(format!("http://{addr}/"), Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn test_attachment_filename() {
        assert_eq!(
            attachment_filename(r#"attachment; filename="report.pdf""#).as_deref(),
            Some("report.pdf")
        );
        assert_eq!(attachment_filename("attachment").as_deref(), None);
        assert_eq!(attachment_filename(r#"attachment; filename="""#).as_deref(), None);
    }

    #[tokio::test]
    async fn test_register_sends_node_id_with_info() {
        let router = Router::new().route(
            "/register",
            post(|Json(body): Json<serde_json::Value>| async move {
                assert_eq!(body["node_id"], "datanodeA");
                assert_eq!(body["port"], 5001);
                Json(serde_json::json!({ "message": "registered datanodeA" }))
            }),
        );
        let client = spawn(router).await;

        let mut info = serde_json::Map::new();
        info.insert("port".to_string(), serde_json::json!(5001));
        let response = client.register("datanodeA", info).await.unwrap();
        assert_eq!(response.message, "registered datanodeA");
    }

    #[tokio::test]
    async fn test_heartbeat_404_is_node_not_found() {
        let router = Router::new().route(
            "/heartbeat",
            post(|| async {
                (
                    AxumStatus::NOT_FOUND,
                    Json(serde_json::json!({ "error": "unknown storage node: ghost" })),
                )
            }),
        );
        let client = spawn(router).await;

        let err = client.heartbeat("ghost").await.unwrap_err();
        assert!(matches!(err, Error::NodeNotFound(ref id) if id == "ghost"));
    }

    #[tokio::test]
    async fn test_download_reads_content_disposition() {
        let router = Router::new().route(
            "/download/{file_id}",
            get(|| async {
                (
                    [(header::CONTENT_DISPOSITION, r#"attachment; filename="notes.txt""#)],
                    "contents",
                )
                    .into_response()
            }),
        );
        let client = spawn(router).await;

        let file = client.download("notes").await.unwrap();
        assert_eq!(file.filename.as_deref(), Some("notes.txt"));
        assert_eq!(&file.bytes[..], b"contents");
    }

    #[tokio::test]
    async fn test_server_error_message_is_kept() {
        let router = Router::new().route(
            "/status",
            get(|| async {
                (
                    AxumStatus::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({ "error": "snapshot unreadable" })),
                )
            }),
        );
        let client = spawn(router).await;

        let err = client.status().await.unwrap_err();
        assert!(err.to_string().contains("snapshot unreadable"));
    }
}
