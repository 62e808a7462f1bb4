//! Storage node HTTP API
//!
//! - `GET  /ping`
//! - `POST /store_chunk/{chunk_id}` (multipart, field `file`)
//! - `GET  /chunk/{chunk_id}`

use crate::chunk_dir::ChunkDir;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use chunkfs_client::api::{ErrorBody, PAYLOAD_FIELD, PingResponse, StoreChunkResponse};
use chunkfs_common::{ChunkId, Error, now_millis};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

/// State shared by the storage node handlers
pub struct NodeService {
    pub node_id: String,
    pub chunks: ChunkDir,
}

impl NodeService {
    pub fn new(node_id: impl Into<String>, chunks: ChunkDir) -> Self {
        Self {
            node_id: node_id.into(),
            chunks,
        }
    }
}

/// Build the storage node router. `max_chunk_bytes` bounds request bodies.
pub fn router(service: Arc<NodeService>, max_chunk_bytes: usize) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/store_chunk/{chunk_id}", post(store_chunk))
        .route("/chunk/{chunk_id}", get(get_chunk))
        .layer(DefaultBodyLimit::max(max_chunk_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

fn error_response(e: &Error) -> Response {
    let status =
        StatusCode::from_u16(e.http_status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        error!("Request failed: {}", e);
    }
    (
        status,
        Json(ErrorBody {
            error: e.to_string(),
        }),
    )
        .into_response()
}

async fn ping(State(service): State<Arc<NodeService>>) -> Json<PingResponse> {
    Json(PingResponse {
        status: format!("{}-ok", service.node_id),
        time: now_millis(),
    })
}

async fn store_chunk(
    State(service): State<Arc<NodeService>>,
    Path(chunk_id): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    match receive_chunk(&service, chunk_id, multipart).await {
        Ok(chunk_id) => Json(StoreChunkResponse {
            status: "stored".to_string(),
            chunk: chunk_id.to_string(),
        })
        .into_response(),
        Err(e) => error_response(&e),
    }
}

async fn receive_chunk(
    service: &NodeService,
    chunk_id: String,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<ChunkId, Error> {
    let chunk_id = ChunkId::parse(chunk_id)?;
    let mut multipart = multipart.map_err(|e| Error::invalid_request(e.body_text()))?;

    let data = loop {
        let field = multipart
            .next_field()
            .await
            .map_err(|e| Error::invalid_request(e.body_text()))?
            .ok_or_else(|| Error::invalid_request("missing file field"))?;
        if field.name() == Some(PAYLOAD_FIELD) {
            break field
                .bytes()
                .await
                .map_err(|e| Error::invalid_request(e.body_text()))?;
        }
    };

    let len = data.len();
    let chunks = service.chunks.clone();
    let id = chunk_id.clone();
    tokio::task::spawn_blocking(move || chunks.write(&id, &data))
        .await
        .map_err(|e| Error::internal(format!("chunk write task failed: {e}")))??;

    info!("Stored chunk {} ({} bytes)", chunk_id, len);
    Ok(chunk_id)
}

async fn get_chunk(
    State(service): State<Arc<NodeService>>,
    Path(chunk_id): Path<String>,
) -> Response {
    match load_chunk(&service, chunk_id).await {
        Ok(data) => (
            [(header::CONTENT_TYPE, "application/octet-stream")],
            data,
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

async fn load_chunk(service: &NodeService, chunk_id: String) -> Result<Bytes, Error> {
    let chunk_id = ChunkId::parse(chunk_id)?;
    let chunks = service.chunks.clone();
    let id = chunk_id.clone();
    let data = tokio::task::spawn_blocking(move || chunks.read(&id))
        .await
        .map_err(|e| Error::internal(format!("chunk read task failed: {e}")))??
        .ok_or_else(|| Error::ChunkNotFound(chunk_id.to_string()))?;

    debug!("Served chunk {} ({} bytes)", chunk_id, data.len());
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tempfile::tempdir;
    use tower::ServiceExt;

    const BOUNDARY: &str = "chunkfs-test-boundary";

    fn app(dir: &std::path::Path) -> Router {
        let chunks = ChunkDir::open(dir).unwrap();
        router(Arc::new(NodeService::new("datanodeA", chunks)), 1024 * 1024)
    }

    fn multipart_request(uri: &str, field: &str, payload: &[u8]) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"chunk\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(payload);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::post(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_bytes(response: Response) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    #[tokio::test]
    async fn test_ping_names_node() {
        let dir = tempdir().unwrap();
        let response = app(dir.path())
            .oneshot(Request::get("/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(body["status"], "datanodeA-ok");
    }

    #[tokio::test]
    async fn test_store_then_fetch_chunk() {
        let dir = tempdir().unwrap();
        let app = app(dir.path());

        let response = app
            .clone()
            .oneshot(multipart_request("/store_chunk/doc_chunk_0", "file", b"chunk bytes"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(body["status"], "stored");
        assert_eq!(body["chunk"], "doc_chunk_0");

        let response = app
            .oneshot(Request::get("/chunk/doc_chunk_0").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, &b"chunk bytes"[..]);
    }

    #[tokio::test]
    async fn test_missing_chunk_is_404() {
        let dir = tempdir().unwrap();
        let response = app(dir.path())
            .oneshot(Request::get("/chunk/none_chunk_0").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert!(body["error"].as_str().unwrap().contains("none_chunk_0"));
    }

    #[tokio::test]
    async fn test_wrong_field_name_is_400() {
        let dir = tempdir().unwrap();
        let response = app(dir.path())
            .oneshot(multipart_request("/store_chunk/doc_chunk_0", "payload", b"x"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unsafe_chunk_id_is_400() {
        let dir = tempdir().unwrap();
        let response = app(dir.path())
            .oneshot(multipart_request("/store_chunk/bad%20id", "file", b"x"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
