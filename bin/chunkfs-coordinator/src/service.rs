//! Coordinator HTTP API
//!
//! Routes:
//! - `GET  /ping`
//! - `GET  /status`
//! - `POST /register`        (storage node registration)
//! - `POST /heartbeat`
//! - `POST /upload`          (multipart, field `file`)
//! - `GET  /download/{file_id}`

use crate::error::ApiError;
use crate::reconstruction::Reconstructor;
use crate::replication::{Orchestrator, UploadReport};
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chunkfs_client::ChunkTransport;
use chunkfs_client::api::{
    HeartbeatResponse, NodeStatus, PAYLOAD_FIELD, PingResponse, RegisterResponse, StatusResponse,
    UploadResponse,
};
use chunkfs_common::{Config, Error, now_millis};
use chunkfs_meta_store::{LivenessTracker, MetaStore, NodeLiveness};
use futures::TryStreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::io::StreamReader;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared state behind every coordinator handler
pub struct AppState {
    pub store: Arc<MetaStore>,
    pub liveness: LivenessTracker,
    pub orchestrator: Orchestrator,
    pub reconstructor: Reconstructor,
}

impl AppState {
    pub fn new(config: &Config, store: Arc<MetaStore>, transport: Arc<dyn ChunkTransport>) -> Self {
        Self {
            liveness: LivenessTracker::new(
                store.clone(),
                Duration::from_millis(config.liveness.down_after_ms),
            ),
            orchestrator: Orchestrator::new(
                store.clone(),
                transport.clone(),
                config.replica_endpoints(),
                config.chunk_size_bytes,
            ),
            reconstructor: Reconstructor::new(store.clone(), transport),
            store,
        }
    }
}

/// Build the coordinator router
pub fn router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/status", get(status))
        .route("/register", post(register))
        .route("/heartbeat", post(heartbeat))
        .route("/upload", post(upload))
        .route("/download/{file_id}", get(download))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn ping() -> Json<PingResponse> {
    Json(PingResponse {
        status: "coordinator-ok".to_string(),
        time: now_millis(),
    })
}

async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let datanodes = state
        .liveness
        .liveness(now_millis())
        .into_iter()
        .map(|node| (node.node_id.clone(), node_status(node)))
        .collect();

    Json(StatusResponse {
        datanodes,
        files: state.store.snapshot().files,
    })
}

fn node_status(node: NodeLiveness) -> NodeStatus {
    NodeStatus {
        node_id: node.node_id,
        last_heartbeat: node.last_heartbeat,
        age_ms: node.age_ms,
        state: node.state,
        registration_info: node.registration_info,
    }
}

async fn register(
    State(state): State<Arc<AppState>>,
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<Json<RegisterResponse>, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let serde_json::Value::Object(info) = body else {
        return Err(ApiError::bad_request("expected a JSON object"));
    };
    let node_id = node_id_of(&info)?.to_string();

    let first = state.liveness.register(&node_id, info)?;
    let message = if first {
        format!("Registered {node_id}")
    } else {
        format!("Re-registered {node_id}")
    };
    Ok(Json(RegisterResponse { message }))
}

async fn heartbeat(
    State(state): State<Arc<AppState>>,
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<Json<HeartbeatResponse>, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let serde_json::Value::Object(info) = body else {
        return Err(ApiError::bad_request("expected a JSON object"));
    };

    state.liveness.heartbeat(node_id_of(&info)?)?;
    Ok(Json(HeartbeatResponse {
        status: "heartbeat-received".to_string(),
    }))
}

/// Non-empty string `node_id` from a register/heartbeat body
fn node_id_of(body: &serde_json::Map<String, serde_json::Value>) -> Result<&str, ApiError> {
    body.get("node_id")
        .and_then(serde_json::Value::as_str)
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("missing node_id"))
}

async fn upload(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut multipart = multipart.map_err(|e| ApiError::bad_request(e.body_text()))?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.body_text()))?
    {
        if field.name() != Some(PAYLOAD_FIELD) {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::to_string)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ApiError::bad_request("no file selected"))?;

        let reader = StreamReader::new(field.map_err(std::io::Error::other));
        let report = state.orchestrator.upload(&filename, reader).await?;
        return Ok(Json(upload_response(report)));
    }

    Err(Error::invalid_request("no file part in request").into())
}

fn upload_response(report: UploadReport) -> UploadResponse {
    UploadResponse {
        message: "File uploaded and chunked successfully".to_string(),
        file_id: report.file_id,
        filename: report.filename,
        chunks: report.chunks,
        size_bytes: report.size_bytes,
        replicas_committed: report.replicas_committed,
        replicas_failed: report.replicas_failed,
        degraded_chunks: report.degraded_chunks,
        unreplicated_chunks: report.unreplicated_chunks,
        replaced: report.replaced,
    }
}

async fn download(
    State(state): State<Arc<AppState>>,
    Path(file_id): Path<String>,
) -> Result<Response, ApiError> {
    let file = state.reconstructor.reconstruct(&file_id).await?;
    info!("Serving {} as {}", file.file_id, file.filename);

    let disposition = format!("attachment; filename=\"{}\"", file.filename);
    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        file.bytes,
    )
        .into_response())
}
