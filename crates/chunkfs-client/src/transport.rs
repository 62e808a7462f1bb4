//! Chunk transport to storage nodes
//!
//! Pushes go to `POST {endpoint}/store_chunk/{chunk_id}` as a multipart
//! upload, fetches to `GET {endpoint}/chunk/{chunk_id}`. Every call is
//! bounded by a fixed timeout so a slow node costs at most one timeout.

use crate::api::{ErrorBody, PAYLOAD_FIELD};
use async_trait::async_trait;
use bytes::Bytes;
use chunkfs_common::{ChunkId, Error, Result};
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Moves chunk payloads to and from storage nodes
#[async_trait]
pub trait ChunkTransport: Send + Sync {
    /// Store `data` as `chunk_id` on the node at `endpoint`
    async fn store_chunk(&self, endpoint: &str, chunk_id: &ChunkId, data: Bytes) -> Result<()>;

    /// Fetch the bytes of `chunk_id` from the node at `endpoint`
    async fn fetch_chunk(&self, endpoint: &str, chunk_id: &ChunkId) -> Result<Bytes>;
}

/// `ChunkTransport` over HTTP
#[derive(Clone)]
pub struct HttpChunkClient {
    client: reqwest::Client,
    push_timeout: Duration,
    fetch_timeout: Duration,
}

impl HttpChunkClient {
    pub fn new(push_timeout: Duration, fetch_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            push_timeout,
            fetch_timeout,
        })
    }

    async fn fetch_once(&self, endpoint: &str, chunk_id: &ChunkId) -> Result<Bytes> {
        let url = format!("{}/chunk/{}", endpoint.trim_end_matches('/'), chunk_id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::upstream(endpoint, e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::ChunkNotFound(chunk_id.to_string()));
        }
        if !response.status().is_success() {
            return Err(error_from_response(endpoint, response).await);
        }
        response.bytes().await.map_err(|e| Error::upstream(endpoint, e))
    }
}

#[async_trait]
impl ChunkTransport for HttpChunkClient {
    async fn store_chunk(&self, endpoint: &str, chunk_id: &ChunkId, data: Bytes) -> Result<()> {
        let url = format!("{}/store_chunk/{}", endpoint.trim_end_matches('/'), chunk_id);
        let len = data.len() as u64;
        let part = reqwest::multipart::Part::stream_with_length(reqwest::Body::from(data), len)
            .file_name(chunk_id.to_string());
        let form = reqwest::multipart::Form::new().part(PAYLOAD_FIELD, part);

        let push = self.client.post(&url).multipart(form).send();
        let response = tokio::time::timeout(self.push_timeout, push)
            .await
            .map_err(|_| {
                error!("Timeout pushing chunk {} to {}", chunk_id, endpoint);
                Error::Timeout
            })?
            .map_err(|e| {
                warn!("Failed to push chunk {} to {}: {}", chunk_id, endpoint, e);
                Error::upstream(endpoint, e)
            })?;

        if !response.status().is_success() {
            let err = error_from_response(endpoint, response).await;
            warn!("Storage node {} rejected chunk {}: {}", endpoint, chunk_id, err);
            return Err(err);
        }

        debug!("Stored chunk {} ({} bytes) on {}", chunk_id, len, endpoint);
        Ok(())
    }

    async fn fetch_chunk(&self, endpoint: &str, chunk_id: &ChunkId) -> Result<Bytes> {
        tokio::time::timeout(self.fetch_timeout, self.fetch_once(endpoint, chunk_id))
            .await
            .map_err(|_| {
                warn!("Timeout fetching chunk {} from {}", chunk_id, endpoint);
                Error::Timeout
            })?
            .inspect_err(|e| warn!("Failed to fetch chunk {} from {}: {}", chunk_id, endpoint, e))
    }
}

/// Turn a non-2xx response into an error, keeping the server's message
pub(crate) async fn error_from_response(endpoint: &str, response: reqwest::Response) -> Error {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text).map_or(text, |body| body.error);
    Error::upstream(endpoint, format!("HTTP {status}: {message}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::extract::{Multipart, Path};
    use axum::routing::{get, post};
    use std::sync::{Arc, Mutex};

    async fn spawn(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
        format!("http://{addr}")
    }

    fn client() -> HttpChunkClient {
        HttpChunkClient::new(Duration::from_secs(2), Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn test_store_chunk_sends_multipart_file_field() {
        let seen: Arc<Mutex<Vec<(String, String, Vec<u8>)>>> = Arc::default();
        let sink = seen.clone();
        let router = Router::new().route(
            "/store_chunk/{chunk_id}",
            post(move |Path(chunk_id): Path<String>, mut multipart: Multipart| {
                let sink = sink.clone();
                async move {
                    let field = multipart.next_field().await.unwrap().unwrap();
                    let name = field.name().unwrap().to_string();
                    let data = field.bytes().await.unwrap().to_vec();
                    sink.lock().unwrap().push((chunk_id, name, data));
                    "ok"
                }
            }),
        );
        let endpoint = spawn(router).await;

        let chunk_id = ChunkId::parse("doc_chunk_0").unwrap();
        client()
            .store_chunk(&endpoint, &chunk_id, Bytes::from_static(b"hello"))
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "doc_chunk_0");
        assert_eq!(seen[0].1, "file");
        assert_eq!(seen[0].2, b"hello");
    }

    #[tokio::test]
    async fn test_fetch_chunk_maps_404_to_chunk_not_found() {
        let router = Router::new().route(
            "/chunk/{chunk_id}",
            get(|Path(chunk_id): Path<String>| async move {
                if chunk_id == "doc_chunk_0" {
                    Ok(Bytes::from_static(b"payload"))
                } else {
                    Err(axum::http::StatusCode::NOT_FOUND)
                }
            }),
        );
        let endpoint = spawn(router).await;
        let client = client();

        let found = client
            .fetch_chunk(&endpoint, &ChunkId::parse("doc_chunk_0").unwrap())
            .await
            .unwrap();
        assert_eq!(&found[..], b"payload");

        let missing = client
            .fetch_chunk(&endpoint, &ChunkId::parse("doc_chunk_1").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(missing, Error::ChunkNotFound(_)));
    }

    #[tokio::test]
    async fn test_unreachable_node_is_upstream_error() {
        // Bind then drop to get a port nothing listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let err = client()
            .store_chunk(&endpoint, &ChunkId::parse("x_chunk_0").unwrap(), Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_slow_node_times_out() {
        let router = Router::new().route(
            "/chunk/{chunk_id}",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        );
        let endpoint = spawn(router).await;
        let client = HttpChunkClient::new(Duration::from_millis(100), Duration::from_millis(100)).unwrap();

        let err = client
            .fetch_chunk(&endpoint, &ChunkId::parse("a_chunk_0").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout));
    }
}
