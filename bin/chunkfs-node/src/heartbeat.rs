//! Registration and heartbeat loop
//!
//! The node registers with the coordinator, then heartbeats on a fixed
//! interval. Any failure is retried after the shorter retry interval, forever.
//! A heartbeat answered with "unknown node" sends the loop back to
//! registration, which covers a coordinator that lost its snapshot.

use chunkfs_client::CoordinatorClient;
use chunkfs_common::{Error, now_millis};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Keeps one storage node registered with the coordinator
pub struct HeartbeatTask {
    client: CoordinatorClient,
    node_id: String,
    /// Base URL other services use to reach this node
    advertise_url: String,
    interval: Duration,
    retry: Duration,
}

impl HeartbeatTask {
    pub fn new(
        client: CoordinatorClient,
        node_id: impl Into<String>,
        advertise_url: impl Into<String>,
        interval: Duration,
        retry: Duration,
    ) -> Self {
        Self {
            client,
            node_id: node_id.into(),
            advertise_url: advertise_url.into(),
            interval,
            retry,
        }
    }

    /// Run until the task is aborted
    pub async fn run(self) {
        let mut registered = false;
        loop {
            let delay = self.step(&mut registered).await;
            tokio::time::sleep(delay).await;
        }
    }

    /// One register or heartbeat attempt; returns the delay before the next
    async fn step(&self, registered: &mut bool) -> Duration {
        if !*registered {
            return match self.register().await {
                Ok(()) => {
                    *registered = true;
                    self.interval
                }
                Err(e) => {
                    warn!(
                        "Registration with {} failed: {} (retrying in {:?})",
                        self.client.base_url(),
                        e,
                        self.retry
                    );
                    self.retry
                }
            };
        }

        match self.client.heartbeat(&self.node_id).await {
            Ok(()) => {
                debug!("Heartbeat sent for {}", self.node_id);
                self.interval
            }
            Err(Error::NodeNotFound(_)) => {
                warn!(
                    "Coordinator does not know {}, registering again",
                    self.node_id
                );
                *registered = false;
                Duration::ZERO
            }
            Err(e) => {
                warn!("Heartbeat failed: {} (retrying in {:?})", e, self.retry);
                self.retry
            }
        }
    }

    async fn register(&self) -> chunkfs_common::Result<()> {
        let mut info = serde_json::Map::new();
        info.insert("timestamp".to_string(), serde_json::json!(now_millis()));
        info.insert(
            "endpoint".to_string(),
            serde_json::Value::String(self.advertise_url.clone()),
        );

        let response = self.client.register(&self.node_id, info).await?;
        info!(
            "Registered {} with coordinator at {}: {}",
            self.node_id,
            self.client.base_url(),
            response.message
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::post;
    use axum::{Json, Router};
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct Calls {
        registers: Vec<serde_json::Value>,
        heartbeats: usize,
        /// Heartbeats answer 404 while set
        forget: bool,
    }

    async fn fake_coordinator(calls: Arc<Mutex<Calls>>) -> CoordinatorClient {
        let on_register = calls.clone();
        let on_heartbeat = calls;
        let router = Router::new()
            .route(
                "/register",
                post(move |Json(body): Json<serde_json::Value>| {
                    let calls = on_register.clone();
                    async move {
                        let mut calls = calls.lock();
                        calls.registers.push(body);
                        calls.forget = false;
                        Json(serde_json::json!({ "message": "ok" }))
                    }
                }),
            )
            .route(
                "/heartbeat",
                post(move || {
                    let calls = on_heartbeat.clone();
                    async move {
                        let mut calls = calls.lock();
                        calls.heartbeats += 1;
                        if calls.forget {
                            (
                                StatusCode::NOT_FOUND,
                                Json(serde_json::json!({ "error": "unknown" })),
                            )
                                .into_response()
                        } else {
                            Json(serde_json::json!({ "status": "heartbeat-received" }))
                                .into_response()
                        }
                    }
                }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
        CoordinatorClient::new(format!("http://{addr}"), Duration::from_secs(1)).unwrap()
    }

    fn task(client: CoordinatorClient) -> HeartbeatTask {
        HeartbeatTask::new(
            client,
            "datanodeA",
            "http://127.0.0.1:5001",
            Duration::from_millis(10),
            Duration::from_millis(5),
        )
    }

    #[tokio::test]
    async fn test_registers_then_heartbeats() {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let task = task(fake_coordinator(calls.clone()).await);
        let mut registered = false;

        assert_eq!(task.step(&mut registered).await, Duration::from_millis(10));
        assert!(registered);
        task.step(&mut registered).await;

        let calls = calls.lock();
        assert_eq!(calls.registers.len(), 1);
        assert_eq!(calls.registers[0]["node_id"], "datanodeA");
        assert_eq!(calls.registers[0]["endpoint"], "http://127.0.0.1:5001");
        assert_eq!(calls.heartbeats, 1);
    }

    #[tokio::test]
    async fn test_unknown_node_triggers_reregistration() {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let task = task(fake_coordinator(calls.clone()).await);
        let mut registered = false;

        task.step(&mut registered).await;
        calls.lock().forget = true;

        assert_eq!(task.step(&mut registered).await, Duration::ZERO);
        assert!(!registered);
        task.step(&mut registered).await;
        assert!(registered);
        assert_eq!(calls.lock().registers.len(), 2);
    }

    #[tokio::test]
    async fn test_unreachable_coordinator_uses_retry_interval() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client =
            CoordinatorClient::new(format!("http://{addr}"), Duration::from_secs(1)).unwrap();
        let task = task(client);
        let mut registered = false;

        assert_eq!(task.step(&mut registered).await, Duration::from_millis(5));
        assert!(!registered);
    }
}
