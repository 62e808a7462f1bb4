//! Storage node registration, heartbeats and derived liveness.
//!
//! A node is `Unregistered` until its first registration, after which it is
//! kept in the snapshot forever. Whether it is currently reachable is never
//! stored: `Alive`/`Down` is computed on read by comparing `last_heartbeat`
//! with the configured `down_after` window.

use crate::store::MetaStore;
use chunkfs_common::{Error, Result, StorageNodeRecord, now_millis};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub use chunkfs_common::NodeState;

/// Liveness view of one registered node
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NodeLiveness {
    pub node_id: String,
    pub last_heartbeat: u64,
    /// Milliseconds since the last heartbeat
    pub age_ms: u64,
    pub state: NodeState,
    /// Body of the node's most recent registration
    pub registration_info: serde_json::Map<String, serde_json::Value>,
}

/// Records registrations and heartbeats through the metadata store
pub struct LivenessTracker {
    store: Arc<MetaStore>,
    down_after: Duration,
}

impl LivenessTracker {
    pub fn new(store: Arc<MetaStore>, down_after: Duration) -> Self {
        Self { store, down_after }
    }

    /// Register (or re-register) a node. Returns `true` for a first
    /// registration.
    pub fn register(
        &self,
        node_id: &str,
        info: serde_json::Map<String, serde_json::Value>,
    ) -> Result<bool> {
        self.register_at(node_id, info, now_millis())
    }

    /// Register with an explicit timestamp (Unix milliseconds)
    pub fn register_at(
        &self,
        node_id: &str,
        info: serde_json::Map<String, serde_json::Value>,
        now: u64,
    ) -> Result<bool> {
        if node_id.trim().is_empty() {
            return Err(Error::invalid_request("missing node_id"));
        }

        let replaced = self.store.upsert_node(StorageNodeRecord {
            node_id: node_id.to_string(),
            last_heartbeat: now,
            registration_info: info,
        })?;

        if replaced.is_some() {
            info!("Storage node {} re-registered", node_id);
        } else {
            info!("Storage node {} registered", node_id);
        }
        Ok(replaced.is_none())
    }

    /// Record a heartbeat. Unknown nodes fail with `NodeNotFound` and leave
    /// the snapshot untouched.
    pub fn heartbeat(&self, node_id: &str) -> Result<()> {
        self.heartbeat_at(node_id, now_millis())
    }

    /// Record a heartbeat with an explicit timestamp (Unix milliseconds)
    pub fn heartbeat_at(&self, node_id: &str, now: u64) -> Result<()> {
        if self.store.touch_heartbeat(node_id, now)? {
            debug!("Heartbeat from storage node {}", node_id);
            Ok(())
        } else {
            Err(Error::NodeNotFound(node_id.to_string()))
        }
    }

    /// Derived state of one record at time `now`
    #[must_use]
    pub fn state_of(&self, record: &StorageNodeRecord, now: u64) -> NodeState {
        let age = now.saturating_sub(record.last_heartbeat);
        if u128::from(age) <= self.down_after.as_millis() {
            NodeState::Alive
        } else {
            NodeState::Down
        }
    }

    /// Liveness of every registered node at time `now`, ordered by node id
    #[must_use]
    pub fn liveness(&self, now: u64) -> Vec<NodeLiveness> {
        self.store
            .snapshot()
            .storage_nodes
            .into_values()
            .map(|record| NodeLiveness {
                state: self.state_of(&record, now),
                age_ms: now.saturating_sub(record.last_heartbeat),
                last_heartbeat: record.last_heartbeat,
                node_id: record.node_id,
                registration_info: record.registration_info,
            })
            .collect()
    }
}
