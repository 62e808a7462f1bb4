//! Configuration types for chunkfs
//!
//! One configuration shape is shared by the coordinator, the storage nodes
//! and the CLI. It is layered from an optional TOML/JSON file and
//! `CHUNKFS__`-prefixed environment variables (`__` separates nested keys,
//! e.g. `CHUNKFS__COORDINATOR__PORT=6000`).

use crate::error::{Error, Result};
use crate::types::DEFAULT_CHUNK_SIZE;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "CHUNKFS";

/// Root configuration for chunkfs
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Files are split at this boundary
    pub chunk_size_bytes: usize,
    /// Coordinator configuration
    pub coordinator: CoordinatorConfig,
    /// Storage nodes every chunk is fanned out to, keyed by node name.
    /// Fan-out order is the map's (lexicographic) order.
    pub nodes: BTreeMap<String, NodeEndpoint>,
    /// Outbound call timeouts
    pub timeouts: TimeoutConfig,
    /// Heartbeat cadence and liveness policy
    pub liveness: LivenessConfig,
}

impl Default for Config {
    fn default() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("datanodeA".to_string(), NodeEndpoint::new("127.0.0.1", 5001));
        nodes.insert("datanodeB".to_string(), NodeEndpoint::new("127.0.0.1", 5002));

        Self {
            chunk_size_bytes: DEFAULT_CHUNK_SIZE,
            coordinator: CoordinatorConfig::default(),
            nodes,
            timeouts: TimeoutConfig::default(),
            liveness: LivenessConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from an optional file plus the environment, then
    /// validate it.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants the rest of the system relies on
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size_bytes == 0 {
            return Err(Error::Configuration(
                "chunk_size_bytes must be greater than zero".to_string(),
            ));
        }
        if self.nodes.is_empty() {
            return Err(Error::Configuration(
                "at least one storage node must be configured".to_string(),
            ));
        }
        for (name, node) in &self.nodes {
            if node.host.is_empty() || node.port == 0 {
                return Err(Error::Configuration(format!(
                    "storage node '{name}' needs a host and a non-zero port"
                )));
            }
        }
        if self.timeouts.push_ms == 0 || self.timeouts.fetch_ms == 0 || self.timeouts.heartbeat_ms == 0
        {
            return Err(Error::Configuration("timeouts must be non-zero".to_string()));
        }
        if self.liveness.down_after_ms == 0 {
            return Err(Error::Configuration(
                "liveness.down_after_ms must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Base URLs of every configured storage node, in fan-out order
    #[must_use]
    pub fn replica_endpoints(&self) -> Vec<String> {
        self.nodes.values().map(NodeEndpoint::base_url).collect()
    }

    /// Look up a storage node entry by name, ignoring ASCII case
    #[must_use]
    pub fn find_node(&self, name: &str) -> Option<&NodeEndpoint> {
        self.nodes
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, node)| node)
    }
}

/// Coordinator listen address and persistence settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub host: String,
    pub port: u16,
    /// Metadata snapshot file
    pub snapshot_path: PathBuf,
    /// Largest accepted upload body
    pub max_upload_bytes: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            snapshot_path: PathBuf::from("./coordinator-data/metadata.json"),
            max_upload_bytes: 100 * 1024 * 1024, // 100 MB
        }
    }
}

impl CoordinatorConfig {
    /// `host:port` to bind
    #[must_use]
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// URL storage nodes and the CLI use to reach the coordinator
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Address of one storage node
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeEndpoint {
    pub host: String,
    pub port: u16,
}

impl NodeEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// `host:port` to bind
    #[must_use]
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Base URL recorded as a replica endpoint
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Outbound call timeouts (milliseconds)
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Pushing one chunk to one storage node
    pub push_ms: u64,
    /// Fetching one chunk from one replica
    pub fetch_ms: u64,
    /// Registration and heartbeat calls
    pub heartbeat_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            push_ms: 10_000,
            fetch_ms: 8_000,
            heartbeat_ms: 5_000,
        }
    }
}

impl TimeoutConfig {
    #[must_use]
    pub const fn push(&self) -> Duration {
        Duration::from_millis(self.push_ms)
    }

    #[must_use]
    pub const fn fetch(&self) -> Duration {
        Duration::from_millis(self.fetch_ms)
    }

    #[must_use]
    pub const fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }
}

/// Heartbeat cadence and liveness policy (milliseconds)
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LivenessConfig {
    /// Delay between successful heartbeats
    pub heartbeat_interval_ms: u64,
    /// Delay before retrying after a failed heartbeat
    pub retry_interval_ms: u64,
    /// A node whose last heartbeat is older than this is reported down
    pub down_after_ms: u64,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 10_000,
            retry_interval_ms: 5_000,
            down_after_ms: 30_000,
        }
    }
}

impl LivenessConfig {
    #[must_use]
    pub const fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    #[must_use]
    pub const fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.chunk_size_bytes, 2_048_000);
        assert_eq!(config.coordinator.port, 5000);
        assert_eq!(
            config.replica_endpoints(),
            vec!["http://127.0.0.1:5001", "http://127.0.0.1:5002"]
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cluster.toml");
        std::fs::write(
            &path,
            r#"
chunk_size_bytes = 1024

[coordinator]
host = "0.0.0.0"
port = 7000

[nodes.node-b]
host = "10.0.0.2"
port = 7002

[nodes.node-a]
host = "10.0.0.1"
port = 7001

[timeouts]
push_ms = 250
"#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.chunk_size_bytes, 1024);
        assert_eq!(config.coordinator.listen_addr(), "0.0.0.0:7000");
        assert_eq!(config.timeouts.push(), Duration::from_millis(250));
        assert_eq!(config.timeouts.fetch_ms, 8_000);
        assert_eq!(
            config.replica_endpoints(),
            vec!["http://10.0.0.1:7001", "http://10.0.0.2:7002"]
        );
        assert_eq!(config.find_node("NODE-A").map(NodeEndpoint::listen_addr).as_deref(), Some("10.0.0.1:7001"));
    }

    #[test]
    fn test_load_missing_file_fails() {
        let dir = tempdir().unwrap();
        let result = Config::load(Some(&dir.path().join("absent.toml")));
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_validate_rejects_zero_chunk_size() {
        let config = Config {
            chunk_size_bytes: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_validate_rejects_empty_node_set() {
        let config = Config {
            nodes: BTreeMap::new(),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
    }
}
