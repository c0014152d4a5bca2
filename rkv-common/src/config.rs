//! # Server Configuration
//!
//! Purpose: Collect every CLI/config-file option the external interfaces
//! section enumerates into one struct, loadable from JSON. The fields that
//! name an out-of-scope collaborator (TLS materials, Raft/gossip transport,
//! AOF/snapshot files) are kept as plain data here; wiring them up to real
//! collaborators is outside the keyspace-engine core this crate implements.
//!
//! ## Design Principles
//! 1. **One Struct, Grouped Fields**: Keeps the option surface discoverable
//!    instead of scattering flags across modules.
//! 2. **`Default` Matches Standalone Mode**: No TLS, no cluster, no ACL file,
//!    `no-eviction`, so a bare `Config::default()` boots a single node.
//! 3. **Serde, Not Hand-Rolled Parsing**: Loaded with `serde_json` like the
//!    rest of the workspace; a YAML loader can layer on top without changing
//!    this shape.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HkvError, HkvResult};

/// Eviction policy, matching the seven policies in the eviction engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EvictionPolicy {
    NoEviction,
    AllKeysLfu,
    AllKeysLru,
    AllKeysRandom,
    VolatileLfu,
    VolatileLru,
    VolatileRandom,
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        EvictionPolicy::NoEviction
    }
}

impl EvictionPolicy {
    /// True when this policy only considers keys with a TTL set.
    pub fn is_volatile_only(&self) -> bool {
        matches!(
            self,
            EvictionPolicy::VolatileLfu | EvictionPolicy::VolatileLru | EvictionPolicy::VolatileRandom
        )
    }
}

/// Network and TLS configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub bind_addr: String,
    pub port: u16,
    pub tls: bool,
    pub mtls: bool,
    pub cert_key_pairs: Vec<(PathBuf, PathBuf)>,
    pub client_cas: Vec<PathBuf>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            bind_addr: "0.0.0.0".to_string(),
            port: 7878,
            tls: false,
            mtls: false,
            cert_key_pairs: Vec::new(),
            client_cas: Vec::new(),
        }
    }
}

/// Cluster membership and replication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub enabled: bool,
    pub server_id: String,
    pub join_addr: Option<String>,
    pub bind_port: u16,
    pub raft_bind_port: u16,
    pub bootstrap_cluster: bool,
    pub forward_command: bool,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        ClusterConfig {
            enabled: false,
            server_id: "node-1".to_string(),
            join_addr: None,
            bind_port: 7946,
            raft_bind_port: 7947,
            bootstrap_cluster: false,
            forward_command: false,
        }
    }
}

/// Persistence configuration (AOF + snapshot).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub data_dir: PathBuf,
    pub restore_aof: bool,
    pub restore_snapshot: bool,
    pub aof_sync_strategy: AofSyncStrategy,
    pub snapshot_threshold: u64,
    pub snapshot_interval: Duration,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        PersistenceConfig {
            data_dir: PathBuf::from("./data"),
            restore_aof: false,
            restore_snapshot: false,
            aof_sync_strategy: AofSyncStrategy::EverySec,
            snapshot_threshold: 10_000,
            snapshot_interval: Duration::from_secs(3600),
        }
    }
}

/// How aggressively the AOF collaborator fsyncs its queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AofSyncStrategy {
    Always,
    EverySec,
    Never,
}

/// ACL configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AclConfig {
    pub require_pass: bool,
    pub password: Option<String>,
    pub acl_config_path: Option<PathBuf>,
}

impl Default for AclConfig {
    fn default() -> Self {
        AclConfig {
            require_pass: false,
            password: None,
            acl_config_path: None,
        }
    }
}

/// Eviction-related configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvictionConfig {
    pub max_memory: u64,
    pub policy: EvictionPolicy,
    pub eviction_interval: Duration,
    pub eviction_sample: usize,
}

impl Default for EvictionConfig {
    fn default() -> Self {
        EvictionConfig {
            max_memory: 0,
            policy: EvictionPolicy::NoEviction,
            eviction_interval: Duration::from_secs(1),
            eviction_sample: 20,
        }
    }
}

/// Top-level server configuration, aggregating every external-interfaces
/// option group.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub network: NetworkConfig,
    pub cluster: ClusterConfig,
    pub persistence: PersistenceConfig,
    pub acl: AclConfig,
    pub eviction: EvictionConfig,
}

impl Config {
    /// Loads configuration from a JSON file, falling back to `Default` for
    /// any field the file omits (every group derives `Default`).
    pub fn load(path: &std::path::Path) -> HkvResult<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| HkvError::internal(format!("invalid config: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_standalone() {
        let cfg = Config::default();
        assert!(!cfg.cluster.enabled);
        assert!(!cfg.network.tls);
        assert_eq!(cfg.eviction.policy, EvictionPolicy::NoEviction);
    }

    #[test]
    fn load_merges_partial_json() {
        let dir = std::env::temp_dir().join(format!("rkv-config-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        std::fs::write(&path, r#"{"eviction": {"max_memory": 1024}}"#).unwrap();

        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.eviction.max_memory, 1024);
        assert_eq!(cfg.eviction.eviction_sample, 20);
        std::fs::remove_file(&path).unwrap();
    }
}
