//! Server configuration: a TOML file layered over hard-coded defaults.
//!
//! Grounded on the teacher's `toml`-backed config loading; `deny_unknown_fields`
//! so a config file with a typo'd key fails fast at startup instead of
//! silently keeping the default.

use std::path::PathBuf;

use bramble_core::{Error, Result};
use bramble_durability::SyncStrategy;
use bramble_storage::EvictionPolicy;
use serde::Deserialize;

/// The full set of server-level settings. TLS/mTLS/client-CA/ACL-file
/// fields are parsed but never acted on — connection security and ACLs are
/// out of scope here, but a config file written for the full system should
/// still load without a "no such field" error.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// TCP port to listen on.
    pub port: u16,
    /// Address to bind the listener to.
    pub bind_addr: String,
    /// Directory AOF and snapshot files live under.
    pub data_dir: PathBuf,
    /// AOF sync discipline: `"always"`, `"everysec"`, or `"no"`.
    pub aof_sync_strategy: String,
    /// Replay the AOF on startup.
    pub restore_aof: bool,
    /// Restore from the latest snapshot on startup.
    pub restore_snapshot: bool,
    /// Changes needed before the snapshot ticker fires again.
    pub snapshot_threshold: u64,
    /// Seconds between snapshot-ticker wake-ups.
    pub snapshot_interval: u64,
    /// Memory ceiling in bytes; `0` disables eviction entirely.
    pub max_memory: usize,
    /// Eviction ranking policy: `"noeviction"`, `"allkeys-lru"`, etc.
    pub eviction_policy: String,
    /// Cohort size sampled per eviction attempt.
    pub eviction_sample: usize,
    /// Seconds between eviction/expiry-scanner wake-ups.
    pub eviction_interval: u64,
    /// Number of logical databases (`SELECT 0..databases`).
    pub databases: u16,
    /// Inert: whether TLS is "enabled" in the config file. Not wired to
    /// any listener — `bramble-cli`'s accept loop is plaintext only.
    pub tls_enabled: bool,
    /// Inert TLS certificate path.
    pub tls_cert_file: Option<String>,
    /// Inert TLS key path.
    pub tls_key_file: Option<String>,
    /// Inert mutual-TLS client CA bundle path.
    pub client_ca_file: Option<String>,
    /// Inert ACL rules file path.
    pub acl_file: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 6379,
            bind_addr: "127.0.0.1".to_string(),
            data_dir: PathBuf::from("./data"),
            aof_sync_strategy: "everysec".to_string(),
            restore_aof: true,
            restore_snapshot: true,
            snapshot_threshold: 100,
            snapshot_interval: 60,
            max_memory: 0,
            eviction_policy: "noeviction".to_string(),
            eviction_sample: 20,
            eviction_interval: 1,
            databases: 16,
            tls_enabled: false,
            tls_cert_file: None,
            tls_key_file: None,
            client_ca_file: None,
            acl_file: None,
        }
    }
}

impl Config {
    /// Load a config, reading `path` as a TOML file if given and layering
    /// its fields over [`Config::default`]; with no path, the defaults
    /// apply unchanged.
    pub fn load(path: Option<&str>) -> Result<Self> {
        match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)?;
                toml::from_str(&text).map_err(|e| Error::validation(format!("invalid config file: {e}")))
            }
            None => Ok(Config::default()),
        }
    }

    /// Parse `aof_sync_strategy` into the durability engine's enum.
    pub fn sync_strategy(&self) -> Result<SyncStrategy> {
        SyncStrategy::parse(&self.aof_sync_strategy)
    }

    /// Parse `eviction_policy` into the storage engine's enum.
    pub fn eviction_policy(&self) -> Result<EvictionPolicy> {
        EvictionPolicy::parse(&self.eviction_policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse_to_valid_enums() {
        let config = Config::default();
        assert!(config.sync_strategy().is_ok());
        assert!(config.eviction_policy().is_ok());
    }

    #[test]
    fn load_with_no_path_uses_defaults() {
        let config = Config::load(None).unwrap();
        assert_eq!(config.port, 6379);
    }

    #[test]
    fn unknown_field_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bramble.toml");
        std::fs::write(&path, "bogus_field = 1\n").unwrap();
        assert!(Config::load(Some(path.to_str().unwrap())).is_err());
    }

    #[test]
    fn partial_file_layers_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bramble.toml");
        std::fs::write(&path, "port = 7000\n").unwrap();
        let config = Config::load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(config.port, 7000);
        assert_eq!(config.bind_addr, "127.0.0.1");
    }
}
