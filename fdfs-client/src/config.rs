use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::modify::OrphanPolicy;
use crate::protocol::GROUP_NAME_MAX_LEN;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "FDFS_CLIENT_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "fdfs_client.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Tracker discovery plus a bound storage node.
    #[default]
    Fastdfs,
    /// Process-local store, for development and tests.
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub backend: BackendKind,
    #[serde(default)]
    pub tracker_servers: Vec<String>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_network_timeout")]
    pub network_timeout_secs: u64,
    /// Ask the tracker for a storage node in this group instead of letting
    /// it pick one.
    #[serde(default)]
    pub store_group: Option<String>,
    #[serde(default = "default_max_idle")]
    pub max_idle_connections: usize,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    #[serde(default)]
    pub on_orphan: OrphanPolicy,
}

fn default_connect_timeout() -> u64 {
    2
}

fn default_network_timeout() -> u64 {
    30
}

fn default_max_idle() -> usize {
    8
}

fn default_idle_timeout() -> u64 {
    60
}

impl ClientConfig {
    pub fn new(tracker_servers: Vec<String>) -> Self {
        Self {
            backend: BackendKind::Fastdfs,
            tracker_servers,
            connect_timeout_secs: default_connect_timeout(),
            network_timeout_secs: default_network_timeout(),
            store_group: None,
            max_idle_connections: default_max_idle(),
            idle_timeout_secs: default_idle_timeout(),
            on_orphan: OrphanPolicy::default(),
        }
    }

    pub fn memory() -> Self {
        Self {
            backend: BackendKind::Memory,
            ..Self::new(Vec::new())
        }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
        let config: ClientConfig = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the file named by `FDFS_CLIENT_CONFIG`, falling back to
    /// `fdfs_client.toml` in the working directory.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::load(&Self::location())
    }

    pub fn location() -> PathBuf {
        PathBuf::from(
            std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string()),
        )
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.backend == BackendKind::Fastdfs {
            if self.tracker_servers.is_empty() {
                anyhow::bail!("tracker_servers must contain at least one address");
            }
            for addr in &self.tracker_servers {
                validate_addr(addr)?;
            }
        }
        if self.connect_timeout_secs == 0 {
            anyhow::bail!("connect_timeout_secs must be greater than zero");
        }
        if self.network_timeout_secs == 0 {
            anyhow::bail!("network_timeout_secs must be greater than zero");
        }
        if let Some(group) = &self.store_group {
            if group.is_empty() || group.len() > GROUP_NAME_MAX_LEN {
                anyhow::bail!(
                    "store_group must be 1 to {} bytes: {:?}",
                    GROUP_NAME_MAX_LEN,
                    group
                );
            }
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn network_timeout(&self) -> Duration {
        Duration::from_secs(self.network_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

fn validate_addr(addr: &str) -> anyhow::Result<()> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| anyhow::anyhow!("tracker address must be host:port: {}", addr))?;
    if host.is_empty() {
        anyhow::bail!("tracker address has an empty host: {}", addr);
    }
    port.parse::<u16>()
        .map_err(|_| anyhow::anyhow!("tracker address has an invalid port: {}", addr))?;
    Ok(())
}
