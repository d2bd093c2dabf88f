//! Node configuration loading and validation

use anyhow::{Context, Result};
use relaynet_core::{serde_amount, AccountId, Amount, SECONDS_PER_DAY};
use relaynet_incentives::LedgerConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Complete node configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NodeConfig {
    pub node: NodeSection,

    #[serde(default)]
    pub storage: StorageSection,

    #[serde(default)]
    pub ledger: LedgerConfig,

    #[serde(default)]
    pub rpc: RpcSection,

    #[serde(default)]
    pub metrics: MetricsSection,

    #[serde(default)]
    pub distribution: DistributionSection,

    #[serde(default)]
    pub genesis: GenesisSection,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NodeSection {
    /// Instance name used in logs; generated when left empty
    #[serde(default)]
    pub id: String,
    pub data_dir: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageSection {
    /// `sled` or `memory`
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity_mb: u64,
    #[serde(default = "default_true")]
    pub flush_on_commit: bool,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: default_storage_path(),
            cache_capacity_mb: default_cache_capacity(),
            flush_on_commit: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RpcSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_rpc_port")]
    pub port: u16,
    #[serde(default = "default_max_body")]
    pub max_body_bytes: u64,
}

impl Default for RpcSection {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: default_listen_addr(),
            port: default_rpc_port(),
            max_body_bytes: default_max_body(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
    #[serde(default = "default_collection_interval")]
    pub collection_interval_secs: u64,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
            collection_interval_secs: default_collection_interval(),
        }
    }
}

/// Automatic settlement of the daily distribution cycle
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DistributionSection {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Second of the UTC day from which that day's cycle is settled
    #[serde(default = "default_settle_offset")]
    pub settle_at_second_of_day: u64,

    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
}

impl Default for DistributionSection {
    fn default() -> Self {
        Self {
            enabled: true,
            settle_at_second_of_day: default_settle_offset(),
            check_interval_secs: default_check_interval(),
        }
    }
}

/// Balances minted into the bundled asset ledger on first start
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct GenesisSection {
    #[serde(default)]
    pub allocations: Vec<GenesisAllocation>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GenesisAllocation {
    pub account: AccountId,
    #[serde(with = "serde_amount")]
    pub amount: Amount,

    /// Approve custody to pull the whole allocation
    #[serde(default = "default_true")]
    pub approve_custody: bool,
}

// Default value functions
fn default_true() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_backend() -> String { "sled".to_string() }
fn default_storage_path() -> PathBuf { PathBuf::from("ledger") }
fn default_cache_capacity() -> u64 { 256 }
fn default_listen_addr() -> String { "127.0.0.1".to_string() }
fn default_rpc_port() -> u16 { 8545 }
fn default_max_body() -> u64 { 64 * 1024 }
fn default_metrics_port() -> u16 { 9090 }
fn default_collection_interval() -> u64 { 15 }
fn default_settle_offset() -> u64 { 86_100 }
fn default_check_interval() -> u64 { 60 }

impl NodeConfig {
    /// Load configuration from TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read configuration file {}", path.as_ref().display()))?;

        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: NodeConfig = toml::from_str(contents)
            .context("Failed to parse configuration file")?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.storage.backend != "sled" && self.storage.backend != "memory" {
            anyhow::bail!("Storage backend must be 'sled' or 'memory'");
        }

        if self.storage.cache_capacity_mb == 0 {
            anyhow::bail!("Storage cache capacity must be positive");
        }

        self.ledger
            .validate()
            .context("Invalid [ledger] section")?;

        if self.distribution.settle_at_second_of_day >= SECONDS_PER_DAY {
            anyhow::bail!(
                "settle_at_second_of_day must be below {}",
                SECONDS_PER_DAY
            );
        }

        if self.distribution.check_interval_secs == 0 || self.metrics.collection_interval_secs == 0 {
            anyhow::bail!("Periodic task intervals must be positive");
        }

        if self.rpc.enabled {
            self.rpc_addr()?;
            if self.metrics.enabled && self.metrics.port == self.rpc.port {
                anyhow::bail!("RPC and metrics servers cannot share port {}", self.rpc.port);
            }
        }

        for allocation in &self.genesis.allocations {
            if allocation.amount == 0 {
                anyhow::bail!("Genesis allocation for {} must be positive", allocation.account);
            }
        }

        Ok(())
    }

    /// Socket address of the JSON-RPC server
    pub fn rpc_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.rpc.listen_addr, self.rpc.port)
            .parse()
            .with_context(|| format!("Invalid RPC listen address {}", self.rpc.listen_addr))
    }

    /// Get absolute data directory path
    pub fn data_dir(&self) -> PathBuf {
        if self.node.data_dir.is_absolute() {
            self.node.data_dir.clone()
        } else {
            std::env::current_dir()
                .unwrap_or_default()
                .join(&self.node.data_dir)
        }
    }

    /// Get absolute storage path
    pub fn storage_path(&self) -> PathBuf {
        if self.storage.path.is_absolute() {
            self.storage.path.clone()
        } else {
            self.data_dir().join(&self.storage.path)
        }
    }
}
