//! Configuration for the wallet ledger

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// HTTP server configuration
    pub http: HttpConfig,

    /// RocksDB configuration
    pub rocksdb: RocksDBConfig,

    /// Row locking configuration
    pub locking: LockingConfig,

    /// Wallet creation configuration
    pub wallet: WalletConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/wallets"),
            http: HttpConfig::default(),
            rocksdb: RocksDBConfig::default(),
            locking: LockingConfig::default(),
            wallet: WalletConfig::default(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Listen address
    pub listen_addr: String,

    /// Worker threads (0 = one per core)
    pub workers: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:5000".to_string(),
            workers: 0,
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RocksDBConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// fsync the WAL on every commit
    pub sync_writes: bool,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 2,
            max_background_jobs: 2,
            sync_writes: true,
            enable_statistics: false,
        }
    }
}

/// Row locking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockingConfig {
    /// How long an operation waits for a wallet held by another operation
    /// (milliseconds, negative = wait forever)
    pub lock_timeout_ms: i64,

    /// Lock table stripes
    pub num_stripes: usize,
}

impl Default for LockingConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 5_000,
            num_stripes: 16,
        }
    }
}

/// Wallet creation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    /// Regenerate-and-retry budget when a generated id is already taken
    pub max_id_attempts: u32,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self { max_id_attempts: 5 }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables, starting from `WALLET_CONFIG` if set
    pub fn from_env() -> crate::Result<Self> {
        let mut config = match std::env::var("WALLET_CONFIG") {
            Ok(path) => Config::from_file(path)?,
            Err(_) => Config::default(),
        };

        if let Ok(data_dir) = std::env::var("WALLET_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(addr) = std::env::var("WALLET_HTTP_ADDR") {
            config.http.listen_addr = addr;
        }

        if let Ok(workers) = std::env::var("WALLET_HTTP_WORKERS") {
            config.http.workers = parse_var("WALLET_HTTP_WORKERS", &workers)?;
        }

        if let Ok(timeout) = std::env::var("WALLET_LOCK_TIMEOUT_MS") {
            config.locking.lock_timeout_ms = parse_var("WALLET_LOCK_TIMEOUT_MS", &timeout)?;
        }

        if let Ok(sync) = std::env::var("WALLET_SYNC_WRITES") {
            config.rocksdb.sync_writes = parse_var("WALLET_SYNC_WRITES", &sync)?;
        }

        Ok(config)
    }

    /// Reject settings the ledger cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(crate::Error::Config("Data directory is required".to_string()));
        }

        if self.http.listen_addr.is_empty() {
            return Err(crate::Error::Config("HTTP listen address is required".to_string()));
        }

        if self.wallet.max_id_attempts == 0 {
            return Err(crate::Error::Config(
                "wallet.max_id_attempts must be at least 1".to_string(),
            ));
        }

        if self.locking.num_stripes == 0 {
            return Err(crate::Error::Config(
                "locking.num_stripes must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> crate::Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| crate::Error::Config(format!("Invalid {}={:?}: {}", name, value, e)))
}
