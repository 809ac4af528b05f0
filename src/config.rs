//! Configuration surface for the adapter.
//!
//! Loaded from a YAML file whose layout mirrors the sections consumed by the
//! subsystems: table provisioning, pools, and the HTTP listener. Every field
//! has a default so a partial file (or none at all, via `Config::default`)
//! still yields a runnable development setup.

use crate::{Error, Result};

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub table: TableConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub http_server: HttpServerConfig,
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Config = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.pool.write_pool_size == 0 || self.pool.read_pool_size == 0 {
            return Err(Error::Config(
                "pool sizes must be at least 1".to_string(),
            ));
        }
        if !self.http_server.write_url.starts_with('/')
            || !self.http_server.read_url.starts_with('/')
        {
            return Err(Error::Config(
                "write_url and read_url must be absolute paths".to_string(),
            ));
        }
        Ok(())
    }
}

/// Metric table provisioning and query ceilings.
#[derive(Debug, Clone, Deserialize)]
pub struct TableConfig {
    /// Partition interval for range-partitioned metric tables.
    #[serde(default = "default_interval")]
    pub interval: String,
    /// Retention window for partitions.
    #[serde(default = "default_retention")]
    pub retention: String,
    /// Maximum number of rows a single read query may return.
    #[serde(default = "default_max_count")]
    pub max_count: u64,
    /// Maximum query window in days.
    #[serde(default = "default_max_day")]
    pub max_day: u32,
    /// Metric names accepted for persistence.
    #[serde(default)]
    pub name: Vec<String>,
    /// Accepted metric names whose `query` label is blanked before storage.
    #[serde(default)]
    pub name_with_query: Vec<String>,
}

impl TableConfig {
    /// The maximum query window as a millisecond span.
    pub fn max_window_ms(&self) -> i64 {
        self.max_day as i64 * 24 * 60 * 60 * 1000
    }
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            retention: default_retention(),
            max_count: default_max_count(),
            max_day: default_max_day(),
            name: Vec::new(),
            name_with_query: Vec::new(),
        }
    }
}

/// Connection pool sizing and acquisition timeouts.
#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    #[serde(default = "default_write_pool_size")]
    pub write_pool_size: usize,
    #[serde(default = "default_read_pool_size")]
    pub read_pool_size: usize,
    /// Write acquisition timeout in seconds.
    #[serde(default = "default_write_timeout")]
    pub write_timeout: u64,
    /// Read acquisition timeout in seconds.
    #[serde(default = "default_read_timeout")]
    pub read_timeout: u64,
}

impl PoolConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout)
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            write_pool_size: default_write_pool_size(),
            read_pool_size: default_read_pool_size(),
            write_timeout: default_write_timeout(),
            read_timeout: default_read_timeout(),
        }
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_write_url")]
    pub write_url: String,
    #[serde(default = "default_read_url")]
    pub read_url: String,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            write_url: default_write_url(),
            read_url: default_read_url(),
        }
    }
}

fn default_interval() -> String {
    "1d".to_string()
}

fn default_retention() -> String {
    "7d".to_string()
}

fn default_max_count() -> u64 {
    50_000
}

fn default_max_day() -> u32 {
    7
}

fn default_write_pool_size() -> usize {
    10
}

fn default_read_pool_size() -> usize {
    2
}

fn default_write_timeout() -> u64 {
    60
}

fn default_read_timeout() -> u64 {
    30
}

fn default_port() -> u16 {
    9201
}

fn default_write_url() -> String {
    "/write".to_string()
}

fn default_read_url() -> String {
    "/read".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_mirror_reference_deployment() {
        let config = Config::default();
        assert_eq!(config.pool.write_pool_size, 10);
        assert_eq!(config.pool.read_pool_size, 2);
        assert_eq!(config.table.max_count, 50_000);
        assert_eq!(config.table.max_window_ms(), 7 * 24 * 60 * 60 * 1000);
        assert_eq!(config.http_server.port, 9201);
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let config: Config = serde_yaml::from_str(
            "table:\n  name: [cpu_seconds_total]\npool:\n  read_pool_size: 4\n",
        )
        .unwrap();
        assert_eq!(config.table.name, vec!["cpu_seconds_total"]);
        assert_eq!(config.pool.read_pool_size, 4);
        assert_eq!(config.pool.write_pool_size, 10);
        assert_eq!(config.http_server.write_url, "/write");
    }

    #[test]
    fn rejects_zero_sized_pools() {
        let config: Config =
            serde_yaml::from_str("pool:\n  write_pool_size: 0\n").unwrap();
        assert!(config.validate().is_err());
    }
}
