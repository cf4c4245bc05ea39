//! Configuration type definitions.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::drivers::mssql::DEFAULT_MAX_PARAMS_PER_BATCH;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Target database configuration (MSSQL).
    pub target: TargetConfig,

    /// Insert behavior configuration.
    #[serde(default)]
    pub insert: InsertConfig,
}

/// Target database (MSSQL) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 1433).
    #[serde(default = "default_mssql_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    pub password: String,

    /// Encrypt connection (default: true).
    #[serde(default = "default_true")]
    pub encrypt: bool,

    /// Trust server certificate (default: false).
    #[serde(default)]
    pub trust_server_cert: bool,
}

impl fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("encrypt", &self.encrypt)
            .field("trust_server_cert", &self.trust_server_cert)
            .finish()
    }
}

/// Insert behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsertConfig {
    /// Maximum pooled connections (default: 8).
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// Positional parameters bound per round trip (default: 2000, max 2100).
    #[serde(default = "default_max_params_per_batch")]
    pub max_params_per_batch: usize,

    /// Seconds to wait for a pooled connection (default: 30).
    #[serde(default = "default_connection_timeout_secs")]
    pub connection_timeout_secs: u64,
}

impl Default for InsertConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            max_params_per_batch: default_max_params_per_batch(),
            connection_timeout_secs: default_connection_timeout_secs(),
        }
    }
}

fn default_mssql_port() -> u16 {
    1433
}

fn default_true() -> bool {
    true
}

fn default_pool_size() -> u32 {
    8
}

fn default_max_params_per_batch() -> usize {
    DEFAULT_MAX_PARAMS_PER_BATCH
}

fn default_connection_timeout_secs() -> u64 {
    30
}
