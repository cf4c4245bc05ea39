//! Pooled SQL Server sessions.
//!
//! [`MssqlPool`] wraps a bb8 pool of tiberius clients and hands out
//! [`MssqlConnection`]s, which implement the engine's [`Connection`] trait.

use std::time::Duration;

use async_trait::async_trait;
use bb8::{Pool, PooledConnection};
use tiberius::{AuthMethod, Client, Config as TdsConfig, EncryptionLevel, ToSql};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info};

use crate::config::{Config, TargetConfig};
use crate::core::{Connection, ConnectionId, Row};
use crate::error::{InsertError, Result};

use super::params::encode_batches;
use super::rows::decode_row;

const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(300);
const POOL_MAX_LIFETIME: Duration = Duration::from_secs(1800);

/// Connection manager for bb8 pool with Tiberius.
#[derive(Clone)]
pub struct TiberiusConnectionManager {
    config: TargetConfig,
}

impl TiberiusConnectionManager {
    pub fn new(config: TargetConfig) -> Self {
        Self { config }
    }

    fn build_config(&self) -> TdsConfig {
        let mut config = TdsConfig::new();
        config.host(&self.config.host);
        config.port(self.config.port);
        config.database(&self.config.database);
        config.authentication(AuthMethod::sql_server(
            &self.config.user,
            &self.config.password,
        ));

        if self.config.encrypt {
            if self.config.trust_server_cert {
                config.trust_cert();
            }
            config.encryption(EncryptionLevel::Required);
        } else {
            config.encryption(EncryptionLevel::NotSupported);
        }

        config
    }
}

#[async_trait]
impl bb8::ManageConnection for TiberiusConnectionManager {
    type Connection = Client<Compat<TcpStream>>;
    type Error = tiberius::error::Error;

    async fn connect(&self) -> std::result::Result<Self::Connection, Self::Error> {
        let config = self.build_config();
        let tcp = TcpStream::connect(config.get_addr()).await.map_err(|e| {
            tiberius::error::Error::Io {
                kind: e.kind(),
                message: e.to_string(),
            }
        })?;
        tcp.set_nodelay(true).ok();
        Client::connect(config, tcp.compat_write()).await
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> std::result::Result<(), Self::Error> {
        conn.simple_query("SELECT 1").await?.into_row().await?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

/// Pool of SQL Server sessions.
pub struct MssqlPool {
    pool: Pool<TiberiusConnectionManager>,
    max_params_per_batch: usize,
}

impl MssqlPool {
    /// Build the pool and verify that a session can be opened.
    pub async fn new(config: &Config) -> Result<Self> {
        let target = &config.target;
        let settings = &config.insert;

        let manager = TiberiusConnectionManager::new(target.clone());
        let pool = Pool::builder()
            .max_size(settings.pool_size)
            .min_idle(Some(1))
            .connection_timeout(Duration::from_secs(settings.connection_timeout_secs))
            .idle_timeout(Some(POOL_IDLE_TIMEOUT))
            .max_lifetime(Some(POOL_MAX_LIFETIME))
            .test_on_check_out(true)
            .build(manager)
            .await
            .map_err(|e| InsertError::pool(e, "creating MSSQL pool"))?;

        // Test connection
        {
            let mut conn = pool
                .get()
                .await
                .map_err(|e| InsertError::pool(e, "testing MSSQL connection"))?;
            conn.simple_query("SELECT 1").await?.into_results().await?;
        }

        info!(
            "Connected to MSSQL: {}:{}/{} (pool_size={}, max_params_per_batch={})",
            target.host,
            target.port,
            target.database,
            settings.pool_size,
            settings.max_params_per_batch
        );

        Ok(Self {
            pool,
            max_params_per_batch: settings.max_params_per_batch,
        })
    }

    /// Check out a session. Each checkout gets a fresh [`ConnectionId`].
    pub async fn get(&self) -> Result<MssqlConnection<'_>> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| InsertError::pool(e, "getting MSSQL connection"))?;
        Ok(MssqlConnection {
            id: ConnectionId::new(),
            client,
            max_params_per_batch: self.max_params_per_batch,
        })
    }

    /// Run `SELECT 1` on a pooled session.
    pub async fn health_check(&self) -> Result<()> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| InsertError::pool(e, "MSSQL health check"))?;
        conn.simple_query("SELECT 1").await?.into_row().await?;
        Ok(())
    }
}

/// One checked-out SQL Server session.
///
/// Parameterless statements run as plain SQL batches, so `#temp` tables they
/// create stay visible for the rest of the session. Parameterized statements
/// are sent through `sp_executesql`, which runs in a nested scope that can
/// still see those tables.
pub struct MssqlConnection<'a> {
    id: ConnectionId,
    client: PooledConnection<'a, TiberiusConnectionManager>,
    max_params_per_batch: usize,
}

#[async_trait]
impl Connection for MssqlConnection<'_> {
    fn id(&self) -> ConnectionId {
        self.id
    }

    async fn execute(&mut self, sql: &str, params: &[Row]) -> Result<u64> {
        if params.is_empty() {
            // Row counts are not reported for plain batches
            self.client.simple_query(sql).await?.into_results().await?;
            return Ok(0);
        }

        let batches = encode_batches(sql, params, self.max_params_per_batch)?;
        let mut total = 0u64;
        for (i, batch) in batches.iter().enumerate() {
            let refs: Vec<&dyn ToSql> = batch.params.iter().map(|p| p.as_ref()).collect();
            let result = self.client.execute(batch.sql.as_str(), &refs).await?;
            total += result.total();
            debug!(
                "Executed parameter batch {}/{} ({} rows, {} params) on connection {}",
                i + 1,
                batches.len(),
                batch.rows,
                batch.params.len(),
                self.id
            );
        }
        Ok(total)
    }

    async fn query(&mut self, sql: &str) -> Result<Vec<Row>> {
        let rows = self.client.simple_query(sql).await?.into_first_result().await?;
        rows.into_iter().map(decode_row).collect()
    }

    async fn begin_transaction(&mut self) -> Result<()> {
        self.client
            .simple_query("BEGIN TRANSACTION")
            .await?
            .into_results()
            .await?;
        Ok(())
    }

    async fn commit_transaction(&mut self) -> Result<()> {
        self.client
            .simple_query("COMMIT TRANSACTION")
            .await?
            .into_results()
            .await?;
        Ok(())
    }

    async fn rollback_transaction(&mut self) -> Result<()> {
        // A statement error may already have aborted the transaction
        self.client
            .simple_query("IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION")
            .await?
            .into_results()
            .await?;
        Ok(())
    }
}
