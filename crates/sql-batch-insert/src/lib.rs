//! # sql-batch-insert
//!
//! Batched inserts of typed records into SQL Server, with database-generated
//! columns read back into the records.
//!
//! This library provides:
//!
//! - **Column mappings** from a record type to table columns, each either
//!   supplied by the record or generated by the database
//! - **Batched inserts** that bind every record of a batch in as few round
//!   trips as the parameter limit allows
//! - **Generated value retrieval** through a session temp table populated by
//!   `OUTPUT ... INTO` and read back in record order
//! - **Transaction handling**, either self-owned (commit or roll back) or
//!   joining a transaction the caller already began
//!
//! ## Example
//!
//! ```rust,no_run
//! use sql_batch_insert::{BatchInserter, Config, MergeGenerated, MssqlPool, Row, Transaction};
//!
//! struct Customer {
//!     id: Option<i32>,
//!     name: String,
//! }
//!
//! impl MergeGenerated for Customer {
//!     fn merge(mut self, generated: &Row) -> sql_batch_insert::Result<Self> {
//!         self.id = generated.get("Id").and_then(|v| v.as_i32());
//!         Ok(self)
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> sql_batch_insert::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let pool = MssqlPool::new(&config).await?;
//!
//!     let mut inserter = BatchInserter::<Customer>::new("Customers")?;
//!     inserter.register_auto_column("Id", "int")?;
//!     inserter.register_plain_column("Name", |c: &Customer| c.name.as_str().into())?;
//!
//!     let mut conn = pool.get().await?;
//!     let tx = Transaction::begin(&mut conn).await?;
//!     let batch = vec![
//!         Customer { id: None, name: "A".into() },
//!         Customer { id: None, name: "B".into() },
//!     ];
//!     let saved = inserter.insert(batch, &mut conn, Some(&tx)).await?;
//!     tx.commit(&mut conn).await?;
//!
//!     println!("Inserted {} customers", saved.len());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod drivers;
pub mod error;
pub mod inserter;
pub mod mapping;
pub mod staging;

// Re-exports for convenient access
pub use config::{Config, InsertConfig, TargetConfig};
pub use crate::core::{
    Connection, ConnectionId, Row, SqlNullType, SqlValue, StatementBuilder, Transaction,
};
pub use drivers::{MssqlConnection, MssqlDialect, MssqlPool};
pub use error::{InsertError, Result};
pub use inserter::{BatchInserter, MergeGenerated, RenderedStatements};
pub use mapping::{ColumnKind, ColumnMapping, MappingRegistry};
pub use staging::{SequentialStagingNamer, StagingNamer, StagingState, UuidStagingNamer};
