//! Batch insert orchestration.
//!
//! A [`BatchInserter`] owns the column mappings for one record type and one
//! target table. Each [`insert`](BatchInserter::insert) call writes a whole
//! batch inside a single transaction and, when the table has auto-generated
//! columns, reads the generated values back through a staging round trip and
//! merges them into the returned records.
//!
//! # Example
//!
//! ```rust,no_run
//! use sql_batch_insert::{BatchInserter, Config, MergeGenerated, MssqlPool, Result, Row};
//!
//! struct User {
//!     id: Option<i32>,
//!     name: String,
//! }
//!
//! impl MergeGenerated for User {
//!     fn merge(mut self, generated: &Row) -> Result<Self> {
//!         self.id = generated.get("Id").and_then(|v| v.as_i32());
//!         Ok(self)
//!     }
//! }
//!
//! # async fn run() -> Result<()> {
//! let config = Config::load("config.yaml")?;
//! let pool = MssqlPool::new(&config).await?;
//!
//! let mut inserter = BatchInserter::<User>::new("Users")?.with_schema("dbo")?;
//! inserter.register_auto_column("Id", "int")?;
//! inserter.register_plain_column("Name", |u: &User| u.name.as_str().into())?;
//!
//! let mut conn = pool.get().await?;
//! let users = vec![User { id: None, name: "Ada".into() }];
//! let users = inserter.insert(users, &mut conn, None).await?;
//! assert!(users[0].id.is_some());
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::core::identifier::validate_identifier;
use crate::core::{Connection, Row, SqlValue, StatementBuilder, Transaction};
use crate::drivers::MssqlDialect;
use crate::error::{InsertError, Result};
use crate::mapping::{ColumnSplit, MappingRegistry};
use crate::staging::{StagingNamer, StagingRoundTrip, UuidStagingNamer};

/// Folds database-generated values back into a record.
///
/// Called once per record after a successful staging read, with the row of
/// generated values captured for that record (keyed by auto-generated column
/// name). Implementations must not perform I/O.
pub trait MergeGenerated: Sized {
    /// Return the record with its generated values applied.
    ///
    /// # Errors
    ///
    /// A value that is missing or of an unexpected type should be reported
    /// as [`InsertError::Retrieval`].
    fn merge(self, generated: &Row) -> Result<Self>;
}

/// Every statement one insert call would execute, for dry runs and logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedStatements {
    /// The insert statement, with its capture clause when the table has
    /// auto-generated columns.
    pub insert: String,
    /// Staging table DDL (auto-generated columns only).
    pub staging_create: Option<String>,
    /// Staging read (auto-generated columns only).
    pub staging_select: Option<String>,
    /// Staging drop (auto-generated columns only).
    pub staging_drop: Option<String>,
}

/// Inserts batches of `T` into one table.
pub struct BatchInserter<T, B = MssqlDialect> {
    table: String,
    schema: Option<String>,
    registry: MappingRegistry<T>,
    builder: B,
    namer: Arc<dyn StagingNamer>,
}

impl<T> BatchInserter<T, MssqlDialect> {
    /// Create an inserter for `table` using SQL Server syntax.
    ///
    /// # Errors
    ///
    /// `InsertError::Config` if the table name is not a valid identifier.
    pub fn new(table: impl Into<String>) -> Result<Self> {
        let table = table.into();
        validate_identifier(&table)?;
        Ok(Self {
            table,
            schema: None,
            registry: MappingRegistry::new(),
            builder: MssqlDialect::new(),
            namer: Arc::new(UuidStagingNamer),
        })
    }
}

impl<T, B: StatementBuilder> BatchInserter<T, B> {
    /// Qualify the target table with a schema.
    pub fn with_schema(mut self, schema: impl Into<String>) -> Result<Self> {
        let schema = schema.into();
        validate_identifier(&schema)?;
        self.schema = Some(schema);
        Ok(self)
    }

    /// Replace the statement builder.
    ///
    /// # Errors
    ///
    /// `InsertError::Config` if two registered columns map to the same
    /// parameter name under the new builder.
    pub fn with_builder<B2: StatementBuilder>(self, builder: B2) -> Result<BatchInserter<T, B2>> {
        let inserter = BatchInserter {
            table: self.table,
            schema: self.schema,
            registry: self.registry,
            builder,
            namer: self.namer,
        };
        let split = inserter.registry.split();
        for (i, column) in split.plain.iter().enumerate() {
            inserter.check_param_collision(column, &split.plain[..i])?;
        }
        Ok(inserter)
    }

    /// Replace the source of staging table names.
    pub fn with_staging_namer(mut self, namer: Arc<dyn StagingNamer>) -> Self {
        self.namer = namer;
        self
    }

    /// Append a column whose value is read off each record.
    ///
    /// # Errors
    ///
    /// `InsertError::Config` if the name duplicates a registered column, is
    /// not a valid identifier, or maps to the same parameter name as another
    /// plain column.
    pub fn register_plain_column<F>(&mut self, name: impl Into<String>, extractor: F) -> Result<()>
    where
        F: for<'a> Fn(&'a T) -> SqlValue<'a> + Send + Sync + 'static,
    {
        let name = name.into();
        {
            let split = self.registry.split();
            self.check_param_collision(&name, &split.plain)?;
        }
        self.registry.register_plain(name, extractor)
    }

    /// Append a column whose value the database generates.
    ///
    /// `db_type` declares the column in the staging table (e.g. `int`,
    /// `datetime2(7)`).
    pub fn register_auto_column(
        &mut self,
        name: impl Into<String>,
        db_type: impl Into<String>,
    ) -> Result<()> {
        self.registry.register_auto(name, db_type)
    }

    fn check_param_collision(&self, name: &str, plain: &[&str]) -> Result<()> {
        let param = self.builder.param_name(name);
        let ordinal_param = self.builder.param_name(self.builder.ordinal_column());
        if param.eq_ignore_ascii_case(&ordinal_param) {
            return Err(InsertError::Config(format!(
                "Column '{}' binds as reserved parameter @{}",
                name, param
            )));
        }
        let collision = plain.iter().copied().find(|other| {
            !other.eq_ignore_ascii_case(name)
                && self.builder.param_name(other).eq_ignore_ascii_case(&param)
        });
        if let Some(other) = collision {
            return Err(InsertError::Config(format!(
                "Columns '{}' and '{}' both bind as parameter @{}",
                other, name, param
            )));
        }
        Ok(())
    }

    /// Registered column mappings.
    pub fn registry(&self) -> &MappingRegistry<T> {
        &self.registry
    }

    /// Statement builder in use.
    pub fn builder(&self) -> &B {
        &self.builder
    }

    /// Target table, quoted and schema-qualified.
    pub fn qualified_table(&self) -> String {
        self.builder.qualify_table(self.schema.as_deref(), &self.table)
    }

    /// Render every statement an insert through `staging_table` would run.
    pub fn render(&self, staging_table: &str) -> RenderedStatements {
        let table = self.qualified_table();
        let split = self.registry.split();
        if split.auto.is_empty() {
            return RenderedStatements {
                insert: self.builder.insert_statement(&table, &split.plain, None),
                staging_create: None,
                staging_select: None,
                staging_drop: None,
            };
        }

        let auto_names = split.auto_names();
        RenderedStatements {
            insert: self.builder.insert_statement(
                &table,
                &split.plain,
                Some((&auto_names, staging_table)),
            ),
            staging_create: Some(self.builder.staging_ddl(staging_table, &split.auto)),
            staging_select: Some(self.builder.staging_select(staging_table)),
            staging_drop: Some(self.builder.staging_drop(staging_table)),
        }
    }

    /// Project a record into a parameter row keyed by parameter name.
    fn parameter_row(&self, record: &T) -> Row {
        self.registry
            .project(record)
            .into_iter()
            .map(|(name, value)| (self.builder.param_name(&name), value))
            .collect()
    }
}

impl<T: MergeGenerated, B: StatementBuilder> BatchInserter<T, B> {
    /// Insert `items` and return them, with generated values merged in when
    /// the table has auto-generated columns.
    ///
    /// With `transaction: None` the call begins its own transaction on
    /// `conn`, commits it on success and rolls it back on any error. A
    /// supplied transaction must have been begun on `conn`; it is used as is
    /// and never committed or rolled back here.
    ///
    /// An empty batch is returned unchanged without touching the connection.
    /// Without auto-generated columns the returned `Vec` is `items` itself.
    ///
    /// # Errors
    ///
    /// - `InsertError::Precondition` if `transaction` belongs to another
    ///   connection (nothing is executed)
    /// - `InsertError::Config` if no plain columns are registered (nothing is
    ///   executed)
    /// - `InsertError::Retrieval` if generated values cannot be read back
    /// - any error from the connection
    pub async fn insert<C: Connection + ?Sized>(
        &self,
        items: Vec<T>,
        conn: &mut C,
        transaction: Option<&Transaction>,
    ) -> Result<Vec<T>> {
        if let Some(tx) = transaction {
            tx.ensure_belongs_to(conn)?;
        }

        if items.is_empty() {
            debug!("Empty batch for {}, nothing to insert", self.table);
            return Ok(items);
        }

        let split = self.registry.split();
        if split.plain.is_empty() {
            return Err(InsertError::Config(format!(
                "No plain columns registered for table {}",
                self.table
            )));
        }

        let table = self.qualified_table();
        if transaction.is_some() {
            return self.insert_batch(items, &split, &table, conn).await;
        }

        let tx = Transaction::begin(conn).await?;
        match self.insert_batch(items, &split, &table, conn).await {
            Ok(items) => match tx.commit(conn).await {
                Ok(()) => {
                    info!("Inserted {} rows into {}", items.len(), table);
                    Ok(items)
                }
                Err(e) => {
                    if let Err(rb) = conn.rollback_transaction().await {
                        warn!("Rollback after failed commit on {} also failed: {}", table, rb);
                    }
                    Err(e)
                }
            },
            Err(e) => {
                debug!("Rolling back insert into {}: {}", table, e);
                if let Err(rb) = tx.rollback(conn).await {
                    warn!("Rollback of insert into {} failed: {}", table, rb);
                }
                Err(e)
            }
        }
    }

    async fn insert_batch<C: Connection + ?Sized>(
        &self,
        items: Vec<T>,
        split: &ColumnSplit<'_>,
        table: &str,
        conn: &mut C,
    ) -> Result<Vec<T>> {
        let rows: Vec<Row> = items.iter().map(|item| self.parameter_row(item)).collect();

        if split.auto.is_empty() {
            let sql = self.builder.insert_statement(table, &split.plain, None);
            debug!("Inserting {} rows into {}: {}", rows.len(), table, sql);
            let affected = conn.execute(&sql, &rows).await?;
            debug!("Inserted {} rows into {}", affected, table);
            return Ok(items);
        }

        let staging_name = self.namer.staging_name(&self.table);
        let mut round_trip =
            StagingRoundTrip::new(&self.builder, table, &split.plain, &split.auto, staging_name)?;
        round_trip.run(conn, items, rows).await
    }
}

impl<T, B: StatementBuilder> fmt::Debug for BatchInserter<T, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchInserter")
            .field("table", &self.table)
            .field("schema", &self.schema)
            .field("dialect", &self.builder.name())
            .field("columns", &self.registry)
            .finish()
    }
}
