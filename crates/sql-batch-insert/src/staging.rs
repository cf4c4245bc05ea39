//! Staging round trip for database-generated column values.
//!
//! When a record type has auto-generated columns, the insert statement
//! redirects the generated values into a session temp table, one captured row
//! per inserted record. The round trip moves through
//! `Created → Populated → Read → Dropped`:
//!
//! 1. **Created**: drop-if-exists then create the staging table
//! 2. **Populated**: run the insert with its capture clause, binding one
//!    parameter row per record plus that record's ordinal
//! 3. **Read**: select the captured rows ordered by ordinal and check that
//!    there is exactly one per record, in record order, then merge each row
//!    into its record
//! 4. **Dropped**: drop the staging table, whether or not the earlier steps
//!    succeeded
//!
//! Staging names come from an injected [`StagingNamer`], so concurrent calls
//! never share a temp table name.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::core::identifier::validate_identifier;
use crate::core::{Connection, Row, SqlValue, StatementBuilder};
use crate::error::{InsertError, Result};
use crate::inserter::MergeGenerated;

/// Prefix of every generated staging table name.
pub const STAGING_PREFIX: &str = "#stage_";

/// Longest slice of the target table name kept in a staging name.
const MAX_TABLE_FRAGMENT: usize = 64;

/// SQL Server limit on `#temp` table names, in characters.
pub const MAX_STAGING_NAME_LENGTH: usize = 116;

/// Source of staging table names.
///
/// Implementations must return a name that no concurrent call on a session
/// sharing the same temp namespace can also receive, of at most
/// [`MAX_STAGING_NAME_LENGTH`] characters.
pub trait StagingNamer: Send + Sync {
    /// Staging table name for one insert call into `table`.
    fn staging_name(&self, table: &str) -> String;
}

/// Default namer: `#stage_<table>_<uuid v4>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidStagingNamer;

impl StagingNamer for UuidStagingNamer {
    fn staging_name(&self, table: &str) -> String {
        format!(
            "{}{}_{}",
            STAGING_PREFIX,
            table_fragment(table),
            Uuid::new_v4().simple()
        )
    }
}

/// Deterministic namer: `#stage_<table>_<n>` with a per-namer counter.
///
/// Unique only within one namer instance; meant for tests and dry runs.
#[derive(Debug, Default)]
pub struct SequentialStagingNamer {
    next: AtomicU64,
}

impl SequentialStagingNamer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StagingNamer for SequentialStagingNamer {
    fn staging_name(&self, table: &str) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}{}_{}", STAGING_PREFIX, table_fragment(table), n)
    }
}

/// Table name reduced to characters that are safe in a temp table name.
fn table_fragment(table: &str) -> String {
    table
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .take(MAX_TABLE_FRAGMENT)
        .collect()
}

/// Lifecycle of one staging table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagingState {
    /// Nothing has been executed yet.
    Pending,
    Created,
    Populated,
    Read,
    Dropped,
}

impl fmt::Display for StagingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StagingState::Pending => "pending",
            StagingState::Created => "created",
            StagingState::Populated => "populated",
            StagingState::Read => "read",
            StagingState::Dropped => "dropped",
        };
        f.write_str(s)
    }
}

/// One staging round trip, with all of its statements rendered up front.
pub struct StagingRoundTrip<'a> {
    table: &'a str,
    name: String,
    ordinal_column: String,
    ordinal_param: String,
    create_sql: String,
    insert_sql: String,
    select_sql: String,
    drop_sql: String,
    state: StagingState,
}

impl<'a> StagingRoundTrip<'a> {
    /// Render the round trip for inserting into `table` (already qualified
    /// and quoted) through staging table `name`.
    pub fn new<B: StatementBuilder + ?Sized>(
        builder: &B,
        table: &'a str,
        plain_columns: &[&str],
        auto_columns: &[(&str, &str)],
        name: String,
    ) -> Result<Self> {
        validate_identifier(&name)?;
        let length = name.chars().count();
        if length > MAX_STAGING_NAME_LENGTH {
            return Err(InsertError::Config(format!(
                "Staging table name exceeds {} characters (got {}): {:?}",
                MAX_STAGING_NAME_LENGTH, length, name
            )));
        }
        let auto_names: Vec<&str> = auto_columns.iter().map(|(n, _)| *n).collect();
        let ordinal_column = builder.ordinal_column().to_string();

        Ok(Self {
            table,
            create_sql: builder.staging_ddl(&name, auto_columns),
            insert_sql: builder.insert_statement(table, plain_columns, Some((&auto_names, &name))),
            select_sql: builder.staging_select(&name),
            drop_sql: builder.staging_drop(&name),
            ordinal_param: builder.param_name(&ordinal_column),
            ordinal_column,
            name,
            state: StagingState::Pending,
        })
    }

    /// Staging table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> StagingState {
        self.state
    }

    /// Run every step for `items` and their parameter `rows` (same order),
    /// returning the records with their generated values merged in.
    ///
    /// The staging table is dropped once it has been created, even when a
    /// later step fails. If both a step and the drop fail, the step's error
    /// is returned and the drop failure is logged.
    pub async fn run<C, T>(&mut self, conn: &mut C, items: Vec<T>, rows: Vec<Row>) -> Result<Vec<T>>
    where
        C: Connection + ?Sized,
        T: MergeGenerated,
    {
        let body = self.run_body(conn, items, rows).await;

        if self.state == StagingState::Pending {
            return body;
        }

        let dropped = self.drop_table(conn).await;
        match (body, dropped) {
            (Ok(merged), Ok(())) => Ok(merged),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(drop_err)) => {
                warn!(
                    "Failed to drop staging table {} (left {}) after error: {}",
                    self.name, self.state, drop_err
                );
                Err(e)
            }
        }
    }

    async fn run_body<C, T>(&mut self, conn: &mut C, items: Vec<T>, rows: Vec<Row>) -> Result<Vec<T>>
    where
        C: Connection + ?Sized,
        T: MergeGenerated,
    {
        self.create(conn).await?;
        self.populate(conn, rows).await?;
        let generated = self.read(conn, items.len()).await?;

        items
            .into_iter()
            .zip(generated.iter())
            .map(|(item, row)| item.merge(row))
            .collect()
    }

    async fn create<C: Connection + ?Sized>(&mut self, conn: &mut C) -> Result<()> {
        debug!("Creating staging table {}: {}", self.name, self.create_sql);
        conn.execute(&self.create_sql, &[]).await?;
        self.state = StagingState::Created;
        Ok(())
    }

    async fn populate<C: Connection + ?Sized>(
        &mut self,
        conn: &mut C,
        rows: Vec<Row>,
    ) -> Result<()> {
        let mut params = Vec::with_capacity(rows.len());
        for (i, mut row) in rows.into_iter().enumerate() {
            let ordinal = i32::try_from(i).map_err(|_| {
                InsertError::Config(format!("Batch of more than {} records", i32::MAX))
            })?;
            row.push(self.ordinal_param.clone(), SqlValue::I32(ordinal));
            params.push(row);
        }

        debug!(
            "Populating staging table {} with {} rows: {}",
            self.name,
            params.len(),
            self.insert_sql
        );
        let affected = conn.execute(&self.insert_sql, &params).await?;
        debug!("Inserted {} rows into {}", affected, self.table);
        self.state = StagingState::Populated;
        Ok(())
    }

    async fn read<C: Connection + ?Sized>(
        &mut self,
        conn: &mut C,
        expected: usize,
    ) -> Result<Vec<Row>> {
        debug!("Reading staging table {}: {}", self.name, self.select_sql);
        let rows = conn.query(&self.select_sql).await?;
        let generated = check_generated_rows(self.table, &self.ordinal_column, rows, expected)?;
        self.state = StagingState::Read;
        Ok(generated)
    }

    async fn drop_table<C: Connection + ?Sized>(&mut self, conn: &mut C) -> Result<()> {
        debug!("Dropping staging table {}", self.name);
        conn.execute(&self.drop_sql, &[]).await?;
        self.state = StagingState::Dropped;
        Ok(())
    }
}

/// Check that the staging read returned exactly one row per record, in
/// record order, and strip the ordinal column from each.
pub(crate) fn check_generated_rows(
    table: &str,
    ordinal_column: &str,
    rows: Vec<Row>,
    expected: usize,
) -> Result<Vec<Row>> {
    if rows.is_empty() && expected > 0 {
        return Err(InsertError::retrieval(table, "no rows returned"));
    }
    if rows.len() != expected {
        return Err(InsertError::retrieval(
            table,
            format!(
                "row count mismatch: expected {}, got {}",
                expected,
                rows.len()
            ),
        ));
    }

    rows.into_iter()
        .enumerate()
        .map(|(i, mut row)| {
            let ordinal = row.remove(ordinal_column).and_then(|v| v.as_i64());
            match ordinal {
                Some(o) if usize::try_from(o).ok() == Some(i) => Ok(row),
                other => Err(InsertError::retrieval(
                    table,
                    format!(
                        "ordinal mismatch at position {}: got {}",
                        i,
                        other.map_or_else(|| "none".to_string(), |o| o.to_string())
                    ),
                )),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ORDINAL_COLUMN;

    fn generated(ordinal: i32, id: i32) -> Row {
        Row::new().with(ORDINAL_COLUMN, ordinal).with("Id", id)
    }

    #[test]
    fn test_uuid_names_are_unique_and_prefixed() {
        let namer = UuidStagingNamer;
        let a = namer.staging_name("Users");
        let b = namer.staging_name("Users");
        assert_ne!(a, b);
        assert!(a.starts_with("#stage_Users_"));
        assert_eq!(a.len(), "#stage_Users_".len() + 32);
    }

    #[test]
    fn test_table_fragment_sanitized_and_truncated() {
        assert_eq!(
            SequentialStagingNamer::new().staging_name("[dbo].[Order Lines]"),
            "#stage__dbo___Order_Lines__0"
        );

        let long = "x".repeat(200);
        let name = UuidStagingNamer.staging_name(&long);
        assert!(name.len() <= MAX_STAGING_NAME_LENGTH);
    }

    #[test]
    fn test_sequential_namer() {
        let namer = SequentialStagingNamer::new();
        assert_eq!(namer.staging_name("t"), "#stage_t_0");
        assert_eq!(namer.staging_name("t"), "#stage_t_1");
    }

    #[test]
    fn test_check_rows_strips_ordinal() {
        let rows = vec![generated(0, 10), generated(1, 11)];
        let out = check_generated_rows("[t]", ORDINAL_COLUMN, rows, 2).unwrap();
        assert_eq!(out.len(), 2);
        assert!(out[0].get(ORDINAL_COLUMN).is_none());
        assert_eq!(out[1].get("Id"), Some(&SqlValue::I32(11)));
    }

    #[test]
    fn test_check_rows_empty() {
        let err = check_generated_rows("[t]", ORDINAL_COLUMN, vec![], 3).unwrap_err();
        assert!(matches!(err, InsertError::Retrieval { .. }));
        assert!(err.to_string().contains("no rows returned"));
    }

    #[test]
    fn test_check_rows_count_mismatch() {
        let rows = vec![generated(0, 10)];
        let err = check_generated_rows("[t]", ORDINAL_COLUMN, rows, 2).unwrap_err();
        assert!(err.to_string().contains("row count mismatch: expected 2, got 1"));
    }

    #[test]
    fn test_check_rows_ordinal_mismatch() {
        let rows = vec![generated(0, 10), generated(2, 12)];
        let err = check_generated_rows("[t]", ORDINAL_COLUMN, rows, 2).unwrap_err();
        assert!(err.to_string().contains("ordinal mismatch at position 1: got 2"));

        let rows = vec![Row::new().with("Id", 1i32)];
        let err = check_generated_rows("[t]", ORDINAL_COLUMN, rows, 1).unwrap_err();
        assert!(err.to_string().contains("got none"));
    }

    #[test]
    fn test_round_trip_renders_statements() {
        let builder = crate::drivers::MssqlDialect::new();
        let trip = StagingRoundTrip::new(
            &builder,
            "[dbo].[Users]",
            &["Name"],
            &[("Id", "int")],
            "#stage_Users_0".to_string(),
        )
        .unwrap();

        assert_eq!(trip.state(), StagingState::Pending);
        assert_eq!(trip.name(), "#stage_Users_0");
        assert!(trip.create_sql.contains("CREATE TABLE [#stage_Users_0]"));
        assert!(trip.insert_sql.contains("INTO [#stage_Users_0]"));
        assert_eq!(trip.ordinal_param, "__batch_ordinal");
    }

    #[test]
    fn test_staging_name_length_limit() {
        let builder = crate::drivers::MssqlDialect::new();
        let trip = |len: usize| {
            let name = format!("#{}", "s".repeat(len - 1));
            StagingRoundTrip::new(&builder, "[t]", &["Name"], &[("Id", "int")], name)
        };

        assert!(trip(MAX_STAGING_NAME_LENGTH).is_ok());
        let Err(err) = trip(MAX_STAGING_NAME_LENGTH + 1) else {
            panic!("over-long staging name accepted");
        };
        assert!(matches!(err, InsertError::Config(_)));
        assert!(err.to_string().contains("exceeds 116 characters"));
    }
}
