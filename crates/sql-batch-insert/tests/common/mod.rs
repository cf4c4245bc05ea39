//! In-memory stand-in for a SQL Server session.
//!
//! Understands exactly the statement shapes the inserter emits: staging DDL,
//! INSERT with or without an `OUTPUT ... INTO` capture, the ordered staging
//! SELECT and the staging DROP. The target table has an identity column named
//! `Id`; any other captured column gets a value derived from the identity.

#![allow(dead_code)]

use std::collections::HashMap;

use async_trait::async_trait;
use sql_batch_insert::core::ORDINAL_COLUMN;
use sql_batch_insert::{Connection, ConnectionId, InsertError, Result, Row, SqlValue};

pub const IDENTITY_COLUMN: &str = "Id";

#[derive(Default)]
pub struct Faults {
    /// Capture one row fewer than was inserted.
    pub drop_staging_row: bool,
    /// Capture every row with its ordinal shifted by one.
    pub shift_ordinals: bool,
    /// Fail any statement starting with this text.
    pub fail_on: Option<String>,
}

pub struct FakeConnection {
    id: ConnectionId,
    pub faults: Faults,
    pub statements: Vec<String>,
    pub committed: Vec<Row>,
    pub pending: Vec<Row>,
    pub staging: HashMap<String, Vec<Row>>,
    pub in_transaction: bool,
    next_identity: i32,
}

impl FakeConnection {
    pub fn new() -> Self {
        Self {
            id: ConnectionId::new(),
            faults: Faults::default(),
            statements: Vec::new(),
            committed: Vec::new(),
            pending: Vec::new(),
            staging: HashMap::new(),
            in_transaction: false,
            next_identity: 1,
        }
    }

    pub fn with_faults(faults: Faults) -> Self {
        Self {
            faults,
            ..Self::new()
        }
    }

    pub fn count_starting_with(&self, prefix: &str) -> usize {
        self.statements.iter().filter(|s| s.starts_with(prefix)).count()
    }

    fn record(&mut self, sql: &str) -> Result<()> {
        self.statements.push(sql.to_string());
        match &self.faults.fail_on {
            Some(prefix) if sql.starts_with(prefix.as_str()) => Err(simulated(sql)),
            _ => Ok(()),
        }
    }

    fn store(&mut self, row: Row) {
        if self.in_transaction {
            self.pending.push(row);
        } else {
            self.committed.push(row);
        }
    }

    fn insert(&mut self, sql: &str, params: &[Row]) -> Result<u64> {
        let columns = bracketed_list(between(sql, "(", ")").ok_or_else(|| simulated(sql))?);
        let values = after(sql, "VALUES (").ok_or_else(|| simulated(sql))?;
        let placeholders: Vec<String> = values
            .trim_end_matches(')')
            .split(", ")
            .map(|p| p.trim_start_matches('@').to_string())
            .collect();
        let capture = capture_target(sql);

        let mut captured = Vec::new();
        for (i, param_row) in params.iter().enumerate() {
            let identity = self.next_identity;
            self.next_identity += 1;

            let mut row = Row::new().with(IDENTITY_COLUMN, identity);
            for (column, placeholder) in columns.iter().zip(&placeholders) {
                let value = param_row.get(placeholder).cloned().ok_or_else(|| {
                    InsertError::Config(format!("parameter @{} not bound", placeholder))
                })?;
                row.push(column.clone(), value);
            }
            self.store(row);

            if let Some((_, auto_columns)) = &capture {
                let ordinal = param_row
                    .get(ORDINAL_COLUMN)
                    .and_then(|v| v.as_i32())
                    .ok_or_else(|| simulated(sql))?;
                let ordinal = if self.faults.shift_ordinals { ordinal + 1 } else { ordinal };
                let mut staged = Row::new().with(ORDINAL_COLUMN, ordinal);
                for column in auto_columns {
                    staged.push(column.clone(), generated_value(column, identity));
                }
                if !(self.faults.drop_staging_row && i + 1 == params.len()) {
                    captured.push(staged);
                }
            }
        }

        if let Some((staging, _)) = capture {
            self.staging
                .get_mut(&staging)
                .ok_or_else(|| simulated(sql))?
                .extend(captured);
        }
        Ok(params.len() as u64)
    }
}

/// Value the fake database generates for an auto column.
pub fn generated_value(column: &str, identity: i32) -> SqlValue<'static> {
    if column == IDENTITY_COLUMN {
        SqlValue::I32(identity)
    } else {
        SqlValue::text_owned(format!("{}-{}", column, identity))
    }
}

#[async_trait]
impl Connection for FakeConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    async fn execute(&mut self, sql: &str, params: &[Row]) -> Result<u64> {
        self.record(sql)?;

        if sql.starts_with("IF OBJECT_ID") {
            let name = between(sql, "CREATE TABLE [", "]").ok_or_else(|| simulated(sql))?;
            self.staging.insert(name.to_string(), Vec::new());
            Ok(0)
        } else if sql.starts_with("INSERT INTO") {
            self.insert(sql, params)
        } else if let Some(name) = sql.strip_prefix("DROP TABLE [") {
            let name = name.trim_end_matches(']');
            self.staging.remove(name).ok_or_else(|| simulated(sql))?;
            Ok(0)
        } else {
            Err(simulated(sql))
        }
    }

    async fn query(&mut self, sql: &str) -> Result<Vec<Row>> {
        self.record(sql)?;
        let name = between(sql, "SELECT * FROM [", "]").ok_or_else(|| simulated(sql))?;
        let mut rows = self.staging.get(name).cloned().ok_or_else(|| simulated(sql))?;
        rows.sort_by_key(|r| r.get(ORDINAL_COLUMN).and_then(|v| v.as_i64()));
        Ok(rows)
    }

    async fn begin_transaction(&mut self) -> Result<()> {
        self.record("BEGIN TRANSACTION")?;
        self.in_transaction = true;
        Ok(())
    }

    async fn commit_transaction(&mut self) -> Result<()> {
        self.record("COMMIT TRANSACTION")?;
        self.committed.append(&mut self.pending);
        self.in_transaction = false;
        Ok(())
    }

    async fn rollback_transaction(&mut self) -> Result<()> {
        self.record("ROLLBACK TRANSACTION")?;
        self.pending.clear();
        self.in_transaction = false;
        Ok(())
    }
}

fn simulated(sql: &str) -> InsertError {
    InsertError::Connection(tiberius::error::Error::Protocol(
        format!("simulated failure: {}", sql).into(),
    ))
}

fn between<'s>(s: &'s str, start: &str, end: &str) -> Option<&'s str> {
    let from = s.find(start)? + start.len();
    let len = s[from..].find(end)?;
    Some(&s[from..from + len])
}

fn after<'s>(s: &'s str, marker: &str) -> Option<&'s str> {
    s.find(marker).map(|i| &s[i + marker.len()..])
}

fn bracketed_list(s: &str) -> Vec<String> {
    s.split(", ")
        .map(|c| c.trim_start_matches('[').trim_end_matches(']').to_string())
        .collect()
}

/// Staging table and captured auto column names of an `OUTPUT ... INTO`.
fn capture_target(sql: &str) -> Option<(String, Vec<String>)> {
    let outputs = between(sql, " OUTPUT ", " INTO ")?;
    let auto_columns = outputs
        .split(", ")
        .filter_map(|o| o.strip_prefix("INSERTED."))
        .map(|c| c.trim_start_matches('[').trim_end_matches(']').to_string())
        .collect();
    let staging = between(after(sql, " OUTPUT ")?, " INTO [", "]")?;
    Some((staging.to_string(), auto_columns))
}
