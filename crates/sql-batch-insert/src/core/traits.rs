//! Core traits for database-agnostic batch inserts.
//!
//! - [`Connection`]: the database collaborator the engine drives
//! - [`StatementBuilder`]: SQL syntax strategy for the statements the engine emits
//!
//! # Design Patterns
//!
//! - **Strategy**: `StatementBuilder` provides interchangeable SQL syntax
//! - **Template Method**: default fragment implementations define the statement
//!   skeleton, a dialect overrides only the fragments whose syntax differs

use async_trait::async_trait;

use crate::error::Result;

use super::row::Row;
use super::transaction::ConnectionId;

/// Column added to every staging table to carry the position of the record
/// that produced each captured row.
pub const ORDINAL_COLUMN: &str = "__batch_ordinal";

/// Execute statements against one database session.
///
/// Implementations wrap a single physical connection. Every call is awaited
/// to completion before the engine issues the next one, so an implementation
/// never sees overlapping calls.
///
/// # Parameters
///
/// Parameters are passed as [`Row`]s keyed by parameter name (without the `@`
/// prefix). `execute` with an empty slice runs the statement once without
/// parameters. With one or more rows it runs the statement once per row and
/// should do so in as few round trips as the driver allows.
#[async_trait]
pub trait Connection: Send {
    /// Identity of this session, used to check transaction ownership.
    fn id(&self) -> ConnectionId;

    /// Execute a statement, returning the number of affected rows.
    async fn execute(&mut self, sql: &str, params: &[Row]) -> Result<u64>;

    /// Execute a statement and collect its result rows.
    async fn query(&mut self, sql: &str) -> Result<Vec<Row>>;

    /// Begin a transaction on this session.
    async fn begin_transaction(&mut self) -> Result<()>;

    /// Commit the open transaction.
    async fn commit_transaction(&mut self) -> Result<()>;

    /// Roll back the open transaction.
    async fn rollback_transaction(&mut self) -> Result<()>;
}

/// SQL syntax strategy for the statements emitted by the engine.
///
/// Every method is a pure function of its arguments. The defaults produce
/// SQL Server syntax (bracket quoting, `@name` parameters,
/// `OUTPUT ... INTO` capture and `#temp` staging tables); only [`name`] is
/// required.
///
/// [`name`]: StatementBuilder::name
pub trait StatementBuilder: Send + Sync {
    /// Get the dialect identifier (e.g., "mssql").
    fn name(&self) -> &str;

    /// Quote an identifier (table name, column name, etc.).
    fn quote_ident(&self, name: &str) -> String {
        format!("[{}]", name.replace(']', "]]"))
    }

    /// Qualify a table name with an optional schema.
    fn qualify_table(&self, schema: Option<&str>, table: &str) -> String {
        match schema {
            Some(schema) => format!("{}.{}", self.quote_ident(schema), self.quote_ident(table)),
            None => self.quote_ident(table),
        }
    }

    /// Parameter name used to bind a column, without the `@` prefix.
    ///
    /// Characters that cannot appear in a parameter name are replaced with `_`.
    fn param_name(&self, column: &str) -> String {
        column
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
            .collect()
    }

    /// Placeholder for a column's value inside statement text.
    fn placeholder(&self, column: &str) -> String {
        format!("@{}", self.param_name(column))
    }

    /// Name of the staging column carrying each record's position.
    fn ordinal_column(&self) -> &str {
        ORDINAL_COLUMN
    }

    /// `INSERT INTO <table> (<plain columns>)`.
    fn insert_clause(&self, table: &str, plain_columns: &[&str]) -> String {
        let cols = plain_columns
            .iter()
            .map(|c| self.quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        format!("INSERT INTO {} ({})", table, cols)
    }

    /// `VALUES (@a, @b, ...)`, one placeholder per plain column.
    fn values_clause(&self, plain_columns: &[&str]) -> String {
        let params = plain_columns
            .iter()
            .map(|c| self.placeholder(c))
            .collect::<Vec<_>>()
            .join(", ");
        format!("VALUES ({})", params)
    }

    /// Redirect the generated values of this statement into the staging table.
    ///
    /// The ordinal placeholder is bound per parameter row, so each captured
    /// row records the position of the record that produced it.
    fn capture_clause(&self, auto_columns: &[&str], staging_table: &str) -> String {
        let ordinal = self.ordinal_column();
        let mut outputs: Vec<String> = auto_columns
            .iter()
            .map(|c| format!("INSERTED.{}", self.quote_ident(c)))
            .collect();
        outputs.push(self.placeholder(ordinal));

        let mut targets: Vec<String> = auto_columns.iter().map(|c| self.quote_ident(c)).collect();
        targets.push(self.quote_ident(ordinal));

        format!(
            "OUTPUT {} INTO {} ({})",
            outputs.join(", "),
            self.quote_ident(staging_table),
            targets.join(", ")
        )
    }

    /// Full insert statement, with the capture clause between the column
    /// list and the VALUES clause when `capture` is given.
    fn insert_statement(
        &self,
        table: &str,
        plain_columns: &[&str],
        capture: Option<(&[&str], &str)>,
    ) -> String {
        let insert = self.insert_clause(table, plain_columns);
        let values = self.values_clause(plain_columns);
        match capture {
            Some((auto_columns, staging_table)) => format!(
                "{} {} {}",
                insert,
                self.capture_clause(auto_columns, staging_table),
                values
            ),
            None => format!("{} {}", insert, values),
        }
    }

    /// Drop-if-exists then create the staging table.
    ///
    /// `auto_columns` pairs each generated column with its declared type.
    fn staging_ddl(&self, staging_table: &str, auto_columns: &[(&str, &str)]) -> String {
        let quoted = self.quote_ident(staging_table);
        let mut cols = vec![format!("{} int NOT NULL", self.quote_ident(self.ordinal_column()))];
        cols.extend(
            auto_columns
                .iter()
                .map(|(name, db_type)| format!("{} {}", self.quote_ident(name), db_type)),
        );
        format!(
            "IF OBJECT_ID(N'tempdb..{}') IS NOT NULL DROP TABLE {}; CREATE TABLE {} ({});",
            quoted.replace('\'', "''"),
            quoted,
            quoted,
            cols.join(", ")
        )
    }

    /// Read every captured row back in record order.
    fn staging_select(&self, staging_table: &str) -> String {
        format!(
            "SELECT * FROM {} ORDER BY {}",
            self.quote_ident(staging_table),
            self.quote_ident(self.ordinal_column())
        )
    }

    /// Drop the staging table.
    fn staging_drop(&self, staging_table: &str) -> String {
        format!("DROP TABLE {}", self.quote_ident(staging_table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Defaults;

    impl StatementBuilder for Defaults {
        fn name(&self) -> &str {
            "defaults"
        }
    }

    /// Dialect that only swaps the capture syntax.
    struct Returning;

    impl StatementBuilder for Returning {
        fn name(&self) -> &str {
            "returning"
        }

        fn insert_statement(
            &self,
            table: &str,
            plain_columns: &[&str],
            capture: Option<(&[&str], &str)>,
        ) -> String {
            let base = format!(
                "{} {}",
                self.insert_clause(table, plain_columns),
                self.values_clause(plain_columns)
            );
            match capture {
                Some((auto, _)) => format!("{} RETURNING {}", base, auto.join(", ")),
                None => base,
            }
        }
    }

    #[test]
    fn test_insert_without_capture() {
        let sql = Defaults.insert_statement("[dbo].[Users]", &["Name", "Email"], None);
        assert_eq!(
            sql,
            "INSERT INTO [dbo].[Users] ([Name], [Email]) VALUES (@Name, @Email)"
        );
    }

    #[test]
    fn test_capture_clause_sits_between_columns_and_values() {
        let auto = ["Id", "CreatedAt"];
        let sql = Defaults.insert_statement("[Users]", &["Name"], Some((&auto, "#stage_users")));
        assert_eq!(
            sql,
            "INSERT INTO [Users] ([Name]) \
             OUTPUT INSERTED.[Id], INSERTED.[CreatedAt], @__batch_ordinal \
             INTO [#stage_users] ([Id], [CreatedAt], [__batch_ordinal]) \
             VALUES (@Name)"
        );
    }

    #[test]
    fn test_staging_ddl_drops_then_creates() {
        let sql = Defaults.staging_ddl("#stage_users", &[("Id", "int"), ("Stamp", "datetime2(7)")]);
        assert!(sql.starts_with("IF OBJECT_ID(N'tempdb..[#stage_users]') IS NOT NULL"));
        assert!(sql.contains("DROP TABLE [#stage_users];"));
        assert!(sql.contains(
            "CREATE TABLE [#stage_users] ([__batch_ordinal] int NOT NULL, [Id] int, [Stamp] datetime2(7))"
        ));
    }

    #[test]
    fn test_staging_select_orders_by_ordinal() {
        assert_eq!(
            Defaults.staging_select("#s"),
            "SELECT * FROM [#s] ORDER BY [__batch_ordinal]"
        );
        assert_eq!(Defaults.staging_drop("#s"), "DROP TABLE [#s]");
    }

    #[test]
    fn test_param_name_sanitizes() {
        assert_eq!(Defaults.param_name("First Name"), "First_Name");
        assert_eq!(Defaults.placeholder("e-mail"), "@e_mail");
        assert_eq!(Defaults.param_name("Name"), "Name");
    }

    #[test]
    fn test_qualify_table() {
        assert_eq!(Defaults.qualify_table(Some("dbo"), "Users"), "[dbo].[Users]");
        assert_eq!(Defaults.qualify_table(None, "Us]ers"), "[Us]]ers]");
    }

    #[test]
    fn test_fragment_override() {
        let auto = ["id"];
        let sql = Returning.insert_statement("[t]", &["name"], Some((&auto, "#s")));
        assert_eq!(sql, "INSERT INTO [t] ([name]) VALUES (@name) RETURNING id");
        // Untouched fragments keep their defaults
        assert_eq!(Returning.staging_drop("#s"), Defaults.staging_drop("#s"));
    }
}
