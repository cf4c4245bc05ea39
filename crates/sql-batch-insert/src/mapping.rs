//! Column mapping registry and row projection.
//!
//! A [`MappingRegistry`] lists, in order, every column a record type writes
//! to. Plain columns carry an extractor that reads the value off the record;
//! auto-generated columns carry only the declared SQL type of the value the
//! database produces for them.
//!
//! ```rust
//! use sql_batch_insert::mapping::MappingRegistry;
//!
//! struct Person {
//!     first: String,
//!     last: String,
//! }
//!
//! let mut registry = MappingRegistry::<Person>::new();
//! registry.register_auto("Id", "int").unwrap();
//! registry
//!     .register_plain("FullName", |p: &Person| format!("{} {}", p.first, p.last).into())
//!     .unwrap();
//!
//! let row = registry.project(&Person { first: "Ada".into(), last: "Lovelace".into() });
//! assert_eq!(row.get("FullName").and_then(|v| v.as_str()), Some("Ada Lovelace"));
//! assert!(row.get("Id").is_none());
//! ```

use std::fmt;

use crate::core::identifier::{validate_db_type, validate_identifier};
use crate::core::{Row, SqlValue, ORDINAL_COLUMN};
use crate::error::{InsertError, Result};

/// Reads one column value off a record.
pub type Extractor<T> = Box<dyn for<'a> Fn(&'a T) -> SqlValue<'a> + Send + Sync>;

/// How a column gets its value.
pub enum ColumnKind<T> {
    /// Supplied by the record through an extractor.
    Plain(Extractor<T>),
    /// Produced by the database during the insert and read back afterwards.
    AutoGenerated {
        /// SQL type used to declare the column in the staging table.
        db_type: String,
    },
}

/// One table column for record type `T`.
pub struct ColumnMapping<T> {
    name: String,
    kind: ColumnKind<T>,
}

impl<T> ColumnMapping<T> {
    /// Database column name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &ColumnKind<T> {
        &self.kind
    }

    /// Whether the database generates this column's value.
    pub fn is_auto(&self) -> bool {
        matches!(self.kind, ColumnKind::AutoGenerated { .. })
    }

    /// Declared type of an auto-generated column.
    pub fn db_type(&self) -> Option<&str> {
        match &self.kind {
            ColumnKind::AutoGenerated { db_type } => Some(db_type),
            ColumnKind::Plain(_) => None,
        }
    }
}

impl<T> fmt::Debug for ColumnMapping<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("ColumnMapping");
        s.field("name", &self.name);
        match &self.kind {
            ColumnKind::Plain(_) => s.field("kind", &"Plain"),
            ColumnKind::AutoGenerated { db_type } => s.field("db_type", db_type),
        };
        s.finish()
    }
}

/// Plain and auto-generated column names of a registry, split once per insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSplit<'a> {
    /// Plain column names in registration order.
    pub plain: Vec<&'a str>,
    /// Auto-generated `(name, db_type)` pairs in registration order.
    pub auto: Vec<(&'a str, &'a str)>,
}

impl ColumnSplit<'_> {
    /// Auto-generated column names without their types.
    pub fn auto_names(&self) -> Vec<&str> {
        self.auto.iter().map(|(name, _)| *name).collect()
    }
}

/// Ordered, append-only list of column mappings for record type `T`.
pub struct MappingRegistry<T> {
    columns: Vec<ColumnMapping<T>>,
}

impl<T> MappingRegistry<T> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            columns: Vec::new(),
        }
    }

    /// Append a column whose value is read off each record.
    ///
    /// # Errors
    ///
    /// `InsertError::Config` if the name is invalid or already registered.
    pub fn register_plain<F>(&mut self, name: impl Into<String>, extractor: F) -> Result<()>
    where
        F: for<'a> Fn(&'a T) -> SqlValue<'a> + Send + Sync + 'static,
    {
        let name = name.into();
        self.check_name(&name)?;
        self.columns.push(ColumnMapping {
            name,
            kind: ColumnKind::Plain(Box::new(extractor)),
        });
        Ok(())
    }

    /// Append a column whose value the database generates.
    ///
    /// # Errors
    ///
    /// `InsertError::Config` if the name is invalid or already registered,
    /// or if `db_type` is not a plain type declaration.
    pub fn register_auto(
        &mut self,
        name: impl Into<String>,
        db_type: impl Into<String>,
    ) -> Result<()> {
        let name = name.into();
        let db_type = db_type.into();
        self.check_name(&name)?;
        validate_db_type(&db_type)?;
        self.columns.push(ColumnMapping {
            name,
            kind: ColumnKind::AutoGenerated {
                db_type: db_type.trim().to_string(),
            },
        });
        Ok(())
    }

    fn check_name(&self, name: &str) -> Result<()> {
        validate_identifier(name)?;

        if name.eq_ignore_ascii_case(ORDINAL_COLUMN) {
            return Err(InsertError::Config(format!(
                "Column name '{}' is reserved for staging tables",
                name
            )));
        }

        // SQL Server column names are case-insensitive under the default collation
        if let Some(existing) = self
            .columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
        {
            return Err(InsertError::Config(format!(
                "Duplicate column mapping: '{}' is already registered as '{}'",
                name, existing.name
            )));
        }

        Ok(())
    }

    /// All mappings in registration order.
    pub fn columns(&self) -> &[ColumnMapping<T>] {
        &self.columns
    }

    /// Split the registry into plain and auto-generated columns.
    pub fn split(&self) -> ColumnSplit<'_> {
        let mut split = ColumnSplit {
            plain: Vec::new(),
            auto: Vec::new(),
        };
        for col in &self.columns {
            match &col.kind {
                ColumnKind::Plain(_) => split.plain.push(col.name.as_str()),
                ColumnKind::AutoGenerated { db_type } => {
                    split.auto.push((col.name.as_str(), db_type.as_str()))
                }
            }
        }
        split
    }

    pub fn has_auto_columns(&self) -> bool {
        self.columns.iter().any(ColumnMapping::is_auto)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Project a record into a row keyed by column name.
    ///
    /// Every plain extractor runs once, in registration order. Auto-generated
    /// columns are never projected.
    pub fn project(&self, record: &T) -> Row {
        let mut row = Row::with_capacity(self.columns.len());
        for col in &self.columns {
            if let ColumnKind::Plain(extract) = &col.kind {
                row.push(col.name.clone(), extract(record).into_owned());
            }
        }
        row
    }
}

impl<T> Default for MappingRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for MappingRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.columns.iter()).finish()
    }
}
