//! Error types for the batch insert engine.

use thiserror::Error;

/// Main error type for batch insert operations.
#[derive(Error, Debug)]
pub enum InsertError {
    /// Invalid column mapping or configuration (duplicate column, bad YAML value, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A call was made with arguments that can never succeed, detected before any I/O
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// Generated values could not be read back from the staging table
    #[error("Retrieval failed for table {table}: {message}")]
    Retrieval { table: String, message: String },

    /// Statement execution or transaction control error from the database
    #[error("Database error: {0}")]
    Connection(#[from] tiberius::error::Error),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl InsertError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl ToString, context: impl Into<String>) -> Self {
        InsertError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Retrieval error
    pub fn retrieval(table: impl Into<String>, message: impl Into<String>) -> Self {
        InsertError::Retrieval {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for batch insert operations.
pub type Result<T> = std::result::Result<T, InsertError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retrieval_display() {
        let err = InsertError::retrieval("[dbo].[Users]", "row count mismatch");
        assert_eq!(
            err.to_string(),
            "Retrieval failed for table [dbo].[Users]: row count mismatch"
        );
    }

    #[test]
    fn test_format_detailed_includes_source() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "config.yaml missing");
        let err = InsertError::from(io);
        let detailed = err.format_detailed();
        assert!(detailed.starts_with("Error: IO error: config.yaml missing"));
    }

    #[test]
    fn test_pool_error_context() {
        let err = InsertError::pool("timed out", "getting MSSQL connection");
        assert!(err.to_string().contains("Context: getting MSSQL connection"));
    }
}
