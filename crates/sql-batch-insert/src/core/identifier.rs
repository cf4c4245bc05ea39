//! Identifier and type-declaration validation for generated SQL.
//!
//! Column names, table names and declared column types cannot be bound as
//! parameters, so they end up spliced into statement text. Everything that
//! reaches a statement goes through this module first:
//!
//! 1. Identifiers are checked for suspicious patterns (null bytes, excessive length)
//! 2. Declared types are restricted to the characters a type name can contain
//!
//! Quoting itself belongs to the [`StatementBuilder`](super::StatementBuilder).

use crate::error::{InsertError, Result};

/// Maximum identifier length (SQL Server: 128 characters).
pub const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Validate an identifier for security issues.
///
/// Rejects:
/// - Empty identifiers
/// - Identifiers containing null bytes (injection vector)
/// - Identifiers exceeding maximum length
///
/// # Errors
///
/// Returns `InsertError::Config` for invalid identifiers with a descriptive message.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(InsertError::Config(
            "Identifier cannot be empty".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(InsertError::Config(format!(
            "SECURITY: Identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(InsertError::Config(format!(
            "SECURITY: Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Validate a declared column type such as `int`, `datetime2(7)` or
/// `decimal(18, 2)`.
///
/// The declaration is placed verbatim into the staging table DDL, so only
/// letters, digits, underscores, spaces, parentheses and commas are accepted.
/// That excludes statement separators, comment markers and string literals.
pub fn validate_db_type(db_type: &str) -> Result<()> {
    let trimmed = db_type.trim();
    if trimmed.is_empty() {
        return Err(InsertError::Config(
            "Column type declaration cannot be empty".to_string(),
        ));
    }

    if let Some(bad) = trimmed
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | ' ' | '(' | ')' | ',')))
    {
        return Err(InsertError::Config(format!(
            "SECURITY: Column type declaration contains disallowed character {:?}: {:?}",
            bad, db_type
        )));
    }

    let depth = trimmed.chars().try_fold(0i32, |depth, c| {
        let next = match c {
            '(' => depth + 1,
            ')' => depth - 1,
            _ => depth,
        };
        (next >= 0).then_some(next)
    });
    if depth != Some(0) {
        return Err(InsertError::Config(format!(
            "Column type declaration has unbalanced parentheses: {:?}",
            db_type
        )));
    }

    Ok(())
}
