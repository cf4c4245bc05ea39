//! Caller-owned transaction handles.
//!
//! A [`Transaction`] records which session it was begun on. The engine uses
//! that to reject a handle passed alongside a different connection before it
//! issues any statement, and never finalizes a handle it did not create.

use std::fmt;

use tracing::debug;
use uuid::Uuid;

use crate::error::{InsertError, Result};

use super::traits::Connection;

/// Identity of one database session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Create a fresh, globally unique identity.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// An open transaction owned by the caller.
///
/// Created with [`Transaction::begin`] and finalized with
/// [`commit`](Transaction::commit) or [`rollback`](Transaction::rollback),
/// both of which consume the handle.
#[derive(Debug)]
#[must_use = "a transaction must be committed or rolled back"]
pub struct Transaction {
    connection: ConnectionId,
}

impl Transaction {
    /// Begin a transaction on `conn`.
    pub async fn begin<C: Connection + ?Sized>(conn: &mut C) -> Result<Self> {
        conn.begin_transaction().await?;
        debug!("Began caller-owned transaction on connection {}", conn.id());
        Ok(Self {
            connection: conn.id(),
        })
    }

    /// Session this transaction was begun on.
    pub fn connection_id(&self) -> ConnectionId {
        self.connection
    }

    /// Check whether this transaction was begun on `conn`.
    pub fn belongs_to<C: Connection + ?Sized>(&self, conn: &C) -> bool {
        self.connection == conn.id()
    }

    /// Fail with [`InsertError::Precondition`] unless this transaction was
    /// begun on `conn`.
    pub fn ensure_belongs_to<C: Connection + ?Sized>(&self, conn: &C) -> Result<()> {
        if self.belongs_to(conn) {
            Ok(())
        } else {
            Err(InsertError::Precondition(format!(
                "transaction/connection mismatch: transaction was begun on connection {}, got connection {}",
                self.connection,
                conn.id()
            )))
        }
    }

    /// Commit the transaction.
    pub async fn commit<C: Connection + ?Sized>(self, conn: &mut C) -> Result<()> {
        self.ensure_belongs_to(conn)?;
        conn.commit_transaction().await
    }

    /// Roll back the transaction.
    pub async fn rollback<C: Connection + ?Sized>(self, conn: &mut C) -> Result<()> {
        self.ensure_belongs_to(conn)?;
        conn.rollback_transaction().await
    }
}
