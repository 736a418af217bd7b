//! Sessions: one unit of work against the pool.
//!
//! A session leases nothing until [`Session::begin`]. `begin` acquires a
//! pooled connection and opens a transaction on it; `commit` or `rollback`
//! ends the transaction and hands the connection back. A session runs
//! exactly one transaction:
//!
//! ```text
//! Idle --begin--> Active --commit--> Committed --close--> Closed
//!                        --rollback-> RolledBack --close--> Closed
//! ```
//!
//! Dropping a session (including when its task is cancelled) drops the
//! driver transaction, which queues a rollback that is flushed before the
//! connection can be handed to anyone else.

use crate::db::pool::{Lease, ManagedPool};
use crate::error::{DbError, DbResult};
use crate::models::DatabaseType;
use futures_util::future::BoxFuture;
use sqlx::{Postgres, Sqlite, Transaction};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Database-specific transaction wrapper.
pub enum DbTransaction {
    Postgres(Transaction<'static, Postgres>),
    SQLite(Transaction<'static, Sqlite>),
}

impl DbTransaction {
    pub fn db_type(&self) -> DatabaseType {
        match self {
            DbTransaction::Postgres(_) => DatabaseType::PostgreSQL,
            DbTransaction::SQLite(_) => DatabaseType::SQLite,
        }
    }

    async fn commit(self) -> DbResult<()> {
        match self {
            DbTransaction::Postgres(tx) => tx.commit().await.map_err(DbError::from),
            DbTransaction::SQLite(tx) => tx.commit().await.map_err(DbError::from),
        }
    }

    async fn rollback(self) -> DbResult<()> {
        match self {
            DbTransaction::Postgres(tx) => tx.rollback().await.map_err(DbError::from),
            DbTransaction::SQLite(tx) => tx.rollback().await.map_err(DbError::from),
        }
    }
}

impl std::fmt::Debug for DbTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("DbTransaction").field(&self.db_type()).finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Active,
    Committed,
    RolledBack,
    Closed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Active => "active",
            Self::Committed => "committed",
            Self::RolledBack => "rolled back",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

pub struct Session {
    id: String,
    pool: Arc<ManagedPool>,
    state: SessionState,
    transaction: Option<DbTransaction>,
    lease: Option<Lease>,
    acquire_timeout: Option<Duration>,
    /// Set while an operation is in flight and kept set if it fails, so a
    /// failed or cancelled operation leaves the transaction rollback-only.
    aborted: bool,
}

impl Session {
    pub(crate) fn new(pool: Arc<ManagedPool>, acquire_timeout: Option<Duration>) -> Self {
        let id = generate_session_id();
        debug!(session_id = %id, db_type = %pool.db_type(), "Session opened");
        Self {
            id,
            pool,
            state: SessionState::Idle,
            transaction: None,
            lease: None,
            acquire_timeout,
            aborted: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn db_type(&self) -> DatabaseType {
        self.pool.db_type()
    }

    /// Whether this session currently holds a pooled connection.
    pub fn holds_connection(&self) -> bool {
        self.lease.is_some()
    }

    /// Acquire a connection and open the transaction.
    ///
    /// Waits for a free connection when the pool is saturated. The wait is
    /// unbounded unless the pool or this session was given an acquire
    /// timeout, in which case `PoolExhausted` is returned on expiry.
    pub async fn begin(&mut self) -> DbResult<()> {
        match self.state {
            SessionState::Idle => {}
            SessionState::Closed => return Err(DbError::session_closed(&self.id)),
            _ => return Err(DbError::session_already_active(&self.id)),
        }
        if self.pool.is_closed() {
            return Err(DbError::PoolClosed);
        }

        let tx = self.pool.begin(self.acquire_timeout).await?;
        self.lease = Some(self.pool.lease());
        self.transaction = Some(tx);
        self.state = SessionState::Active;
        debug!(session_id = %self.id, "Transaction started");
        Ok(())
    }

    /// Run one operation inside the open transaction.
    ///
    /// Any error returned by `op` marks the transaction aborted: later
    /// `execute` and `commit` calls fail with `TransactionAborted` and the
    /// only way forward is `rollback` or `close`.
    pub async fn execute<T, F>(&mut self, op: F) -> DbResult<T>
    where
        F: for<'c> FnOnce(&'c mut DbTransaction) -> BoxFuture<'c, DbResult<T>>,
    {
        if self.state == SessionState::Closed {
            return Err(DbError::session_closed(&self.id));
        }
        if self.pool.is_closed() {
            return Err(DbError::PoolClosed);
        }
        let Some(tx) = self.transaction.as_mut() else {
            return Err(DbError::no_active_transaction(&self.id));
        };
        if self.aborted {
            return Err(DbError::transaction_aborted(&self.id));
        }

        self.aborted = true;
        let result = op(tx).await;
        match &result {
            Ok(_) => self.aborted = false,
            Err(e) => debug!(session_id = %self.id, error = %e, "Operation failed, transaction is rollback-only"),
        }
        result
    }

    /// Commit the transaction and return the connection to the pool.
    ///
    /// An aborted transaction is rolled back instead and `TransactionAborted`
    /// is returned. If the commit itself fails the driver discards the
    /// transaction and the session ends up `RolledBack`.
    pub async fn commit(&mut self) -> DbResult<()> {
        if self.state == SessionState::Closed {
            return Err(DbError::session_closed(&self.id));
        }
        let Some(tx) = self.transaction.take() else {
            return Err(DbError::no_active_transaction(&self.id));
        };

        let refusal = if self.pool.is_closed() {
            Some(DbError::PoolClosed)
        } else if self.aborted {
            Some(DbError::transaction_aborted(&self.id))
        } else {
            None
        };
        if let Some(err) = refusal {
            if let Err(e) = tx.rollback().await {
                warn!(session_id = %self.id, error = %e, "Rollback of refused commit failed");
            }
            self.finish(SessionState::RolledBack);
            return Err(err);
        }

        match tx.commit().await {
            Ok(()) => {
                self.finish(SessionState::Committed);
                debug!(session_id = %self.id, "Transaction committed");
                Ok(())
            }
            Err(e) => {
                self.finish(SessionState::RolledBack);
                warn!(session_id = %self.id, error = %e, "Commit failed, transaction discarded");
                Err(e)
            }
        }
    }

    /// Discard the transaction. A no-op unless a transaction is open;
    /// works even after the pool has been closed.
    pub async fn rollback(&mut self) -> DbResult<()> {
        if self.state == SessionState::Closed {
            return Err(DbError::session_closed(&self.id));
        }
        let Some(tx) = self.transaction.take() else {
            return Ok(());
        };

        let result = tx.rollback().await;
        self.finish(SessionState::RolledBack);
        match &result {
            Ok(()) => debug!(session_id = %self.id, "Transaction rolled back"),
            Err(e) => warn!(session_id = %self.id, error = %e, "Rollback failed, connection discarded"),
        }
        result
    }

    /// Finish the session, rolling back first if a transaction is still open.
    /// Calling it a second time fails with `SessionClosed`.
    pub async fn close(&mut self) -> DbResult<()> {
        if self.state == SessionState::Closed {
            return Err(DbError::session_closed(&self.id));
        }
        if self.transaction.is_some() {
            warn!(session_id = %self.id, "Session closed with an open transaction, rolling back");
            if let Err(e) = self.rollback().await {
                warn!(session_id = %self.id, error = %e, "Rollback on close failed");
            }
        }
        self.lease = None;
        self.state = SessionState::Closed;
        debug!(session_id = %self.id, "Session closed");
        Ok(())
    }

    fn finish(&mut self, state: SessionState) {
        self.state = state;
        self.aborted = false;
        self.lease = None;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.transaction.is_some() {
            // The driver queues a rollback when its transaction is dropped
            warn!(
                session_id = %self.id,
                state = %self.state,
                "Session dropped with an open transaction, rolling back"
            );
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("holds_connection", &self.lease.is_some())
            .field("aborted", &self.aborted)
            .finish_non_exhaustive()
    }
}

fn generate_session_id() -> String {
    format!("ses_{}", uuid::Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_format() {
        let id = generate_session_id();
        assert!(id.starts_with("ses_"));
        assert_eq!(id.len(), 4 + 32);
        assert_ne!(id, generate_session_id());
    }

    #[test]
    fn test_session_state_display() {
        assert_eq!(SessionState::RolledBack.to_string(), "rolled back");
        assert_eq!(
            serde_json::to_string(&SessionState::RolledBack).unwrap(),
            "\"rolled_back\""
        );
    }
}
