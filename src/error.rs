//! Error types for pooldb.
//!
//! This module defines all error types using `thiserror` for ergonomic error handling.
//! Driver errors are classified into this taxonomy at the boundary so callers never
//! have to match on raw `sqlx` errors.

use std::time::Duration;
use thiserror::Error;

/// Which storage constraint rejected a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    Unique,
    NotNull,
    Check,
    ForeignKey,
}

impl std::fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unique => write!(f, "unique"),
            Self::NotNull => write!(f, "not-null"),
            Self::Check => write!(f, "check"),
            Self::ForeignKey => write!(f, "foreign key"),
        }
    }
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Pool manager is not initialized")]
    NotInitialized,

    #[error("Connection pool is closed")]
    PoolClosed,

    #[error("Connection pool exhausted: {}", describe_wait(.waited_ms))]
    PoolExhausted {
        /// `None` when the driver timed out on its own acquire deadline
        waited_ms: Option<u64>,
    },

    #[error("Session already has an active transaction (session: {session_id})")]
    SessionAlreadyActive { session_id: String },

    #[error("No active transaction (session: {session_id})")]
    NoActiveTransaction { session_id: String },

    #[error("Session is closed (session: {session_id})")]
    SessionClosed { session_id: String },

    #[error(
        "Transaction aborted by an earlier failure and can only be rolled back (session: {session_id})"
    )]
    TransactionAborted { session_id: String },

    #[error("Constraint violation ({kind}): {message}")]
    ConstraintViolation {
        kind: ConstraintKind,
        /// Constraint name when the backend reports it (PostgreSQL does, SQLite does not)
        constraint: Option<String>,
        message: String,
    },

    #[error("Policy {policy_id} is already attached to role {role_id}")]
    DuplicateAssociation { role_id: i64, policy_id: i64 },

    #[error("{entity} not found: {key}")]
    NotFound { entity: String, key: String },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// e.g., "42P01" for undefined table, "5" for SQLITE_BUSY
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a pool exhausted error for the given wait.
    pub fn pool_exhausted(waited: Duration) -> Self {
        Self::PoolExhausted {
            waited_ms: Some(waited.as_millis() as u64),
        }
    }

    pub fn session_already_active(session_id: impl Into<String>) -> Self {
        Self::SessionAlreadyActive {
            session_id: session_id.into(),
        }
    }

    pub fn no_active_transaction(session_id: impl Into<String>) -> Self {
        Self::NoActiveTransaction {
            session_id: session_id.into(),
        }
    }

    pub fn session_closed(session_id: impl Into<String>) -> Self {
        Self::SessionClosed {
            session_id: session_id.into(),
        }
    }

    pub fn transaction_aborted(session_id: impl Into<String>) -> Self {
        Self::TransactionAborted {
            session_id: session_id.into(),
        }
    }

    /// Create a constraint violation error.
    pub fn constraint_violation(
        kind: ConstraintKind,
        constraint: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::ConstraintViolation {
            kind,
            constraint,
            message: message.into(),
        }
    }

    pub fn duplicate_association(role_id: i64, policy_id: i64) -> Self {
        Self::DuplicateAssociation { role_id, policy_id }
    }

    /// Create a not found error.
    pub fn not_found(entity: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            key: key.into(),
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a database error with optional SQL state.
    pub fn database(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Database { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }

    /// Check if this error is a unique-constraint rejection.
    pub fn is_unique_violation(&self) -> bool {
        matches!(
            self,
            Self::ConstraintViolation {
                kind: ConstraintKind::Unique,
                ..
            }
        )
    }

    /// Check if this error is retryable.
    ///
    /// Sessions never retry on their own; this only informs the caller's policy.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection { .. } | Self::PoolExhausted { .. } => true,
            Self::Database {
                sql_state: Some(code),
                ..
            } => is_lock_code(code),
            _ => false,
        }
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let kind = match db_err.kind() {
                    sqlx::error::ErrorKind::UniqueViolation => Some(ConstraintKind::Unique),
                    sqlx::error::ErrorKind::NotNullViolation => Some(ConstraintKind::NotNull),
                    sqlx::error::ErrorKind::CheckViolation => Some(ConstraintKind::Check),
                    sqlx::error::ErrorKind::ForeignKeyViolation => {
                        Some(ConstraintKind::ForeignKey)
                    }
                    _ => None,
                };
                match kind {
                    Some(kind) => DbError::constraint_violation(
                        kind,
                        db_err.constraint().map(String::from),
                        db_err.message(),
                    ),
                    None => {
                        let code = db_err.code().map(|c| c.to_string());
                        let suggestion = database_suggestion(code.as_deref());
                        DbError::database(db_err.message(), code, suggestion)
                    }
                }
            }
            sqlx::Error::RowNotFound => DbError::database(
                "No rows returned",
                None,
                "Verify the query conditions match existing data",
            ),
            sqlx::Error::PoolTimedOut => DbError::PoolExhausted { waited_ms: None },
            sqlx::Error::PoolClosed => DbError::PoolClosed,
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnNotFound(col) => {
                DbError::internal(format!("Column not found: {}", col))
            }
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

fn describe_wait(waited_ms: &Option<u64>) -> String {
    match waited_ms {
        Some(ms) => format!("no connection released within {ms}ms"),
        None => "no connection released before the acquire timeout".to_string(),
    }
}

/// SQLITE_BUSY (5) and SQLITE_LOCKED (6), including extended codes such as
/// SQLITE_BUSY_SNAPSHOT (517).
fn is_lock_code(code: &str) -> bool {
    code.parse::<i32>()
        .map(|c| matches!(c & 0xff, 5 | 6))
        .unwrap_or(false)
}

fn database_suggestion(code: Option<&str>) -> &'static str {
    match code {
        Some(code) if is_lock_code(code) => {
            "The database is locked by another writer; retry the unit of work or raise busy_timeout"
        }
        _ => "Check the SQL syntax and referenced objects",
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DbError::connection("Failed to connect", "Check credentials");
        assert!(err.to_string().contains("Connection failed"));
    }

    #[test]
    fn test_error_suggestion() {
        let err = DbError::database(
            "Syntax error",
            Some("42601".to_string()),
            "Check SQL syntax",
        );
        assert_eq!(err.suggestion(), Some("Check SQL syntax"));
        assert_eq!(DbError::PoolClosed.suggestion(), None);
    }

    #[test]
    fn test_error_retryable() {
        assert!(DbError::connection("err", "sugg").is_retryable());
        assert!(DbError::pool_exhausted(Duration::from_millis(10)).is_retryable());
        assert!(!DbError::invalid_input("bad").is_retryable());
        assert!(!DbError::PoolClosed.is_retryable());
    }

    #[test]
    fn test_sqlite_busy_codes_are_retryable() {
        let busy = DbError::database("database is locked", Some("5".to_string()), "retry");
        // SQLITE_BUSY_SNAPSHOT = 517
        let snapshot = DbError::database("snapshot", Some("517".to_string()), "retry");
        let syntax = DbError::database("syntax", Some("42601".to_string()), "fix");
        assert!(busy.is_retryable());
        assert!(snapshot.is_retryable());
        assert!(!syntax.is_retryable());
    }

    #[test]
    fn test_pool_errors_are_classified() {
        assert!(matches!(
            DbError::from(sqlx::Error::PoolClosed),
            DbError::PoolClosed
        ));
        let timed_out = DbError::from(sqlx::Error::PoolTimedOut);
        assert!(matches!(timed_out, DbError::PoolExhausted { waited_ms: None }));
        assert!(!timed_out.to_string().contains("0ms"));
        assert!(timed_out.is_retryable());
    }

    #[test]
    fn test_pool_exhausted_reports_wait() {
        let err = DbError::pool_exhausted(Duration::from_millis(250));
        assert!(matches!(err, DbError::PoolExhausted { waited_ms: Some(250) }));
        assert!(err.to_string().contains("250ms"));
    }

    #[test]
    fn test_lock_errors_suggest_retry() {
        for code in ["5", "6", "517"] {
            assert!(database_suggestion(Some(code)).contains("retry"), "code {code}");
        }
        assert_eq!(
            database_suggestion(Some("42601")),
            "Check the SQL syntax and referenced objects"
        );
        assert_eq!(
            database_suggestion(None),
            "Check the SQL syntax and referenced objects"
        );
    }

    #[test]
    fn test_unique_violation_check() {
        let unique = DbError::constraint_violation(
            ConstraintKind::Unique,
            Some("users_email_key".to_string()),
            "duplicate key",
        );
        let check = DbError::constraint_violation(ConstraintKind::Check, None, "bad value");
        assert!(unique.is_unique_violation());
        assert!(!check.is_unique_violation());
        assert!(unique.to_string().contains("unique"));
    }

    #[test]
    fn test_duplicate_association_display() {
        let err = DbError::duplicate_association(3, 7);
        assert_eq!(err.to_string(), "Policy 7 is already attached to role 3");
    }
}
