//! Database dispatch macros for reducing code duplication.
//!
//! Query text is shared between backends (both drivers accept `$N`
//! placeholders), but the connection and row types are not. These macros
//! expand one body per backend so each arm is type-checked against its own
//! driver.

/// Generate match arms over `DbPool` variants.
///
/// # Example
///
/// ```ignore
/// impl_db_dispatch!(pool, {
///     Postgres(p) => p.close().await,
///     SQLite(p) => p.close().await,
/// });
/// ```
macro_rules! impl_db_dispatch {
    ($pool:expr, { $($variant:ident($p:ident) => $body:expr),+ $(,)? }) => {
        match $pool {
            $(
                $crate::db::pool::DbPool::$variant($p) => $body,
            )+
        }
    };
}

/// Run the same body against the connection behind a `DbTransaction`.
///
/// `$conn` is bound to `&mut PgConnection` or `&mut SqliteConnection`;
/// reborrow with `&mut *conn` when the body issues more than one query.
///
/// # Example
///
/// ```ignore
/// let count: i64 = with_connection!(tx, |conn| {
///     sqlx::query_scalar("SELECT COUNT(*) FROM users")
///         .fetch_one(&mut *conn)
///         .await
/// })?;
/// ```
macro_rules! with_connection {
    ($tx:expr, |$conn:ident| $body:expr) => {
        match $tx {
            $crate::db::session::DbTransaction::Postgres(tx) => {
                let $conn: &mut ::sqlx::PgConnection = &mut **tx;
                $body
            }
            $crate::db::session::DbTransaction::SQLite(tx) => {
                let $conn: &mut ::sqlx::SqliteConnection = &mut **tx;
                $body
            }
        }
    };
}

pub(crate) use impl_db_dispatch;
pub(crate) use with_connection;
