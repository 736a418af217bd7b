//! Data models for pooldb.
//!
//! Entities are detached value objects: a read materializes every field the
//! caller can see, so nothing here ever reaches back into storage.

pub mod connection;
pub mod product;
pub mod role;
pub mod user;

// Re-export commonly used types
pub use connection::{ConnectionConfig, ConnectionConfigError, DatabaseType};
pub use product::{NewProduct, Product};
pub use role::{NewPolicy, NewRole, Policy, PolicyAction, Role, RolePolicy};
pub use user::{NewUser, User};

use crate::error::{DbError, DbResult};

/// Reject empty (or whitespace-only) text and text longer than `max_chars`.
pub(crate) fn require_text(field: &str, value: &str, max_chars: Option<usize>) -> DbResult<()> {
    if value.trim().is_empty() {
        return Err(DbError::invalid_input(format!("{field} cannot be empty")));
    }
    if let Some(max) = max_chars {
        let len = value.chars().count();
        if len > max {
            return Err(DbError::invalid_input(format!(
                "{field} exceeds {max} characters (got {len})"
            )));
        }
    }
    Ok(())
}
