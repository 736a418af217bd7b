//! User entity.

use super::require_text;
use crate::error::DbResult;
use serde::{Deserialize, Serialize};

pub const USER_NAME_MAX_CHARS: usize = 50;
pub const USER_EMAIL_MAX_CHARS: usize = 100;

/// A stored user. Email is unique at the storage layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
}

/// Fields for inserting a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
}

impl NewUser {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    pub fn validate(&self) -> DbResult<()> {
        require_text("user name", &self.name, Some(USER_NAME_MAX_CHARS))?;
        require_text("user email", &self.email, Some(USER_EMAIL_MAX_CHARS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_user_validation() {
        assert!(NewUser::new("User 1", "user1@example.com").validate().is_ok());
        assert!(NewUser::new("", "user1@example.com").validate().is_err());
        assert!(NewUser::new("User 1", "").validate().is_err());
        assert!(
            NewUser::new("x".repeat(USER_NAME_MAX_CHARS + 1), "a@b.c")
                .validate()
                .is_err()
        );
    }
}
