//! User persistence.

use crate::db::Session;
use crate::db::macros::with_connection;
use crate::error::{DbError, DbResult};
use crate::models::{NewUser, User};
use tracing::debug;

const INSERT: &str = "INSERT INTO users (name, email) VALUES ($1, $2) RETURNING id, name, email";
const SELECT_BY_ID: &str = "SELECT id, name, email FROM users WHERE id = $1";
const SELECT_BY_EMAIL: &str = "SELECT id, name, email FROM users WHERE email = $1";
const SELECT_ALL: &str = "SELECT id, name, email FROM users ORDER BY id";
const COUNT: &str = "SELECT COUNT(*) FROM users";

pub struct UserRepository;

impl UserRepository {
    /// Insert a user. A duplicate email fails with a unique `ConstraintViolation`.
    pub async fn create(session: &mut Session, user: NewUser) -> DbResult<User> {
        user.validate()?;
        let created = session
            .execute(move |tx| {
                Box::pin(async move {
                    with_connection!(tx, |conn| {
                        sqlx::query_as::<_, User>(INSERT)
                            .bind(user.name.as_str())
                            .bind(user.email.as_str())
                            .fetch_one(&mut *conn)
                            .await
                            .map_err(DbError::from)
                    })
                })
            })
            .await?;
        debug!(user_id = created.id, "User created");
        Ok(created)
    }

    /// Insert several users in the session's transaction, returning them in
    /// input order. Nothing is inserted if any entry fails validation.
    pub async fn create_many(session: &mut Session, users: Vec<NewUser>) -> DbResult<Vec<User>> {
        for user in &users {
            user.validate()?;
        }
        let count = users.len();
        let created = session
            .execute(move |tx| {
                Box::pin(async move {
                    with_connection!(tx, |conn| {
                        let mut created = Vec::with_capacity(users.len());
                        for user in &users {
                            let row = sqlx::query_as::<_, User>(INSERT)
                                .bind(user.name.as_str())
                                .bind(user.email.as_str())
                                .fetch_one(&mut *conn)
                                .await?;
                            created.push(row);
                        }
                        Ok::<_, DbError>(created)
                    })
                })
            })
            .await?;
        debug!(count, "Users created");
        Ok(created)
    }

    pub async fn get_by_id(session: &mut Session, id: i64) -> DbResult<Option<User>> {
        session
            .execute(move |tx| {
                Box::pin(async move {
                    with_connection!(tx, |conn| {
                        sqlx::query_as::<_, User>(SELECT_BY_ID)
                            .bind(id)
                            .fetch_optional(&mut *conn)
                            .await
                            .map_err(DbError::from)
                    })
                })
            })
            .await
    }

    pub async fn get_by_email(session: &mut Session, email: &str) -> DbResult<Option<User>> {
        let email = email.to_string();
        session
            .execute(move |tx| {
                Box::pin(async move {
                    with_connection!(tx, |conn| {
                        sqlx::query_as::<_, User>(SELECT_BY_EMAIL)
                            .bind(email.as_str())
                            .fetch_optional(&mut *conn)
                            .await
                            .map_err(DbError::from)
                    })
                })
            })
            .await
    }

    /// All users ordered by id.
    pub async fn list_all(session: &mut Session) -> DbResult<Vec<User>> {
        session
            .execute(|tx| {
                Box::pin(async move {
                    with_connection!(tx, |conn| {
                        sqlx::query_as::<_, User>(SELECT_ALL)
                            .fetch_all(&mut *conn)
                            .await
                            .map_err(DbError::from)
                    })
                })
            })
            .await
    }

    pub async fn count(session: &mut Session) -> DbResult<i64> {
        session
            .execute(|tx| {
                Box::pin(async move {
                    with_connection!(tx, |conn| {
                        sqlx::query_scalar::<_, i64>(COUNT)
                            .fetch_one(&mut *conn)
                            .await
                            .map_err(DbError::from)
                    })
                })
            })
            .await
    }
}
