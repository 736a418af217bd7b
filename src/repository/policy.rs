//! Policy persistence.

use crate::db::Session;
use crate::db::macros::with_connection;
use crate::error::{DbError, DbResult};
use crate::models::{NewPolicy, Policy, PolicyAction};
use tracing::debug;

const INSERT: &str =
    "INSERT INTO policies (resource, action) VALUES ($1, $2) RETURNING id, resource, action";
const SELECT_BY_ID: &str = "SELECT id, resource, action FROM policies WHERE id = $1";
const SELECT_BY_RESOURCE_ACTION: &str =
    "SELECT id, resource, action FROM policies WHERE resource = $1 AND action = $2";
const SELECT_ALL: &str = "SELECT id, resource, action FROM policies ORDER BY id";
const DELETE: &str = "DELETE FROM policies WHERE id = $1";

pub struct PolicyRepository;

impl PolicyRepository {
    /// Insert a policy. A duplicate `(resource, action)` pair fails with a
    /// unique `ConstraintViolation`.
    pub async fn create(session: &mut Session, policy: NewPolicy) -> DbResult<Policy> {
        policy.validate()?;
        let created = session
            .execute(move |tx| {
                Box::pin(async move {
                    with_connection!(tx, |conn| {
                        sqlx::query_as::<_, Policy>(INSERT)
                            .bind(policy.resource.as_str())
                            .bind(policy.action.as_str())
                            .fetch_one(&mut *conn)
                            .await
                            .map_err(DbError::from)
                    })
                })
            })
            .await?;
        debug!(policy_id = created.id, resource = %created.resource, action = %created.action, "Policy created");
        Ok(created)
    }

    pub async fn get_by_id(session: &mut Session, id: i64) -> DbResult<Option<Policy>> {
        session
            .execute(move |tx| {
                Box::pin(async move {
                    with_connection!(tx, |conn| {
                        sqlx::query_as::<_, Policy>(SELECT_BY_ID)
                            .bind(id)
                            .fetch_optional(&mut *conn)
                            .await
                            .map_err(DbError::from)
                    })
                })
            })
            .await
    }

    pub async fn get_by_resource_action(
        session: &mut Session,
        resource: &str,
        action: PolicyAction,
    ) -> DbResult<Option<Policy>> {
        let resource = resource.to_string();
        session
            .execute(move |tx| {
                Box::pin(async move {
                    with_connection!(tx, |conn| {
                        sqlx::query_as::<_, Policy>(SELECT_BY_RESOURCE_ACTION)
                            .bind(resource.as_str())
                            .bind(action.as_str())
                            .fetch_optional(&mut *conn)
                            .await
                            .map_err(DbError::from)
                    })
                })
            })
            .await
    }

    /// All policies ordered by id.
    pub async fn list_all(session: &mut Session) -> DbResult<Vec<Policy>> {
        session
            .execute(|tx| {
                Box::pin(async move {
                    with_connection!(tx, |conn| {
                        sqlx::query_as::<_, Policy>(SELECT_ALL)
                            .fetch_all(&mut *conn)
                            .await
                            .map_err(DbError::from)
                    })
                })
            })
            .await
    }

    /// Delete a policy and, by cascade, its role associations.
    /// Returns whether a row was removed.
    pub async fn delete(session: &mut Session, id: i64) -> DbResult<bool> {
        let removed = session
            .execute(move |tx| {
                Box::pin(async move {
                    with_connection!(tx, |conn| {
                        sqlx::query(DELETE)
                            .bind(id)
                            .execute(&mut *conn)
                            .await
                            .map(|result| result.rows_affected() > 0)
                            .map_err(DbError::from)
                    })
                })
            })
            .await?;
        debug!(policy_id = id, removed, "Policy delete");
        Ok(removed)
    }
}
