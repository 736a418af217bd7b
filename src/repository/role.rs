//! Role persistence and the role/policy association.
//!
//! Every role returned from here carries its complete policy set, ordered by
//! policy id. Detached roles never go back to storage on their own.

use crate::db::Session;
use crate::db::macros::with_connection;
use crate::error::{ConstraintKind, DbError, DbResult};
use crate::models::{NewRole, Policy, Role, RolePolicy};
use std::collections::{HashMap, HashSet};
use tracing::debug;

const INSERT: &str = "INSERT INTO roles (name) VALUES ($1) RETURNING id, name";
const SELECT_BY_ID: &str = "SELECT id, name FROM roles WHERE id = $1";
const SELECT_BY_NAME: &str = "SELECT id, name FROM roles WHERE name = $1";
const SELECT_ALL: &str = "SELECT id, name FROM roles ORDER BY id";
const SELECT_BY_POLICY: &str = "SELECT r.id, r.name FROM roles r \
     JOIN associate_roles_policies rp ON rp.role_id = r.id \
     WHERE rp.policy_id = $1 ORDER BY r.id";
const DELETE: &str = "DELETE FROM roles WHERE id = $1";

const INSERT_LINK: &str = "INSERT INTO associate_roles_policies (role_id, policy_id) \
     VALUES ($1, $2) RETURNING role_id, policy_id";
const DELETE_LINK: &str =
    "DELETE FROM associate_roles_policies WHERE role_id = $1 AND policy_id = $2";
const COUNT_PAIR: &str = "SELECT (SELECT COUNT(*) FROM roles WHERE id = $1), \
     (SELECT COUNT(*) FROM policies WHERE id = $2)";

const SELECT_ROLE_POLICIES: &str = "SELECT p.id, p.resource, p.action FROM policies p \
     JOIN associate_roles_policies rp ON rp.policy_id = p.id \
     WHERE rp.role_id = $1 ORDER BY p.id";
const SELECT_ALL_LINKS: &str = "SELECT rp.role_id, p.id, p.resource, p.action \
     FROM associate_roles_policies rp JOIN policies p ON p.id = rp.policy_id \
     ORDER BY rp.role_id, p.id";
const SELECT_LINKS_BY_POLICY: &str = "SELECT rp.role_id, p.id, p.resource, p.action \
     FROM associate_roles_policies rp JOIN policies p ON p.id = rp.policy_id \
     WHERE rp.role_id IN (SELECT role_id FROM associate_roles_policies WHERE policy_id = $1) \
     ORDER BY rp.role_id, p.id";

/// A policy together with the role it is attached to.
#[derive(Debug, sqlx::FromRow)]
struct PolicyLink {
    role_id: i64,
    #[sqlx(flatten)]
    policy: Policy,
}

/// Pair each role with its policies from a batch of links.
fn with_linked_policies(roles: Vec<Role>, links: Vec<PolicyLink>) -> Vec<Role> {
    let mut by_role: HashMap<i64, Vec<Policy>> = HashMap::new();
    for link in links {
        by_role.entry(link.role_id).or_default().push(link.policy);
    }
    roles
        .into_iter()
        .map(|role| {
            let policies = by_role.remove(&role.id).unwrap_or_default();
            role.with_policies(policies)
        })
        .collect()
}

/// Classify a failed association insert.
fn link_error(err: sqlx::Error, role_id: i64, policy_id: i64) -> DbError {
    match DbError::from(err) {
        e if e.is_unique_violation() => DbError::duplicate_association(role_id, policy_id),
        DbError::ConstraintViolation {
            kind: ConstraintKind::ForeignKey,
            ..
        } => DbError::not_found("role or policy", format!("role {role_id}, policy {policy_id}")),
        other => other,
    }
}

enum RoleKey {
    Id(i64),
    Name(String),
}

pub struct RoleRepository;

impl RoleRepository {
    /// Insert a role and attach `policy_ids` to it. Repeated ids are attached
    /// once; an unknown id fails with `NotFound`.
    pub async fn create(session: &mut Session, role: NewRole) -> DbResult<Role> {
        role.validate()?;
        let NewRole {
            name,
            mut policy_ids,
        } = role;
        let mut seen = HashSet::new();
        policy_ids.retain(|id| seen.insert(*id));

        let created = session
            .execute(move |tx| {
                Box::pin(async move {
                    with_connection!(tx, |conn| {
                        let role = sqlx::query_as::<_, Role>(INSERT)
                            .bind(name.as_str())
                            .fetch_one(&mut *conn)
                            .await?;
                        for &policy_id in &policy_ids {
                            sqlx::query(INSERT_LINK)
                                .bind(role.id)
                                .bind(policy_id)
                                .execute(&mut *conn)
                                .await
                                .map_err(|e| match link_error(e, role.id, policy_id) {
                                    DbError::NotFound { .. } => {
                                        DbError::not_found("policy", policy_id.to_string())
                                    }
                                    other => other,
                                })?;
                        }
                        let policies = sqlx::query_as::<_, Policy>(SELECT_ROLE_POLICIES)
                            .bind(role.id)
                            .fetch_all(&mut *conn)
                            .await?;
                        Ok::<_, DbError>(role.with_policies(policies))
                    })
                })
            })
            .await?;
        debug!(
            role_id = created.id,
            policies = created.policies().len(),
            "Role created"
        );
        Ok(created)
    }

    pub async fn get_by_id(session: &mut Session, id: i64) -> DbResult<Option<Role>> {
        Self::find(session, RoleKey::Id(id)).await
    }

    pub async fn get_by_name(session: &mut Session, name: &str) -> DbResult<Option<Role>> {
        Self::find(session, RoleKey::Name(name.to_string())).await
    }

    async fn find(session: &mut Session, key: RoleKey) -> DbResult<Option<Role>> {
        session
            .execute(move |tx| {
                Box::pin(async move {
                    with_connection!(tx, |conn| {
                        let query = match &key {
                            RoleKey::Id(id) => sqlx::query_as::<_, Role>(SELECT_BY_ID).bind(*id),
                            RoleKey::Name(name) => {
                                sqlx::query_as::<_, Role>(SELECT_BY_NAME).bind(name.as_str())
                            }
                        };
                        match query.fetch_optional(&mut *conn).await? {
                            Some(role) => {
                                let policies = sqlx::query_as::<_, Policy>(SELECT_ROLE_POLICIES)
                                    .bind(role.id)
                                    .fetch_all(&mut *conn)
                                    .await?;
                                Ok::<_, DbError>(Some(role.with_policies(policies)))
                            }
                            None => Ok(None),
                        }
                    })
                })
            })
            .await
    }

    /// All roles ordered by id, policies loaded with one follow-up query.
    pub async fn list_all(session: &mut Session) -> DbResult<Vec<Role>> {
        session
            .execute(|tx| {
                Box::pin(async move {
                    with_connection!(tx, |conn| {
                        let roles = sqlx::query_as::<_, Role>(SELECT_ALL)
                            .fetch_all(&mut *conn)
                            .await?;
                        let links = sqlx::query_as::<_, PolicyLink>(SELECT_ALL_LINKS)
                            .fetch_all(&mut *conn)
                            .await?;
                        Ok::<_, DbError>(with_linked_policies(roles, links))
                    })
                })
            })
            .await
    }

    /// Roles that hold `policy_id`, ordered by id.
    pub async fn list_by_policy(session: &mut Session, policy_id: i64) -> DbResult<Vec<Role>> {
        session
            .execute(move |tx| {
                Box::pin(async move {
                    with_connection!(tx, |conn| {
                        let roles = sqlx::query_as::<_, Role>(SELECT_BY_POLICY)
                            .bind(policy_id)
                            .fetch_all(&mut *conn)
                            .await?;
                        let links = sqlx::query_as::<_, PolicyLink>(SELECT_LINKS_BY_POLICY)
                            .bind(policy_id)
                            .fetch_all(&mut *conn)
                            .await?;
                        Ok::<_, DbError>(with_linked_policies(roles, links))
                    })
                })
            })
            .await
    }

    /// Attach a policy to a role.
    ///
    /// Fails with `DuplicateAssociation` if the pair already exists and with
    /// `NotFound` if either side does not.
    pub async fn attach_policy(
        session: &mut Session,
        role_id: i64,
        policy_id: i64,
    ) -> DbResult<RolePolicy> {
        let link = session
            .execute(move |tx| {
                Box::pin(async move {
                    with_connection!(tx, |conn| {
                        let (roles, policies) = sqlx::query_as::<_, (i64, i64)>(COUNT_PAIR)
                            .bind(role_id)
                            .bind(policy_id)
                            .fetch_one(&mut *conn)
                            .await?;
                        if roles == 0 {
                            return Err(DbError::not_found("role", role_id.to_string()));
                        }
                        if policies == 0 {
                            return Err(DbError::not_found("policy", policy_id.to_string()));
                        }
                        sqlx::query_as::<_, RolePolicy>(INSERT_LINK)
                            .bind(role_id)
                            .bind(policy_id)
                            .fetch_one(&mut *conn)
                            .await
                            .map_err(|e| link_error(e, role_id, policy_id))
                    })
                })
            })
            .await?;
        debug!(role_id, policy_id, "Policy attached");
        Ok(link)
    }

    /// Remove a policy from a role. Returns whether the pair existed.
    pub async fn detach_policy(
        session: &mut Session,
        role_id: i64,
        policy_id: i64,
    ) -> DbResult<bool> {
        session
            .execute(move |tx| {
                Box::pin(async move {
                    with_connection!(tx, |conn| {
                        sqlx::query(DELETE_LINK)
                            .bind(role_id)
                            .bind(policy_id)
                            .execute(&mut *conn)
                            .await
                            .map(|result| result.rows_affected() > 0)
                            .map_err(DbError::from)
                    })
                })
            })
            .await
    }

    /// Delete a role and, by cascade, its associations.
    pub async fn delete(session: &mut Session, id: i64) -> DbResult<bool> {
        session
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
            .await
    }
}
