//! Role, Policy and their join entity.
//!
//! A role groups policies; a policy names an action on a resource. The
//! many-to-many link lives in `associate_roles_policies` rows ([`RolePolicy`]).
//!
//! `Role::policies` is loaded eagerly by every read path and is read-only on
//! the detached value: changing a role's policies goes through the repository.

use super::require_text;
use crate::error::DbResult;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const POLICY_RESOURCE_MAX_CHARS: usize = 64;
pub const POLICY_ACTION_MAX_CHARS: usize = 16;

/// Actions a policy can grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyAction {
    Create,
    Update,
    Delete,
    Read,
}

impl PolicyAction {
    pub const ALL: [PolicyAction; 4] = [Self::Create, Self::Update, Self::Delete, Self::Read];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Read => "read",
        }
    }
}

impl std::fmt::Display for PolicyAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown policy action '{0}' (expected create, update, delete or read)")]
pub struct UnknownPolicyAction(pub String);

impl FromStr for PolicyAction {
    type Err = UnknownPolicyAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| UnknownPolicyAction(s.to_string()))
    }
}

impl TryFrom<String> for PolicyAction {
    type Error = UnknownPolicyAction;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A stored policy. `(resource, action)` is unique.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::FromRow)]
pub struct Policy {
    pub id: i64,
    pub resource: String,
    #[sqlx(try_from = "String")]
    pub action: PolicyAction,
}

/// Fields for inserting a policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPolicy {
    pub resource: String,
    pub action: PolicyAction,
}

impl NewPolicy {
    pub fn new(resource: impl Into<String>, action: PolicyAction) -> Self {
        Self {
            resource: resource.into(),
            action,
        }
    }

    pub fn validate(&self) -> DbResult<()> {
        require_text(
            "policy resource",
            &self.resource,
            Some(POLICY_RESOURCE_MAX_CHARS),
        )
    }
}

/// A stored role together with its fully loaded policies, ordered by policy id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Role {
    pub id: i64,
    pub name: String,
    #[sqlx(skip)]
    policies: Vec<Policy>,
}

impl Role {
    pub fn policies(&self) -> &[Policy] {
        &self.policies
    }

    pub fn has_policy(&self, resource: &str, action: PolicyAction) -> bool {
        self.policies
            .iter()
            .any(|p| p.resource == resource && p.action == action)
    }

    /// Attach the loaded policy set. Only the repository read path calls this.
    pub(crate) fn with_policies(mut self, mut policies: Vec<Policy>) -> Self {
        policies.sort_by_key(|p| p.id);
        self.policies = policies;
        self
    }
}

/// Fields for inserting a role, optionally with policies to attach.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRole {
    pub name: String,
    #[serde(default)]
    pub policy_ids: Vec<i64>,
}

impl NewRole {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            policy_ids: Vec::new(),
        }
    }

    pub fn with_policies(mut self, policy_ids: impl IntoIterator<Item = i64>) -> Self {
        self.policy_ids.extend(policy_ids);
        self
    }

    pub fn validate(&self) -> DbResult<()> {
        require_text("role name", &self.name, None)
    }
}

/// Join row linking a role to a policy. The pair is the primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::FromRow)]
pub struct RolePolicy {
    pub role_id: i64,
    pub policy_id: i64,
}
