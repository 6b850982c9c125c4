use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;
use ts_rs::TS;
use utoipa::ToSchema;

use crate::{models::RoleRecord, repository::Repository};

/// Role
///
/// The closed set of roles a user can hold. The declaration order is the ordinal
/// order stored in the fixed role table (`admin=0`, `user=1`, `developer=2`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Role {
    Admin,
    User,
    Developer,
}

impl Role {
    /// Every role, in ordinal order.
    pub const ALL: [Role; 3] = [Role::Admin, Role::User, Role::Developer];

    /// Role given to self-registered accounts.
    pub const DEFAULT: Role = Role::User;

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
            Role::Developer => "developer",
        }
    }

    pub fn ordinal(self) -> usize {
        match self {
            Role::Admin => 0,
            Role::User => 1,
            Role::Developer => 2,
        }
    }

    pub fn from_ordinal(ordinal: usize) -> Result<Role, RoleError> {
        Role::ALL
            .get(ordinal)
            .copied()
            .ok_or(RoleError::NotFound(ordinal))
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = RoleError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == name)
            .ok_or_else(|| RoleError::UnknownName(name.to_string()))
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoleError {
    /// The ordinal does not index into the fixed role list, or the role table
    /// has not been seeded with the role at that ordinal.
    #[error("Role is not found (ordinal {0})")]
    NotFound(usize),
    #[error("unknown role name `{0}`")]
    UnknownName(String),
}

/// Database identifier of a row in the `roles` table.
pub type RoleId = i32;

/// resolve_role
///
/// Maps an ordinal to the id of the matching row in `table`. The table is passed
/// in explicitly (usually the result of `Repository::list_roles`) so resolution
/// stays a pure lookup.
pub fn resolve_role(ordinal: usize, table: &[RoleRecord]) -> Result<RoleId, RoleError> {
    let role = Role::from_ordinal(ordinal)?;
    table
        .iter()
        .find(|record| record.name == role.as_str())
        .map(|record| record.id)
        .ok_or(RoleError::NotFound(ordinal))
}

/// seed_roles
///
/// Inserts every role of `Role::ALL` that is not already present, looked up by
/// name. Running it any number of times leaves exactly one row per role.
/// Returns the number of rows inserted.
pub async fn seed_roles(repo: &dyn Repository) -> Result<usize, sqlx::Error> {
    let mut inserted = 0;
    for role in Role::ALL {
        if repo.find_role_by_name(role.as_str()).await?.is_none() {
            repo.insert_role(role.as_str()).await?;
            tracing::info!(role = %role, "seeded role");
            inserted += 1;
        }
    }
    Ok(inserted)
}
