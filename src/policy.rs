use uuid::Uuid;

use crate::{auth::Principal, error::AppError, error::ARTICLE_NOT_FOUND, roles::Role};

/// Operation
///
/// What a principal wants to do with an existing article.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Update,
    Delete,
}

/// Denial
///
/// Why a request was refused. `NotFound` is also used for reads the principal may
/// not see, so the article's existence is not disclosed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    NotFound,
    Forbidden,
}

impl From<Denial> for AppError {
    fn from(denial: Denial) -> Self {
        match denial {
            Denial::NotFound => AppError::NotFound(ARTICLE_NOT_FOUND),
            Denial::Forbidden => AppError::Forbidden,
        }
    }
}

/// ArticleScope
///
/// Which articles a listing may return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArticleScope {
    All,
    OwnedBy(Uuid),
}

/// Developers act on every article regardless of ownership.
fn sees_everything(role: Role) -> bool {
    match role {
        Role::Developer => true,
        Role::Admin | Role::User => false,
    }
}

/// authorize
///
/// Decides whether `principal` may perform `op` on an article owned by `owner_id`.
/// `owner_id` is `None` when no such article exists.
pub fn authorize(
    principal: &Principal,
    owner_id: Option<Uuid>,
    op: Operation,
) -> Result<(), Denial> {
    let Some(owner_id) = owner_id else {
        return Err(Denial::NotFound);
    };
    if owner_id == principal.id || sees_everything(principal.role) {
        return Ok(());
    }
    match op {
        Operation::Read => Err(Denial::NotFound),
        Operation::Update | Operation::Delete => Err(Denial::Forbidden),
    }
}

/// can_create
///
/// Publishing is reserved to admins and developers.
pub fn can_create(role: Role) -> bool {
    match role {
        Role::Admin | Role::Developer => true,
        Role::User => false,
    }
}

/// list_scope
///
/// Developers list all articles; everyone else lists only their own.
pub fn list_scope(principal: &Principal) -> ArticleScope {
    if sees_everything(principal.role) {
        ArticleScope::All
    } else {
        ArticleScope::OwnedBy(principal.id)
    }
}
