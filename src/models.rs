use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::roles::Role;

// --- Core Records (Mapped to Database) ---

/// RoleRecord
///
/// A row of the `roles` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct RoleRecord {
    pub id: i32,
    pub name: String,
}

/// User
///
/// An account from the `users` table joined with its role. The password hash never
/// leaves the server: it is skipped on serialization.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub email_verified_at: Option<DateTime<Utc>>,
    pub profile_pic_path: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// NewUser
///
/// Insert payload for `users`. The role is already resolved to its row id.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role_id: i32,
}

/// AccessToken
///
/// A persisted bearer token. The signed JWT carries `id` as its `jti`; deleting the
/// row revokes the token.
#[derive(Debug, Clone, FromRow)]
pub struct AccessToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Article
///
/// A row of `articles` joined with the owner's display name (`author`).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, Default)]
pub struct Article {
    pub id: Uuid,
    // FK to users.id (owner).
    pub user_id: Uuid,
    pub author: String,
    pub title: String,
    pub content: String,
    // Storage key of the cover image, if one was uploaded.
    pub cover_path: Option<String>,
    // Incremented on every successful single-article read.
    pub views: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// NewArticle
#[derive(Debug, Clone)]
pub struct NewArticle {
    pub title: String,
    pub content: String,
}

/// ArticleChanges
///
/// Partial update: only `Some` fields are written.
#[derive(Debug, Clone, Default)]
pub struct ArticleChanges {
    pub title: Option<String>,
    pub content: Option<String>,
}

// --- Request Payloads (Input Schemas) ---

/// RegisterRequest
///
/// Missing fields deserialize as empty strings so they are reported by validation
/// ("The name field is required.") rather than rejected by the JSON extractor.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RegisterRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// ArticleJsonRequest
///
/// JSON body accepted by create/update when no cover file is sent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ArticleJsonRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

/// ArticleUploadForm
///
/// Documentation shape of the multipart body of create/update.
#[derive(Debug, ToSchema)]
pub struct ArticleUploadForm {
    pub title: String,
    pub content: String,
    #[schema(format = Binary)]
    pub cover: Option<String>,
}

// --- Response Schemas (Output) ---

/// UserProfile
///
/// Public view of an account.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub profile_pic_url: String,
}

/// RegisterResponse
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RegisterResponse {
    pub user: UserProfile,
    pub access_token: String,
    pub token_type: String,
}

/// AuthUserResponse
///
/// Login payload, in the camelCase shape the frontend consumes.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AuthUserResponse {
    pub name: String,
    pub role: Role,
    pub email: String,
    pub profile_pic_url: String,
    pub access_token: String,
}

/// ArticleResponse
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ArticleResponse {
    pub id: Uuid,
    pub title: String,
    pub cover_url: String,
    pub content: String,
    // Display name of the owner.
    pub author: String,
    pub views: i64,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// PageMeta
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct PageMeta {
    pub current_page: u32,
    pub per_page: u32,
    pub total: i64,
    pub last_page: u32,
}

/// ArticlePage
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ArticlePage {
    pub data: Vec<ArticleResponse>,
    pub meta: PageMeta,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
