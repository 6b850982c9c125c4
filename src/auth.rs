use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    error::AppError,
    models::{AccessToken, User},
    repository::{Repository, RepositoryState},
    roles::Role,
};

/// Name recorded on every token issued by register/login.
pub const TOKEN_NAME: &str = "auth_token";
pub const TOKEN_TYPE: &str = "Bearer";

/// Claims
///
/// Payload of an issued bearer token.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user id.
    pub sub: Uuid,
    /// Token id, the primary key of the `access_tokens` row. Deleting the row revokes the token.
    pub jti: Uuid,
    pub exp: usize,
    pub iat: usize,
}

/// Principal
///
/// The authenticated actor of a request. Produced by the extractor below and passed
/// explicitly into every authorization decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: Uuid,
    pub role: Role,
    /// The token this request was authenticated with.
    pub token_id: Uuid,
}

/// Principal Extractor
///
/// 1. Reads `Authorization: Bearer <token>`.
/// 2. Verifies the JWT signature and expiry against `AppConfig::jwt_secret`.
/// 3. Checks that the token has not been revoked.
/// 4. Loads the user so the role is always the current one.
///
/// Rejection: `AppError::Unauthenticated` (401) on any failure.
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(AppError::Unauthenticated)?;

        let claims = decode_token(token, &config.jwt_secret)?;

        if !repo.token_is_active(claims.jti, claims.sub).await? {
            tracing::debug!(token_id = %claims.jti, "rejected revoked or expired token");
            return Err(AppError::Unauthenticated);
        }

        let user = repo
            .find_user(claims.sub)
            .await?
            .ok_or(AppError::Unauthenticated)?;

        Ok(Principal {
            id: user.id,
            role: user.role,
            token_id: claims.jti,
        })
    }
}

/// decode_token
///
/// Validates signature and `exp`. Every failure kind maps to `Unauthenticated`.
pub fn decode_token(token: &str, secret: &str) -> Result<Claims, AppError> {
    let mut validation = Validation::default();
    validation.validate_exp = true;

    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
        .map_err(|e| {
            tracing::debug!(error = %e, "bearer token rejected");
            AppError::Unauthenticated
        })
}

/// issue_token
///
/// Persists a new `access_tokens` row for `user` and returns the signed JWT.
pub async fn issue_token(
    repo: &dyn Repository,
    config: &AppConfig,
    user: &User,
) -> Result<String, AppError> {
    let now = Utc::now();
    let record = AccessToken {
        id: Uuid::new_v4(),
        user_id: user.id,
        name: TOKEN_NAME.to_string(),
        created_at: now,
        expires_at: now + Duration::minutes(config.token_ttl_minutes),
    };

    let claims = Claims {
        sub: user.id,
        jti: record.id,
        iat: now.timestamp().max(0) as usize,
        exp: record.expires_at.timestamp().max(0) as usize,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("token signing failed: {e}")))?;

    repo.store_token(&record).await?;
    tracing::info!(user_id = %user.id, token_id = %record.id, "access token issued");
    Ok(token)
}

/// revoke_all_tokens
///
/// Logs the user out everywhere.
pub async fn revoke_all_tokens(repo: &dyn Repository, user_id: Uuid) -> Result<u64, AppError> {
    let revoked = repo.revoke_tokens(user_id).await?;
    tracing::info!(user_id = %user_id, revoked, "access tokens revoked");
    Ok(revoked)
}

pub fn hash_password(password: &str, cost: u32) -> Result<String, AppError> {
    bcrypt::hash(password, cost).map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))
}

/// verify_credentials
///
/// Returns the user when `password` matches. Unknown email and wrong password are
/// both reported as `InvalidCredentials`.
pub async fn verify_credentials(
    repo: &dyn Repository,
    email: &str,
    password: &str,
) -> Result<User, AppError> {
    let Some(user) = repo.find_user_by_email(email).await? else {
        return Err(AppError::InvalidCredentials);
    };
    match bcrypt::verify(password, &user.password_hash) {
        Ok(true) => Ok(user),
        Ok(false) => Err(AppError::InvalidCredentials),
        Err(e) => {
            tracing::warn!(user_id = %user.id, error = %e, "stored password hash is unreadable");
            Err(AppError::InvalidCredentials)
        }
    }
}
