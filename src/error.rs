use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;
use utoipa::ToSchema;

use crate::{roles::RoleError, storage::StorageError};

/// Top-level message attached to every 422 validation payload.
pub const VALIDATION_MESSAGE: &str = "Periksa kembali data yang dimasukkan";
pub const ARTICLE_NOT_FOUND: &str = "Artikel tidak ditemukan";

/// ValidationErrors
///
/// Field name -> failing rule messages, in the order the rules were checked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    /// Ok when no rule failed, otherwise the collected errors as `AppError`.
    pub fn into_result(self) -> Result<(), AppError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(self))
        }
    }
}

/// AppError
///
/// Every failure a request can end in. `IntoResponse` maps each variant to its
/// status code and a JSON body with a top-level `message`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed")]
    Validation(ValidationErrors),
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("unauthenticated")]
    Unauthenticated,
    #[error("forbidden")]
    Forbidden,
    #[error("not found: {0}")]
    NotFound(&'static str),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Role(#[from] RoleError),
    #[error("internal error: {0}")]
    Internal(String),
}

/// ErrorBody
///
/// Wire shape of error responses. `errors` is only present for validation failures.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Object)]
    pub errors: Option<ValidationErrors>,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::InvalidCredentials => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Storage(_)
            | AppError::Database(_)
            | AppError::Role(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            AppError::Validation(errors) => ErrorBody {
                message: VALIDATION_MESSAGE.to_string(),
                errors: Some(errors),
            },
            AppError::InvalidCredentials => message("Unauthorized"),
            AppError::Unauthenticated => message("Unauthenticated."),
            AppError::Forbidden => message("This action is unauthorized."),
            AppError::NotFound(what) => message(what),
            other => {
                // Server-side failures are logged in full; the client only sees a generic message.
                tracing::error!(error = %other, "request failed");
                message("Server Error")
            }
        };
        (status, Json(body)).into_response()
    }
}

fn message(text: &str) -> ErrorBody {
    ErrorBody {
        message: text.to_string(),
        errors: None,
    }
}
