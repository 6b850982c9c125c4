use axum::{
    Json,
    extract::{FromRequest, FromRequestParts, Multipart, Query, Request},
    http::{header, request::Parts},
};
use serde::de::DeserializeOwned;

use crate::{
    covers::CoverUpload,
    error::{AppError, ValidationErrors},
    models::ArticleJsonRequest,
};

/// ArticleForm
///
/// Raw create/update input. Accepts `multipart/form-data` (with an optional `cover`
/// file) or `application/json`. Fields are collected unvalidated; handlers validate
/// them only after the existence and ownership checks.
#[derive(Debug, Default)]
pub struct ArticleForm {
    pub title: Option<String>,
    pub content: Option<String>,
    pub cover: Option<CoverUpload>,
}

fn unreadable_body(reason: impl std::fmt::Display) -> AppError {
    tracing::debug!(%reason, "rejected request body");
    let mut errors = ValidationErrors::new();
    errors.add("body", "The request body could not be read.");
    AppError::Validation(errors)
}

impl<S> FromRequest<S> for ArticleForm
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if content_type.is_empty() {
            return Ok(ArticleForm::default());
        }

        if content_type.starts_with("multipart/form-data") {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(unreadable_body)?;
            return read_multipart(multipart).await;
        }

        if content_type.contains("json") {
            let Json(body) = Json::<ArticleJsonRequest>::from_request(req, state)
                .await
                .map_err(unreadable_body)?;
            return Ok(ArticleForm {
                title: body.title,
                content: body.content,
                cover: None,
            });
        }

        Err(unreadable_body(format!("unsupported content type `{content_type}`")))
    }
}

async fn read_multipart(mut multipart: Multipart) -> Result<ArticleForm, AppError> {
    let mut form = ArticleForm::default();

    while let Some(field) = multipart.next_field().await.map_err(unreadable_body)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "title" => form.title = Some(field.text().await.map_err(unreadable_body)?),
            "content" => form.content = Some(field.text().await.map_err(unreadable_body)?),
            "cover" => {
                let file_name = field.file_name().map(str::to_string);
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await.map_err(unreadable_body)?;
                // Browsers send an empty part when no file was picked.
                if !bytes.is_empty() {
                    form.cover = Some(CoverUpload {
                        file_name,
                        content_type,
                        bytes: bytes.to_vec(),
                    });
                }
            }
            _ => {}
        }
    }

    Ok(form)
}

/// JsonBody
///
/// `Json` whose rejections (wrong content type, malformed or mistyped JSON) are
/// answered with the regular 422 validation payload instead of axum's plain-text
/// responses.
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(unreadable_body)?;
        Ok(JsonBody(value))
    }
}

/// QueryParams
///
/// `Query` with the same treatment: an unparseable query string is a 422 on the
/// `query` field.
#[derive(Debug)]
pub struct QueryParams<T>(pub T);

impl<S, T> FromRequestParts<S> for QueryParams<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|reason| {
                tracing::debug!(%reason, "rejected query string");
                let mut errors = ValidationErrors::new();
                errors.add("query", "The query string could not be read.");
                AppError::Validation(errors)
            })?;
        Ok(QueryParams(value))
    }
}
