use crate::{
    AppState,
    auth::{self, Principal, TOKEN_TYPE},
    covers::{self, CoverPhotoManager},
    error::{ARTICLE_NOT_FOUND, AppError, ErrorBody, ValidationErrors},
    forms::{ArticleForm, JsonBody, QueryParams},
    models::{
        Article, ArticleChanges, ArticlePage, ArticleResponse, ArticleUploadForm,
        AuthUserResponse, LoginRequest, MessageResponse, NewArticle, NewUser, PageMeta,
        RegisterRequest, RegisterResponse, User, UserProfile,
    },
    policy::{self, Operation},
    repository::Page,
    roles::{Role, resolve_role},
    storage::StorageService,
    validation,
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;
use uuid::Uuid;

// --- Query Structs ---

/// ArticleListQuery
///
/// Pagination parameters of `GET /articles`.
#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct ArticleListQuery {
    /// 1-based page number (default 1).
    pub page: Option<u32>,
    /// Page size (default from configuration, at most 100).
    #[serde(rename = "perPage")]
    pub per_page: Option<u32>,
}

// --- Response Builders ---

fn article_response(storage: &dyn StorageService, article: Article) -> ArticleResponse {
    ArticleResponse {
        cover_url: covers::cover_url(storage, &article),
        id: article.id,
        title: article.title,
        content: article.content,
        author: article.author,
        views: article.views,
        created_at: article.created_at,
        updated_at: article.updated_at,
    }
}

/// Stored profile picture URL, or the avatar placeholder built from the user's name.
fn profile_pic_url(storage: &dyn StorageService, user: &User) -> String {
    match user.profile_pic_path.as_deref() {
        Some(path) => storage.public_url(path),
        None => covers::placeholder_url(&user.name),
    }
}

fn user_profile(storage: &dyn StorageService, user: &User) -> UserProfile {
    UserProfile {
        id: user.id,
        name: user.name.clone(),
        email: user.email.clone(),
        role: user.role,
        profile_pic_url: profile_pic_url(storage, user),
    }
}

/// Unparseable ids name no article, so they are reported like missing ones.
fn parse_article_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::NotFound(ARTICLE_NOT_FOUND))
}

fn email_taken() -> AppError {
    let mut errors = ValidationErrors::new();
    errors.add("email", "The email has already been taken.");
    AppError::Validation(errors)
}

// --- Auth Handlers ---

/// register_user
///
/// [Public Route] Creates an account with the default `user` role and returns an
/// access token for it.
#[utoipa::path(
    post,
    path = "/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Registered", body = RegisterResponse),
        (status = 422, description = "Validation failed", body = ErrorBody)
    )
)]
pub async fn register_user(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), AppError> {
    let mut errors =
        validation::validate_registration(&payload.name, &payload.email, &payload.password);
    if errors.get("email").is_none()
        && state.repo.find_user_by_email(&payload.email).await?.is_some()
    {
        errors.add("email", "The email has already been taken.");
    }
    errors.into_result()?;

    let roles = state.repo.list_roles().await?;
    let role_id = resolve_role(Role::DEFAULT.ordinal(), &roles)?;
    let password_hash = auth::hash_password(&payload.password, state.config.bcrypt_cost)?;

    let user = state
        .repo
        .create_user(NewUser {
            name: payload.name,
            email: payload.email,
            password_hash,
            role_id,
        })
        .await
        .map_err(|e| match e {
            // Lost a race with a concurrent registration for the same email.
            sqlx::Error::Database(db) if db.is_unique_violation() => email_taken(),
            other => other.into(),
        })?;
    tracing::info!(user_id = %user.id, role = %user.role, "user registered");

    let access_token = auth::issue_token(state.repo.as_ref(), &state.config, &user).await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user: user_profile(state.storage.as_ref(), &user),
            access_token,
            token_type: TOKEN_TYPE.to_string(),
        }),
    ))
}

/// login
///
/// [Public Route] Exchanges valid credentials for an access token. Unknown email and
/// wrong password produce the same response.
#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = AuthUserResponse),
        (status = 422, description = "Bad credentials", body = ErrorBody)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<LoginRequest>,
) -> Result<Json<AuthUserResponse>, AppError> {
    validation::validate_login(&payload.email, &payload.password).into_result()?;

    let user =
        auth::verify_credentials(state.repo.as_ref(), &payload.email, &payload.password).await?;
    let access_token = auth::issue_token(state.repo.as_ref(), &state.config, &user).await?;

    Ok(Json(AuthUserResponse {
        profile_pic_url: profile_pic_url(state.storage.as_ref(), &user),
        name: user.name,
        role: user.role,
        email: user.email,
        access_token,
    }))
}

/// logout
///
/// [Authenticated Route] Revokes every token of the caller.
#[utoipa::path(
    post,
    path = "/logout",
    responses(
        (status = 200, description = "Logged out", body = MessageResponse),
        (status = 401, description = "Unauthenticated", body = ErrorBody)
    )
)]
pub async fn logout(
    principal: Principal,
    State(state): State<AppState>,
) -> Result<Json<MessageResponse>, AppError> {
    let revoked = auth::revoke_all_tokens(state.repo.as_ref(), principal.id).await?;
    tracing::info!(user_id = %principal.id, token_id = %principal.token_id, revoked, "user logged out");
    Ok(Json(MessageResponse::new("You have successfully logged out")))
}

/// current_user
///
/// [Authenticated Route] The caller's profile.
#[utoipa::path(
    get,
    path = "/user",
    responses(
        (status = 200, description = "Profile", body = UserProfile),
        (status = 401, description = "Unauthenticated", body = ErrorBody)
    )
)]
pub async fn current_user(
    principal: Principal,
    State(state): State<AppState>,
) -> Result<Json<UserProfile>, AppError> {
    let user = state
        .repo
        .find_user(principal.id)
        .await?
        .ok_or(AppError::Unauthenticated)?;
    Ok(Json(user_profile(state.storage.as_ref(), &user)))
}

// --- Article Handlers ---

/// list_articles
///
/// [Authenticated Route] One page of the articles the caller may see: all of them
/// for developers, only their own for everyone else.
#[utoipa::path(
    get,
    path = "/articles",
    params(ArticleListQuery),
    responses(
        (status = 200, description = "Articles", body = ArticlePage),
        (status = 401, description = "Unauthenticated", body = ErrorBody)
    )
)]
pub async fn list_articles(
    principal: Principal,
    State(state): State<AppState>,
    QueryParams(query): QueryParams<ArticleListQuery>,
) -> Result<Json<ArticlePage>, AppError> {
    let page = Page::new(query.page, query.per_page, state.config.default_per_page);
    let scope = policy::list_scope(&principal);
    let (articles, total) = state.repo.list_articles(scope, page).await?;

    let data = articles
        .into_iter()
        .map(|article| article_response(state.storage.as_ref(), article))
        .collect();

    Ok(Json(ArticlePage {
        data,
        meta: PageMeta {
            current_page: page.page,
            per_page: page.per_page,
            total,
            last_page: page.last_page(total),
        },
    }))
}

/// get_article
///
/// [Authenticated Route] A single article. Each successful read adds one view before
/// the response is built. Articles the caller may not see answer 404.
#[utoipa::path(
    get,
    path = "/articles/{id}",
    params(("id" = Uuid, Path, description = "Article ID")),
    responses(
        (status = 200, description = "Found", body = ArticleResponse),
        (status = 401, description = "Unauthenticated", body = ErrorBody),
        (status = 404, description = "Not found or not visible", body = ErrorBody)
    )
)]
pub async fn get_article(
    principal: Principal,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ArticleResponse>, AppError> {
    let id = parse_article_id(&id)?;
    let article = state.repo.find_article(id).await?;
    policy::authorize(&principal, article.map(|a| a.user_id), Operation::Read)?;

    let viewed = state
        .repo
        .increment_views(id)
        .await?
        .ok_or(AppError::NotFound(ARTICLE_NOT_FOUND))?;

    Ok(Json(article_response(state.storage.as_ref(), viewed)))
}

/// create_article
///
/// [Authenticated Route] Publishes an article owned by the caller. Reserved to the
/// admin and developer roles. If the cover cannot be stored the article is removed
/// again.
#[utoipa::path(
    post,
    path = "/articles",
    request_body(content = ArticleUploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Created", body = ArticleResponse),
        (status = 401, description = "Unauthenticated", body = ErrorBody),
        (status = 403, description = "Role may not publish", body = ErrorBody),
        (status = 422, description = "Validation failed", body = ErrorBody)
    )
)]
pub async fn create_article(
    principal: Principal,
    State(state): State<AppState>,
    form: ArticleForm,
) -> Result<(StatusCode, Json<ArticleResponse>), AppError> {
    if !policy::can_create(principal.role) {
        return Err(AppError::Forbidden);
    }
    validation::validate_new_article(
        form.title.as_deref(),
        form.content.as_deref(),
        form.cover.as_ref(),
    )
    .into_result()?;

    let article = state
        .repo
        .create_article(
            principal.id,
            NewArticle {
                title: form.title.unwrap_or_default(),
                content: form.content.unwrap_or_default(),
            },
        )
        .await?;
    tracing::info!(article_id = %article.id, user_id = %principal.id, "article created");

    let article = match form.cover {
        Some(cover) => {
            let manager = CoverPhotoManager::new(state.repo.as_ref(), state.storage.as_ref());
            if let Err(e) = manager.update(&article, cover).await {
                if let Err(cleanup) = state.repo.delete_article(article.id).await {
                    tracing::error!(article_id = %article.id, error = %cleanup, "failed to roll back article without cover");
                }
                return Err(e);
            }
            state
                .repo
                .find_article(article.id)
                .await?
                .ok_or(AppError::NotFound(ARTICLE_NOT_FOUND))?
        }
        None => article,
    };

    Ok((
        StatusCode::CREATED,
        Json(article_response(state.storage.as_ref(), article)),
    ))
}

/// update_article
///
/// [Authenticated Route] Changes title, content and/or cover. Owner or developer only.
#[utoipa::path(
    put,
    path = "/articles/{id}",
    params(("id" = Uuid, Path, description = "Article ID")),
    request_body(content = ArticleUploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Updated", body = ArticleResponse),
        (status = 401, description = "Unauthenticated", body = ErrorBody),
        (status = 403, description = "Not owner", body = ErrorBody),
        (status = 404, description = "Not found", body = ErrorBody),
        (status = 422, description = "Validation failed", body = ErrorBody)
    )
)]
pub async fn update_article(
    principal: Principal,
    State(state): State<AppState>,
    Path(id): Path<String>,
    form: ArticleForm,
) -> Result<Json<ArticleResponse>, AppError> {
    let id = parse_article_id(&id)?;
    let existing = state.repo.find_article(id).await?;
    policy::authorize(&principal, existing.as_ref().map(|a| a.user_id), Operation::Update)?;
    let mut article = existing.ok_or(AppError::NotFound(ARTICLE_NOT_FOUND))?;

    validation::validate_article_changes(
        form.title.as_deref(),
        form.content.as_deref(),
        form.cover.as_ref(),
    )
    .into_result()?;

    // The cover goes first: if it cannot be stored, nothing about the article changes.
    if let Some(cover) = form.cover {
        CoverPhotoManager::new(state.repo.as_ref(), state.storage.as_ref())
            .update(&article, cover)
            .await?;
        article = state
            .repo
            .find_article(id)
            .await?
            .ok_or(AppError::NotFound(ARTICLE_NOT_FOUND))?;
    }

    if form.title.is_some() || form.content.is_some() {
        article = state
            .repo
            .update_article(
                id,
                ArticleChanges {
                    title: form.title,
                    content: form.content,
                },
            )
            .await?
            .ok_or(AppError::NotFound(ARTICLE_NOT_FOUND))?;
    }
    tracing::info!(article_id = %id, user_id = %principal.id, "article updated");

    Ok(Json(article_response(state.storage.as_ref(), article)))
}

/// delete_article
///
/// [Authenticated Route] Removes the article and its cover. Owner or developer only.
#[utoipa::path(
    delete,
    path = "/articles/{id}",
    params(("id" = Uuid, Path, description = "Article ID")),
    responses(
        (status = 200, description = "Deleted", body = MessageResponse),
        (status = 401, description = "Unauthenticated", body = ErrorBody),
        (status = 403, description = "Not owner", body = ErrorBody),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn delete_article(
    principal: Principal,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    let id = parse_article_id(&id)?;
    let existing = state.repo.find_article(id).await?;
    policy::authorize(&principal, existing.as_ref().map(|a| a.user_id), Operation::Delete)?;
    let article = existing.ok_or(AppError::NotFound(ARTICLE_NOT_FOUND))?;

    CoverPhotoManager::new(state.repo.as_ref(), state.storage.as_ref())
        .delete(&article)
        .await?;
    if !state.repo.delete_article(id).await? {
        return Err(AppError::NotFound(ARTICLE_NOT_FOUND));
    }
    tracing::info!(article_id = %id, user_id = %principal.id, "article deleted");

    Ok(Json(MessageResponse::new("Artikel berhasil dihapus")))
}
