#![allow(dead_code)]

use article_portal::{
    AppConfig, AppState, create_router,
    auth,
    models::{AccessToken, Article, ArticleChanges, NewArticle, NewUser, RoleRecord, User},
    policy::ArticleScope,
    repository::{Page, Repository},
    roles::{Role, resolve_role},
    storage::MockStorageService,
};
use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use tower::util::ServiceExt;
use uuid::Uuid;

// --- IN-MEMORY REPOSITORY ---

struct StoredUser {
    id: Uuid,
    name: String,
    email: String,
    password_hash: String,
    profile_pic_path: Option<String>,
    role_id: i32,
    created_at: DateTime<Utc>,
}

#[derive(Clone)]
struct StoredArticle {
    id: Uuid,
    user_id: Uuid,
    title: String,
    content: String,
    cover_path: Option<String>,
    views: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Default)]
struct State {
    roles: Vec<RoleRecord>,
    users: Vec<StoredUser>,
    tokens: Vec<AccessToken>,
    // Insertion order; listings walk it backwards (newest first).
    articles: Vec<StoredArticle>,
}

/// Repository double with the same observable behaviour as the Postgres one.
#[derive(Default)]
pub struct InMemoryRepository {
    state: Mutex<State>,
    /// Makes `set_cover_path` fail, to exercise storage rollbacks.
    pub fail_cover_writes: bool,
}

impl InMemoryRepository {
    /// Repository with the three roles already seeded.
    pub fn seeded() -> Self {
        let repo = Self::default();
        {
            let mut state = repo.lock();
            for (index, role) in Role::ALL.iter().enumerate() {
                state.roles.push(RoleRecord {
                    id: index as i32 + 1,
                    name: role.as_str().to_string(),
                });
            }
        }
        repo
    }

    pub fn failing_cover_writes() -> Self {
        Self {
            fail_cover_writes: true,
            ..Self::seeded()
        }
    }

    pub fn role_count(&self) -> usize {
        self.lock().roles.len()
    }

    pub fn article_count(&self) -> usize {
        self.lock().articles.len()
    }

    pub fn token_count(&self, user_id: Uuid) -> usize {
        self.lock()
            .tokens
            .iter()
            .filter(|t| t.user_id == user_id)
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }
}

impl State {
    fn user(&self, stored: &StoredUser) -> Result<User, sqlx::Error> {
        let role_name = self
            .roles
            .iter()
            .find(|r| r.id == stored.role_id)
            .map(|r| r.name.clone())
            .ok_or(sqlx::Error::RowNotFound)?;
        let role = role_name
            .parse::<Role>()
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        Ok(User {
            id: stored.id,
            name: stored.name.clone(),
            email: stored.email.clone(),
            password_hash: stored.password_hash.clone(),
            email_verified_at: None,
            profile_pic_path: stored.profile_pic_path.clone(),
            role,
            created_at: stored.created_at,
            updated_at: stored.created_at,
        })
    }

    fn article(&self, stored: &StoredArticle) -> Article {
        let author = self
            .users
            .iter()
            .find(|u| u.id == stored.user_id)
            .map(|u| u.name.clone())
            .unwrap_or_default();
        Article {
            id: stored.id,
            user_id: stored.user_id,
            author,
            title: stored.title.clone(),
            content: stored.content.clone(),
            cover_path: stored.cover_path.clone(),
            views: stored.views,
            created_at: stored.created_at,
            updated_at: stored.updated_at,
        }
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn list_roles(&self) -> Result<Vec<RoleRecord>, sqlx::Error> {
        Ok(self.lock().roles.clone())
    }

    async fn find_role_by_name(&self, name: &str) -> Result<Option<RoleRecord>, sqlx::Error> {
        Ok(self.lock().roles.iter().find(|r| r.name == name).cloned())
    }

    async fn insert_role(&self, name: &str) -> Result<RoleRecord, sqlx::Error> {
        let mut state = self.lock();
        let record = RoleRecord {
            id: state.roles.len() as i32 + 1,
            name: name.to_string(),
        };
        state.roles.push(record.clone());
        Ok(record)
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, sqlx::Error> {
        let state = self.lock();
        state
            .users
            .iter()
            .find(|u| u.id == id)
            .map(|u| state.user(u))
            .transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        let state = self.lock();
        state
            .users
            .iter()
            .find(|u| u.email == email)
            .map(|u| state.user(u))
            .transpose()
    }

    async fn create_user(&self, user: NewUser) -> Result<User, sqlx::Error> {
        let mut state = self.lock();
        let stored = StoredUser {
            id: Uuid::new_v4(),
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            profile_pic_path: None,
            role_id: user.role_id,
            created_at: Utc::now(),
        };
        let created = state.user(&stored)?;
        state.users.push(stored);
        Ok(created)
    }

    async fn store_token(&self, token: &AccessToken) -> Result<(), sqlx::Error> {
        self.lock().tokens.push(token.clone());
        Ok(())
    }

    async fn token_is_active(&self, token_id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let now = Utc::now();
        Ok(self
            .lock()
            .tokens
            .iter()
            .any(|t| t.id == token_id && t.user_id == user_id && t.expires_at > now))
    }

    async fn revoke_tokens(&self, user_id: Uuid) -> Result<u64, sqlx::Error> {
        let mut state = self.lock();
        let before = state.tokens.len();
        state.tokens.retain(|t| t.user_id != user_id);
        Ok((before - state.tokens.len()) as u64)
    }

    async fn list_articles(
        &self,
        scope: ArticleScope,
        page: Page,
    ) -> Result<(Vec<Article>, i64), sqlx::Error> {
        let state = self.lock();
        let visible: Vec<&StoredArticle> = state
            .articles
            .iter()
            .rev()
            .filter(|a| match scope {
                ArticleScope::All => true,
                ArticleScope::OwnedBy(owner) => a.user_id == owner,
            })
            .collect();
        let total = visible.len() as i64;
        let items = visible
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.per_page as usize)
            .map(|a| state.article(a))
            .collect();
        Ok((items, total))
    }

    async fn find_article(&self, id: Uuid) -> Result<Option<Article>, sqlx::Error> {
        let state = self.lock();
        Ok(state
            .articles
            .iter()
            .find(|a| a.id == id)
            .map(|a| state.article(a)))
    }

    async fn create_article(
        &self,
        owner_id: Uuid,
        article: NewArticle,
    ) -> Result<Article, sqlx::Error> {
        let mut state = self.lock();
        let now = Utc::now();
        let stored = StoredArticle {
            id: Uuid::new_v4(),
            user_id: owner_id,
            title: article.title,
            content: article.content,
            cover_path: None,
            views: 0,
            created_at: now,
            updated_at: now,
        };
        let created = state.article(&stored);
        state.articles.push(stored);
        Ok(created)
    }

    async fn update_article(
        &self,
        id: Uuid,
        changes: ArticleChanges,
    ) -> Result<Option<Article>, sqlx::Error> {
        let mut state = self.lock();
        let Some(stored) = state.articles.iter_mut().find(|a| a.id == id) else {
            return Ok(None);
        };
        if let Some(title) = changes.title {
            stored.title = title;
        }
        if let Some(content) = changes.content {
            stored.content = content;
        }
        stored.updated_at = Utc::now();
        let snapshot = stored.clone();
        Ok(Some(state.article(&snapshot)))
    }

    async fn set_cover_path(
        &self,
        id: Uuid,
        cover_path: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        if self.fail_cover_writes {
            return Err(sqlx::Error::Protocol("simulated write failure".to_string()));
        }
        let mut state = self.lock();
        match state.articles.iter_mut().find(|a| a.id == id) {
            Some(stored) => {
                stored.cover_path = cover_path.map(str::to_string);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn increment_views(&self, id: Uuid) -> Result<Option<Article>, sqlx::Error> {
        let mut state = self.lock();
        let Some(stored) = state.articles.iter_mut().find(|a| a.id == id) else {
            return Ok(None);
        };
        stored.views += 1;
        let snapshot = stored.clone();
        Ok(Some(state.article(&snapshot)))
    }

    async fn delete_article(&self, id: Uuid) -> Result<bool, sqlx::Error> {
        let mut state = self.lock();
        let before = state.articles.len();
        state.articles.retain(|a| a.id != id);
        Ok(state.articles.len() < before)
    }
}

// --- TEST UTILITIES ---

pub const STRONG_PASSWORD: &str = "@AxzcaS142";

pub struct TestApp {
    pub router: Router,
    pub repo: Arc<InMemoryRepository>,
    pub storage: MockStorageService,
    pub config: AppConfig,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with(InMemoryRepository::seeded(), MockStorageService::new())
    }

    pub fn with(repo: InMemoryRepository, storage: MockStorageService) -> Self {
        let repo = Arc::new(repo);
        let config = AppConfig::default();
        let state = AppState {
            repo: repo.clone(),
            storage: Arc::new(storage.clone()),
            config: config.clone(),
        };
        Self {
            router: create_router(state),
            repo,
            storage,
            config,
        }
    }

    /// Inserts a user with the given role directly through the repository.
    pub async fn user(&self, name: &str, role: Role) -> User {
        let roles = self.repo.list_roles().await.unwrap();
        let role_id = resolve_role(role.ordinal(), &roles).unwrap();
        self.repo
            .create_user(NewUser {
                name: name.to_string(),
                email: format!("{}@example.com", Uuid::new_v4().simple()),
                password_hash: auth::hash_password(STRONG_PASSWORD, self.config.bcrypt_cost)
                    .unwrap(),
                role_id,
            })
            .await
            .unwrap()
    }

    pub async fn token(&self, user: &User) -> String {
        auth::issue_token(self.repo.as_ref(), &self.config, user)
            .await
            .unwrap()
    }

    /// A user of `role` together with a fresh token.
    pub async fn actor(&self, name: &str, role: Role) -> (User, String) {
        let user = self.user(name, role).await;
        let token = self.token(&user).await;
        (user, token)
    }

    pub async fn article(&self, owner: &User, title: &str) -> Article {
        self.repo
            .create_article(
                owner.id,
                NewArticle {
                    title: title.to_string(),
                    content: format!("<p>{title}</p>"),
                },
            )
            .await
            .unwrap()
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
        };
        (status, json)
    }
}

pub fn json_request(
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: serde_json::Value,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

pub fn empty_request(method: &str, uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

/// A file part of a multipart body.
pub struct FilePart<'a> {
    pub file_name: &'a str,
    pub content_type: &'a str,
    pub bytes: &'a [u8],
}

const BOUNDARY: &str = "----article-portal-test-boundary";

pub fn multipart_request(
    method: &str,
    uri: &str,
    token: Option<&str>,
    fields: &[(&str, &str)],
    cover: Option<FilePart<'_>>,
) -> Request<Body> {
    let mut body: Vec<u8> = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some(file) = cover {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"cover\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                file.file_name, file.content_type
            )
            .as_bytes(),
        );
        body.extend_from_slice(file.bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    let mut builder = Request::builder().method(method).uri(uri).header(
        header::CONTENT_TYPE,
        format!("multipart/form-data; boundary={BOUNDARY}"),
    );
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body)).unwrap()
}

pub fn jpeg(bytes: &[u8]) -> FilePart<'_> {
    FilePart {
        file_name: "cover.jpg",
        content_type: "image/jpeg",
        bytes,
    }
}
