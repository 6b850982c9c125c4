use crate::{
    models::{AccessToken, Article, ArticleChanges, NewArticle, NewUser, RoleRecord, User},
    policy::ArticleScope,
    roles::Role,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, QueryBuilder};
use std::sync::Arc;
use uuid::Uuid;

/// Page
///
/// A 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub per_page: u32,
}

impl Page {
    pub const MAX_PER_PAGE: u32 = 100;

    /// Normalises raw query values: `page` is at least 1 and `per_page` is clamped
    /// to `1..=MAX_PER_PAGE`, falling back to `default_per_page`.
    pub fn new(page: Option<u32>, per_page: Option<u32>, default_per_page: u32) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page
                .unwrap_or(default_per_page)
                .clamp(1, Self::MAX_PER_PAGE),
        }
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.per_page)
    }

    pub fn last_page(&self, total: i64) -> u32 {
        let per_page = i64::from(self.per_page);
        let pages = (total + per_page - 1) / per_page;
        u32::try_from(pages.max(1)).unwrap_or(u32::MAX)
    }
}

/// Repository Trait
///
/// Contract for every persistence operation. Handlers only see this trait, so the
/// Postgres implementation can be swapped for an in-memory one in tests.
/// Database failures are returned as `sqlx::Error` and end the request.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Roles ---
    async fn list_roles(&self) -> Result<Vec<RoleRecord>, sqlx::Error>;
    async fn find_role_by_name(&self, name: &str) -> Result<Option<RoleRecord>, sqlx::Error>;
    async fn insert_role(&self, name: &str) -> Result<RoleRecord, sqlx::Error>;

    // --- Users ---
    async fn find_user(&self, id: Uuid) -> Result<Option<User>, sqlx::Error>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error>;
    async fn create_user(&self, user: NewUser) -> Result<User, sqlx::Error>;

    // --- Access tokens ---
    async fn store_token(&self, token: &AccessToken) -> Result<(), sqlx::Error>;
    // True while the token row exists, belongs to `user_id` and has not expired.
    async fn token_is_active(&self, token_id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error>;
    // Deletes every token of the user. Returns the number revoked.
    async fn revoke_tokens(&self, user_id: Uuid) -> Result<u64, sqlx::Error>;

    // --- Articles ---
    // Returns the requested page (newest first) and the total count for the scope.
    async fn list_articles(
        &self,
        scope: ArticleScope,
        page: Page,
    ) -> Result<(Vec<Article>, i64), sqlx::Error>;
    async fn find_article(&self, id: Uuid) -> Result<Option<Article>, sqlx::Error>;
    async fn create_article(&self, owner_id: Uuid, article: NewArticle)
    -> Result<Article, sqlx::Error>;
    async fn update_article(
        &self,
        id: Uuid,
        changes: ArticleChanges,
    ) -> Result<Option<Article>, sqlx::Error>;
    // Replaces the stored cover reference. Returns false if the article is gone.
    async fn set_cover_path(&self, id: Uuid, cover_path: Option<&str>)
    -> Result<bool, sqlx::Error>;
    // Adds one view against the persisted counter and returns the updated article.
    async fn increment_views(&self, id: Uuid) -> Result<Option<Article>, sqlx::Error>;
    async fn delete_article(&self, id: Uuid) -> Result<bool, sqlx::Error>;
}

/// RepositoryState
///
/// Shared handle to the persistence layer held in the application state.
pub type RepositoryState = Arc<dyn Repository>;

/// PostgresRepository
///
/// The `Repository` implementation backed by PostgreSQL.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Raw `users` row joined with `roles.name`.
#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    name: String,
    email: String,
    password_hash: String,
    email_verified_at: Option<DateTime<Utc>>,
    profile_pic_path: Option<String>,
    role: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = sqlx::Error;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = row
            .role
            .parse::<Role>()
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        Ok(User {
            id: row.id,
            name: row.name,
            email: row.email,
            password_hash: row.password_hash,
            email_verified_at: row.email_verified_at,
            profile_pic_path: row.profile_pic_path,
            role,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const USER_COLUMNS: &str = r#"
    u.id, u.name, u.email, u.password_hash, u.email_verified_at,
    u.profile_pic_path, r.name AS role, u.created_at, u.updated_at
"#;

const ARTICLE_COLUMNS: &str = r#"
    a.id, a.user_id, u.name AS author, a.title, a.content,
    a.cover_path, a.views, a.created_at, a.updated_at
"#;

#[async_trait]
impl Repository for PostgresRepository {
    async fn list_roles(&self) -> Result<Vec<RoleRecord>, sqlx::Error> {
        sqlx::query_as::<_, RoleRecord>("SELECT id, name FROM roles ORDER BY id")
            .fetch_all(&self.pool)
            .await
    }

    async fn find_role_by_name(&self, name: &str) -> Result<Option<RoleRecord>, sqlx::Error> {
        sqlx::query_as::<_, RoleRecord>("SELECT id, name FROM roles WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
    }

    /// insert_role
    ///
    /// `ON CONFLICT` keeps seeding idempotent even if two instances seed at once.
    async fn insert_role(&self, name: &str) -> Result<RoleRecord, sqlx::Error> {
        sqlx::query_as::<_, RoleRecord>(
            r#"
            INSERT INTO roles (name) VALUES ($1)
            ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
            RETURNING id, name
            "#,
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, sqlx::Error> {
        let query = format!(
            "SELECT {USER_COLUMNS} FROM users u JOIN roles r ON r.id = u.role_id WHERE u.id = $1"
        );
        sqlx::query_as::<_, UserRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        let query = format!(
            "SELECT {USER_COLUMNS} FROM users u JOIN roles r ON r.id = u.role_id WHERE u.email = $1"
        );
        sqlx::query_as::<_, UserRow>(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    /// create_user
    ///
    /// Inserts the account and joins its role in one statement through a CTE.
    async fn create_user(&self, user: NewUser) -> Result<User, sqlx::Error> {
        let query = format!(
            r#"
            WITH u AS (
                INSERT INTO users (id, name, email, password_hash, role_id, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, NOW(), NOW())
                RETURNING *
            )
            SELECT {USER_COLUMNS} FROM u JOIN roles r ON r.id = u.role_id
            "#
        );
        let row = sqlx::query_as::<_, UserRow>(&query)
            .bind(Uuid::new_v4())
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.role_id)
            .fetch_one(&self.pool)
            .await?;
        User::try_from(row)
    }

    async fn store_token(&self, token: &AccessToken) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO access_tokens (id, user_id, name, created_at, expires_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(token.id)
        .bind(token.user_id)
        .bind(&token.name)
        .bind(token.created_at)
        .bind(token.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn token_is_active(&self, token_id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM access_tokens WHERE id = $1 AND user_id = $2 AND expires_at > NOW())",
        )
        .bind(token_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
    }

    async fn revoke_tokens(&self, user_id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM access_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// list_articles
    ///
    /// Builds the scoped page query and its count with `QueryBuilder` so the owner
    /// filter is always a bound parameter.
    async fn list_articles(
        &self,
        scope: ArticleScope,
        page: Page,
    ) -> Result<(Vec<Article>, i64), sqlx::Error> {
        let mut count: QueryBuilder<sqlx::Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM articles a");
        let mut select: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles a JOIN users u ON u.id = a.user_id"
        ));

        if let ArticleScope::OwnedBy(owner_id) = scope {
            count.push(" WHERE a.user_id = ");
            count.push_bind(owner_id);
            select.push(" WHERE a.user_id = ");
            select.push_bind(owner_id);
        }

        select.push(" ORDER BY a.created_at DESC, a.id DESC LIMIT ");
        select.push_bind(i64::from(page.per_page));
        select.push(" OFFSET ");
        select.push_bind(page.offset());

        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;
        let articles = select
            .build_query_as::<Article>()
            .fetch_all(&self.pool)
            .await?;
        Ok((articles, total))
    }

    async fn find_article(&self, id: Uuid) -> Result<Option<Article>, sqlx::Error> {
        let query = format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles a JOIN users u ON u.id = a.user_id WHERE a.id = $1"
        );
        sqlx::query_as::<_, Article>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn create_article(
        &self,
        owner_id: Uuid,
        article: NewArticle,
    ) -> Result<Article, sqlx::Error> {
        let query = format!(
            r#"
            WITH a AS (
                INSERT INTO articles (id, user_id, title, content, views, created_at, updated_at)
                VALUES ($1, $2, $3, $4, 0, NOW(), NOW())
                RETURNING *
            )
            SELECT {ARTICLE_COLUMNS} FROM a JOIN users u ON u.id = a.user_id
            "#
        );
        sqlx::query_as::<_, Article>(&query)
            .bind(Uuid::new_v4())
            .bind(owner_id)
            .bind(&article.title)
            .bind(&article.content)
            .fetch_one(&self.pool)
            .await
    }

    /// update_article
    ///
    /// `COALESCE` leaves columns whose change is `None` untouched.
    async fn update_article(
        &self,
        id: Uuid,
        changes: ArticleChanges,
    ) -> Result<Option<Article>, sqlx::Error> {
        let query = format!(
            r#"
            WITH a AS (
                UPDATE articles
                SET title = COALESCE($2, title),
                    content = COALESCE($3, content),
                    updated_at = NOW()
                WHERE id = $1
                RETURNING *
            )
            SELECT {ARTICLE_COLUMNS} FROM a JOIN users u ON u.id = a.user_id
            "#
        );
        sqlx::query_as::<_, Article>(&query)
            .bind(id)
            .bind(changes.title)
            .bind(changes.content)
            .fetch_optional(&self.pool)
            .await
    }

    async fn set_cover_path(
        &self,
        id: Uuid,
        cover_path: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE articles SET cover_path = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(cover_path)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// increment_views
    ///
    /// The increment is evaluated against the stored value, so concurrent readers are
    /// serialised by the row lock instead of overwriting each other.
    async fn increment_views(&self, id: Uuid) -> Result<Option<Article>, sqlx::Error> {
        let query = format!(
            r#"
            WITH a AS (
                UPDATE articles SET views = views + 1 WHERE id = $1 RETURNING *
            )
            SELECT {ARTICLE_COLUMNS} FROM a JOIN users u ON u.id = a.user_id
            "#
        );
        sqlx::query_as::<_, Article>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn delete_article(&self, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM articles WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
