use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Authenticated Router Module
///
/// Every route here sits behind the `Principal` extractor layer installed in
/// `create_router`, so a missing, invalid or revoked token is answered with 401
/// before any handler runs.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // POST /logout
        // Revokes all of the caller's tokens.
        .route("/logout", post(handlers::logout))
        // GET /user
        // The caller's own profile.
        .route("/user", get(handlers::current_user))
        // GET/POST /articles
        // Paginated listing scoped by role; publishing is limited to admin/developer.
        .route(
            "/articles",
            get(handlers::list_articles).post(handlers::create_article),
        )
        // GET/PUT/DELETE /articles/{id}
        // Reads count a view; writes require ownership or the developer role.
        .route(
            "/articles/{id}",
            get(handlers::get_article)
                .put(handlers::update_article)
                .delete(handlers::delete_article),
        )
}
