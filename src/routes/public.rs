use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without a token.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness check for load balancers.
        .route("/health", get(|| async { "ok" }))
        // POST /register
        // Creates an account with the `user` role and returns its first token.
        .route("/register", post(handlers::register_user))
        // POST /login
        // Exchanges email/password for a bearer token.
        .route("/login", post(handlers::login))
}
