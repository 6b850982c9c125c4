use axum::{
    Router,
    extract::{DefaultBodyLimit, FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod auth;
pub mod config;
pub mod covers;
pub mod error;
pub mod forms;
pub mod handlers;
pub mod models;
pub mod policy;
pub mod repository;
pub mod roles;
pub mod storage;
pub mod validation;

// Routing split by access level (public, authenticated).
pub mod routes;
use auth::Principal;
use routes::{authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use error::AppError;
pub use repository::{PostgresRepository, RepositoryState};
pub use storage::{MockStorageService, S3StorageClient, StorageState};

/// ApiDoc
///
/// OpenAPI document for every handler and schema, served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::register_user, handlers::login, handlers::logout, handlers::current_user,
        handlers::list_articles, handlers::get_article, handlers::create_article,
        handlers::update_article, handlers::delete_article
    ),
    components(
        schemas(
            models::RegisterRequest, models::LoginRequest, models::ArticleJsonRequest,
            models::ArticleUploadForm, models::UserProfile, models::RegisterResponse,
            models::AuthUserResponse, models::ArticleResponse, models::PageMeta,
            models::ArticlePage, models::MessageResponse, error::ErrorBody, roles::Role,
        )
    ),
    tags(
        (name = "articles", description = "Article publishing API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The shared, cloneable container of every service a request may need.
#[derive(Clone)]
pub struct AppState {
    /// Persistence (Postgres in production, in-memory in tests).
    pub repo: RepositoryState,
    /// Blob storage for cover photos and profile pictures.
    pub storage: StorageState,
    /// Configuration loaded once at startup and never mutated.
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for StorageState {
    fn from_ref(app_state: &AppState) -> StorageState {
        app_state.storage.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Runs the `Principal` extractor ahead of every authenticated route. A failed
/// extraction short-circuits with 401 before the handler is reached.
async fn auth_middleware(_principal: Principal, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// create_router
///
/// Assembles routes, middleware and state.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    // Header name used for request correlation.
    let x_request_id = HeaderName::from_static("x-request-id");
    let body_limit = state.config.max_upload_bytes;

    // 2. Base Router Assembly
    let base_router = Router::new()
        // Documentation: Swagger UI over the generated OpenAPI document.
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Public Routes: no authentication.
        .merge(public::public_routes())
        // Authenticated Routes: `auth_middleware` rejects before the handler runs.
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state);

    // 3. Observability and Correlation Layers (outermost first)
    base_router
        .layer(
            ServiceBuilder::new()
                // 3a. Request ID Generation: a UUID for every incoming request.
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                // 3b. Request Tracing: one span per request, tagged with its id.
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                // 3c. Request ID Propagation: the id is echoed back in the response.
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        // 4. CORS Layer
        .layer(cors)
}

/// trace_span_logger
///
/// Span for one request, tagged with its `x-request-id` so every log line of the
/// request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
