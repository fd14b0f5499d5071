use axum::{
    Router,
    extract::{DefaultBodyLimit, FromRef},
    http::HeaderName,
    middleware,
    routing::get,
};
use std::sync::Arc;
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Core application services and components.
pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod repository;
pub mod services;

// Resource-grouped routers (users, posts).
pub mod routes;
use routes::{posts::post_routes, users::user_routes};

// --- Public Re-exports ---

pub use auth::TokenService;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use repository::{InMemoryRepository, PostgresRepository, Repository, RepositoryState};
pub use services::{PostOwnershipGuard, PostService, ReactionService, UserService};

/// ApiDoc
///
/// Aggregates every `#[utoipa::path]` handler and `ToSchema` model into the
/// OpenAPI document served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::users::register_user, handlers::users::authenticate,
        handlers::users::refresh_token, handlers::users::get_users, handlers::users::get_me,
        handlers::users::get_user, handlers::users::update_user, handlers::users::update_profile,
        handlers::users::delete_user,
        handlers::posts::create_post, handlers::posts::get_posts,
        handlers::posts::get_filtered_posts, handlers::posts::get_top_liked,
        handlers::posts::get_posts_by_user, handlers::posts::get_liked_posts,
        handlers::posts::get_post, handlers::posts::update_post, handlers::posts::delete_post,
        handlers::posts::get_file_content, handlers::posts::download_file,
        handlers::posts::get_thumbnail, handlers::posts::remove_file,
        handlers::posts::like_post, handlers::posts::dislike_post,
        handlers::posts::get_like_status
    ),
    components(
        schemas(
            models::RegisterRequest, models::AuthenticateRequest, models::UpdateUserRequest,
            models::PostFileRequest, models::CreatePostRequest, models::UpdatePostRequest,
            models::UserResponse, models::AuthenticateResponse, models::TokenResponse,
            models::PostFileResponse, models::PostResponse, models::ReactionResponse,
            models::LikeStatusResponse, models::MessageResponse, models::ReactionState,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "postboard", description = "Posts, attachments and reactions API")
    )
)]
struct ApiDoc;

/// Registers the `bearer_auth` scheme referenced by protected handlers.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// AppState
///
/// The single, immutable container shared across requests: the store, the
/// token service, the domain services built on top of them, and the loaded
/// configuration.
#[derive(Clone)]
pub struct AppState {
    /// Credential and content store (Postgres or in-memory).
    pub repo: RepositoryState,
    /// Issues and validates session tokens.
    pub tokens: TokenService,
    pub users: UserService,
    pub posts: PostService,
    /// The like/dislike toggle engine.
    pub reactions: ReactionService,
    pub config: AppConfig,
}

impl AppState {
    /// Wires every service to the given store and configuration.
    pub fn new(repo: RepositoryState, config: AppConfig) -> Self {
        let tokens = TokenService::new(&config.jwt_secret);
        Self {
            users: UserService::new(repo.clone(), tokens.clone(), config.bcrypt_cost),
            posts: PostService::new(repo.clone()),
            reactions: ReactionService::new(repo.clone()),
            tokens,
            repo,
            config,
        }
    }

    /// State backed by a fresh `InMemoryRepository`.
    pub fn in_memory(config: AppConfig) -> Self {
        Self::new(Arc::new(InMemoryRepository::new()), config)
    }
}

// --- Axum FromRef Extractor Implementations ---

// Lets middleware and handlers pull single components out of AppState.

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for TokenService {
    fn from_ref(app_state: &AppState) -> TokenService {
        app_state.tokens.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// create_router
///
/// Assembles every route, the two-stage auth layer, the body limit and the
/// observability stack, and registers the application state.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");
    let body_limit = DefaultBodyLimit::max(state.config.max_body_bytes);

    // 2. API routes behind the auth layers.
    // route_layer order: the last one added runs first, so `auth_gate`
    // resolves the caller before `require_identity` checks the allow-list.
    let api = Router::<AppState>::new()
        .route("/health", get(handlers::health))
        .merge(user_routes())
        .merge(post_routes())
        .route_layer(middleware::from_fn(auth::require_identity))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_gate,
        ));

    let base_router = Router::new()
        // Documentation: Serve the auto-generated Swagger UI.
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api)
        .layer(body_limit)
        .with_state(state);

    // 3. Observability and Correlation Layers
    base_router
        .layer(
            ServiceBuilder::new()
                // 3a. Every request gets an x-request-id.
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                // 3b. One span per request, carrying the request id.
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                // 3c. Echo the id back to the client.
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span factory for `TraceLayer`: method, URI and the `x-request-id` set by
/// `SetRequestIdLayer`, so every log line of a request is correlated.
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
