//! HTTP API for the betting service.
//!
//! # Modules
//!
//! - [`auth`]: Registration and login
//! - [`users`]: Caller profile and admin account status
//! - [`matches`]: Match listing and admin scheduling
//! - [`bets`]: Bet placement, listing, lookup and cancellation
//! - [`middleware`]: Identity gate and admin gate
//! - [`rate_limiter`]: Per-IP request limits
//! - [`request_id`]: Request correlation
//!
//! # Endpoints Overview
//!
//! ```text
//! GET    /health                                  - Health check (public)
//! POST   /api/v1/auth/register                    - Register user (public)
//! POST   /api/v1/auth/login                       - Login (public)
//! GET    /api/v1/matches                          - List matches (public)
//! GET    /api/v1/matches/{match_id}               - Get match (public)
//! GET    /api/v1/users/me                         - Own profile (auth)
//! POST   /api/v1/bets                             - Place bet (auth)
//! GET    /api/v1/bets                             - List own bets (auth)
//! GET    /api/v1/bets/{bet_id}                    - Get own bet (auth)
//! DELETE /api/v1/bets/{bet_id}                    - Cancel own bet (auth)
//! POST   /api/v1/admin/matches                    - Create match (admin)
//! PATCH  /api/v1/admin/matches/{match_id}         - Update match (admin)
//! DELETE /api/v1/admin/matches/{match_id}         - Cancel match (admin)
//! PATCH  /api/v1/admin/users/{user_id}/status     - Set account status (admin)
//! ```
//!
//! Every failure is rendered by [`error::ApiError`]. Every route is subject to
//! the per-IP rate limit and carries an `x-request-id` response header.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use bz_server::{api::{AppState, create_router}, config::ServerConfig};
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ServerConfig::with_secrets("a".repeat(32), "b".repeat(16));
//! let app = create_router(AppState::in_memory(&config));
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod bets;
pub mod error;
pub mod matches;
pub mod middleware;
pub mod query;
pub mod rate_limiter;
pub mod request_id;
pub mod responses;
pub mod users;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, patch, post},
};
use betzona::{
    auth::AuthManager,
    db::{
        BetRepository, Database, MatchRepository, MemoryStore, PgBetRepository,
        PgMatchRepository, PgUserRepository, UserRepository,
    },
    fixtures::MatchManager,
    ledger::BetManager,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::{cache::ResponseCache, config::ServerConfig};
use error::ApiError;
use rate_limiter::IpRateLimiter;

/// Application state shared across all HTTP handlers.
///
/// Cloned for each request; every field is reference counted.
#[derive(Clone)]
pub struct AppState {
    pub auth_manager: Arc<AuthManager>,
    pub match_manager: Arc<MatchManager>,
    pub bet_manager: Arc<BetManager>,
    pub cache: Arc<ResponseCache>,
    pub rate_limiter: Arc<IpRateLimiter>,
    /// Present when backed by PostgreSQL; used by the health check
    pub database: Option<Database>,
}

impl AppState {
    /// Wire the managers over the given repositories
    pub fn new(
        users: Arc<dyn UserRepository>,
        matches: Arc<dyn MatchRepository>,
        bets: Arc<dyn BetRepository>,
        config: &ServerConfig,
    ) -> Self {
        let auth_manager = AuthManager::new(
            users,
            config.security.password_pepper.clone(),
            config.security.jwt_secret.clone(),
        )
        .with_starting_balance(config.accounts.starting_balance)
        .with_admin_emails(&config.accounts.admin_emails)
        .with_token_duration(chrono::Duration::hours(config.security.jwt_duration_hours));

        Self {
            auth_manager: Arc::new(auth_manager),
            match_manager: Arc::new(MatchManager::new(matches.clone())),
            bet_manager: Arc::new(BetManager::new(bets, matches)),
            cache: Arc::new(ResponseCache::new(
                config.cache.enabled,
                config.cache.ttl(),
            )),
            rate_limiter: Arc::new(IpRateLimiter::new(
                config.rate_limit.max_requests,
                config.rate_limit.window(),
            )),
            database: None,
        }
    }

    /// State backed by PostgreSQL
    pub fn with_database(database: Database, config: &ServerConfig) -> Self {
        let pool = database.pool().clone();
        let mut state = Self::new(
            Arc::new(PgUserRepository::new(pool.clone())),
            Arc::new(PgMatchRepository::new(pool.clone())),
            Arc::new(PgBetRepository::new(pool)),
            config,
        );
        state.database = Some(database);
        state
    }

    /// State backed by a fresh [`MemoryStore`]
    pub fn in_memory(config: &ServerConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::new(store.clone(), store.clone(), store, config)
    }
}

/// Create the complete API router with all endpoints and middleware.
pub fn create_router(state: AppState) -> Router {
    let v1_routes = create_v1_router(state.clone());

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", v1_routes)
        .fallback(not_found)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limiter::rate_limit_middleware,
        ))
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn create_v1_router(state: AppState) -> Router<AppState> {
    // Public routes (no authentication middleware)
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/matches", get(matches::list_matches))
        .route("/matches/{match_id}", get(matches::get_match));

    // Protected routes (require authentication middleware)
    let protected_routes = Router::new()
        .route("/users/me", get(users::me))
        .route("/bets", post(bets::place_bet).get(bets::list_bets))
        .route(
            "/bets/{bet_id}",
            get(bets::get_bet).delete(bets::cancel_bet),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    // Admin routes: identity gate first, then the role check
    let admin_routes = Router::new()
        .route("/admin/matches", post(matches::create_match))
        .route(
            "/admin/matches/{match_id}",
            patch(matches::update_match).delete(matches::cancel_match),
        )
        .route("/admin/users/{user_id}/status", patch(users::set_status))
        .layer(axum::middleware::from_fn(middleware::require_admin))
        .layer(axum::middleware::from_fn_with_state(
            state,
            middleware::auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(admin_routes)
}

/// Health check endpoint for monitoring and load balancers.
///
/// Returns `200 OK` when the store is reachable, `503 Service Unavailable`
/// otherwise.
///
/// ```bash
/// curl http://localhost:8080/health
/// # {"status":"healthy","storage":"postgres","version":"0.1.0","timestamp":"2025-11-22T10:30:00Z"}
/// ```
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let (storage, healthy) = match &state.database {
        Some(db) => ("postgres", db.health_check().await.is_ok()),
        None => ("in-memory", true),
    };

    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = json!({
        "status": if healthy { "healthy" } else { "unhealthy" },
        "storage": storage,
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    (status_code, Json(response))
}

async fn not_found() -> ApiError {
    ApiError::not_found("Route not found")
}
