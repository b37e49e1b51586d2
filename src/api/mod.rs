//! API layer - HTTP handlers and routing
//!
//! - Auth endpoints (sign-up, sign-in, sign-out, current user)
//! - Bank endpoints (link token, public-token exchange, accounts, balance)
//! - Health check

pub mod auth;
pub mod banks;
pub mod middleware;


use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_cookies::CookieManagerLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use middleware::{ApiError, AppState, AuthenticatedUser};

use crate::cache::create_cache;
use crate::config::Config;
use crate::gateways::Gateways;
use crate::services::{AccountsService, AuthService, BankLinkService};

impl AppState {
    /// Wire the services on top of `gateways`
    pub fn new(gateways: Gateways, config: &Config) -> Self {
        let cache = create_cache(&config.cache);
        let accounts_service = Arc::new(AccountsService::new(
            gateways.store.clone(),
            gateways.aggregation.clone(),
            cache,
        ));
        let bank_link_service = Arc::new(BankLinkService::new(
            gateways.aggregation,
            gateways.rail,
            gateways.store,
            accounts_service.clone(),
        ));

        Self {
            auth_service: Arc::new(AuthService::new(gateways.identity)),
            bank_link_service,
            accounts_service,
            session: Arc::new(config.session.clone()),
        }
    }
}

/// Build the main API router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    let protected_routes = Router::new()
        .nest("/auth", auth::protected_router())
        .merge(banks::router())
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::require_auth,
        ));

    Router::new()
        .nest("/auth", auth::public_router())
        .merge(protected_routes)
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, cors_origin: &str) -> Result<Router> {
    let origin = cors_origin
        .parse::<HeaderValue>()
        .with_context(|| format!("Invalid CORS origin: {}", cors_origin))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::COOKIE])
        .allow_credentials(true);

    Ok(Router::new()
        .nest("/api/v1", build_api_router(state.clone()))
        .route("/health", get(health))
        .layer(CookieManagerLayer::new())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

/// GET /health
async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
