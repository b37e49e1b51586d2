//! API middleware
//!
//! Shared application state, the API error type, the session cookie and the
//! authentication middleware.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_cookies::{cookie::SameSite, Cookie, Cookies};

use crate::config::SessionConfig;
use crate::gateways::AuthError;
use crate::models::User;
use crate::services::{AccountsService, AuthService, BankLinkService};

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub auth_service: Arc<AuthService>,
    pub bank_link_service: Arc<BankLinkService>,
    pub accounts_service: Arc<AccountsService>,
    pub session: Arc<SessionConfig>,
}

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn upstream_error(message: impl Into<String>) -> Self {
        Self::new("UPSTREAM_ERROR", message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new("SERVICE_UNAVAILABLE", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "CONFLICT" => StatusCode::CONFLICT,
            "RAIL_CUSTOMER_REQUIRED" => StatusCode::CONFLICT,
            "UPSTREAM_ERROR" => StatusCode::BAD_GATEWAY,
            "SERVICE_UNAVAILABLE" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => ApiError::unauthorized("Invalid email or password"),
            AuthError::NotAuthenticated => ApiError::unauthorized("Authentication required"),
            AuthError::AccountExists(_) => ApiError::conflict("An account with this email already exists"),
            AuthError::Validation(message) => ApiError::validation_error(message),
            AuthError::Unavailable(_) => {
                ApiError::service_unavailable("Identity service is unavailable, try again later")
            }
        }
    }
}

// ============================================================================
// Session cookie
// ============================================================================

/// Cookie carrying the session secret
pub fn session_cookie(config: &SessionConfig, secret: String) -> Cookie<'static> {
    let mut cookie = Cookie::new(config.cookie_name.clone(), secret);
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Strict);
    cookie.set_secure(config.secure);
    cookie
}

/// Session secret sent by the client, if any
pub fn session_secret(cookies: &Cookies, config: &SessionConfig) -> Option<String> {
    cookies
        .get(&config.cookie_name)
        .map(|cookie| cookie.value().to_string())
        .filter(|secret| !secret.is_empty())
}

/// Expire the session cookie on the client
pub fn clear_session_cookie(cookies: &Cookies, config: &SessionConfig) {
    let mut cookie = Cookie::new(config.cookie_name.clone(), "");
    cookie.set_path("/");
    cookies.remove(cookie);
}

/// Authentication middleware
///
/// Resolves the session cookie to a user. A missing or rejected session is a
/// 401; an unreachable identity service is a 503.
pub async fn require_auth(
    State(state): State<AppState>,
    cookies: Cookies,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let secret = session_secret(&cookies, &state.session);

    let user = state
        .auth_service
        .current_user(secret.as_deref())
        .await
        .map_err(ApiError::from)?;

    request.extensions_mut().insert(AuthenticatedUser(user));
    Ok(next.run(request).await)
}
