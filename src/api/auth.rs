//! Authentication API endpoints
//!
//! - POST /api/v1/auth/sign-up - register and open a session
//! - POST /api/v1/auth/sign-in - open a session
//! - POST /api/v1/auth/sign-out - revoke the session, clear the cookie
//! - GET /api/v1/auth/me - current user

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_cookies::Cookies;

use crate::api::middleware::{
    clear_session_cookie, session_cookie, session_secret, ApiError, AppState, AuthenticatedUser,
};
use crate::models::{SignInInput, SignUpInput, User};

/// Request body for sign-up
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUpRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

/// Request body for sign-in
#[derive(Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

/// Response carrying the signed-in user
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user: User,
}

/// Routes reachable without a session
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/sign-up", post(sign_up))
        .route("/sign-in", post(sign_in))
        .route("/sign-out", post(sign_out))
}

/// Routes requiring a session
pub fn protected_router() -> Router<AppState> {
    Router::new().route("/me", get(current_user))
}

/// POST /api/v1/auth/sign-up
async fn sign_up(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(body): Json<SignUpRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let input = SignUpInput::new(body.first_name, body.last_name, body.email, body.password);
    let (user, session) = state.auth_service.sign_up(&input).await?;

    cookies.add(session_cookie(&state.session, session.secret));
    Ok((StatusCode::CREATED, Json(UserResponse { user })))
}

/// POST /api/v1/auth/sign-in
async fn sign_in(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(body): Json<SignInRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let input = SignInInput::new(body.email, body.password);
    let session = state.auth_service.sign_in(&input).await?;
    let user = state.auth_service.current_user(Some(&session.secret)).await?;

    cookies.add(session_cookie(&state.session, session.secret));
    Ok(Json(UserResponse { user }))
}

/// POST /api/v1/auth/sign-out
///
/// Always succeeds; a missing cookie or a remote failure is not an error.
async fn sign_out(State(state): State<AppState>, cookies: Cookies) -> StatusCode {
    let secret = session_secret(&cookies, &state.session);
    clear_session_cookie(&cookies, &state.session);
    state.auth_service.sign_out(secret.as_deref()).await;
    StatusCode::NO_CONTENT
}

/// GET /api/v1/auth/me
async fn current_user(user: AuthenticatedUser) -> Json<UserResponse> {
    Json(UserResponse { user: user.0 })
}
