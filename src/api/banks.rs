//! Bank account API endpoints
//!
//! - POST /api/v1/banks/link-token - issue a link token for the widget
//! - POST /api/v1/banks/exchange - link the account behind a public token
//! - GET /api/v1/banks - linked accounts
//! - GET /api/v1/banks/{shareable_id}/balance - live balance

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::gateways::RailError;
use crate::models::{AccountSnapshot, BankAccountView, LinkToken};
use crate::services::{AccountsError, LinkError, LinkFailure};

/// Request body for the public-token exchange
#[derive(Deserialize)]
pub struct ExchangeRequest {
    #[serde(alias = "publicToken")]
    pub public_token: String,
}

/// Build the banks router (requires auth middleware)
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/banks", get(list_accounts))
        .route("/banks/link-token", post(create_link_token))
        .route("/banks/exchange", post(exchange_public_token))
        .route("/banks/{shareable_id}/balance", get(account_balance))
}

impl From<LinkFailure> for ApiError {
    fn from(failure: LinkFailure) -> Self {
        match failure.cause {
            LinkError::Rail(RailError::MissingCustomer) => ApiError::new(
                "RAIL_CUSTOMER_REQUIRED",
                "Complete payment enrollment before linking a bank account",
            ),
            LinkError::Storage(_) => ApiError::internal_error("Failed to save the linked bank account"),
            LinkError::Aggregation(_) | LinkError::Rail(_) => {
                ApiError::upstream_error("Failed to link bank account")
            }
        }
    }
}

impl From<AccountsError> for ApiError {
    fn from(err: AccountsError) -> Self {
        match err {
            AccountsError::NotFound => ApiError::not_found("Bank account not found"),
            AccountsError::Storage(_) => ApiError::internal_error("Failed to load bank accounts"),
            AccountsError::Aggregation(_) => ApiError::upstream_error("Failed to load account balance"),
        }
    }
}

/// POST /api/v1/banks/link-token
async fn create_link_token(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<LinkToken>, ApiError> {
    let token = state
        .bank_link_service
        .issue_link_token(&user.0)
        .await
        .map_err(|_| ApiError::upstream_error("Failed to create link token"))?;
    Ok(Json(token))
}

/// POST /api/v1/banks/exchange
async fn exchange_public_token(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<ExchangeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if body.public_token.trim().is_empty() {
        return Err(ApiError::validation_error("public_token is required"));
    }

    let record = state
        .bank_link_service
        .link_bank_account(&user.0, body.public_token.trim())
        .await?;
    Ok((StatusCode::CREATED, Json(record.view())))
}

/// GET /api/v1/banks
async fn list_accounts(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<BankAccountView>>, ApiError> {
    Ok(Json(state.accounts_service.list(&user.0).await?))
}

/// GET /api/v1/banks/{shareable_id}/balance
async fn account_balance(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(shareable_id): Path<String>,
) -> Result<Json<AccountSnapshot>, ApiError> {
    Ok(Json(state.accounts_service.balance(&user.0, &shareable_id).await?))
}
