//! Identity gateway
//!
//! Account and session operations against the Appwrite accounts API.
//!
//! This module provides:
//! - `IdentityGateway` trait defining the operations the auth service needs
//! - `AppwriteIdentityGateway` implementing it over HTTPS
//! - `AuthError`, the error taxonomy shared by the gateway and the auth service

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::appwrite::{equal_query, error_body, AppwriteClient, UNIQUE_ID};
use crate::models::{Session, User};

/// Account preference holding the payment-rail customer id
pub const RAIL_CUSTOMER_PREF: &str = "dwollaCustomerId";

/// Error types for identity operations
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Email/password pair rejected
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// An account with this email already exists
    #[error("Account already exists: {0}")]
    AccountExists(String),

    /// Input rejected before or by the identity service
    #[error("Validation error: {0}")]
    Validation(String),

    /// No session, or the session was rejected
    #[error("Not authenticated")]
    NotAuthenticated,

    /// Identity service unreachable or failing
    #[error("Identity service unavailable: {0}")]
    Unavailable(String),
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        AuthError::Unavailable(err.to_string())
    }
}

/// Identity service operations
#[async_trait]
pub trait IdentityGateway: Send + Sync {
    /// Register a new account. The service assigns the id.
    async fn create_account(&self, email: &str, password: &str, name: &str) -> Result<User, AuthError>;

    /// Open an email/password session
    async fn create_session(&self, email: &str, password: &str) -> Result<Session, AuthError>;

    /// Resolve the account owning the session secret
    async fn get_account(&self, secret: &str) -> Result<User, AuthError>;

    /// Revoke the session identified by the secret
    async fn delete_session(&self, secret: &str) -> Result<(), AuthError>;
}

/// Appwrite-backed identity gateway
///
/// The rail customer id is read from the account preferences. When a user
/// collection is configured, accounts without the preference fall back to the
/// `dwollaCustomerId` attribute of their user document.
#[derive(Debug)]
pub struct AppwriteIdentityGateway {
    client: AppwriteClient,
    user_documents: Option<String>,
}

impl AppwriteIdentityGateway {
    pub fn new(client: AppwriteClient) -> Self {
        Self {
            client,
            user_documents: None,
        }
    }

    /// Look up rail customer ids in the given user collection. Empty ids
    /// leave the lookup disabled.
    pub fn with_user_collection(mut self, database_id: &str, collection_id: &str) -> Self {
        if !database_id.is_empty() && !collection_id.is_empty() {
            self.user_documents = Some(format!(
                "/databases/{}/collections/{}/documents",
                database_id, collection_id
            ));
        }
        self
    }

    /// Rail customer id stored on the user document, if any.
    ///
    /// A failed lookup degrades to "not enrolled" rather than failing the
    /// session check.
    async fn rail_customer_from_user_document(&self, user_id: &str) -> Option<String> {
        let path = self.user_documents.as_deref()?;
        let response = self
            .client
            .admin(Method::GET, path)
            .query(&[("queries[]", equal_query("userId", user_id))])
            .send()
            .await
            .inspect_err(|err| tracing::warn!("User document lookup failed: {}", err))
            .ok()?;

        if !response.status().is_success() {
            let (status, body) = error_body(response).await;
            tracing::warn!("User document lookup rejected ({}): {}", status, body.kind);
            return None;
        }

        let list: UserDocumentList = response
            .json()
            .await
            .inspect_err(|err| tracing::warn!("User document list unreadable: {}", err))
            .ok()?;
        list.documents
            .into_iter()
            .filter_map(|doc| doc.rail_customer_id)
            .find(|id| !id.is_empty())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateAccountRequest<'a> {
    user_id: &'a str,
    email: &'a str,
    password: &'a str,
    name: &'a str,
}

#[derive(Serialize)]
struct CreateSessionRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct AccountResponse {
    #[serde(rename = "$id")]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    prefs: Value,
}

impl From<AccountResponse> for User {
    fn from(account: AccountResponse) -> Self {
        let rail_customer_id = account
            .prefs
            .get(RAIL_CUSTOMER_PREF)
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string);
        User {
            id: account.id,
            name: account.name,
            email: account.email,
            rail_customer_id,
        }
    }
}

#[derive(Deserialize)]
struct UserDocument {
    #[serde(rename = "dwollaCustomerId", default)]
    rail_customer_id: Option<String>,
}

#[derive(Deserialize)]
struct UserDocumentList {
    #[serde(default)]
    documents: Vec<UserDocument>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    #[serde(rename = "$id")]
    id: String,
    user_id: String,
    #[serde(default)]
    secret: String,
}

#[async_trait]
impl IdentityGateway for AppwriteIdentityGateway {
    async fn create_account(&self, email: &str, password: &str, name: &str) -> Result<User, AuthError> {
        let response = self
            .client
            .admin(Method::POST, "/account")
            .json(&CreateAccountRequest {
                user_id: UNIQUE_ID,
                email,
                password,
                name,
            })
            .send()
            .await
            .inspect_err(|err| tracing::error!("Identity create-account request failed: {}", err))?;

        if !response.status().is_success() {
            let (status, body) = error_body(response).await;
            tracing::warn!("Identity create-account rejected ({}): {}", status, body.kind);
            return Err(match status {
                StatusCode::CONFLICT => AuthError::AccountExists(email.to_string()),
                StatusCode::BAD_REQUEST => AuthError::Validation(body.message),
                _ => AuthError::Unavailable(format!("status {}", status)),
            });
        }

        let account: AccountResponse = response.json().await?;
        Ok(account.into())
    }

    async fn create_session(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let response = self
            .client
            .admin(Method::POST, "/account/sessions/email")
            .json(&CreateSessionRequest { email, password })
            .send()
            .await
            .inspect_err(|err| tracing::error!("Identity create-session request failed: {}", err))?;

        if !response.status().is_success() {
            let (status, body) = error_body(response).await;
            tracing::debug!("Identity create-session rejected ({}): {}", status, body.kind);
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::NOT_FOUND => AuthError::InvalidCredentials,
                StatusCode::BAD_REQUEST => AuthError::Validation(body.message),
                _ => AuthError::Unavailable(format!("status {}", status)),
            });
        }

        let session: SessionResponse = response.json().await?;
        if session.secret.is_empty() {
            return Err(AuthError::Unavailable(
                "identity service returned a session without a secret".to_string(),
            ));
        }

        Ok(Session {
            id: session.id,
            user_id: session.user_id,
            secret: session.secret,
        })
    }

    async fn get_account(&self, secret: &str) -> Result<User, AuthError> {
        let response = self
            .client
            .session(Method::GET, "/account", secret)
            .send()
            .await
            .inspect_err(|err| tracing::error!("Identity get-account request failed: {}", err))?;

        match response.status() {
            status if status.is_success() => {
                let account: AccountResponse = response.json().await?;
                let mut user = User::from(account);
                if user.rail_customer_id.is_none() {
                    user.rail_customer_id = self.rail_customer_from_user_document(&user.id).await;
                }
                Ok(user)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
                Err(AuthError::NotAuthenticated)
            }
            status => Err(AuthError::Unavailable(format!("status {}", status))),
        }
    }

    async fn delete_session(&self, secret: &str) -> Result<(), AuthError> {
        let response = self
            .client
            .session(Method::DELETE, "/account/sessions/current", secret)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::UNAUTHORIZED | StatusCode::NOT_FOUND => Err(AuthError::NotAuthenticated),
            status => Err(AuthError::Unavailable(format!("status {}", status))),
        }
    }
}
