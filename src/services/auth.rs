//! Auth service
//!
//! Sign-up, sign-in, current-user lookup and sign-out on top of the identity
//! gateway. Input is validated here before any remote call is made.

use std::sync::Arc;

use crate::gateways::{AuthError, IdentityGateway};
use crate::models::{Session, SignInInput, SignUpInput, User};

/// Minimum password length accepted at sign-up and sign-in
pub const MIN_PASSWORD_LENGTH: usize = 9;

/// Authentication operations
pub struct AuthService {
    identity: Arc<dyn IdentityGateway>,
}

impl AuthService {
    pub fn new(identity: Arc<dyn IdentityGateway>) -> Self {
        Self { identity }
    }

    /// Register an account and open its first session
    pub async fn sign_up(&self, input: &SignUpInput) -> Result<(User, Session), AuthError> {
        validate_name("First name", &input.first_name)?;
        validate_name("Last name", &input.last_name)?;
        validate_credentials(&input.email, &input.password)?;

        let user = self
            .identity
            .create_account(input.email.trim(), &input.password, &input.display_name())
            .await?;
        tracing::info!("Account created: {}", user.id);

        let session = self.sign_in(&input.credentials()).await?;
        Ok((user, session))
    }

    /// Open an email/password session
    pub async fn sign_in(&self, input: &SignInInput) -> Result<Session, AuthError> {
        validate_credentials(&input.email, &input.password)?;

        let session = self
            .identity
            .create_session(input.email.trim(), &input.password)
            .await
            .inspect_err(|err| tracing::debug!("Sign-in failed: {}", err))?;
        tracing::info!("Session opened for user {}", session.user_id);
        Ok(session)
    }

    /// Resolve the user behind a session secret.
    ///
    /// A missing or blank secret is `NotAuthenticated` without a remote call.
    pub async fn current_user(&self, secret: Option<&str>) -> Result<User, AuthError> {
        let secret = secret
            .filter(|s| !s.trim().is_empty())
            .ok_or(AuthError::NotAuthenticated)?;

        self.identity.get_account(secret).await.inspect_err(|err| {
            if let AuthError::Unavailable(reason) = err {
                tracing::warn!("Identity service unavailable during session lookup: {}", reason);
            }
        })
    }

    /// Revoke the session, best effort.
    ///
    /// Remote failures are logged and swallowed; the caller clears the cookie
    /// regardless.
    pub async fn sign_out(&self, secret: Option<&str>) {
        let Some(secret) = secret.filter(|s| !s.trim().is_empty()) else {
            tracing::debug!("Sign-out without a session");
            return;
        };

        match self.identity.delete_session(secret).await {
            Ok(()) => tracing::info!("Session revoked"),
            Err(AuthError::NotAuthenticated) => tracing::debug!("Session already gone at sign-out"),
            Err(err) => tracing::warn!("Failed to revoke session: {}", err),
        }
    }
}

fn validate_name(field: &str, value: &str) -> Result<(), AuthError> {
    if value.trim().is_empty() {
        return Err(AuthError::Validation(format!("{} is required", field)));
    }
    Ok(())
}

fn validate_credentials(email: &str, password: &str) -> Result<(), AuthError> {
    let email = email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(AuthError::Validation("A valid email is required".to_string()));
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    Ok(())
}
