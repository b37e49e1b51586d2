//! User model
//!
//! Users live in the identity service. This system only ever sees the
//! identity-assigned id, display name, email and the optional payment-rail
//! customer id kept in the account preferences. Passwords pass through to the
//! identity service and are never stored here.

use serde::{Deserialize, Serialize};

/// User as returned by the identity service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Identity-service assigned id
    pub id: String,
    /// Display name ("First Last")
    pub name: String,
    /// Email address
    pub email: String,
    /// Payment-rail customer id, present once the user is enrolled at the rail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rail_customer_id: Option<String>,
}

/// Input for sign-up
#[derive(Clone)]
pub struct SignUpInput {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

impl SignUpInput {
    /// Create a new sign-up input
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            email: email.into(),
            password: password.into(),
        }
    }

    /// Display name registered with the identity service
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
    }

    /// Credentials for the session created right after sign-up
    pub fn credentials(&self) -> SignInInput {
        SignInInput::new(self.email.clone(), self.password.clone())
    }
}

impl std::fmt::Debug for SignUpInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignUpInput")
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Input for sign-in
#[derive(Clone)]
pub struct SignInInput {
    pub email: String,
    pub password: String,
}

impl SignInInput {
    /// Create a new sign-in input
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for SignInInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignInInput")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}
