//! Session model

use serde::{Deserialize, Serialize};

/// Session issued by the identity service
///
/// The secret is what travels in the session cookie; it is never serialized
/// into API responses or logs.
#[derive(Clone, Serialize, Deserialize)]
pub struct Session {
    /// Session ID assigned by the identity service
    pub id: String,
    /// Owning user ID
    pub user_id: String,
    /// Opaque session secret
    #[serde(skip_serializing)]
    pub secret: String,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("secret", &"<redacted>")
            .finish()
    }
}
