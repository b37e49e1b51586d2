//! Linking handshake values
//!
//! Each credential in the handshake is narrower and longer-lived than the one
//! before it, except the processor token which is single use. Secrets get a
//! redacted `Debug` so they can't leak through `tracing` fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Short-lived token authorizing one widget session for one user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkToken {
    /// Opaque token handed to the client-side widget
    pub link_token: String,
    /// Expiry as reported by the aggregation service
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration: Option<DateTime<Utc>>,
}

/// Result of exchanging a single-use public token
#[derive(Clone)]
pub struct TokenExchange {
    /// Durable access token for the item (secret)
    pub access_token: String,
    /// Identifies the linked institution connection
    pub item_id: String,
}

impl fmt::Debug for TokenExchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenExchange")
            .field("access_token", &"<redacted>")
            .field("item_id", &self.item_id)
            .finish()
    }
}

/// One account under a linked item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub account_id: String,
    pub name: String,
    #[serde(default)]
    pub official_name: Option<String>,
    #[serde(default)]
    pub mask: Option<String>,
    #[serde(rename = "type", default)]
    pub account_type: Option<String>,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub available_balance: Option<f64>,
    #[serde(default)]
    pub current_balance: Option<f64>,
    #[serde(default)]
    pub iso_currency_code: Option<String>,
}

/// Single-use token handed from the aggregation service to the payment rail
#[derive(Clone, PartialEq, Eq)]
pub struct ProcessorToken(pub String);

impl ProcessorToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ProcessorToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ProcessorToken(<redacted>)")
    }
}

/// URL of a registered funding source at the payment rail. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FundingSourceUrl(String);

impl FundingSourceUrl {
    /// Returns `None` for an empty or blank URL
    pub fn new(url: impl Into<String>) -> Option<Self> {
        let url = url.into();
        if url.trim().is_empty() {
            None
        } else {
            Some(Self(url))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for FundingSourceUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
