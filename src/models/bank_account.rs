//! Bank account record model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fields written when a linking transaction completes
#[derive(Clone)]
pub struct NewBankAccount {
    /// Owning user id
    pub user_id: String,
    /// Aggregation item id of the institution connection
    pub bank_id: String,
    /// Aggregation account id
    pub account_id: String,
    /// Aggregation access token (secret)
    pub access_token: String,
    /// Funding source registered at the payment rail
    pub funding_source_url: String,
    /// Obfuscated account id, safe for URLs
    pub shareable_id: String,
}

/// Persisted bank account record
///
/// Created once per successful link and never updated. Holds the access token
/// so it must never be handed to clients directly; use [`BankAccountView`].
#[derive(Clone)]
pub struct BankAccountRecord {
    /// Store-assigned id
    pub id: String,
    pub user_id: String,
    pub bank_id: String,
    pub account_id: String,
    pub access_token: String,
    pub funding_source_url: String,
    pub shareable_id: String,
    pub created_at: DateTime<Utc>,
}

impl BankAccountRecord {
    /// Build a record from its insert fields and the store-assigned id
    pub fn from_new(id: impl Into<String>, new: NewBankAccount, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            user_id: new.user_id,
            bank_id: new.bank_id,
            account_id: new.account_id,
            access_token: new.access_token,
            funding_source_url: new.funding_source_url,
            shareable_id: new.shareable_id,
            created_at,
        }
    }

    /// Client-facing view without secrets or raw account ids
    pub fn view(&self) -> BankAccountView {
        BankAccountView {
            id: self.id.clone(),
            bank_id: self.bank_id.clone(),
            funding_source_url: self.funding_source_url.clone(),
            shareable_id: self.shareable_id.clone(),
            created_at: self.created_at,
        }
    }
}

impl std::fmt::Debug for BankAccountRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BankAccountRecord")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("bank_id", &self.bank_id)
            .field("account_id", &self.account_id)
            .field("access_token", &"<redacted>")
            .field("funding_source_url", &self.funding_source_url)
            .field("shareable_id", &self.shareable_id)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Linked bank account as shown to its owner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankAccountView {
    pub id: String,
    pub bank_id: String,
    pub funding_source_url: String,
    pub shareable_id: String,
    pub created_at: DateTime<Utc>,
}
