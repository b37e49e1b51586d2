//! Accounts service
//!
//! Per-user view of linked bank accounts and their live balances, cached in
//! the in-process cache. Linking a new account invalidates the view.

use std::sync::Arc;

use crate::cache::{accounts_list_key, balance_key, user_accounts_pattern, MemoryCache};
use crate::gateways::{AggregationError, AggregationGateway, BankAccountStore, StorageError};
use crate::models::{AccountSnapshot, BankAccountView, User};
use crate::services::shareable_id::decode_id;

/// Error types for account view operations
#[derive(Debug, thiserror::Error)]
pub enum AccountsError {
    /// Unknown shareable id, or owned by someone else
    #[error("Bank account not found")]
    NotFound,

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Aggregation(#[from] AggregationError),
}

/// Cached account views
pub struct AccountsService {
    store: Arc<dyn BankAccountStore>,
    aggregation: Arc<dyn AggregationGateway>,
    cache: Arc<MemoryCache>,
}

impl AccountsService {
    pub fn new(
        store: Arc<dyn BankAccountStore>,
        aggregation: Arc<dyn AggregationGateway>,
        cache: Arc<MemoryCache>,
    ) -> Self {
        Self {
            store,
            aggregation,
            cache,
        }
    }

    /// Linked accounts of `user`, oldest first
    pub async fn list(&self, user: &User) -> Result<Vec<BankAccountView>, AccountsError> {
        let key = accounts_list_key(&user.id);
        if let Some(views) = self.cached(&key).await {
            return Ok(views);
        }

        let views: Vec<BankAccountView> = self
            .store
            .list_bank_accounts(&user.id)
            .await?
            .iter()
            .map(|record| record.view())
            .collect();

        self.store_in_cache(&key, &views).await;
        Ok(views)
    }

    /// Live balance of the account behind `shareable_id`
    pub async fn balance(&self, user: &User, shareable_id: &str) -> Result<AccountSnapshot, AccountsError> {
        let account_id = decode_id(shareable_id).ok_or(AccountsError::NotFound)?;

        let key = balance_key(&user.id, &account_id);
        if let Some(snapshot) = self.cached(&key).await {
            return Ok(snapshot);
        }

        let record = self
            .store
            .find_by_account_id(&user.id, &account_id)
            .await?
            .ok_or(AccountsError::NotFound)?;

        let snapshot = self
            .aggregation
            .get_accounts(&record.access_token)
            .await
            .inspect_err(|err| tracing::error!("Balance lookup failed for record {}: {}", record.id, err))?
            .into_iter()
            .find(|account| account.account_id == record.account_id)
            .ok_or(AccountsError::NotFound)?;

        self.store_in_cache(&key, &snapshot).await;
        Ok(snapshot)
    }

    /// Drop every cached view derived from `user_id`'s accounts
    pub async fn invalidate(&self, user_id: &str) {
        let removed = self.cache.delete_pattern(&user_accounts_pattern(user_id)).await;
        tracing::debug!("Invalidated {} cached view(s) for user {}", removed, user_id);
    }

    async fn cached<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.cache.get(key).await {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!("Ignoring unreadable cache entry {}: {}", key, err);
                self.cache.delete(key).await;
                None
            }
        }
    }

    async fn store_in_cache<T: serde::Serialize>(&self, key: &str, value: &T) {
        if let Err(err) = self.cache.set(key, value).await {
            tracing::warn!("Failed to cache {}: {}", key, err);
        }
    }
}
