//! Cache layer
//!
//! In-process moka cache for per-user views. Keys are namespaced by user so a
//! single pattern delete drops everything derived from one user's accounts.

pub mod memory;

use std::sync::Arc;
use std::time::Duration;

use crate::config::CacheConfig;

pub use memory::MemoryCache;

/// Build the shared cache from configuration
pub fn create_cache(config: &CacheConfig) -> Arc<MemoryCache> {
    let ttl = Duration::from_secs(config.ttl_seconds);
    tracing::debug!(
        "Cache configured: capacity {}, ttl {:?}",
        config.max_capacity,
        ttl
    );
    Arc::new(MemoryCache::with_capacity_and_ttl(config.max_capacity, ttl))
}

/// Key of a user's account list
pub fn accounts_list_key(user_id: &str) -> String {
    format!("banks:{}:list", user_id)
}

/// Key of one account's balance snapshot
pub fn balance_key(user_id: &str, account_id: &str) -> String {
    format!("banks:{}:balance:{}", user_id, account_id)
}

/// Pattern covering every key derived from a user's accounts
pub fn user_accounts_pattern(user_id: &str) -> String {
    format!("banks:{}:*", user_id)
}
