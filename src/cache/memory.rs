//! In-memory cache implementation using moka
//!
//! Values are stored as JSON so any serializable view can be cached. Entries
//! expire after the cache-wide TTL; whole key families can be dropped with a
//! glob pattern.

use anyhow::{Context, Result};
use moka::future::Cache;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Default maximum cache capacity (number of entries)
const DEFAULT_MAX_CAPACITY: u64 = 10_000;

/// Default TTL for cache entries (5 minutes)
const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Cache entry wrapper holding serialized JSON
#[derive(Clone)]
struct CacheEntry {
    data: Arc<String>,
}

impl CacheEntry {
    fn new<T: Serialize>(value: &T) -> Result<Self> {
        let json = serde_json::to_string(value).context("Failed to serialize cache value")?;
        Ok(Self {
            data: Arc::new(json),
        })
    }

    fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.data).context("Failed to deserialize cache value")
    }
}

/// In-memory cache using moka
pub struct MemoryCache {
    cache: Cache<String, CacheEntry>,
    ttl: Duration,
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("entry_count", &self.cache.entry_count())
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl MemoryCache {
    /// Cache with 10,000 entries and a 5 minute TTL
    pub fn new() -> Self {
        Self::with_capacity_and_ttl(DEFAULT_MAX_CAPACITY, DEFAULT_TTL)
    }

    pub fn with_capacity_and_ttl(max_capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();

        Self { cache, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Get a value, `None` when missing or expired
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.cache.get(key).await {
            Some(entry) => Ok(Some(entry.deserialize()?)),
            None => Ok(None),
        }
    }

    /// Insert or overwrite a value
    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let entry = CacheEntry::new(value)?;
        self.cache.insert(key.to_string(), entry).await;
        Ok(())
    }

    pub async fn delete(&self, key: &str) {
        self.cache.invalidate(key).await;
    }

    /// Delete all keys matching a glob pattern.
    ///
    /// `*` matches any run of characters, `?` exactly one:
    /// `banks:u1:*` drops every key under `banks:u1:`.
    pub async fn delete_pattern(&self, pattern: &str) -> usize {
        let keys: Vec<String> = self
            .cache
            .iter()
            .filter(|(key, _)| pattern_matches(pattern, key.as_str()))
            .map(|(key, _)| (*key).clone())
            .collect();

        for key in &keys {
            self.cache.invalidate(key).await;
        }

        keys.len()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

fn pattern_matches(pattern: &str, key: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let key: Vec<char> = key.chars().collect();
    glob_match(&pattern, &key)
}

fn glob_match(pattern: &[char], key: &[char]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some(('*', rest)) => {
            glob_match(rest, key) || (!key.is_empty() && glob_match(pattern, &key[1..]))
        }
        Some(('?', rest)) => !key.is_empty() && glob_match(rest, &key[1..]),
        Some((c, rest)) => key.first() == Some(c) && glob_match(rest, &key[1..]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_and_get() {
        let cache = MemoryCache::new();
        cache.set("key1", &"value1".to_string()).await.unwrap();

        let result: Option<String> = cache.get("key1").await.unwrap();
        assert_eq!(result, Some("value1".to_string()));
    }

    #[tokio::test]
    async fn test_get_missing() {
        let cache = MemoryCache::new();
        let result: Option<String> = cache.get("missing").await.unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_delete() {
        let cache = MemoryCache::new();
        cache.set("key1", &1u32).await.unwrap();
        cache.delete("key1").await;

        let result: Option<u32> = cache.get("key1").await.unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_delete_pattern_only_touches_matching_keys() {
        let cache = MemoryCache::new();
        cache.set("banks:u1:list", &vec![1, 2]).await.unwrap();
        cache.set("banks:u1:balance:a", &3).await.unwrap();
        cache.set("banks:u2:list", &vec![4]).await.unwrap();

        let deleted = cache.delete_pattern("banks:u1:*").await;
        assert_eq!(deleted, 2);

        assert_eq!(cache.get::<Vec<i32>>("banks:u1:list").await.unwrap(), None);
        assert_eq!(cache.get::<i32>("banks:u1:balance:a").await.unwrap(), None);
        assert_eq!(cache.get::<Vec<i32>>("banks:u2:list").await.unwrap(), Some(vec![4]));
    }

    #[tokio::test]
    async fn test_type_mismatch_is_an_error() {
        let cache = MemoryCache::new();
        cache.set("key", &"text").await.unwrap();
        assert!(cache.get::<u64>("key").await.is_err());
    }

    #[test]
    fn test_pattern_matching() {
        assert!(pattern_matches("banks:*", "banks:u1:list"));
        assert!(pattern_matches("banks:?:list", "banks:1:list"));
        assert!(!pattern_matches("banks:?:list", "banks:12:list"));
        assert!(pattern_matches("exact", "exact"));
        assert!(!pattern_matches("exact", "exactly"));
        assert!(pattern_matches("*", ""));
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(20))]

            /// Entries disappear once the TTL has passed
            #[test]
            fn entries_expire_after_ttl(
                key in "[a-z]{1,10}",
                value in "[a-z]{1,100}"
            ) {
                let rt = tokio::runtime::Runtime::new().unwrap();
                rt.block_on(async {
                    let cache = MemoryCache::with_capacity_and_ttl(1000, Duration::from_millis(10));

                    cache.set(&key, &value).await.unwrap();
                    let result: Option<String> = cache.get(&key).await.unwrap();
                    prop_assert_eq!(result, Some(value.clone()));

                    tokio::time::sleep(Duration::from_millis(50)).await;
                    cache.cache.run_pending_tasks().await;

                    let result: Option<String> = cache.get(&key).await.unwrap();
                    prop_assert_eq!(result, None);
                    Ok(())
                })?;
            }

            /// A prefix pattern matches every key carrying that prefix
            #[test]
            fn prefix_pattern_matches_extensions(
                prefix in "[a-z:]{1,10}",
                suffix in "[a-z0-9:]{0,10}"
            ) {
                let pattern = format!("{}*", prefix);
                let key = format!("{}{}", prefix, suffix);
                prop_assert!(pattern_matches(&pattern, &key));
            }
        }
    }
}
