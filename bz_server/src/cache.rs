//! Read-through cache for per-user bet queries.
//!
//! Entries are serialized response bodies keyed by user, so a user's placement
//! or cancellation can drop everything cached for that user at once:
//!
//! - `user_bets:{user_id}:{sha256(query)}` for list queries
//! - `bet:{user_id}:{bet_id}` for single bets
//!
//! Entries also expire after a fixed TTL. A disabled cache stores nothing.
//!
//! Each invalidation bumps the user's generation. A read that captured the
//! generation before querying stores its result only if no invalidation ran
//! in between, so a page read before a write is never cached after it.

use serde::{Serialize, de::DeserializeOwned};
use sha2::{Digest, Sha256};
use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
    time::{Duration, Instant},
};

/// Upper bound on stored entries; expired entries are purged when reached
const MAX_ENTRIES: usize = 10_000;

struct CacheEntry {
    stored_at: Instant,
    value: serde_json::Value,
}

#[derive(Default)]
struct Store {
    entries: HashMap<String, CacheEntry>,
    generations: HashMap<i64, u64>,
}

impl Store {
    fn put(&mut self, key: String, value: serde_json::Value, ttl: Duration) {
        if self.entries.len() >= MAX_ENTRIES {
            self.entries.retain(|_, e| e.stored_at.elapsed() <= ttl);
            if self.entries.len() >= MAX_ENTRIES {
                self.entries.clear();
            }
        }
        self.entries.insert(
            key,
            CacheEntry {
                stored_at: Instant::now(),
                value,
            },
        );
    }
}

pub struct ResponseCache {
    enabled: bool,
    ttl: Duration,
    store: Mutex<Store>,
}

impl ResponseCache {
    pub fn new(enabled: bool, ttl: Duration) -> Self {
        Self {
            enabled,
            ttl,
            store: Mutex::new(Store::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn disabled() -> Self {
        Self::new(false, Duration::ZERO)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Cached value under `key`, if present, fresh and decodable as `T`
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if !self.enabled {
            return None;
        }

        let mut store = self.lock();
        let entry = store.entries.get(key)?;
        if entry.stored_at.elapsed() > self.ttl {
            store.entries.remove(key);
            return None;
        }
        serde_json::from_value(entry.value.clone()).ok()
    }

    pub fn insert<T: Serialize>(&self, key: String, value: &T) {
        if !self.enabled {
            return;
        }
        let Ok(value) = serde_json::to_value(value) else {
            return;
        };

        self.lock().put(key, value, self.ttl);
    }

    /// Current invalidation generation of `user_id`, captured before a read
    pub fn generation(&self, user_id: i64) -> u64 {
        self.lock().generations.get(&user_id).copied().unwrap_or(0)
    }

    /// Store `value` unless `user_id` was invalidated since `generation`
    pub fn insert_if_current<T: Serialize>(
        &self,
        user_id: i64,
        generation: u64,
        key: String,
        value: &T,
    ) -> bool {
        if !self.enabled {
            return false;
        }
        let Ok(value) = serde_json::to_value(value) else {
            return false;
        };

        let mut store = self.lock();
        if store.generations.get(&user_id).copied().unwrap_or(0) != generation {
            return false;
        }
        store.put(key, value, self.ttl);
        true
    }

    /// Drop every entry whose key starts with `prefix`
    pub fn invalidate_prefix(&self, prefix: &str) {
        self.lock().entries.retain(|key, _| !key.starts_with(prefix));
    }

    /// Drop all cached bet reads of one user
    pub fn invalidate_user(&self, user_id: i64) {
        let list_prefix = format!("user_bets:{user_id}:");
        let bet_prefix = format!("bet:{user_id}:");

        let mut store = self.lock();
        *store.generations.entry(user_id).or_insert(0) += 1;
        store
            .entries
            .retain(|key, _| !key.starts_with(&list_prefix) && !key.starts_with(&bet_prefix));
    }

    /// Remove expired entries, returning how many were dropped
    pub fn purge_expired(&self) -> usize {
        let ttl = self.ttl;
        let mut store = self.lock();
        let before = store.entries.len();
        store.entries.retain(|_, e| e.stored_at.elapsed() <= ttl);
        before - store.entries.len()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Key of a bet list query; parameter order does not matter
pub fn user_bets_key(user_id: i64, params: &HashMap<String, String>) -> String {
    let mut pairs: Vec<_> = params.iter().collect();
    pairs.sort();

    let mut hasher = Sha256::new();
    for (k, v) in pairs {
        hasher.update(k.as_bytes());
        hasher.update(b"=");
        hasher.update(v.as_bytes());
        hasher.update(b"&");
    }
    format!("user_bets:{user_id}:{}", hex::encode(hasher.finalize()))
}

pub fn bet_key(user_id: i64, bet_id: i64) -> String {
    format!("bet:{user_id}:{bet_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_insert_and_get() {
        let cache = ResponseCache::new(true, Duration::from_secs(60));
        cache.insert(bet_key(1, 2), &vec![1, 2, 3]);
        assert_eq!(cache.get::<Vec<i32>>(&bet_key(1, 2)), Some(vec![1, 2, 3]));
        assert_eq!(cache.get::<Vec<i32>>(&bet_key(1, 3)), None);
    }

    #[test]
    fn test_disabled_cache_stores_nothing() {
        let cache = ResponseCache::disabled();
        cache.insert(bet_key(1, 2), &"value");
        assert!(cache.is_empty());
        assert_eq!(cache.get::<String>(&bet_key(1, 2)), None);
    }

    #[test]
    fn test_expired_entry_is_not_served() {
        let cache = ResponseCache::new(true, Duration::ZERO);
        cache.insert(bet_key(1, 2), &"value");
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get::<String>(&bet_key(1, 2)), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_purge_expired() {
        let cache = ResponseCache::new(true, Duration::ZERO);
        cache.insert(bet_key(1, 1), &1);
        cache.insert(bet_key(1, 2), &2);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.purge_expired(), 2);
    }

    #[test]
    fn test_invalidate_user_is_scoped() {
        let cache = ResponseCache::new(true, Duration::from_secs(60));
        cache.insert(user_bets_key(1, &params(&[])), &1);
        cache.insert(bet_key(1, 5), &1);
        cache.insert(bet_key(12, 5), &1);
        cache.insert(user_bets_key(12, &params(&[])), &1);

        cache.invalidate_user(1);

        assert_eq!(cache.len(), 2);
        assert!(cache.get::<i32>(&bet_key(12, 5)).is_some());
    }

    #[test]
    fn test_read_overtaken_by_invalidation_is_not_cached() {
        let cache = ResponseCache::new(true, Duration::from_secs(60));
        let key = user_bets_key(7, &params(&[]));

        // Read starts, then a placement invalidates before the read stores
        let generation = cache.generation(7);
        cache.invalidate_user(7);
        assert!(!cache.insert_if_current(7, generation, key.clone(), &"stale page"));
        assert_eq!(cache.get::<String>(&key), None);

        let generation = cache.generation(7);
        assert!(cache.insert_if_current(7, generation, key.clone(), &"fresh page"));
        assert_eq!(cache.get::<String>(&key).as_deref(), Some("fresh page"));
    }

    #[test]
    fn test_invalidation_of_other_user_keeps_generation() {
        let cache = ResponseCache::new(true, Duration::from_secs(60));
        let generation = cache.generation(1);
        cache.invalidate_user(2);
        assert!(cache.insert_if_current(1, generation, bet_key(1, 9), &9));
    }

    #[test]
    fn test_query_key_ignores_parameter_order() {
        let a = params(&[("status", "pending"), ("page", "2")]);
        let b = params(&[("page", "2"), ("status", "pending")]);
        assert_eq!(user_bets_key(3, &a), user_bets_key(3, &b));
        assert_ne!(
            user_bets_key(3, &a),
            user_bets_key(3, &params(&[("status", "won")]))
        );
        assert!(user_bets_key(3, &a).starts_with("user_bets:3:"));
    }
}
