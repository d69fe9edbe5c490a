//! Per-request cache of combined rule sets.
//!
//! Keyed by `(actor fingerprint, action)`. Values are combined rule sets,
//! not decisions, since a decision also depends on the target resource.
//! A cache lives inside one [`crate::ResolutionScope`] and is dropped with
//! it, so nothing is shared between upstream requests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::combiner::CombinedRules;

type CacheKey = (String, String);

#[derive(Debug)]
struct CacheEntry {
    rules: Arc<CombinedRules>,
    inserted_at: Instant,
}

/// Hit and miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that required collection.
    pub misses: u64,
}

/// Concurrency-safe rule set cache.
#[derive(Debug, Default)]
pub struct DecisionCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    ttl: Option<Duration>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl DecisionCache {
    /// Create a cache whose entries live as long as the cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cache whose entries expire after `ttl`.
    pub fn with_ttl(ttl: Option<Duration>) -> Self {
        Self {
            ttl,
            ..Default::default()
        }
    }

    /// Look up the rule set for `(fingerprint, action)`.
    pub async fn get(&self, fingerprint: &str, action: &str) -> Option<Arc<CombinedRules>> {
        let key = (fingerprint.to_string(), action.to_string());
        let found = {
            let entries = self.entries.read().await;
            entries
                .get(&key)
                .filter(|entry| !self.is_expired(entry))
                .map(|entry| entry.rules.clone())
        };

        match found {
            Some(rules) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(rules)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store the rule set for `(fingerprint, action)`.
    pub async fn insert(&self, fingerprint: &str, action: &str, rules: Arc<CombinedRules>) {
        let mut entries = self.entries.write().await;
        entries.insert(
            (fingerprint.to_string(), action.to_string()),
            CacheEntry {
                rules,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Drop every entry.
    pub async fn invalidate(&self) {
        self.entries.write().await.clear();
    }

    /// Drop the entries of one actor.
    pub async fn invalidate_actor(&self, fingerprint: &str) {
        self.entries.write().await.retain(|(fp, _), _| fp != fingerprint);
    }

    /// Number of stored entries, expired ones included.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Check if empty.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Current counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn is_expired(&self, entry: &CacheEntry) -> bool {
        self.ttl.is_some_and(|ttl| entry.inserted_at.elapsed() >= ttl)
    }
}
