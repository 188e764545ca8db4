//! Response cache
//!
//! Bounded map from (normalized message, normalized context) to the resolved
//! command. Entries expire after a fixed TTL and the oldest entry is evicted
//! first when the store is full.

use crate::config::CacheConfig;
use crate::types::{collapse_whitespace, RouteContext};
use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A cached resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    pub command: String,
    pub created_at: DateTime<Utc>,
}

/// Hit/miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    /// Keys in insertion order, oldest first
    order: VecDeque<String>,
    stats: CacheStats,
}

impl CacheInner {
    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
        Some(entry)
    }
}

/// Thread-safe bounded TTL cache.
pub struct ResponseCache {
    inner: Mutex<CacheInner>,
    capacity: usize,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(config: &CacheConfig) -> Self {
        let ttl_secs = i64::try_from(config.ttl_secs).unwrap_or(i64::MAX / 1000);
        Self {
            inner: Mutex::new(CacheInner::default()),
            capacity: config.capacity.max(1),
            ttl: Duration::seconds(ttl_secs),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cache key for a message in a context.
    ///
    /// Whitespace and case differences in the message do not change the key.
    pub fn key_for(message: &str, ctx: &RouteContext) -> String {
        let normalized = collapse_whitespace(message).to_lowercase();
        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        hasher.update([0x1f]);
        hasher.update(ctx.chat_id.as_bytes());
        hasher.update([0x1f]);
        hasher.update(ctx.repo().unwrap_or("").to_lowercase().as_bytes());
        hasher.update([0x1f]);
        hasher.update(ctx.company().unwrap_or("").to_lowercase().as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn get(&self, message: &str, ctx: &RouteContext) -> Option<String> {
        self.get_at(message, ctx, Utc::now())
    }

    /// Look up an entry as of `now`, dropping it if expired.
    pub fn get_at(&self, message: &str, ctx: &RouteContext, now: DateTime<Utc>) -> Option<String> {
        let key = Self::key_for(message, ctx);
        let mut inner = self.lock();

        let fresh = match inner.entries.get(&key) {
            Some(entry) => now - entry.created_at < self.ttl,
            None => {
                inner.stats.misses += 1;
                return None;
            }
        };

        if !fresh {
            inner.remove(&key);
            inner.stats.expirations += 1;
            inner.stats.misses += 1;
            tracing::debug!(key = %key, "Cache entry expired");
            return None;
        }

        inner.stats.hits += 1;
        inner.entries.get(&key).map(|e| e.command.clone())
    }

    pub fn insert(&self, message: &str, ctx: &RouteContext, command: &str) {
        self.insert_at(message, ctx, command, Utc::now());
    }

    /// Store a command, evicting the oldest entries once at capacity.
    pub fn insert_at(&self, message: &str, ctx: &RouteContext, command: &str, now: DateTime<Utc>) {
        let key = Self::key_for(message, ctx);
        let mut inner = self.lock();

        inner.remove(&key);
        while inner.entries.len() >= self.capacity {
            let Some(oldest) = inner.order.pop_front() else {
                break;
            };
            inner.entries.remove(&oldest);
            inner.stats.evictions += 1;
        }

        inner.order.push_back(key.clone());
        inner.entries.insert(
            key.clone(),
            CacheEntry {
                key,
                command: command.to_string(),
                created_at: now,
            },
        );
    }

    /// Drop a single entry.
    pub fn invalidate(&self, message: &str, ctx: &RouteContext) -> bool {
        let key = Self::key_for(message, ctx);
        self.lock().remove(&key).is_some()
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Utc::now())
    }

    pub fn purge_expired_at(&self, now: DateTime<Utc>) -> usize {
        let mut inner = self.lock();
        let expired: Vec<String> = inner
            .entries
            .values()
            .filter(|e| now - e.created_at >= self.ttl)
            .map(|e| e.key.clone())
            .collect();
        for key in &expired {
            inner.remove(key);
        }
        inner.stats.expirations += expired.len() as u64;
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.order.clear();
        tracing::info!("Response cache cleared");
    }
}
