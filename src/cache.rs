use std::fmt;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use bytes::Bytes;
use rustc_hash::FxHashMap;
use tokio::time::Instant;

/// 查询指纹 (qname, qtype)，以 "name:type" 形式作为键。
/// Query fingerprint, rendered as `"name:type"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(qname: &str, qtype: u16) -> Self {
        Self(format!("{}:{}", qname, qtype))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub bytes: Bytes,
    pub inserted_at: Instant,
    pub ttl: Duration,
}

impl CacheEntry {
    /// Stale once `ttl` or more has elapsed since insertion.
    #[inline]
    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.inserted_at) >= self.ttl
    }
}

/// 应答缓存：单把读写锁保护整个映射，惰性过期。
/// Response cache behind a single reader/writer lock with lazy expiry.
///
/// Entries are replaced whole and never edited in place, so a poisoned lock
/// still guards a consistent map and is recovered rather than propagated.
#[derive(Debug, Default)]
pub struct ResponseCache {
    entries: RwLock<FxHashMap<CacheKey, CacheEntry>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the entry whether or not it is stale; the caller decides.
    pub fn lookup(&self, key: &CacheKey) -> Option<CacheEntry> {
        let map = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        map.get(key).cloned()
    }

    pub fn invalidate(&self, key: &CacheKey) {
        let mut map = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        map.remove(key);
    }

    /// Store a private copy of `bytes`, replacing any entry under `key`.
    pub fn insert(&self, key: CacheKey, bytes: &[u8], ttl: Duration) {
        let entry = CacheEntry {
            bytes: Bytes::copy_from_slice(bytes),
            inserted_at: Instant::now(),
            ttl,
        };
        let mut map = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        map.insert(key, entry);
    }

    /// 清理所有已过期条目，返回清理数量 / Drop every stale entry.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut map = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = map.len();
        map.retain(|_, entry| !entry.is_expired(now));
        before - map.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
