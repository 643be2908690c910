//! Fragment cache consulted before the database.
//!
//! Entries are the JSON-serialised fragment rows keyed by table and natural
//! key. Fragments never change once written, so a cached row is always
//! correct until it expires.

use anyhow::Result;
use async_trait::async_trait;
use proofgen_assembler::FragmentKind;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Key/value cache of fragment rows.
#[async_trait]
pub trait StateCache: Send + Sync {
    /// Cached rows for `keys`; missing or expired keys are absent.
    async fn get_many(&self, kind: FragmentKind, keys: &[String]) -> Result<HashMap<String, String>>;

    /// Store rows.
    async fn put_many(&self, kind: FragmentKind, entries: Vec<(String, String)>) -> Result<()>;
}

type CacheKey = (FragmentKind, String);

#[derive(Debug)]
struct Entry {
    value: String,
    inserted: Instant,
    seq: u64,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<CacheKey, Entry>,
    order: VecDeque<(u64, CacheKey)>,
    next_seq: u64,
}

impl Inner {
    fn evict(&mut self, max_entries: usize) {
        while self.entries.len() > max_entries {
            let Some((seq, key)) = self.order.pop_front() else {
                break;
            };
            if self.entries.get(&key).is_some_and(|entry| entry.seq == seq) {
                self.entries.remove(&key);
            }
        }

        // Drop order records superseded by re-insertions.
        if self.order.len() > max_entries.saturating_mul(2) {
            let entries = &self.entries;
            self.order
                .retain(|(seq, key)| entries.get(key).is_some_and(|entry| entry.seq == *seq));
        }
    }
}

/// Process-local cache with a TTL and a size bound.
///
/// When full, the oldest inserted entries are evicted first.
#[derive(Debug)]
pub struct InMemoryStateCache {
    inner: Mutex<Inner>,
    ttl: Duration,
    max_entries: usize,
}

impl InMemoryStateCache {
    /// Empty cache.
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            ttl,
            max_entries,
        }
    }

    /// Number of entries held, expired ones included.
    pub fn len(&self) -> usize {
        self.with_inner(|inner| inner.entries.len())
    }

    /// True if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn with_inner<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}

#[async_trait]
impl StateCache for InMemoryStateCache {
    async fn get_many(&self, kind: FragmentKind, keys: &[String]) -> Result<HashMap<String, String>> {
        let now = Instant::now();
        let ttl = self.ttl;

        Ok(self.with_inner(|inner| {
            let mut found = HashMap::new();
            for key in keys {
                let cache_key = (kind, key.clone());
                match inner.entries.get(&cache_key) {
                    Some(entry) if now.duration_since(entry.inserted) < ttl => {
                        found.insert(key.clone(), entry.value.clone());
                    }
                    Some(_) => {
                        inner.entries.remove(&cache_key);
                    }
                    None => {}
                }
            }
            found
        }))
    }

    async fn put_many(&self, kind: FragmentKind, entries: Vec<(String, String)>) -> Result<()> {
        let now = Instant::now();
        let max_entries = self.max_entries;

        self.with_inner(|inner| {
            for (key, value) in entries {
                let seq = inner.next_seq;
                inner.next_seq += 1;
                inner.order.push_back((seq, (kind, key.clone())));
                inner.entries.insert(
                    (kind, key),
                    Entry {
                        value,
                        inserted: now,
                        seq,
                    },
                );
            }
            inner.evict(max_entries);
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(keys: &[&str]) -> Vec<(String, String)> {
        keys.iter().map(|k| (k.to_string(), format!("row-{}", k))).collect()
    }

    #[tokio::test]
    async fn test_hit_and_miss() {
        let cache = InMemoryStateCache::new(Duration::from_secs(60), 10);
        cache.put_many(FragmentKind::Agg, pairs(&["h1"])).await.unwrap();

        let found = cache
            .get_many(FragmentKind::Agg, &["h1".to_string(), "h2".to_string()])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found["h1"], "row-h1");

        // Same key in another table is a different entry.
        let other = cache.get_many(FragmentKind::Cal, &["h1".to_string()]).await.unwrap();
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn test_expired_entries_dropped() {
        let cache = InMemoryStateCache::new(Duration::from_millis(1), 10);
        cache.put_many(FragmentKind::Cal, pairs(&["a1"])).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let found = cache.get_many(FragmentKind::Cal, &["a1".to_string()]).await.unwrap();
        assert!(found.is_empty());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_oldest_evicted_when_full() {
        let cache = InMemoryStateCache::new(Duration::from_secs(60), 2);
        cache.put_many(FragmentKind::Agg, pairs(&["h1", "h2"])).await.unwrap();
        cache.put_many(FragmentKind::Agg, pairs(&["h1"])).await.unwrap();
        cache.put_many(FragmentKind::Agg, pairs(&["h3"])).await.unwrap();

        assert_eq!(cache.len(), 2);
        let found = cache
            .get_many(
                FragmentKind::Agg,
                &["h1".to_string(), "h2".to_string(), "h3".to_string()],
            )
            .await
            .unwrap();
        assert!(found.contains_key("h1"));
        assert!(!found.contains_key("h2"));
        assert!(found.contains_key("h3"));
    }
}
