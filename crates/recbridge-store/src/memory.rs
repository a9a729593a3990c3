//! In-memory implementation of the cache-store port
//!
//! A `DashMap`-backed store for tests and single-process deployments.
//! Expiry is checked lazily on access; the glob matcher supports `*` and
//! `?` like the SQLite backend's `GLOB`.

use std::time::{Duration, Instant};

use dashmap::DashMap;

use recbridge_core::ports::cache_store::ICacheStore;

/// One stored entry
#[derive(Debug, Clone)]
enum Slot {
    Bytes(Vec<u8>),
    Counter(i64),
}

#[derive(Debug, Clone)]
struct Entry {
    slot: Slot,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at.map_or(false, |at| at <= Instant::now())
    }
}

/// Process-local cache store
#[derive(Default)]
pub struct MemoryCacheStore {
    entries: DashMap<String, Entry>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn live(&self, key: &str) -> Option<Entry> {
        let entry = self.entries.get(key)?.clone();
        if entry.is_expired() {
            self.entries.remove(key);
            return None;
        }
        Some(entry)
    }
}

#[async_trait::async_trait]
impl ICacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(match self.live(key) {
            Some(Entry {
                slot: Slot::Bytes(bytes),
                ..
            }) => Some(bytes),
            _ => None,
        })
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> anyhow::Result<()> {
        self.entries.insert(
            key.to_string(),
            Entry {
                slot: Slot::Bytes(value.to_vec()),
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<bool> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn delete_pattern(&self, pattern: &str) -> anyhow::Result<u64> {
        let matching: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| glob_match(pattern, entry.key()))
            .map(|entry| entry.key().clone())
            .collect();

        let mut deleted = 0;
        for key in matching {
            if self.entries.remove(&key).is_some() {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn exists(&self, key: &str) -> anyhow::Result<bool> {
        Ok(self.live(key).is_some())
    }

    async fn increment(&self, key: &str, amount: i64) -> anyhow::Result<i64> {
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry {
                slot: Slot::Counter(0),
                expires_at: None,
            });

        if entry.is_expired() {
            *entry = Entry {
                slot: Slot::Counter(0),
                expires_at: None,
            };
        }

        match &mut entry.slot {
            Slot::Counter(value) => {
                *value += amount;
                Ok(*value)
            }
            Slot::Bytes(_) => anyhow::bail!("key '{key}' holds a non-counter value"),
        }
    }

    async fn set_expiry(&self, key: &str, ttl: Duration) -> anyhow::Result<bool> {
        match self.entries.get_mut(key) {
            Some(mut entry) if !entry.is_expired() => {
                entry.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// Glob matching with `*` (any run) and `?` (any single character)
fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    glob_match_at(&pattern, 0, &text, 0)
}

fn glob_match_at(pattern: &[char], p: usize, text: &[char], t: usize) -> bool {
    if p == pattern.len() {
        return t == text.len();
    }
    match pattern[p] {
        '*' => {
            // Greedily collapse consecutive stars, then try every split.
            if p + 1 < pattern.len() && pattern[p + 1] == '*' {
                return glob_match_at(pattern, p + 1, text, t);
            }
            (t..=text.len()).any(|split| glob_match_at(pattern, p + 1, text, split))
        }
        '?' => t < text.len() && glob_match_at(pattern, p + 1, text, t + 1),
        c => t < text.len() && text[t] == c && glob_match_at(pattern, p + 1, text, t + 1),
    }
}
