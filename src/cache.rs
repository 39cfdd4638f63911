//! Process-wide memo of successful tool results.
//!
//! Entries are evicted on LRU pressure or once their TTL has passed, whichever
//! comes first. Writes elsewhere never invalidate entries; readers accept a
//! staleness window of one TTL.
//!
//! There is no single-flight: two concurrent misses for the same key both run
//! the tool and the last insert wins.

use lru::LruCache;
use parking_lot::Mutex;
use serde_json::Value;
use std::fmt::Write as _;
use std::num::NonZeroUsize;
use std::time::Duration;
use tokio::time::Instant;

const DEFAULT_MAX_ENTRIES: usize = 100;
const DEFAULT_TTL_SECS: u64 = 300;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_entries: NonZeroUsize,
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: NonZeroUsize::new(DEFAULT_MAX_ENTRIES).unwrap_or(NonZeroUsize::MIN),
            ttl: Duration::from_secs(DEFAULT_TTL_SECS),
        }
    }
}

struct Entry {
    value: Value,
    inserted_at: Instant,
}

pub struct ToolCache {
    entries: Mutex<LruCache<String, Entry>>,
    ttl: Duration,
}

impl Default for ToolCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl ToolCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(config.max_entries)),
            ttl: config.ttl,
        }
    }

    /// Returns a clone of the cached value, dropping it instead if expired.
    pub fn get(&self, key: &str) -> Option<Value> {
        let mut entries = self.entries.lock();
        let expired = match entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => {
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        None
    }

    pub fn insert(&self, key: String, value: Value) {
        self.entries.lock().put(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// `tool:` followed by the arguments serialized with object keys sorted at
/// every depth, so key order in the request never changes the key.
pub fn cache_key(tool: &str, args: &Value) -> String {
    let mut key = String::with_capacity(tool.len() + 64);
    key.push_str(tool);
    key.push(':');
    write_canonical(&mut key, args);
    key
}

fn write_canonical(out: &mut String, value: &Value) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (index, key) in keys.into_iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                let _ = write!(out, "{}", Value::String(key.clone()));
                out.push(':');
                if let Some(child) = map.get(key) {
                    write_canonical(out, child);
                }
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical(out, item);
            }
            out.push(']');
        }
        scalar => {
            let _ = write!(out, "{scalar}");
        }
    }
}
