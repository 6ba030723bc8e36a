use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use sha1::{Digest, Sha1};
use tokio::time::Instant;

use crate::models::ChatMessage;

/// Key-value store with a per-entry time to live. An expired entry is a miss
/// whether or not it has been purged yet.
pub trait Cache<V>: Send + Sync {
    fn get(&self, key: &str) -> Option<V>;
    fn set(&self, key: String, value: V, ttl: Duration);
    fn purge_expired(&self) -> usize;
}

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

pub struct MemoryCache<V> {
    entries: Mutex<HashMap<String, Entry<V>>>,
}

impl<V> MemoryCache<V> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Entry<V>>> {
        // A panic mid-insert cannot leave a HashMap half-written, so the
        // poisoned data is still usable.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V> Default for MemoryCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone + Send> Cache<V> for MemoryCache<V> {
    fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.entries();
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn set(&self, key: String, value: V, ttl: Duration) {
        let expires_at = Instant::now() + ttl;
        self.entries().insert(key, Entry { value, expires_at });
    }

    fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }
}

/// Content hash of the message plus the last two history turns.
pub fn cache_key(prefix: &str, message: &str, history: &[ChatMessage]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(message.as_bytes());
    let start = history.len().saturating_sub(2);
    for msg in &history[start..] {
        hasher.update(b"\x1f");
        hasher.update(msg.content.as_bytes());
    }
    format!("{prefix}:{:x}", hasher.finalize())
}
