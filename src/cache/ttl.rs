//! Generic TTL cache-aside utility.
//!
//! Expiry is checked lazily on read - no background timer. This sits in
//! front of expensive store queries (models per manufacturer, id sets per
//! manufacturer) with TTLs from tens of seconds to minutes.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.inserted_at) > self.ttl
    }
}

pub struct TtlCache<K, V> {
    entries: Mutex<HashMap<K, CacheEntry<V>>>,
}

impl<K, V> Default for TtlCache<K, V> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached value unless it has expired. An expired entry
    /// is removed on the way out.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock();
        let now = Instant::now();

        match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn set(&self, key: K, value: V, ttl: Duration) {
        self.entries.lock().insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
                ttl,
            },
        );
    }

    pub fn invalidate(&self, key: &K) {
        self.entries.lock().remove(key);
    }

    pub fn invalidate_all(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get() {
        let cache: TtlCache<String, Vec<String>> = TtlCache::new();
        cache.set(
            "acme".to_string(),
            vec!["707".to_string()],
            Duration::from_secs(60),
        );
        assert_eq!(cache.get(&"acme".to_string()), Some(vec!["707".to_string()]));
        assert_eq!(cache.get(&"other".to_string()), None);
    }

    #[test]
    fn test_expiry_is_lazy() {
        let cache: TtlCache<&str, u32> = TtlCache::new();
        cache.set("k", 1, Duration::ZERO);
        assert_eq!(cache.len(), 1);

        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get(&"k"), None);
        // The expired entry was dropped by the read itself.
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_invalidate() {
        let cache: TtlCache<&str, u32> = TtlCache::new();
        cache.set("a", 1, Duration::from_secs(60));
        cache.set("b", 2, Duration::from_secs(60));

        cache.invalidate(&"a");
        assert_eq!(cache.get(&"a"), None);
        assert_eq!(cache.get(&"b"), Some(2));

        cache.invalidate_all();
        assert!(cache.is_empty());
    }
}
