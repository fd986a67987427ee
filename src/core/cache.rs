use std::{
    collections::HashMap,
    hash::Hash,
    time::{Duration, Instant},
};

use parking_lot::Mutex;

/// Small memoizing map whose entries expire after a fixed TTL.
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: Mutex<HashMap<K, (Instant, V)>>,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    fn get_at(&self, key: &K, now: Instant) -> Option<V> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some((stored_at, value)) if now.duration_since(*stored_at) < self.ttl => {
                Some(value.clone())
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: K, value: V) {
        self.entries.lock().insert(key, (Instant::now(), value));
    }

    pub fn invalidate(&self, key: &K) {
        self.entries.lock().remove(key);
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_fresh_entries() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.insert("currency", "NGN".to_string());
        assert_eq!(cache.get(&"currency"), Some("NGN".to_string()));
    }

    #[test]
    fn expires_entries_after_ttl() {
        let cache = TtlCache::new(Duration::from_secs(5));
        cache.insert("currency", "NGN".to_string());
        let later = Instant::now() + Duration::from_secs(6);
        assert_eq!(cache.get_at(&"currency", later), None);
        assert_eq!(cache.get(&"currency"), None);
    }

    #[test]
    fn invalidation_drops_entries() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.invalidate(&"a");
        assert_eq!(cache.get(&"a"), None);
        assert_eq!(cache.get(&"b"), Some(2));
        cache.clear();
        assert_eq!(cache.get(&"b"), None);
    }
}
