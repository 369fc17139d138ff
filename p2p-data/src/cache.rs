use parking_lot::Mutex;
use std::{
    collections::HashMap,
    hash::Hash,
    time::{Duration, Instant},
};

/// Shortest and longest allowed lifetime of a cached load.
pub const MIN_TTL: Duration = Duration::from_secs(60);
pub const MAX_TTL: Duration = Duration::from_secs(300);

/// Map whose entries expire a fixed time after insertion.
///
/// Expired entries are dropped lazily on lookup.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: Mutex<HashMap<K, (Instant, V)>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    pub fn insert(&self, key: K, value: V) {
        self.insert_at(key, value, Instant::now());
    }

    fn get_at(&self, key: &K, now: Instant) -> Option<V> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some((inserted, value)) if now.duration_since(*inserted) < self.ttl => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn insert_at(&self, key: K, value: V, now: Instant) {
        self.entries.lock().insert(key, (now, value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_expire_after_ttl() {
        struct TestCase {
            elapsed: Duration,
            expected: Option<u32>,
        }

        let tests = vec![
            TestCase {
                // TC0: fresh
                elapsed: Duration::ZERO,
                expected: Some(7),
            },
            TestCase {
                // TC1: just before expiry
                elapsed: Duration::from_secs(59),
                expected: Some(7),
            },
            TestCase {
                // TC2: at expiry
                elapsed: Duration::from_secs(60),
                expected: None,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let cache = TtlCache::new(MIN_TTL);
            let inserted = Instant::now();
            cache.insert_at("series", 7, inserted);

            let actual = cache.get_at(&"series", inserted + test.elapsed);
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_expired_entry_is_removed() {
        let cache = TtlCache::new(MIN_TTL);
        let inserted = Instant::now();
        cache.insert_at("series", 7, inserted);

        assert_eq!(cache.get_at(&"series", inserted + MAX_TTL), None);
        assert!(cache.entries.lock().is_empty());
    }

    #[test]
    fn test_keys_are_independent() {
        let cache = TtlCache::new(MIN_TTL);
        cache.insert("a", 1);
        cache.insert("b", 2);

        assert_eq!(cache.get(&"a"), Some(1));
        assert_eq!(cache.get(&"b"), Some(2));
        assert_eq!(cache.get(&"c"), None);
    }
}
