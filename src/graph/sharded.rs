//! Bucketed concurrent map. A fixed array of independently locked buckets
//! keyed by a stable hash, so updates to unrelated keys never contend on
//! the same mutex. No cross-bucket operation is exposed.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use xxhash_rust::xxh3::Xxh3;

pub const DEFAULT_BUCKETS: usize = 1024;

pub struct ShardedMap<K, V> {
    buckets: Vec<Mutex<HashMap<K, V>>>,
}

impl<K: Hash + Eq + Clone, V: Clone> ShardedMap<K, V> {
    /// Create a map with `num_buckets` buckets, rounded up to a power of two.
    pub fn new(num_buckets: usize) -> Self {
        let n = num_buckets.max(1).next_power_of_two();
        Self { buckets: (0..n).map(|_| Mutex::new(HashMap::new())).collect() }
    }

    fn bucket_of(&self, key: &K) -> usize {
        // xxh3 rather than the default SipHash: stable across processes, so
        // bucket placement survives a snapshot/reload cycle.
        let mut h = Xxh3::new();
        key.hash(&mut h);
        (h.finish() as usize) & (self.buckets.len() - 1)
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.buckets[self.bucket_of(key)].lock().get(key).cloned()
    }

    pub fn set(&self, key: K, value: V) {
        let i = self.bucket_of(&key);
        self.buckets[i].lock().insert(key, value);
    }

    pub fn delete(&self, key: &K) -> bool {
        self.buckets[self.bucket_of(key)].lock().remove(key).is_some()
    }

    /// Fetch the value for `key`, inserting the result of `make` first when
    /// absent. Returns the value and whether this call created it.
    pub fn get_or_insert_with(&self, key: K, make: impl FnOnce() -> V) -> (V, bool) {
        let i = self.bucket_of(&key);
        let mut bucket = self.buckets[i].lock();
        if let Some(v) = bucket.get(&key) {
            return (v.clone(), false);
        }
        let v = make();
        bucket.insert(key, v.clone());
        (v, true)
    }

    pub fn len(&self) -> usize { self.buckets.iter().map(|b| b.lock().len()).sum() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Copy out every entry, bucket by bucket. Each bucket is internally
    /// consistent; the collection as a whole is not a point-in-time snapshot.
    pub fn snapshot(&self) -> Vec<(K, V)> {
        let mut out = Vec::with_capacity(self.len());
        for bucket in &self.buckets {
            for (k, v) in bucket.lock().iter() {
                out.push((k.clone(), v.clone()));
            }
        }
        out
    }
}

#[cfg(test)]
#[path = "sharded_tests.rs"]
mod sharded_tests;
