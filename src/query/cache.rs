use std::num::NonZeroUsize;
use lru::LruCache;
use serde::Serialize;
use crate::query::types::QueryType;
use crate::search::results::QueryHit;

/// Key for one cached result set. `generation` is the engine's mutation
/// counter at execution time, so entries computed against older state can
/// never be served again; they simply age out of the LRU.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct QueryKey {
    pub query: String,
    pub query_type: QueryType,
    pub limit: usize,
    pub generation: u64,
}

/// LRU cache of ranked result sets.
pub struct QueryCache {
    cache: LruCache<QueryKey, Vec<QueryHit>>,
    capacity: usize,
    hit_count: u64,
    miss_count: u64,
}

impl QueryCache {
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).unwrap();
        QueryCache {
            cache: LruCache::new(cap),
            capacity: capacity.max(1),
            hit_count: 0,
            miss_count: 0,
        }
    }

    pub fn get(&mut self, key: &QueryKey) -> Option<Vec<QueryHit>> {
        if let Some(results) = self.cache.get(key) {
            self.hit_count += 1;
            Some(results.clone())
        } else {
            self.miss_count += 1;
            None
        }
    }

    pub fn put(&mut self, key: QueryKey, results: Vec<QueryHit>) {
        self.cache.put(key, results);
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hit_count: self.hit_count,
            miss_count: self.miss_count,
            size: self.cache.len(),
            capacity: self.capacity,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub hit_count: u64,
    pub miss_count: u64,
    pub size: usize,
    pub capacity: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hit_count + self.miss_count;
        if total == 0 {
            0.0
        } else {
            self.hit_count as f64 / total as f64
        }
    }
}
