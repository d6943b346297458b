use serde::Serialize;
use crate::query::cache::CacheStats;

/// Point-in-time engine statistics for monitoring collaborators.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub uptime_secs: u64,

    // Collection
    pub total_docs: u64,
    pub deleted_docs: u64,
    pub total_terms: u64,
    pub total_tokens: u64,

    // Storage footprint
    pub doc_log_bytes: u64,
    pub index_bytes: u64,
    pub wal_bytes: u64,

    // Activity
    pub query_count: u64,
    pub write_count: u64,
    pub cache: CacheStats,
}
