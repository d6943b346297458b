use std::fs;
use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use crate::core::error::Result;
use crate::search::executor::ScoringAlgorithm;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding docs.dat, docs.idx, wal.log and the .fts files.
    pub data_dir: PathBuf,

    /// Hard cap on a single document payload.
    pub max_doc_size: usize,
    /// In-memory doc-index entries held before a merge is forced.
    pub doc_index_buffer_cap: usize,

    /// Term-buffer entries held before a flush is forced.
    pub term_buffer_cap: usize,
    /// Buckets in the term-buffer hash table.
    pub hash_buckets: usize,
    /// Hard ceiling on stored positions per (term, document). Occurrences
    /// beyond it still count toward term frequency but their positions are
    /// dropped with a logged warning.
    pub position_cap: usize,
    /// Longest token kept, in bytes; longer tokens are truncated.
    pub max_token_bytes: usize,

    /// Terms accepted per query; extras are silently dropped.
    pub max_query_terms: usize,
    /// Upper bound on results returned by a single query.
    pub max_results: usize,
    /// Largest on-disk posting list a query may materialise.
    pub posting_scratch_cap: usize,
    pub scoring: ScoringAlgorithm,
    /// Cached query result sets.
    pub cache_entries: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: PathBuf::from("./data"),
            max_doc_size: 16 * 1024 * 1024,
            doc_index_buffer_cap: 1024,
            term_buffer_cap: 65536,
            hash_buckets: 4096,
            position_cap: 64,
            max_token_bytes: 255,
            max_query_terms: 16,
            max_results: 1000,
            posting_scratch_cap: 256 * 1024,
            scoring: ScoringAlgorithm::TfIdf,
            cache_entries: 256,
        }
    }
}

impl Config {
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Config {
            data_dir: dir.into(),
            ..Default::default()
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = fs::read(path)?;
        let config = serde_json::from_slice(&data)?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let data = serde_json::to_vec_pretty(self)?;
        fs::write(path, data)?;
        Ok(())
    }
}
