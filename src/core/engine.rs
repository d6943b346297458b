use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use crate::core::config::Config;
use crate::core::error::{ErrorKind, Result};
use crate::core::stats::EngineStats;
use crate::core::types::DocId;
use crate::index::inverted::InvertedIndex;
use crate::query::cache::{QueryCache, QueryKey};
use crate::query::parser::QueryParser;
use crate::query::types::QueryType;
use crate::search::executor::{ExecutionConfig, QueryExecutor};
use crate::search::results::QueryHit;
use crate::storage::doc_store::DocStore;
use crate::storage::layout::StorageLayout;

/// One search engine instance: document store, inverted index, query
/// machinery and a result cache behind a single handle.
///
/// The engine is strictly single-threaded; collaborators drive it from one
/// event loop and poll `shutdown_requested` between requests. `open` runs
/// WAL recovery before returning, so a handle is always consistent.
pub struct SearchEngine {
    config: Config,
    store: DocStore,
    index: InvertedIndex,
    parser: QueryParser,
    executor: QueryExecutor,
    exec_config: ExecutionConfig,
    cache: QueryCache,
    shutdown: Arc<AtomicBool>,

    start_time: Instant,
    generation: u64,
    query_count: u64,
    write_count: u64,
}

impl SearchEngine {
    pub fn open(config: Config) -> Result<Self> {
        let layout = StorageLayout::new(config.data_dir.clone())?;
        let mut store = DocStore::open(&layout, &config)?;
        let mut index = InvertedIndex::open(&layout, &config)?;
        Self::reindex_tail(&mut store, &mut index)?;
        log::info!(
            "engine open: {} docs, {} terms on disk",
            store.live_docs(),
            index.term_count()
        );

        let parser = QueryParser::new(config.max_query_terms, config.max_token_bytes);
        let exec_config = ExecutionConfig {
            scoring: config.scoring,
            max_results: config.max_results,
        };
        let cache = QueryCache::new(config.cache_entries);

        Ok(SearchEngine {
            store,
            index,
            parser,
            executor: QueryExecutor::new(),
            exec_config,
            cache,
            shutdown: Arc::new(AtomicBool::new(false)),
            start_time: Instant::now(),
            generation: 0,
            query_count: 0,
            write_count: 0,
            config,
        })
    }

    /// Re-index documents that outlived a crash through the WAL but never
    /// reached an index flush. The index's persisted `last_doc_id` marks
    /// the flush frontier; everything live past it is replayed into the
    /// ingest buffer.
    fn reindex_tail(store: &mut DocStore, index: &mut InvertedIndex) -> Result<()> {
        let start = index.meta().last_doc_id + 1;
        let mut replayed = 0u64;
        for id in start..store.next_doc_id() {
            let doc_id = DocId(id);
            if store.is_deleted(doc_id) {
                continue;
            }
            match store.get(doc_id) {
                Ok(payload) => {
                    index.add(doc_id, &payload)?;
                    replayed += 1;
                }
                Err(e) if e.kind == ErrorKind::NotFound => {}
                Err(e) if e.kind == ErrorKind::Corrupt => {
                    log::warn!("skipping corrupt document {} during re-index", doc_id);
                }
                Err(e) => return Err(e),
            }
        }
        if replayed > 0 {
            log::info!("re-indexed {} unflushed documents", replayed);
        }
        Ok(())
    }

    /// Store and index one document.
    pub fn put(&mut self, content: &[u8]) -> Result<DocId> {
        let (doc_id, _offset) = self.store.put(content)?;
        self.index.add(doc_id, content)?;
        self.write_count += 1;
        self.generation += 1;
        Ok(doc_id)
    }

    pub fn get(&mut self, doc_id: DocId) -> Result<Vec<u8>> {
        self.store.get(doc_id)
    }

    /// Tombstone a document; it stops matching immediately.
    pub fn delete(&mut self, doc_id: DocId) -> Result<()> {
        self.store.delete(doc_id)?;
        self.write_count += 1;
        self.generation += 1;
        Ok(())
    }

    /// Ranked search over the index.
    pub fn search(
        &mut self,
        text: &str,
        query_type: QueryType,
        limit: usize,
    ) -> Result<Vec<QueryHit>> {
        self.query_count += 1;
        let query = self.parser.parse(text, query_type)?;
        let key = QueryKey {
            query: text.to_string(),
            query_type,
            limit,
            generation: self.generation,
        };
        if let Some(hits) = self.cache.get(&key) {
            return Ok(hits);
        }
        let hits = self.executor.execute(
            &self.index,
            &mut self.store,
            &query,
            limit,
            &self.exec_config,
        )?;
        self.cache.put(key, hits.clone());
        Ok(hits)
    }

    /// Merge the index ingest buffer to disk.
    pub fn flush(&mut self) -> Result<()> {
        self.index.flush()?;
        self.generation += 1;
        Ok(())
    }

    /// Make every component durable; the WAL is checkpointed and reset.
    pub fn sync(&mut self) -> Result<()> {
        self.store.sync()?;
        self.index.save()?;
        self.generation += 1;
        Ok(())
    }

    pub fn close(mut self) -> Result<()> {
        self.sync()
    }

    pub fn stats(&mut self) -> EngineStats {
        EngineStats {
            uptime_secs: self.start_time.elapsed().as_secs(),
            total_docs: self.store.live_docs(),
            deleted_docs: self.store.deleted_docs().len(),
            total_terms: self.index.term_count(),
            total_tokens: self.index.meta().total_tokens,
            doc_log_bytes: self.store.log_size(),
            index_bytes: self.index.size_bytes(),
            wal_bytes: self.store.wal_size(),
            query_count: self.query_count,
            write_count: self.write_count,
            cache: self.cache.stats(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Flag handle for the external signal layer.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Polled by the request loop between operations; in-flight work always
    /// runs to completion.
    pub fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}
