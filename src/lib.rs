pub mod core;
pub mod analysis;
pub mod scoring;
pub mod mmap;
pub mod storage;
pub mod index;
pub mod query;
pub mod search;

pub use crate::core::config::Config;
pub use crate::core::engine::SearchEngine;
pub use crate::core::error::{Error, ErrorKind, Result};
pub use crate::core::types::DocId;
pub use crate::query::types::QueryType;
pub use crate::scoring::fixed::Score;
pub use crate::search::executor::ScoringAlgorithm;
pub use crate::search::results::QueryHit;

/*
┌──────────────────────────────────────────────────────────────────────────┐
│                           OMESH CORE ARCHITECTURE                         │
└──────────────────────────────────────────────────────────────────────────┘

┌─────────────────────────────── CORE ─────────────────────────────────────┐
│  struct SearchEngine                                                      │
│  • config: Config             // tunables, JSON-loadable                  │
│  • store: DocStore            // docs.dat + docs.idx + wal.log            │
│  • index: InvertedIndex       // terms.fts + postings.fts + meta.fts      │
│  • parser: QueryParser        // text -> ParsedQuery                      │
│  • executor: QueryExecutor    // stateless AND/OR/PHRASE                  │
│  • cache: QueryCache          // LRU keyed on (query, generation)         │
│  • shutdown: Arc<AtomicBool>  // polled between requests                  │
└──────────────────────────────────────────────────────────────────────────┘

┌────────────────────────────── STORAGE ───────────────────────────────────┐
│  DocLog      append-only DOCD records, CRC32 payloads, DELETED flag       │
│  DocIndex    sorted DIDX doc_id -> offset, write buffer + rename merge    │
│  Wal         WAL\0 entries PUT/DELETE/COMMIT, replay stops at COMMIT      │
│  DocStore    WAL-first mutation discipline, tombstone bitmap (roaring)    │
└──────────────────────────────────────────────────────────────────────────┘

┌────────────────────────────── INDEXING ──────────────────────────────────┐
│  TermBuffer     arena + hash chains, one entry per (term, doc)            │
│  TermDict       mmap'd dictionary, offset table, (hash, bytes) bsearch    │
│  InvertedIndex  flush = two-pointer merge into side files + rename        │
└──────────────────────────────────────────────────────────────────────────┘

┌─────────────────────────────── SEARCH ───────────────────────────────────┐
│  tokenizer   UTF-8 word runs, lowercase fold, 0-based positions           │
│  scoring     24.8 fixed point log2 / TF-IDF / BM25 normalise              │
│  executor    posting cursors, lock-step AND, k-way OR, anchor PHRASE      │
│  results     TopKCollector: score desc, doc_id asc                        │
└──────────────────────────────────────────────────────────────────────────┘

Ingest:  bytes ──tokenizer──> TermBuffer ──flush──> terms/postings.fts
         payload ──DocStore──> docs.dat (WAL first, index after)
Query:   text ──tokenizer──> terms ──lookup──> cursors ──scorer──> top-K
*/
