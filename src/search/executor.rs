use serde::{Deserialize, Serialize};
use crate::core::error::{ErrorKind, Result};
use crate::core::types::DocId;
use crate::index::inverted::InvertedIndex;
use crate::index::postings::Posting;
use crate::query::types::{MAX_RESULTS, ParsedQuery, QueryType};
use crate::scoring::fixed::Score;
use crate::scoring::scorer::{DocStats, bm25_normalise, tf_idf};
use crate::search::results::{QueryHit, TopKCollector};
use crate::storage::doc_store::DocStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoringAlgorithm {
    /// Pure TF-IDF in 24.8 fixed point.
    TfIdf,
    /// TF-IDF with BM25 length normalisation; document length is the
    /// payload byte count from the doc-log header.
    Bm25,
}

#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    pub scoring: ScoringAlgorithm,
    pub max_results: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig {
            scoring: ScoringAlgorithm::TfIdf,
            max_results: MAX_RESULTS,
        }
    }
}

/// Per-term posting stream with a cursor, materialised at execution start.
struct TermCursor {
    postings: Vec<Posting>,
    doc_freq: u64,
    cursor: usize,
}

impl TermCursor {
    fn head(&self) -> Option<&Posting> {
        self.postings.get(self.cursor)
    }

    fn advance(&mut self) {
        self.cursor += 1;
    }

    /// Advance until the head doc_id reaches `target`.
    fn seek(&mut self, target: DocId) {
        while self.head().is_some_and(|p| p.doc_id < target) {
            self.cursor += 1;
        }
    }
}

/// Stateless query executor over the index and document store.
///
/// Every execution snapshots the collection statistics up front and owns
/// its cursors, so queries never interfere with one another.
pub struct QueryExecutor;

impl QueryExecutor {
    pub fn new() -> Self {
        QueryExecutor
    }

    pub fn execute(
        &self,
        index: &InvertedIndex,
        store: &mut DocStore,
        query: &ParsedQuery,
        limit: usize,
        config: &ExecutionConfig,
    ) -> Result<Vec<QueryHit>> {
        let k = limit.min(config.max_results).min(MAX_RESULTS);
        if k == 0 || query.terms.is_empty() {
            return Ok(Vec::new());
        }
        let total_docs = index.total_docs();

        // A term the index has never seen contributes an empty cursor:
        // fatal for AND/PHRASE, harmless for OR.
        let mut cursors = Vec::with_capacity(query.terms.len());
        for term in &query.terms {
            let postings = match index.postings(term.as_bytes()) {
                Ok(postings) => postings,
                Err(e) if e.kind == ErrorKind::NotFound => Vec::new(),
                Err(e) => return Err(e),
            };
            cursors.push(TermCursor {
                doc_freq: postings.len() as u64,
                postings,
                cursor: 0,
            });
        }

        let mut collector = TopKCollector::new(k);
        match query.query_type {
            QueryType::And => self.execute_and(
                store,
                &mut cursors,
                total_docs,
                config,
                |rows| Some(occurrence_summary(rows)),
                &mut collector,
            )?,
            QueryType::Phrase => self.execute_and(
                store,
                &mut cursors,
                total_docs,
                config,
                |rows| {
                    let anchors = phrase_anchors(rows);
                    anchors.first().map(|&first| (first, anchors.len() as u32))
                },
                &mut collector,
            )?,
            QueryType::Or => {
                self.execute_or(store, &mut cursors, total_docs, config, &mut collector)?
            }
        }
        Ok(collector.into_sorted())
    }

    /// Lock-step intersection. `verify` inspects the candidate's per-term
    /// postings and either rejects it or supplies the hit's
    /// (first_position, match_count); phrase adjacency lives there.
    fn execute_and<F>(
        &self,
        store: &mut DocStore,
        cursors: &mut [TermCursor],
        total_docs: u64,
        config: &ExecutionConfig,
        mut verify: F,
        collector: &mut TopKCollector,
    ) -> Result<()>
    where
        F: FnMut(&[&Posting]) -> Option<(u32, u32)>,
    {
        if cursors.is_empty() || cursors.iter().any(|c| c.postings.is_empty()) {
            return Ok(());
        }

        loop {
            // The highest head doc_id is the next possible candidate.
            let mut target = DocId(0);
            let mut exhausted = false;
            for cursor in cursors.iter() {
                match cursor.head() {
                    Some(posting) => target = target.max(posting.doc_id),
                    None => exhausted = true,
                }
            }
            if exhausted {
                break;
            }

            // Align every cursor on it; any overshoot restarts the scan.
            let mut aligned = true;
            for cursor in cursors.iter_mut() {
                cursor.seek(target);
                match cursor.head() {
                    Some(posting) => aligned &= posting.doc_id == target,
                    None => {
                        aligned = false;
                        exhausted = true;
                    }
                }
            }
            if exhausted {
                break;
            }
            if !aligned {
                continue;
            }

            if !store.is_deleted(target) {
                let rows: Vec<&Posting> = cursors.iter().filter_map(|c| c.head()).collect();
                if let Some((first_position, match_count)) = verify(&rows) {
                    let raw = sum_scores(&rows, cursors, total_docs);
                    let score = self.finish_score(store, target, raw, config)?;
                    collector.collect(QueryHit {
                        doc_id: target,
                        score,
                        first_position,
                        match_count,
                    });
                }
            }
            for cursor in cursors.iter_mut() {
                cursor.advance();
            }
        }
        Ok(())
    }

    /// K-way union by ascending doc_id; co-occurring terms sum their
    /// contributions.
    fn execute_or(
        &self,
        store: &mut DocStore,
        cursors: &mut [TermCursor],
        total_docs: u64,
        config: &ExecutionConfig,
        collector: &mut TopKCollector,
    ) -> Result<()> {
        loop {
            let target = cursors
                .iter()
                .filter_map(|c| c.head().map(|p| p.doc_id))
                .min();
            let Some(target) = target else { break };

            if !store.is_deleted(target) {
                let rows: Vec<&Posting> = cursors
                    .iter()
                    .filter_map(|c| c.head())
                    .filter(|p| p.doc_id == target)
                    .collect();
                let matching: Vec<&TermCursor> = cursors
                    .iter()
                    .filter(|c| c.head().is_some_and(|p| p.doc_id == target))
                    .collect();
                let mut raw = Score::ZERO;
                for (posting, cursor) in rows.iter().zip(matching.iter()) {
                    raw += tf_idf(posting.term_freq as u64, cursor.doc_freq, total_docs);
                }
                let (first_position, match_count) = occurrence_summary(&rows);
                let score = self.finish_score(store, target, raw, config)?;
                collector.collect(QueryHit {
                    doc_id: target,
                    score,
                    first_position,
                    match_count,
                });
            }

            for cursor in cursors.iter_mut() {
                if cursor.head().is_some_and(|p| p.doc_id == target) {
                    cursor.advance();
                }
            }
        }
        Ok(())
    }

    fn finish_score(
        &self,
        store: &mut DocStore,
        doc_id: DocId,
        score: Score,
        config: &ExecutionConfig,
    ) -> Result<Score> {
        match config.scoring {
            ScoringAlgorithm::TfIdf => Ok(score),
            ScoringAlgorithm::Bm25 => {
                let Ok(offset) = store.index_lookup(doc_id) else {
                    return Ok(score);
                };
                let doc_len = store.get_header(offset)?.payload_len as u64;
                Ok(bm25_normalise(
                    score,
                    &DocStats {
                        doc_len,
                        avg_doc_len_fx: store.avg_doc_bytes_fx(),
                    },
                ))
            }
        }
    }
}

impl Default for QueryExecutor {
    fn default() -> Self {
        Self::new()
    }
}

fn sum_scores(rows: &[&Posting], cursors: &[TermCursor], total_docs: u64) -> Score {
    let mut score = Score::ZERO;
    for (posting, cursor) in rows.iter().zip(cursors.iter()) {
        score += tf_idf(posting.term_freq as u64, cursor.doc_freq, total_docs);
    }
    score
}

/// Default per-hit metadata: earliest matched position and total matched
/// occurrences.
fn occurrence_summary(rows: &[&Posting]) -> (u32, u32) {
    let mut first_position = u32::MAX;
    let mut match_count = 0u32;
    for posting in rows {
        match_count += posting.term_freq;
        if let Some(&first) = posting.positions.first() {
            first_position = first_position.min(first);
        }
    }
    (
        if first_position == u32::MAX { 0 } else { first_position },
        match_count,
    )
}

/// Anchors where the whole phrase begins: positions p of the first term
/// such that term i sits at p + i for every i.
fn phrase_anchors(rows: &[&Posting]) -> Vec<u32> {
    let Some(first) = rows.first() else {
        return Vec::new();
    };
    first
        .positions
        .iter()
        .copied()
        .filter(|&p| {
            rows.iter().enumerate().skip(1).all(|(i, posting)| {
                posting.positions.binary_search(&(p + i as u32)).is_ok()
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use crate::query::parser::QueryParser;
    use crate::storage::layout::StorageLayout;

    struct Fixture {
        index: InvertedIndex,
        store: DocStore,
        executor: QueryExecutor,
        parser: QueryParser,
    }

    impl Fixture {
        fn new(dir: &tempfile::TempDir) -> Self {
            let layout = StorageLayout::new(dir.path().to_path_buf()).unwrap();
            let config = Config::with_dir(dir.path());
            Fixture {
                index: InvertedIndex::open(&layout, &config).unwrap(),
                store: DocStore::open(&layout, &config).unwrap(),
                executor: QueryExecutor::new(),
                parser: QueryParser::default(),
            }
        }

        fn ingest(&mut self, text: &[u8]) -> DocId {
            let (doc_id, _) = self.store.put(text).unwrap();
            self.index.add(doc_id, text).unwrap();
            doc_id
        }

        fn search(&mut self, text: &str, query_type: QueryType) -> Vec<QueryHit> {
            self.search_with(text, query_type, &ExecutionConfig::default())
        }

        fn search_with(
            &mut self,
            text: &str,
            query_type: QueryType,
            config: &ExecutionConfig,
        ) -> Vec<QueryHit> {
            let query = self.parser.parse(text, query_type).unwrap();
            self.executor
                .execute(&self.index, &mut self.store, &query, 10, config)
                .unwrap()
        }
    }

    fn seed(dir: &tempfile::TempDir) -> (Fixture, DocId, DocId, DocId) {
        let mut fx = Fixture::new(dir);
        let d1 = fx.ingest(b"The quick brown fox");
        let d2 = fx.ingest(b"Hello world test");
        let d3 = fx.ingest(b"Assembly is quick");
        (fx, d1, d2, d3)
    }

    #[test]
    fn test_and_single_term_hits() {
        let dir = tempfile::tempdir().unwrap();
        let (mut fx, d1, _, d3) = seed(&dir);

        let hits = fx.search("quick", QueryType::And);
        let ids: Vec<DocId> = hits.iter().map(|h| h.doc_id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&d1) && ids.contains(&d3));
        // Scores are descending.
        assert!(hits[0].score >= hits[1].score);
    }

    #[test]
    fn test_no_match_is_empty_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let (mut fx, ..) = seed(&dir);
        assert!(fx.search("xyzzyplugh", QueryType::And).is_empty());
        assert!(fx.search("xyzzyplugh quick", QueryType::And).is_empty());
    }

    #[test]
    fn test_and_requires_all_terms() {
        let dir = tempfile::tempdir().unwrap();
        let (mut fx, d1, ..) = seed(&dir);
        let hits = fx.search("quick fox", QueryType::And);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].doc_id, d1);
        assert_eq!(hits[0].match_count, 2);
        assert_eq!(hits[0].first_position, 1);
    }

    #[test]
    fn test_or_unions() {
        let dir = tempfile::tempdir().unwrap();
        let (mut fx, d1, d2, d3) = seed(&dir);
        let hits = fx.search("quick world", QueryType::Or);
        let ids: Vec<DocId> = hits.iter().map(|h| h.doc_id).collect();
        assert_eq!(ids.len(), 3);
        assert!(ids.contains(&d1) && ids.contains(&d2) && ids.contains(&d3));
    }

    #[test]
    fn test_single_term_and_equals_or() {
        let dir = tempfile::tempdir().unwrap();
        let (mut fx, ..) = seed(&dir);
        let and_hits = fx.search("quick", QueryType::And);
        let or_hits = fx.search("quick", QueryType::Or);
        assert_eq!(and_hits, or_hits);
    }

    #[test]
    fn test_phrase_order_matters() {
        let dir = tempfile::tempdir().unwrap();
        let mut fx = Fixture::new(&dir);
        let d1 = fx.ingest(b"the quick brown fox");

        let hits = fx.search("quick brown", QueryType::Phrase);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].doc_id, d1);
        assert_eq!(hits[0].first_position, 1);
        assert_eq!(hits[0].match_count, 1);

        assert!(fx.search("brown quick", QueryType::Phrase).is_empty());
    }

    #[test]
    fn test_phrase_rejects_gaps() {
        let dir = tempfile::tempdir().unwrap();
        let mut fx = Fixture::new(&dir);
        fx.ingest(b"quick red brown fox");
        assert!(fx.search("quick brown", QueryType::Phrase).is_empty());
        assert_eq!(fx.search("red brown fox", QueryType::Phrase).len(), 1);
    }

    #[test]
    fn test_phrase_counts_every_anchor() {
        let dir = tempfile::tempdir().unwrap();
        let mut fx = Fixture::new(&dir);
        fx.ingest(b"ba da ba da ba");
        let hits = fx.search("ba da", QueryType::Phrase);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].match_count, 2);
        assert_eq!(hits[0].first_position, 0);
    }

    #[test]
    fn test_results_survive_flush() {
        let dir = tempfile::tempdir().unwrap();
        let (mut fx, d1, _, d3) = seed(&dir);
        fx.index.flush().unwrap();
        let hits = fx.search("quick", QueryType::And);
        let ids: Vec<DocId> = hits.iter().map(|h| h.doc_id).collect();
        assert!(ids.contains(&d1) && ids.contains(&d3));

        let hits = fx.search("quick brown", QueryType::Phrase);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].doc_id, d1);
    }

    #[test]
    fn test_deleted_docs_filtered() {
        let dir = tempfile::tempdir().unwrap();
        let (mut fx, d1, _, d3) = seed(&dir);
        fx.store.delete(d1).unwrap();
        let hits = fx.search("quick", QueryType::And);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].doc_id, d3);
    }

    #[test]
    fn test_rarer_term_ranks_higher() {
        let dir = tempfile::tempdir().unwrap();
        let mut fx = Fixture::new(&dir);
        // "common" in every doc, "rare" in one.
        fx.ingest(b"common rare words");
        fx.ingest(b"common words again");
        fx.ingest(b"common filler text");
        fx.ingest(b"common filler text");

        let hits = fx.search("common rare", QueryType::Or);
        assert_eq!(hits[0].doc_id, DocId(1));
    }

    #[test]
    fn test_limit_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let mut fx = Fixture::new(&dir);
        for i in 0..20 {
            let text = format!("shared term number{}", i);
            fx.ingest(text.as_bytes());
        }
        let query = fx.parser.parse("shared", QueryType::And).unwrap();
        let hits = fx
            .executor
            .execute(
                &fx.index,
                &mut fx.store,
                &query,
                5,
                &ExecutionConfig::default(),
            )
            .unwrap();
        assert_eq!(hits.len(), 5);
    }

    #[test]
    fn test_bm25_prefers_shorter_doc() {
        let dir = tempfile::tempdir().unwrap();
        let mut fx = Fixture::new(&dir);
        let short = fx.ingest(b"target here");
        let long = fx.ingest(
            b"target surrounded by a great many other words that dilute the match entirely",
        );
        fx.ingest(b"unrelated filler document");

        let config = ExecutionConfig {
            scoring: ScoringAlgorithm::Bm25,
            ..Default::default()
        };
        let hits = fx.search_with("target", QueryType::And, &config);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].doc_id, short);
        assert_eq!(hits[1].doc_id, long);
    }

    #[test]
    fn test_sorted_with_tiebreak() {
        let dir = tempfile::tempdir().unwrap();
        let mut fx = Fixture::new(&dir);
        // Identical docs produce identical scores; order falls back to id.
        for _ in 0..4 {
            fx.ingest(b"twin document body");
        }
        fx.ingest(b"unrelated text");
        let hits = fx.search("twin", QueryType::And);
        for pair in hits.windows(2) {
            assert!(
                pair[0].score > pair[1].score
                    || (pair[0].score == pair[1].score && pair[0].doc_id < pair[1].doc_id)
            );
        }
    }
}
