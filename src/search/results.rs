use std::cmp::Ordering;
use std::collections::BinaryHeap;
use serde::Serialize;
use crate::core::types::DocId;
use crate::scoring::fixed::Score;

/// One ranked search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryHit {
    pub doc_id: DocId,
    pub score: Score,
    /// Word position of the earliest match in the document.
    pub first_position: u32,
    /// Matched term occurrences (AND/OR) or phrase anchors (PHRASE).
    pub match_count: u32,
}

/// Heap entry ordered worst-first so the heap root is the eviction
/// candidate: lowest score on top, ties put the higher doc_id on top.
struct Worst(QueryHit);

impl PartialEq for Worst {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Worst {}

impl PartialOrd for Worst {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Worst {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .0
            .score
            .cmp(&self.0.score)
            .then_with(|| self.0.doc_id.cmp(&other.0.doc_id))
    }
}

/// Bounded collector keeping the K best hits.
///
/// Ranking is score descending, ties broken by lower doc_id.
pub struct TopKCollector {
    heap: BinaryHeap<Worst>,
    k: usize,
    pub total_collected: usize,
}

impl TopKCollector {
    pub fn new(k: usize) -> Self {
        TopKCollector {
            heap: BinaryHeap::with_capacity(k + 1),
            k,
            total_collected: 0,
        }
    }

    pub fn collect(&mut self, hit: QueryHit) {
        self.total_collected += 1;
        if self.k == 0 {
            return;
        }
        self.heap.push(Worst(hit));
        if self.heap.len() > self.k {
            self.heap.pop();
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Drain into a ranked vector, best first.
    pub fn into_sorted(self) -> Vec<QueryHit> {
        let mut hits: Vec<QueryHit> = self.heap.into_iter().map(|w| w.0).collect();
        hits.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| a.doc_id.cmp(&b.doc_id))
        });
        hits
    }
}
