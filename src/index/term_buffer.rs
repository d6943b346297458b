use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::DocId;
use crate::index::postings::Posting;

pub const DEFAULT_BUCKETS: usize = 4096;
pub const DEFAULT_CAPACITY: usize = 65536;
pub const DEFAULT_POSITION_CAP: usize = 64;

const NIL: u32 = u32::MAX;

/// One (term, document) accumulation in the ingest buffer.
#[derive(Debug)]
pub struct TermEntry {
    pub hash: u32,
    pub term: Vec<u8>,
    pub doc_id: DocId,
    pub term_freq: u32,
    pub positions: Vec<u32>,
    /// Arena index of the next entry in this bucket's chain.
    next: u32,
    overflow_warned: bool,
}

/// In-memory posting accumulator.
///
/// Entries live in an arena addressed by integer index; a fixed bucket
/// table chains them by term hash. Each (term, doc_id) pair owns exactly
/// one entry, so a term seen under several documents holds several chain
/// entries and no occurrence is ever dropped. Position arrays grow
/// geometrically up to `position_cap`; occurrences past the cap still
/// count toward term frequency but lose their positions.
#[derive(Debug)]
pub struct TermBuffer {
    entries: Vec<TermEntry>,
    buckets: Vec<u32>,
    capacity: usize,
    position_cap: usize,
}

impl TermBuffer {
    pub fn new(buckets: usize, capacity: usize, position_cap: usize) -> Self {
        TermBuffer {
            entries: Vec::new(),
            buckets: vec![NIL; buckets.max(1)],
            capacity: capacity.max(1),
            position_cap: position_cap.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True once the arena has reached its configured capacity; the caller
    /// flushes and retries.
    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    fn bucket(&self, hash: u32) -> usize {
        hash as usize % self.buckets.len()
    }

    /// True when recording this occurrence would need a fresh arena entry.
    pub fn needs_entry(&self, term: &[u8], hash: u32, doc_id: DocId) -> bool {
        self.find(term, hash, doc_id).is_none()
    }

    fn find(&self, term: &[u8], hash: u32, doc_id: DocId) -> Option<usize> {
        let mut cursor = self.buckets[self.bucket(hash)];
        while cursor != NIL {
            let entry = &self.entries[cursor as usize];
            if entry.hash == hash
                && entry.doc_id == doc_id
                && entry.term.len() == term.len()
                && entry.term == term
            {
                return Some(cursor as usize);
            }
            cursor = entry.next;
        }
        None
    }

    /// Record one occurrence of `term` in `doc_id` at `position`.
    pub fn record(&mut self, term: &[u8], hash: u32, doc_id: DocId, position: u32) -> Result<()> {
        if let Some(i) = self.find(term, hash, doc_id) {
            let entry = &mut self.entries[i];
            entry.term_freq += 1;
            if entry.positions.len() < self.position_cap {
                entry.positions.push(position);
            } else if !entry.overflow_warned {
                entry.overflow_warned = true;
                log::warn!(
                    "dropping positions past {} for term in doc {}",
                    self.position_cap,
                    doc_id
                );
            }
            return Ok(());
        }

        if self.entries.len() >= NIL as usize {
            return Err(Error::new(
                ErrorKind::OutOfMemory,
                "term buffer arena exhausted",
            ));
        }
        let bucket = self.bucket(hash);
        let index = self.entries.len() as u32;
        self.entries.push(TermEntry {
            hash,
            term: term.to_vec(),
            doc_id,
            term_freq: 1,
            positions: vec![position],
            next: self.buckets[bucket],
            overflow_warned: false,
        });
        self.buckets[bucket] = index;
        Ok(())
    }

    /// Release every entry and reset the chains.
    pub fn clear(&mut self) {
        self.entries.clear();
        for head in self.buckets.iter_mut() {
            *head = NIL;
        }
    }

    /// Arena indices sorted by (hash, term bytes, doc_id), the flush order.
    pub fn sorted_indices(&self) -> Vec<u32> {
        let mut indices: Vec<u32> = (0..self.entries.len() as u32).collect();
        indices.sort_by(|&a, &b| {
            let ea = &self.entries[a as usize];
            let eb = &self.entries[b as usize];
            ea.hash
                .cmp(&eb.hash)
                .then_with(|| ea.term.cmp(&eb.term))
                .then_with(|| ea.doc_id.cmp(&eb.doc_id))
        });
        indices
    }

    pub fn entry(&self, index: u32) -> &TermEntry {
        &self.entries[index as usize]
    }

    /// All buffered postings for a term, ascending by doc_id.
    pub fn postings_for(&self, term: &[u8], hash: u32) -> Vec<Posting> {
        let mut postings = Vec::new();
        let mut cursor = self.buckets[self.bucket(hash)];
        while cursor != NIL {
            let entry = &self.entries[cursor as usize];
            if entry.hash == hash && entry.term == term {
                postings.push(Posting {
                    doc_id: entry.doc_id,
                    term_freq: entry.term_freq,
                    positions: entry.positions.clone(),
                });
            }
            cursor = entry.next;
        }
        postings.sort_by_key(|p| p.doc_id);
        postings
    }

    /// Number of buffered documents holding `term`.
    pub fn doc_count_for(&self, term: &[u8], hash: u32) -> u32 {
        let mut count = 0;
        let mut cursor = self.buckets[self.bucket(hash)];
        while cursor != NIL {
            let entry = &self.entries[cursor as usize];
            if entry.hash == hash && entry.term == term {
                count += 1;
            }
            cursor = entry.next;
        }
        count
    }
}
