use serde::{Deserialize, Serialize};

/// Terms accepted per query; extras are silently dropped.
pub const MAX_QUERY_TERMS: usize = 16;
/// Hard ceiling on results a query may return.
pub const MAX_RESULTS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueryType {
    /// Documents containing every term.
    And,
    /// Documents containing any term.
    Or,
    /// Documents containing the terms as adjacent words, in order.
    Phrase,
}

/// A query after tokenization: normalised terms in input order, duplicates
/// preserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedQuery {
    pub terms: Vec<String>,
    pub query_type: QueryType,
}

impl ParsedQuery {
    pub fn term_count(&self) -> usize {
        self.terms.len()
    }
}
