use crate::analysis::tokenizer::TokenStream;
use crate::core::error::{Error, ErrorKind, Result};
use crate::query::types::{MAX_QUERY_TERMS, ParsedQuery, QueryType};

/// Turns query text into a term list with the same normalisation the
/// ingest path applies.
pub struct QueryParser {
    pub max_terms: usize,
    pub max_token_bytes: usize,
}

impl Default for QueryParser {
    fn default() -> Self {
        QueryParser {
            max_terms: MAX_QUERY_TERMS,
            max_token_bytes: crate::analysis::tokenizer::DEFAULT_MAX_TOKEN_BYTES,
        }
    }
}

impl QueryParser {
    pub fn new(max_terms: usize, max_token_bytes: usize) -> Self {
        QueryParser {
            max_terms: max_terms.max(1),
            max_token_bytes,
        }
    }

    /// Tokenize `text` into a query. Pure whitespace/punctuation is
    /// `Invalid`; terms past the cap are dropped without error.
    pub fn parse(&self, text: &str, query_type: QueryType) -> Result<ParsedQuery> {
        let mut terms = Vec::new();
        for token in TokenStream::with_max_token_bytes(text.as_bytes(), self.max_token_bytes) {
            if terms.len() == self.max_terms {
                break;
            }
            terms.push(token.text);
        }
        if terms.is_empty() {
            return Err(Error::new(ErrorKind::Invalid, "query has no indexable terms"));
        }
        Ok(ParsedQuery { terms, query_type })
    }
}
