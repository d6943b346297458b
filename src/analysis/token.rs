use serde::{Deserialize, Serialize};

/// A normalised word produced by the tokenizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub text: String,
    /// 0-based word position in the document (for phrase queries).
    pub position: u32,
    /// Byte offset of the first code point in the original input.
    pub offset: usize,
}

impl Token {
    pub fn new(text: String, position: u32, offset: usize) -> Self {
        Token {
            text,
            position,
            offset,
        }
    }
}
