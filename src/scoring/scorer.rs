use crate::scoring::fixed::{FX_ONE, Score, log2_fx};

/// BM25 term-frequency saturation, 1.2 in 24.8.
pub const BM25_K1_FX: i64 = 307;
/// BM25 length-normalisation strength, 0.75 in 24.8.
pub const BM25_B_FX: i64 = 192;

/// Collection statistics a scorer needs alongside the posting.
#[derive(Debug, Clone, Copy)]
pub struct DocStats {
    /// Length of the scored document.
    pub doc_len: u64,
    /// Average document length over the collection, 16.16 fixed point.
    pub avg_doc_len_fx: u64,
}

/// Classical TF-IDF in 24.8: (1 + log2(tf)) * max(0, log2(N) - log2(df)).
///
/// Any zero input scores zero; a term present in every document has a
/// non-positive IDF and also scores zero.
pub fn tf_idf(tf: u64, df: u64, total_docs: u64) -> Score {
    if tf == 0 || df == 0 || total_docs == 0 {
        return Score::ZERO;
    }
    let idf = (log2_fx(total_docs) - log2_fx(df)).max(0);
    let weight = FX_ONE + log2_fx(tf);
    Score::from_raw((weight * idf) >> 8)
}

/// BM25 length normalisation of a raw score:
/// score / (k1 * ((1 - b) + b * doc_len / avg_len)).
pub fn bm25_normalise(score: Score, stats: &DocStats) -> Score {
    if stats.avg_doc_len_fx == 0 {
        return score;
    }
    // doc_len / avg_len in 24.8; doc_len is capped at 16 MiB so the shift
    // cannot overflow.
    let ratio = ((stats.doc_len as i64) << 24) / stats.avg_doc_len_fx as i64;
    let denom = (BM25_K1_FX * ((FX_ONE - BM25_B_FX) + ((BM25_B_FX * ratio) >> 8))) >> 8;
    let denom = denom.max(1);
    Score::from_raw((score.raw() << 8) / denom)
}
