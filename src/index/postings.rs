use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::DocId;
use crate::core::utils::{read_u32, read_u64};

/// One document's occurrences of a term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posting {
    pub doc_id: DocId,
    pub term_freq: u32,
    /// Ascending 0-based word positions; may be shorter than `term_freq`
    /// when the ingest-side position cap dropped occurrences.
    pub positions: Vec<u32>,
}

/// Encoded size of a posting list.
pub fn encoded_len(postings: &[Posting]) -> usize {
    4 + postings
        .iter()
        .map(|p| 16 + p.positions.len() * 4)
        .sum::<usize>()
}

/// Append a posting list: doc_freq(4), then per document
/// doc_id(8) term_freq(4) position_count(4) positions(4 each).
/// Documents must already be in ascending doc_id order.
pub fn encode_list(out: &mut Vec<u8>, postings: &[Posting]) {
    out.extend_from_slice(&(postings.len() as u32).to_le_bytes());
    for posting in postings {
        out.extend_from_slice(&posting.doc_id.0.to_le_bytes());
        out.extend_from_slice(&posting.term_freq.to_le_bytes());
        out.extend_from_slice(&(posting.positions.len() as u32).to_le_bytes());
        for &position in &posting.positions {
            out.extend_from_slice(&position.to_le_bytes());
        }
    }
}

/// Decode the posting list at `offset`. `max_bytes` bounds the scratch a
/// caller is willing to spend; a longer list is an `Overflow`.
pub fn decode_list(buf: &[u8], offset: usize, max_bytes: usize) -> Result<Vec<Posting>> {
    let len = list_len(buf, offset)?;
    if len > max_bytes {
        return Err(Error::new(
            ErrorKind::Overflow,
            format!("posting list of {} bytes exceeds scratch cap {}", len, max_bytes),
        ));
    }

    let doc_freq = read_u32(buf, offset);
    let mut postings = Vec::with_capacity(doc_freq as usize);
    let mut cursor = offset + 4;
    for _ in 0..doc_freq {
        let doc_id = DocId(read_u64(buf, cursor));
        let term_freq = read_u32(buf, cursor + 8);
        let position_count = read_u32(buf, cursor + 12) as usize;
        cursor += 16;
        let mut positions = Vec::with_capacity(position_count);
        for i in 0..position_count {
            positions.push(read_u32(buf, cursor + i * 4));
        }
        cursor += position_count * 4;
        postings.push(Posting {
            doc_id,
            term_freq,
            positions,
        });
    }
    Ok(postings)
}

/// Byte length of the encoded posting list at `offset`, bounds-checked.
pub fn list_len(buf: &[u8], offset: usize) -> Result<usize> {
    let truncated = || Error::new(ErrorKind::Corrupt, "posting list overruns file");
    if offset + 4 > buf.len() {
        return Err(truncated());
    }
    let doc_freq = read_u32(buf, offset);
    let mut cursor = offset + 4;
    for _ in 0..doc_freq {
        if cursor + 16 > buf.len() {
            return Err(truncated());
        }
        let position_count = read_u32(buf, cursor + 12) as usize;
        cursor += 16 + position_count * 4;
        if cursor > buf.len() {
            return Err(truncated());
        }
    }
    Ok(cursor - offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<Posting> {
        vec![
            Posting {
                doc_id: DocId(1),
                term_freq: 2,
                positions: vec![0, 7],
            },
            Posting {
                doc_id: DocId(5),
                term_freq: 1,
                positions: vec![3],
            },
        ]
    }

    #[test]
    fn test_encode_decode() {
        let postings = sample();
        let mut buf = vec![0xAA; 16]; // lists rarely start at offset 0
        encode_list(&mut buf, &postings);
        assert_eq!(buf.len(), 16 + encoded_len(&postings));
        let decoded = decode_list(&buf, 16, usize::MAX).unwrap();
        assert_eq!(decoded, postings);
    }

    #[test]
    fn test_scratch_cap_enforced() {
        let postings = sample();
        let mut buf = Vec::new();
        encode_list(&mut buf, &postings);
        let err = decode_list(&buf, 0, 8).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Overflow);
    }

    #[test]
    fn test_truncated_list_is_corrupt() {
        let mut buf = Vec::new();
        encode_list(&mut buf, &sample());
        buf.truncate(buf.len() - 2);
        let err = decode_list(&buf, 0, usize::MAX).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Corrupt);
    }

    #[test]
    fn test_empty_list() {
        let mut buf = Vec::new();
        encode_list(&mut buf, &[]);
        assert_eq!(buf.len(), 4);
        assert!(decode_list(&buf, 0, usize::MAX).unwrap().is_empty());
    }
}
