use std::cmp::Ordering;
use std::fs::File;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::utils::{align8, crc32, read_u16, read_u32, read_u64};
use crate::mmap::mmap_file::MmapFile;

pub const TERMS_MAGIC: [u8; 4] = *b"FTSt";
pub const POSTINGS_MAGIC: [u8; 4] = *b"FTSp";
pub const META_MAGIC: [u8; 4] = *b"FTSm";
pub const FTS_VERSION: u32 = 1;

/// magic(4) version(4) term_count(8) total_postings(8) checksum(4) reserved(4)
pub const TERMS_HEADER_LEN: usize = 32;
/// magic(4) version(4) count(8) checksum(4) reserved(4)
pub const POSTINGS_HEADER_LEN: usize = 24;
/// hash(4) len(2) flags(2) doc_freq(4) posting_offset(8)
pub const DICT_ENTRY_FIXED: usize = 20;

/// A term dictionary entry viewed in place.
#[derive(Debug, Clone, Copy)]
pub struct DictEntry<'a> {
    pub hash: u32,
    pub flags: u16,
    pub doc_freq: u32,
    pub posting_offset: u64,
    pub term: &'a [u8],
}

/// Read-only view of the on-disk term dictionary.
///
/// Entries are variable length and sorted by (hash, term bytes). Because
/// the file cannot be indexed by position, a fixed-size offset table is
/// built once at load; lookups are then a true binary search.
#[derive(Debug)]
pub struct TermDict {
    mmap: MmapFile,
    term_count: u64,
    total_postings: u64,
    offsets: Vec<u64>,
}

impl TermDict {
    /// Map and validate the dictionary, building the offset table.
    pub fn load(file: &File) -> Result<Self> {
        let mmap = MmapFile::map(file)?;
        if mmap.is_empty() {
            return Ok(TermDict {
                mmap,
                term_count: 0,
                total_postings: 0,
                offsets: Vec::new(),
            });
        }

        let buf = mmap.data();
        if buf.len() < TERMS_HEADER_LEN {
            return Err(Error::new(ErrorKind::Corrupt, "term dictionary header truncated"));
        }
        if buf[0..4] != TERMS_MAGIC {
            return Err(Error::new(ErrorKind::Corrupt, "bad term dictionary magic"));
        }
        let version = read_u32(buf, 4);
        if version != FTS_VERSION {
            return Err(Error::new(
                ErrorKind::Corrupt,
                format!("term dictionary version {} unsupported", version),
            ));
        }
        let term_count = read_u64(buf, 8);
        let total_postings = read_u64(buf, 16);
        let checksum = read_u32(buf, 24);
        if crc32(&buf[TERMS_HEADER_LEN..]) != checksum {
            return Err(Error::new(ErrorKind::Corrupt, "term dictionary checksum mismatch"));
        }

        let mut offsets = Vec::with_capacity(term_count as usize);
        let mut cursor = TERMS_HEADER_LEN;
        for _ in 0..term_count {
            if cursor + DICT_ENTRY_FIXED > buf.len() {
                return Err(Error::new(ErrorKind::Corrupt, "term dictionary entry overruns file"));
            }
            offsets.push(cursor as u64);
            let term_len = read_u16(buf, cursor + 4) as usize;
            cursor += align8(DICT_ENTRY_FIXED + term_len);
            if cursor > buf.len() {
                return Err(Error::new(ErrorKind::Corrupt, "term dictionary entry overruns file"));
            }
        }

        Ok(TermDict {
            mmap,
            term_count,
            total_postings,
            offsets,
        })
    }

    pub fn len(&self) -> usize {
        self.term_count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.term_count == 0
    }

    pub fn total_postings(&self) -> u64 {
        self.total_postings
    }

    pub fn entry(&self, i: usize) -> DictEntry<'_> {
        let buf = self.mmap.data();
        let off = self.offsets[i] as usize;
        let term_len = read_u16(buf, off + 4) as usize;
        DictEntry {
            hash: read_u32(buf, off),
            flags: read_u16(buf, off + 6),
            doc_freq: read_u32(buf, off + 8),
            posting_offset: read_u64(buf, off + 12),
            term: &buf[off + DICT_ENTRY_FIXED..off + DICT_ENTRY_FIXED + term_len],
        }
    }

    /// Binary search by (hash, term bytes).
    pub fn find(&self, hash: u32, term: &[u8]) -> Option<DictEntry<'_>> {
        let mut lo = 0usize;
        let mut hi = self.len();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let entry = self.entry(mid);
            match entry.hash.cmp(&hash).then_with(|| entry.term.cmp(term)) {
                Ordering::Equal => return Some(self.entry(mid)),
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
            }
        }
        None
    }
}
