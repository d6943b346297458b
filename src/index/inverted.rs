use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use chrono::Utc;
use crate::analysis::tokenizer::TokenStream;
use crate::core::config::Config;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::DocId;
use crate::core::utils::{align8, crc32, read_u32, read_u64};
use crate::index::postings::{self, Posting};
use crate::index::term_buffer::TermBuffer;
use crate::index::term_dict::{
    DICT_ENTRY_FIXED, FTS_VERSION, META_MAGIC, POSTINGS_HEADER_LEN, POSTINGS_MAGIC, TermDict,
    TERMS_HEADER_LEN, TERMS_MAGIC,
};
use crate::mmap::mmap_file::MmapFile;
use crate::storage::layout::StorageLayout;

/// magic(4) version(4) total_docs(8) total_terms(8) total_tokens(8)
/// avg_doc_len(8) last_doc_id(8) timestamp(8) checksum(4) reserved(4)
pub const META_LEN: usize = 64;

/// Collection-wide counters persisted in meta.fts.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexMeta {
    pub total_docs: u64,
    pub total_terms: u64,
    pub total_tokens: u64,
    pub last_doc_id: u64,
    pub timestamp: u64,
}

impl IndexMeta {
    /// Average document length in tokens, 16.16 fixed point.
    pub fn avg_doc_len_fx(&self) -> u64 {
        if self.total_docs == 0 {
            0
        } else {
            (self.total_tokens << 16) / self.total_docs
        }
    }
}

/// Raw result of a term lookup: a non-negative `posting_offset` points into
/// the posting file; a negative one means the term currently lives (at
/// least partly) in the ingest buffer, with `doc_freq` buffered documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TermLookup {
    pub posting_offset: i64,
    pub doc_freq: u32,
}

/// The inverted index: terms.fts + postings.fts + meta.fts on disk, plus
/// the in-memory term buffer.
///
/// Ingestion accumulates in the buffer; `flush` merges the buffer with the
/// on-disk dictionary into freshly written side files and renames them into
/// place, so a crash mid-flush leaves the previous index readable.
#[derive(Debug)]
pub struct InvertedIndex {
    terms_path: PathBuf,
    postings_path: PathBuf,
    meta_path: PathBuf,
    terms_file: File,
    postings_file: File,
    dict: TermDict,
    postings_mmap: MmapFile,
    buffer: TermBuffer,
    meta: IndexMeta,
    max_token_bytes: usize,
    posting_scratch_cap: usize,
    generation: u64,
}

impl InvertedIndex {
    pub fn open(layout: &StorageLayout, config: &Config) -> Result<Self> {
        let terms_path = layout.terms_path();
        let postings_path = layout.postings_path();
        let meta_path = layout.meta_path();

        let mut terms_file = open_rw(&terms_path)?;
        if terms_file.metadata()?.len() == 0 {
            terms_file.write_all(&terms_header(0, 0, &[]))?;
            terms_file.sync_all()?;
        }
        let mut postings_file = open_rw(&postings_path)?;
        if postings_file.metadata()?.len() == 0 {
            postings_file.write_all(&postings_header(0, &[]))?;
            postings_file.sync_all()?;
        }

        let dict = TermDict::load(&terms_file)?;
        let postings_mmap = MmapFile::map(&postings_file)?;
        validate_postings_header(postings_mmap.data())?;

        let meta = match fs::metadata(&meta_path) {
            Ok(m) if m.len() > 0 => read_meta(&meta_path)?,
            _ => {
                let meta = IndexMeta::default();
                write_meta(&meta_path, &meta)?;
                meta
            }
        };

        Ok(InvertedIndex {
            terms_path,
            postings_path,
            meta_path,
            terms_file,
            postings_file,
            dict,
            postings_mmap,
            buffer: TermBuffer::new(
                config.hash_buckets,
                config.term_buffer_cap,
                config.position_cap,
            ),
            meta,
            max_token_bytes: config.max_token_bytes,
            posting_scratch_cap: config.posting_scratch_cap,
            generation: 0,
        })
    }

    /// Tokenize and index one document. Returns the token count.
    pub fn add(&mut self, doc_id: DocId, content: &[u8]) -> Result<u32> {
        let mut tokens = 0u32;
        for token in TokenStream::with_max_token_bytes(content, self.max_token_bytes) {
            let bytes = token.text.as_bytes();
            let hash = crc32(bytes);
            if self.buffer.is_full() && self.buffer.needs_entry(bytes, hash, doc_id) {
                self.flush()?;
            }
            self.buffer.record(bytes, hash, doc_id, token.position)?;
            tokens += 1;
        }

        self.meta.total_docs += 1;
        self.meta.total_tokens += tokens as u64;
        self.meta.last_doc_id = self.meta.last_doc_id.max(doc_id.0);
        self.generation += 1;
        Ok(tokens)
    }

    /// Merge the ingest buffer into the on-disk files.
    pub fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            self.write_meta_file()?;
            return Ok(());
        }

        // Group buffer entries per term, already in (hash, bytes, doc) order.
        let order = self.buffer.sorted_indices();
        let mut groups: Vec<(u32, Vec<u8>, Vec<Posting>)> = Vec::new();
        for index in order {
            let entry = self.buffer.entry(index);
            let posting = Posting {
                doc_id: entry.doc_id,
                term_freq: entry.term_freq,
                positions: entry.positions.clone(),
            };
            match groups.last_mut() {
                Some((hash, term, postings))
                    if *hash == entry.hash && term.as_slice() == entry.term.as_slice() =>
                {
                    postings.push(posting)
                }
                _ => groups.push((entry.hash, entry.term.clone(), vec![posting])),
            }
        }

        // Two-pointer merge of the sorted disk dictionary and the sorted
        // buffer groups into fresh file bodies.
        let mut out = FlushOutput::default();
        let old_postings = self.postings_mmap.data();
        let mut di = 0usize;
        let mut bi = 0usize;
        while di < self.dict.len() || bi < groups.len() {
            let take_disk = if di >= self.dict.len() {
                false
            } else if bi >= groups.len() {
                true
            } else {
                let entry = self.dict.entry(di);
                let (hash, term, _) = &groups[bi];
                entry
                    .hash
                    .cmp(hash)
                    .then_with(|| entry.term.cmp(term.as_slice()))
                    .is_le()
            };

            if take_disk {
                let entry = self.dict.entry(di);
                let disk_list = postings::decode_list(
                    old_postings,
                    entry.posting_offset as usize,
                    usize::MAX,
                )?;
                let list = match groups.get(bi) {
                    Some((hash, term, buffered))
                        if *hash == entry.hash && term.as_slice() == entry.term =>
                    {
                        bi += 1;
                        merge_postings(disk_list, buffered.clone())
                    }
                    _ => disk_list,
                };
                out.write_term(entry.hash, entry.term, &list);
                di += 1;
            } else {
                let (hash, term, buffered) = &groups[bi];
                out.write_term(*hash, term, buffered);
                bi += 1;
            }
        }

        // Install side files by rename; the old index survives a crash
        // anywhere before the renames.
        let terms_tmp = StorageLayout::tmp_sibling(&self.terms_path);
        let postings_tmp = StorageLayout::tmp_sibling(&self.postings_path);
        write_file(
            &postings_tmp,
            &postings_header(out.term_count, &out.postings_body),
            &out.postings_body,
        )?;
        write_file(
            &terms_tmp,
            &terms_header(out.term_count, out.total_postings, &out.terms_body),
            &out.terms_body,
        )?;
        fs::rename(&postings_tmp, &self.postings_path)?;
        fs::rename(&terms_tmp, &self.terms_path)?;

        self.terms_file = open_rw(&self.terms_path)?;
        self.postings_file = open_rw(&self.postings_path)?;
        self.dict = TermDict::load(&self.terms_file)?;
        self.postings_mmap.remap(&self.postings_file)?;

        self.meta.total_terms = out.term_count;
        self.write_meta_file()?;

        self.buffer.clear();
        self.generation += 1;
        log::debug!(
            "index flush: {} terms, {} postings",
            out.term_count,
            out.total_postings
        );
        Ok(())
    }

    /// Locate a term in the buffer or the disk dictionary.
    pub fn lookup(&self, term: &[u8]) -> Result<TermLookup> {
        let hash = crc32(term);
        let buffered = self.buffer.doc_count_for(term, hash);
        if buffered > 0 {
            return Ok(TermLookup {
                posting_offset: -1,
                doc_freq: buffered,
            });
        }
        if let Some(entry) = self.dict.find(hash, term) {
            return Ok(TermLookup {
                posting_offset: entry.posting_offset as i64,
                doc_freq: entry.doc_freq,
            });
        }
        Err(Error::new(ErrorKind::NotFound, "term not indexed"))
    }

    /// Decode the posting list at a raw posting-file offset.
    pub fn get_posting(&self, offset: u64) -> Result<Vec<Posting>> {
        if (offset as usize) < POSTINGS_HEADER_LEN {
            return Err(Error::new(ErrorKind::Invalid, "offset inside posting header"));
        }
        postings::decode_list(
            self.postings_mmap.data(),
            offset as usize,
            self.posting_scratch_cap,
        )
    }

    /// The total buffer-and-disk posting view of a term, ascending by
    /// doc_id.
    pub fn postings(&self, term: &[u8]) -> Result<Vec<Posting>> {
        let hash = crc32(term);
        let buffered = self.buffer.postings_for(term, hash);
        let disk = match self.dict.find(hash, term) {
            Some(entry) => postings::decode_list(
                self.postings_mmap.data(),
                entry.posting_offset as usize,
                self.posting_scratch_cap,
            )?,
            None => Vec::new(),
        };
        if buffered.is_empty() && disk.is_empty() {
            return Err(Error::new(ErrorKind::NotFound, "term not indexed"));
        }
        Ok(merge_postings(disk, buffered))
    }

    /// Flush and fsync everything.
    pub fn save(&mut self) -> Result<()> {
        self.flush()?;
        self.sync()
    }

    pub fn sync(&mut self) -> Result<()> {
        self.terms_file.sync_all()?;
        self.postings_file.sync_all()?;
        Ok(())
    }

    pub fn close(mut self) -> Result<()> {
        self.save()
    }

    fn write_meta_file(&mut self) -> Result<()> {
        self.meta.timestamp = Utc::now().timestamp() as u64;
        write_meta(&self.meta_path, &self.meta)
    }

    pub fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    pub fn total_docs(&self) -> u64 {
        self.meta.total_docs
    }

    pub fn term_count(&self) -> u64 {
        self.dict.len() as u64
    }

    pub fn buffered_entries(&self) -> usize {
        self.buffer.len()
    }

    /// Bumped on every mutation; lets result caches key on index state.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn size_bytes(&self) -> u64 {
        let file_len = |p: &PathBuf| fs::metadata(p).map(|m| m.len()).unwrap_or(0);
        file_len(&self.terms_path) + file_len(&self.postings_path) + file_len(&self.meta_path)
    }
}

/// Accumulates the new term-dictionary and posting-file bodies during a
/// flush.
#[derive(Default)]
struct FlushOutput {
    terms_body: Vec<u8>,
    postings_body: Vec<u8>,
    term_count: u64,
    total_postings: u64,
}

impl FlushOutput {
    /// Append one term's posting list and dictionary entry.
    fn write_term(&mut self, hash: u32, term: &[u8], postings: &[Posting]) {
        let posting_offset = (POSTINGS_HEADER_LEN + self.postings_body.len()) as u64;
        postings::encode_list(&mut self.postings_body, postings);

        let start = self.terms_body.len();
        self.terms_body.extend_from_slice(&hash.to_le_bytes());
        self.terms_body.extend_from_slice(&(term.len() as u16).to_le_bytes());
        self.terms_body.extend_from_slice(&0u16.to_le_bytes()); // flags
        self.terms_body.extend_from_slice(&(postings.len() as u32).to_le_bytes());
        self.terms_body.extend_from_slice(&posting_offset.to_le_bytes());
        self.terms_body.extend_from_slice(term);
        self.terms_body
            .resize(start + align8(DICT_ENTRY_FIXED + term.len()), 0);

        self.term_count += 1;
        self.total_postings += postings.len() as u64;
    }
}

/// Merge two doc_id-ascending posting lists. Lists never share a doc_id
/// unless a mid-document flush split one document's occurrences; those are
/// combined, disk positions first.
fn merge_postings(disk: Vec<Posting>, buffered: Vec<Posting>) -> Vec<Posting> {
    if buffered.is_empty() {
        return disk;
    }
    if disk.is_empty() {
        return buffered;
    }
    let mut merged = Vec::with_capacity(disk.len() + buffered.len());
    let mut a = disk.into_iter();
    let mut b = buffered.into_iter();
    let mut next_a = a.next();
    let mut next_b = b.next();
    loop {
        match (next_a.take(), next_b.take()) {
            (Some(x), Some(y)) => {
                if x.doc_id < y.doc_id {
                    merged.push(x);
                    next_a = a.next();
                    next_b = Some(y);
                } else if x.doc_id > y.doc_id {
                    merged.push(y);
                    next_a = Some(x);
                    next_b = b.next();
                } else {
                    let mut combined = x;
                    combined.term_freq += y.term_freq;
                    combined.positions.extend(y.positions);
                    merged.push(combined);
                    next_a = a.next();
                    next_b = b.next();
                }
            }
            (Some(x), None) => {
                merged.push(x);
                merged.extend(a.by_ref());
                break;
            }
            (None, Some(y)) => {
                merged.push(y);
                merged.extend(b.by_ref());
                break;
            }
            (None, None) => break,
        }
    }
    merged
}

fn open_rw(path: &PathBuf) -> Result<File> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(path)?;
    Ok(file)
}

fn write_file(path: &PathBuf, header: &[u8], body: &[u8]) -> Result<()> {
    let mut file = File::create(path)?;
    file.write_all(header)?;
    file.write_all(body)?;
    file.sync_all()?;
    Ok(())
}

fn terms_header(term_count: u64, total_postings: u64, body: &[u8]) -> Vec<u8> {
    let mut header = Vec::with_capacity(TERMS_HEADER_LEN);
    header.extend_from_slice(&TERMS_MAGIC);
    header.extend_from_slice(&FTS_VERSION.to_le_bytes());
    header.extend_from_slice(&term_count.to_le_bytes());
    header.extend_from_slice(&total_postings.to_le_bytes());
    header.extend_from_slice(&crc32(body).to_le_bytes());
    header.extend_from_slice(&0u32.to_le_bytes());
    header
}

fn postings_header(count: u64, body: &[u8]) -> Vec<u8> {
    let mut header = Vec::with_capacity(POSTINGS_HEADER_LEN);
    header.extend_from_slice(&POSTINGS_MAGIC);
    header.extend_from_slice(&FTS_VERSION.to_le_bytes());
    header.extend_from_slice(&count.to_le_bytes());
    header.extend_from_slice(&crc32(body).to_le_bytes());
    header.extend_from_slice(&0u32.to_le_bytes());
    header
}

fn validate_postings_header(buf: &[u8]) -> Result<u64> {
    if buf.is_empty() {
        return Ok(0);
    }
    if buf.len() < POSTINGS_HEADER_LEN {
        return Err(Error::new(ErrorKind::Corrupt, "posting file header truncated"));
    }
    if buf[0..4] != POSTINGS_MAGIC {
        return Err(Error::new(ErrorKind::Corrupt, "bad posting file magic"));
    }
    let version = read_u32(buf, 4);
    if version != FTS_VERSION {
        return Err(Error::new(
            ErrorKind::Corrupt,
            format!("posting file version {} unsupported", version),
        ));
    }
    let count = read_u64(buf, 8);
    let checksum = read_u32(buf, 16);
    if crc32(&buf[POSTINGS_HEADER_LEN..]) != checksum {
        return Err(Error::new(ErrorKind::Corrupt, "posting file checksum mismatch"));
    }
    Ok(count)
}

fn read_meta(path: &PathBuf) -> Result<IndexMeta> {
    let buf = fs::read(path)?;
    if buf.len() < META_LEN {
        return Err(Error::new(ErrorKind::Corrupt, "meta file truncated"));
    }
    if buf[0..4] != META_MAGIC {
        return Err(Error::new(ErrorKind::Corrupt, "bad meta magic"));
    }
    let version = read_u32(&buf, 4);
    if version != FTS_VERSION {
        return Err(Error::new(
            ErrorKind::Corrupt,
            format!("meta version {} unsupported", version),
        ));
    }
    let checksum = read_u32(&buf, 56);
    if crc32(&buf[0..56]) != checksum {
        return Err(Error::new(ErrorKind::Corrupt, "meta checksum mismatch"));
    }
    Ok(IndexMeta {
        total_docs: read_u64(&buf, 8),
        total_terms: read_u64(&buf, 16),
        total_tokens: read_u64(&buf, 24),
        // avg_doc_len at offset 32 is derived; recomputed on demand.
        last_doc_id: read_u64(&buf, 40),
        timestamp: read_u64(&buf, 48),
    })
}

fn write_meta(path: &PathBuf, meta: &IndexMeta) -> Result<()> {
    let mut buf = Vec::with_capacity(META_LEN);
    buf.extend_from_slice(&META_MAGIC);
    buf.extend_from_slice(&FTS_VERSION.to_le_bytes());
    buf.extend_from_slice(&meta.total_docs.to_le_bytes());
    buf.extend_from_slice(&meta.total_terms.to_le_bytes());
    buf.extend_from_slice(&meta.total_tokens.to_le_bytes());
    buf.extend_from_slice(&meta.avg_doc_len_fx().to_le_bytes());
    buf.extend_from_slice(&meta.last_doc_id.to_le_bytes());
    buf.extend_from_slice(&meta.timestamp.to_le_bytes());
    let checksum = crc32(&buf);
    buf.extend_from_slice(&checksum.to_le_bytes());
    buf.extend_from_slice(&0u32.to_le_bytes());

    let tmp = StorageLayout::tmp_sibling(path);
    let mut file = File::create(&tmp)?;
    file.write_all(&buf)?;
    file.sync_all()?;
    fs::rename(&tmp, path)?;
    Ok(())
}
