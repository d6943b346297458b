use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::DocId;
use crate::core::utils::{read_i64, read_u32, read_u64};
use crate::mmap::mmap_file::MmapFile;
use crate::storage::layout::StorageLayout;

pub const INDEX_MAGIC: [u8; 4] = *b"DIDX";
pub const INDEX_VERSION: u32 = 1;
/// magic(4) version(4) count(8)
pub const INDEX_HEADER_LEN: usize = 16;
/// doc_id(8) offset(8)
pub const INDEX_ENTRY_LEN: usize = 16;
/// Offset value marking a deleted document.
pub const TOMBSTONE: i64 = -1;

#[derive(Debug, Clone, Copy)]
struct BufferedEntry {
    doc_id: u64,
    offset: i64,
}

/// Sorted doc_id -> log-offset map.
///
/// The disk file holds entries strictly sorted by doc_id; recent mutations
/// sit in an unsorted in-memory buffer that is merged out of place once it
/// fills. Lookups consult the buffer first (newest entry wins), then binary
/// search the mapping. A tombstone is an entry whose offset is -1; merging
/// drops tombstoned ids entirely.
#[derive(Debug)]
pub struct DocIndex {
    file: File,
    mmap: MmapFile,
    path: PathBuf,
    buffer: Vec<BufferedEntry>,
    buffer_cap: usize,
    disk_count: u64,
}

impl DocIndex {
    pub fn open(path: &Path, buffer_cap: usize) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        if file.metadata()?.len() == 0 {
            write_header(&mut file, 0)?;
            file.sync_all()?;
        }

        let mmap = MmapFile::map(&file)?;
        let disk_count = validate_header(mmap.data())?;
        Ok(DocIndex {
            file,
            mmap,
            path: path.to_path_buf(),
            buffer: Vec::with_capacity(buffer_cap),
            buffer_cap: buffer_cap.max(1),
            disk_count,
        })
    }

    pub fn disk_count(&self) -> u64 {
        self.disk_count
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    fn disk_entry(&self, i: usize) -> (u64, i64) {
        let off = INDEX_HEADER_LEN + i * INDEX_ENTRY_LEN;
        let buf = self.mmap.data();
        (read_u64(buf, off), read_i64(buf, off + 8))
    }

    /// Largest doc_id the index knows about.
    pub fn max_doc_id(&self) -> Option<u64> {
        let buffered = self.buffer.iter().map(|e| e.doc_id).max();
        let disk = if self.disk_count > 0 {
            Some(self.disk_entry(self.disk_count as usize - 1).0)
        } else {
            None
        };
        buffered.into_iter().chain(disk).max()
    }

    pub fn lookup(&self, doc_id: DocId) -> Result<u64> {
        // Buffer first, newest entry wins.
        for entry in self.buffer.iter().rev() {
            if entry.doc_id == doc_id.0 {
                return if entry.offset < 0 {
                    Err(not_found(doc_id))
                } else {
                    Ok(entry.offset as u64)
                };
            }
        }

        let mut lo = 0usize;
        let mut hi = self.disk_count as usize;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let (id, offset) = self.disk_entry(mid);
            if id == doc_id.0 {
                return if offset < 0 {
                    Err(not_found(doc_id))
                } else {
                    Ok(offset as u64)
                };
            } else if id < doc_id.0 {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        Err(not_found(doc_id))
    }

    pub fn insert(&mut self, doc_id: DocId, offset: u64) -> Result<()> {
        self.push(BufferedEntry {
            doc_id: doc_id.0,
            offset: offset as i64,
        })
    }

    /// Record a tombstone; the id disappears from the file at the next merge.
    pub fn remove(&mut self, doc_id: DocId) -> Result<()> {
        self.push(BufferedEntry {
            doc_id: doc_id.0,
            offset: TOMBSTONE,
        })
    }

    fn push(&mut self, entry: BufferedEntry) -> Result<()> {
        self.buffer.push(entry);
        if self.buffer.len() >= self.buffer_cap {
            self.merge()?;
        }
        Ok(())
    }

    /// Merge the buffer into the disk file.
    ///
    /// Buffer entries override disk entries with the same doc_id; among
    /// duplicated buffer entries the most recent wins. The merged file is
    /// written to a side path and renamed into place so a crash mid-write
    /// leaves the previous index intact.
    pub fn merge(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        // Stable sort keeps insertion order within one doc_id, so the last
        // entry of each run is the newest.
        self.buffer.sort_by_key(|e| e.doc_id);
        let mut pending: Vec<BufferedEntry> = Vec::with_capacity(self.buffer.len());
        for entry in self.buffer.iter() {
            match pending.last_mut() {
                Some(last) if last.doc_id == entry.doc_id => *last = *entry,
                _ => pending.push(*entry),
            }
        }

        let mut merged: Vec<(u64, i64)> =
            Vec::with_capacity(pending.len() + self.disk_count as usize);
        let mut di = 0usize;
        let mut bi = 0usize;
        while di < self.disk_count as usize && bi < pending.len() {
            let disk = self.disk_entry(di);
            let buf = &pending[bi];
            if disk.0 < buf.doc_id {
                merged.push(disk);
                di += 1;
            } else if disk.0 > buf.doc_id {
                if buf.offset >= 0 {
                    merged.push((buf.doc_id, buf.offset));
                }
                bi += 1;
            } else {
                if buf.offset >= 0 {
                    merged.push((buf.doc_id, buf.offset));
                }
                di += 1;
                bi += 1;
            }
        }
        while di < self.disk_count as usize {
            merged.push(self.disk_entry(di));
            di += 1;
        }
        while bi < pending.len() {
            if pending[bi].offset >= 0 {
                merged.push((pending[bi].doc_id, pending[bi].offset));
            }
            bi += 1;
        }

        let tmp_path = StorageLayout::tmp_sibling(&self.path);
        let mut tmp = File::create(&tmp_path)?;
        write_header(&mut tmp, merged.len() as u64)?;
        let mut body = Vec::with_capacity(merged.len() * INDEX_ENTRY_LEN);
        for (doc_id, offset) in &merged {
            body.extend_from_slice(&doc_id.to_le_bytes());
            body.extend_from_slice(&offset.to_le_bytes());
        }
        tmp.write_all(&body)?;
        tmp.sync_all()?;
        fs::rename(&tmp_path, &self.path)?;

        self.file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        self.mmap.remap(&self.file)?;
        self.disk_count = merged.len() as u64;
        self.buffer.clear();
        Ok(())
    }

    /// Number of live entries. Forces a merge so the count is exact.
    pub fn count(&mut self) -> Result<u64> {
        self.merge()?;
        Ok(self.disk_count)
    }

    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}

fn not_found(doc_id: DocId) -> Error {
    Error::new(ErrorKind::NotFound, format!("doc {} not in index", doc_id))
}

fn write_header(file: &mut File, count: u64) -> Result<()> {
    let mut header = Vec::with_capacity(INDEX_HEADER_LEN);
    header.extend_from_slice(&INDEX_MAGIC);
    header.extend_from_slice(&INDEX_VERSION.to_le_bytes());
    header.extend_from_slice(&count.to_le_bytes());
    file.write_all(&header)?;
    Ok(())
}

fn validate_header(buf: &[u8]) -> Result<u64> {
    if buf.len() < INDEX_HEADER_LEN {
        return Err(Error::new(ErrorKind::Corrupt, "doc index header truncated"));
    }
    if buf[0..4] != INDEX_MAGIC {
        return Err(Error::new(ErrorKind::Corrupt, "bad doc index magic"));
    }
    let version = read_u32(buf, 4);
    if version != INDEX_VERSION {
        return Err(Error::new(
            ErrorKind::Corrupt,
            format!("doc index version {} unsupported", version),
        ));
    }
    let count = read_u64(buf, 8);
    if INDEX_HEADER_LEN + count as usize * INDEX_ENTRY_LEN > buf.len() {
        return Err(Error::new(ErrorKind::Corrupt, "doc index entry count overruns file"));
    }
    Ok(count)
}
