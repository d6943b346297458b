use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;
use chrono::Utc;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::DocId;
use crate::core::utils::{align8, crc32, read_u32, read_u64};
use crate::mmap::mmap_file::MmapFile;

pub const DOC_MAGIC: [u8; 4] = *b"DOCD";
/// magic(4) length(4) doc_id(8) timestamp(8) flags(4) payload_len(4) crc32(4)
pub const DOC_HEADER_LEN: usize = 36;
pub const FLAG_DELETED: u32 = 1;

/// Parsed doc-record header.
#[derive(Debug, Clone, Copy)]
pub struct DocRecordHeader {
    /// Header + payload, excluding alignment padding.
    pub length: u32,
    pub doc_id: DocId,
    pub timestamp: u64,
    pub flags: u32,
    pub payload_len: u32,
    pub crc: u32,
}

impl DocRecordHeader {
    pub fn is_deleted(&self) -> bool {
        self.flags & FLAG_DELETED != 0
    }
}

/// Append-only log of document records.
///
/// Records are appended through the fd and read back through a shared
/// read-only mapping; each record starts on an 8-byte boundary. The log
/// itself has no file header: an empty file is an empty log.
pub struct DocLog {
    file: File,
    mmap: MmapFile,
    size: u64,
    max_doc_size: usize,
}

impl DocLog {
    pub fn open(path: &Path, max_doc_size: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        let size = file.metadata()?.len();
        let mmap = MmapFile::map(&file)?;
        let mut log = DocLog {
            file,
            mmap,
            size,
            max_doc_size,
        };
        log.truncate_torn_tail()?;
        Ok(log)
    }

    /// Drop a partially written record left by a crash mid-append. The WAL
    /// re-applies the lost mutation, so cutting the tail loses nothing.
    fn truncate_torn_tail(&mut self) -> Result<()> {
        let valid_end = {
            let buf = self.mmap.data();
            let mut offset = 0u64;
            loop {
                if offset + DOC_HEADER_LEN as u64 > self.size {
                    break offset;
                }
                let off = offset as usize;
                if buf[off..off + 4] != DOC_MAGIC {
                    break offset;
                }
                let length = read_u32(buf, off + 4) as u64;
                if length < DOC_HEADER_LEN as u64 {
                    break offset;
                }
                let next = offset + align8(length as usize) as u64;
                if next > self.size {
                    break offset;
                }
                offset = next;
            }
        };
        if valid_end < self.size {
            log::warn!(
                "doc log: dropping torn tail, {} of {} bytes kept",
                valid_end,
                self.size
            );
            self.file.set_len(valid_end)?;
            self.size = valid_end;
            self.mmap.remap(&self.file)?;
        }
        Ok(())
    }

    /// Offset the next appended record will land at.
    pub fn end_offset(&self) -> u64 {
        self.size
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Reject payloads over the configured maximum.
    pub fn check_size(&self, payload: &[u8]) -> Result<()> {
        if payload.len() > self.max_doc_size {
            return Err(Error::new(
                ErrorKind::TooLarge,
                format!(
                    "document payload {} exceeds maximum {}",
                    payload.len(),
                    self.max_doc_size
                ),
            ));
        }
        Ok(())
    }

    /// Append a record and return its offset.
    pub fn append(&mut self, doc_id: DocId, payload: &[u8]) -> Result<u64> {
        self.check_size(payload)?;

        let offset = self.size;
        let length = (DOC_HEADER_LEN + payload.len()) as u32;
        let padded = align8(length as usize);

        let mut buf = Vec::with_capacity(padded);
        buf.extend_from_slice(&DOC_MAGIC);
        buf.extend_from_slice(&length.to_le_bytes());
        buf.extend_from_slice(&doc_id.0.to_le_bytes());
        buf.extend_from_slice(&(Utc::now().timestamp() as u64).to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes()); // flags
        buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&crc32(payload).to_le_bytes());
        buf.extend_from_slice(payload);
        buf.resize(padded, 0);

        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&buf)?;
        self.size += padded as u64;
        Ok(offset)
    }

    fn ensure_mapped(&mut self, end: u64) -> Result<()> {
        if end as usize > self.mmap.len() {
            self.mmap.remap(&self.file)?;
        }
        Ok(())
    }

    pub fn read_header(&mut self, offset: u64) -> Result<DocRecordHeader> {
        if offset + DOC_HEADER_LEN as u64 > self.size {
            return Err(Error::new(
                ErrorKind::Invalid,
                format!("offset {} past end of log", offset),
            ));
        }
        self.ensure_mapped(offset + DOC_HEADER_LEN as u64)?;
        let buf = self.mmap.data();
        let off = offset as usize;
        if buf[off..off + 4] != DOC_MAGIC {
            return Err(Error::new(
                ErrorKind::Corrupt,
                format!("bad record magic at offset {}", offset),
            ));
        }
        Ok(DocRecordHeader {
            length: read_u32(buf, off + 4),
            doc_id: DocId(read_u64(buf, off + 8)),
            timestamp: read_u64(buf, off + 16),
            flags: read_u32(buf, off + 24),
            payload_len: read_u32(buf, off + 28),
            crc: read_u32(buf, off + 32),
        })
    }

    /// Copy out a record's payload after magic, tombstone and CRC checks.
    pub fn get(&mut self, offset: u64) -> Result<Vec<u8>> {
        let header = self.read_header(offset)?;
        if header.is_deleted() {
            return Err(Error::new(
                ErrorKind::NotFound,
                format!("document {} deleted", header.doc_id),
            ));
        }
        let start = offset as usize + DOC_HEADER_LEN;
        let end = start + header.payload_len as usize;
        if end as u64 > self.size {
            return Err(Error::new(
                ErrorKind::Corrupt,
                format!("record at {} overruns log", offset),
            ));
        }
        self.ensure_mapped(end as u64)?;
        let payload = &self.mmap.data()[start..end];
        if crc32(payload) != header.crc {
            return Err(Error::new(
                ErrorKind::Corrupt,
                format!("payload checksum mismatch at offset {}", offset),
            ));
        }
        Ok(payload.to_vec())
    }

    /// Set the DELETED flag in a record header. The payload stays on disk
    /// until compaction.
    pub fn mark_deleted(&mut self, offset: u64) -> Result<()> {
        let header = self.read_header(offset)?;
        let flags = header.flags | FLAG_DELETED;
        self.file.seek(SeekFrom::Start(offset + 24))?;
        self.file.write_all(&flags.to_le_bytes())?;
        Ok(())
    }

    /// Walk every record header in log order.
    pub fn scan_headers(
        &mut self,
        mut visit: impl FnMut(u64, &DocRecordHeader),
    ) -> Result<()> {
        let mut offset = 0u64;
        while offset + DOC_HEADER_LEN as u64 <= self.size {
            let header = self.read_header(offset)?;
            visit(offset, &header);
            offset += align8(header.length as usize) as u64;
        }
        Ok(())
    }

    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}
