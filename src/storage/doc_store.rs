use roaring::RoaringTreemap;
use crate::core::config::Config;
use crate::core::error::Result;
use crate::core::types::DocId;
use crate::storage::doc_index::DocIndex;
use crate::storage::doc_log::{DocLog, DocRecordHeader};
use crate::storage::layout::StorageLayout;
use crate::storage::wal::{Wal, WalRecord};

/// The document store: an append-only log, a sorted doc_id -> offset index,
/// and a write-ahead log that makes the pair crash-recoverable.
///
/// Mutations follow one discipline: the WAL entry is appended first, then
/// the log/index mutation is applied. `sync` checkpoints and truncates the
/// WAL once everything it describes is durable. On open, the WAL tail is
/// replayed; replay is idempotent because PUT entries carry the offset the
/// record was meant to land at.
pub struct DocStore {
    log: DocLog,
    index: DocIndex,
    wal: Wal,
    /// Tombstoned doc_ids, consulted by the query path.
    deleted: RoaringTreemap,
    next_doc_id: u64,
    live_docs: u64,
    live_payload_bytes: u64,
}

impl DocStore {
    pub fn open(layout: &StorageLayout, config: &Config) -> Result<Self> {
        let mut log = DocLog::open(&layout.doc_log_path(), config.max_doc_size)?;
        let mut index = DocIndex::open(&layout.doc_index_path(), config.doc_index_buffer_cap)?;
        let mut wal = Wal::open(&layout.wal_path())?;

        // Rebuild the tombstone set and allocation state from the log.
        let mut deleted = RoaringTreemap::new();
        let mut max_doc_id = 0u64;
        let mut live_docs = 0u64;
        let mut live_payload_bytes = 0u64;
        log.scan_headers(|_, header| {
            max_doc_id = max_doc_id.max(header.doc_id.0);
            if header.is_deleted() {
                deleted.insert(header.doc_id.0);
            } else {
                live_docs += 1;
                live_payload_bytes += header.payload_len as u64;
            }
        })?;

        // Replay mutations the WAL holds since the last checkpoint.
        let replayed = wal.recover(|record| {
            match record {
                WalRecord::Put {
                    doc_id,
                    reserved_offset,
                    payload,
                } => {
                    let applied = log
                        .read_header(reserved_offset)
                        .map(|h| h.doc_id == doc_id)
                        .unwrap_or(false);
                    let offset = if applied {
                        reserved_offset
                    } else {
                        let offset = log.append(doc_id, payload)?;
                        live_docs += 1;
                        live_payload_bytes += payload.len() as u64;
                        offset
                    };
                    index.insert(doc_id, offset)?;
                    max_doc_id = max_doc_id.max(doc_id.0);
                }
                WalRecord::Delete { doc_id } => {
                    if let Ok(offset) = index.lookup(doc_id) {
                        if let Ok(header) = log.read_header(offset) {
                            if !header.is_deleted() {
                                log.mark_deleted(offset)?;
                                live_docs = live_docs.saturating_sub(1);
                                live_payload_bytes = live_payload_bytes
                                    .saturating_sub(header.payload_len as u64);
                            }
                        }
                    }
                    index.remove(doc_id)?;
                    deleted.insert(doc_id.0);
                }
            }
            Ok(())
        })?;

        if replayed > 0 {
            log::info!("doc store replayed {} WAL records", replayed);
            log.sync()?;
            index.merge()?;
            index.sync()?;
            wal.checkpoint()?;
            wal.truncate()?;
        }

        Ok(DocStore {
            log,
            index,
            wal,
            deleted,
            next_doc_id: max_doc_id + 1,
            live_docs,
            live_payload_bytes,
        })
    }

    /// Append a document and return its id and log offset.
    pub fn put(&mut self, payload: &[u8]) -> Result<(DocId, u64)> {
        // Size-check before the WAL append; an oversized PUT must not be
        // recorded, or every replay would fail on it.
        self.log.check_size(payload)?;
        let doc_id = DocId(self.next_doc_id);
        let reserved = self.log.end_offset();
        self.wal.append_put(doc_id, reserved, payload)?;
        let offset = self.log.append(doc_id, payload)?;
        self.index.insert(doc_id, offset)?;
        self.next_doc_id += 1;
        self.live_docs += 1;
        self.live_payload_bytes += payload.len() as u64;
        Ok((doc_id, offset))
    }

    pub fn get(&mut self, doc_id: DocId) -> Result<Vec<u8>> {
        let offset = self.index.lookup(doc_id)?;
        self.log.get(offset)
    }

    /// Read a payload by log offset.
    pub fn get_at(&mut self, offset: u64) -> Result<Vec<u8>> {
        self.log.get(offset)
    }

    pub fn get_header(&mut self, offset: u64) -> Result<DocRecordHeader> {
        self.log.read_header(offset)
    }

    /// Tombstone a document. The payload stays in the log until compaction;
    /// searches stop returning the id immediately.
    pub fn delete(&mut self, doc_id: DocId) -> Result<()> {
        let offset = self.index.lookup(doc_id)?;
        self.wal.append_delete(doc_id)?;
        let header = self.log.read_header(offset)?;
        self.log.mark_deleted(offset)?;
        self.index.remove(doc_id)?;
        self.deleted.insert(doc_id.0);
        self.live_docs = self.live_docs.saturating_sub(1);
        self.live_payload_bytes = self
            .live_payload_bytes
            .saturating_sub(header.payload_len as u64);
        Ok(())
    }

    pub fn mark_deleted(&mut self, offset: u64) -> Result<()> {
        self.log.mark_deleted(offset)
    }

    pub fn index_lookup(&self, doc_id: DocId) -> Result<u64> {
        self.index.lookup(doc_id)
    }

    pub fn index_insert(&mut self, doc_id: DocId, offset: u64) -> Result<()> {
        self.index.insert(doc_id, offset)
    }

    pub fn index_remove(&mut self, doc_id: DocId) -> Result<()> {
        self.index.remove(doc_id)
    }

    pub fn index_merge(&mut self) -> Result<()> {
        self.index.merge()
    }

    pub fn index_count(&mut self) -> Result<u64> {
        self.index.count()
    }

    pub fn is_deleted(&self, doc_id: DocId) -> bool {
        self.deleted.contains(doc_id.0)
    }

    pub fn deleted_docs(&self) -> &RoaringTreemap {
        &self.deleted
    }

    pub fn live_docs(&self) -> u64 {
        self.live_docs
    }

    pub fn next_doc_id(&self) -> u64 {
        self.next_doc_id
    }

    pub fn wal_sequence(&self) -> u64 {
        self.wal.sequence()
    }

    pub fn log_size(&self) -> u64 {
        self.log.size()
    }

    pub fn wal_size(&self) -> u64 {
        self.wal.size()
    }

    /// Average live payload length in 16.16 fixed point, for BM25 length
    /// normalisation.
    pub fn avg_doc_bytes_fx(&self) -> u64 {
        if self.live_docs == 0 {
            0
        } else {
            (self.live_payload_bytes << 16) / self.live_docs
        }
    }

    /// Make everything durable, then checkpoint and reset the WAL.
    pub fn sync(&mut self) -> Result<()> {
        self.log.sync()?;
        self.index.merge()?;
        self.index.sync()?;
        self.wal.checkpoint()?;
        self.wal.truncate()?;
        Ok(())
    }

    pub fn close(mut self) -> Result<()> {
        self.sync()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;
    use std::io::{Seek, SeekFrom, Write};
    use crate::core::error::ErrorKind;
    use crate::storage::doc_log::DOC_HEADER_LEN;

    fn store(dir: &tempfile::TempDir) -> DocStore {
        let layout = StorageLayout::new(dir.path().to_path_buf()).unwrap();
        DocStore::open(&layout, &Config::with_dir(dir.path())).unwrap()
    }

    #[test]
    fn test_put_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store(&dir);

        let (id_a, off_a) = store.put(b"alpha document").unwrap();
        let (id_b, _) = store.put(b"beta document").unwrap();
        assert_eq!(id_a, DocId(1));
        assert_eq!(id_b, DocId(2));

        assert_eq!(store.get(id_a).unwrap(), b"alpha document");
        assert_eq!(store.get(id_b).unwrap(), b"beta document");
        assert_eq!(store.get_at(off_a).unwrap(), b"alpha document");
        assert_eq!(store.index_lookup(id_a).unwrap(), off_a);
        assert_eq!(store.live_docs(), 2);
    }

    #[test]
    fn test_delete_tombstones() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store(&dir);
        let (id, _) = store.put(b"short lived").unwrap();
        store.delete(id).unwrap();

        assert_eq!(store.get(id).unwrap_err().kind, ErrorKind::NotFound);
        assert!(store.is_deleted(id));
        assert_eq!(store.live_docs(), 0);
        assert_eq!(store.get(DocId(99)).unwrap_err().kind, ErrorKind::NotFound);
    }

    #[test]
    fn test_doc_ids_never_reused() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store = store(&dir);
            let (id, _) = store.put(b"one").unwrap();
            store.delete(id).unwrap();
            store.sync().unwrap();
        }
        let mut store = store(&dir);
        let (id, _) = store.put(b"two").unwrap();
        assert_eq!(id, DocId(2));
    }

    #[test]
    fn test_reopen_after_sync() {
        let dir = tempfile::tempdir().unwrap();
        let id;
        {
            let mut store = store(&dir);
            id = store.put(b"durable").unwrap().0;
            store.sync().unwrap();
        }
        let mut store = store(&dir);
        assert_eq!(store.get(id).unwrap(), b"durable");
        assert_eq!(store.wal_size(), 0);
    }

    #[test]
    fn test_wal_replay_after_lost_index() {
        // Simulate a crash before the doc index reached disk: the WAL alone
        // must bring the store back.
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(dir.path().to_path_buf()).unwrap();
        let (id_a, id_b);
        {
            let mut store = store(&dir);
            id_a = store.put(b"first").unwrap().0;
            id_b = store.put(b"second").unwrap().0;
            // No sync: buffer never merged, WAL never checkpointed.
        }
        // Drop the unmerged index file entirely.
        std::fs::remove_file(layout.doc_index_path()).unwrap();

        let mut store = store(&dir);
        assert_eq!(store.get(id_a).unwrap(), b"first");
        assert_eq!(store.get(id_b).unwrap(), b"second");
        // Recovery checkpointed and reset the WAL.
        assert_eq!(store.wal_size(), 0);
    }

    #[test]
    fn test_wal_replay_restores_lost_log_records() {
        // Crash where the WAL was written but the log append never landed:
        // truncate the log to before the second record.
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(dir.path().to_path_buf()).unwrap();
        let (id_a, id_b, off_b);
        {
            let mut store = store(&dir);
            id_a = store.put(b"kept").unwrap().0;
            let (id, off) = store.put(b"lost append").unwrap();
            id_b = id;
            off_b = off;
        }
        std::fs::remove_file(layout.doc_index_path()).unwrap();
        {
            let f = OpenOptions::new().write(true).open(layout.doc_log_path()).unwrap();
            f.set_len(off_b).unwrap();
        }

        let mut store = store(&dir);
        assert_eq!(store.get(id_a).unwrap(), b"kept");
        assert_eq!(store.get(id_b).unwrap(), b"lost append");
    }

    #[test]
    fn test_wal_replay_applies_deletes() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(dir.path().to_path_buf()).unwrap();
        let id;
        {
            let mut store = store(&dir);
            id = store.put(b"to be deleted").unwrap().0;
            store.sync().unwrap();
            store.delete(id).unwrap();
            // No sync after the delete.
        }
        let store_reopened = {
            let mut s = store(&dir);
            assert_eq!(s.get(id).unwrap_err().kind, ErrorKind::NotFound);
            assert!(s.is_deleted(id));
            s
        };
        drop(store_reopened);
    }

    #[test]
    fn test_corrupt_record_is_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(dir.path().to_path_buf()).unwrap();
        let (id_a, off_a, id_b);
        {
            let mut store = store(&dir);
            let (a, off) = store.put(b"will corrupt").unwrap();
            id_a = a;
            off_a = off;
            id_b = store.put(b"stays intact").unwrap().0;
            store.sync().unwrap();
        }
        {
            let mut f = OpenOptions::new().write(true).open(layout.doc_log_path()).unwrap();
            f.seek(SeekFrom::Start(off_a + DOC_HEADER_LEN as u64)).unwrap();
            f.write_all(b"Z").unwrap();
        }
        let mut store = store(&dir);
        assert_eq!(store.get(id_a).unwrap_err().kind, ErrorKind::Corrupt);
        assert_eq!(store.get(id_b).unwrap(), b"stays intact");
    }

    #[test]
    fn test_avg_doc_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store(&dir);
        store.put(&[b'a'; 10]).unwrap();
        store.put(&[b'b'; 30]).unwrap();
        assert_eq!(store.avg_doc_bytes_fx(), 20 << 16);
    }
}
