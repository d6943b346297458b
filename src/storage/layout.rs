use std::fs;
use std::path::{Path, PathBuf};
use crate::core::error::Result;

/// File placement for one engine instance: every artefact lives directly
/// under a single data directory with a fixed name.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    pub root_dir: PathBuf,
}

impl StorageLayout {
    pub fn new(root_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root_dir)?;
        Ok(StorageLayout { root_dir })
    }

    /// Append-only document log.
    pub fn doc_log_path(&self) -> PathBuf {
        self.root_dir.join("docs.dat")
    }

    /// Sorted doc_id -> offset map.
    pub fn doc_index_path(&self) -> PathBuf {
        self.root_dir.join("docs.idx")
    }

    pub fn wal_path(&self) -> PathBuf {
        self.root_dir.join("wal.log")
    }

    /// Term dictionary.
    pub fn terms_path(&self) -> PathBuf {
        self.root_dir.join("terms.fts")
    }

    pub fn postings_path(&self) -> PathBuf {
        self.root_dir.join("postings.fts")
    }

    pub fn meta_path(&self) -> PathBuf {
        self.root_dir.join("meta.fts")
    }

    /// Side file written during an atomic rename install.
    pub fn tmp_sibling(path: &Path) -> PathBuf {
        let mut name = path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        path.with_file_name(name)
    }
}
