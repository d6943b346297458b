use std::fs::File;
use std::path::Path;
use memmap2::{Mmap, MmapOptions};
use crate::core::error::Result;

/// Read-only memory map of a data file.
///
/// Empty files cannot be mapped, so `mmap` is absent until the file has
/// content; `data()` then yields an empty slice. Appends through the file
/// descriptor become visible by calling `remap` (the mapping is shared, so
/// in-place rewrites inside the mapped range need no remap).
#[derive(Debug)]
pub struct MmapFile {
    mmap: Option<Mmap>,
    len: usize,
}

impl MmapFile {
    pub fn map(file: &File) -> Result<Self> {
        let len = file.metadata()?.len() as usize;
        if len == 0 {
            return Ok(MmapFile { mmap: None, len: 0 });
        }
        let mmap = unsafe { MmapOptions::new().map(file)? };
        Ok(MmapFile {
            mmap: Some(mmap),
            len,
        })
    }

    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)?;
        Self::map(&file)
    }

    pub fn remap(&mut self, file: &File) -> Result<()> {
        *self = Self::map(file)?;
        Ok(())
    }

    pub fn data(&self) -> &[u8] {
        self.mmap.as_deref().unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_file_maps_to_empty_slice() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.dat");
        let file = File::create(&path).unwrap();
        let mmap = MmapFile::map(&file).unwrap();
        assert!(mmap.is_empty());
        assert_eq!(mmap.data(), &[] as &[u8]);
    }

    #[test]
    fn test_remap_sees_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grow.dat");
        let mut file = File::create(&path).unwrap();
        file.write_all(b"abc").unwrap();

        let read = File::open(&path).unwrap();
        let mut mmap = MmapFile::map(&read).unwrap();
        assert_eq!(mmap.data(), b"abc");

        file.write_all(b"def").unwrap();
        mmap.remap(&read).unwrap();
        assert_eq!(mmap.data(), b"abcdef");
        assert_eq!(mmap.len(), 6);
    }
}
