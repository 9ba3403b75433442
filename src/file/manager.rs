use anyhow::Result;
use std::{
    collections::HashMap,
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    sync::Mutex,
};

use super::block_id::BlockId;
use super::page::Page;

struct Inner {
    open_files: HashMap<String, File>,
    total_blocks_read: u64,
    total_blocks_written: u64,
}

/// Single point of OS-level I/O. All four I/O methods are serialized on
/// one process-wide lock, so seek+transfer on a shared file handle is
/// never interleaved with another caller's seek+transfer.
pub struct FileMgr {
    db_dir: PathBuf,
    block_size: usize,
    is_new: bool,
    inner: Mutex<Inner>,
}

impl FileMgr {
    pub fn new(db_dir: impl AsRef<Path>, block_size: usize) -> Result<Self> {
        let db_dir = db_dir.as_ref().to_path_buf();
        let is_new = !db_dir.exists();

        if is_new {
            std::fs::create_dir_all(&db_dir)?;
        }

        for entry in std::fs::read_dir(&db_dir)? {
            let entry = entry?;
            let is_temp = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with("temp"));
            if is_temp && entry.path().is_file() {
                std::fs::remove_file(entry.path())?;
            }
        }

        Ok(Self {
            db_dir,
            block_size,
            is_new,
            inner: Mutex::new(Inner {
                open_files: HashMap::new(),
                total_blocks_read: 0,
                total_blocks_written: 0,
            }),
        })
    }

    pub fn read(&self, block: &BlockId, page: &mut Page) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let file = Self::open_file(&self.db_dir, &mut inner.open_files, block.filename())?;

        let pos = (block.block_number() as u64) * self.block_size as u64;
        file.seek(SeekFrom::Start(pos))?;

        let mut buf = vec![0u8; self.block_size];
        let len = file.metadata()?.len();
        if len >= pos + self.block_size as u64 {
            file.read_exact(&mut buf)?;
        } else if len > pos {
            file.read_exact(&mut buf[..(len - pos) as usize])?;
        }

        let contents = page.contents();
        contents.clear();
        contents.write_bytes(&buf);

        inner.total_blocks_read += 1;
        Ok(())
    }

    pub fn write(&self, block: &BlockId, page: &mut Page) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let file = Self::open_file(&self.db_dir, &mut inner.open_files, block.filename())?;

        let pos = (block.block_number() as u64) * self.block_size as u64;
        file.seek(SeekFrom::Start(pos))?;
        file.write_all(page.contents().as_bytes())?;
        file.sync_all()?;

        inner.total_blocks_written += 1;
        Ok(())
    }

    pub fn append(&self, filename: &str) -> Result<BlockId> {
        let mut inner = self.inner.lock().unwrap();
        let new_block_number =
            Self::length_locked(&self.db_dir, &mut inner.open_files, filename, self.block_size)?;
        let block = BlockId::new(filename, new_block_number);

        let file = Self::open_file(&self.db_dir, &mut inner.open_files, filename)?;
        file.seek(SeekFrom::Start(
            new_block_number as u64 * self.block_size as u64,
        ))?;
        file.write_all(&vec![0u8; self.block_size])?;
        file.sync_all()?;

        inner.total_blocks_written += 1;
        Ok(block)
    }

    pub fn length(&self, filename: &str) -> Result<i64> {
        let mut inner = self.inner.lock().unwrap();
        Self::length_locked(&self.db_dir, &mut inner.open_files, filename, self.block_size)
    }

    /// Shrinks `filename` to exactly `blocks` blocks. Used to undo file
    /// extensions performed by a transaction that rolled back.
    pub fn truncate(&self, filename: &str, blocks: i64) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let file = Self::open_file(&self.db_dir, &mut inner.open_files, filename)?;
        file.set_len(blocks as u64 * self.block_size as u64)?;
        Ok(())
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn total_blocks_read(&self) -> u64 {
        self.inner.lock().unwrap().total_blocks_read
    }

    pub fn total_blocks_written(&self) -> u64 {
        self.inner.lock().unwrap().total_blocks_written
    }

    fn length_locked(
        db_dir: &Path,
        open_files: &mut HashMap<String, File>,
        filename: &str,
        block_size: usize,
    ) -> Result<i64> {
        let file = Self::open_file(db_dir, open_files, filename)?;
        let len = file.metadata()?.len();
        Ok((len / block_size as u64) as i64)
    }

    fn open_file<'a>(
        db_dir: &Path,
        open_files: &'a mut HashMap<String, File>,
        filename: &str,
    ) -> Result<&'a mut File> {
        if !open_files.contains_key(filename) {
            let path = db_dir.join(filename);
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .open(path)?;
            open_files.insert(filename.to_string(), file);
        }
        Ok(open_files.get_mut(filename).unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_then_read_roundtrip() {
        let dir = tempdir().unwrap();
        let fm = FileMgr::new(dir.path(), 400).unwrap();
        let block = BlockId::new("t.tbl", 0);

        let mut page = Page::new(400);
        page.set_int(0, 99).unwrap();
        fm.write(&block, &mut page).unwrap();

        let mut page2 = Page::new(400);
        fm.read(&block, &mut page2).unwrap();
        assert_eq!(page2.get_int(0).unwrap(), 99);
    }

    #[test]
    fn append_grows_file_one_block_at_a_time() {
        let dir = tempdir().unwrap();
        let fm = FileMgr::new(dir.path(), 400).unwrap();

        let b0 = fm.append("t.tbl").unwrap();
        let b1 = fm.append("t.tbl").unwrap();
        assert_eq!(b0.block_number(), 0);
        assert_eq!(b1.block_number(), 1);
        assert_eq!(fm.length("t.tbl").unwrap(), 2);
    }

    #[test]
    fn truncate_shrinks_file() {
        let dir = tempdir().unwrap();
        let fm = FileMgr::new(dir.path(), 400).unwrap();
        fm.append("t.tbl").unwrap();
        fm.append("t.tbl").unwrap();
        fm.append("t.tbl").unwrap();
        assert_eq!(fm.length("t.tbl").unwrap(), 3);

        fm.truncate("t.tbl", 1).unwrap();
        assert_eq!(fm.length("t.tbl").unwrap(), 1);
    }

    #[test]
    fn startup_deletes_temp_files() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("temp_table_7"), b"garbage").unwrap();
        std::fs::write(dir.path().join("kept.tbl"), b"data").unwrap();

        FileMgr::new(dir.path(), 400).unwrap();

        assert!(!dir.path().join("temp_table_7").exists());
        assert!(dir.path().join("kept.tbl").exists());
    }
}
