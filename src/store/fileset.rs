use std::{
    fs,
    path::{Path, PathBuf},
};

use zerocopy::{AsBytes, FromBytes};

use super::{
    error::{Result, StoreError},
    file::DataFile,
    loc::DiskLoc,
    repr::DATA_FILE_HEADER_SIZE,
};
use crate::{config::FilesConfig, misc::round_up_to};

/// The ordered backing files of one database.
///
/// This does not know anything about extents or records, it only maps files, grows the set, and
/// resolves [`DiskLoc`]s to bytes.
pub struct FileSet {
    dir: PathBuf,
    dbname: String,
    cfg: FilesConfig,
    page_size: i32,
    files: Vec<DataFile>,
}

impl FileSet {
    pub fn new(path: &Path, dbname: &str, cfg: FilesConfig, page_size: i32) -> Self {
        let dir = if cfg.directory_per_db {
            path.join(dbname)
        } else {
            path.to_path_buf()
        };
        Self {
            dir,
            dbname: dbname.to_string(),
            cfg,
            page_size,
            files: vec![],
        }
    }

    /// Opens every consecutive existing `<db>.<n>` file, starting at 0
    #[instrument(skip(self), fields(db = %self.dbname))]
    pub fn init(&mut self) -> Result<()> {
        self.files.clear();
        loop {
            let n = self.files.len() as i32;
            let name = self.file_name(n);
            if !name.is_file() {
                break;
            }
            self.files.push(DataFile::open(&name, n)?);
        }
        info!("opened {} data file(s) for `{}`", self.files.len(), self.dbname);
        Ok(())
    }

    /// drops (unmaps) all files. they stay on disk
    pub fn reset(&mut self) {
        self.files.clear();
    }

    pub fn dbname(&self) -> &str {
        &self.dbname
    }

    pub fn file_name(&self, n: i32) -> PathBuf {
        self.dir.join(format!("{}.{n}", self.dbname))
    }

    pub fn num_files(&self) -> usize {
        self.files.len()
    }

    /// sum of the lengths of all open files
    pub fn total_size(&self) -> i64 {
        self.files.iter().map(|f| f.len() as i64).sum()
    }

    pub fn files(&self) -> impl Iterator<Item = &DataFile> {
        self.files.iter()
    }

    pub fn file(&self, n: i32) -> Option<&DataFile> {
        usize::try_from(n).ok().and_then(|n| self.files.get(n))
    }

    pub fn file_mut(&mut self, n: i32) -> Option<&mut DataFile> {
        usize::try_from(n).ok().and_then(|n| self.files.get_mut(n))
    }

    /// size of file `n`, making sure it can hold `size_needed` bytes past the header
    pub fn default_size(&self, n: i32, size_needed: i32) -> Result<i32> {
        let shift = n.clamp(0, 30) as u32;
        let mut size = (self.cfg.initial_file_size as i64)
            .saturating_mul(1i64 << shift)
            .min(self.cfg.max_file_size as i64);
        let needed = size_needed as i64 + DATA_FILE_HEADER_SIZE as i64;
        if size < needed {
            size = round_up_to(needed as usize, self.page_size as usize) as i64;
        }
        i32::try_from(size).map_err(|_| StoreError::OutOfSpace(size_needed))
    }

    /// Appends a new file able to hold at least `size_needed` bytes, returning its number.
    ///
    /// a file preallocated by [`preallocate_next`](Self::preallocate_next) is used if it is big
    /// enough.
    #[instrument(skip(self), fields(db = %self.dbname))]
    pub fn add_file(&mut self, size_needed: i32) -> Result<i32> {
        let n = self.files.len() as i32;
        let size = self.default_size(n, size_needed)?;
        fs::create_dir_all(&self.dir)?;
        let name = self.file_name(n);
        let reusable = name.is_file() && {
            match DataFile::open(&name, n) {
                Ok(f) => {
                    let usable = f.header().unused_length >= size_needed;
                    if usable {
                        self.files.push(f);
                    }
                    usable
                }
                Err(e) => {
                    warn!("ignoring unusable preallocated file {name:?}: {e}");
                    false
                }
            }
        };
        if !reusable {
            self.files.push(DataFile::create(&name, n, size)?);
        }
        info!(
            "added data file {name:?} ({})",
            crate::misc::sfmt(self.files[n as usize].len() as usize)
        );
        if self.cfg.preallocate_next {
            self.preallocate_next()?;
        }
        Ok(n)
    }

    /// creates the next file on disk ahead of need, without opening it
    #[instrument(skip(self), fields(db = %self.dbname))]
    pub fn preallocate_next(&mut self) -> Result<()> {
        let n = self.files.len() as i32;
        let name = self.file_name(n);
        if name.exists() {
            return Ok(());
        }
        fs::create_dir_all(&self.dir)?;
        let size = self.default_size(n, 0)?;
        drop(DataFile::create(&name, n, size)?);
        debug!("preallocated {name:?}");
        Ok(())
    }

    pub fn flush(&self, sync: bool) -> Result<()> {
        for file in &self.files {
            file.flush(sync)?;
        }
        Ok(())
    }

    pub fn read<T: FromBytes>(&self, at: DiskLoc) -> Result<T> {
        self.file(at.file)
            .and_then(|f| f.read(at.ofs))
            .ok_or(StoreError::InvalidLoc(at))
    }

    pub fn write<T: AsBytes>(&mut self, at: DiskLoc, val: &T) -> Result<()> {
        self.file_mut(at.file)
            .and_then(|f| f.write(at.ofs, val))
            .ok_or(StoreError::InvalidLoc(at))
    }

    pub fn bytes(&self, at: DiskLoc, len: usize) -> Result<&[u8]> {
        self.file(at.file)
            .and_then(|f| f.bytes(at.ofs, len))
            .ok_or(StoreError::InvalidLoc(at))
    }

    pub fn bytes_mut(&mut self, at: DiskLoc, len: usize) -> Result<&mut [u8]> {
        self.file_mut(at.file)
            .and_then(|f| f.bytes_mut(at.ofs, len))
            .ok_or(StoreError::InvalidLoc(at))
    }

    /// numeric address of `at` in this process, for residency checks only
    pub fn addr_of(&self, at: DiskLoc) -> Result<usize> {
        self.file(at.file)
            .and_then(|f| f.addr_of(at.ofs))
            .ok_or(StoreError::InvalidLoc(at))
    }
}
