use std::{
    fs::{File, OpenOptions},
    mem::size_of,
    ops::Range,
    path::{Path, PathBuf},
};

use memmap2::MmapMut;
use zerocopy::{AsBytes, FromBytes};

use super::{
    error::{Result, StoreError},
    loc::DiskLoc,
    repr::{DataFileHeader, DATA_FILE_HEADER_SIZE},
};

/// One memory mapped backing file (`<db>.<n>`).
///
/// All access goes through bounds checked copies, so nothing handed out by this type can outlive
/// the mapping.
pub struct DataFile {
    path: PathBuf,
    file_no: i32,
    // kept open for `sync_all` and so the mapping stays backed by a live handle
    file: File,
    map: MmapMut,
}

impl DataFile {
    /// Creates (or truncates) the file at `path`, sizes it to `len` bytes and writes a fresh header.
    #[instrument]
    pub fn create(path: &Path, file_no: i32, len: i32) -> Result<Self> {
        assert!(len > DATA_FILE_HEADER_SIZE, "data file too small to hold its header");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(len as u64)?;
        // Saftey: the file set is the only user of these files while the database is open, and
        // the mapping is dropped before the file handle
        let map = unsafe { MmapMut::map_mut(&file) }?;
        let mut this = Self {
            path: path.to_path_buf(),
            file_no,
            file,
            map,
        };
        this.write_header(&DataFileHeader::new(file_no, len));
        debug!("created data file {path:?} ({})", crate::misc::sfmt(len as usize));
        Ok(this)
    }

    /// Maps an existing data file, refusing it if the header is not ours.
    #[instrument]
    pub fn open(path: &Path, file_no: i32) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        // Saftey: see `create`
        let map = unsafe { MmapMut::map_mut(&file) }?;
        let this = Self {
            path: path.to_path_buf(),
            file_no,
            file,
            map,
        };
        let header = this
            .read::<DataFileHeader>(0)
            .ok_or_else(|| StoreError::NotADataFile(path.display().to_string()))?;
        if !header.verify() {
            error!("{path:?} is missing the data file magic bytes - refusing to use it");
            return Err(StoreError::NotADataFile(path.display().to_string()));
        }
        if header.file_length as usize != this.map.len()
            || header.unused.file != file_no
            || header.unused_length < 0
            || header.unused.ofs.checked_add(header.unused_length) != Some(header.file_length)
        {
            error!("data file header of {path:?} is inconsistent: {header:?}");
            return Err(StoreError::Corrupt {
                what: "data file header",
                at: DiskLoc::new(file_no, 0),
            });
        }
        Ok(this)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_no(&self) -> i32 {
        self.file_no
    }

    pub fn len(&self) -> i32 {
        self.map.len() as i32
    }

    pub fn header(&self) -> DataFileHeader {
        self.read(0)
            .expect("data file is always large enough for its header")
    }

    fn write_header(&mut self, header: &DataFileHeader) {
        self.write(0, header)
            .expect("data file is always large enough for its header")
    }

    /// Carves `size` bytes off the front of the unused tail.
    ///
    /// returns `None` (and changes nothing) if the tail is too small.
    pub fn alloc_extent_area(&mut self, size: i32) -> Option<DiskLoc> {
        let mut header = self.header();
        if header.unused_length < size {
            return None;
        }
        let loc = header.unused;
        header.unused = loc.offset(size);
        header.unused_length -= size;
        self.write_header(&header);
        Some(loc)
    }

    fn range(&self, ofs: i32, len: usize) -> Option<Range<usize>> {
        let start = usize::try_from(ofs).ok()?;
        let end = start.checked_add(len)?;
        (end <= self.map.len()).then_some(start..end)
    }

    pub fn read<T: FromBytes>(&self, ofs: i32) -> Option<T> {
        let range = self.range(ofs, size_of::<T>())?;
        T::read_from(&self.map[range])
    }

    pub fn write<T: AsBytes>(&mut self, ofs: i32, val: &T) -> Option<()> {
        let range = self.range(ofs, size_of::<T>())?;
        val.write_to(&mut self.map[range])
    }

    pub fn bytes(&self, ofs: i32, len: usize) -> Option<&[u8]> {
        let range = self.range(ofs, len)?;
        Some(&self.map[range])
    }

    pub fn bytes_mut(&mut self, ofs: i32, len: usize) -> Option<&mut [u8]> {
        let range = self.range(ofs, len)?;
        Some(&mut self.map[range])
    }

    /// virtual address of `ofs` within the mapping.
    ///
    /// only meant as a number to feed the residency estimator / probe, not to be dereferenced
    pub fn addr_of(&self, ofs: i32) -> Option<usize> {
        let range = self.range(ofs, 1)?;
        Some(self.map.as_ptr() as usize + range.start)
    }

    #[instrument(skip(self), fields(path = ?self.path))]
    pub fn flush(&self, sync: bool) -> Result<()> {
        if sync {
            self.map.flush()?;
            self.file.sync_all()?;
        } else {
            self.map.flush_async()?;
        }
        Ok(())
    }
}
