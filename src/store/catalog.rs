//! The namespace catalog: free list anchors and per collection extent chains.
//!
//! kept outside the data files, as pretty printed json next to them (`<db>.ns.json`)

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use super::{error::Result, extent::FreeListAnchor, loc::DiskLoc, record::BUCKETS};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreeListHead {
    pub start: DiskLoc,
    pub end: DiskLoc,
}

impl FreeListAnchor for FreeListHead {
    fn free_list_start(&self) -> DiskLoc {
        self.start
    }
    fn free_list_end(&self) -> DiskLoc {
        self.end
    }
    fn set_free_list_start(&mut self, loc: DiskLoc) {
        self.start = loc;
    }
    fn set_free_list_end(&mut self, loc: DiskLoc) {
        self.end = loc;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionDetails {
    pub capped: bool,
    pub first_extent: DiskLoc,
    pub last_extent: DiskLoc,
    /// heads of the deleted record lists, one per size bucket
    pub deleted: [DiskLoc; BUCKETS],
    pub nrecords: i64,
    /// payload bytes in live records
    pub data_size: i64,
    pub last_extent_size: i32,
}

impl CollectionDetails {
    pub fn new(capped: bool) -> Self {
        Self {
            capped,
            first_extent: DiskLoc::null(),
            last_extent: DiskLoc::null(),
            deleted: [DiskLoc::null(); BUCKETS],
            nrecords: 0,
            data_size: 0,
            last_extent_size: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub free_list: FreeListHead,
    pub collections: BTreeMap<String, CollectionDetails>,
}

impl Catalog {
    pub fn path_for(dir: &Path, dbname: &str) -> PathBuf {
        dir.join(format!("{dbname}.ns.json"))
    }

    /// Loads the catalog at `path`, using an empty one if it does not exist
    #[instrument]
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("no catalog at {path:?}, starting empty");
            return Ok(Self::default());
        }
        let buf = fs::read_to_string(path)?;
        if buf.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(&buf)?)
    }

    #[instrument(skip(self))]
    pub fn save(&self, path: &Path) -> Result<()> {
        let serialized = serde_json::to_string_pretty(self)?;
        fs::write(path, serialized)?;
        Ok(())
    }

    /// the free list anchor and collection `ns` (created if missing), borrowed together
    pub fn split(&mut self, ns: &str, capped: bool) -> (&mut FreeListHead, &mut CollectionDetails) {
        let Self {
            free_list,
            collections,
        } = self;
        let details = collections
            .entry(ns.to_string())
            .or_insert_with(|| CollectionDetails::new(capped));
        (free_list, details)
    }
}
