use std::fmt::{Debug, Display};

use serde::{Deserialize, Serialize};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

/// file number used by the null location
const NULL_FILE: i32 = -1;

/// A (file number, byte offset) pair naming a place inside the file set.
///
/// This is never dereferenced on its own, it is always resolved through the
/// [`FileSet`](super::fileset::FileSet) that owns the mapping.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, FromZeroes, FromBytes, AsBytes, Serialize,
    Deserialize,
)]
#[repr(C)]
pub struct DiskLoc {
    pub file: i32,
    pub ofs: i32,
}

impl DiskLoc {
    pub const fn new(file: i32, ofs: i32) -> Self {
        Self { file, ofs }
    }

    pub const fn null() -> Self {
        Self {
            file: NULL_FILE,
            ofs: 0,
        }
    }

    pub fn is_null(&self) -> bool {
        self.file == NULL_FILE
    }

    /// same file, `by` bytes further in
    pub fn offset(self, by: i32) -> Self {
        debug_assert!(!self.is_null(), "offsetting a null location");
        Self::new(
            self.file,
            self.ofs.checked_add(by).unwrap_or_else(|| {
                panic!("offsetting location {self} by {by} overflowed");
            }),
        )
    }

    /// `Some(self)` unless null
    pub fn non_null(self) -> Option<Self> {
        (!self.is_null()).then_some(self)
    }
}

impl Default for DiskLoc {
    fn default() -> Self {
        Self::null()
    }
}

impl Display for DiskLoc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_null() {
            write!(f, "null")
        } else {
            write!(f, "{}:{:#x}", self.file, self.ofs)
        }
    }
}

impl Debug for DiskLoc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DiskLoc({self})")
    }
}
