//! on-disk layout of data file, extent, and record headers.
//!
//! every header is `repr(C)` with no implicit padding, and is copied in and out of the mapped
//! files with zerocopy rather than being referenced in place.

use std::mem::size_of;

use bitflags::bitflags;
use static_assertions::const_assert_eq;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use super::loc::DiskLoc;

pub const MAGIC_BYTES: [u8; 12] = *b"EXTENTSTORE\0";
pub const FORMAT_VERSION: u32 = 1;

/// bytes reserved at the start of every data file for its header
pub const DATA_FILE_HEADER_SIZE: i32 = 8192;

pub const EXTENT_SIGNATURE: u32 = 0x4142_4344;
pub const NS_LEN: usize = 128;

pub const EXTENT_HEADER_SIZE: i32 = size_of::<ExtentHeader>() as i32;
pub const RECORD_HEADER_SIZE: i32 = size_of::<RecordHeader>() as i32;

#[derive(Clone, Copy, PartialEq, Eq, Debug, FromZeroes, FromBytes, AsBytes)]
#[repr(C)]
pub struct DataFileHeader {
    pub magic_bytes: [u8; 12],
    pub version: u32,
    /// total length of the file, header included
    pub file_length: i32,
    /// bytes left in the unused tail of the file
    pub unused_length: i32,
    /// start of the unused tail (the next extent carved from this file goes here)
    pub unused: DiskLoc,
}
const_assert_eq!(size_of::<DataFileHeader>(), 32);

impl DataFileHeader {
    pub fn new(file_no: i32, file_length: i32) -> Self {
        Self {
            magic_bytes: MAGIC_BYTES,
            version: FORMAT_VERSION,
            file_length,
            unused_length: file_length - DATA_FILE_HEADER_SIZE,
            unused: DiskLoc::new(file_no, DATA_FILE_HEADER_SIZE),
        }
    }

    pub fn verify(&self) -> bool {
        self.magic_bytes == MAGIC_BYTES && self.version == FORMAT_VERSION
    }
}

#[derive(Clone, Copy, PartialEq, Eq, FromZeroes, FromBytes, AsBytes)]
#[repr(C)]
pub struct ExtentHeader {
    /// always [`EXTENT_SIGNATURE`]
    pub magic: u32,
    /// where this extent lives, checked against the address it was read from
    pub my_loc: DiskLoc,
    /// next extent in the owning chain (a collection, or the free list)
    pub xnext: DiskLoc,
    /// previous extent in the owning chain
    pub xprev: DiskLoc,
    /// name of the owning collection, nul padded. diagnostic only
    pub ns: [u8; NS_LEN],
    /// size of the whole extent, this header included
    pub length: i32,
    pub first_record: DiskLoc,
    pub last_record: DiskLoc,
}
const_assert_eq!(size_of::<ExtentHeader>(), 176);

impl ExtentHeader {
    pub fn new(my_loc: DiskLoc, length: i32) -> Self {
        Self {
            magic: EXTENT_SIGNATURE,
            my_loc,
            xnext: DiskLoc::null(),
            xprev: DiskLoc::null(),
            ns: [0; NS_LEN],
            length,
            first_record: DiskLoc::null(),
            last_record: DiskLoc::null(),
        }
    }

    pub fn ns(&self) -> String {
        let end = self.ns.iter().position(|&b| b == 0).unwrap_or(NS_LEN);
        String::from_utf8_lossy(&self.ns[..end]).into_owned()
    }

    /// names longer than the field are truncated (one byte is kept for the terminator)
    pub fn set_ns(&mut self, ns: &str) {
        self.ns = [0; NS_LEN];
        let bytes = ns.as_bytes();
        let len = bytes.len().min(NS_LEN - 1);
        self.ns[..len].copy_from_slice(&bytes[..len]);
    }

    /// first byte past the header, where records start
    pub fn payload_start(&self) -> DiskLoc {
        self.my_loc.offset(EXTENT_HEADER_SIZE)
    }

    pub fn payload_len(&self) -> i32 {
        self.length - EXTENT_HEADER_SIZE
    }

    pub fn is_empty(&self) -> bool {
        self.first_record.is_null()
    }
}

impl std::fmt::Debug for ExtentHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtentHeader")
            .field("my_loc", &self.my_loc)
            .field("xnext", &self.xnext)
            .field("xprev", &self.xprev)
            .field("ns", &self.ns())
            .field("length", &self.length)
            .field("first_record", &self.first_record)
            .field("last_record", &self.last_record)
            .finish()
    }
}

bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
    pub struct RecordFlags: u32 {
        /// record is on a deleted-record list. `next` links that list, `prev` is unused
        const DELETED = 0b10000000_00000000_00000000_00000000;
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, FromZeroes, FromBytes, AsBytes)]
#[repr(C)]
pub struct RecordHeader {
    pub length_with_headers: i32,
    /// (RecordFlags)
    pub flags: u32,
    /// extent this record was carved from
    pub extent: DiskLoc,
    /// next record in the extent (live), or next on the deleted list (deleted)
    pub next: DiskLoc,
    /// previous record in the extent. null when deleted
    pub prev: DiskLoc,
}
const_assert_eq!(size_of::<RecordHeader>(), 32);

impl RecordHeader {
    pub fn live(length_with_headers: i32, extent: DiskLoc) -> Self {
        Self {
            length_with_headers,
            flags: RecordFlags::empty().bits(),
            extent,
            next: DiskLoc::null(),
            prev: DiskLoc::null(),
        }
    }

    pub fn deleted(length_with_headers: i32, extent: DiskLoc, next: DiskLoc) -> Self {
        Self {
            length_with_headers,
            flags: RecordFlags::DELETED.bits(),
            extent,
            next,
            prev: DiskLoc::null(),
        }
    }

    /// `None` if the flags field holds bits we do not know about
    pub fn flags(&self) -> Option<RecordFlags> {
        RecordFlags::from_bits(self.flags)
    }

    pub fn is_deleted(&self) -> bool {
        RecordFlags::from_bits_retain(self.flags).contains(RecordFlags::DELETED)
    }

    pub fn net_length(&self) -> i32 {
        self.length_with_headers - RECORD_HEADER_SIZE
    }
}
