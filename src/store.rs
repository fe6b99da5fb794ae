//! # The extent store
//!
//! on-disk storage for one database: a set of memory mapped files ([`fileset`]), carved into
//! extents ([`extent`]) which hold chains of records ([`record`]). the free list anchors and
//! collection metadata live in the [`catalog`].

pub mod catalog;
pub mod error;
pub mod extent;
pub mod file;
pub mod fileset;
pub mod loc;
mod nav;
pub mod record;
pub mod repr;
#[cfg(test)]
mod test;

pub use catalog::{Catalog, CollectionDetails, FreeListHead};
pub use error::{Result, StoreError};
pub use extent::{quantize_extent_size, ExtentManager, FreeListAnchor};
pub use loc::DiskLoc;
pub use record::{RecordIter, RecordStore};
