//! A minimal record store on top of the extent manager.
//!
//! records are carved out of deleted records (free space) kept on per size bucket lists, and
//! linked in insertion order within their extent. a collection grows by one extent at a time,
//! each bigger than the last.
//!
//! each payload is framed with its length (u32, little endian) so it can be given back exactly,
//! since the record itself may be somewhat larger than what was asked for.

use std::mem::size_of;

use super::{
    catalog::CollectionDetails,
    error::{Result, StoreError},
    extent::{ExtentManager, FreeListAnchor},
    loc::DiskLoc,
    repr::{RecordHeader, EXTENT_HEADER_SIZE, RECORD_HEADER_SIZE},
};
use crate::misc::round_up_to;

pub const BUCKETS: usize = 20;

/// upper bound (inclusive) on the length of the records in each deleted list
pub const BUCKET_SIZES: [i32; BUCKETS] = [
    0x20, 0x40, 0x80, 0x100, 0x200, 0x400, 0x800, 0x1000, 0x2000, 0x4000, 0x8000, 0x1_0000,
    0x2_0000, 0x4_0000, 0x8_0000, 0x10_0000, 0x20_0000, 0x40_0000, 0x80_0000, i32::MAX,
];

mod tuning {
    /// deleted records looked at per bucket before moving on to a bigger one
    pub const MAX_CHAIN: usize = 30;
    /// leftovers smaller than this stay part of the record instead of being split off. must
    /// leave room for the deleted record's header
    pub const MIN_SPLIT: i32 = super::RECORD_HEADER_SIZE + 8;
}

const FRAME_LEN: usize = size_of::<u32>();

pub fn bucket(len: i32) -> usize {
    BUCKET_SIZES
        .iter()
        .position(|&max| len <= max)
        .unwrap_or(BUCKETS - 1)
}

/// size of the first extent for a collection whose first record is `len` bytes
fn initial_extent_size(len: i32) -> i64 {
    let len = len as i64;
    let sz = if len < 1000 { len * 64 } else { len * 16 };
    sz.min(1_000_000_000) & !0xff
}

/// size of the next extent, given the size of the record that did not fit and the last extent
fn followup_extent_size(len: i32, last_extent_size: i32) -> i64 {
    let x = initial_extent_size(len);
    let last = last_extent_size as i64;
    let y = if last < 4_000_000 {
        last * 4
    } else {
        last * 12 / 10
    };
    x.max(y) & !0xff
}

pub struct RecordStore<'a, A: FreeListAnchor> {
    em: &'a mut ExtentManager,
    anchor: &'a mut A,
    details: &'a mut CollectionDetails,
    ns: &'a str,
    /// highest file number new extents may go in (0 = unlimited)
    quota_max: i32,
}

impl<'a, A: FreeListAnchor> RecordStore<'a, A> {
    pub fn new(
        em: &'a mut ExtentManager,
        anchor: &'a mut A,
        details: &'a mut CollectionDetails,
        ns: &'a str,
    ) -> Self {
        Self {
            em,
            anchor,
            details,
            ns,
            quota_max: 0,
        }
    }

    pub fn with_quota(mut self, quota_max: i32) -> Self {
        self.quota_max = quota_max;
        self
    }

    pub fn extent_manager(&self) -> &ExtentManager {
        &*self.em
    }

    pub fn details(&self) -> &CollectionDetails {
        &*self.details
    }

    /// Stores `data` as a new record at the end of the chain.
    ///
    /// refused once the extent manager has found corruption, and corruption found here poisons it
    #[instrument(skip(self, data), fields(ns = self.ns, len = data.len()))]
    pub fn insert(&mut self, data: &[u8]) -> Result<DiskLoc> {
        self.em.check_poisoned()?;
        let res = self.insert_unchecked(data);
        self.em.poison_on_corruption(res)
    }

    fn insert_unchecked(&mut self, data: &[u8]) -> Result<DiskLoc> {
        let len = round_up_to(data.len() + FRAME_LEN + RECORD_HEADER_SIZE as usize, 4);
        let len = i32::try_from(len).map_err(|_| StoreError::ExtentTooLarge {
            requested: len as i64,
            max: self.em.config().max_extent_size,
        })?;
        let loc = match self.alloc_from_deleted(len)? {
            Some(loc) => loc,
            None => {
                self.grow(len)?;
                self.alloc_from_deleted(len)?
                    .ok_or(StoreError::OutOfSpace(len))?
            }
        };
        self.link_live(loc)?;

        let payload = self.em.record_data_mut(loc)?;
        payload[..FRAME_LEN].copy_from_slice(&(data.len() as u32).to_le_bytes());
        payload[FRAME_LEN..FRAME_LEN + data.len()].copy_from_slice(data);

        self.details.nrecords += 1;
        self.details.data_size += data.len() as i64;
        trace!("inserted record {loc}");
        Ok(loc)
    }

    /// the payload of the live record at `loc`
    pub fn read(&self, loc: DiskLoc) -> Result<&[u8]> {
        let rec = self.em.record_for(loc)?;
        if rec.is_deleted() {
            return Err(StoreError::InvalidLoc(loc));
        }
        unframe(self.em.record_data(loc)?, loc)
    }

    #[instrument(skip(self), fields(ns = self.ns))]
    pub fn delete(&mut self, loc: DiskLoc) -> Result<()> {
        self.em.check_poisoned()?;
        let res = self.delete_unchecked(loc);
        self.em.poison_on_corruption(res)
    }

    fn delete_unchecked(&mut self, loc: DiskLoc) -> Result<()> {
        let rec = self.em.record_for(loc)?;
        if rec.is_deleted() {
            return Err(StoreError::InvalidLoc(loc));
        }
        let data_len = unframe(self.em.record_data(loc)?, loc)?.len();

        // unlink from the extent's chain, both sides before anything else
        let mut ext = self.em.get_extent(rec.extent, true)?;
        match rec.prev.non_null() {
            None => ext.first_record = rec.next,
            Some(prev) => {
                let mut prev_rec = self.em.record_for(prev)?;
                prev_rec.next = rec.next;
                self.em.write_record(prev, &prev_rec)?;
            }
        }
        match rec.next.non_null() {
            None => ext.last_record = rec.prev,
            Some(next) => {
                let mut next_rec = self.em.record_for(next)?;
                next_rec.prev = rec.prev;
                self.em.write_record(next, &next_rec)?;
            }
        }
        self.em.write_extent(&ext)?;

        self.add_deleted(loc, rec.length_with_headers, rec.extent)?;
        self.details.nrecords -= 1;
        self.details.data_size -= data_len as i64;
        Ok(())
    }

    /// locations of every live record, in chain order
    pub fn iter(&self) -> RecordIter<'_> {
        RecordIter::new(&*self.em, self.details.first_extent)
    }

    /// Frees every extent of the collection and leaves it empty.
    #[instrument(skip(self), fields(ns = self.ns))]
    pub fn drop_all(&mut self) -> Result<()> {
        self.em.free_extents(
            &mut *self.anchor,
            self.details.first_extent,
            self.details.last_extent,
        )?;
        *self.details = CollectionDetails::new(self.details.capped);
        Ok(())
    }

    /// first fit from the deleted lists, splitting off what is left over if it is worth keeping
    fn alloc_from_deleted(&mut self, len: i32) -> Result<Option<DiskLoc>> {
        for b in bucket(len)..BUCKETS {
            let mut prev: Option<DiskLoc> = None;
            let mut at = self.details.deleted[b];
            let mut chain = 0;
            while let Some(loc) = at.non_null() {
                let rec = self.em.record_for(loc)?;
                if !rec.is_deleted() {
                    error!("live record {loc} on deleted list {b}");
                    return Err(StoreError::Corrupt {
                        what: "live record on a deleted list",
                        at: loc,
                    });
                }
                if rec.length_with_headers >= len {
                    // unlink from the (singly linked) deleted list
                    match prev {
                        None => self.details.deleted[b] = rec.next,
                        Some(prev) => {
                            let mut prev_rec = self.em.record_for(prev)?;
                            prev_rec.next = rec.next;
                            self.em.write_record(prev, &prev_rec)?;
                        }
                    }
                    let left = rec.length_with_headers - len;
                    let taken = if left < tuning::MIN_SPLIT || left < (len >> 3) {
                        rec.length_with_headers
                    } else {
                        self.add_deleted(loc.offset(len), left, rec.extent)?;
                        len
                    };
                    self.em
                        .write_record(loc, &RecordHeader::live(taken, rec.extent))?;
                    return Ok(Some(loc));
                }
                chain += 1;
                if chain > tuning::MAX_CHAIN {
                    break;
                }
                prev = Some(loc);
                at = rec.next;
            }
        }
        Ok(None)
    }

    fn add_deleted(&mut self, loc: DiskLoc, len: i32, extent: DiskLoc) -> Result<()> {
        let b = bucket(len);
        self.em
            .write_record(loc, &RecordHeader::deleted(len, extent, self.details.deleted[b]))?;
        self.details.deleted[b] = loc;
        Ok(())
    }

    /// link a freshly carved record at the tail of its extent's chain
    fn link_live(&mut self, loc: DiskLoc) -> Result<()> {
        let mut rec = self.em.record_for(loc)?;
        let mut ext = self.em.get_extent(rec.extent, true)?;
        match ext.last_record.non_null() {
            None => {
                ext.first_record = loc;
            }
            Some(old_last) => {
                let mut old = self.em.record_for(old_last)?;
                old.next = loc;
                self.em.write_record(old_last, &old)?;
                rec.prev = old_last;
            }
        }
        rec.next = DiskLoc::null();
        ext.last_record = loc;
        self.em.write_record(loc, &rec)?;
        self.em.write_extent(&ext)?;
        Ok(())
    }

    /// add an extent to the end of the collection, big enough for a `len` byte record
    fn grow(&mut self, len: i32) -> Result<()> {
        let cfg = self.em.config();
        let wanted = if self.details.last_extent.is_null() {
            initial_extent_size(len)
        } else {
            followup_extent_size(len, self.details.last_extent_size)
        };
        let size = wanted
            .max((len + EXTENT_HEADER_SIZE) as i64)
            .min(cfg.max_extent_size as i64) as i32;
        if size < len + EXTENT_HEADER_SIZE {
            return Err(StoreError::ExtentTooLarge {
                requested: (len + EXTENT_HEADER_SIZE) as i64,
                max: cfg.max_extent_size,
            });
        }

        let loc = self.em.allocate_extent(
            &mut *self.anchor,
            self.ns,
            self.details.capped,
            size,
            self.quota_max,
        )?;
        let empty = self.em.reuse_extent(loc, self.ns)?;
        let mut ext = self.em.get_extent(loc, true)?;
        ext.xprev = self.details.last_extent;
        match self.details.last_extent.non_null() {
            None => self.details.first_extent = loc,
            Some(last) => {
                let mut last_ext = self.em.get_extent(last, true)?;
                last_ext.xnext = loc;
                self.em.write_extent(&last_ext)?;
            }
        }
        self.em.write_extent(&ext)?;
        self.details.last_extent = loc;
        self.details.last_extent_size = ext.length;
        self.add_deleted(empty, ext.payload_len(), loc)?;
        debug!("`{}` grew by extent {loc} ({} bytes)", self.ns, ext.length);
        Ok(())
    }
}

fn unframe(payload: &[u8], loc: DiskLoc) -> Result<&[u8]> {
    let corrupt = || StoreError::Corrupt {
        what: "record payload frame",
        at: loc,
    };
    let frame: [u8; FRAME_LEN] = payload
        .get(..FRAME_LEN)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(corrupt)?;
    let len = u32::from_le_bytes(frame) as usize;
    payload
        .get(FRAME_LEN..FRAME_LEN + len)
        .ok_or_else(corrupt)
}

/// Forward iterator over a record chain, crossing extents.
pub struct RecordIter<'a> {
    em: &'a ExtentManager,
    next: Option<Result<DiskLoc>>,
}

impl<'a> RecordIter<'a> {
    pub fn new(em: &'a ExtentManager, first_extent: DiskLoc) -> Self {
        let next = match em.first_record_from(first_extent) {
            Ok(loc) => loc.non_null().map(Ok),
            Err(e) => Some(Err(e)),
        };
        Self { em, next }
    }
}

impl<'a> Iterator for RecordIter<'a> {
    type Item = Result<DiskLoc>;

    fn next(&mut self) -> Option<Self::Item> {
        let cur = self.next.take()?;
        if let Ok(loc) = cur {
            self.next = match self.em.get_next_record(loc) {
                Ok(next) => next.non_null().map(Ok),
                Err(e) => Some(Err(e)),
            };
        }
        Some(cur)
    }
}
