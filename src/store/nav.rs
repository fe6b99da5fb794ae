//! record chain traversal.
//!
//! records are linked within their extent. the `*_in_extent` variants stop at the extent
//! boundary, the others continue into the neighbouring extents (skipping empty ones) and end at
//! a null location. no locking here, the caller's outer lock covers it.

use super::{
    error::{Result, StoreError},
    extent::ExtentManager,
    loc::DiskLoc,
    repr::ExtentHeader,
};

impl ExtentManager {
    pub fn get_next_record_in_extent(&self, loc: DiskLoc) -> Result<DiskLoc> {
        Ok(self.record_for(loc)?.next)
    }

    pub fn get_prev_record_in_extent(&self, loc: DiskLoc) -> Result<DiskLoc> {
        Ok(self.record_for(loc)?.prev)
    }

    /// next record in the chain, crossing into following extents
    pub fn get_next_record(&self, loc: DiskLoc) -> Result<DiskLoc> {
        let rec = self.record_for(loc)?;
        if !rec.next.is_null() {
            return self.checked_live(rec.next);
        }
        let mut ext = self.get_extent(rec.extent, true)?;
        while let Some(next) = self.get_next_extent(&ext)? {
            if !next.first_record.is_null() {
                return self.checked_live(next.first_record);
            }
            ext = next;
        }
        Ok(DiskLoc::null())
    }

    /// previous record in the chain, crossing into preceding extents
    pub fn get_prev_record(&self, loc: DiskLoc) -> Result<DiskLoc> {
        let rec = self.record_for(loc)?;
        if !rec.prev.is_null() {
            return self.checked_live(rec.prev);
        }
        let mut ext = self.get_extent(rec.extent, true)?;
        while let Some(prev) = self.get_prev_extent(&ext)? {
            if !prev.last_record.is_null() {
                return self.checked_live(prev.last_record);
            }
            ext = prev;
        }
        Ok(DiskLoc::null())
    }

    /// first record of the chain starting at extent `first_extent`
    pub fn first_record_from(&self, first_extent: DiskLoc) -> Result<DiskLoc> {
        self.walk_extents(first_extent, |ext| ext.xnext, |ext| ext.first_record)
    }

    /// last record of the chain ending at extent `last_extent`
    pub fn last_record_from(&self, last_extent: DiskLoc) -> Result<DiskLoc> {
        self.walk_extents(last_extent, |ext| ext.xprev, |ext| ext.last_record)
    }

    fn walk_extents(
        &self,
        start: DiskLoc,
        step: impl Fn(&ExtentHeader) -> DiskLoc,
        pick: impl Fn(&ExtentHeader) -> DiskLoc,
    ) -> Result<DiskLoc> {
        let mut at = start;
        while let Some(loc) = at.non_null() {
            let ext = self.get_extent(loc, true)?;
            if let Some(rec) = pick(&ext).non_null() {
                return self.checked_live(rec);
            }
            at = step(&ext);
        }
        Ok(DiskLoc::null())
    }

    /// a chain link must never lead to a deleted record
    fn checked_live(&self, loc: DiskLoc) -> Result<DiskLoc> {
        if self.record_for(loc)?.is_deleted() {
            error!("record chain leads to deleted record {loc}");
            return Err(StoreError::Corrupt {
                what: "record chain links to a deleted record",
                at: loc,
            });
        }
        Ok(loc)
    }
}
