//! # Extent manager
//!
//! hands out extents (large contiguous regions of one data file) and recycles freed ones through
//! a doubly linked free list threaded through the extent headers themselves.
//!
//! - one per database, owns the [`FileSet`]
//! - the free list head/tail are *not* stored here. they belong to the catalog, and are read and
//!   written through a [`FreeListAnchor`]
//! - NOT thread safe. `&mut self` for anything that mutates, the caller is expected to hold the
//!   database wide write lock already.

use std::{path::Path, time::Instant};

use super::{
    error::{Result, StoreError},
    fileset::FileSet,
    loc::DiskLoc,
    repr::{
        ExtentHeader, RecordHeader, EXTENT_HEADER_SIZE, EXTENT_SIGNATURE, RECORD_HEADER_SIZE,
    },
};
use crate::{
    config::{ExtentConfig, FilesConfig},
    misc::{round_up_to, sfmt},
};

mod tuning {
    /// extent sizes double up to this, then go up in steps of it
    pub const QUANTIZE_POW2_LIMIT: i64 = 16 * 1024 * 1024;
    /// a free extent within this fraction of the wanted size ends the scan early
    pub const CLOSE_ENOUGH: f64 = 0.1;
    /// past this many seconds in the scan, settle for the best candidate so far
    pub const SLOW_SCAN_SECS: u64 = 2;
    /// scans visiting more extents than this are logged
    pub const LONG_SCAN: usize = 128;
    /// attempts at adding a file with room before giving up
    pub const ADD_FILE_ATTEMPTS: usize = 16;
}

/// Accessors for the free list head and tail, which live in the catalog.
pub trait FreeListAnchor {
    fn free_list_start(&self) -> DiskLoc;
    fn free_list_end(&self) -> DiskLoc;
    fn set_free_list_start(&mut self, loc: DiskLoc);
    fn set_free_list_end(&mut self, loc: DiskLoc);
}

/// Rounds an extent size up to the next size tier, then to a page boundary.
///
/// tiers are the powers of two starting at `min_extent_size`, then multiples of 16MiB. the result
/// is clamped to `[min_extent_size, max_extent_size]`.
pub fn quantize_extent_size(cfg: &ExtentConfig, size: i32) -> i32 {
    if size >= cfg.max_extent_size {
        return cfg.max_extent_size;
    }
    let size = (size as i64).max(cfg.min_extent_size as i64);
    let tier = if size <= tuning::QUANTIZE_POW2_LIMIT {
        let mut tier = cfg.min_extent_size as i64;
        while tier < size {
            tier *= 2;
        }
        tier
    } else {
        round_up_to(size as usize, tuning::QUANTIZE_POW2_LIMIT as usize) as i64
    };
    let tier = round_up_to(tier as usize, cfg.page_size as usize) as i64;
    tier.min(cfg.max_extent_size as i64) as i32
}

pub struct ExtentManager {
    files: FileSet,
    cfg: ExtentConfig,
    /// set once corruption is found. every mutation is refused afterwards
    poisoned: bool,
}

impl ExtentManager {
    /// panics on sizes that could never produce a valid extent. configuration loaded through
    /// [`StoreConfig`](crate::config::StoreConfig) has been checked already
    pub fn new(path: &Path, dbname: &str, files: FilesConfig, cfg: ExtentConfig) -> Self {
        if let Err(e) = files.validate().and_then(|()| cfg.validate(&files)) {
            panic!("invalid store configuration: {e}");
        }
        Self {
            files: FileSet::new(path, dbname, files, cfg.page_size),
            cfg,
            poisoned: false,
        }
    }

    /// opens all current files
    pub fn init(&mut self) -> Result<()> {
        self.files.init()
    }

    /// unmaps everything and forgets any detected corruption
    pub fn reset(&mut self) {
        self.files.reset();
        self.poisoned = false;
    }

    pub fn config(&self) -> &ExtentConfig {
        &self.cfg
    }

    pub fn file_set(&self) -> &FileSet {
        &self.files
    }

    pub fn num_files(&self) -> usize {
        self.files.num_files()
    }

    pub fn file_size(&self) -> i64 {
        self.files.total_size()
    }

    pub fn flush_files(&self, sync: bool) -> Result<()> {
        self.files.flush(sync)
    }

    pub fn preallocate_a_file(&mut self) -> Result<()> {
        self.files.preallocate_next()
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    pub fn quantize_extent_size(&self, size: i32) -> i32 {
        quantize_extent_size(&self.cfg, size)
    }

    pub(crate) fn check_poisoned(&self) -> Result<()> {
        if self.poisoned {
            Err(StoreError::Poisoned)
        } else {
            Ok(())
        }
    }

    fn corrupt(&mut self, what: &'static str, at: DiskLoc) -> StoreError {
        error!("corrupt data: {what} (at {at}) - refusing further modification");
        self.poisoned = true;
        StoreError::Corrupt { what, at }
    }

    /// corruption found while modifying (by a read that does not poison on its own) stops
    /// every later modification too
    pub(crate) fn poison_on_corruption<T>(&mut self, res: Result<T>) -> Result<T> {
        if let Err(StoreError::Corrupt { what, at }) = &res {
            if !self.poisoned {
                error!("corrupt data: {what} (at {at}) - refusing further modification");
                self.poisoned = true;
            }
        }
        res
    }

    /// Gets an extent of at least `size` bytes for `ns`.
    ///
    /// the free list is tried first. otherwise a new extent is carved out of the newest file
    /// with room, adding a file if needed (refusing to go past file number `quota_max`, 0 is
    /// unlimited).
    ///
    /// the returned extent is not linked into anything. the caller must format it with
    /// [`reuse_extent`](Self::reuse_extent) and link it into its collection.
    #[instrument(skip(self, anchor))]
    pub fn allocate_extent(
        &mut self,
        anchor: &mut impl FreeListAnchor,
        ns: &str,
        capped: bool,
        size: i32,
        quota_max: i32,
    ) -> Result<DiskLoc> {
        self.check_poisoned()?;
        if size > self.cfg.max_extent_size {
            return Err(StoreError::ExtentTooLarge {
                requested: size as i64,
                max: self.cfg.max_extent_size,
            });
        }
        // capped collections are strict about the size they reuse, so look around the raw size.
        // everyone else matches against the tier the request would be created at
        let wanted = if capped {
            size.max(self.cfg.min_extent_size)
        } else {
            self.quantize_extent_size(size)
        };
        let found = self.alloc_from_free_list(anchor, size, wanted, capped);
        let (loc, from_free_list) = match self.poison_on_corruption(found)? {
            Some(loc) => (loc, true),
            None => (self.create_extent(size, quota_max)?, false),
        };
        debug!(
            "allocated extent for `{ns}` size: {} from free list: {from_free_list} @ {loc}",
            sfmt(size.max(0) as usize).trim()
        );
        Ok(loc)
    }

    /// `None` if nothing on the free list is suitable.
    ///
    /// candidates are looked for around `approx`, but are never smaller than `size`
    fn alloc_from_free_list(
        &mut self,
        anchor: &mut impl FreeListAnchor,
        size: i32,
        approx: i32,
        capped: bool,
    ) -> Result<Option<DiskLoc>> {
        let approx64 = approx as i64;
        let (low, mut high) = if capped {
            let low = if approx64 > 2048 { approx64 - 256 } else { approx64 };
            (low, (approx64 as f64 * 1.05) as i64 + 256)
        } else {
            ((approx64 as f64 * 0.8) as i64, (approx64 as f64 * 1.4) as i64)
        };
        let low = low.max(size as i64);
        if high <= self.cfg.min_extent_size as i64 {
            high = self.cfg.min_extent_size as i64 + 1;
        }

        let started = Instant::now();
        let mut scanned = 0usize;
        let mut best: Option<ExtentHeader> = None;
        let mut best_diff = i64::MAX;
        let mut at = anchor.free_list_start();
        let limit = self.max_chain_len();
        while let Some(loc) = at.non_null() {
            if scanned > limit {
                return Err(self.corrupt("free list does not terminate", loc));
            }
            let ext = self.get_extent(loc, true)?;
            let len = ext.length as i64;
            if (low..=high).contains(&len) {
                let diff = (len - approx64).abs();
                if diff < best_diff {
                    best_diff = diff;
                    best = Some(ext);
                    if (diff as f64) / (approx64 as f64) < tuning::CLOSE_ENOUGH
                        || started.elapsed().as_secs() >= tuning::SLOW_SCAN_SECS
                    {
                        break;
                    }
                }
            }
            at = ext.xnext;
            scanned += 1;
        }
        if scanned > tuning::LONG_SCAN {
            warn!("free list scan visited {scanned} extents");
        }
        let Some(mut best) = best else {
            trace!("no suitable extent on the free list (wanted {low}..={high})");
            return Ok(None);
        };

        // unlink it
        if let Some(prev) = best.xprev.non_null() {
            let mut prev = self.get_extent(prev, true)?;
            prev.xnext = best.xnext;
            self.write_extent(&prev)?;
        }
        if let Some(next) = best.xnext.non_null() {
            let mut next = self.get_extent(next, true)?;
            next.xprev = best.xprev;
            self.write_extent(&next)?;
        }
        if anchor.free_list_start() == best.my_loc {
            anchor.set_free_list_start(best.xnext);
        }
        if anchor.free_list_end() == best.my_loc {
            anchor.set_free_list_end(best.xprev);
        }
        best.xnext = DiskLoc::null();
        best.xprev = DiskLoc::null();
        self.write_extent(&best)?;
        Ok(Some(best.my_loc))
    }

    /// new extent, ignoring the free list
    fn create_extent(&mut self, size: i32, quota_max: i32) -> Result<DiskLoc> {
        let size = self.quantize_extent_size(size);
        for n in (0..self.files.num_files() as i32).rev() {
            let has_room = self
                .files
                .file(n)
                .is_some_and(|f| f.header().unused_length >= size);
            if has_room {
                return self.create_extent_in_file(n, size, quota_max);
            }
        }
        for _ in 0..tuning::ADD_FILE_ATTEMPTS {
            let next = self.files.num_files() as i32;
            check_quota(next, quota_max)?;
            let n = self.files.add_file(size)?;
            let has_room = self
                .files
                .file(n)
                .is_some_and(|f| f.header().unused_length >= size);
            if has_room {
                return self.create_extent_in_file(n, size, quota_max);
            }
        }
        error!("could not find space for a new extent of {}", sfmt(size as usize));
        Err(StoreError::OutOfSpace(size))
    }

    fn create_extent_in_file(&mut self, file_no: i32, size: i32, quota_max: i32) -> Result<DiskLoc> {
        check_quota(file_no, quota_max)?;
        assert!(
            size >= self.cfg.min_extent_size && size <= self.cfg.max_extent_size,
            "bad new extent size {size}"
        );
        let loc = self
            .files
            .file_mut(file_no)
            .and_then(|f| f.alloc_extent_area(size))
            .ok_or(StoreError::OutOfSpace(size))?;
        self.write_extent(&ExtentHeader::new(loc, size))?;
        trace!("new extent {loc} ({})", sfmt(size as usize));
        Ok(loc)
    }

    /// Formats an extent for use by `ns`: empties it, unlinks it, and covers the payload with
    /// one deleted record, whose location is returned.
    #[instrument(skip(self))]
    pub fn reuse_extent(&mut self, loc: DiskLoc, ns: &str) -> Result<DiskLoc> {
        self.check_poisoned()?;
        let ext = self.get_extent(loc, true);
        let mut ext = self.poison_on_corruption(ext)?;
        trace!("reusing extent {loc}, was `{}` now `{ns}`", ext.ns());
        ext.set_ns(ns);
        ext.xnext = DiskLoc::null();
        ext.xprev = DiskLoc::null();
        ext.first_record = DiskLoc::null();
        ext.last_record = DiskLoc::null();
        self.write_extent(&ext)?;
        let empty = ext.payload_start();
        self.write_record(
            empty,
            &RecordHeader::deleted(ext.payload_len(), loc, DiskLoc::null()),
        )?;
        Ok(empty)
    }

    /// Puts the chain `first..=last` (following `xnext`) at the front of the free list.
    ///
    /// the chain must be detached (`first.xprev` and `last.xnext` null), consistently linked, and
    /// not already free. if it is not, nothing is modified and the manager refuses further
    /// changes.
    #[instrument(skip(self, anchor))]
    pub fn free_extents(
        &mut self,
        anchor: &mut impl FreeListAnchor,
        first: DiskLoc,
        last: DiskLoc,
    ) -> Result<()> {
        self.check_poisoned()?;
        if first.is_null() && last.is_null() {
            return Ok(());
        }
        if first.is_null() || last.is_null() {
            return Err(self.corrupt("half null extent chain given to free", first));
        }
        let res = self.push_free_chain(anchor, first, last);
        self.poison_on_corruption(res)
    }

    fn push_free_chain(
        &mut self,
        anchor: &mut impl FreeListAnchor,
        first: DiskLoc,
        last: DiskLoc,
    ) -> Result<()> {
        let free_ends = [anchor.free_list_start(), anchor.free_list_end()];
        self.validate_chain(first, last, free_ends)?;

        match anchor.free_list_start().non_null() {
            None => {
                anchor.set_free_list_start(first);
                anchor.set_free_list_end(last);
            }
            Some(head) => {
                let mut head_ext = self.get_extent(head, true)?;
                if !head_ext.xprev.is_null() {
                    return Err(self.corrupt("free list head has a predecessor", head));
                }
                let mut last_ext = self.get_extent(last, true)?;
                head_ext.xprev = last;
                last_ext.xnext = head;
                self.write_extent(&head_ext)?;
                self.write_extent(&last_ext)?;
                anchor.set_free_list_start(first);
            }
        }
        Ok(())
    }

    /// checks that `first..=last` is a detached, mutually linked chain not touching `free_ends`.
    ///
    /// any other free extent has a predecessor or a successor, so it is caught by the link checks
    fn validate_chain(
        &mut self,
        first: DiskLoc,
        last: DiskLoc,
        free_ends: [DiskLoc; 2],
    ) -> Result<()> {
        let first_ext = self.get_extent(first, true)?;
        if !first_ext.xprev.is_null() {
            return Err(self.corrupt("first extent of chain has a predecessor", first));
        }
        let limit = self.max_chain_len();
        let mut cur = first_ext;
        let mut steps = 0;
        loop {
            if free_ends.contains(&cur.my_loc) {
                return Err(self.corrupt("extent is already on the free list", cur.my_loc));
            }
            if cur.my_loc == last {
                break;
            }
            let Some(next) = cur.xnext.non_null() else {
                return Err(self.corrupt("extent chain ends before its last extent", cur.my_loc));
            };
            let next_ext = self.get_extent(next, true)?;
            if next_ext.xprev != cur.my_loc {
                return Err(self.corrupt("extent links are not mutually consistent", next));
            }
            steps += 1;
            if steps > limit {
                return Err(self.corrupt("extent chain does not terminate", first));
            }
            cur = next_ext;
        }
        if !cur.xnext.is_null() {
            return Err(self.corrupt("last extent of chain has a successor", last));
        }
        Ok(())
    }

    /// upper bound on the number of extents that can exist, used to detect cycles
    fn max_chain_len(&self) -> usize {
        (self.files.total_size() / self.cfg.min_extent_size as i64) as usize + 1
    }

    pub fn free_list_stats(&self, anchor: &impl FreeListAnchor) -> Result<(usize, i64)> {
        let mut count = 0;
        let mut total = 0i64;
        let mut at = anchor.free_list_start();
        while let Some(loc) = at.non_null() {
            if count > self.max_chain_len() {
                return Err(StoreError::Corrupt {
                    what: "free list does not terminate",
                    at: loc,
                });
            }
            let ext = self.get_extent(loc, true)?;
            count += 1;
            total += ext.length as i64;
            at = ext.xnext;
        }
        Ok((count, total))
    }

    pub fn print_free_list(&self, anchor: &impl FreeListAnchor) -> Result<()> {
        info!("free list:");
        let mut at = anchor.free_list_start();
        let mut count = 0;
        while let Some(loc) = at.non_null() {
            if count > self.max_chain_len() {
                break;
            }
            let ext = self.get_extent(loc, true)?;
            info!("  {loc} {} (was `{}`)", sfmt(ext.length as usize), ext.ns());
            at = ext.xnext;
            count += 1;
        }
        let (n, total) = self.free_list_stats(anchor)?;
        info!("  {n} extent(s), {}", sfmt(total as usize));
        Ok(())
    }

    /// Resolves an extent header.
    ///
    /// with `sanity_check`, the signature, self location, and length are verified so corruption
    /// shows up here instead of as a walk off the end of the mapping.
    pub fn get_extent(&self, loc: DiskLoc, sanity_check: bool) -> Result<ExtentHeader> {
        if loc.is_null() {
            return Err(StoreError::InvalidLoc(loc));
        }
        let ext: ExtentHeader = self.files.read(loc)?;
        if sanity_check {
            let file_len = self.files.file(loc.file).map_or(0, |f| f.len()) as i64;
            let plausible_len = ext.length >= EXTENT_HEADER_SIZE + RECORD_HEADER_SIZE
                && loc.ofs as i64 + ext.length as i64 <= file_len;
            if ext.magic != EXTENT_SIGNATURE || ext.my_loc != loc || !plausible_len {
                error!("bad extent header at {loc}: {ext:?}");
                return Err(StoreError::Corrupt {
                    what: "extent header failed sanity check",
                    at: loc,
                });
            }
        }
        Ok(ext)
    }

    pub fn get_next_extent(&self, ext: &ExtentHeader) -> Result<Option<ExtentHeader>> {
        ext.xnext
            .non_null()
            .map(|loc| self.get_extent(loc, true))
            .transpose()
    }

    pub fn get_prev_extent(&self, ext: &ExtentHeader) -> Result<Option<ExtentHeader>> {
        ext.xprev
            .non_null()
            .map(|loc| self.get_extent(loc, true))
            .transpose()
    }

    pub(crate) fn write_extent(&mut self, ext: &ExtentHeader) -> Result<()> {
        self.check_poisoned()?;
        self.files.write(ext.my_loc, ext)
    }

    /// `loc` must name a record (live or deleted), not an extent
    pub fn record_for(&self, loc: DiskLoc) -> Result<RecordHeader> {
        if loc.is_null() {
            return Err(StoreError::InvalidLoc(loc));
        }
        let rec: RecordHeader = self.files.read(loc)?;
        if rec.flags().is_none() || rec.length_with_headers < RECORD_HEADER_SIZE {
            error!("bad record header at {loc}: {rec:?}");
            return Err(StoreError::Corrupt {
                what: "record header",
                at: loc,
            });
        }
        Ok(rec)
    }

    pub(crate) fn write_record(&mut self, loc: DiskLoc, rec: &RecordHeader) -> Result<()> {
        self.check_poisoned()?;
        self.files.write(loc, rec)
    }

    /// payload bytes of the record at `loc`
    pub fn record_data(&self, loc: DiskLoc) -> Result<&[u8]> {
        let rec = self.record_for(loc)?;
        self.files
            .bytes(loc.offset(RECORD_HEADER_SIZE), rec.net_length() as usize)
    }

    pub(crate) fn record_data_mut(&mut self, loc: DiskLoc) -> Result<&mut [u8]> {
        self.check_poisoned()?;
        let rec = self.record_for(loc)?;
        self.files
            .bytes_mut(loc.offset(RECORD_HEADER_SIZE), rec.net_length() as usize)
    }

    /// location of the extent owning the record at `loc`
    pub fn extent_loc_for(&self, loc: DiskLoc) -> Result<DiskLoc> {
        Ok(self.record_for(loc)?.extent)
    }

    /// the extent owning the record at `loc`
    pub fn extent_for(&self, loc: DiskLoc) -> Result<ExtentHeader> {
        self.get_extent(self.extent_loc_for(loc)?, true)
    }

    /// numeric address of the record at `loc`, for the access gate
    pub fn addr_of(&self, loc: DiskLoc) -> Result<usize> {
        self.files.addr_of(loc)
    }
}

fn check_quota(file_no: i32, quota_max: i32) -> Result<()> {
    if quota_max > 0 && file_no > quota_max {
        warn!("quota exceeded: file {file_no} > {quota_max}");
        return Err(StoreError::QuotaExceeded {
            file_no,
            quota: quota_max,
        });
    }
    Ok(())
}
