//! # Residency estimator
//!
//! a cheap guess at whether a region of memory is paged in, so the hot path does not need a
//! syscall. facts are only ever "this page was seen resident", recorded into the current time
//! slice of a shard. slices rotate out on a timer, which is the only way facts expire.
//!
//! - regions are 64 pages, offsets pick the page within the region ([`region_of`])
//! - sharded by a hash of the region, each shard behind its own mutex, held for one call only
//! - a full probe chain just drops the fact, which costs at most an extra residency check later

use std::{
    sync::{Mutex, PoisonError},
    time::Instant,
};

use crate::config::ResidencyConfig;

pub mod probe;
mod slice;

pub use probe::{default_probe, NoProbe, ResidencyProbe};

use slice::Slice;

const PAGE_SHIFT: u32 = 12;
const REGION_SHIFT: u32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    KnownIn,
    KnownOut,
    Unknown,
}

/// (region, page offset within the region) of `addr`
pub fn region_of(addr: usize) -> (usize, u8) {
    let page = addr >> PAGE_SHIFT;
    (page >> REGION_SHIFT, (page & ((1 << REGION_SHIFT) - 1)) as u8)
}

/// slot hash of a region. all of the pointer is mixed in, so this differs between 32 and 64 bit
fn hash(region: usize, slice_size: usize) -> usize {
    let r = region as u64;
    let h = (7 + (r & 0xFFFF)).wrapping_mul(11 + ((r >> 16) & 0xFFFF));
    #[cfg(target_pointer_width = "64")]
    let h = h
        .wrapping_mul(13 + ((r >> 32) & 0xFFFF))
        .wrapping_mul(17 + ((r >> 48) & 0xFFFF));
    (h % slice_size as u64) as usize
}

struct Shard {
    slices: Vec<Slice>,
    cur: usize,
    last_rotate: Instant,
    calls: u32,
}

impl Shard {
    fn new(cfg: &ResidencyConfig) -> Self {
        Self {
            slices: (0..cfg.slices).map(|_| Slice::new(cfg.slice_size)).collect(),
            cur: 0,
            last_rotate: Instant::now(),
            calls: 0,
        }
    }

    /// rotates if the current slice is older than the window. only looks at the clock every
    /// `sample_every` calls
    fn maybe_rotate(&mut self, cfg: &ResidencyConfig) {
        let sample = self.calls % cfg.sample_every.max(1) == 0;
        self.calls = self.calls.wrapping_add(1);
        if sample && self.last_rotate.elapsed() > cfg.rotate_after() {
            self.rotate();
        }
    }

    fn rotate(&mut self) {
        self.cur = (self.cur + 1) % self.slices.len();
        self.slices[self.cur].reset();
        self.last_rotate = Instant::now();
    }

    /// index of the slice `age` rotations before the current one
    fn slice_at(&self, age: usize) -> usize {
        let n = self.slices.len();
        (self.cur + n - age % n) % n
    }
}

pub struct Estimator {
    cfg: ResidencyConfig,
    shards: Box<[Mutex<Shard>]>,
}

impl Estimator {
    pub fn new(cfg: &ResidencyConfig) -> Self {
        assert!(cfg.shards > 0 && cfg.slices > 0 && cfg.slice_size > 0);
        assert!(cfg.max_chain > 0 && cfg.known_good_divisor > 0);
        debug!(
            "residency estimator: {} shards x {} slices x {} slots",
            cfg.shards, cfg.slices, cfg.slice_size
        );
        Self {
            shards: (0..cfg.shards).map(|_| Mutex::new(Shard::new(cfg))).collect(),
            cfg: cfg.clone(),
        }
    }

    pub fn config(&self) -> &ResidencyConfig {
        &self.cfg
    }

    /// with tracking off, callers treat every access as resident
    pub fn is_enabled(&self) -> bool {
        self.cfg.tracking_enabled
    }

    fn with_shard<R>(&self, region: usize, f: impl FnOnce(&mut Shard, usize) -> R) -> R {
        let h = hash(region, self.cfg.slice_size);
        // a panic mid-call leaves at worst a stale or missing fact, which is fine to keep using
        let mut shard = self.shards[h % self.shards.len()]
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        shard.maybe_rotate(&self.cfg);
        f(&mut *shard, h)
    }

    /// What is known about page `offset` of `region`.
    ///
    /// scans the most recent slices, only the newest `1 / known_good_divisor` of them when
    /// `known_good` is set. the first slice that knows the region but not the page answers
    /// [`State::KnownOut`], and the page is marked there since the caller is about to bring it in.
    pub fn query(&self, region: usize, offset: u8, known_good: bool) -> State {
        let divisor = if known_good {
            self.cfg.known_good_divisor
        } else {
            1
        };
        let max_chain = self.cfg.max_chain;
        self.with_shard(region, |shard, h| {
            for age in 0..self.cfg.slices.div_ceil(divisor) {
                let at = shard.slice_at(age);
                match shard.slices[at].get(h, max_chain, region, offset) {
                    State::KnownIn => return State::KnownIn,
                    State::KnownOut => {
                        shard.slices[at].set(h, max_chain, region, offset);
                        return State::KnownOut;
                    }
                    State::Unknown => {}
                }
            }
            State::Unknown
        })
    }

    /// Records page `offset` of `region` as resident in the current slice.
    ///
    /// returns false if the slice had no room for the region (the fact is dropped)
    pub fn record(&self, region: usize, offset: u8, known_good: bool) -> bool {
        let max_chain = self.cfg.max_chain;
        self.with_shard(region, |shard, h| {
            let cur = shard.cur;
            let added = shard.slices[cur].set(h, max_chain, region, offset);
            if !added {
                trace!("residency slice full for region {region:#x} (known good: {known_good})");
            }
            added
        })
    }

    /// [`query`](Self::query) then [`record`](Self::record) by address, true if it was already
    /// known resident
    pub fn access(&self, addr: usize, known_good: bool) -> bool {
        let (region, offset) = region_of(addr);
        if self.query(region, offset, known_good) == State::KnownIn {
            return true;
        }
        self.record(region, offset, known_good);
        false
    }

    /// rotates every shard once, regardless of the clock
    pub fn rotate_all(&self) {
        for shard in self.shards.iter() {
            shard.lock().unwrap_or_else(PoisonError::into_inner).rotate();
        }
    }
}
