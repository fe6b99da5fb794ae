//! # Access gate
//!
//! checked before a record's bytes are touched. if the bytes are probably not in memory, and the
//! operation is allowed to and still young enough to restart cheaply, the access is refused with
//! a [`PageFault`] instead of stalling on disk with the caller's locks held. the caller is
//! expected to drop its locks, [`touch`](AccessGate::touch) the record, and start over, see
//! [`run_with_fault_retry`].

use std::{
    hint::black_box,
    sync::Arc,
    time::{Duration, Instant},
};

use crate::{
    config::GateConfig,
    counters::{RecordStats, StatsSnapshot},
    residency::{region_of, Estimator, ResidencyProbe, State},
    store::{
        error::{Result, StoreError},
        extent::ExtentManager,
        loc::DiskLoc,
    },
};


/// The record at `loc` is probably not resident. Release locks and retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageFault {
    pub loc: DiskLoc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Proceed,
    Retry(PageFault),
}

impl Access {
    pub fn into_result(self) -> Result<()> {
        match self {
            Self::Proceed => Ok(()),
            Self::Retry(fault) => Err(StoreError::PageFault(fault)),
        }
    }
}

/// What the gate needs to know about the operation making the access.
pub trait OpContext {
    /// false when a fault can not be handled here (already recovering from one, or exempt)
    fn allowed_to_fault(&self) -> bool;
    /// time since the operation (not this attempt) started
    fn elapsed(&self) -> Duration;
    /// per database counters, bumped alongside the global ones
    fn db_stats(&self) -> Option<&RecordStats> {
        None
    }
}

/// the current operation
#[derive(Debug)]
pub struct CurOp {
    started: Instant,
    allow_faults: bool,
    db_stats: Option<Arc<RecordStats>>,
}

impl CurOp {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            allow_faults: true,
            db_stats: None,
        }
    }

    /// an operation that must never be sent back to retry
    pub fn no_faults() -> Self {
        Self {
            allow_faults: false,
            ..Self::new()
        }
    }

    pub fn with_db_stats(mut self, stats: Arc<RecordStats>) -> Self {
        self.db_stats = Some(stats);
        self
    }
}

impl Default for CurOp {
    fn default() -> Self {
        Self::new()
    }
}

impl OpContext for CurOp {
    fn allowed_to_fault(&self) -> bool {
        self.allow_faults
    }

    fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    fn db_stats(&self) -> Option<&RecordStats> {
        self.db_stats.as_deref()
    }
}

pub struct AccessGate {
    estimator: Arc<Estimator>,
    probe: Box<dyn ResidencyProbe>,
    cfg: GateConfig,
    stats: RecordStats,
}

impl AccessGate {
    pub fn new(estimator: Arc<Estimator>, probe: Box<dyn ResidencyProbe>, cfg: GateConfig) -> Self {
        if !probe.supported() {
            info!("residency probe unsupported, unknown pages are treated as not resident");
        }
        Self {
            estimator,
            probe,
            cfg,
            stats: RecordStats::default(),
        }
    }

    pub fn estimator(&self) -> &Estimator {
        &self.estimator
    }

    /// process wide counters
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// estimator first, then the os. pages the os confirms are remembered
    pub fn likely_in_memory(&self, addr: usize) -> bool {
        if !self.estimator.is_enabled() {
            return true;
        }
        let (region, offset) = region_of(addr);
        if self.estimator.query(region, offset, false) == State::KnownIn {
            return true;
        }
        if !self.probe.supported() {
            return false;
        }
        if self.probe.in_memory(addr) {
            self.estimator.record(region, offset, false);
            return true;
        }
        false
    }

    /// Decides whether the access to the record at `loc` (mapped at `addr`) may go ahead.
    pub fn accessing(&self, ctx: &impl OpContext, loc: DiskLoc, addr: usize) -> Access {
        if self.likely_in_memory(addr) {
            return Access::Proceed;
        }
        self.stats.accesses_not_in_memory.add(1);
        if let Some(db) = ctx.db_stats() {
            db.accesses_not_in_memory.add(1);
        }
        if !ctx.allowed_to_fault() {
            return Access::Proceed;
        }
        // too far in to be worth restarting
        if ctx.elapsed() >= self.cfg.fault_budget() {
            return Access::Proceed;
        }
        self.stats.page_faults_thrown.add(1);
        if let Some(db) = ctx.db_stats() {
            db.page_faults_thrown.add(1);
        }
        trace!("page fault on record {loc} ({addr:#x})");
        Access::Retry(PageFault { loc })
    }

    /// [`accessing`](Self::accessing) for a record of `em`, as a `Result`
    pub fn check_record(&self, em: &ExtentManager, ctx: &impl OpContext, loc: DiskLoc) -> Result<()> {
        let addr = em.addr_of(loc)?;
        self.accessing(ctx, loc, addr).into_result()
    }

    /// marks `addr` as just accessed, so it will be known resident
    pub fn accessed(&self, addr: usize) {
        if self.estimator.is_enabled() {
            let (region, offset) = region_of(addr);
            self.estimator.record(region, offset, true);
        }
    }

    /// Faults in the first page of the record at `loc`. call without locks held.
    pub fn touch(&self, em: &ExtentManager, loc: DiskLoc) -> Result<()> {
        let first = em.file_set().bytes(loc, 1)?;
        black_box(first[0]);
        self.accessed(em.addr_of(loc)?);
        Ok(())
    }
}

/// Runs `op` until it finishes with anything but a page fault.
///
/// `on_fault` runs between attempts, and is where locks are released and the faulting record is
/// touched. an error from it ends the loop.
pub fn run_with_fault_retry<T>(
    mut op: impl FnMut() -> Result<T>,
    mut on_fault: impl FnMut(&PageFault) -> Result<()>,
) -> Result<T> {
    let mut retries = 0usize;
    loop {
        match op() {
            Err(StoreError::PageFault(fault)) => {
                retries += 1;
                debug!("retrying after page fault on {} (attempt {retries})", fault.loc);
                on_fault(&fault)?;
            }
            res => return res,
        }
    }
}
