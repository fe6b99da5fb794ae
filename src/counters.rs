//! counters that are cheap to bump from many threads at once
//!
//! each counter is split into cache line sized slots, and a thread adds to the slot of the core
//! it is running on. reads sum every slot, so they are slower and only approximately current.

use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    thread,
};

/// Which core the calling thread is (probably) running on.
pub trait CoreLocator: Send + Sync {
    fn current_core(&self) -> usize;
}

/// `sched_getcpu`, falling back to [`ThreadHash`] if the call fails
#[cfg(target_os = "linux")]
#[derive(Debug, Default, Clone, Copy)]
pub struct SchedGetCpu;

#[cfg(target_os = "linux")]
impl CoreLocator for SchedGetCpu {
    fn current_core(&self) -> usize {
        nix::sched::sched_getcpu().unwrap_or_else(|_| ThreadHash.current_core())
    }
}

/// spreads threads over the slots by a hash of their id. stable per thread
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadHash;

impl CoreLocator for ThreadHash {
    fn current_core(&self) -> usize {
        let mut hasher = DefaultHasher::new();
        thread::current().id().hash(&mut hasher);
        hasher.finish() as usize
    }
}

pub fn default_locator() -> Arc<dyn CoreLocator> {
    #[cfg(target_os = "linux")]
    {
        Arc::new(SchedGetCpu)
    }
    #[cfg(not(target_os = "linux"))]
    {
        Arc::new(ThreadHash)
    }
}

#[repr(align(64))]
#[derive(Default)]
struct Slot(AtomicU64);

pub struct CoreCounter {
    slots: Box<[Slot]>,
    locator: Arc<dyn CoreLocator>,
}

impl CoreCounter {
    /// one slot per available core
    pub fn new(locator: Arc<dyn CoreLocator>) -> Self {
        let cores = thread::available_parallelism().map_or(1, |n| n.get());
        Self::with_slots(locator, cores)
    }

    pub fn with_slots(locator: Arc<dyn CoreLocator>, slots: usize) -> Self {
        Self {
            slots: (0..slots.max(1)).map(|_| Slot::default()).collect(),
            locator,
        }
    }

    pub fn add(&self, n: u64) {
        let slot = self.locator.current_core() % self.slots.len();
        self.slots[slot].0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.slots
            .iter()
            .map(|s| s.0.load(Ordering::Relaxed))
            .fold(0, u64::wrapping_add)
    }
}

impl std::fmt::Debug for CoreCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreCounter")
            .field("value", &self.get())
            .field("slots", &self.slots.len())
            .finish()
    }
}

/// Residency related access counters, for the whole process or one database.
#[derive(Debug)]
pub struct RecordStats {
    /// accesses where the data was not (known to be) resident
    pub accesses_not_in_memory: CoreCounter,
    /// of those, how many were sent back to be retried
    pub page_faults_thrown: CoreCounter,
}

impl RecordStats {
    pub fn new(locator: Arc<dyn CoreLocator>) -> Self {
        Self {
            accesses_not_in_memory: CoreCounter::new(locator.clone()),
            page_faults_thrown: CoreCounter::new(locator),
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            accesses_not_in_memory: self.accesses_not_in_memory.get(),
            page_faults_thrown: self.page_faults_thrown.get(),
        }
    }
}

impl Default for RecordStats {
    fn default() -> Self {
        Self::new(default_locator())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct StatsSnapshot {
    pub accesses_not_in_memory: u64,
    pub page_faults_thrown: u64,
}
