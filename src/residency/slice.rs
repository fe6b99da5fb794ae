//! one time slice: a small open addressed table of region -> resident page bitmap

use super::State;

#[derive(Clone, Copy, Default)]
struct Slot {
    region: usize,
    /// bit n set = page n of the region was seen resident. a slot is free while this is zero
    pages: u64,
}

pub(super) struct Slice {
    slots: Box<[Slot]>,
}

impl Slice {
    pub fn new(size: usize) -> Self {
        Self {
            slots: vec![Slot::default(); size].into_boxed_slice(),
        }
    }

    pub fn reset(&mut self) {
        self.slots.fill(Slot::default());
    }

    pub fn get(&self, start: usize, max_chain: usize, region: usize, offset: u8) -> State {
        debug_assert!(offset < 64);
        match self.find(start, max_chain, region) {
            Ok(i) => {
                if self.slots[i].pages & (1 << offset) != 0 {
                    State::KnownIn
                } else {
                    State::KnownOut
                }
            }
            Err(_) => State::Unknown,
        }
    }

    /// false if the region has no slot and none could be claimed within `max_chain` probes
    pub fn set(&mut self, start: usize, max_chain: usize, region: usize, offset: u8) -> bool {
        debug_assert!(offset < 64);
        let i = match self.find(start, max_chain, region) {
            Ok(i) => i,
            Err(Some(free)) => {
                self.slots[free].region = region;
                free
            }
            Err(None) => return false,
        };
        self.slots[i].pages |= 1 << offset;
        true
    }

    /// `Ok(slot)` holding `region`, or `Err` with the first free slot on the probe chain (if any)
    fn find(&self, start: usize, max_chain: usize, region: usize) -> Result<usize, Option<usize>> {
        let len = self.slots.len();
        for i in 0..max_chain.min(len) {
            let at = (start + i) % len;
            let slot = &self.slots[at];
            if slot.pages == 0 {
                return Err(Some(at));
            }
            if slot.region == region {
                return Ok(at);
            }
        }
        Err(None)
    }
}
