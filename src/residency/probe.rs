//! asking the os directly whether a page is resident

/// A direct residency query for single pages.
pub trait ResidencyProbe: Send + Sync {
    /// false if this platform can not answer, in which case `in_memory` should not be trusted
    fn supported(&self) -> bool;
    fn in_memory(&self, addr: usize) -> bool;
}

/// For platforms without a residency syscall. nothing is ever reported resident.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProbe;

impl ResidencyProbe for NoProbe {
    fn supported(&self) -> bool {
        false
    }

    fn in_memory(&self, _addr: usize) -> bool {
        false
    }
}

/// `mincore(2)` on the page containing the address
#[cfg(target_os = "linux")]
#[derive(Debug, Clone, Copy)]
pub struct MincoreProbe {
    page_size: usize,
}

#[cfg(target_os = "linux")]
impl MincoreProbe {
    pub fn new() -> Self {
        use nix::libc;
        // Saftey: sysconf has no preconditions
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        let page_size = usize::try_from(page_size)
            .ok()
            .filter(|p| p.is_power_of_two())
            .unwrap_or(4096);
        Self { page_size }
    }
}

#[cfg(target_os = "linux")]
impl Default for MincoreProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "linux")]
impl ResidencyProbe for MincoreProbe {
    fn supported(&self) -> bool {
        true
    }

    fn in_memory(&self, addr: usize) -> bool {
        use nix::libc;
        let page = addr & !(self.page_size - 1);
        let mut vec = 0u8;
        // Saftey: mincore only inspects the page tables for the range, and writes one byte per
        // page (exactly one here) to `vec`. unmapped ranges fail with ENOMEM instead of faulting
        let res = unsafe { libc::mincore(page as *mut libc::c_void, self.page_size, &mut vec) };
        if res != 0 {
            trace!(
                "mincore failed for {page:#x}: {}",
                std::io::Error::last_os_error()
            );
            return false;
        }
        vec & 1 == 1
    }
}

/// the best probe this platform has
pub fn default_probe() -> Box<dyn ResidencyProbe> {
    #[cfg(target_os = "linux")]
    {
        Box::new(MincoreProbe::new())
    }
    #[cfg(not(target_os = "linux"))]
    {
        warn!("no page residency probe on this platform, assuming pages are not resident");
        Box::new(NoProbe)
    }
}

#[cfg(all(test, target_os = "linux"))]
#[test]
fn mincore_sees_touched_memory() {
    let mut map = memmap2::MmapMut::map_anon(1 << 16).unwrap();
    map[0] = 1;
    let probe = MincoreProbe::new();
    assert!(probe.supported());
    assert!(probe.in_memory(map.as_ptr() as usize));
}
