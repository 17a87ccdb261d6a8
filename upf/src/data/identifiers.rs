use std::sync::atomic::{AtomicU64, Ordering};

/// Allocates local SEIDs.  Never hands out 0, or a SEID that is still in use
/// after the counter wraps.
#[derive(Debug)]
pub struct SeidAllocator(AtomicU64);

impl SeidAllocator {
    pub fn new() -> Self {
        SeidAllocator(AtomicU64::new(1))
    }

    pub fn allocate(&self, in_use: impl Fn(u64) -> bool) -> u64 {
        loop {
            let seid = self.0.fetch_add(1, Ordering::Relaxed);
            if seid != 0 && !in_use(seid) {
                return seid;
            }
        }
    }
}

impl Default for SeidAllocator {
    fn default() -> Self {
        Self::new()
    }
}
