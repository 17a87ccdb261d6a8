use std::sync::atomic::{AtomicU32, Ordering};

const SEQUENCE_MASK: u32 = 0x00ff_ffff;

/// Generates the 24-bit sequence numbers of originated requests.  Responses
/// echo the sequence number of their request instead.
#[derive(Debug)]
pub struct SequenceGenerator(AtomicU32);

impl SequenceGenerator {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: u32) -> Self {
        SequenceGenerator(AtomicU32::new(first & SEQUENCE_MASK))
    }

    pub fn next(&self) -> u32 {
        // 2^32 is a multiple of 2^24, so the mask keeps the wrap seamless.
        self.0.fetch_add(1, Ordering::Relaxed) & SEQUENCE_MASK
    }
}

impl Default for SequenceGenerator {
    fn default() -> Self {
        Self::new()
    }
}
