//! flow_steering - map a flow key to the worker core that owns it
//!
//! This uses the same Toeplitz hash and indirection table that NIC receive-side
//! scaling uses, so a NIC programmed with the same key and table delivers each
//! packet to the core that the software computes here.

use rand::Rng;
use std::net::Ipv4Addr;
use std::sync::Arc;

pub const RSS_KEY_LEN: usize = 40;
pub const DEFAULT_RSS_KEY: [u8; RSS_KEY_LEN] = [0x42; RSS_KEY_LEN];
// Redirection table entries, raised to the core count for larger worker pools.
const MIN_RETA_SIZE: usize = 128;

// Give up on finding an affinity-aligned TEID after this many attempts per core.
const TEID_ATTEMPTS_PER_CORE: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CoreId(pub u16);

impl std::fmt::Display for CoreId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowKey {
    UeIp(Ipv4Addr),
    Teid(u32),
}

impl FlowKey {
    fn hash_input(&self) -> [u8; 4] {
        match self {
            FlowKey::UeIp(ip) => ip.octets(),
            FlowKey::Teid(teid) => teid.to_be_bytes(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FlowSteering {
    key: [u8; RSS_KEY_LEN],
    reta: Arc<[CoreId]>,
    num_cores: u16,
}

impl FlowSteering {
    pub fn new(num_cores: u16) -> Self {
        Self::with_key(num_cores, DEFAULT_RSS_KEY)
    }

    pub fn with_key(num_cores: u16, key: [u8; RSS_KEY_LEN]) -> Self {
        let num_cores = num_cores.max(1);
        let reta = (0..MIN_RETA_SIZE.max(num_cores as usize))
            .map(|i| CoreId((i % num_cores as usize) as u16))
            .collect();
        FlowSteering {
            key,
            reta,
            num_cores,
        }
    }

    pub fn num_cores(&self) -> u16 {
        self.num_cores
    }

    pub fn core_for(&self, key: FlowKey) -> CoreId {
        let hash = toeplitz_hash(&self.key, &key.hash_input());
        self.reta[hash as usize % self.reta.len()]
    }

    /// Pick a random non-zero TEID that steers to `core` and is not `in_use`.
    pub fn allocate_teid(
        &self,
        core: CoreId,
        rng: &mut impl Rng,
        in_use: impl Fn(u32) -> bool,
    ) -> Option<u32> {
        let attempts = TEID_ATTEMPTS_PER_CORE * self.num_cores as usize;
        (0..attempts).map(|_| rng.random::<u32>()).find(|&teid| {
            teid != 0 && self.core_for(FlowKey::Teid(teid)) == core && !in_use(teid)
        })
    }
}

/// The Toeplitz hash of `input` under `key`.  `key` must be at least 4 bytes
/// longer than `input`.
pub fn toeplitz_hash(key: &[u8], input: &[u8]) -> u32 {
    let mut hash = 0u32;
    let mut window = u32::from_be_bytes([key[0], key[1], key[2], key[3]]);
    for (byte_idx, byte) in input.iter().enumerate() {
        for bit in 0..8 {
            if byte & (0x80 >> bit) != 0 {
                hash ^= window;
            }
            // Slide the 32 bit window one bit further along the key.
            let next = 32 + byte_idx * 8 + bit;
            let next_bit = key.get(next / 8).map_or(0, |b| (b >> (7 - next % 8)) & 1);
            window = (window << 1) | next_bit as u32;
        }
    }
    hash
}
