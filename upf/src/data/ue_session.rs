use crate::userplane::CoreId;
use atomic_counter::{AtomicCounter, RelaxedCounter};
use num_enum::{FromPrimitive, IntoPrimitive};
use pfcp::ApplyAction;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicU8, AtomicU16, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum SessionState {
    Establishing = 0,
    Active = 1,
    Modifying = 2,
    #[num_enum(default)]
    Deleting = 3,
}

/// The parts of a session that the SMF can change after establishment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionRules {
    // Downlink tunnel towards the gNB
    pub gnb_ip: Ipv4Addr,
    pub gnb_port: u16,
    pub teid_downlink: u32,
    pub far_action: ApplyAction,

    pub pdu_session_id: u8,
    pub qos_priority: u8,

    // Maximum bit rates (kbps).  Signaled only, not enforced.
    pub qos_mbr_ul: u32,
    pub qos_mbr_dl: u32,
}

impl SessionRules {
    pub fn gnb_addr(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.gnb_ip, self.gnb_port)
    }
}

pub struct SessionStats {
    pub packets_tx: RelaxedCounter,
    pub packets_rx: RelaxedCounter,
    pub bytes_tx: RelaxedCounter,
    pub bytes_rx: RelaxedCounter,
}

impl Default for SessionStats {
    fn default() -> Self {
        SessionStats {
            packets_tx: RelaxedCounter::new(0),
            packets_rx: RelaxedCounter::new(0),
            bytes_tx: RelaxedCounter::new(0),
            bytes_rx: RelaxedCounter::new(0),
        }
    }
}

impl std::fmt::Debug for SessionStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "tx {}/{}B rx {}/{}B",
            self.packets_tx.get(),
            self.bytes_tx.get(),
            self.packets_rx.get(),
            self.bytes_rx.get()
        )
    }
}

/// Everything needed to create a session.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub seid: u64,
    pub cp_seid: u64,
    pub smf_addr: SocketAddr,
    pub supi: String,
    pub ue_ip: Ipv4Addr,
    pub teid_uplink: u32,
    pub affinity_core: Option<CoreId>,
    pub rules: SessionRules,
}

/// One PDU session.  Identity fields are immutable.  The rules are behind a
/// per-session lock, and the sequence numbers and stats are only written by
/// the worker that owns the session.
#[derive(Debug)]
pub struct UeSession {
    pub seid: u64,
    pub cp_seid: u64,
    pub smf_addr: SocketAddr,
    pub supi: String,
    pub ue_ip: Ipv4Addr,
    pub teid_uplink: u32,
    pub affinity_core: Option<CoreId>,
    pub stats: SessionStats,
    rules: RwLock<SessionRules>,
    state: AtomicU8,
    dl_sequence: AtomicU16,
    ul_sequence: AtomicU16,
    last_contact: Mutex<Instant>,
}

impl From<NewSession> for UeSession {
    fn from(s: NewSession) -> Self {
        UeSession {
            seid: s.seid,
            cp_seid: s.cp_seid,
            smf_addr: s.smf_addr,
            supi: s.supi,
            ue_ip: s.ue_ip,
            teid_uplink: s.teid_uplink,
            affinity_core: s.affinity_core,
            stats: SessionStats::default(),
            rules: RwLock::new(s.rules),
            state: AtomicU8::new(SessionState::Establishing.into()),
            dl_sequence: AtomicU16::new(0),
            ul_sequence: AtomicU16::new(0),
            last_contact: Mutex::new(Instant::now()),
        }
    }
}

impl UeSession {
    pub fn state(&self) -> SessionState {
        SessionState::from(self.state.load(Ordering::Acquire))
    }

    /// Move from `from` to `to`.  On failure, returns the actual state.
    pub fn transition(&self, from: SessionState, to: SessionState) -> Result<(), SessionState> {
        self.state
            .compare_exchange(from.into(), to.into(), Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(SessionState::from)
    }

    /// Whether the pipelines should forward this session's packets.
    pub fn is_forwarding(&self) -> bool {
        matches!(
            self.state(),
            SessionState::Active | SessionState::Modifying
        )
    }

    pub fn rules(&self) -> SessionRules {
        *self.rules.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn update_rules<R>(&self, f: impl FnOnce(&mut SessionRules) -> R) -> R {
        f(&mut self.rules.write().unwrap_or_else(PoisonError::into_inner))
    }

    /// Advance the downlink sequence number and return the new value.
    pub fn next_dl_sequence(&self) -> u16 {
        self.dl_sequence
            .fetch_add(1, Ordering::Relaxed)
            .wrapping_add(1)
    }

    pub fn dl_sequence(&self) -> u16 {
        self.dl_sequence.load(Ordering::Relaxed)
    }

    pub fn record_ul_sequence(&self, sequence: u16) {
        self.ul_sequence.store(sequence, Ordering::Relaxed)
    }

    pub fn ul_sequence(&self) -> u16 {
        self.ul_sequence.load(Ordering::Relaxed)
    }

    pub fn record_tx(&self, bytes: usize) {
        self.stats.packets_tx.inc();
        self.stats.bytes_tx.add(bytes);
    }

    pub fn record_rx(&self, bytes: usize) {
        self.stats.packets_rx.inc();
        self.stats.bytes_rx.add(bytes);
    }

    pub fn touch(&self, now: Instant) {
        *self.last_contact.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }

    pub fn last_contact(&self) -> Instant {
        *self.last_contact.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Display for UeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({:#x},{},{},{:#010x})",
            self.seid, self.supi, self.ue_ip, self.teid_uplink
        )
    }
}
