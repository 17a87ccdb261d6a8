use super::{NewSession, SessionRules, UeSession};
use dashmap::DashMap;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateKey {
    #[error("SEID {0:#x} already in use")]
    Seid(u64),
    #[error("UE IP {0} already in use")]
    UeIp(Ipv4Addr),
    #[error("uplink TEID {0:#010x} already in use")]
    Teid(u32),
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupError {
    #[error("no session")]
    NoSession,
    #[error("session owned by another core")]
    AffinityMismatch,
}

/// The sessions, indexed by SEID (control plane), UE IP (downlink) and uplink TEID.
/// Lookups are lock-free with respect to each other and to the control plane; inserts
/// and removes are serialized so that the three indices always agree.
#[derive(Clone, Default)]
pub struct SessionTable(Arc<Indices>);

#[derive(Default)]
struct Indices {
    by_seid: DashMap<u64, Arc<UeSession>>,
    by_ue_ip: DashMap<Ipv4Addr, Arc<UeSession>>,
    by_teid: DashMap<u32, Arc<UeSession>>,
    writer: Mutex<()>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session: NewSession) -> Result<Arc<UeSession>, DuplicateKey> {
        let t = &self.0;
        let _writer = t.writer.lock().unwrap_or_else(PoisonError::into_inner);
        if t.by_seid.contains_key(&session.seid) {
            return Err(DuplicateKey::Seid(session.seid));
        }
        if t.by_ue_ip.contains_key(&session.ue_ip) {
            return Err(DuplicateKey::UeIp(session.ue_ip));
        }
        if t.by_teid.contains_key(&session.teid_uplink) {
            return Err(DuplicateKey::Teid(session.teid_uplink));
        }

        let session = Arc::new(UeSession::from(session));
        t.by_teid.insert(session.teid_uplink, session.clone());
        t.by_ue_ip.insert(session.ue_ip, session.clone());
        t.by_seid.insert(session.seid, session.clone());
        Ok(session)
    }

    pub fn lookup_by_seid(&self, seid: u64) -> Option<Arc<UeSession>> {
        self.0.by_seid.get(&seid).map(|e| e.value().clone())
    }

    pub fn lookup_by_ue_ip(&self, ue_ip: Ipv4Addr) -> Option<Arc<UeSession>> {
        self.0.by_ue_ip.get(&ue_ip).map(|e| e.value().clone())
    }

    pub fn lookup_by_teid(&self, teid: u32) -> Option<Arc<UeSession>> {
        self.0.by_teid.get(&teid).map(|e| e.value().clone())
    }

    /// Apply `mutator` to the rules of one session, holding only that session's lock.
    pub fn update<R>(
        &self,
        seid: u64,
        mutator: impl FnOnce(&mut SessionRules) -> R,
    ) -> Result<R, LookupError> {
        let session = self.lookup_by_seid(seid).ok_or(LookupError::NoSession)?;
        Ok(session.update_rules(mutator))
    }

    /// Remove a session from all three indices.
    pub fn remove(&self, seid: u64) -> Option<Arc<UeSession>> {
        let t = &self.0;
        let _writer = t.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let (_, session) = t.by_seid.remove(&seid)?;
        t.by_ue_ip
            .remove_if(&session.ue_ip, |_, s| Arc::ptr_eq(s, &session));
        t.by_teid
            .remove_if(&session.teid_uplink, |_, s| Arc::ptr_eq(s, &session));
        Some(session)
    }

    pub fn len(&self) -> usize {
        self.0.by_seid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.by_seid.is_empty()
    }

    /// A point in time copy of the session list.
    pub fn sessions(&self) -> Vec<Arc<UeSession>> {
        self.0.by_seid.iter().map(|e| e.value().clone()).collect()
    }
}
