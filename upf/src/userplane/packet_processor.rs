use super::downlink_pipeline::{DownlinkCounters, downlink_counter_indices::*};
use super::ipv4::{self, UDP_HEADER_LEN};
use super::uplink_pipeline::{UplinkCounters, uplink_counter_indices::*};
use super::worker::Worker;
use super::{CoreId, DownlinkPipeline, FlowKey, FlowSteering, Ingress, PacketSink, UplinkPipeline};
use crate::data::{Config, SessionTable};
use anyhow::{Result, ensure};
use async_channel::{Sender, TrySendError};
use atomic_counter::{AtomicCounter, RelaxedCounter};
use slog::{Logger, info, o, warn};
use std::net::SocketAddrV4;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

/// Steers packets onto the worker that owns their session.
#[derive(Clone)]
pub struct PacketProcessor {
    sessions: SessionTable,
    steering: FlowSteering,
    queues: Arc<[Sender<Ingress>]>,
    counters: Arc<[(Arc<DownlinkCounters>, Arc<UplinkCounters>)]>,
    queue_full: Arc<RelaxedCounter>,
    workers: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

/// Packet counters summed over all workers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserplaneStats {
    pub downlink: [usize; DL_NUM_COUNTERS],
    pub uplink: [usize; UL_NUM_COUNTERS],
    pub queue_full: usize,
}

impl PacketProcessor {
    pub fn new(
        config: &Config,
        sessions: SessionTable,
        steering: FlowSteering,
        sink: Arc<dyn PacketSink>,
        logger: &Logger,
    ) -> Result<Self> {
        ensure!(
            steering.num_cores() == config.num_workers,
            "Steering over {} cores but {} workers configured",
            steering.num_cores(),
            config.num_workers
        );
        let n3_addr = SocketAddrV4::new(config.n3_ip, config.gtpu_source_port);

        let mut queues = vec![];
        let mut counters = vec![];
        let mut workers = vec![];
        for core in (0..config.num_workers).map(CoreId) {
            let (tx, rx) = async_channel::bounded(config.worker_queue_depth);
            let logger = logger.new(o!("worker" => core.0));
            let downlink_counters = Arc::new(DownlinkCounters::default());
            let uplink_counters = Arc::new(UplinkCounters::default());

            let worker = Worker {
                core,
                pin: config.pin_workers,
                downlink: DownlinkPipeline::new(
                    sessions.clone(),
                    core,
                    n3_addr,
                    downlink_counters.clone(),
                    logger.clone(),
                ),
                uplink: UplinkPipeline::new(
                    sessions.clone(),
                    core,
                    config.gnb_address_policy,
                    uplink_counters.clone(),
                    logger.clone(),
                ),
                queue: rx,
                sink: sink.clone(),
                logger,
            };
            workers.push(worker.spawn()?);
            queues.push(tx);
            counters.push((downlink_counters, uplink_counters));
        }
        info!(logger, "Started {} forwarding workers", config.num_workers);

        Ok(PacketProcessor {
            sessions,
            steering,
            queues: queues.into(),
            counters: counters.into(),
            queue_full: Arc::new(RelaxedCounter::new(0)),
            workers: Arc::new(Mutex::new(workers)),
        })
    }

    /// Queue a packet on its worker.  Never blocks.  Returns false if the packet was dropped.
    pub fn dispatch(&self, ingress: Ingress) -> bool {
        let core = self.steer(&ingress);
        match self.queues[core.0 as usize].try_send(ingress) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.queue_full.inc();
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Which worker a packet belongs to.  Packets too mangled to steer go to core 0,
    /// which drops and counts them.
    pub fn steer(&self, ingress: &Ingress) -> CoreId {
        match ingress {
            Ingress::Downlink(packet) => ipv4::peek_destination(packet)
                .map_or(CoreId(0), |ue_ip| self.steering.core_for(FlowKey::UeIp(ue_ip))),
            Ingress::Uplink(packet) => match peek_uplink_teid(packet) {
                // A TEID chosen by the SMF need not hash to the session's core.
                Some(teid) => self
                    .sessions
                    .lookup_by_teid(teid)
                    .and_then(|s| s.affinity_core)
                    .unwrap_or_else(|| self.steering.core_for(FlowKey::Teid(teid))),
                None => CoreId(0),
            },
        }
    }

    pub fn is_running(&self) -> bool {
        self.queues.first().is_some_and(|q| !q.is_closed())
    }

    pub fn stats(&self) -> UserplaneStats {
        let mut stats = UserplaneStats {
            downlink: [0; DL_NUM_COUNTERS],
            uplink: [0; UL_NUM_COUNTERS],
            queue_full: self.queue_full.get(),
        };
        for (dl, ul) in self.counters.iter() {
            for (total, counter) in stats.downlink.iter_mut().zip(dl.iter()) {
                *total += counter.get();
            }
            for (total, counter) in stats.uplink.iter_mut().zip(ul.iter()) {
                *total += counter.get();
            }
        }
        stats
    }

    /// Close the worker queues and wait for the workers to finish what is queued.
    pub fn shutdown(&self, logger: &Logger) {
        for queue in self.queues.iter() {
            queue.close();
        }
        let workers = std::mem::take(&mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner));
        for worker in workers {
            if worker.join().is_err() {
                warn!(logger, "Worker thread panicked");
            }
        }
    }
}

fn peek_uplink_teid(packet: &[u8]) -> Option<u32> {
    let ihl = (packet.first()? & 0x0f) as usize * 4;
    gtpu::peek_teid(packet.get(ihl + UDP_HEADER_LEN..)?)
}

/// Log totals at info, and drop counters at warn, whenever they move.
pub async fn dump_stats(logger: Logger, processor: PacketProcessor, interval: Duration) {
    const FIRST_DL_WARN_IDX: usize = DL_DROP_TOO_SHORT;
    const FIRST_UL_WARN_IDX: usize = UL_GNB_ADDR_MISMATCH;
    let mut last = processor.stats();

    loop {
        async_std::task::sleep(interval).await;
        let now = processor.stats();

        if now.downlink[DL_RX_PKTS] != last.downlink[DL_RX_PKTS]
            || now.uplink[UL_RX_PKTS] != last.uplink[UL_RX_PKTS]
        {
            info!(
                &logger,
                "DL rx={}/{}B tx={}/{}B UL rx={}/{}B tx={}/{}B",
                now.downlink[DL_RX_PKTS],
                now.downlink[DL_RX_BYTES],
                now.downlink[DL_TX_PKTS],
                now.downlink[DL_TX_BYTES],
                now.uplink[UL_RX_PKTS],
                now.uplink[UL_RX_BYTES],
                now.uplink[UL_TX_PKTS],
                now.uplink[UL_TX_BYTES]
            );
        }

        if now.downlink[FIRST_DL_WARN_IDX..] != last.downlink[FIRST_DL_WARN_IDX..] {
            warn!(
                &logger,
                "DL DROPS too_short={} not_ipv4={} bad_length={} no_session={} affinity={} far_drop={} far_buffer={} too_long={} sink_full={} other={}",
                now.downlink[DL_DROP_TOO_SHORT],
                now.downlink[DL_DROP_NOT_IPV4],
                now.downlink[DL_DROP_BAD_LENGTH],
                now.downlink[DL_DROP_NO_SESSION],
                now.downlink[DL_DROP_AFFINITY_MISMATCH],
                now.downlink[DL_DROP_FAR_DROP],
                now.downlink[DL_DROP_FAR_BUFFER],
                now.downlink[DL_DROP_TOO_LONG],
                now.downlink[DL_DROP_SINK_FULL],
                now.downlink[DL_DROP_OTHER]
            );
        }

        if now.uplink[FIRST_UL_WARN_IDX..] != last.uplink[FIRST_UL_WARN_IDX..] {
            warn!(
                &logger,
                "UL DROPS too_short={} ip={} udp={} port={} gtp_short={} gtp_version={} gtp_type={} gtp_length={} no_session={} affinity={} gnb_addr={}/{} inner={} sink_full={} other={}",
                now.uplink[UL_DROP_TOO_SHORT],
                now.uplink[UL_DROP_NOT_IPV4] + now.uplink[UL_DROP_BAD_LENGTH],
                now.uplink[UL_DROP_NOT_UDP],
                now.uplink[UL_DROP_WRONG_PORT],
                now.uplink[UL_DROP_GTP_TOO_SHORT],
                now.uplink[UL_DROP_GTP_BAD_VERSION],
                now.uplink[UL_DROP_GTP_MESSAGE_TYPE],
                now.uplink[UL_DROP_GTP_BAD_LENGTH],
                now.uplink[UL_DROP_NO_SESSION],
                now.uplink[UL_DROP_AFFINITY_MISMATCH],
                now.uplink[UL_DROP_GNB_ADDR_MISMATCH],
                now.uplink[UL_GNB_ADDR_MISMATCH],
                now.uplink[UL_DROP_BAD_INNER_PACKET],
                now.uplink[UL_DROP_SINK_FULL],
                now.uplink[UL_DROP_OTHER]
            );
        }

        if now.queue_full != last.queue_full {
            warn!(&logger, "Worker queues full - {} packets dropped", now.queue_full);
        }
        last = now;
    }
}
