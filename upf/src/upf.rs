use crate::data::{Config, SeidAllocator, SessionTable};
use crate::pfcp_server::{self, ShutdownHandle};
use crate::procedures::{HandlerApi, SessionController};
use crate::userplane::{
    FlowSteering, Ingress, KernelIo, PacketProcessor, PacketSink, UserplaneStats, dump_stats,
};
use anyhow::Result;
use async_std::sync::Mutex;
use async_std::task::{self, JoinHandle};
use slog::{Logger, info};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

// Seconds from 1900, the PFCP time base, to 1970.
const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

#[derive(Clone)]
pub struct Upf {
    config: Arc<Config>,
    logger: Logger,
    sessions: SessionTable,
    steering: FlowSteering,
    seids: Arc<SeidAllocator>,
    recovery_time_stamp: u32,
    packet_processor: PacketProcessor,
    pfcp_addr: SocketAddr,
    pfcp_server: Arc<Mutex<Option<ShutdownHandle>>>,
    background_tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl Upf {
    /// Start a UPF that forwards between the N3 and N6 interfaces of this host.
    pub async fn start(config: Config, logger: Logger) -> Result<Self> {
        let kernel_io = KernelIo::open(&config, &logger).await?;
        let sink = Arc::new(kernel_io.sink()?);
        let upf = Self::start_with_sink(config, sink, logger).await?;
        let n6_task = kernel_io.start(upf.packet_processor.clone(), &upf.logger)?;
        upf.background_tasks.lock().await.push(n6_task);
        Ok(upf)
    }

    /// Start a UPF that sends forwarded packets to `sink`.  Packets are fed in with
    /// `ingress()`.
    pub async fn start_with_sink(
        config: Config,
        sink: Arc<dyn PacketSink>,
        logger: Logger,
    ) -> Result<Self> {
        let pfcp_socket = pfcp_server::bind(
            SocketAddr::new(config.node_ip.into(), config.pfcp_port),
            &logger,
        )
        .await?;
        let pfcp_addr = pfcp_socket.local_addr()?;

        let sessions = SessionTable::new();
        let steering = FlowSteering::new(config.num_workers);
        let packet_processor =
            PacketProcessor::new(&config, sessions.clone(), steering.clone(), sink, &logger)?;

        let mut background_tasks = vec![];
        if config.stats_interval_secs > 0 {
            background_tasks.push(task::spawn(dump_stats(
                logger.clone(),
                packet_processor.clone(),
                Duration::from_secs(config.stats_interval_secs),
            )));
        }

        let idle_timeout = config.session_idle_timeout();
        let upf = Upf {
            config: Arc::new(config),
            logger,
            sessions,
            steering,
            seids: Arc::new(SeidAllocator::new()),
            recovery_time_stamp: recovery_time_stamp_now(),
            packet_processor,
            pfcp_addr,
            pfcp_server: Arc::new(Mutex::new(None)),
            background_tasks: Arc::new(Mutex::new(background_tasks)),
        };

        let handle = pfcp_server::spawn(
            pfcp_socket,
            SessionController::new(upf.clone()),
            idle_timeout,
            upf.logger.clone(),
        );
        *upf.pfcp_server.lock().await = Some(handle);

        Ok(upf)
    }

    pub async fn graceful_shutdown(self) {
        info!(&self.logger, "Shutting down");
        if let Some(h) = self.pfcp_server.lock().await.take() {
            h.graceful_shutdown().await;
        }
        for task in self.background_tasks.lock().await.drain(..) {
            task.cancel().await;
        }
        let processor = self.packet_processor.clone();
        let logger = self.logger.clone();
        task::spawn_blocking(move || processor.shutdown(&logger)).await;
    }

    pub fn pfcp_addr(&self) -> SocketAddr {
        self.pfcp_addr
    }

    /// Feed in a packet.  Returns false if it was dropped because its worker is busy.
    pub fn ingress(&self, packet: Ingress) -> bool {
        self.packet_processor.dispatch(packet)
    }

    pub fn userplane_stats(&self) -> UserplaneStats {
        self.packet_processor.stats()
    }

    pub fn session_table(&self) -> &SessionTable {
        &self.sessions
    }
}

impl HandlerApi for Upf {
    fn config(&self) -> &Config {
        &self.config
    }

    fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    fn steering(&self) -> &FlowSteering {
        &self.steering
    }

    fn recovery_time_stamp(&self) -> u32 {
        self.recovery_time_stamp
    }

    fn allocate_seid(&self) -> u64 {
        self.seids
            .allocate(|seid| self.sessions.lookup_by_seid(seid).is_some())
    }
}

// Truncated to 32 bits, so this wraps in 2036 as NTP does.
fn recovery_time_stamp_now() -> u32 {
    let unix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs());
    (unix + NTP_UNIX_OFFSET) as u32
}
