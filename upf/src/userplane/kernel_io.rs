//! kernel_io - feed the packet processor from Linux interfaces and transmit its output
//!
//! N3 is a raw IPv4 socket that sees every UDP packet the host receives, and sends
//! complete outer packets with IP_HDRINCL.  A plain UDP socket is bound to the GTP-U
//! port alongside it so that the kernel does not answer GTP-U with ICMP port unreachable.
//! N6 is a tun device carrying inner packets.
use super::ipv4;
use super::{Egress, Ingress, MAX_PACKET_LEN, PacketProcessor, PacketSink};
use crate::data::Config;
use anyhow::{Context, Result, bail, ensure};
use async_std::io::ReadExt;
use async_std::task::{self, JoinHandle};
use async_tun::{Tun, TunBuilder};
use gtpu::GTPU_PORT;
use slog::{Logger, info, warn};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::os::fd::{AsRawFd, FromRawFd};
use std::sync::Arc;
use std::time::Duration;

// How often the N3 receive thread checks for shutdown.
const N3_READ_TIMEOUT: Duration = Duration::from_millis(200);

pub struct KernelIo {
    n3_ip: Ipv4Addr,
    n3_socket: Arc<Socket>,
    _n3_guard_socket: Socket,
    n6_tun: Tun,
}

/// Transmits worker output directly from the worker threads.
pub struct KernelSink {
    n3_socket: Arc<Socket>,
    n6_writer: File,
}

impl KernelIo {
    pub async fn open(config: &Config, logger: &Logger) -> Result<Self> {
        let n3_socket = create_n3_raw_socket()?;
        let n3_guard_socket = create_n3_guard_socket(config.n3_ip, logger)?;
        let n6_tun = open_n6_tun_device(&config.n6_tun_name, logger).await?;
        Ok(KernelIo {
            n3_ip: config.n3_ip,
            n3_socket: Arc::new(n3_socket),
            _n3_guard_socket: n3_guard_socket,
            n6_tun,
        })
    }

    pub fn sink(&self) -> Result<KernelSink> {
        // SAFETY: dup returns a new descriptor that the File then owns.
        let fd = unsafe { libc::dup(self.n6_tun.as_raw_fd()) };
        ensure!(
            fd >= 0,
            "Failed to dup tun descriptor - {}",
            std::io::Error::last_os_error()
        );
        let n6_writer = unsafe { File::from_raw_fd(fd) };
        Ok(KernelSink {
            n3_socket: self.n3_socket.clone(),
            n6_writer,
        })
    }

    /// Start receiving.  The N6 task must be cancelled at shutdown; the N3 thread exits
    /// by itself once the packet processor has shut down.
    pub fn start(self, processor: PacketProcessor, logger: &Logger) -> Result<JoinHandle<()>> {
        let n3_socket = self.n3_socket.clone();
        let n3_ip = self.n3_ip;
        let n3_processor = processor.clone();
        let n3_logger = logger.clone();
        std::thread::Builder::new()
            .name("upf-n3-rx".to_string())
            .spawn(move || n3_receive_loop(&n3_socket, n3_ip, &n3_processor, &n3_logger))
            .context("Failed to spawn N3 receive thread")?;

        let logger = logger.clone();
        let n6_tun = self.n6_tun;
        Ok(task::spawn(async move {
            let mut buf = [0u8; MAX_PACKET_LEN];
            loop {
                match n6_tun.reader().read(&mut buf).await {
                    Ok(bytes_read) => {
                        processor.dispatch(Ingress::Downlink(buf[..bytes_read].to_vec()));
                    }
                    Err(e) => {
                        warn!(logger, "Exiting N6 receive task with error {e}");
                        break;
                    }
                }
            }
        }))
    }
}

fn n3_receive_loop(socket: &Socket, n3_ip: Ipv4Addr, processor: &PacketProcessor, logger: &Logger) {
    let mut buf = [0u8; MAX_PACKET_LEN];
    let mut reader = socket;
    while processor.is_running() {
        match reader.read(&mut buf) {
            Ok(bytes_read) => {
                let packet = &buf[..bytes_read];
                if is_gtpu_for(packet, n3_ip) {
                    processor.dispatch(Ingress::Uplink(packet.to_vec()));
                }
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => {
                warn!(logger, "Exiting N3 receive thread with error {e}");
                return;
            }
        }
    }
    info!(logger, "N3 receive thread exiting");
}

// The raw socket also sees PFCP and everything else, so only pass on what is ours.
fn is_gtpu_for(packet: &[u8], n3_ip: Ipv4Addr) -> bool {
    ipv4::peek_destination(packet) == Some(n3_ip)
        && ipv4::parse_udp_datagram(packet).is_ok_and(|udp| udp.dst.port() == GTPU_PORT)
}

impl PacketSink for KernelSink {
    fn transmit(&self, egress: Egress) -> bool {
        match egress {
            Egress::Ran { gnb, packet } => {
                // The port of a raw socket destination is ignored.  It is in the UDP header.
                let dest = SockAddr::from(SocketAddr::V4(SocketAddrV4::new(*gnb.ip(), 0)));
                self.n3_socket.send_to(&packet, &dest).is_ok()
            }
            Egress::DataNetwork { packet } => (&self.n6_writer).write(&packet).is_ok(),
        }
    }
}

fn create_n3_raw_socket() -> Result<Socket> {
    let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::UDP))
        .context("Failed to open raw N3 socket - this needs CAP_NET_RAW")?;

    let on: libc::c_int = 1;
    // SAFETY: the option value points to a live c_int of the length given.
    let rc = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            libc::IPPROTO_IP,
            libc::IP_HDRINCL,
            &on as *const libc::c_int as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    ensure!(
        rc == 0,
        "Failed to set IP_HDRINCL - {}",
        std::io::Error::last_os_error()
    );
    socket.set_read_timeout(Some(N3_READ_TIMEOUT))?;
    Ok(socket)
}

fn create_n3_guard_socket(n3_ip: Ipv4Addr, logger: &Logger) -> Result<Socket> {
    let transport_address = SocketAddr::V4(SocketAddrV4::new(n3_ip, GTPU_PORT));
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_port(true)?;
    socket
        .bind(&transport_address.into())
        .context(format!("Failed to bind {}", transport_address))?;
    info!(logger, "Serving GTP-U on {transport_address}");
    Ok(socket)
}

async fn open_n6_tun_device(tun_device_name: &str, logger: &Logger) -> Result<Tun> {
    match TunBuilder::new()
        .name(tun_device_name)
        .tap(false)
        .packet_info(false)
        .try_build()
        .await
    {
        Ok(tun) => {
            info!(logger, "Opened tun device '{tun_device_name}' for N6");
            Ok(tun)
        }
        Err(e) => bail!(
            "Failed to open TUN device '{tun_device_name}' - error {e}
 EPERM: the device may not exist or may not be owned by the current user
 EINVAL: the device may be a tap device rather than a tun device
 EBUSY: another process, such as another UPF, has the device open"
        ),
    }
}
