//! worker - a forwarding thread that owns the sessions steered to one core
use super::{CoreId, DownlinkPipeline, Ingress, PacketSink, UplinkPipeline};
use anyhow::{Context, Result};
use async_channel::Receiver;
use slog::{Logger, info, warn};
use std::sync::Arc;
use std::thread::JoinHandle;

// Packets handled per wakeup before blocking again.
const BURST: usize = 32;

pub struct Worker {
    pub core: CoreId,
    pub pin: bool,
    pub downlink: DownlinkPipeline,
    pub uplink: UplinkPipeline,
    pub queue: Receiver<Ingress>,
    pub sink: Arc<dyn PacketSink>,
    pub logger: Logger,
}

impl Worker {
    pub fn spawn(self) -> Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name(format!("upf-worker-{}", self.core))
            .spawn(move || self.run())
            .context("Failed to spawn worker thread")
    }

    fn run(self) {
        if self.pin {
            match pin_to_cpu(self.core.0 as usize) {
                Ok(()) => info!(self.logger, "Pinned to CPU {}", self.core),
                Err(e) => warn!(self.logger, "Failed to pin to CPU {} - {e}", self.core),
            }
        }

        // The queue closes at shutdown.
        while let Ok(ingress) = self.queue.recv_blocking() {
            self.handle(ingress);
            for _ in 1..BURST {
                let Ok(ingress) = self.queue.try_recv() else {
                    break;
                };
                self.handle(ingress);
            }
        }
        info!(self.logger, "Worker exiting");
    }

    fn handle(&self, ingress: Ingress) {
        match ingress {
            Ingress::Downlink(packet) => self.downlink.handle(&packet, self.sink.as_ref()),
            Ingress::Uplink(packet) => self.uplink.handle(&packet, self.sink.as_ref()),
        }
    }
}

fn pin_to_cpu(cpu: usize) -> std::io::Result<()> {
    // SAFETY: cpu_set_t is plain data and the set outlives the call.
    let rc = unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_SET(cpu, &mut set);
        libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set)
    };
    if rc != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}
