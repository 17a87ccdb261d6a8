//! pfcp_server - the N4 UDP endpoint.  Runs the session controller over a socket.
use crate::procedures::{HandlerApi, SessionController};
use anyhow::{Context, Result};
use async_std::net::UdpSocket;
use async_std::task::{self, JoinHandle};
use slog::{Logger, info, warn};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use stop_token::prelude::*;
use stop_token::{StopSource, StopToken};

const MAX_PFCP_MESSAGE_LEN: usize = 8192;
const MIN_IDLE_SWEEP_PERIOD: Duration = Duration::from_secs(1);

/// Stops the server tasks when shut down or dropped.
pub struct ShutdownHandle {
    tasks: Vec<JoinHandle<()>>,
    stop_source: StopSource,
}

impl ShutdownHandle {
    pub async fn graceful_shutdown(self) {
        drop(self.stop_source);
        for task in self.tasks {
            task.await;
        }
    }
}

pub async fn bind(addr: SocketAddr, logger: &Logger) -> Result<UdpSocket> {
    let socket = UdpSocket::bind(addr)
        .await
        .context(format!("Failed to bind PFCP socket {addr}"))?;
    info!(logger, "Serving PFCP on {}", socket.local_addr()?);
    Ok(socket)
}

/// Serve PFCP on `socket` until shut down.  With an idle timeout, also sweep for
/// sessions that the SMF has stopped talking about.
pub fn spawn<A: HandlerApi>(
    socket: UdpSocket,
    controller: SessionController<A>,
    idle_timeout: Option<Duration>,
    logger: Logger,
) -> ShutdownHandle {
    let stop_source = StopSource::new();
    let mut tasks = vec![];

    if let Some(idle_timeout) = idle_timeout {
        tasks.push(task::spawn(idle_sweep(
            controller.clone(),
            (idle_timeout / 4).max(MIN_IDLE_SWEEP_PERIOD),
            stop_source.token(),
            logger.clone(),
        )));
    }
    tasks.push(task::spawn(serve(
        socket,
        controller,
        stop_source.token(),
        logger,
    )));

    ShutdownHandle { tasks, stop_source }
}

async fn serve<A: HandlerApi>(
    socket: UdpSocket,
    controller: SessionController<A>,
    stop_token: StopToken,
    logger: Logger,
) {
    let mut buf = [0u8; MAX_PFCP_MESSAGE_LEN];
    loop {
        let (bytes_read, peer) = match socket.recv_from(&mut buf).timeout_at(stop_token.clone()).await {
            Err(_) => break,
            Ok(Err(e)) => {
                // For example an ICMP error from an earlier send.
                warn!(logger, "PFCP receive error - {e}");
                continue;
            }
            Ok(Ok(x)) => x,
        };

        let Some(response) = controller.handle_message(&buf[..bytes_read], peer, &logger) else {
            continue;
        };
        let sent = match response.message.encode() {
            Ok(bytes) => socket
                .send_to(&bytes, peer)
                .await
                .inspect_err(|e| warn!(logger, "Failed to send PFCP response to {peer} - {e}"))
                .is_ok(),
            Err(e) => {
                warn!(logger, "Failed to encode {} - {e}", response.message.message_type());
                false
            }
        };
        if sent {
            controller.response_sent(&response, &logger);
        } else {
            controller.response_not_sent(&response, &logger);
        }
    }
    info!(logger, "PFCP server stopped");
}

async fn idle_sweep<A: HandlerApi>(
    controller: SessionController<A>,
    period: Duration,
    stop_token: StopToken,
    logger: Logger,
) {
    while task::sleep(period)
        .timeout_at(stop_token.clone())
        .await
        .is_ok()
    {
        let expired = controller.expire_idle_sessions(Instant::now(), &logger);
        if expired > 0 {
            info!(logger, "Expired {expired} idle sessions");
        }
    }
}
