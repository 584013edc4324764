// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! UDP endpoint ownership and the receive loop.

use crate::cancel::CancelToken;
use crate::config::MAX_DATAGRAM;
use crate::error::{Error, Result};
use crate::protocol::Envelope;
use crate::transport::correlator::PendingTable;
use crate::transport::discovery::ListenerTable;
use crate::transport::LinkConfig;
use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::UdpSocket;

/// Owner of the process's UDP control endpoint.
///
/// Multiplexes many concurrent request/reply exchanges and discovery sweeps
/// over one socket. Create with [`UdpLink::new`], share behind an `Arc`, and
/// call [`UdpLink::shutdown`] (or drop the last handle) to stop the receive
/// loop.
pub struct UdpLink {
    pub(super) config: LinkConfig,
    /// Bind-once guard: `None` until `initialize`, then the bound socket.
    endpoint: Mutex<Option<Arc<UdpSocket>>>,
    pub(super) pending: Arc<PendingTable>,
    pub(super) listeners: Arc<ListenerTable>,
    /// Id source for pending requests and discovery listeners.
    pub(super) seq: AtomicU64,
    /// Stops the receive loop on shutdown.
    stop: CancelToken,
    disposed: AtomicBool,
}

impl UdpLink {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(LinkConfig::default())
    }

    #[must_use]
    pub fn with_config(config: LinkConfig) -> Self {
        Self {
            config,
            endpoint: Mutex::new(None),
            pending: Arc::new(PendingTable::new()),
            listeners: Arc::new(ListenerTable::new()),
            seq: AtomicU64::new(1),
            stop: CancelToken::new(),
            disposed: AtomicBool::new(false),
        }
    }

    /// Bind the endpoint and start the receive loop.
    ///
    /// Idempotent and safe to call concurrently: the first call binds (to
    /// `bind` when given, else the configured address); later calls return
    /// Ok without touching the socket. Requests and sweeps initialize the
    /// link on first use, so calling this explicitly is optional.
    pub async fn initialize(&self, bind: Option<SocketAddr>) -> Result<()> {
        if self.is_disposed() {
            return Err(Error::Disposed);
        }

        let mut slot = self.endpoint.lock();
        if slot.is_some() {
            return Ok(());
        }

        let addr = bind.unwrap_or(self.config.bind);
        let socket = Arc::new(bind_socket(addr)?);
        let local = socket.local_addr()?;
        log::debug!("[UDP] bound local={}", local);

        spawn_receive_loop(
            Arc::clone(&socket),
            local,
            Arc::clone(&self.pending),
            Arc::clone(&self.listeners),
            self.stop.clone(),
        );

        *slot = Some(socket);
        Ok(())
    }

    /// Fire-and-forget raw datagram send.
    pub async fn send_raw(&self, payload: &[u8], target: SocketAddr) -> Result<usize> {
        let socket = self.ensure_endpoint().await?;
        self.send_datagram(&socket, payload, target).await
    }

    /// Stop the receive loop and fail all outstanding operations.
    ///
    /// In-flight requests resolve with [`Error::Disposed`]; discovery sweeps
    /// end the same way. Further operations are rejected.
    pub fn shutdown(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        log::debug!(
            "[UDP] shutdown, dropping {} pending request(s), {} listener(s)",
            self.pending.len(),
            self.listeners.len()
        );
        self.stop.cancel();
        self.pending.clear();
        self.listeners.clear();
        *self.endpoint.lock() = None;
    }

    /// Local address of the bound endpoint, if initialized.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        let slot = self.endpoint.lock();
        slot.as_ref().and_then(|socket| socket.local_addr().ok())
    }

    /// Number of unicast requests currently awaiting a reply.
    #[must_use]
    pub fn outstanding_requests(&self) -> usize {
        self.pending.len()
    }

    /// Number of discovery sweeps currently collecting replies.
    #[must_use]
    pub fn discovery_listeners(&self) -> usize {
        self.listeners.len()
    }

    pub(super) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    pub(super) async fn ensure_endpoint(&self) -> Result<Arc<UdpSocket>> {
        if self.is_disposed() {
            return Err(Error::Disposed);
        }
        if let Some(socket) = self.endpoint.lock().clone() {
            return Ok(socket);
        }
        self.initialize(None).await?;
        self.endpoint.lock().clone().ok_or(Error::Disposed)
    }

    pub(super) async fn send_datagram(
        &self,
        socket: &UdpSocket,
        payload: &[u8],
        target: SocketAddr,
    ) -> Result<usize> {
        let sent = match socket.send_to(payload, target).await {
            Ok(sent) => sent,
            Err(err) => {
                log::debug!("[UDP] tx error target={} len={}: {}", target, payload.len(), err);
                return Err(Error::Network(err));
            }
        };
        log::debug!(
            "[UDP] tx {} -> {} len={}",
            socket.local_addr().map_or_else(|_| "?".to_string(), |a| a.to_string()),
            target,
            sent
        );
        log::trace!("[UDP] tx payload {}", String::from_utf8_lossy(payload));
        Ok(sent)
    }
}

impl Default for UdpLink {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for UdpLink {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Socket setup: reuse-address for controller restarts, broadcast for
/// discovery, nonblocking for the tokio reactor.
fn bind_socket(addr: SocketAddr) -> Result<UdpSocket> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_broadcast(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    let socket = UdpSocket::from_std(socket.into())?;
    Ok(socket)
}

/// Background task: receive for the lifetime of the link, classify every
/// inbound datagram. Terminates only on shutdown.
fn spawn_receive_loop(
    socket: Arc<UdpSocket>,
    local: SocketAddr,
    pending: Arc<PendingTable>,
    listeners: Arc<ListenerTable>,
    stop: CancelToken,
) {
    tokio::spawn(async move {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            tokio::select! {
                _ = stop.cancelled() => {
                    log::debug!("[UDP] receive loop stopped local={}", local);
                    break;
                }
                received = socket.recv_from(&mut buf) => match received {
                    Ok((len, src)) => route_datagram(&buf[..len], src, local, &pending, &listeners),
                    Err(err) => {
                        log::warn!("[UDP] rx error local={}: {}", local, err);
                    }
                },
            }
        }
    });
}

fn route_datagram(
    payload: &[u8],
    src: SocketAddr,
    local: SocketAddr,
    pending: &PendingTable,
    listeners: &ListenerTable,
) {
    log::debug!("[UDP] rx {} <- {} len={}", local, src, payload.len());
    log::trace!("[UDP] rx payload {}", String::from_utf8_lossy(payload));

    // Non-protocol traffic shares the port; undecodable payloads are dropped
    // here so the sender's timeout applies instead of a hard failure.
    let envelope = match Envelope::decode(payload) {
        Ok(envelope) => envelope,
        Err(err) => {
            log::debug!("[UDP] malformed datagram from {} dropped: {}", src, err);
            return;
        }
    };

    if let Some(unclaimed) = pending.complete(src, envelope) {
        listeners.fan_out(unclaimed, src);
    }
}
