// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Outstanding unicast requests and reply matching.
//!
//! The protocol echoes no request id, so a reply can only be attributed by
//! its source address: the oldest still-pending request addressed to that
//! source wins. Requests to *different* addresses therefore never interfere;
//! two concurrent requests to the *same* address may have their replies
//! swapped (registration order decides, not which request the device was
//! answering). That ambiguity is inherent to the wire protocol and is kept
//! visible here rather than papered over. All matching goes through
//! [`PendingTable::complete`], so an (address, request-id) scheme could
//! replace it if the protocol ever grows an id echo.

use crate::cancel::{cancelled_or_never, CancelToken};
use crate::error::{Error, Result};
use crate::protocol::Envelope;
use crate::transport::udp::UdpLink;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::sync::oneshot;

struct PendingEntry {
    id: u64,
    target: SocketAddr,
    tx: oneshot::Sender<Envelope>,
}

/// Registration-ordered table of in-flight unicast requests.
///
/// Each entry is destroyed exactly once: by a matching reply, by the
/// caller's deadline, or by cancellation, whichever fires first.
pub(super) struct PendingTable {
    entries: Mutex<Vec<PendingEntry>>,
}

impl PendingTable {
    pub(super) fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    pub(super) fn register(&self, id: u64, target: SocketAddr) -> oneshot::Receiver<Envelope> {
        let (tx, rx) = oneshot::channel();
        self.entries.lock().push(PendingEntry { id, target, tx });
        rx
    }

    /// Resolve the oldest pending request addressed to `src`.
    ///
    /// Returns the envelope back when no request claims it; the caller fans
    /// it out as an unsolicited reply. Entries whose waiter already gave up
    /// (deadline raced the reply) are skipped in favor of the next oldest.
    pub(super) fn complete(&self, src: SocketAddr, envelope: Envelope) -> Option<Envelope> {
        let mut entries = self.entries.lock();
        let mut envelope = envelope;
        while let Some(idx) = entries.iter().position(|e| e.target == src) {
            let entry = entries.remove(idx);
            match entry.tx.send(envelope) {
                Ok(()) => {
                    log::debug!("[CORR] reply from {} resolved request id={}", src, entry.id);
                    return None;
                }
                Err(returned) => {
                    log::debug!(
                        "[CORR] request id={} already gone, trying next pending for {}",
                        entry.id,
                        src
                    );
                    envelope = returned;
                }
            }
        }
        Some(envelope)
    }

    pub(super) fn remove(&self, id: u64) {
        self.entries.lock().retain(|e| e.id != id);
    }

    pub(super) fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Drop every entry; waiters observe a closed channel.
    pub(super) fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl UdpLink {
    /// One unicast request/reply exchange.
    ///
    /// Sends `command` to `target` and waits until the first of: a reply
    /// routed back from that address (Ok), the `timeout` deadline
    /// ([`Error::Timeout`]), or the cancellation token firing
    /// ([`Error::Cancelled`]). The pending entry is removed on every exit
    /// path.
    pub async fn request(
        &self,
        command: &Envelope,
        target: SocketAddr,
        timeout: Duration,
        cancel: Option<&CancelToken>,
    ) -> Result<Envelope> {
        if self.is_disposed() {
            return Err(Error::Disposed);
        }
        if cancel.is_some_and(CancelToken::is_cancelled) {
            return Err(Error::Cancelled);
        }

        let payload = command.encode()?;
        let socket = self.ensure_endpoint().await?;

        let id = self.seq.fetch_add(1, Ordering::Relaxed);
        let rx = self.pending.register(id, target);
        log::debug!(
            "[CORR] request id={} method={} target={} timeout={:?}",
            id,
            command.method,
            target,
            timeout
        );

        if let Err(err) = self.send_datagram(&socket, &payload, target).await {
            self.pending.remove(id);
            return Err(err);
        }

        let result = tokio::select! {
            reply = rx => match reply {
                Ok(envelope) => Ok(envelope),
                // Sender dropped without a reply: the table was cleared by
                // shutdown.
                Err(_) => Err(Error::Disposed),
            },
            () = tokio::time::sleep(timeout) => Err(Error::Timeout),
            () = cancelled_or_never(cancel) => Err(Error::Cancelled),
        };

        match &result {
            Ok(_) => {}
            Err(err) => {
                self.pending.remove(id);
                log::debug!("[CORR] request id={} target={} failed: {}", id, target, err);
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        format!("192.0.2.1:{}", port).parse().unwrap()
    }

    #[test]
    fn matches_oldest_pending_for_source() {
        let table = PendingTable::new();
        let mut first = table.register(1, addr(38899));
        let mut second = table.register(2, addr(38899));

        assert!(table.complete(addr(38899), Envelope::get_pilot()).is_none());
        assert!(first.try_recv().is_ok());
        assert!(second.try_recv().is_err());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn unmatched_reply_is_returned() {
        let table = PendingTable::new();
        let _rx = table.register(1, addr(38899));

        let stray = table.complete(addr(40000), Envelope::get_pilot());
        assert!(stray.is_some());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn abandoned_entry_is_skipped() {
        let table = PendingTable::new();
        let rx_gone = table.register(1, addr(38899));
        drop(rx_gone);
        let mut rx_live = table.register(2, addr(38899));

        assert!(table.complete(addr(38899), Envelope::get_pilot()).is_none());
        assert!(rx_live.try_recv().is_ok());
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn remove_by_id() {
        let table = PendingTable::new();
        let _rx1 = table.register(1, addr(38899));
        let _rx2 = table.register(2, addr(38900));
        table.remove(1);
        assert_eq!(table.len(), 1);

        let stray = table.complete(addr(38899), Envelope::get_pilot());
        assert!(stray.is_some());
    }
}
