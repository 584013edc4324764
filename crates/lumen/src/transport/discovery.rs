// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Discovery broadcasting and unsolicited-reply fan-out.
//!
//! A sweep registers a listener, broadcasts the probe, then re-broadcasts on
//! a fixed interval until its window closes; every unsolicited reply
//! received in the window is dispatched to the sweep's callback. Sweeps are
//! independent: each has its own listener with its own window, and the
//! fan-out snapshots the listener list so a sweep ending mid-dispatch cannot
//! corrupt iteration.

use crate::cancel::{cancelled_or_never, CancelToken};
use crate::error::{Error, Result};
use crate::protocol::Envelope;
use crate::transport::udp::UdpLink;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::sync::mpsc;

struct ListenerEntry {
    id: u64,
    tx: mpsc::UnboundedSender<(Envelope, SocketAddr)>,
}

/// Listeners of the currently running discovery sweeps.
pub(super) struct ListenerTable {
    entries: Mutex<Vec<ListenerEntry>>,
}

impl ListenerTable {
    pub(super) fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    pub(super) fn register(&self, id: u64) -> mpsc::UnboundedReceiver<(Envelope, SocketAddr)> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.entries.lock().push(ListenerEntry { id, tx });
        rx
    }

    pub(super) fn remove(&self, id: u64) {
        self.entries.lock().retain(|e| e.id != id);
    }

    /// Dispatch an unsolicited reply to every active listener.
    pub(super) fn fan_out(&self, envelope: Envelope, src: SocketAddr) {
        // Snapshot under the lock, dispatch outside it.
        let snapshot: Vec<_> = self.entries.lock().iter().map(|e| e.tx.clone()).collect();
        if snapshot.is_empty() {
            log::trace!("[DISCO] unsolicited reply from {} with no active sweep", src);
            return;
        }
        for tx in snapshot {
            // A sweep that just ended has dropped its receiver; harmless.
            let _ = tx.send((envelope.clone(), src));
        }
    }

    pub(super) fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub(super) fn clear(&self) {
        self.entries.lock().clear();
    }
}

/// Deregisters a sweep's listener unconditionally, whatever path ends the
/// sweep.
struct ListenerGuard<'a> {
    table: &'a ListenerTable,
    id: u64,
}

impl Drop for ListenerGuard<'_> {
    fn drop(&mut self) {
        self.table.remove(self.id);
    }
}

impl UdpLink {
    /// Bounded-duration discovery sweep.
    ///
    /// Broadcasts `command` to the configured broadcast target, repeating on
    /// the configured interval, and invokes `on_reply` for every unsolicited
    /// reply received within `window`. Replies are NOT deduplicated here;
    /// the caller keys them by device identity. Returns Ok when the window
    /// closes, [`Error::Cancelled`] if the token fires first, and
    /// [`Error::Disposed`] if the link shuts down mid-sweep.
    pub async fn discover<F>(
        &self,
        command: &Envelope,
        mut on_reply: F,
        window: Duration,
        cancel: Option<&CancelToken>,
    ) -> Result<()>
    where
        F: FnMut(Envelope, SocketAddr),
    {
        if self.is_disposed() {
            return Err(Error::Disposed);
        }
        if cancel.is_some_and(CancelToken::is_cancelled) {
            return Err(Error::Cancelled);
        }

        let payload = command.encode()?;
        let socket = self.ensure_endpoint().await?;
        let target = self.config.broadcast;

        let id = self.seq.fetch_add(1, Ordering::Relaxed);
        let mut replies = self.listeners.register(id);
        let _guard = ListenerGuard {
            table: self.listeners.as_ref(),
            id,
        };
        log::debug!(
            "[DISCO] sweep id={} method={} target={} window={:?}",
            id,
            command.method,
            target,
            window
        );

        let deadline = tokio::time::sleep(window);
        tokio::pin!(deadline);
        // First tick fires immediately: the initial broadcast goes out
        // through the same arm as the re-sends.
        let mut rebroadcast = tokio::time::interval(self.config.rebroadcast_interval);

        let result = loop {
            tokio::select! {
                () = &mut deadline => break Ok(()),
                () = cancelled_or_never(cancel) => break Err(Error::Cancelled),
                _ = rebroadcast.tick() => {
                    if let Err(err) = self.send_datagram(&socket, &payload, target).await {
                        // Lossy by nature; the next tick tries again.
                        log::warn!("[DISCO] sweep id={} broadcast failed: {}", id, err);
                    }
                }
                reply = replies.recv() => match reply {
                    Some((envelope, src)) => on_reply(envelope, src),
                    None => break Err(Error::Disposed),
                },
            }
        };

        match &result {
            Ok(()) => log::debug!("[DISCO] sweep id={} window closed", id),
            Err(err) => log::debug!("[DISCO] sweep id={} ended: {}", id, err),
        }
        result
    }
}
