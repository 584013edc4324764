// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Protocol constants - single source of truth.
//!
//! Centralizes the wire-protocol constants and the runtime defaults.
//! **NEVER hardcode these elsewhere!** Per-link choices (bind address,
//! broadcast target, rebroadcast cadence) live in
//! [`LinkConfig`](crate::transport::LinkConfig).

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Well-known UDP control port the lamps listen on.
///
/// Unicast commands and broadcast discovery both use this port; devices
/// answer from it as well.
pub const PILOT_PORT: u16 = 38899;

/// Upper bound on a single protocol datagram.
///
/// The largest observed reply (`getModelConfig`) stays well under 1 KiB;
/// the extra headroom covers firmware revisions that pad the document.
pub const MAX_DATAGRAM: usize = 1536;

/// Default deadline for one unicast request/reply exchange.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(2000);

/// Default duration of a discovery sweep.
pub const DEFAULT_DISCOVERY_WINDOW: Duration = Duration::from_secs(5);

/// Interval between repeated discovery broadcasts within one sweep.
///
/// Must stay shorter than any sensible sweep window; the repetition
/// compensates for lost datagrams and devices that wake up late.
pub const REBROADCAST_INTERVAL: Duration = Duration::from_millis(1000);

/// Extra attempts after the first failed unicast exchange.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 2;

/// First backoff delay between retry attempts.
pub const RETRY_BASE_DELAY: Duration = Duration::from_millis(250);

/// Backoff cap regardless of attempt count.
pub const RETRY_MAX_DELAY: Duration = Duration::from_millis(2000);

/// All-ones broadcast target for discovery sweeps.
#[must_use]
pub fn broadcast_target() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::BROADCAST), PILOT_PORT)
}

/// Default local bind address (all interfaces, well-known port).
#[must_use]
pub fn default_bind() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), PILOT_PORT)
}
