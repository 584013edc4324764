// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # Lumen - LAN controller for JSON-over-UDP smart lighting
//!
//! Discovers and commands Wi-Fi lamps that speak a lightweight
//! JSON-over-UDP protocol on the local network. The crate's core is the
//! transport/correlation layer: one shared, unordered, lossy UDP endpoint
//! carrying many logically independent request/reply exchanges plus a
//! fan-out broadcast discovery mode, with timeout, cancellation and bounded
//! retry composed around every operation.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lumen::{DeviceRegistry, LightClient, Pilot, UdpLink};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn run() -> lumen::Result<()> {
//! let link = Arc::new(UdpLink::new());
//! let registry = Arc::new(DeviceRegistry::new());
//! let client = LightClient::new(Arc::clone(&link), registry);
//!
//! // Enumerate devices, then dim every one of them.
//! for device in client.discover(Duration::from_secs(3), None).await? {
//!     println!("{} at {}", device.mac, device.socket_addr());
//!     client
//!         .set_pilot(device.socket_addr(), &Pilot::on().with_dimming(30), None)
//!         .await?;
//! }
//!
//! link.shutdown();
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------+
//! |                     Operations Layer                         |
//! |        LightClient: getPilot / setPilot / discover           |
//! +--------------------------------------------------------------+
//! |   Retry Policy          |          Device Registry           |
//! |   bounded backoff       |          identity -> record        |
//! +--------------------------------------------------------------+
//! |                      Transport Core                          |
//! |   UdpLink: one socket, receive loop, datagram routing        |
//! |   Correlator (pending requests) | Discovery (listener fanout)|
//! +--------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`UdpLink`] | Owns the UDP endpoint; unicast exchanges and sweeps |
//! | [`LightClient`] | Device verbs composed over the transport |
//! | [`DeviceRegistry`] | Concurrent identity-keyed device cache |
//! | [`Envelope`] | JSON command/reply document, one per datagram |
//! | [`CancelToken`] | Caller-initiated cancellation for any operation |
//!
//! ## Correlation Caveat
//!
//! The wire protocol echoes no request id; replies are attributed to the
//! oldest pending request for their source address. Concurrent requests to
//! the *same* device may have replies swapped - see
//! [`UdpLink::request`]. Requests to different devices never interfere.

/// Caller-initiated cancellation signal.
pub mod cancel;
/// Device operations layer (query, set, discover verbs).
pub mod client;
/// Protocol constants and runtime defaults.
pub mod config;
/// Error types.
pub mod error;
/// Wire protocol (device identity, command envelope).
pub mod protocol;
/// Concurrent device registry.
pub mod registry;
/// Bounded retry with exponential backoff.
pub mod retry;
/// UDP transport, request correlation and discovery fan-out.
pub mod transport;

pub use cancel::CancelToken;
pub use client::LightClient;
pub use error::{Error, Result};
pub use protocol::{Envelope, MacAddr, Pilot};
pub use registry::{DeviceRecord, DeviceRegistry};
pub use retry::{send_with_retry, RetryConfig};
pub use transport::{LinkConfig, UdpLink};
