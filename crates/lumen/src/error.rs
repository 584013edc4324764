// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for transport and device operations.

use crate::protocol::MacAddr;
use std::fmt;
use std::io;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the transport, correlator and operations layer.
///
/// Undecodable inbound datagrams are NOT an error variant: the receive loop
/// logs and drops them so the enclosing request timeout applies (the control
/// port is shared with unrelated broadcast traffic).
#[derive(Debug)]
pub enum Error {
    /// Deadline elapsed with no matching reply.
    Timeout,

    /// Caller-initiated cancellation fired.
    Cancelled,

    /// Operation attempted after shutdown.
    Disposed,

    /// Socket-level failure (retryable).
    Network(io::Error),

    /// Failed to serialize an outgoing command.
    Encode(String),

    /// A matched reply could not be interpreted (retryable).
    Decode(String),

    /// Device identity has no known address in the registry.
    NoAddress(MacAddr),
}

impl Error {
    /// Whether the retry policy may try the exchange again.
    ///
    /// Transient: socket failures, deadline expiry, unusable replies.
    /// Everything else terminates the retry loop immediately.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout | Self::Network(_) | Self::Decode(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "request timed out"),
            Self::Cancelled => write!(f, "operation cancelled"),
            Self::Disposed => write!(f, "link shut down"),
            Self::Network(err) => write!(f, "network error: {}", err),
            Self::Encode(msg) => write!(f, "encode error: {}", msg),
            Self::Decode(msg) => write!(f, "decode error: {}", msg),
            Self::NoAddress(mac) => write!(f, "no known address for device {}", mac),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Network(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Network(err)
    }
}
