// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Concurrent registry of known devices.
//!
//! Shared mutable state read and written by every higher-level operation.
//! Safety comes from the map's own synchronization; callers never coordinate
//! externally. Inject the registry into components that need it (behind an
//! `Arc`), never reach for it as a global.

use crate::protocol::{MacAddr, Pilot};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::SystemTime;

/// Last-known facts about one device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRecord {
    pub mac: MacAddr,
    pub addr: IpAddr,
    pub port: u16,
    /// Last-known light state.
    pub pilot: Pilot,
    pub last_seen: SystemTime,
}

impl DeviceRecord {
    #[must_use]
    pub fn new(mac: MacAddr, addr: IpAddr, port: u16) -> Self {
        Self {
            mac,
            addr,
            port,
            pilot: Pilot::default(),
            last_seen: SystemTime::now(),
        }
    }

    /// Control endpoint of the device.
    #[must_use]
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.addr, self.port)
    }
}

/// Concurrent map from device identity to [`DeviceRecord`].
///
/// Entries are never removed automatically; [`DeviceRegistry::remove`] is an
/// explicit caller decision.
#[derive(Default)]
pub struct DeviceRegistry {
    devices: DashMap<MacAddr, DeviceRecord>,
}

impl DeviceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the record for `mac`, if known.
    #[must_use]
    pub fn get(&self, mac: &MacAddr) -> Option<DeviceRecord> {
        self.devices.get(mac).map(|r| r.value().clone())
    }

    /// Upsert: always overwrites, keeping `last_seen` monotonically
    /// non-decreasing per identity.
    pub fn set(&self, mut record: DeviceRecord) {
        match self.devices.entry(record.mac) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().last_seen > record.last_seen {
                    record.last_seen = occupied.get().last_seen;
                }
                occupied.insert(record);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(record);
            }
        }
    }

    #[must_use]
    pub fn contains(&self, mac: &MacAddr) -> bool {
        self.devices.contains_key(mac)
    }

    /// Explicitly forget a device.
    pub fn remove(&self, mac: &MacAddr) -> Option<DeviceRecord> {
        self.devices.remove(mac).map(|(_, record)| record)
    }

    /// Snapshot of every known device, not a live view.
    #[must_use]
    pub fn all(&self) -> Vec<DeviceRecord> {
        self.devices.iter().map(|r| r.value().clone()).collect()
    }

    pub fn clear(&self) {
        self.devices.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
