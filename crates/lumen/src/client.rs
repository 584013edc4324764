// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Device operations layer: the verbs built on top of the transport.
//!
//! Thin orchestration only. Each verb builds a command envelope, runs the
//! exchange through the retry policy (or a discovery sweep), and writes the
//! outcome into the device registry.

use crate::cancel::CancelToken;
use crate::config;
use crate::error::{Error, Result};
use crate::protocol::{Envelope, MacAddr, Pilot};
use crate::registry::{DeviceRecord, DeviceRegistry};
use crate::retry::{send_with_retry, RetryConfig};
use crate::transport::UdpLink;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Controller handle for querying and commanding devices.
///
/// # Example
///
/// ```rust,no_run
/// use lumen::{DeviceRegistry, LightClient, Pilot, UdpLink};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # async fn example() -> lumen::Result<()> {
/// let link = Arc::new(UdpLink::new());
/// let registry = Arc::new(DeviceRegistry::new());
/// let client = LightClient::new(link, registry);
///
/// for device in client.discover(Duration::from_secs(3), None).await? {
///     client
///         .set_pilot(device.socket_addr(), &Pilot::on().with_dimming(80), None)
///         .await?;
/// }
/// # Ok(())
/// # }
/// ```
pub struct LightClient {
    link: Arc<UdpLink>,
    registry: Arc<DeviceRegistry>,
    retry: RetryConfig,
    timeout: Duration,
}

impl LightClient {
    #[must_use]
    pub fn new(link: Arc<UdpLink>, registry: Arc<DeviceRegistry>) -> Self {
        Self {
            link,
            registry,
            retry: RetryConfig::default(),
            timeout: config::DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Override the per-exchange deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    #[must_use]
    pub fn link(&self) -> &UdpLink {
        &self.link
    }

    /// Query the current light state and refresh the registry.
    pub async fn get_pilot(
        &self,
        target: SocketAddr,
        cancel: Option<&CancelToken>,
    ) -> Result<DeviceRecord> {
        let reply = self.exchange(&Envelope::get_pilot(), target, cancel).await?;

        let pilot = reply.pilot()?;
        let mac: MacAddr = pilot
            .mac
            .as_deref()
            .ok_or_else(|| Error::Decode("getPilot reply missing mac".to_string()))?
            .parse()?;

        let mut record = self
            .registry
            .get(&mac)
            .unwrap_or_else(|| DeviceRecord::new(mac, target.ip(), target.port()));
        record.addr = target.ip();
        record.port = target.port();
        record.pilot = pilot;
        record.last_seen = SystemTime::now();
        self.registry.set(record.clone());
        Ok(record)
    }

    /// Apply a light state; on success merge it into the cached record.
    pub async fn set_pilot(
        &self,
        target: SocketAddr,
        pilot: &Pilot,
        cancel: Option<&CancelToken>,
    ) -> Result<()> {
        let command = Envelope::set_pilot(pilot)?;
        self.exchange(&command, target, cancel).await?;

        // setPilot replies carry no identity; update whichever cached record
        // lives at this address. Never-seen devices stay uncached.
        for mut record in self.registry.all() {
            if record.addr == target.ip() && record.port == target.port() {
                record.pilot.merge_from(pilot);
                record.last_seen = SystemTime::now();
                self.registry.set(record);
                break;
            }
        }
        Ok(())
    }

    /// Query static device identity (mac, firmware, module name).
    pub async fn get_system_config(
        &self,
        target: SocketAddr,
        cancel: Option<&CancelToken>,
    ) -> Result<Value> {
        self.config_verb(Envelope::get_system_config(), target, cancel)
            .await
    }

    /// Query hardware capability information.
    pub async fn get_model_config(
        &self,
        target: SocketAddr,
        cancel: Option<&CancelToken>,
    ) -> Result<Value> {
        self.config_verb(Envelope::get_model_config(), target, cancel)
            .await
    }

    /// Sweep the network and return the devices that answered, one record
    /// per identity.
    pub async fn discover(
        &self,
        window: Duration,
        cancel: Option<&CancelToken>,
    ) -> Result<Vec<DeviceRecord>> {
        // Bind now so the probe can carry the local address.
        self.link.initialize(None).await?;
        let local_ip = self
            .link
            .local_addr()
            .map_or_else(|| std::net::Ipv4Addr::UNSPECIFIED.into(), |a| a.ip());
        let probe = Envelope::registration_probe(local_ip);

        let registry = &self.registry;
        let mut found: Vec<DeviceRecord> = Vec::new();
        self.link
            .discover(
                &probe,
                |reply, src| {
                    let Some(mac) = reply.result_mac() else {
                        log::debug!("[DISCO] reply from {} without identity ignored", src);
                        return;
                    };
                    if found.iter().any(|r| r.mac == mac) {
                        return;
                    }
                    let mut record = registry
                        .get(&mac)
                        .unwrap_or_else(|| DeviceRecord::new(mac, src.ip(), src.port()));
                    record.addr = src.ip();
                    record.port = src.port();
                    record.last_seen = SystemTime::now();
                    registry.set(record.clone());
                    found.push(record);
                },
                window,
                cancel,
            )
            .await?;

        log::debug!("[DISCO] sweep returned {} device(s)", found.len());
        Ok(found)
    }

    /// [`LightClient::get_pilot`] addressed by identity.
    ///
    /// Fails with [`Error::NoAddress`] before any network access when the
    /// device is not in the registry.
    pub async fn get_pilot_of(
        &self,
        mac: &MacAddr,
        cancel: Option<&CancelToken>,
    ) -> Result<DeviceRecord> {
        let target = self.resolve(mac)?;
        self.get_pilot(target, cancel).await
    }

    /// [`LightClient::set_pilot`] addressed by identity.
    pub async fn set_pilot_of(
        &self,
        mac: &MacAddr,
        pilot: &Pilot,
        cancel: Option<&CancelToken>,
    ) -> Result<()> {
        let target = self.resolve(mac)?;
        self.set_pilot(target, pilot, cancel).await
    }

    fn resolve(&self, mac: &MacAddr) -> Result<SocketAddr> {
        self.registry
            .get(mac)
            .map(|record| record.socket_addr())
            .ok_or(Error::NoAddress(*mac))
    }

    async fn exchange(
        &self,
        command: &Envelope,
        target: SocketAddr,
        cancel: Option<&CancelToken>,
    ) -> Result<Envelope> {
        send_with_retry(&self.link, command, target, self.timeout, cancel, &self.retry).await
    }

    async fn config_verb(
        &self,
        command: Envelope,
        target: SocketAddr,
        cancel: Option<&CancelToken>,
    ) -> Result<Value> {
        let reply = self.exchange(&command, target, cancel).await?;

        if let Some(mac) = reply.result_mac() {
            let mut record = self
                .registry
                .get(&mac)
                .unwrap_or_else(|| DeviceRecord::new(mac, target.ip(), target.port()));
            record.addr = target.ip();
            record.port = target.port();
            record.last_seen = SystemTime::now();
            self.registry.set(record);
        }

        reply
            .result
            .ok_or_else(|| Error::Decode(format!("{} reply carries no result", command.method)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_identity_fails_before_network() {
        let client = LightClient::new(
            Arc::new(UdpLink::new()),
            Arc::new(DeviceRegistry::new()),
        );
        let mac = MacAddr::from_bytes([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);

        let err = client.get_pilot_of(&mac, None).await.unwrap_err();
        assert!(matches!(err, Error::NoAddress(m) if m == mac));
        // Validation happened before any bind.
        assert!(client.link().local_addr().is_none());
    }

    #[tokio::test]
    async fn known_identity_resolves_cached_address() {
        let registry = Arc::new(DeviceRegistry::new());
        let mac = MacAddr::from_bytes([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
        registry.set(DeviceRecord::new(mac, "192.168.1.77".parse().unwrap(), 38899));

        let client = LightClient::new(Arc::new(UdpLink::new()), registry);
        assert_eq!(
            client.resolve(&mac).unwrap(),
            "192.168.1.77:38899".parse().unwrap()
        );
    }
}
