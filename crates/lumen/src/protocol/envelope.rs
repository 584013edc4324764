// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Command envelope - the JSON document exchanged with a device.
//!
//! One envelope per UDP datagram. Commands carry `method` + `params`,
//! replies carry `method` + `result` (and sometimes an `env` tag naming the
//! firmware environment). Absent fields are omitted on the wire.

use crate::error::{Error, Result};
use crate::protocol::MacAddr;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::IpAddr;

/// Query the current light state.
pub const GET_PILOT: &str = "getPilot";
/// Apply a new light state.
pub const SET_PILOT: &str = "setPilot";
/// Query static device identity (mac, firmware, module).
pub const GET_SYSTEM_CONFIG: &str = "getSystemConfig";
/// Query hardware capability information.
pub const GET_MODEL_CONFIG: &str = "getModelConfig";
/// Registration handshake; doubles as the discovery probe.
pub const REGISTRATION: &str = "registration";

/// Wire document wrapping method, parameters and result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub method: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<String>,
}

impl Envelope {
    /// Bare command with no parameters.
    #[must_use]
    pub fn new(method: &str) -> Self {
        Self {
            method: method.to_string(),
            params: None,
            result: None,
            env: None,
        }
    }

    /// Command carrying a parameter object.
    #[must_use]
    pub fn with_params(method: &str, params: Value) -> Self {
        Self {
            params: Some(params),
            ..Self::new(method)
        }
    }

    /// `getPilot` query.
    #[must_use]
    pub fn get_pilot() -> Self {
        Self::new(GET_PILOT)
    }

    /// `setPilot` command applying the given pilot fields.
    pub fn set_pilot(pilot: &Pilot) -> Result<Self> {
        let params =
            serde_json::to_value(pilot).map_err(|err| Error::Encode(err.to_string()))?;
        Ok(Self::with_params(SET_PILOT, params))
    }

    /// `getSystemConfig` query.
    #[must_use]
    pub fn get_system_config() -> Self {
        Self::new(GET_SYSTEM_CONFIG)
    }

    /// `getModelConfig` query.
    #[must_use]
    pub fn get_model_config() -> Self {
        Self::new(GET_MODEL_CONFIG)
    }

    /// Discovery probe.
    ///
    /// Devices answer a `registration` with `register:false` without
    /// actually pairing; the conventional placeholder phoneMac keeps
    /// firmware that validates the field happy.
    #[must_use]
    pub fn registration_probe(local_ip: IpAddr) -> Self {
        Self::with_params(
            REGISTRATION,
            serde_json::json!({
                "phoneMac": "AAAAAAAAAAAA",
                "register": false,
                "phoneIp": local_ip.to_string(),
                "id": "1",
            }),
        )
    }

    /// Serialize for the wire.
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|err| Error::Encode(err.to_string()))
    }

    /// Parse a received datagram.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        if payload.is_empty() {
            return Err(Error::Decode("empty datagram".to_string()));
        }
        serde_json::from_slice(payload).map_err(|err| Error::Decode(err.to_string()))
    }

    /// Interpret the reply `result` as pilot fields.
    pub fn pilot(&self) -> Result<Pilot> {
        let result = self
            .result
            .clone()
            .ok_or_else(|| Error::Decode(format!("{} reply carries no result", self.method)))?;
        serde_json::from_value(result).map_err(|err| Error::Decode(err.to_string()))
    }

    /// Device identity carried in the reply `result`, if any.
    #[must_use]
    pub fn result_mac(&self) -> Option<MacAddr> {
        self.result.as_ref()?.get("mac")?.as_str()?.parse().ok()
    }
}

/// Light-state parameter set.
///
/// Covers the common fields the operations layer reads and writes; the full
/// per-model parameter schema stays with the embedding application. Unset
/// fields are omitted when used as `setPilot` params, so a partial pilot
/// only touches the fields it names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pilot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<bool>,

    /// Brightness percentage, 0-100.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimming: Option<u8>,

    /// White color temperature in Kelvin.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub g: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub b: Option<u8>,

    #[serde(rename = "sceneId", default, skip_serializing_if = "Option::is_none")]
    pub scene_id: Option<u16>,

    /// Scene animation speed, 10-200.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<u8>,
}

impl Pilot {
    /// Pilot that turns the light on.
    #[must_use]
    pub fn on() -> Self {
        Self {
            state: Some(true),
            ..Self::default()
        }
    }

    /// Pilot that turns the light off.
    #[must_use]
    pub fn off() -> Self {
        Self {
            state: Some(false),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_dimming(mut self, dimming: u8) -> Self {
        self.dimming = Some(dimming);
        self
    }

    #[must_use]
    pub fn with_rgb(mut self, r: u8, g: u8, b: u8) -> Self {
        self.r = Some(r);
        self.g = Some(g);
        self.b = Some(b);
        self
    }

    #[must_use]
    pub fn with_temp(mut self, kelvin: u16) -> Self {
        self.temp = Some(kelvin);
        self
    }

    #[must_use]
    pub fn with_scene(mut self, scene_id: u16, speed: u8) -> Self {
        self.scene_id = Some(scene_id);
        self.speed = Some(speed);
        self
    }

    /// Overlay every field the other pilot sets onto this one.
    pub fn merge_from(&mut self, other: &Self) {
        if other.mac.is_some() {
            self.mac = other.mac.clone();
        }
        if other.state.is_some() {
            self.state = other.state;
        }
        if other.dimming.is_some() {
            self.dimming = other.dimming;
        }
        if other.temp.is_some() {
            self.temp = other.temp;
        }
        if other.r.is_some() {
            self.r = other.r;
        }
        if other.g.is_some() {
            self.g = other.g;
        }
        if other.b.is_some() {
            self.b = other.b;
        }
        if other.scene_id.is_some() {
            self.scene_id = other.scene_id;
        }
        if other.speed.is_some() {
            self.speed = other.speed;
        }
    }
}
