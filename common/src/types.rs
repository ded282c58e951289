use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ThermostatMode {
    Off,
    Heat,
}

impl ThermostatMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::Heat => "HEAT",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "OFF" => Some(Self::Off),
            "HEAT" => Some(Self::Heat),
            _ => None,
        }
    }
}

/// Device type tag as written in the lighting table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceKind {
    Dimmer,
    Switch,
    Toggle,
    SimpleThermostat,
}

impl DeviceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dimmer => "Dimmer",
            Self::Switch => "Switch",
            Self::Toggle => "Toggle",
            Self::SimpleThermostat => "SimpleThermostat",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "DISCONNECTED",
            Self::Connecting => "CONNECTING",
            Self::Connected => "CONNECTED",
        }
    }
}

/// Thermostat fields that survive a restart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ThermostatContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<ThermostatMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setpoint: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThermostatStatus {
    pub mode: &'static str,
    pub heating: bool,
    #[serde(rename = "targetTemp")]
    pub target_temp: f32,
    #[serde(rename = "currentTemp")]
    pub current_temp: f32,
    #[serde(rename = "sensorValid")]
    pub sensor_valid: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DeviceState {
    Level { level: Option<u8> },
    Power { on: Option<bool> },
    Thermostat(ThermostatStatus),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceStatus {
    pub name: String,
    pub kind: DeviceKind,
    pub address: String,
    #[serde(flatten)]
    pub state: DeviceState,
}

/// Outward notification that a device's rendered state changed.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceChange {
    Level { address: String, level: u8 },
    Power { address: String, on: bool },
    Temperature { address: String, value: f32 },
    Heating { address: String, on: bool },
    Settings {
        address: String,
        context: ThermostatContext,
    },
}

impl DeviceChange {
    pub fn address(&self) -> &str {
        match self {
            Self::Level { address, .. }
            | Self::Power { address, .. }
            | Self::Temperature { address, .. }
            | Self::Heating { address, .. }
            | Self::Settings { address, .. } => address,
        }
    }
}
