use serde::{Deserialize, Serialize};

use crate::{error::ConfigError, types::DeviceKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThermostatConfig {
    pub stale_after_ms: u64,
    pub deadband: f32,
    pub default_setpoint: f32,
    pub min_setpoint: f32,
    pub max_setpoint: f32,
}

impl Default for ThermostatConfig {
    fn default() -> Self {
        Self {
            stale_after_ms: 900_000,
            deadband: 1.0,
            default_setpoint: 25.0,
            min_setpoint: 10.0,
            max_setpoint: 38.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub ping_interval_ms: u64,
    pub pong_timeout_ms: u64,
    pub reconnect_delay_ms: u64,
    pub connect_timeout_ms: u64,
    /// Period of the thermostat re-evaluation that catches stale readings.
    pub evaluate_interval_ms: u64,
    /// Close the connection after this long without inbound bytes. `None` disables it.
    pub idle_timeout_ms: Option<u64>,
    pub max_line_bytes: usize,
    pub write_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ping_interval_ms: 30_000,
            pong_timeout_ms: 15_000,
            reconnect_delay_ms: 10_000,
            connect_timeout_ms: 10_000,
            evaluate_interval_ms: 60_000,
            idle_timeout_ms: Some(120_000),
            max_line_bytes: 65_536,
            write_buffer: 16,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceEntry {
    pub name: String,
    pub device_type: DeviceKind,
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub lighting_address: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default)]
    pub lighting_table: Vec<DeviceEntry>,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub thermostat: ThermostatConfig,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    12323
}

fn default_http_port() -> u16 {
    8080
}

impl BridgeConfig {
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        config.sanitize();
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lighting_address.trim().is_empty() {
            return Err(ConfigError::MissingLightingAddress);
        }
        for entry in &self.lighting_table {
            if entry.address.trim().is_empty() {
                return Err(ConfigError::EmptyAddress {
                    name: entry.name.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn sanitize(&mut self) {
        self.session.sanitize();
        self.thermostat.sanitize();
    }
}

impl SessionConfig {
    pub fn sanitize(&mut self) {
        self.ping_interval_ms = self.ping_interval_ms.max(10);
        self.pong_timeout_ms = self.pong_timeout_ms.max(10);
        self.reconnect_delay_ms = self.reconnect_delay_ms.max(10);
        self.connect_timeout_ms = self.connect_timeout_ms.max(10);
        self.evaluate_interval_ms = self.evaluate_interval_ms.max(10);
        self.idle_timeout_ms = self.idle_timeout_ms.map(|ms| ms.max(10));
        self.max_line_bytes = self.max_line_bytes.max(256);
        self.write_buffer = self.write_buffer.max(1);
    }
}

impl ThermostatConfig {
    pub fn sanitize(&mut self) {
        if !self.deadband.is_finite() || self.deadband < 0.0 {
            self.deadband = 1.0;
        }
        if !self.min_setpoint.is_finite() || !self.max_setpoint.is_finite() {
            self.min_setpoint = 10.0;
            self.max_setpoint = 38.0;
        }
        if self.min_setpoint > self.max_setpoint {
            std::mem::swap(&mut self.min_setpoint, &mut self.max_setpoint);
        }
        if !self.default_setpoint.is_finite() {
            self.default_setpoint = 25.0;
        }
        self.default_setpoint = self
            .default_setpoint
            .clamp(self.min_setpoint, self.max_setpoint);
    }
}
