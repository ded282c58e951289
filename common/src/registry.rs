use std::collections::{BTreeMap, HashMap};

use crate::{
    config::{BridgeConfig, ThermostatConfig},
    devices::{BridgeAction, Dimmer, PowerUpdate, SimpleThermostat, Switch},
    error::{BridgeError, ConfigError},
    protocol::{Command, Event},
    types::{DeviceKind, DeviceStatus, ThermostatContext, ThermostatMode},
};

/// Entry points the control surface uses to drive a device.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceRequest {
    SetMode { address: String, mode: ThermostatMode },
    SetSetpoint { address: String, value: f32 },
    SetLevel { address: String, level: u8 },
    SetOn { address: String, on: bool },
    ObserveMeasurement { address: String, value: f32 },
    ObservePower { address: String, on: bool },
}

impl DeviceRequest {
    pub fn address(&self) -> &str {
        match self {
            Self::SetMode { address, .. }
            | Self::SetSetpoint { address, .. }
            | Self::SetLevel { address, .. }
            | Self::SetOn { address, .. }
            | Self::ObserveMeasurement { address, .. }
            | Self::ObservePower { address, .. } => address,
        }
    }
}

/// Static device table built from the lighting table at startup.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    dimmers: BTreeMap<String, Dimmer>,
    switches: BTreeMap<String, Switch>,
    toggles: BTreeMap<String, Switch>,
    thermostats: BTreeMap<String, SimpleThermostat>,
    measurement_keys: HashMap<String, String>,
}

impl DeviceRegistry {
    pub fn discover(
        config: &BridgeConfig,
        contexts: &HashMap<String, ThermostatContext>,
    ) -> Result<Self, ConfigError> {
        let mut registry = Self::default();

        for entry in &config.lighting_table {
            let address = entry.address.as_str();
            let duplicate = match entry.device_type {
                DeviceKind::Dimmer => registry
                    .dimmers
                    .insert(address.to_string(), Dimmer::new(&entry.name, address))
                    .is_some(),
                DeviceKind::Switch => registry
                    .switches
                    .insert(address.to_string(), Switch::new(&entry.name, address))
                    .is_some(),
                DeviceKind::Toggle => registry
                    .toggles
                    .insert(address.to_string(), Switch::toggle(&entry.name, address))
                    .is_some(),
                DeviceKind::SimpleThermostat => {
                    registry.add_thermostat(&entry.name, address, &config.thermostat, contexts)
                }
            };

            if duplicate {
                return Err(ConfigError::DuplicateAddress {
                    kind: entry.device_type,
                    address: address.to_string(),
                });
            }
        }

        Ok(registry)
    }

    fn add_thermostat(
        &mut self,
        name: &str,
        address: &str,
        config: &ThermostatConfig,
        contexts: &HashMap<String, ThermostatContext>,
    ) -> bool {
        let context = contexts.get(address).copied().unwrap_or_default();
        let thermostat = SimpleThermostat::new(name, address, config.clone(), context);
        if let Some(key) = measurement_key(address) {
            self.measurement_keys.insert(key, address.to_string());
        }
        self.thermostats
            .insert(address.to_string(), thermostat)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.dimmers.len() + self.switches.len() + self.toggles.len() + self.thermostats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn thermostat_for_key(&self, key: &str) -> Option<&str> {
        self.measurement_keys.get(key).map(String::as_str)
    }

    /// Session setup sequence sent whenever a connection becomes ready.
    pub fn configure_commands(&self, lighting_address: &str) -> Vec<Command> {
        let mut commands = vec![Command::Configure {
            lighting_address: lighting_address.to_string(),
        }];
        commands.extend(
            self.dimmers
                .keys()
                .map(|address| Command::ConfigureDimmer {
                    address: address.clone(),
                }),
        );
        commands.extend(
            self.switches
                .keys()
                .chain(self.toggles.keys())
                .chain(self.thermostats.keys())
                .map(|address| Command::ConfigureSwitch {
                    address: address.clone(),
                }),
        );
        commands
    }

    /// Applies a controller event to every device it concerns. Events for
    /// addresses that are not modelled here are ignored.
    pub fn apply(&mut self, event: &Event, now_ms: u64) -> Vec<BridgeAction> {
        match event {
            Event::DimmerSet { address, level, .. } => self
                .dimmers
                .get_mut(address)
                .map(|dimmer| dimmer.update_level(*level))
                .unwrap_or_default(),
            Event::Switch { address, on } => {
                let mut actions = Vec::new();
                let targets = [
                    self.switches
                        .get_mut(address)
                        .map(|device| device as &mut dyn PowerUpdate),
                    self.toggles
                        .get_mut(address)
                        .map(|device| device as &mut dyn PowerUpdate),
                    self.thermostats
                        .get_mut(address)
                        .map(|device| device as &mut dyn PowerUpdate),
                ];
                for device in targets.into_iter().flatten() {
                    actions.extend(device.update_on(*on, now_ms));
                }
                actions
            }
            Event::Measurement { key, value, .. } => {
                let Some(address) = self.measurement_keys.get(key) else {
                    return Vec::new();
                };
                self.thermostats
                    .get_mut(address)
                    .map(|thermostat| thermostat.observe_measurement(*value, now_ms))
                    .unwrap_or_default()
            }
            Event::Ping | Event::Pong => Vec::new(),
        }
    }

    /// Runs a control-surface request and returns the resulting actions
    /// with the device's new status.
    pub fn handle(
        &mut self,
        request: &DeviceRequest,
        now_ms: u64,
    ) -> Result<(Vec<BridgeAction>, DeviceStatus), BridgeError> {
        let unknown = || BridgeError::UnknownDevice {
            address: request.address().to_string(),
        };

        match request {
            DeviceRequest::SetMode { address, mode } => {
                let thermostat = self.thermostats.get_mut(address).ok_or_else(unknown)?;
                Ok((thermostat.set_mode(*mode, now_ms), thermostat.status(now_ms)))
            }
            DeviceRequest::SetSetpoint { address, value } => {
                let value = finite(*value)?;
                let thermostat = self.thermostats.get_mut(address).ok_or_else(unknown)?;
                Ok((
                    thermostat.set_setpoint(value, now_ms),
                    thermostat.status(now_ms),
                ))
            }
            DeviceRequest::ObserveMeasurement { address, value } => {
                let value = finite(*value)?;
                let thermostat = self.thermostats.get_mut(address).ok_or_else(unknown)?;
                Ok((
                    thermostat.observe_measurement(value, now_ms),
                    thermostat.status(now_ms),
                ))
            }
            DeviceRequest::ObservePower { address, on } => {
                let thermostat = self.thermostats.get_mut(address).ok_or_else(unknown)?;
                Ok((thermostat.update_on(*on, now_ms), thermostat.status(now_ms)))
            }
            DeviceRequest::SetLevel { address, level } => {
                if *level > 100 {
                    return Err(BridgeError::InvalidValue(format!(
                        "level {level} is outside 0-100"
                    )));
                }
                let dimmer = self.dimmers.get_mut(address).ok_or_else(unknown)?;
                Ok((dimmer.set_level(*level), dimmer.status()))
            }
            DeviceRequest::SetOn { address, on } => {
                let device = match self.switches.get_mut(address) {
                    Some(device) => device,
                    None => self.toggles.get_mut(address).ok_or_else(unknown)?,
                };
                Ok((device.set_on(*on), device.status()))
            }
        }
    }

    /// Re-evaluates every thermostat so stale readings are noticed even
    /// when no new input arrives.
    pub fn evaluate_thermostats(&mut self, now_ms: u64) -> Vec<BridgeAction> {
        self.thermostats
            .values_mut()
            .flat_map(|thermostat| thermostat.evaluate(now_ms))
            .collect()
    }

    pub fn statuses(&self, now_ms: u64) -> Vec<DeviceStatus> {
        let mut statuses: Vec<DeviceStatus> = self.dimmers.values().map(Dimmer::status).collect();
        statuses.extend(self.switches.values().map(Switch::status));
        statuses.extend(self.toggles.values().map(Switch::status));
        statuses.extend(
            self.thermostats
                .values()
                .map(|thermostat| thermostat.status(now_ms)),
        );
        statuses
    }
}

fn finite(value: f32) -> Result<f32, BridgeError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(BridgeError::InvalidValue(format!("{value} is not a number")))
    }
}

/// Extracts the sensor key from a thermostat address such as
/// `2.1; measurement = 0 + 3`. Whitespace inside the key is dropped.
pub fn measurement_key(address: &str) -> Option<String> {
    address
        .split(';')
        .skip(1)
        .filter_map(|segment| {
            let value = segment
                .trim_start()
                .strip_prefix("measurement")?
                .trim_start()
                .strip_prefix('=')?;
            let key: String = value.chars().filter(|c| !c.is_whitespace()).collect();
            (!key.is_empty()).then_some(key)
        })
        .last()
}
