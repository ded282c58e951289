use crate::{
    config::ThermostatConfig,
    protocol::Command,
    thermostat::{EngineAction, ThermostatEngine},
    types::{
        DeviceChange, DeviceKind, DeviceState, DeviceStatus, ThermostatContext, ThermostatMode,
        ThermostatStatus,
    },
};

/// Side effect requested by a device model.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeAction {
    Send(Command),
    Notify(DeviceChange),
}

/// Devices that follow `SwitchOn` / `SwitchOff` pushes from the controller.
pub trait PowerUpdate {
    fn update_on(&mut self, on: bool, now_ms: u64) -> Vec<BridgeAction>;
}

#[derive(Debug, Clone)]
pub struct Dimmer {
    pub name: String,
    pub address: String,
    level: Option<u8>,
}

impl Dimmer {
    pub fn new(name: &str, address: &str) -> Self {
        Self {
            name: name.to_string(),
            address: address.to_string(),
            level: None,
        }
    }

    pub fn level(&self) -> Option<u8> {
        self.level
    }

    /// Level pushed by the controller.
    pub fn update_level(&mut self, level: i32) -> Vec<BridgeAction> {
        let level = level.clamp(0, 100) as u8;
        if self.level == Some(level) {
            return Vec::new();
        }
        self.level = Some(level);
        vec![self.level_changed(level)]
    }

    /// Level requested from the control surface.
    pub fn set_level(&mut self, level: u8) -> Vec<BridgeAction> {
        let level = level.min(100);
        let mut actions = vec![BridgeAction::Send(Command::DimmerSet {
            address: self.address.clone(),
            level,
            fade_time: 0,
        })];
        if self.level != Some(level) {
            self.level = Some(level);
            actions.push(self.level_changed(level));
        }
        actions
    }

    pub fn status(&self) -> DeviceStatus {
        DeviceStatus {
            name: self.name.clone(),
            kind: DeviceKind::Dimmer,
            address: self.address.clone(),
            state: DeviceState::Level { level: self.level },
        }
    }

    fn level_changed(&self, level: u8) -> BridgeAction {
        BridgeAction::Notify(DeviceChange::Level {
            address: self.address.clone(),
            level,
        })
    }
}

/// On/off output. A `Toggle` only reflects what the controller reports; a
/// `Switch` also adopts the requested state immediately.
#[derive(Debug, Clone)]
pub struct Switch {
    pub name: String,
    pub address: String,
    kind: DeviceKind,
    on: Option<bool>,
}

impl Switch {
    pub fn new(name: &str, address: &str) -> Self {
        Self::with_kind(name, address, DeviceKind::Switch)
    }

    pub fn toggle(name: &str, address: &str) -> Self {
        Self::with_kind(name, address, DeviceKind::Toggle)
    }

    fn with_kind(name: &str, address: &str, kind: DeviceKind) -> Self {
        Self {
            name: name.to_string(),
            address: address.to_string(),
            kind,
            on: None,
        }
    }

    pub fn is_on(&self) -> Option<bool> {
        self.on
    }

    pub fn set_on(&mut self, on: bool) -> Vec<BridgeAction> {
        let mut actions = vec![BridgeAction::Send(Command::switch(&self.address, on))];
        if self.kind == DeviceKind::Switch && self.on != Some(on) {
            self.on = Some(on);
            actions.push(self.power_changed(on));
        }
        actions
    }

    pub fn status(&self) -> DeviceStatus {
        DeviceStatus {
            name: self.name.clone(),
            kind: self.kind,
            address: self.address.clone(),
            state: DeviceState::Power { on: self.on },
        }
    }

    fn power_changed(&self, on: bool) -> BridgeAction {
        BridgeAction::Notify(DeviceChange::Power {
            address: self.address.clone(),
            on,
        })
    }
}

impl PowerUpdate for Switch {
    fn update_on(&mut self, on: bool, _now_ms: u64) -> Vec<BridgeAction> {
        if self.on == Some(on) {
            return Vec::new();
        }
        self.on = Some(on);
        vec![self.power_changed(on)]
    }
}

/// Thermostat whose heating output is a switched controller address.
#[derive(Debug, Clone)]
pub struct SimpleThermostat {
    pub name: String,
    pub address: String,
    engine: ThermostatEngine,
}

impl SimpleThermostat {
    pub fn new(
        name: &str,
        address: &str,
        config: ThermostatConfig,
        context: ThermostatContext,
    ) -> Self {
        Self {
            name: name.to_string(),
            address: address.to_string(),
            engine: ThermostatEngine::new(config, context),
        }
    }

    pub fn set_mode(&mut self, mode: ThermostatMode, now_ms: u64) -> Vec<BridgeAction> {
        let action = self.engine.set_mode(mode, now_ms);
        let mut actions = vec![self.settings_changed()];
        actions.extend(self.execute(action));
        actions
    }

    pub fn set_setpoint(&mut self, setpoint: f32, now_ms: u64) -> Vec<BridgeAction> {
        let action = self.engine.set_setpoint(setpoint, now_ms);
        let mut actions = vec![self.settings_changed()];
        actions.extend(self.execute(action));
        actions
    }

    pub fn observe_measurement(&mut self, value: f32, now_ms: u64) -> Vec<BridgeAction> {
        let action = self.engine.observe_measurement(value, now_ms);
        let mut actions = vec![BridgeAction::Notify(DeviceChange::Temperature {
            address: self.address.clone(),
            value,
        })];
        actions.extend(self.execute(action));
        actions
    }

    pub fn evaluate(&mut self, now_ms: u64) -> Vec<BridgeAction> {
        let action = self.engine.evaluate(now_ms);
        self.execute(action)
    }

    pub fn status(&self, now_ms: u64) -> DeviceStatus {
        DeviceStatus {
            name: self.name.clone(),
            kind: DeviceKind::SimpleThermostat,
            address: self.address.clone(),
            state: DeviceState::Thermostat(ThermostatStatus {
                mode: self.engine.mode().as_str(),
                heating: self.engine.is_heating(),
                target_temp: self.engine.setpoint(),
                current_temp: self.engine.current_temp(),
                sensor_valid: self.engine.is_sensor_data_valid(now_ms),
            }),
        }
    }

    fn execute(&self, action: Option<EngineAction>) -> Vec<BridgeAction> {
        let Some(action) = action else {
            return Vec::new();
        };
        let on = action.is_on();
        vec![
            BridgeAction::Send(Command::switch(&self.address, on)),
            BridgeAction::Notify(DeviceChange::Heating {
                address: self.address.clone(),
                on,
            }),
        ]
    }

    fn settings_changed(&self) -> BridgeAction {
        BridgeAction::Notify(DeviceChange::Settings {
            address: self.address.clone(),
            context: self.engine.context(),
        })
    }
}

impl PowerUpdate for SimpleThermostat {
    fn update_on(&mut self, on: bool, now_ms: u64) -> Vec<BridgeAction> {
        let action = self.engine.observe_power(on, now_ms);
        self.execute(action)
    }
}
