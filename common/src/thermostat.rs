use crate::{
    config::ThermostatConfig,
    types::{ThermostatContext, ThermostatMode},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineAction {
    PowerOn,
    PowerOff,
}

impl EngineAction {
    pub fn is_on(self) -> bool {
        matches!(self, Self::PowerOn)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Reading {
    value: f32,
    at_ms: u64,
}

/// Hysteresis controller for one heating output.
///
/// Every input is unknown until it has been set once. An unknown input, a
/// stale reading, or a reading from the future drives the output off.
#[derive(Debug, Clone)]
pub struct ThermostatEngine {
    pub config: ThermostatConfig,

    mode: Option<ThermostatMode>,
    setpoint: Option<f32>,
    reading: Option<Reading>,
    power: Option<bool>,

    // Last raw temperature, shown even after the reading went stale.
    last_temp: Option<f32>,
}

impl ThermostatEngine {
    pub fn new(config: ThermostatConfig, context: ThermostatContext) -> Self {
        let setpoint = context
            .setpoint
            .filter(|value| value.is_finite())
            .map(|value| bound_setpoint(&config, value));
        Self {
            config,
            mode: context.mode,
            setpoint,
            reading: None,
            power: None,
            last_temp: None,
        }
    }

    pub fn context(&self) -> ThermostatContext {
        ThermostatContext {
            mode: self.mode,
            setpoint: self.setpoint,
        }
    }

    pub fn mode(&self) -> ThermostatMode {
        self.mode.unwrap_or(ThermostatMode::Off)
    }

    pub fn setpoint(&self) -> f32 {
        self.setpoint.unwrap_or(self.config.default_setpoint)
    }

    pub fn current_temp(&self) -> f32 {
        self.last_temp.unwrap_or(self.config.default_setpoint)
    }

    pub fn is_heating(&self) -> bool {
        self.power.unwrap_or(false)
    }

    pub fn is_power_known(&self) -> bool {
        self.power.is_some()
    }

    pub fn is_sensor_data_valid(&self, now_ms: u64) -> bool {
        self.reading
            .map(|reading| self.is_fresh(reading, now_ms))
            .unwrap_or(false)
    }

    pub fn set_mode(&mut self, mode: ThermostatMode, now_ms: u64) -> Option<EngineAction> {
        self.mode = Some(mode);
        self.evaluate(now_ms)
    }

    pub fn set_setpoint(&mut self, setpoint: f32, now_ms: u64) -> Option<EngineAction> {
        self.setpoint = Some(bound_setpoint(&self.config, setpoint));
        self.evaluate(now_ms)
    }

    pub fn observe_measurement(&mut self, value: f32, now_ms: u64) -> Option<EngineAction> {
        self.reading = Some(Reading {
            value,
            at_ms: now_ms,
        });
        self.last_temp = Some(value);
        self.evaluate(now_ms)
    }

    /// Power state reported by the controller itself.
    pub fn observe_power(&mut self, on: bool, now_ms: u64) -> Option<EngineAction> {
        self.power = Some(on);
        self.evaluate(now_ms)
    }

    /// Re-runs the control decision. Returns an action only when the
    /// commanded power changes or has never been confirmed.
    pub fn evaluate(&mut self, now_ms: u64) -> Option<EngineAction> {
        self.expire_reading(now_ms);

        let decision = self.decide();
        if self.power == Some(decision) {
            return None;
        }

        self.power = Some(decision);
        Some(if decision {
            EngineAction::PowerOn
        } else {
            EngineAction::PowerOff
        })
    }

    fn decide(&self) -> bool {
        let (Some(mode), Some(reading), Some(setpoint)) = (self.mode, self.reading, self.setpoint)
        else {
            return false;
        };

        if mode != ThermostatMode::Heat {
            return false;
        }

        let deadband = self.config.deadband;
        if reading.value <= setpoint - deadband {
            true
        } else if reading.value >= setpoint + deadband {
            false
        } else {
            self.is_heating()
        }
    }

    fn expire_reading(&mut self, now_ms: u64) {
        if let Some(reading) = self.reading {
            if !self.is_fresh(reading, now_ms) {
                self.reading = None;
            }
        }
    }

    fn is_fresh(&self, reading: Reading, now_ms: u64) -> bool {
        now_ms >= reading.at_ms
            && now_ms <= reading.at_ms.saturating_add(self.config.stale_after_ms)
    }
}

/// Limits a setpoint to the configured range. Never panics, even when the
/// bounds were not sanitized and are inverted.
fn bound_setpoint(config: &ThermostatConfig, value: f32) -> f32 {
    value.max(config.min_setpoint).min(config.max_setpoint)
}
