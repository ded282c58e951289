pub mod codec;
pub mod config;
pub mod devices;
pub mod error;
pub mod protocol;
pub mod queue;
pub mod registry;
pub mod thermostat;
pub mod types;

pub use codec::LineCodec;
pub use config::{BridgeConfig, DeviceEntry, SessionConfig, ThermostatConfig};
pub use devices::{BridgeAction, Dimmer, PowerUpdate, SimpleThermostat, Switch};
pub use error::{BridgeError, ConfigError};
pub use protocol::{parse, Command, Event};
pub use queue::{CommandQueue, LineSink, SinkError};
pub use registry::{measurement_key, DeviceRegistry, DeviceRequest};
pub use thermostat::{EngineAction, ThermostatEngine};
pub use types::{
    ConnectionState, DeviceChange, DeviceKind, DeviceState, DeviceStatus, ThermostatContext,
    ThermostatMode, ThermostatStatus,
};
