use thiserror::Error;

use crate::types::DeviceKind;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid bridge config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("lighting_address must not be empty")]
    MissingLightingAddress,
    #[error("device `{name}` has an empty address")]
    EmptyAddress { name: String },
    #[error("duplicate {kind} address `{address}`")]
    DuplicateAddress { kind: DeviceKind, address: String },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BridgeError {
    #[error("no matching device at address `{address}`")]
    UnknownDevice { address: String },
    #[error("invalid value: {0}")]
    InvalidValue(String),
    #[error("bridge session is not running")]
    SessionClosed,
}
