use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::power::{BackendInfo, PowerState};

/// Commands accepted at the boundary. The transport in front of this is
/// expected to restrict them to admins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    PowerOn,
    PowerOff,
    ListApis,
    Status,
}

impl Command {
    pub fn from_name(name: &str) -> Result<Self, ApiError> {
        match name {
            "power_on" => Ok(Command::PowerOn),
            "power_off" => Ok(Command::PowerOff),
            "list_apis" => Ok(Command::ListApis),
            "status" => Ok(Command::Status),
            other => Err(ApiError::UnrecognizedCommand(other.to_string())),
        }
    }
}

/// Live status snapshot emitted after every transition and returned by most
/// commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub power: PowerState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandReply {
    Status(StatusSnapshot),
    Apis { apis: Vec<BackendInfo> },
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unrecognized command: {0}")]
    UnrecognizedCommand(String),
}
