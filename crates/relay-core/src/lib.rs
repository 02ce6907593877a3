pub mod controller;
pub mod doctor;
pub mod gate;
pub mod sequencer;
pub mod timer;

use anyhow::Result;
use serde::Deserialize;

pub use sequencer::ConnectionSnapshot;

/// Immutable policy snapshot for the controller. Owned by the settings
/// collaborator (the binary); the core only reads it.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Identifier of the selected power backend; empty = none selected.
    pub api: String,
    /// Heater cooldown threshold in degrees Celsius.
    pub temperature: f64,
    /// Delay in seconds before a scheduled (re)connect; 0 = connect inline.
    pub autoconnect_delay: f64,
    /// Minutes without any client before powering off.
    pub noclients_countdown: f64,
    /// Also reconnect when the captured connection state was an error.
    pub reconnect_after_error: bool,
    pub power: PowerPolicy,
    pub idle: IdlePolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: String::new(),
            temperature: 50.0,
            autoconnect_delay: 0.0,
            noclients_countdown: 5.0,
            reconnect_after_error: false,
            power: PowerPolicy::default(),
            idle: IdlePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PowerPolicy {
    pub on: PowerOnPolicy,
    pub off: PowerOffPolicy,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PowerOnPolicy {
    pub startup: bool,
    pub clients: bool,
    pub connect: bool,
}

impl Default for PowerOnPolicy {
    fn default() -> Self {
        Self { startup: true, clients: false, connect: true }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PowerOffPolicy {
    pub shutdown: bool,
    pub noclients: bool,
    pub idle: bool,
    pub disconnect: bool,
    pub temperature: bool,
}

impl Default for PowerOffPolicy {
    fn default() -> Self {
        Self {
            shutdown: true,
            noclients: false,
            idle: false,
            disconnect: true,
            temperature: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IdlePolicy {
    /// Minutes of inactivity before powering off.
    pub countdown: f64,
    /// Comma-separated gcode names that do not count as activity.
    pub ignore_commands: String,
}

impl Default for IdlePolicy {
    fn default() -> Self {
        Self { countdown: 15.0, ignore_commands: String::new() }
    }
}

impl IdlePolicy {
    /// Blank list means nothing is ignored; otherwise names are trimmed and
    /// matched exactly, case-sensitive.
    pub fn is_ignored(&self, gcode: &str) -> bool {
        if self.ignore_commands.trim().is_empty() {
            return false;
        }
        self.ignore_commands.split(',').map(str::trim).any(|c| c == gcode)
    }
}

/// Printer collaborator as seen by the core. Printing state and connection
/// parameters are always read live, never cached here.
pub trait Printer: Send + Sync {
    fn is_printing(&self) -> bool;

    fn current_connection(&self) -> ConnectionSnapshot;

    fn connect(&self, snapshot: &ConnectionSnapshot) -> Result<()>;

    fn disconnect(&self) -> Result<()>;

    /// Latest actual readings from all heaters, in degrees Celsius.
    fn temperatures(&self) -> Vec<f64>;
}
