use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

use relay_api::power::{PowerBackend, PowerState};

/// Demonstration backend driving the relay through configured shell
/// commands. Anything that can be switched from a command line (tasmota via
/// curl, sispmctl, gpioset) works behind this.
#[derive(Debug, Clone, Deserialize)]
pub struct ShellConfig {
    pub on_command: String,
    pub off_command: String,
    /// Optional probe; exit code 0 means powered. Without it the backend
    /// reports Unknown.
    pub status_command: Option<String>,
}

pub struct ShellBackend {
    cfg: ShellConfig,
}

impl ShellBackend {
    pub fn new(cfg: ShellConfig) -> Self {
        Self { cfg }
    }

    fn run(command: &str) -> Result<std::process::ExitStatus> {
        debug!("running backend command: {}", command);
        std::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .status()
            .with_context(|| format!("run backend command: {}", command))
    }
}

impl PowerBackend for ShellBackend {
    fn name(&self) -> &str {
        "Shell command"
    }

    fn get_power(&self) -> Result<PowerState> {
        match &self.cfg.status_command {
            None => Ok(PowerState::Unknown),
            Some(cmd) => {
                let status = Self::run(cmd)?;
                Ok(if status.success() { PowerState::On } else { PowerState::Off })
            }
        }
    }

    fn set_power(&self, enable: bool) -> Result<()> {
        let cmd = if enable { &self.cfg.on_command } else { &self.cfg.off_command };
        let status = Self::run(cmd)?;
        anyhow::ensure!(status.success(), "backend command failed with {}: {}", status, cmd);
        Ok(())
    }
}
