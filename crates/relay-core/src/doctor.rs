use anyhow::Result;
use relay_api::power::BackendRegistry;

use crate::Config;

pub fn check_config(cfg: &Config, registry: &BackendRegistry) -> Result<()> {
    if !cfg.api.is_empty() {
        anyhow::ensure!(
            registry.resolve(&cfg.api).is_some(),
            "api backend not registered: {}",
            cfg.api
        );
    }
    anyhow::ensure!(cfg.noclients_countdown > 0.0, "noclients_countdown must be > 0 minutes");
    anyhow::ensure!(cfg.idle.countdown > 0.0, "idle.countdown must be > 0 minutes");
    anyhow::ensure!(cfg.autoconnect_delay >= 0.0, "autoconnect_delay must be >= 0 seconds");
    if cfg.power.off.temperature {
        anyhow::ensure!(
            cfg.temperature > 0.0 && cfg.temperature < 300.0,
            "temperature threshold out of range: {}",
            cfg.temperature
        );
    }
    Ok(())
}
