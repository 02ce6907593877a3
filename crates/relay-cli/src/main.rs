use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use relay_api::power::BackendRegistry;
use relay_core::controller::PowerController;
use relay_core::{doctor, Printer};

mod backends;
mod bridge;
mod host;

use backends::{ShellBackend, ShellConfig};
use host::HostPrinter;

#[derive(Debug, Parser)]
#[command(name = "autorelay", version, about = "Automatic power control for a remotely switched printer PSU")]
struct Cli {
    #[arg(long)]
    config: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate the configuration and registered backends.
    Doctor,
    /// Bridge host notifications on stdin to power decisions.
    Run,
}

#[derive(Debug, Deserialize)]
struct CliConfig {
    #[serde(flatten)]
    core: relay_core::Config,
    #[serde(default)]
    backend: BackendCfg,
}

#[derive(Debug, Deserialize, Default)]
struct BackendCfg {
    shell: Option<ShellConfig>,
}

fn load_config(path: &str) -> Result<CliConfig> {
    let s = std::fs::read_to_string(path).context("read config")?;
    Ok(toml::from_str(&s).context("parse config toml")?)
}

fn build_registry(cfg: &CliConfig) -> Arc<BackendRegistry> {
    let registry = Arc::new(BackendRegistry::new());
    if let Some(shell) = cfg.backend.shell.clone() {
        registry.register("shell", Arc::new(ShellBackend::new(shell)));
    }
    registry
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = load_config(&cli.config)?;
    let registry = build_registry(&cfg);

    match cli.cmd {
        Command::Doctor => {
            doctor::check_config(&cfg.core, &registry)?;
            info!("doctor: OK");
        }
        Command::Run => run(cfg, registry).await?,
    }
    Ok(())
}

async fn run(cfg: CliConfig, registry: Arc<BackendRegistry>) -> Result<()> {
    let core = Arc::new(cfg.core);
    doctor::check_config(&core, &registry)?;

    let printer = HostPrinter::new();
    let printer_dyn: Arc<dyn Printer> = printer.clone();
    let ctrl = PowerController::new(core.clone(), printer_dyn, registry);

    info!("run: starting (api={:?})", core.api);
    ctrl.on_startup()?;

    tokio::select! {
        res = bridge::run(ctrl.clone(), printer, core.clone()) => res?,
        _ = tokio::signal::ctrl_c() => info!("interrupt received"),
    }

    ctrl.on_shutdown()?;
    Ok(())
}
