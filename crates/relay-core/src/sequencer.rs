use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::Printer;

/// Connection parameters captured immediately before a power-off disconnect
/// and consumed by the next power-on. Overwritten on each capture, never
/// merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionSnapshot {
    pub state: String,
    pub port: String,
    pub baudrate: u32,
    pub profile: String,
}

/// Preserves continuity of the machine connection across a power cycle.
pub struct ConnectionSequencer {
    printer: Arc<dyn Printer>,
}

impl ConnectionSequencer {
    pub fn new(printer: Arc<dyn Printer>) -> Self {
        Self { printer }
    }

    /// Capture the current parameters, then drop the connection.
    pub fn snapshot_and_disconnect(&self) -> Result<ConnectionSnapshot> {
        let snapshot = self.printer.current_connection();
        debug!("captured connection: state={} port={}", snapshot.state, snapshot.port);
        self.printer.disconnect().context("printer disconnect")?;
        Ok(snapshot)
    }

    /// Reconnect only when the machine was operational at capture time, or
    /// was in an error state and the operator opted into error reconnects.
    pub fn should_reconnect(snapshot: &ConnectionSnapshot, reconnect_after_error: bool) -> bool {
        snapshot.state == "Operational"
            || (snapshot.state.contains("Error") && reconnect_after_error)
    }

    /// Restore the captured connection. With a positive `autoconnect_delay`
    /// the connect call is scheduled fire-and-forget after that many
    /// seconds; otherwise it runs inline. A skipped reconnect keeps the
    /// snapshot for the next power-on to re-evaluate.
    pub fn reconnect(
        &self,
        snapshot: &ConnectionSnapshot,
        reconnect_after_error: bool,
        autoconnect_delay: f64,
    ) -> Result<()> {
        if !Self::should_reconnect(snapshot, reconnect_after_error) {
            debug!("skipping reconnect, captured state was {:?}", snapshot.state);
            return Ok(());
        }

        if autoconnect_delay > 0.0 {
            info!("scheduling reconnect to {} in {:.1}s", snapshot.port, autoconnect_delay);
            let printer = self.printer.clone();
            let snapshot = snapshot.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs_f64(autoconnect_delay)).await;
                if let Err(e) = printer.connect(&snapshot) {
                    warn!("delayed reconnect to {} failed: {:#}", snapshot.port, e);
                }
            });
            Ok(())
        } else {
            info!("reconnecting to {} @ {}", snapshot.port, snapshot.baudrate);
            self.printer.connect(snapshot).context("printer connect")
        }
    }
}
