use anyhow::Result;
use serde::Deserialize;
use serde_json::json;
use std::sync::{Arc, Mutex};
use tracing::debug;

use relay_core::{ConnectionSnapshot, Printer};

/// Incremental state report from the host; absent fields leave the mirror
/// untouched.
#[derive(Debug, Deserialize)]
pub struct StateUpdate {
    #[serde(default)]
    pub printing: Option<bool>,
    #[serde(default)]
    pub temperatures: Option<Vec<f64>>,
    #[serde(default)]
    pub connection: Option<ConnectionSnapshot>,
}

struct HostState {
    printing: bool,
    temperatures: Vec<f64>,
    connection: ConnectionSnapshot,
}

impl Default for HostState {
    fn default() -> Self {
        Self {
            printing: false,
            temperatures: Vec::new(),
            connection: ConnectionSnapshot {
                state: "Closed".into(),
                port: String::new(),
                baudrate: 0,
                profile: String::new(),
            },
        }
    }
}

/// `Printer` adapter over the stdio bridge: queries are answered from a
/// mirror of the host's last state report, connect/disconnect are forwarded
/// to the host as action lines on stdout.
#[derive(Default)]
pub struct HostPrinter {
    state: Mutex<HostState>,
}

impl HostPrinter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn apply(&self, update: StateUpdate) {
        let mut state = self.state.lock().unwrap();
        if let Some(printing) = update.printing {
            state.printing = printing;
        }
        if let Some(temperatures) = update.temperatures {
            state.temperatures = temperatures;
        }
        if let Some(connection) = update.connection {
            state.connection = connection;
        }
    }
}

impl Printer for HostPrinter {
    fn is_printing(&self) -> bool {
        self.state.lock().unwrap().printing
    }

    fn current_connection(&self) -> ConnectionSnapshot {
        self.state.lock().unwrap().connection.clone()
    }

    fn connect(&self, snapshot: &ConnectionSnapshot) -> Result<()> {
        debug!("requesting host connect to {}", snapshot.port);
        println!(
            "{}",
            json!({
                "action": "connect",
                "port": snapshot.port,
                "baudrate": snapshot.baudrate,
                "profile": snapshot.profile,
            })
        );
        Ok(())
    }

    fn disconnect(&self) -> Result<()> {
        debug!("requesting host disconnect");
        println!("{}", json!({ "action": "disconnect" }));
        Ok(())
    }

    fn temperatures(&self) -> Vec<f64> {
        self.state.lock().unwrap().temperatures.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_updates_keep_other_fields() {
        let printer = HostPrinter::new();
        printer.apply(StateUpdate {
            printing: Some(true),
            temperatures: Some(vec![210.0, 60.0]),
            connection: None,
        });
        printer.apply(StateUpdate { printing: None, temperatures: None, connection: None });

        assert!(printer.is_printing());
        assert_eq!(printer.temperatures(), vec![210.0, 60.0]);
        assert_eq!(printer.current_connection().state, "Closed");
    }

    #[test]
    fn connection_mirror_replaces_whole_snapshot() {
        let printer = HostPrinter::new();
        printer.apply(StateUpdate {
            printing: None,
            temperatures: None,
            connection: Some(ConnectionSnapshot {
                state: "Operational".into(),
                port: "/dev/ttyUSB0".into(),
                baudrate: 115_200,
                profile: "_default".into(),
            }),
        });
        let conn = printer.current_connection();
        assert_eq!(conn.state, "Operational");
        assert_eq!(conn.baudrate, 115_200);
    }
}
