use anyhow::Result;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use relay_api::api::Command;
use relay_api::event;
use relay_core::controller::PowerController;
use relay_core::{Config, ConnectionSnapshot, Printer};

use crate::host::{HostPrinter, StateUpdate};

/// One JSON line from the host.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostMsg {
    /// Host notification, e.g. `{"type":"event","name":"ClientOpened"}`.
    Event {
        name: String,
        #[serde(default)]
        payload: Value,
    },
    /// Boundary command, e.g. `{"type":"command","name":"power_on"}`.
    Command { name: String },
    /// Mirror update for printing flag, temperatures, connection params.
    State(StateUpdate),
    /// The host wants to connect; we get to power on first.
    Connect {
        port: String,
        baudrate: u32,
        profile: String,
    },
}

/// Read host messages from stdin until EOF, driving the controller and
/// echoing status notifications as JSON lines on stdout.
pub async fn run(
    ctrl: Arc<PowerController>,
    printer: Arc<HostPrinter>,
    cfg: Arc<Config>,
) -> Result<()> {
    let mut status_rx = ctrl.subscribe();
    tokio::spawn(async move {
        while let Ok(snapshot) = status_rx.recv().await {
            match serde_json::to_string(&snapshot) {
                Ok(line) => println!("{}", line),
                Err(e) => warn!("status encode failed: {}", e),
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<HostMsg>(&line) {
            Ok(msg) => handle(&ctrl, &printer, &cfg, msg),
            Err(e) => warn!("dropping unparseable host line: {}", e),
        }
    }
    info!("host stream closed");
    Ok(())
}

fn handle(ctrl: &Arc<PowerController>, printer: &Arc<HostPrinter>, cfg: &Config, msg: HostMsg) {
    match msg {
        HostMsg::Event { name, payload } => {
            // everything unrecognized is dropped here
            if let Some(ev) = event::normalize(&name, &payload) {
                if let Err(e) = ctrl.handle_event(ev) {
                    warn!("event {} failed: {:#}", name, e);
                }
            }
        }
        HostMsg::Command { name } => match Command::from_name(&name) {
            Ok(command) => match ctrl.handle_command(command) {
                Ok(reply) => match serde_json::to_string(&reply) {
                    Ok(line) => println!("{}", line),
                    Err(e) => warn!("reply encode failed: {}", e),
                },
                Err(e) => warn!("command {} failed: {:#}", name, e),
            },
            Err(e) => warn!("{}", e),
        },
        HostMsg::State(update) => printer.apply(update),
        HostMsg::Connect { port, baudrate, profile } => {
            let target = ConnectionSnapshot {
                state: String::new(),
                port,
                baudrate,
                profile,
            };
            let printer: Arc<dyn Printer> = printer.clone();
            connect_requested(ctrl, printer, cfg.autoconnect_delay, target);
        }
    }
}

/// Power on first (when `power.on.connect` says so), then perform the
/// requested connect, inline or after `autoconnect_delay` seconds.
pub fn connect_requested(
    ctrl: &Arc<PowerController>,
    printer: Arc<dyn Printer>,
    autoconnect_delay: f64,
    target: ConnectionSnapshot,
) {
    if let Err(e) = ctrl.pre_connect() {
        warn!("power on before connect failed: {:#}", e);
        return;
    }
    if autoconnect_delay > 0.0 {
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs_f64(autoconnect_delay)).await;
            if let Err(e) = printer.connect(&target) {
                warn!("connect to {} failed: {:#}", target.port, e);
            }
        });
    } else if let Err(e) = printer.connect(&target) {
        warn!("connect to {} failed: {:#}", target.port, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use relay_api::power::{BackendRegistry, PowerBackend, PowerState};
    use std::sync::Mutex;

    #[test]
    fn host_messages_decode() {
        let msg: HostMsg =
            serde_json::from_str(r#"{"type":"event","name":"PrintDone"}"#).unwrap();
        assert!(matches!(msg, HostMsg::Event { ref name, .. } if name == "PrintDone"));

        let msg: HostMsg =
            serde_json::from_str(r#"{"type":"command","name":"list_apis"}"#).unwrap();
        assert!(matches!(msg, HostMsg::Command { ref name } if name == "list_apis"));

        let msg: HostMsg = serde_json::from_str(
            r#"{"type":"state","printing":true,"temperatures":[205.5]}"#,
        )
        .unwrap();
        match msg {
            HostMsg::State(update) => {
                assert_eq!(update.printing, Some(true));
                assert_eq!(update.temperatures, Some(vec![205.5]));
                assert!(update.connection.is_none());
            }
            other => panic!("unexpected: {:?}", other),
        }

        let msg: HostMsg = serde_json::from_str(
            r#"{"type":"connect","port":"/dev/ttyUSB0","baudrate":115200,"profile":"_default"}"#,
        )
        .unwrap();
        assert!(matches!(msg, HostMsg::Connect { ref port, .. } if port == "/dev/ttyUSB0"));

        assert!(serde_json::from_str::<HostMsg>(r#"{"type":"reboot"}"#).is_err());
    }

    struct OrderedPrinter {
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Printer for OrderedPrinter {
        fn is_printing(&self) -> bool {
            false
        }
        fn current_connection(&self) -> ConnectionSnapshot {
            ConnectionSnapshot {
                state: "Closed".into(),
                port: String::new(),
                baudrate: 0,
                profile: String::new(),
            }
        }
        fn connect(&self, snapshot: &ConnectionSnapshot) -> Result<()> {
            self.log.lock().unwrap().push(format!("connect:{}", snapshot.port));
            Ok(())
        }
        fn disconnect(&self) -> Result<()> {
            self.log.lock().unwrap().push("disconnect".into());
            Ok(())
        }
        fn temperatures(&self) -> Vec<f64> {
            Vec::new()
        }
    }

    struct OrderedBackend {
        log: Arc<Mutex<Vec<String>>>,
    }

    impl PowerBackend for OrderedBackend {
        fn name(&self) -> &str {
            "Ordered"
        }
        fn get_power(&self) -> Result<PowerState> {
            Ok(PowerState::Unknown)
        }
        fn set_power(&self, enable: bool) -> Result<()> {
            self.log.lock().unwrap().push(format!("power:{}", enable));
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn connect_request_powers_on_then_connects_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let printer: Arc<dyn Printer> = Arc::new(OrderedPrinter { log: log.clone() });
        let registry = Arc::new(BackendRegistry::new());
        registry.register("ordered", Arc::new(OrderedBackend { log: log.clone() }));

        let mut cfg = Config { api: "ordered".into(), ..Config::default() };
        cfg.power.on.connect = true;
        let ctrl = PowerController::new(Arc::new(cfg), printer.clone(), registry);

        let target = ConnectionSnapshot {
            state: String::new(),
            port: "/dev/ttyUSB0".into(),
            baudrate: 115_200,
            profile: "_default".into(),
        };
        // zero delay: both steps happen synchronously, power-on first
        connect_requested(&ctrl, printer.clone(), 0.0, target.clone());
        assert_eq!(*log.lock().unwrap(), vec!["power:true", "connect:/dev/ttyUSB0"]);

        // positive delay: power-on now, connect only after the delay
        log.lock().unwrap().clear();
        connect_requested(&ctrl, printer, 2.0, target);
        assert_eq!(*log.lock().unwrap(), vec!["power:true"]);
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(*log.lock().unwrap(), vec!["power:true", "connect:/dev/ttyUSB0"]);
    }
}
