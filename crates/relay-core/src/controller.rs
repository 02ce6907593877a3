use anyhow::Result;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use relay_api::api::{Command, CommandReply, StatusSnapshot};
use relay_api::event::Event;
use relay_api::power::{BackendRegistry, PowerBackend, PowerState};

use crate::gate::{self, GateOutcome};
use crate::sequencer::ConnectionSequencer;
use crate::timer::{TimerKind, TimerManager};
use crate::{Config, ConnectionSnapshot, Printer};

#[derive(Default)]
struct ControllerState {
    clients: u32,
    connection: Option<ConnectionSnapshot>,
    timers: TimerManager,
}

/// The central state machine. Consumes normalized events, applies policy,
/// and drives the timers, the temperature gate, the connection sequencer
/// and the power backend.
///
/// All shared state sits behind one mutex held only for the duration of a
/// transition, never across the gate or a backend call that might block.
pub struct PowerController {
    cfg: Arc<Config>,
    printer: Arc<dyn Printer>,
    registry: Arc<BackendRegistry>,
    sequencer: ConnectionSequencer,
    state: Mutex<ControllerState>,
    status_tx: broadcast::Sender<StatusSnapshot>,
    /// Handed to timer tasks; a fired timer whose controller is gone just
    /// evaporates.
    weak: Weak<PowerController>,
}

impl PowerController {
    pub fn new(
        cfg: Arc<Config>,
        printer: Arc<dyn Printer>,
        registry: Arc<BackendRegistry>,
    ) -> Arc<Self> {
        let (status_tx, _) = broadcast::channel(16);
        Arc::new_cyclic(|weak| Self {
            cfg,
            sequencer: ConnectionSequencer::new(printer.clone()),
            printer,
            registry,
            state: Mutex::new(ControllerState::default()),
            status_tx,
            weak: weak.clone(),
        })
    }

    /// Status notifications emitted after every transition.
    pub fn subscribe(&self) -> broadcast::Receiver<StatusSnapshot> {
        self.status_tx.subscribe()
    }

    fn backend(&self) -> Option<Arc<dyn PowerBackend>> {
        self.registry.resolve(&self.cfg.api)
    }

    /// Live power state; Unknown when no backend is selected. Backend
    /// faults propagate.
    pub fn status(&self) -> Result<StatusSnapshot> {
        let power = match self.backend() {
            Some(backend) => backend.get_power()?,
            None => PowerState::Unknown,
        };
        Ok(StatusSnapshot { power })
    }

    fn set_power(&self, enable: bool) -> Result<()> {
        match self.backend() {
            Some(backend) => {
                if enable {
                    info!("enabling power supply");
                } else {
                    info!("disabling power supply");
                }
                backend.set_power(enable)
            }
            None => {
                debug!("no power backend selected, power request is a no-op");
                Ok(())
            }
        }
    }

    fn emit_status(&self) {
        match self.status() {
            Ok(snapshot) => {
                let _ = self.status_tx.send(snapshot);
            }
            Err(e) => warn!("status query failed: {:#}", e),
        }
    }

    pub fn power_on(&self, connect: bool) -> Result<()> {
        self.set_power(true)?;
        if self.cfg.power.off.idle {
            self.start_idle_timer();
        }
        self.emit_status();
        if connect {
            let snapshot = self.state.lock().unwrap().connection.clone();
            if let Some(snapshot) = snapshot {
                self.sequencer.reconnect(
                    &snapshot,
                    self.cfg.reconnect_after_error,
                    self.cfg.autoconnect_delay,
                )?;
            }
        }
        Ok(())
    }

    pub fn power_off(&self, disconnect: bool) -> Result<()> {
        if disconnect {
            let snapshot = self.sequencer.snapshot_and_disconnect()?;
            self.state.lock().unwrap().connection = Some(snapshot);
        }
        self.set_power(false)?;
        self.emit_status();
        self.state.lock().unwrap().timers.stop_all();
        Ok(())
    }

    pub fn handle_event(&self, event: Event) -> Result<()> {
        debug!("event: {:?}", event);
        match event {
            Event::ClientOpened => {
                let was_zero = self.state.lock().unwrap().clients == 0;
                if was_zero && self.cfg.power.on.clients {
                    self.power_on(true)?;
                }
                let mut state = self.state.lock().unwrap();
                state.clients += 1;
                // at least one client again, the countdown no longer applies
                state.timers.cancel(TimerKind::NoClients);
            }
            Event::ClientClosed => {
                let remaining = {
                    let mut state = self.state.lock().unwrap();
                    state.clients = state.clients.saturating_sub(1);
                    state.clients
                };
                if remaining == 0 {
                    self.start_noclients_timer();
                } else {
                    self.state.lock().unwrap().timers.cancel(TimerKind::NoClients);
                }
            }
            Event::PrintStarted => {
                self.state.lock().unwrap().timers.stop_all();
            }
            Event::PrintDone => {
                if self.cfg.power.off.idle {
                    self.start_idle_timer();
                }
            }
            Event::Disconnected => {
                self.state.lock().unwrap().timers.stop_all();
                if self.cfg.power.off.disconnect {
                    self.power_off(false)?;
                }
            }
            Event::PowerOn => self.power_on(true)?,
            Event::PowerOff => self.power_off(true)?,
            Event::CommandSent { gcode } => {
                if self.cfg.power.off.idle && !self.printer.is_printing() {
                    if let Some(gcode) = gcode {
                        if !self.cfg.idle.is_ignored(&gcode) {
                            // non-ignored traffic counts as activity
                            self.start_idle_timer();
                        }
                    }
                }
            }
        }
        Ok(())
    }

    pub fn handle_command(&self, command: Command) -> Result<CommandReply> {
        match command {
            Command::PowerOn => self.power_on(true)?,
            Command::PowerOff => self.power_off(true)?,
            Command::ListApis => return Ok(CommandReply::Apis { apis: self.registry.list() }),
            Command::Status => {}
        }
        Ok(CommandReply::Status(self.status()?))
    }

    pub fn on_startup(&self) -> Result<()> {
        if self.cfg.power.on.startup {
            self.power_on(true)?;
        }
        Ok(())
    }

    pub fn on_shutdown(&self) -> Result<()> {
        if self.cfg.power.off.shutdown {
            self.power_off(false)?;
        }
        if let Some(backend) = self.backend() {
            backend.on_shutdown();
        }
        Ok(())
    }

    /// Called by the boundary's connect entry point before it performs the
    /// actual connect, replacing the original design's rebinding of the
    /// host connect method.
    pub fn pre_connect(&self) -> Result<()> {
        if self.cfg.power.on.connect {
            self.power_on(false)?;
        }
        Ok(())
    }

    pub fn timer_active(&self, kind: TimerKind) -> bool {
        self.state.lock().unwrap().timers.is_active(kind)
    }

    pub fn client_count(&self) -> u32 {
        self.state.lock().unwrap().clients
    }

    fn start_idle_timer(&self) {
        let minutes = self.cfg.idle.countdown.max(0.0);
        let delay = Duration::from_secs_f64(minutes * 60.0);
        let mut state = self.state.lock().unwrap();
        let generation = state.timers.begin(TimerKind::Idle);
        let ctrl = self.weak.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(ctrl) = ctrl.upgrade() {
                ctrl.idle_fired(generation).await;
            }
        });
        state.timers.arm(TimerKind::Idle, generation, handle);
        debug!("idle countdown started ({:.1} min)", minutes);
    }

    fn start_noclients_timer(&self) {
        let minutes = self.cfg.noclients_countdown.max(0.0);
        let delay = Duration::from_secs_f64(minutes * 60.0);
        let mut state = self.state.lock().unwrap();
        let generation = state.timers.begin(TimerKind::NoClients);
        let ctrl = self.weak.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(ctrl) = ctrl.upgrade() {
                ctrl.noclients_fired(generation).await;
            }
        });
        state.timers.arm(TimerKind::NoClients, generation, handle);
        debug!("no-clients countdown started ({:.1} min)", minutes);
    }

    async fn idle_fired(&self, generation: u64) {
        if !self.state.lock().unwrap().timers.claim_fire(TimerKind::Idle, generation) {
            return;
        }
        if !self.cfg.power.off.idle {
            return;
        }
        if self.cfg.power.off.temperature && !self.wait_for_cooldown().await {
            return;
        }
        // the machine may have started printing while we waited
        if self.printer.is_printing() {
            debug!("idle countdown elapsed but a print is running, not powering off");
            return;
        }
        info!("powering off after {:.1} idle minute/s", self.cfg.idle.countdown);
        if let Err(e) = self.power_off(true) {
            warn!("idle power off failed: {:#}", e);
        }
    }

    async fn noclients_fired(&self, generation: u64) {
        if !self.state.lock().unwrap().timers.claim_fire(TimerKind::NoClients, generation) {
            return;
        }
        if self.printer.is_printing() {
            debug!("no-clients countdown elapsed mid-print, not powering off");
            return;
        }
        if !self.cfg.power.off.noclients {
            return;
        }
        if self.cfg.power.off.temperature && !self.wait_for_cooldown().await {
            return;
        }
        if self.printer.is_printing() {
            return;
        }
        info!(
            "powering off after not seeing any clients for {:.1} minute/s",
            self.cfg.noclients_countdown
        );
        if let Err(e) = self.power_off(true) {
            warn!("no-clients power off failed: {:#}", e);
        }
    }

    /// Returns false when the wait was superseded by a resumed print.
    async fn wait_for_cooldown(&self) -> bool {
        let printer = self.printer.clone();
        let relevant = {
            let printer = self.printer.clone();
            move || !printer.is_printing()
        };
        gate::wait_until_cool(printer, self.cfg.temperature, relevant).await == GateOutcome::Cool
    }
}
