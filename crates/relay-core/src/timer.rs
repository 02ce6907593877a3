use tokio::task::JoinHandle;
use tracing::debug;

/// The two countdown kinds the controller runs. At most one live timer per
/// kind at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Idle,
    NoClients,
}

impl TimerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimerKind::Idle => "idle",
            TimerKind::NoClients => "no-clients",
        }
    }
}

#[derive(Debug)]
struct Slot {
    handle: JoinHandle<()>,
    generation: u64,
}

/// Single source of truth for the countdown slots. Starting a timer of a
/// kind replaces any existing one (the old task is aborted, never stacked).
///
/// Cancellation is best-effort against a task that already woke up: the
/// generation token settles the race. A fired callback must `claim_fire`
/// with its token before acting; a replaced or cancelled timer can never
/// claim the slot.
#[derive(Debug, Default)]
pub struct TimerManager {
    next_generation: u64,
    idle: Option<Slot>,
    no_clients: Option<Slot>,
}

impl TimerManager {
    fn slot_mut(&mut self, kind: TimerKind) -> &mut Option<Slot> {
        match kind {
            TimerKind::Idle => &mut self.idle,
            TimerKind::NoClients => &mut self.no_clients,
        }
    }

    /// Cancel any live timer of `kind` and claim the token for its
    /// replacement. The caller spawns the task and hands it back via `arm`.
    pub fn begin(&mut self, kind: TimerKind) -> u64 {
        self.cancel(kind);
        self.next_generation += 1;
        self.next_generation
    }

    pub fn arm(&mut self, kind: TimerKind, generation: u64, handle: JoinHandle<()>) {
        *self.slot_mut(kind) = Some(Slot { handle, generation });
    }

    /// No-op when absent or already fired.
    pub fn cancel(&mut self, kind: TimerKind) {
        if let Some(slot) = self.slot_mut(kind).take() {
            slot.handle.abort();
            debug!("{} timer cancelled", kind.as_str());
        }
    }

    /// Used on disconnect and on print start.
    pub fn stop_all(&mut self) {
        self.cancel(TimerKind::Idle);
        self.cancel(TimerKind::NoClients);
    }

    pub fn is_active(&self, kind: TimerKind) -> bool {
        match kind {
            TimerKind::Idle => self.idle.is_some(),
            TimerKind::NoClients => self.no_clients.is_some(),
        }
    }

    /// Called by a fired callback with its token. Returns true and clears
    /// the slot only when the token still owns it.
    pub fn claim_fire(&mut self, kind: TimerKind, generation: u64) -> bool {
        let slot = self.slot_mut(kind);
        match slot {
            Some(s) if s.generation == generation => {
                *slot = None;
                true
            }
            _ => false,
        }
    }
}
