use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::Printer;

pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    /// All heaters are below the threshold.
    Cool,
    /// The wait stopped mattering (e.g. a print started) before cooldown.
    Superseded,
}

/// Block the calling power-off sequence until the hottest heater reads below
/// `threshold_c`, polling every [`POLL_INTERVAL`].
///
/// No sensors reporting passes immediately. There is no overall timeout: as
/// long as `still_relevant` holds, the wait continues until the machine
/// cools. Callers re-check `is_printing()` once more after this returns.
pub async fn wait_until_cool(
    printer: Arc<dyn Printer>,
    threshold_c: f64,
    still_relevant: impl Fn() -> bool,
) -> GateOutcome {
    loop {
        let max = printer
            .temperatures()
            .into_iter()
            .fold(f64::MIN, f64::max);
        if max < threshold_c {
            return GateOutcome::Cool;
        }
        if !still_relevant() {
            debug!("cooldown wait superseded at {:.1}C", max);
            return GateOutcome::Superseded;
        }
        debug!("waiting for cooldown: {:.1}C >= {:.1}C", max, threshold_c);
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
