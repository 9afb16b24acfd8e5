use log::debug;
use tokio::time::{self, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::browser::TabId;
use crate::coordinator::{TickFlow, UsageCoordinator};

const TICK_INTERVAL_SECS: u64 = 1;

/// One-second usage tick bound to a single `(tab, platform)` pair.
///
/// The loop owns no state. Every tick round-trips through the coordinator,
/// which re-resolves the tab and decides whether the loop keeps running; the
/// first tick lands one full interval after arming.
pub(crate) async fn tracking_loop(
    coordinator: UsageCoordinator,
    tab: TabId,
    platform: String,
    cancel: CancellationToken,
) {
    let period = Duration::from_secs(TICK_INTERVAL_SECS);
    let mut ticker = time::interval_at(time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match coordinator.tick(tab, &platform).await {
                    TickFlow::Continue => {}
                    TickFlow::Cancel => {
                        debug!("tracking loop for tab {tab} ({platform}) ended");
                        break;
                    }
                }
            }
            _ = cancel.cancelled() => {
                debug!("tracking loop for tab {tab} ({platform}) cancelled");
                break;
            }
        }
    }
}
