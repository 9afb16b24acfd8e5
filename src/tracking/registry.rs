use std::collections::HashMap;
use std::sync::Arc;

use log::debug;
use tokio::{sync::Mutex, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::browser::TabId;
use crate::coordinator::UsageCoordinator;

use super::loop_worker::tracking_loop;

struct Tracker {
    platform: String,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Registry of live per-tab tracking loops.
///
/// Keyed by tab id rather than by composite timer names, so bulk
/// cancellation is an enumeration instead of a prefix scan. At most one
/// tracker per tab: arming a tab replaces whatever tracker it had.
#[derive(Clone, Default)]
pub(crate) struct TrackerRegistry {
    active: Arc<Mutex<HashMap<TabId, Tracker>>>,
}

impl TrackerRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// (Re)arms the tracking loop for `tab`. Any previous loop for the tab
    /// is cancelled first, so arming twice still leaves exactly one tick
    /// source.
    pub(crate) async fn arm(&self, tab: TabId, platform: &str, coordinator: UsageCoordinator) {
        let mut active = self.active.lock().await;
        if let Some(previous) = active.remove(&tab) {
            debug!("replacing tracker for tab {tab} ({})", previous.platform);
            previous.cancel.cancel();
            previous.task.abort();
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(tracking_loop(
            coordinator,
            tab,
            platform.to_string(),
            cancel.clone(),
        ));
        active.insert(
            tab,
            Tracker {
                platform: platform.to_string(),
                cancel,
                task,
            },
        );
    }

    /// Cancels every live tracker. Called whenever the foreground tab
    /// changes, since only the active tab accrues time.
    pub(crate) async fn stop_all(&self) {
        let mut active = self.active.lock().await;
        for (tab, tracker) in active.drain() {
            debug!("stopping tracker for tab {tab} ({})", tracker.platform);
            tracker.cancel.cancel();
            tracker.task.abort();
        }
    }

    /// Platform currently tracked for `tab`, if its loop is still live.
    pub(crate) async fn tracked_platform(&self, tab: TabId) -> Option<String> {
        let mut active = self.active.lock().await;
        prune_finished(&mut active);
        active.get(&tab).map(|tracker| tracker.platform.clone())
    }

    pub(crate) async fn active_count(&self) -> usize {
        let mut active = self.active.lock().await;
        prune_finished(&mut active);
        active.len()
    }
}

// Loops remove themselves by finishing; sweep their entries on access.
fn prune_finished(active: &mut HashMap<TabId, Tracker>) {
    active.retain(|_, tracker| !tracker.task.is_finished());
}
