use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Browser tab identifier, assigned by the embedder.
pub type TabId = u32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabInfo {
    pub id: TabId,
    pub url: String,
}

/// Fire-and-forget message to a tab's content layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum TabNotice {
    /// Per-second usage refresh for the on-page overlay. Times are minutes.
    #[serde(rename_all = "camelCase")]
    UpdateUsage {
        platform: String,
        session_time: u64,
        daily_time: u64,
        session_limit: u32,
        daily_limit: u32,
    },
    #[serde(rename_all = "camelCase")]
    FocusModeChanged {
        focus_mode: bool,
        focus_until: Option<DateTime<Utc>>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub message: String,
    /// 0 lowest, 2 highest, mirroring the WebExtension notification levels.
    pub priority: u8,
}

/// Tab control surface provided by the embedding browser.
///
/// Implementations must be cheap to call from the tick loops; none of these
/// methods may block on network I/O.
pub trait TabHost: Send + Sync {
    /// Current URL of a tab, or `None` once the tab is gone.
    fn tab_url(&self, tab: TabId) -> Option<String>;

    /// Every open tab.
    fn list_tabs(&self) -> Vec<TabInfo>;

    /// Rewrites a tab's location.
    fn navigate(&self, tab: TabId, url: &str) -> Result<()>;

    fn close_tab(&self, tab: TabId) -> Result<()>;

    fn reload_tab(&self, tab: TabId) -> Result<()>;

    /// Best-effort delivery to one tab's content layer.
    fn post_to_tab(&self, tab: TabId, notice: &TabNotice);

    /// Best-effort delivery to every open tab.
    fn broadcast(&self, notice: &TabNotice);
}

/// Fire-and-forget system notification display.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}
