use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Days, Local, NaiveTime, Utc};
use log::{debug, error, info, warn};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use url::form_urlencoded;

use crate::browser::{Notification, NotificationSink, TabHost, TabId, TabNotice};
use crate::bus::{CustomSite, RequestError};
use crate::focus::{FocusState, DEFAULT_FOCUS_MINUTES};
use crate::limits;
use crate::platform;
use crate::rewards::{self, Badge};
use crate::settings::{PlatformConfig, Settings};
use crate::stats::Stats;
use crate::store::StateStore;
use crate::tracking::TrackerRegistry;

/// Location of the packaged blocking page, relative to the extension root.
pub const BLOCKED_PAGE: &str = "blocked.html";

/// Minutes until an emergency override switches itself off again.
pub const OVERRIDE_WINDOW_MINUTES: u32 = 60;

const NOTIFICATION_TITLE: &str = "Social Media Detox Timer";
const REWARD_TITLE: &str = "🎉 Points Earned!";
const BADGE_TITLE: &str = "🏅 Badge Unlocked!";

/// Navigation-shaped signals forwarded by the embedding browser.
#[derive(Debug, Clone)]
pub enum BrowserEvent {
    /// A tab finished loading a URL.
    TabUpdated { tab: TabId, url: String },
    /// The foreground tab changed.
    TabActivated { tab: TabId, url: String },
    TabCreated { tab: TabId, url: String },
    /// About to navigate, before the first paint of the destination.
    BeforeNavigate { tab: TabId, url: String, frame: u32 },
    NavigationCommitted { tab: TabId, url: String, frame: u32 },
}

/// Why a tab was sent to the blocking page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    LimitExceeded,
    Focus,
}

/// Whether a tracking loop should keep ticking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TickFlow {
    Continue,
    Cancel,
}

#[derive(Default)]
struct Alarms {
    daily_reset: Option<CancellationToken>,
    focus_expiry: Option<CancellationToken>,
    override_expiry: Option<CancellationToken>,
}

/// Long-lived background coordinator.
///
/// Owns the persistent records, the per-tab tracking loops, and the three
/// wall-clock alarms (daily reset, focus expiry, override expiry). The
/// browser side is reached only through the injected [`TabHost`] and
/// [`NotificationSink`] collaborators. Cloning is cheap; clones share state.
#[derive(Clone)]
pub struct UsageCoordinator {
    store: Arc<StateStore>,
    tabs: Arc<dyn TabHost>,
    notifier: Arc<dyn NotificationSink>,
    trackers: TrackerRegistry,
    alarms: Arc<Mutex<Alarms>>,
}

impl UsageCoordinator {
    pub fn new(
        store: StateStore,
        tabs: Arc<dyn TabHost>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            store: Arc::new(store),
            tabs,
            notifier,
            trackers: TrackerRegistry::new(),
            alarms: Arc::new(Mutex::new(Alarms::default())),
        }
    }

    /// Brings the coordinator up at browser-session start: session counters
    /// reset, a day rollover missed while the browser was closed is applied,
    /// and the midnight alarm is armed. A focus window persisted by a
    /// previous run gets its expiry alarm back.
    pub async fn start(&self) -> Result<()> {
        self.reset_session_usage().await?;
        self.reset_daily_usage().await?;
        self.spawn_daily_reset().await;

        let settings = self.store.settings().await;
        if let FocusState::Active { until } = FocusState::of(&settings, Utc::now()) {
            self.arm_focus_expiry(until).await;
        }

        info!("usage coordinator started");
        Ok(())
    }

    /// Cancels every alarm and tracker.
    pub async fn shutdown(&self) {
        let mut alarms = self.alarms.lock().await;
        for token in [
            alarms.daily_reset.take(),
            alarms.focus_expiry.take(),
            alarms.override_expiry.take(),
        ]
        .into_iter()
        .flatten()
        {
            token.cancel();
        }
        drop(alarms);

        self.trackers.stop_all().await;
        info!("usage coordinator stopped");
    }

    // ── Event dispatch ───────────────────────────────────────────────

    /// Entry point for every navigation signal the browser forwards.
    pub async fn handle_event(&self, event: BrowserEvent) -> Result<()> {
        match event {
            BrowserEvent::TabUpdated { tab, url } => self.on_tab_updated(tab, &url).await,
            BrowserEvent::TabActivated { tab, url } => {
                // Only the foreground tab accrues time.
                self.stop_all_tracking().await;
                self.on_tab_updated(tab, &url).await
            }
            BrowserEvent::TabCreated { tab, url } => {
                self.enforce_focus(tab, &url).await?;
                Ok(())
            }
            BrowserEvent::BeforeNavigate { tab, url, frame }
            | BrowserEvent::NavigationCommitted { tab, url, frame } => {
                if frame == 0 {
                    self.enforce_focus(tab, &url).await?;
                }
                Ok(())
            }
        }
    }

    async fn on_tab_updated(&self, tab: TabId, url: &str) -> Result<()> {
        // The focus guard runs first so a blocked destination never gets a
        // tracking loop armed for it.
        if self.enforce_focus(tab, url).await? {
            return Ok(());
        }

        let settings = self.store.settings().await;
        let Some(platform) = platform::classify(url, &settings) else {
            return Ok(());
        };
        if !settings.platform_enabled(&platform) {
            return Ok(());
        }
        self.start_tracking(tab, &platform).await
    }

    // ── Tracking ─────────────────────────────────────────────────────

    /// Idempotently (re)arms the usage tick for a tab. Counters for the
    /// platform are seeded so the UI sees zeros instead of missing keys.
    pub async fn start_tracking(&self, tab: TabId, platform: &str) -> Result<()> {
        let key = platform.to_string();
        self.store
            .update_stats(move |stats| {
                stats.session_usage.entry(key.clone()).or_insert(0);
                stats.daily_usage.entry(key).or_insert(0);
            })
            .await?;

        self.trackers.arm(tab, platform, self.clone()).await;
        debug!("tracking started for tab {tab} ({platform})");
        Ok(())
    }

    /// Cancels every live tracking loop.
    pub async fn stop_all_tracking(&self) {
        self.trackers.stop_all().await;
    }

    /// Platform currently tracked for `tab`, if any.
    pub async fn tracked_platform(&self, tab: TabId) -> Option<String> {
        self.trackers.tracked_platform(tab).await
    }

    pub async fn active_tracker_count(&self) -> usize {
        self.trackers.active_count().await
    }

    /// One tracking tick. Re-resolves the tab, increments both usage
    /// counters, pushes the overlay update, and applies the limit verdict.
    pub(crate) async fn tick(&self, tab: TabId, platform: &str) -> TickFlow {
        // A vanished tab is an expected race with tab close, not an error.
        let Some(url) = self.tabs.tab_url(tab) else {
            debug!("tab {tab} is gone, ending tracking for {platform}");
            return TickFlow::Cancel;
        };

        let settings = self.store.settings().await;
        if platform::classify(&url, &settings).as_deref() != Some(platform) {
            return TickFlow::Cancel;
        }
        let Some(config) = settings.platforms.get(platform).cloned() else {
            return TickFlow::Cancel;
        };

        let key = platform.to_string();
        let counters = self
            .store
            .update_stats(move |stats| {
                let session = stats.session_usage.entry(key.clone()).or_insert(0);
                *session += 1;
                let session = *session;
                let daily = stats.daily_usage.entry(key).or_insert(0);
                *daily += 1;
                (session, *daily)
            })
            .await;
        let (session_seconds, daily_seconds) = match counters {
            Ok(counters) => counters,
            Err(err) => {
                error!("failed to persist usage tick for {platform}: {err:#}");
                return TickFlow::Continue;
            }
        };

        self.tabs.post_to_tab(
            tab,
            &TabNotice::UpdateUsage {
                platform: platform.to_string(),
                session_time: session_seconds / 60,
                daily_time: daily_seconds / 60,
                session_limit: config.session_limit,
                daily_limit: config.daily_limit,
            },
        );

        let evaluation = limits::evaluate(
            session_seconds,
            daily_seconds,
            &config,
            settings.emergency_override,
        );
        if let Some(warning) = evaluation.warning {
            self.notifier.notify(Notification {
                title: NOTIFICATION_TITLE.to_string(),
                message: format!("{platform}: {}", warning.message()),
                priority: 1,
            });
        }
        if evaluation.block {
            self.block_tab(tab, platform, BlockReason::LimitExceeded);
            if let Err(err) = self
                .award_points(rewards::LIMIT_RESPECT_POINTS, rewards::LIMIT_RESPECT_REASON)
                .await
            {
                error!("failed to award compliance points: {err:#}");
            }
        }

        TickFlow::Continue
    }

    // ── Blocking ─────────────────────────────────────────────────────

    /// Rewrites a tab to the packaged blocking page.
    pub fn block_tab(&self, tab: TabId, platform: &str, reason: BlockReason) {
        let url = blocked_page_url(platform, tab, reason);
        if let Err(err) = self.tabs.navigate(tab, &url) {
            error!("failed to redirect tab {tab} to the blocked page: {err:#}");
        }
    }

    // ── Focus mode ───────────────────────────────────────────────────

    /// Flips focus mode. Activation closes every open tab on an enabled
    /// platform and arms the expiry alarm; deactivation tears the window
    /// down early. Either way the new state is broadcast to all tabs.
    pub async fn toggle_focus_mode(&self, duration_minutes: Option<u32>) -> Result<FocusState> {
        let now = Utc::now();
        let settings = self.store.settings().await;

        if FocusState::of(&settings, now).is_active() {
            self.end_focus_mode().await?;
            return Ok(FocusState::Inactive);
        }

        let duration = duration_minutes.unwrap_or(DEFAULT_FOCUS_MINUTES);
        let until = FocusState::window(now, duration);
        self.store
            .update_settings(move |settings| {
                settings.focus_mode = true;
                settings.focus_until = Some(until);
            })
            .await?;

        self.close_platform_tabs(&settings).await;
        self.arm_focus_expiry(until).await;
        self.tabs.broadcast(&TabNotice::FocusModeChanged {
            focus_mode: true,
            focus_until: Some(until),
        });
        info!("focus mode on until {until}");
        Ok(FocusState::Active { until })
    }

    /// Collapses focus mode to inactive. Shared by the explicit toggle, the
    /// expiry alarm, and lazy detection on the navigation guard.
    pub async fn end_focus_mode(&self) -> Result<()> {
        if let Some(token) = self.alarms.lock().await.focus_expiry.take() {
            token.cancel();
        }
        self.store
            .update_settings(|settings| {
                settings.focus_mode = false;
                settings.focus_until = None;
            })
            .await?;
        self.tabs.broadcast(&TabNotice::FocusModeChanged {
            focus_mode: false,
            focus_until: None,
        });
        info!("focus mode off");
        Ok(())
    }

    /// Focus-mode navigation guard. Returns true when the tab was redirected.
    /// Runs ahead of tracking so blocking wins even on the first paint.
    async fn enforce_focus(&self, tab: TabId, url: &str) -> Result<bool> {
        let settings = self.store.settings().await;
        if !settings.focus_mode {
            return Ok(false);
        }

        match FocusState::of(&settings, Utc::now()) {
            FocusState::Inactive => {
                // The stored window lapsed without the expiry alarm firing.
                self.end_focus_mode().await?;
                Ok(false)
            }
            FocusState::Active { .. } => {
                let target = platform::classify(url, &settings)
                    .filter(|platform| settings.platform_enabled(platform));
                match target {
                    Some(platform) => {
                        self.block_tab(tab, &platform, BlockReason::Focus);
                        Ok(true)
                    }
                    None => Ok(false),
                }
            }
        }
    }

    async fn close_platform_tabs(&self, settings: &Settings) {
        for tab in self.tabs.list_tabs() {
            let Some(platform) = platform::classify(&tab.url, settings) else {
                continue;
            };
            if settings.platform_enabled(&platform) {
                if let Err(err) = self.tabs.close_tab(tab.id) {
                    warn!("failed to close tab {} ({platform}): {err:#}", tab.id);
                }
            }
        }
    }

    async fn arm_focus_expiry(&self, until: DateTime<Utc>) {
        let token = CancellationToken::new();
        {
            let mut alarms = self.alarms.lock().await;
            if let Some(previous) = alarms.focus_expiry.replace(token.clone()) {
                previous.cancel();
            }
        }

        let coordinator = self.clone();
        tokio::spawn(async move {
            let wait = (until - Utc::now()).to_std().unwrap_or_default();
            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    if let Err(err) = coordinator.end_focus_mode().await {
                        error!("focus expiry failed: {err:#}");
                    }
                }
                _ = token.cancelled() => {}
            }
        });
    }

    // ── Emergency override ───────────────────────────────────────────

    /// Lifts limit blocking for a bounded window and reloads the requesting
    /// tab so the blocked page unloads.
    pub async fn activate_emergency_override(&self, tab: TabId) -> Result<()> {
        self.store
            .update_settings(|settings| settings.emergency_override = true)
            .await?;
        self.arm_override_expiry().await;

        if let Err(err) = self.tabs.reload_tab(tab) {
            warn!("failed to reload tab {tab} after override: {err:#}");
        }
        info!("emergency override active for {OVERRIDE_WINDOW_MINUTES} minutes");
        Ok(())
    }

    async fn arm_override_expiry(&self) {
        let token = CancellationToken::new();
        {
            let mut alarms = self.alarms.lock().await;
            if let Some(previous) = alarms.override_expiry.replace(token.clone()) {
                previous.cancel();
            }
        }

        let coordinator = self.clone();
        tokio::spawn(async move {
            let wait = Duration::from_secs(u64::from(OVERRIDE_WINDOW_MINUTES) * 60);
            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    let cleared = coordinator
                        .store
                        .update_settings(|settings| settings.emergency_override = false)
                        .await;
                    match cleared {
                        Ok(()) => info!("emergency override expired"),
                        Err(err) => error!("failed to clear emergency override: {err:#}"),
                    }
                }
                _ = token.cancelled() => {}
            }
        });
    }

    // ── Rewards ──────────────────────────────────────────────────────

    /// Adds points to the ledger and surfaces reward/badge notifications.
    pub async fn award_points(&self, points: u64, reason: &str) -> Result<()> {
        let new_badges = self
            .store
            .update_stats(move |stats| rewards::award_points(stats, points))
            .await?;

        if points > 0 {
            self.notify_reward(points, reason);
        }
        self.notify_badges(&new_badges);
        Ok(())
    }

    /// Day rollover: streak bookkeeping against yesterday's usage, then a
    /// clean daily ledger. No-op while the record is on today's date.
    pub async fn reset_daily_usage(&self) -> Result<()> {
        let today = Local::now().date_naive();
        if self.store.stats().await.last_reset_date == today {
            return Ok(());
        }

        let settings = self.store.settings().await;
        let rollover = self
            .store
            .update_stats(move |stats| rewards::roll_over_day(stats, &settings, today))
            .await?;

        if let Some(rollover) = rollover {
            if rollover.streak_extended {
                info!("daily reset: streak extended");
                self.notify_reward(rewards::STREAK_BONUS_POINTS, rewards::STREAK_BONUS_REASON);
                self.notify_badges(&rollover.new_badges);
            } else {
                info!("daily reset: streak broken");
            }
        }
        Ok(())
    }

    /// Session counters model "this browsing session"; they reset at
    /// startup only, never at the daily rollover.
    pub async fn reset_session_usage(&self) -> Result<()> {
        self.store
            .update_stats(|stats| stats.session_usage.clear())
            .await
    }

    fn notify_reward(&self, points: u64, reason: &str) {
        self.notifier.notify(Notification {
            title: REWARD_TITLE.to_string(),
            message: format!("+{points} points: {reason}"),
            priority: 0,
        });
    }

    fn notify_badges(&self, badges: &[Badge]) {
        for badge in badges {
            self.notifier.notify(Notification {
                title: BADGE_TITLE.to_string(),
                message: badge.title().to_string(),
                priority: 2,
            });
        }
    }

    // ── Record access ────────────────────────────────────────────────

    /// Current stats snapshot. The first read of a new calendar day performs
    /// the rollover lazily before answering.
    pub async fn usage_stats(&self) -> Result<Stats> {
        self.reset_daily_usage().await?;
        Ok(self.store.stats().await)
    }

    pub async fn settings(&self) -> Settings {
        self.store.settings().await
    }

    /// Replaces the settings record wholesale.
    pub async fn update_settings(&self, settings: Settings) -> Result<()> {
        self.store
            .update_settings(move |current| *current = settings)
            .await
    }

    // ── Custom sites ─────────────────────────────────────────────────

    /// Validates and registers a user-defined tracked site. Returns the
    /// normalized domain key.
    pub async fn add_custom_site(&self, site: CustomSite) -> Result<String, RequestError> {
        let domain = platform::normalize_domain(&site.domain)
            .ok_or_else(|| RequestError::InvalidDomain(site.domain.clone()))?;
        let daily_limit = site.daily_limit.unwrap_or(60);
        let session_limit = site.session_limit.unwrap_or(30);
        if daily_limit == 0 || session_limit == 0 {
            return Err(RequestError::InvalidLimit);
        }

        let name = site.name.unwrap_or_else(|| domain.clone());
        let icon = site
            .icon
            .unwrap_or_else(|| platform::icon(&domain).to_string());
        let key = domain.clone();
        self.store
            .update_settings(move |settings| {
                if settings.platforms.contains_key(&key) {
                    return Err(RequestError::DuplicateSite(key));
                }
                settings.platforms.insert(
                    key,
                    PlatformConfig {
                        enabled: true,
                        daily_limit,
                        session_limit,
                        is_custom: true,
                        name: Some(name),
                        icon: Some(icon),
                    },
                );
                Ok(())
            })
            .await??;

        info!("custom site {domain} added");
        Ok(domain)
    }

    /// Removes a custom site and drops its usage counters. Built-in and
    /// unknown keys are rejected.
    pub async fn remove_custom_site(&self, domain: &str) -> Result<(), RequestError> {
        let key = domain.to_string();
        self.store
            .update_settings(move |settings| {
                let is_custom = settings
                    .platforms
                    .get(&key)
                    .is_some_and(|config| config.is_custom);
                if !is_custom {
                    return Err(RequestError::NotCustomSite(key));
                }
                settings.platforms.remove(&key);
                Ok(())
            })
            .await??;

        let key = domain.to_string();
        self.store
            .update_stats(move |stats| {
                stats.daily_usage.remove(&key);
                stats.session_usage.remove(&key);
            })
            .await?;

        info!("custom site {domain} removed");
        Ok(())
    }

    // ── Alarms ───────────────────────────────────────────────────────

    async fn spawn_daily_reset(&self) {
        let token = CancellationToken::new();
        {
            let mut alarms = self.alarms.lock().await;
            if let Some(previous) = alarms.daily_reset.replace(token.clone()) {
                previous.cancel();
            }
        }

        let coordinator = self.clone();
        tokio::spawn(async move {
            loop {
                let wait = until_next_midnight(Local::now());
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {
                        if let Err(err) = coordinator.reset_daily_usage().await {
                            error!("daily reset failed: {err:#}");
                        }
                    }
                    _ = token.cancelled() => break,
                }
            }
        });
    }
}

fn blocked_page_url(platform: &str, tab: TabId, reason: BlockReason) -> String {
    let mut query = form_urlencoded::Serializer::new(String::new());
    query.append_pair("platform", platform);
    query.append_pair("tabId", &tab.to_string());
    if reason == BlockReason::Focus {
        query.append_pair("reason", "focus");
    }
    format!("{BLOCKED_PAGE}?{}", query.finish())
}

fn until_next_midnight(now: DateTime<Local>) -> Duration {
    let tomorrow = now.date_naive() + Days::new(1);
    match tomorrow
        .and_time(NaiveTime::MIN)
        .and_local_timezone(Local)
        .earliest()
    {
        Some(midnight) => (midnight - now).to_std().unwrap_or(Duration::from_secs(1)),
        // A skipped local midnight (DST): try again in an hour.
        None => Duration::from_secs(3600),
    }
}
