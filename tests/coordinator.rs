use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use chrono::{Days, Duration as ChronoDuration, Local, Utc};
use tempfile::TempDir;

use detoxtimer::{
    BrowserEvent, CustomSite, Notification, NotificationSink, Request, Settings, StateStore, Stats,
    TabHost, TabId, TabInfo, TabNotice, UsageCoordinator,
};

#[derive(Clone, Default)]
struct MockBrowser {
    state: Arc<Mutex<BrowserState>>,
}

#[derive(Default)]
struct BrowserState {
    tabs: BTreeMap<TabId, String>,
    navigations: Vec<(TabId, String)>,
    closed: Vec<TabId>,
    reloaded: Vec<TabId>,
    posts: Vec<(TabId, TabNotice)>,
    broadcasts: Vec<TabNotice>,
}

impl MockBrowser {
    fn set_tab(&self, tab: TabId, url: &str) {
        self.state.lock().unwrap().tabs.insert(tab, url.to_string());
    }

    fn remove_tab(&self, tab: TabId) {
        self.state.lock().unwrap().tabs.remove(&tab);
    }

    fn navigations(&self) -> Vec<(TabId, String)> {
        self.state.lock().unwrap().navigations.clone()
    }

    fn closed(&self) -> Vec<TabId> {
        self.state.lock().unwrap().closed.clone()
    }

    fn reloaded(&self) -> Vec<TabId> {
        self.state.lock().unwrap().reloaded.clone()
    }

    fn posts_len(&self) -> usize {
        self.state.lock().unwrap().posts.len()
    }

    fn last_post(&self) -> Option<(TabId, TabNotice)> {
        self.state.lock().unwrap().posts.last().cloned()
    }

    fn broadcasts(&self) -> Vec<TabNotice> {
        self.state.lock().unwrap().broadcasts.clone()
    }
}

impl TabHost for MockBrowser {
    fn tab_url(&self, tab: TabId) -> Option<String> {
        self.state.lock().unwrap().tabs.get(&tab).cloned()
    }

    fn list_tabs(&self) -> Vec<TabInfo> {
        self.state
            .lock()
            .unwrap()
            .tabs
            .iter()
            .map(|(id, url)| TabInfo {
                id: *id,
                url: url.clone(),
            })
            .collect()
    }

    fn navigate(&self, tab: TabId, url: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.tabs.insert(tab, url.to_string());
        state.navigations.push((tab, url.to_string()));
        Ok(())
    }

    fn close_tab(&self, tab: TabId) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.tabs.remove(&tab);
        state.closed.push(tab);
        Ok(())
    }

    fn reload_tab(&self, tab: TabId) -> Result<()> {
        self.state.lock().unwrap().reloaded.push(tab);
        Ok(())
    }

    fn post_to_tab(&self, tab: TabId, notice: &TabNotice) {
        self.state.lock().unwrap().posts.push((tab, notice.clone()));
    }

    fn broadcast(&self, notice: &TabNotice) {
        self.state.lock().unwrap().broadcasts.push(notice.clone());
    }
}

#[derive(Clone, Default)]
struct MockNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl NotificationSink for MockNotifier {
    fn notify(&self, notification: Notification) {
        self.sent.lock().unwrap().push(notification);
    }
}

impl MockNotifier {
    fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }

    fn count_containing(&self, fragment: &str) -> usize {
        self.sent()
            .iter()
            .filter(|n| n.message.contains(fragment))
            .count()
    }
}

struct Harness {
    coordinator: UsageCoordinator,
    browser: MockBrowser,
    notifier: MockNotifier,
    _dir: TempDir,
}

fn harness() -> Harness {
    harness_with(|_| {}, |_| {})
}

/// Builds a coordinator over a temp store whose records were seeded on disk,
/// so construction also exercises the load path.
fn harness_with(
    seed_settings: impl FnOnce(&mut Settings),
    seed_stats: impl FnOnce(&mut Stats),
) -> Harness {
    let _ = env_logger::builder().is_test(true).try_init();

    let dir = tempfile::tempdir().unwrap();
    let mut settings = Settings::default();
    seed_settings(&mut settings);
    std::fs::write(
        dir.path().join("settings.json"),
        serde_json::to_string_pretty(&settings).unwrap(),
    )
    .unwrap();
    let mut stats = Stats::default();
    seed_stats(&mut stats);
    std::fs::write(
        dir.path().join("stats.json"),
        serde_json::to_string_pretty(&stats).unwrap(),
    )
    .unwrap();

    let store = StateStore::open(dir.path()).unwrap();
    let browser = MockBrowser::default();
    let notifier = MockNotifier::default();
    let coordinator = UsageCoordinator::new(
        store,
        Arc::new(browser.clone()),
        Arc::new(notifier.clone()),
    );
    Harness {
        coordinator,
        browser,
        notifier,
        _dir: dir,
    }
}

/// Advances paused tokio time one second at a time so every tracking tick
/// lands and its task gets to run. The leading yield lets freshly spawned
/// loops register their timers before the clock moves.
async fn run_ticks(seconds: u64) {
    tokio::task::yield_now().await;
    for _ in 0..seconds {
        tokio::time::advance(Duration::from_secs(1)).await;
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
    }
}

async fn jump(duration: Duration) {
    tokio::task::yield_now().await;
    tokio::time::advance(duration).await;
    tokio::task::yield_now().await;
    tokio::task::yield_now().await;
}

async fn tab_updated(h: &Harness, tab: TabId, url: &str) {
    h.browser.set_tab(tab, url);
    h.coordinator
        .handle_event(BrowserEvent::TabUpdated {
            tab,
            url: url.to_string(),
        })
        .await
        .unwrap();
}

// ── Tracking and limits ──────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn fresh_install_tracks_and_blocks_at_the_session_limit() {
    let h = harness();

    // Defaults are seeded on first open.
    let settings = h.coordinator.settings().await;
    assert_eq!(settings.platforms["instagram.com"].session_limit, 20);

    tab_updated(&h, 1, "https://www.instagram.com/reels").await;
    assert_eq!(
        h.coordinator.tracked_platform(1).await.as_deref(),
        Some("instagram.com")
    );

    // 20 minutes of one-second ticks.
    run_ticks(20 * 60).await;

    let stats = h.coordinator.usage_stats().await.unwrap();
    assert_eq!(stats.session_usage["instagram.com"], 1200);
    assert_eq!(stats.daily_usage["instagram.com"], 1200);
    assert_eq!(stats.total_points, 5);

    let navigations = h.browser.navigations();
    assert_eq!(
        navigations,
        vec![(1, "blocked.html?platform=instagram.com&tabId=1".to_string())]
    );
    assert_eq!(h.notifier.count_containing("Respected time limit"), 1);

    // One overlay update per tick, the last one sitting on the limit.
    assert_eq!(h.browser.posts_len(), 1200);
    match h.browser.last_post() {
        Some((1, TabNotice::UpdateUsage { session_time, daily_time, .. })) => {
            assert_eq!(session_time, 20);
            assert_eq!(daily_time, 20);
        }
        other => panic!("unexpected last post: {other:?}"),
    }

    // The blocked page does not classify, so the tracker winds down.
    run_ticks(2).await;
    assert_eq!(h.coordinator.active_tracker_count().await, 0);
    let stats = h.coordinator.usage_stats().await.unwrap();
    assert_eq!(stats.session_usage["instagram.com"], 1200);
}

#[tokio::test(start_paused = true)]
async fn arming_twice_keeps_a_single_tick_source() {
    let h = harness();

    tab_updated(&h, 1, "https://instagram.com").await;
    tab_updated(&h, 1, "https://instagram.com/explore").await;
    assert_eq!(h.coordinator.active_tracker_count().await, 1);

    run_ticks(5).await;
    let stats = h.coordinator.usage_stats().await.unwrap();
    assert_eq!(stats.session_usage["instagram.com"], 5);
}

#[tokio::test(start_paused = true)]
async fn navigating_away_cancels_the_tracker() {
    let h = harness();

    tab_updated(&h, 1, "https://reddit.com/r/rust").await;
    run_ticks(3).await;

    h.browser.set_tab(1, "https://example.com");
    run_ticks(3).await;

    let stats = h.coordinator.usage_stats().await.unwrap();
    assert_eq!(stats.session_usage["reddit.com"], 3);
    assert_eq!(h.coordinator.active_tracker_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn a_closed_tab_ends_tracking_without_errors() {
    let h = harness();

    tab_updated(&h, 1, "https://tiktok.com/@someone").await;
    run_ticks(2).await;

    h.browser.remove_tab(1);
    run_ticks(3).await;

    let stats = h.coordinator.usage_stats().await.unwrap();
    assert_eq!(stats.session_usage["tiktok.com"], 2);
    assert_eq!(h.coordinator.active_tracker_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn activating_another_tab_moves_tracking_to_it() {
    let h = harness();

    tab_updated(&h, 1, "https://instagram.com").await;
    run_ticks(2).await;

    h.browser.set_tab(2, "https://x.com/home");
    h.coordinator
        .handle_event(BrowserEvent::TabActivated {
            tab: 2,
            url: "https://x.com/home".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(h.coordinator.tracked_platform(1).await, None);
    assert_eq!(h.coordinator.tracked_platform(2).await.as_deref(), Some("x.com"));

    run_ticks(3).await;
    let stats = h.coordinator.usage_stats().await.unwrap();
    assert_eq!(stats.session_usage["instagram.com"], 2);
    assert_eq!(stats.session_usage["x.com"], 3);
}

#[tokio::test(start_paused = true)]
async fn daily_warnings_fire_once_per_threshold() {
    let h = harness_with(
        |settings| {
            let config = settings.platforms.get_mut("instagram.com").unwrap();
            config.daily_limit = 10;
            config.session_limit = 100;
        },
        |_| {},
    );

    tab_updated(&h, 1, "https://instagram.com").await;
    // Through the 75% mark (minute 7), the 90% mark (minute 9), and the
    // 10-minute block.
    run_ticks(10 * 60).await;

    assert_eq!(h.notifier.count_containing("75% of daily limit reached"), 1);
    assert_eq!(h.notifier.count_containing("90% of daily limit reached"), 1);
    assert_eq!(h.browser.navigations().len(), 1);
    assert_eq!(h.notifier.count_containing("Respected time limit"), 1);
}

// ── Emergency override ───────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn emergency_override_suppresses_blocking() {
    let h = harness_with(
        |settings| {
            settings.platforms.get_mut("instagram.com").unwrap().session_limit = 1;
        },
        |_| {},
    );

    let response = h
        .coordinator
        .respond(Request::EmergencyOverride { tab_id: 1 })
        .await;
    assert!(response.success);
    assert_eq!(h.browser.reloaded(), vec![1]);

    tab_updated(&h, 1, "https://instagram.com").await;
    run_ticks(120).await;
    assert!(h.browser.navigations().is_empty());

    let stats = h.coordinator.usage_stats().await.unwrap();
    assert_eq!(stats.session_usage["instagram.com"], 120);
}

#[tokio::test(start_paused = true)]
async fn emergency_override_clears_itself_after_an_hour() {
    let h = harness();

    h.coordinator.activate_emergency_override(9).await.unwrap();
    assert!(h.coordinator.settings().await.emergency_override);

    jump(Duration::from_secs(60 * 60 + 1)).await;
    assert!(!h.coordinator.settings().await.emergency_override);
}

// ── Focus mode ───────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn focus_mode_closes_platform_tabs_and_blocks_navigation() {
    let h = harness();
    h.browser.set_tab(1, "https://instagram.com");
    h.browser.set_tab(2, "https://example.com/docs");

    let response = h
        .coordinator
        .respond(Request::ToggleFocusMode { duration: Some(30) })
        .await;
    assert!(response.success);

    let settings = h.coordinator.settings().await;
    assert!(settings.focus_mode);
    let until = settings.focus_until.expect("focus deadline");
    assert!(until > Utc::now() + ChronoDuration::minutes(29));
    assert!(until <= Utc::now() + ChronoDuration::minutes(30));

    // Only the platform tab is closed.
    assert_eq!(h.browser.closed(), vec![1]);
    assert_eq!(
        h.browser.broadcasts().last(),
        Some(&TabNotice::FocusModeChanged {
            focus_mode: true,
            focus_until: Some(until),
        })
    );

    // New navigation to a tracked platform is rewritten before tracking.
    h.browser.set_tab(3, "https://twitter.com/home");
    h.coordinator
        .handle_event(BrowserEvent::TabCreated {
            tab: 3,
            url: "https://twitter.com/home".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(
        h.browser.navigations(),
        vec![(3, "blocked.html?platform=twitter.com&tabId=3&reason=focus".to_string())]
    );
    assert_eq!(h.coordinator.active_tracker_count().await, 0);

    // Pre-navigation guard fires on the top-level frame only.
    h.coordinator
        .handle_event(BrowserEvent::BeforeNavigate {
            tab: 4,
            url: "https://facebook.com".to_string(),
            frame: 1,
        })
        .await
        .unwrap();
    assert_eq!(h.browser.navigations().len(), 1);

    h.coordinator
        .handle_event(BrowserEvent::BeforeNavigate {
            tab: 4,
            url: "https://facebook.com".to_string(),
            frame: 0,
        })
        .await
        .unwrap();
    assert_eq!(h.browser.navigations().len(), 2);

    // Non-platform navigation passes through.
    h.coordinator
        .handle_event(BrowserEvent::NavigationCommitted {
            tab: 5,
            url: "https://example.com".to_string(),
            frame: 0,
        })
        .await
        .unwrap();
    assert_eq!(h.browser.navigations().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn focus_mode_expires_through_the_alarm() {
    let h = harness();

    h.coordinator.toggle_focus_mode(Some(30)).await.unwrap();
    jump(Duration::from_secs(30 * 60 + 1)).await;

    let settings = h.coordinator.settings().await;
    assert!(!settings.focus_mode);
    assert_eq!(settings.focus_until, None);
    assert_eq!(
        h.browser.broadcasts().last(),
        Some(&TabNotice::FocusModeChanged {
            focus_mode: false,
            focus_until: None,
        })
    );
}

#[tokio::test(start_paused = true)]
async fn a_lapsed_focus_window_collapses_lazily_on_the_guard() {
    let h = harness_with(
        |settings| {
            settings.focus_mode = true;
            settings.focus_until = Some(Utc::now() - ChronoDuration::minutes(1));
        },
        |_| {},
    );

    h.browser.set_tab(1, "https://instagram.com");
    h.coordinator
        .handle_event(BrowserEvent::BeforeNavigate {
            tab: 1,
            url: "https://instagram.com".to_string(),
            frame: 0,
        })
        .await
        .unwrap();

    // Not blocked, and the stored pair is cleaned up.
    assert!(h.browser.navigations().is_empty());
    let settings = h.coordinator.settings().await;
    assert!(!settings.focus_mode);
    assert_eq!(settings.focus_until, None);
}

#[tokio::test(start_paused = true)]
async fn toggling_while_active_ends_the_window_early() {
    let h = harness();

    h.coordinator.toggle_focus_mode(Some(30)).await.unwrap();
    let response = h
        .coordinator
        .respond(Request::ToggleFocusMode { duration: None })
        .await;
    assert!(response.success);

    let settings = h.coordinator.settings().await;
    assert!(!settings.focus_mode);
    assert_eq!(settings.focus_until, None);

    // The expiry alarm was cancelled with the window.
    jump(Duration::from_secs(31 * 60)).await;
    assert!(!h.coordinator.settings().await.focus_mode);
}

// ── Rewards and rollover ─────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn compliant_yesterday_extends_the_streak() {
    let yesterday = Local::now().date_naive() - Days::new(1);
    let h = harness_with(
        |_| {},
        move |stats| {
            stats.last_reset_date = yesterday;
            stats.current_streak = 2;
            stats.longest_streak = 4;
            stats.daily_usage.insert("instagram.com".to_string(), 44 * 60);
        },
    );

    h.coordinator.reset_daily_usage().await.unwrap();

    let stats = h.coordinator.usage_stats().await.unwrap();
    assert_eq!(stats.current_streak, 3);
    assert_eq!(stats.longest_streak, 4);
    assert_eq!(stats.total_points, 20);
    assert!(stats.daily_usage.is_empty());
    assert_eq!(stats.last_reset_date, Local::now().date_naive());
    assert_eq!(h.notifier.count_containing("Daily streak maintained"), 1);
    // 20 points also crossed the first badge threshold.
    assert!(stats.badges.contains(&"first_day".to_string()));
}

#[tokio::test(start_paused = true)]
async fn a_limit_breach_yesterday_resets_the_streak() {
    let yesterday = Local::now().date_naive() - Days::new(1);
    let h = harness_with(
        |_| {},
        move |stats| {
            stats.last_reset_date = yesterday;
            stats.current_streak = 5;
            stats.longest_streak = 5;
            stats.daily_usage.insert("instagram.com".to_string(), 45 * 60);
        },
    );

    h.coordinator.reset_daily_usage().await.unwrap();

    let stats = h.coordinator.usage_stats().await.unwrap();
    assert_eq!(stats.current_streak, 0);
    assert_eq!(stats.longest_streak, 5);
    assert_eq!(stats.total_points, 0);
    assert_eq!(h.notifier.sent().len(), 0);
}

#[tokio::test(start_paused = true)]
async fn reading_stats_rolls_the_day_over_lazily() {
    let yesterday = Local::now().date_naive() - Days::new(1);
    let h = harness_with(
        |_| {},
        move |stats| {
            stats.last_reset_date = yesterday;
            stats.daily_usage.insert("reddit.com".to_string(), 600);
        },
    );

    let response = h.coordinator.respond(Request::GetUsageStats).await;
    assert!(response.success);

    let stats = h.coordinator.usage_stats().await.unwrap();
    assert_eq!(stats.last_reset_date, Local::now().date_naive());
    assert!(stats.daily_usage.is_empty());
}

#[tokio::test(start_paused = true)]
async fn point_badges_award_exactly_once_over_the_bus() {
    let h = harness();

    for _ in 0..2 {
        let response = h
            .coordinator
            .respond(Request::AwardPoints {
                points: 60,
                reason: "Focus session finished".to_string(),
            })
            .await;
        assert!(response.success);
    }

    let stats = h.coordinator.usage_stats().await.unwrap();
    assert_eq!(stats.total_points, 120);
    let crossings = stats.badges.iter().filter(|id| *id == "points_100").count();
    assert_eq!(crossings, 1);
    assert_eq!(h.notifier.count_containing("100 Points Collector"), 1);
}

#[tokio::test(start_paused = true)]
async fn startup_resets_session_usage_and_catches_up_the_rollover() {
    let yesterday = Local::now().date_naive() - Days::new(1);
    let h = harness_with(
        |_| {},
        move |stats| {
            stats.last_reset_date = yesterday;
            stats.session_usage.insert("youtube.com".to_string(), 900);
            stats.daily_usage.insert("youtube.com".to_string(), 900);
        },
    );

    h.coordinator.start().await.unwrap();

    let stats = h.coordinator.usage_stats().await.unwrap();
    assert!(stats.session_usage.is_empty());
    assert!(stats.daily_usage.is_empty());
    assert_eq!(stats.last_reset_date, Local::now().date_naive());
    assert_eq!(stats.current_streak, 1);

    h.coordinator.shutdown().await;
    assert_eq!(h.coordinator.active_tracker_count().await, 0);
}

// ── Custom sites over the bus ────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn custom_sites_are_added_tracked_and_removed() {
    let h = harness();

    let response = h
        .coordinator
        .respond(Request::AddCustomSite {
            site_data: CustomSite {
                domain: "WWW.News.Example".to_string(),
                daily_limit: None,
                session_limit: None,
                name: None,
                icon: None,
            },
        })
        .await;
    assert!(response.success);

    let settings = h.coordinator.settings().await;
    let config = &settings.platforms["news.example"];
    assert!(config.is_custom);
    assert!(config.enabled);
    assert_eq!(config.daily_limit, 60);
    assert_eq!(config.session_limit, 30);
    assert_eq!(config.icon.as_deref(), Some("🌐"));

    // Subdomains of the custom site are tracked too.
    tab_updated(&h, 1, "https://feeds.news.example/today").await;
    run_ticks(2).await;
    let stats = h.coordinator.usage_stats().await.unwrap();
    assert_eq!(stats.session_usage["news.example"], 2);

    let response = h
        .coordinator
        .respond(Request::RemoveCustomSite {
            domain: "news.example".to_string(),
        })
        .await;
    assert!(response.success);

    let settings = h.coordinator.settings().await;
    assert!(!settings.platforms.contains_key("news.example"));
    let stats = h.coordinator.usage_stats().await.unwrap();
    assert!(!stats.session_usage.contains_key("news.example"));
    assert!(!stats.daily_usage.contains_key("news.example"));
}

#[tokio::test(start_paused = true)]
async fn custom_site_validation_failures_are_typed() {
    let h = harness();

    let invalid = h
        .coordinator
        .respond(Request::AddCustomSite {
            site_data: CustomSite {
                domain: "   ".to_string(),
                daily_limit: None,
                session_limit: None,
                name: None,
                icon: None,
            },
        })
        .await;
    assert!(!invalid.success);
    assert!(invalid.error.unwrap().contains("invalid domain"));

    let duplicate = h
        .coordinator
        .respond(Request::AddCustomSite {
            site_data: CustomSite {
                domain: "instagram.com".to_string(),
                daily_limit: Some(10),
                session_limit: Some(5),
                name: None,
                icon: None,
            },
        })
        .await;
    assert!(!duplicate.success);
    assert!(duplicate.error.unwrap().contains("already exists"));

    let not_custom = h
        .coordinator
        .respond(Request::RemoveCustomSite {
            domain: "facebook.com".to_string(),
        })
        .await;
    assert!(!not_custom.success);
    assert!(not_custom.error.unwrap().contains("not a custom site"));

    let zero_limit = h
        .coordinator
        .respond(Request::AddCustomSite {
            site_data: CustomSite {
                domain: "news.example".to_string(),
                daily_limit: Some(0),
                session_limit: None,
                name: None,
                icon: None,
            },
        })
        .await;
    assert!(!zero_limit.success);
    assert!(zero_limit.error.unwrap().contains("at least one minute"));

    // Nothing was half-applied.
    let settings = h.coordinator.settings().await;
    assert!(!settings.platforms.contains_key("news.example"));
    assert!(settings.platforms.contains_key("facebook.com"));
}
