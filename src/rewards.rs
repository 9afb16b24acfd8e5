use chrono::NaiveDate;

use crate::{settings::Settings, stats::Stats};

/// Points granted when a limit block lands.
pub const LIMIT_RESPECT_POINTS: u64 = 5;
pub const LIMIT_RESPECT_REASON: &str = "Respected time limit";

/// Points granted when a compliant day extends the streak.
pub const STREAK_BONUS_POINTS: u64 = 20;
pub const STREAK_BONUS_REASON: &str = "Daily streak maintained";

/// Earnable badges, in the fixed order thresholds are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Badge {
    FirstDay,
    WeekStrong,
    Points100,
    Points500,
}

impl Badge {
    pub const ALL: [Badge; 4] = [
        Badge::FirstDay,
        Badge::WeekStrong,
        Badge::Points100,
        Badge::Points500,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            Badge::FirstDay => "first_day",
            Badge::WeekStrong => "week_strong",
            Badge::Points100 => "points_100",
            Badge::Points500 => "points_500",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Badge::FirstDay => "First Day Complete! 🌟",
            Badge::WeekStrong => "Week Strong! 💪",
            Badge::Points100 => "100 Points Collector! 🏆",
            Badge::Points500 => "500 Points Master! 👑",
        }
    }

    fn earned(&self, stats: &Stats) -> bool {
        match self {
            Badge::FirstDay => stats.total_points >= 10,
            Badge::WeekStrong => stats.current_streak >= 7,
            Badge::Points100 => stats.total_points >= 100,
            Badge::Points500 => stats.total_points >= 500,
        }
    }
}

/// Adds points to the ledger and returns any badge whose threshold was newly
/// crossed. Re-crossing an already-awarded threshold is a no-op.
pub fn award_points(stats: &mut Stats, points: u64) -> Vec<Badge> {
    stats.total_points += points;

    let mut new_badges = Vec::new();
    for badge in Badge::ALL {
        if badge.earned(stats) && !stats.has_badge(badge.id()) {
            stats.badges.push(badge.id().to_string());
            new_badges.push(badge);
        }
    }
    new_badges
}

/// True when every enabled platform with recorded usage stayed strictly
/// under its daily limit.
pub fn under_daily_limits(stats: &Stats, settings: &Settings) -> bool {
    stats
        .daily_usage
        .iter()
        .all(|(platform, seconds)| match settings.platforms.get(platform) {
            Some(config) if config.enabled => seconds / 60 < u64::from(config.daily_limit),
            _ => true,
        })
}

/// What a day rollover did to the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct DayRollover {
    pub streak_extended: bool,
    pub new_badges: Vec<Badge>,
}

/// Rolls the stats record over to `today`.
///
/// Returns `None` when the record already carries today's date. Streak
/// bookkeeping runs against yesterday's usage before the counters clear, and
/// badge thresholds see the already-incremented streak.
pub fn roll_over_day(stats: &mut Stats, settings: &Settings, today: NaiveDate) -> Option<DayRollover> {
    if stats.last_reset_date == today {
        return None;
    }

    let rollover = if under_daily_limits(stats, settings) {
        stats.current_streak += 1;
        stats.longest_streak = stats.longest_streak.max(stats.current_streak);
        DayRollover {
            streak_extended: true,
            new_badges: award_points(stats, STREAK_BONUS_POINTS),
        }
    } else {
        stats.current_streak = 0;
        DayRollover {
            streak_extended: false,
            new_badges: Vec::new(),
        }
    };

    stats.daily_usage.clear();
    stats.last_reset_date = today;
    Some(rollover)
}
