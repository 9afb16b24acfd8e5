use std::collections::BTreeMap;

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};

/// The persisted `stats` record. Usage counters are seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Stats {
    /// Seconds spent per platform since the last daily reset.
    pub daily_usage: BTreeMap<String, u64>,
    /// Seconds spent per platform in the current browsing session.
    pub session_usage: BTreeMap<String, u64>,
    pub total_points: u64,
    pub current_streak: u32,
    pub longest_streak: u32,
    /// Badge ids in award order. Append-only, each id at most once.
    pub badges: Vec<String>,
    /// Local calendar day the daily counters were last cleared.
    pub last_reset_date: NaiveDate,
}

impl Default for Stats {
    fn default() -> Self {
        Self {
            daily_usage: BTreeMap::new(),
            session_usage: BTreeMap::new(),
            total_points: 0,
            current_streak: 0,
            longest_streak: 0,
            badges: Vec::new(),
            last_reset_date: Local::now().date_naive(),
        }
    }
}

impl Stats {
    pub fn has_badge(&self, id: &str) -> bool {
        self.badges.iter().any(|earned| earned == id)
    }
}
