use chrono::{DateTime, Duration, Utc};

use crate::settings::Settings;

/// Focus window applied when the toggle carries no duration, in minutes.
pub const DEFAULT_FOCUS_MINUTES: u32 = 60;

/// Focus-mode state as seen through lazy expiry: an elapsed deadline is
/// indistinguishable from the mode never having been on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusState {
    Inactive,
    Active { until: DateTime<Utc> },
}

impl FocusState {
    /// Collapses an expired or inconsistent `(focus_mode, focus_until)` pair
    /// to `Inactive`. All readers go through this.
    pub fn effective(
        focus_mode: bool,
        focus_until: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        match (focus_mode, focus_until) {
            (true, Some(until)) if now < until => FocusState::Active { until },
            _ => FocusState::Inactive,
        }
    }

    pub fn of(settings: &Settings, now: DateTime<Utc>) -> Self {
        Self::effective(settings.focus_mode, settings.focus_until, now)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, FocusState::Active { .. })
    }

    pub fn until(&self) -> Option<DateTime<Utc>> {
        match self {
            FocusState::Active { until } => Some(*until),
            FocusState::Inactive => None,
        }
    }

    /// Deadline of a focus window opened at `now`.
    pub fn window(now: DateTime<Utc>, duration_minutes: u32) -> DateTime<Utc> {
        now + Duration::minutes(i64::from(duration_minutes))
    }
}
