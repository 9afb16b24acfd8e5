use crate::settings::PlatformConfig;

/// One-shot warning tiers along the daily limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageWarning {
    SeventyFivePercent,
    NinetyPercent,
}

impl UsageWarning {
    pub fn message(&self) -> &'static str {
        match self {
            UsageWarning::SeventyFivePercent => "75% of daily limit reached",
            UsageWarning::NinetyPercent => "90% of daily limit reached",
        }
    }
}

/// Outcome of evaluating one usage tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub warning: Option<UsageWarning>,
    pub block: bool,
}

/// Checks current usage against a platform's limits.
///
/// Warnings use exact-minute equality: one fires only on the tick that
/// completes the minute equal to floor(0.75 * limit) or floor(0.9 * limit).
/// A counter jump past that minute between evaluations skips the warning
/// entirely; that is the intended semantics, not hysteresis.
///
/// Blocking is level-triggered and keeps firing every tick while the
/// condition holds, unless the emergency override is set.
pub fn evaluate(
    session_seconds: u64,
    daily_seconds: u64,
    limits: &PlatformConfig,
    emergency_override: bool,
) -> Evaluation {
    let session_minutes = session_seconds / 60;
    let daily_minutes = daily_seconds / 60;

    let minute_completed = daily_seconds > 0 && daily_seconds % 60 == 0;
    let warning = if minute_completed && daily_minutes == warning_minute(limits.daily_limit, 0.75) {
        Some(UsageWarning::SeventyFivePercent)
    } else if minute_completed && daily_minutes == warning_minute(limits.daily_limit, 0.9) {
        Some(UsageWarning::NinetyPercent)
    } else {
        None
    };

    let block = !emergency_override
        && (session_minutes >= u64::from(limits.session_limit)
            || daily_minutes >= u64::from(limits.daily_limit));

    Evaluation { warning, block }
}

fn warning_minute(daily_limit: u32, fraction: f64) -> u64 {
    (f64::from(daily_limit) * fraction).floor() as u64
}
