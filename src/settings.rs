use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::platform;

/// Per-platform tracking configuration. Limits are minutes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformConfig {
    pub enabled: bool,
    pub daily_limit: u32,
    pub session_limit: u32,
    pub is_custom: bool,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
}

/// The persisted `settings` record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub platforms: BTreeMap<String, PlatformConfig>,
    pub focus_mode: bool,
    /// Non-null exactly while `focus_mode` is set; readers must treat an
    /// elapsed deadline as `{false, None}`.
    pub focus_until: Option<DateTime<Utc>>,
    pub emergency_override: bool,
    // Presentation flags. The coordinator stores them untouched for the UI.
    pub dark_mode: bool,
    pub notifications_enabled: bool,
    pub motivational_messages: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            platforms: default_platforms(),
            focus_mode: false,
            focus_until: None,
            emergency_override: false,
            dark_mode: false,
            notifications_enabled: true,
            motivational_messages: true,
        }
    }
}

impl Settings {
    /// True when `domain` is a known platform with tracking switched on.
    pub fn platform_enabled(&self, domain: &str) -> bool {
        self.platforms.get(domain).is_some_and(|config| config.enabled)
    }
}

fn default_platforms() -> BTreeMap<String, PlatformConfig> {
    let limits: [(&str, u32, u32); 10] = [
        ("facebook.com", 30, 15),
        ("instagram.com", 45, 20),
        ("twitter.com", 30, 15),
        ("x.com", 30, 15),
        ("tiktok.com", 60, 30),
        ("linkedin.com", 60, 30),
        ("reddit.com", 45, 20),
        ("youtube.com", 120, 60),
        ("snapchat.com", 30, 15),
        ("pinterest.com", 45, 20),
    ];

    limits
        .into_iter()
        .map(|(domain, daily_limit, session_limit)| {
            (
                domain.to_string(),
                PlatformConfig {
                    enabled: true,
                    daily_limit,
                    session_limit,
                    is_custom: false,
                    name: Some(platform::display_name(domain).to_string()),
                    icon: Some(platform::icon(domain).to_string()),
                },
            )
        })
        .collect()
}
