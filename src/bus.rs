use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::browser::TabId;
use crate::coordinator::UsageCoordinator;
use crate::settings::Settings;
use crate::stats::Stats;

/// User-supplied parameters for a custom tracked site. Unset limits fall
/// back to 60 daily / 30 session minutes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomSite {
    pub domain: String,
    #[serde(default)]
    pub daily_limit: Option<u32>,
    #[serde(default)]
    pub session_limit: Option<u32>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
}

/// Every action the popup/options surfaces can request.
///
/// A closed set: an unknown action fails at deserialization instead of
/// falling through a default arm at dispatch.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Request {
    GetUsageStats,
    GetSettings,
    UpdateSettings { data: Settings },
    AddCustomSite { site_data: CustomSite },
    RemoveCustomSite { domain: String },
    ToggleFocusMode {
        #[serde(default)]
        duration: Option<u32>,
    },
    EmergencyOverride { tab_id: TabId },
    AwardPoints { points: u64, reason: String },
}

/// Successful reply payloads.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Reply {
    Stats(Stats),
    Settings(Settings),
    #[serde(rename_all = "camelCase")]
    FocusMode {
        focus_mode: bool,
        focus_until: Option<DateTime<Utc>>,
    },
    Ack,
}

/// Typed failures surfaced through the bus.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("invalid domain: {0}")]
    InvalidDomain(String),
    #[error("site already exists: {0}")]
    DuplicateSite(String),
    #[error("not a custom site: {0}")]
    NotCustomSite(String),
    #[error("limits must be at least one minute")]
    InvalidLimit,
    #[error("storage failure: {0}")]
    Storage(String),
}

impl From<anyhow::Error> for RequestError {
    fn from(err: anyhow::Error) -> Self {
        RequestError::Storage(format!("{err:#}"))
    }
}

/// Wire-shaped response: `{ success, data | error }`.
#[derive(Debug, Serialize)]
pub struct Response {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Reply>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Result<Reply, RequestError>> for Response {
    fn from(result: Result<Reply, RequestError>) -> Self {
        match result {
            Ok(reply) => Response {
                success: true,
                data: Some(reply),
                error: None,
            },
            Err(err) => Response {
                success: false,
                data: None,
                error: Some(err.to_string()),
            },
        }
    }
}

impl UsageCoordinator {
    /// Dispatches one bus request. Every variant is handled.
    pub async fn handle_request(&self, request: Request) -> Result<Reply, RequestError> {
        match request {
            Request::GetUsageStats => Ok(Reply::Stats(self.usage_stats().await?)),
            Request::GetSettings => Ok(Reply::Settings(self.settings().await)),
            Request::UpdateSettings { data } => {
                self.update_settings(data).await?;
                Ok(Reply::Ack)
            }
            Request::AddCustomSite { site_data } => {
                self.add_custom_site(site_data).await?;
                Ok(Reply::Ack)
            }
            Request::RemoveCustomSite { domain } => {
                self.remove_custom_site(&domain).await?;
                Ok(Reply::Ack)
            }
            Request::ToggleFocusMode { duration } => {
                let state = self.toggle_focus_mode(duration).await?;
                Ok(Reply::FocusMode {
                    focus_mode: state.is_active(),
                    focus_until: state.until(),
                })
            }
            Request::EmergencyOverride { tab_id } => {
                self.activate_emergency_override(tab_id).await?;
                Ok(Reply::Ack)
            }
            Request::AwardPoints { points, reason } => {
                self.award_points(points, &reason).await?;
                Ok(Reply::Ack)
            }
        }
    }

    /// [`UsageCoordinator::handle_request`] adapted to the external
    /// `{ success, data | error }` shape.
    pub async fn respond(&self, request: Request) -> Response {
        Response::from(self.handle_request(request).await)
    }
}
