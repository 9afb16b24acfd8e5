//! Background coordinator for a social-media detox browser extension:
//! usage tracking, session/daily limit enforcement, focus mode, and a small
//! points/streak/badge rewards ledger. The embedding browser is reached
//! through the [`browser::TabHost`] and [`browser::NotificationSink`] traits;
//! everything else lives in here.

mod tracking;

pub mod browser;
pub mod bus;
pub mod coordinator;
pub mod focus;
pub mod limits;
pub mod platform;
pub mod rewards;
pub mod settings;
pub mod stats;
pub mod store;

pub use browser::{Notification, NotificationSink, TabHost, TabId, TabInfo, TabNotice};
pub use bus::{CustomSite, Reply, Request, RequestError, Response};
pub use coordinator::{BlockReason, BrowserEvent, UsageCoordinator};
pub use focus::FocusState;
pub use settings::{PlatformConfig, Settings};
pub use stats::Stats;
pub use store::StateStore;
