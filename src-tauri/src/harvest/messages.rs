//! IPC messages exchanged with the requesting window

use serde::{Deserialize, Serialize};

/// Event name carrying harvested credentials
pub const DATA_GRABBED_EVENT: &str = "sharelatex-data-grabbed";

/// Event name for a harvest that ended without credentials
pub const HARVEST_ABORTED_EVENT: &str = "sharelatex-harvest-aborted";

/// Requests accepted from the main window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command")]
pub enum InboundRequest {
    /// Open a child window at `target_url` and harvest its session
    #[serde(rename = "open-new-window", rename_all = "camelCase")]
    OpenNewWindow { target_url: String },
}

/// Credentials captured from the target page
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataGrabbed {
    /// Value of the session cookie
    pub sid: String,
    /// Value of `window.csrfToken`
    #[serde(rename = "csrfToken")]
    pub csrf_token: String,
}

impl DataGrabbed {
    pub fn new(sid: impl Into<String>, csrf_token: impl Into<String>) -> Self {
        Self {
            sid: sid.into(),
            csrf_token: csrf_token.into(),
        }
    }
}

impl std::fmt::Debug for DataGrabbed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataGrabbed")
            .field("sid", &crate::security::Sanitizer::sanitize_token(&self.sid))
            .field(
                "csrf_token",
                &crate::security::Sanitizer::sanitize_token(&self.csrf_token),
            )
            .finish()
    }
}

/// Why a harvest ended without credentials
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AbortReason {
    WindowClosed,
    Cancelled,
    TimedOut,
}

/// Payload of [`HARVEST_ABORTED_EVENT`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestAborted {
    pub reason: AbortReason,
}

/// Events sent back to the requester
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum OutboundEvent {
    #[serde(rename = "sharelatex-data-grabbed")]
    DataGrabbed(DataGrabbed),
    #[serde(rename = "sharelatex-harvest-aborted")]
    HarvestAborted(HarvestAborted),
}

impl OutboundEvent {
    /// Returns the IPC event name
    pub fn name(&self) -> &'static str {
        match self {
            Self::DataGrabbed(_) => DATA_GRABBED_EVENT,
            Self::HarvestAborted(_) => HARVEST_ABORTED_EVENT,
        }
    }
}
