//! Base types for credential harvesting
//!
//! Errors, lifecycle status and the final outcome of a harvest session.

use thiserror::Error;

use super::messages::DataGrabbed;

/// Errors raised by the browser host
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HostError {
    /// The child view could not be created or shown
    #[error("Failed to open view: {0}")]
    ViewCreation(String),

    /// The cookie store rejected the query
    #[error("Cookie store query failed: {0}")]
    CookieStore(String),

    /// Script evaluation failed or produced no answer in time
    #[error("Script evaluation failed: {0}")]
    Script(String),

    /// The view is already gone
    #[error("View is closed")]
    ViewClosed,
}

/// Errors that can occur when starting or awaiting a harvest
#[derive(Debug, Error)]
pub enum HarvestError {
    /// The requested address was empty
    #[error("Target URL must not be empty")]
    EmptyTargetUrl,

    /// The host failed before polling could begin
    #[error("Browser host error: {0}")]
    Host(#[from] HostError),

    /// The requester channel is gone
    #[error("Failed to notify requester: {0}")]
    Sink(String),

    /// The session task panicked or was aborted
    #[error("Harvest task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Lifecycle status of a harvest session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarvestStatus {
    /// View is open, first page load not finished yet
    WaitingForLoad,
    /// Poll timer is running
    Polling,
    /// Both values captured and reported
    Completed,
    /// User closed the view before completion
    Closed,
    /// Stopped by the caller
    Cancelled,
    /// Gave up after the configured timeout
    TimedOut,
}

impl HarvestStatus {
    /// Returns true while the session still owns a live view
    pub fn is_active(&self) -> bool {
        matches!(self, Self::WaitingForLoad | Self::Polling)
    }
}

/// What was captured before the view went away
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PartialProgress {
    pub has_session_id: bool,
    pub has_csrf_token: bool,
}

/// Final result of a harvest session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HarvestOutcome {
    /// Both values were captured and sent to the requester
    Completed(DataGrabbed),
    /// The view was closed externally before completion
    Closed { partial: PartialProgress },
    /// The caller cancelled the session
    Cancelled { partial: PartialProgress },
    /// The configured timeout elapsed
    TimedOut { partial: PartialProgress },
}

impl HarvestOutcome {
    /// Returns the final status matching this outcome
    pub fn status(&self) -> HarvestStatus {
        match self {
            Self::Completed(_) => HarvestStatus::Completed,
            Self::Closed { .. } => HarvestStatus::Closed,
            Self::Cancelled { .. } => HarvestStatus::Cancelled,
            Self::TimedOut { .. } => HarvestStatus::TimedOut,
        }
    }

    /// Returns the captured credentials if the harvest completed
    pub fn credentials(&self) -> Option<&DataGrabbed> {
        match self {
            Self::Completed(data) => Some(data),
            _ => None,
        }
    }
}
