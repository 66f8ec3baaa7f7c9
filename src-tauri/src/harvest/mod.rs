//! Harvest module - Silent session capture from a sign-in window
//!
//! Provides:
//! - The per-request session record and its completion guard
//! - The host traits a windowing backend implements
//! - The harvester task that polls cookie store and page script
//! - A manager tracking concurrent sessions

mod base;
mod harvester;
mod host;
mod manager;
mod messages;
mod session;

#[cfg(test)]
mod testing;

pub use base::{HarvestError, HarvestOutcome, HarvestStatus, HostError, PartialProgress};
pub use harvester::{ChannelSink, CompletionSink, CredentialHarvester, HarvestHandle, HarvestSettings};
pub use host::{
    domain_matches, find_cookie, BrowserHost, BrowserView, OpenedView, ViewEvent, ViewOptions,
};
pub use manager::{HarvestManager, SessionInfo};
pub use messages::{
    AbortReason, DataGrabbed, HarvestAborted, InboundRequest, OutboundEvent, DATA_GRABBED_EVENT,
    HARVEST_ABORTED_EVENT,
};
pub use session::{Credential, HarvestSession};
