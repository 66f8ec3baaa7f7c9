//! Harvest session record
//!
//! Holds what one session has captured so far and the completion guard.
//! Only the owning session task mutates it, so the check-and-set in
//! [`HarvestSession::try_complete`] is a single step with no interleaving.

use zeroize::Zeroize;

use super::base::{HostError, PartialProgress};
use super::messages::DataGrabbed;
use crate::security::SecureString;

/// Partial or full credential captured from the target page
#[derive(Debug, Default, Zeroize)]
pub struct Credential {
    pub session_id: Option<SecureString>,
    pub csrf_token: Option<SecureString>,
}

impl Credential {
    /// Returns true once both values are present and non-empty
    pub fn is_complete(&self) -> bool {
        matches!(&self.session_id, Some(v) if !v.is_empty())
            && matches!(&self.csrf_token, Some(v) if !v.is_empty())
    }
}

/// Result of one lookup, tagged with the field it feeds
#[derive(Debug)]
pub enum Lookup {
    SessionId(Result<Option<String>, HostError>),
    CsrfToken(Result<Option<String>, HostError>),
}

/// How a lookup result changed the record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The field was empty and is now set
    Captured,
    /// The field was already set, or the session is finished
    Ignored,
    /// Empty value or no match yet
    Empty,
    /// The lookup failed; absorbed until the next tick
    Failed,
}

/// State of a single harvest request
#[derive(Debug)]
pub struct HarvestSession {
    target_url: String,
    cookie_domain: Option<String>,
    credential: Credential,
    completed: bool,
}

impl HarvestSession {
    /// Creates a session for `target_url`
    ///
    /// The cookie domain is the host of the URL. An address that does not
    /// parse leaves it unset; navigation errors belong to the host.
    pub fn new(target_url: impl Into<String>) -> Self {
        let target_url = target_url.into();
        let cookie_domain = url::Url::parse(&target_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string));

        Self {
            target_url,
            cookie_domain,
            credential: Credential::default(),
            completed: false,
        }
    }

    pub fn target_url(&self) -> &str {
        &self.target_url
    }

    pub fn cookie_domain(&self) -> Option<&str> {
        self.cookie_domain.as_deref()
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn progress(&self) -> PartialProgress {
        PartialProgress {
            has_session_id: self.credential.session_id.is_some(),
            has_csrf_token: self.credential.csrf_token.is_some(),
        }
    }

    /// Folds one lookup result into the record
    ///
    /// First non-empty value wins; later values for the same field are
    /// ignored, as is everything after completion.
    pub fn apply(&mut self, lookup: Lookup) -> Applied {
        if self.completed {
            return Applied::Ignored;
        }

        let (slot, result) = match lookup {
            Lookup::SessionId(result) => (&mut self.credential.session_id, result),
            Lookup::CsrfToken(result) => (&mut self.credential.csrf_token, result),
        };

        match result {
            Err(_) => Applied::Failed,
            Ok(None) => Applied::Empty,
            Ok(Some(value)) if value.is_empty() => Applied::Empty,
            Ok(Some(_)) if slot.is_some() => Applied::Ignored,
            Ok(Some(value)) => {
                *slot = Some(SecureString::new(value));
                Applied::Captured
            }
        }
    }

    /// Completion predicate with its guard
    ///
    /// Returns the payload exactly once: the first call after both fields
    /// became non-empty flips `completed` and every later call gets `None`.
    pub fn try_complete(&mut self) -> Option<DataGrabbed> {
        if self.completed || !self.credential.is_complete() {
            return None;
        }
        self.completed = true;

        let sid = self.credential.session_id.as_deref()?;
        let token = self.credential.csrf_token.as_deref()?;
        Some(DataGrabbed::new(sid, token))
    }
}
