//! Browser host abstraction
//!
//! The harvester only needs a narrow slice of the windowing host: open a
//! child view, learn when its page finished loading or the view went away,
//! read one cookie, evaluate one expression, and close the view.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::base::HostError;

/// Parameters for a new child view
#[derive(Debug, Clone, PartialEq)]
pub struct ViewOptions {
    /// Address to navigate to
    pub url: String,
    /// Window title
    pub title: String,
    /// Logical width
    pub width: f64,
    /// Logical height
    pub height: f64,
}

/// Lifecycle events reported by a child view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewEvent {
    /// A page finished loading (fires again on later navigations)
    LoadFinished,
    /// The view was destroyed
    Closed,
}

/// A freshly opened view together with its event stream
pub struct OpenedView {
    pub view: Arc<dyn BrowserView>,
    pub events: mpsc::UnboundedReceiver<ViewEvent>,
}

/// Windowing host able to create isolated browser views
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrowserHost: Send + Sync {
    /// Creates, navigates and shows a new child view
    async fn open_view(&self, options: ViewOptions) -> Result<OpenedView, HostError>;
}

/// Handle to one child view
#[async_trait]
pub trait BrowserView: Send + Sync {
    /// Host-assigned label, used for logging
    fn label(&self) -> String;

    /// Looks up a cookie by domain and name in the view's cookie store
    ///
    /// Returns the value of the first matching cookie, or `None`.
    async fn cookie(&self, domain: &str, name: &str) -> Result<Option<String>, HostError>;

    /// Evaluates a script expression in the page context
    ///
    /// Falsy results come back as `None`.
    async fn eval(&self, expression: &str) -> Result<Option<String>, HostError>;

    /// Closes the view
    fn close(&self) -> Result<(), HostError>;
}

/// Returns true if a cookie set for `cookie_domain` is visible under `filter`
///
/// A cookie matches when its domain equals the filter or is a subdomain of
/// it. A leading dot on either side is ignored and comparison is
/// case-insensitive.
pub fn domain_matches(cookie_domain: &str, filter: &str) -> bool {
    let cookie_domain = cookie_domain.trim_start_matches('.').to_ascii_lowercase();
    let filter = filter.trim_start_matches('.').to_ascii_lowercase();

    if filter.is_empty() {
        return false;
    }

    cookie_domain == filter
        || cookie_domain
            .strip_suffix(&filter)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

/// Picks the value of the first cookie named `name` visible under `domain`
///
/// `cookies` yields `(name, domain, value)`; cookies without a domain never
/// match.
pub fn find_cookie<'a, I>(cookies: I, domain: &str, name: &str) -> Option<String>
where
    I: IntoIterator<Item = (&'a str, Option<&'a str>, &'a str)>,
{
    cookies
        .into_iter()
        .find(|(cookie_name, cookie_domain, _)| {
            *cookie_name == name && cookie_domain.is_some_and(|d| domain_matches(d, domain))
        })
        .map(|(_, _, value)| value.to_string())
}
