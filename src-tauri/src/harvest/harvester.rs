//! Credential harvester - Drives one child view until both values are captured
//!
//! Every harvest runs as its own task. The task owns the session record,
//! the view, the poll timer and the in-flight lookups; lookups are producers
//! that report back into the task, which is the only writer of the record.
//! At most one lookup of each kind is in flight; a tick that finds one still
//! pending skips that kind.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::base::{HarvestError, HarvestOutcome, HarvestStatus};
use super::host::{BrowserHost, BrowserView, ViewEvent, ViewOptions};
use super::messages::{AbortReason, DataGrabbed, HarvestAborted, OutboundEvent};
use super::session::{Applied, HarvestSession, Lookup};
use crate::security::Sanitizer;

/// Tunables for harvest sessions
#[derive(Debug, Clone, PartialEq)]
pub struct HarvestSettings {
    /// Time between poll ticks
    pub poll_interval: Duration,
    /// Name of the session cookie
    pub session_cookie: String,
    /// Expression yielding the CSRF token in the page
    pub token_expression: String,
    /// Child window title
    pub window_title: String,
    /// Child window width
    pub window_width: f64,
    /// Child window height
    pub window_height: f64,
    /// Give up after this long; `None` polls until the view is closed
    pub timeout: Option<Duration>,
    /// Send a `sharelatex-harvest-aborted` event when a harvest ends empty
    pub notify_on_abort: bool,
}

impl Default for HarvestSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(300),
            session_cookie: "sharelatex.sid".to_string(),
            token_expression: "window.csrfToken".to_string(),
            window_title: "Sign in".to_string(),
            window_width: 960.0,
            window_height: 540.0,
            timeout: None,
            notify_on_abort: false,
        }
    }
}

/// Channel back to the window that asked for the harvest
pub trait CompletionSink: Send + Sync {
    fn send(&self, event: OutboundEvent) -> Result<(), HarvestError>;
}

/// [`CompletionSink`] over an in-process channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<OutboundEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<OutboundEvent>) -> Self {
        Self { tx }
    }

    /// Creates a sink and the receiver it feeds
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<OutboundEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl CompletionSink for ChannelSink {
    fn send(&self, event: OutboundEvent) -> Result<(), HarvestError> {
        self.tx
            .send(event)
            .map_err(|_| HarvestError::Sink("requester channel closed".into()))
    }
}

/// Opens child views and spawns one session task per request
pub struct CredentialHarvester {
    host: Arc<dyn BrowserHost>,
    settings: Arc<HarvestSettings>,
    next_id: AtomicU64,
}

impl CredentialHarvester {
    pub fn new(host: Arc<dyn BrowserHost>, settings: HarvestSettings) -> Self {
        Self {
            host,
            settings: Arc::new(settings),
            next_id: AtomicU64::new(1),
        }
    }

    /// Opens a view at `target_url` and starts harvesting from it
    ///
    /// Returns once the view is open; the credentials reach `sink` later,
    /// at most once. Must be called inside a tokio runtime.
    pub async fn start_harvest(
        &self,
        target_url: &str,
        sink: Arc<dyn CompletionSink>,
    ) -> Result<HarvestHandle, HarvestError> {
        if target_url.trim().is_empty() {
            return Err(HarvestError::EmptyTargetUrl);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let opened = self
            .host
            .open_view(ViewOptions {
                url: target_url.to_string(),
                title: self.settings.window_title.clone(),
                width: self.settings.window_width,
                height: self.settings.window_height,
            })
            .await?;

        tracing::info!(
            "Harvest {} started in view '{}' for {}",
            id,
            opened.view.label(),
            Sanitizer::sanitize_url(target_url)
        );

        let session = HarvestSession::new(target_url);
        if session.cookie_domain().is_none() {
            tracing::warn!(
                "Harvest {}: no host in target URL, cookie lookups disabled",
                id
            );
        }

        let (status_tx, status_rx) = watch::channel(HarvestStatus::WaitingForLoad);
        let cancel = CancellationToken::new();

        let task = SessionTask {
            id,
            session,
            view: ViewGuard::new(opened.view),
            events: opened.events,
            sink,
            settings: Arc::clone(&self.settings),
            status: status_tx,
            cancel: cancel.clone(),
        };

        Ok(HarvestHandle {
            id,
            target_url: target_url.to_string(),
            status: status_rx,
            cancel,
            join: tokio::spawn(task.run()),
        })
    }
}

/// Caller-side handle to a running harvest
#[derive(Debug)]
pub struct HarvestHandle {
    id: u64,
    target_url: String,
    status: watch::Receiver<HarvestStatus>,
    cancel: CancellationToken,
    join: JoinHandle<HarvestOutcome>,
}

impl HarvestHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn target_url(&self) -> &str {
        &self.target_url
    }

    /// Current lifecycle status
    pub fn status(&self) -> HarvestStatus {
        *self.status.borrow()
    }

    /// A receiver that observes every status change
    pub fn subscribe(&self) -> watch::Receiver<HarvestStatus> {
        self.status.clone()
    }

    /// Stops the harvest; the session closes its own view and reports nothing
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Waits for the session to end
    pub async fn wait(self) -> Result<HarvestOutcome, HarvestError> {
        Ok(self.join.await?)
    }
}

/// Exclusive ownership of the child view
///
/// Closes the view at most once. A view the user closed is never closed
/// again, and a guard dropped while still open closes it.
struct ViewGuard {
    view: Arc<dyn BrowserView>,
    closed: bool,
}

impl ViewGuard {
    fn new(view: Arc<dyn BrowserView>) -> Self {
        Self {
            view,
            closed: false,
        }
    }

    fn handle(&self) -> Arc<dyn BrowserView> {
        Arc::clone(&self.view)
    }

    fn mark_closed(&mut self) {
        self.closed = true;
    }

    fn close_once(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.view.close() {
            tracing::debug!("Closing view '{}' failed: {}", self.view.label(), e);
        }
    }
}

impl Drop for ViewGuard {
    fn drop(&mut self) {
        self.close_once();
    }
}

/// Fixed-interval poll timer, alive only while polling
struct PollTimer {
    interval: Interval,
    ticks: u64,
}

impl PollTimer {
    /// First tick fires one period after start
    fn start(period: Duration) -> Self {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval, ticks: 0 }
    }

    async fn tick(&mut self) -> u64 {
        self.interval.tick().await;
        self.ticks += 1;
        self.ticks
    }
}

/// Slot for the single in-flight lookup of one kind
///
/// Dropping the slot aborts the lookup.
struct LookupSlot {
    tasks: JoinSet<Lookup>,
}

impl LookupSlot {
    fn new() -> Self {
        Self {
            tasks: JoinSet::new(),
        }
    }

    fn is_busy(&self) -> bool {
        !self.tasks.is_empty()
    }

    /// Starts `lookup` unless one is still pending; false if skipped
    fn start<F>(&mut self, lookup: F) -> bool
    where
        F: std::future::Future<Output = Lookup> + Send + 'static,
    {
        if self.is_busy() {
            return false;
        }
        self.tasks.spawn(lookup);
        true
    }

    /// Resolves when the pending lookup settles; never resolves while idle
    async fn settled(&mut self) -> Result<Lookup, JoinError> {
        match self.tasks.join_next().await {
            Some(joined) => joined,
            None => std::future::pending().await,
        }
    }
}

async fn deadline_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Why the poll loop stopped
enum Exit {
    Completed(DataGrabbed),
    Closed,
    Cancelled,
    TimedOut,
}

struct SessionTask {
    id: u64,
    session: HarvestSession,
    view: ViewGuard,
    events: mpsc::UnboundedReceiver<ViewEvent>,
    sink: Arc<dyn CompletionSink>,
    settings: Arc<HarvestSettings>,
    status: watch::Sender<HarvestStatus>,
    cancel: CancellationToken,
}

impl SessionTask {
    async fn run(mut self) -> HarvestOutcome {
        let deadline = self.settings.timeout.map(|t| Instant::now() + t);

        let exit = match self.wait_for_load(deadline).await {
            Some(exit) => exit,
            None => self.poll(deadline).await,
        };

        self.finish(exit)
    }

    /// Blocks until the first page load finishes; `Some` if the session ended first
    async fn wait_for_load(&mut self, deadline: Option<Instant>) -> Option<Exit> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Some(Exit::Cancelled),
            event = self.events.recv() => match event {
                Some(ViewEvent::LoadFinished) => None,
                Some(ViewEvent::Closed) | None => Some(Exit::Closed),
            },
            _ = deadline_elapsed(deadline) => Some(Exit::TimedOut),
        }
    }

    /// Runs the poll loop; timer and lookups are dropped on return
    async fn poll(&mut self, deadline: Option<Instant>) -> Exit {
        self.status.send_replace(HarvestStatus::Polling);
        tracing::debug!("Harvest {}: page loaded, polling", self.id);

        let mut timer = PollTimer::start(self.settings.poll_interval);
        let mut cookie = LookupSlot::new();
        let mut token = LookupSlot::new();

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Exit::Cancelled,
                event = self.events.recv() => match event {
                    Some(ViewEvent::LoadFinished) => {
                        tracing::debug!("Harvest {}: page navigated", self.id);
                    }
                    Some(ViewEvent::Closed) | None => return Exit::Closed,
                },
                joined = cookie.settled() => {
                    if let Some(data) = self.settle(joined) {
                        return Exit::Completed(data);
                    }
                }
                joined = token.settled() => {
                    if let Some(data) = self.settle(joined) {
                        return Exit::Completed(data);
                    }
                }
                tick = timer.tick() => self.issue_lookups(tick, &mut cookie, &mut token),
                _ = deadline_elapsed(deadline) => return Exit::TimedOut,
            }
        }
    }

    /// Starts both lookups for one tick without waiting on either
    fn issue_lookups(&self, tick: u64, cookie: &mut LookupSlot, token: &mut LookupSlot) {
        tracing::trace!("Harvest {}: tick {}", self.id, tick);

        if let Some(domain) = self.session.cookie_domain() {
            let view = self.view.handle();
            let domain = domain.to_string();
            let name = self.settings.session_cookie.clone();
            let started = cookie
                .start(async move { Lookup::SessionId(view.cookie(&domain, &name).await) });
            if !started {
                tracing::trace!("Harvest {}: cookie lookup still pending", self.id);
            }
        }

        let view = self.view.handle();
        let expression = self.settings.token_expression.clone();
        let started = token.start(async move { Lookup::CsrfToken(view.eval(&expression).await) });
        if !started {
            tracing::trace!("Harvest {}: token lookup still pending", self.id);
        }
    }

    fn settle(&mut self, joined: Result<Lookup, JoinError>) -> Option<DataGrabbed> {
        match joined {
            Ok(lookup) => self.reduce(lookup),
            Err(e) => {
                tracing::debug!("Harvest {}: lookup task failed: {}", self.id, e);
                None
            }
        }
    }

    /// Folds a lookup into the record and checks the completion predicate
    fn reduce(&mut self, lookup: Lookup) -> Option<DataGrabbed> {
        let field = match &lookup {
            Lookup::SessionId(_) => "session cookie",
            Lookup::CsrfToken(_) => "csrf token",
        };
        if let Lookup::SessionId(Err(e)) | Lookup::CsrfToken(Err(e)) = &lookup {
            tracing::debug!("Harvest {}: {} lookup failed: {}", self.id, field, e);
        }

        if self.session.apply(lookup) == Applied::Captured {
            tracing::debug!("Harvest {}: captured {}", self.id, field);
        }

        self.session.try_complete()
    }

    fn finish(mut self, exit: Exit) -> HarvestOutcome {
        let partial = self.session.progress();

        let outcome = match exit {
            Exit::Completed(data) => {
                tracing::info!(
                    "Harvest {} completed (sid {}, token {})",
                    self.id,
                    Sanitizer::sanitize_token(&data.sid),
                    Sanitizer::sanitize_token(&data.csrf_token)
                );
                if let Err(e) = self.sink.send(OutboundEvent::DataGrabbed(data.clone())) {
                    tracing::warn!("Harvest {}: {}", self.id, e);
                }
                self.view.close_once();
                HarvestOutcome::Completed(data)
            }
            Exit::Closed => {
                tracing::info!("Harvest {}: view closed before completion", self.id);
                self.view.mark_closed();
                self.notify_abort(AbortReason::WindowClosed);
                HarvestOutcome::Closed { partial }
            }
            Exit::Cancelled => {
                tracing::info!("Harvest {} cancelled", self.id);
                self.view.close_once();
                self.notify_abort(AbortReason::Cancelled);
                HarvestOutcome::Cancelled { partial }
            }
            Exit::TimedOut => {
                tracing::warn!("Harvest {} timed out", self.id);
                self.view.close_once();
                self.notify_abort(AbortReason::TimedOut);
                HarvestOutcome::TimedOut { partial }
            }
        };

        self.status.send_replace(outcome.status());
        outcome
    }

    fn notify_abort(&self, reason: AbortReason) {
        if !self.settings.notify_on_abort {
            return;
        }
        let event = OutboundEvent::HarvestAborted(HarvestAborted { reason });
        if let Err(e) = self.sink.send(event) {
            tracing::debug!("Harvest {}: {}", self.id, e);
        }
    }
}
