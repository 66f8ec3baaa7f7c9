//! Scripted browser host used by the harvest tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::base::HostError;
use super::host::{BrowserHost, BrowserView, OpenedView, ViewEvent, ViewOptions};

/// What one lookup call does
#[derive(Debug, Clone)]
pub enum Step {
    /// Resolve immediately
    Ready(Result<Option<String>, HostError>),
    /// Resolve after a delay
    Delayed(Duration, Result<Option<String>, HostError>),
    /// Never resolve
    Pending,
}

impl Step {
    pub fn value(v: &str) -> Self {
        Self::Ready(Ok(Some(v.to_string())))
    }

    pub fn fail() -> Self {
        Self::Ready(Err(HostError::Script("page navigated".into())))
    }

    async fn play(self) -> Result<Option<String>, HostError> {
        match self {
            Self::Ready(result) => result,
            Self::Delayed(delay, result) => {
                tokio::time::sleep(delay).await;
                result
            }
            Self::Pending => std::future::pending().await,
        }
    }
}

/// Per-call script: `steps[n]` for call n, `default` afterwards
#[derive(Debug)]
struct Script {
    steps: Vec<Step>,
    default: Step,
}

impl Script {
    fn empty() -> Self {
        Self {
            steps: Vec::new(),
            default: Step::Ready(Ok(None)),
        }
    }

    fn step(&self, call: usize) -> Step {
        self.steps.get(call).unwrap_or(&self.default).clone()
    }
}

/// Counts calls currently running and the highest count seen
#[derive(Debug, Default)]
struct InFlight {
    now: AtomicUsize,
    peak: AtomicUsize,
}

impl InFlight {
    fn enter(&self) -> InFlightGuard<'_> {
        let now = self.now.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        InFlightGuard(self)
    }
}

/// Leaves the count when the call settles or is aborted
struct InFlightGuard<'a>(&'a InFlight);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.now.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug)]
pub struct FakeView {
    label: String,
    cookie_script: Mutex<Script>,
    eval_script: Mutex<Script>,
    cookie_queries: Mutex<Vec<(String, String)>>,
    expressions: Mutex<Vec<String>>,
    cookie_calls: AtomicUsize,
    eval_calls: AtomicUsize,
    close_calls: AtomicUsize,
    cookies_in_flight: InFlight,
    evals_in_flight: InFlight,
}

impl FakeView {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            label: "harvest-test".to_string(),
            cookie_script: Mutex::new(Script::empty()),
            eval_script: Mutex::new(Script::empty()),
            cookie_queries: Mutex::new(Vec::new()),
            expressions: Mutex::new(Vec::new()),
            cookie_calls: AtomicUsize::new(0),
            eval_calls: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
            cookies_in_flight: InFlight::default(),
            evals_in_flight: InFlight::default(),
        })
    }

    pub fn with_cookie(self: Arc<Self>, steps: Vec<Step>, default: Step) -> Arc<Self> {
        *self.cookie_script.lock().unwrap() = Script { steps, default };
        self
    }

    pub fn with_eval(self: Arc<Self>, steps: Vec<Step>, default: Step) -> Arc<Self> {
        *self.eval_script.lock().unwrap() = Script { steps, default };
        self
    }

    pub fn cookie_calls(&self) -> usize {
        self.cookie_calls.load(Ordering::SeqCst)
    }

    pub fn eval_calls(&self) -> usize {
        self.eval_calls.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    /// Cookie lookups running right now
    pub fn cookies_in_flight(&self) -> usize {
        self.cookies_in_flight.now.load(Ordering::SeqCst)
    }

    /// Most cookie lookups ever running at once
    pub fn peak_cookies_in_flight(&self) -> usize {
        self.cookies_in_flight.peak.load(Ordering::SeqCst)
    }

    /// Most evaluations ever running at once
    pub fn peak_evals_in_flight(&self) -> usize {
        self.evals_in_flight.peak.load(Ordering::SeqCst)
    }

    /// Distinct `(domain, name)` pairs queried
    pub fn cookie_queries(&self) -> Vec<(String, String)> {
        let mut queries = self.cookie_queries.lock().unwrap().clone();
        queries.dedup();
        queries
    }

    /// Distinct expressions evaluated
    pub fn expressions(&self) -> Vec<String> {
        let mut expressions = self.expressions.lock().unwrap().clone();
        expressions.dedup();
        expressions
    }
}

#[async_trait]
impl BrowserView for FakeView {
    fn label(&self) -> String {
        self.label.clone()
    }

    async fn cookie(&self, domain: &str, name: &str) -> Result<Option<String>, HostError> {
        let call = self.cookie_calls.fetch_add(1, Ordering::SeqCst);
        self.cookie_queries
            .lock()
            .unwrap()
            .push((domain.to_string(), name.to_string()));
        let step = self.cookie_script.lock().unwrap().step(call);
        let _running = self.cookies_in_flight.enter();
        step.play().await
    }

    async fn eval(&self, expression: &str) -> Result<Option<String>, HostError> {
        let call = self.eval_calls.fetch_add(1, Ordering::SeqCst);
        self.expressions.lock().unwrap().push(expression.to_string());
        let step = self.eval_script.lock().unwrap().step(call);
        let _running = self.evals_in_flight.enter();
        step.play().await
    }

    fn close(&self) -> Result<(), HostError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out prepared views in order
#[derive(Default)]
pub struct FakeHost {
    views: Mutex<VecDeque<(Arc<FakeView>, mpsc::UnboundedReceiver<ViewEvent>)>>,
    opened: Mutex<Vec<ViewOptions>>,
}

impl FakeHost {
    /// Queues a view; the returned sender plays the host's lifecycle events
    pub fn add_view(&self, view: Arc<FakeView>) -> mpsc::UnboundedSender<ViewEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.views.lock().unwrap().push_back((view, rx));
        tx
    }

    pub fn opened(&self) -> Vec<ViewOptions> {
        self.opened.lock().unwrap().clone()
    }
}

#[async_trait]
impl BrowserHost for FakeHost {
    async fn open_view(&self, options: ViewOptions) -> Result<OpenedView, HostError> {
        self.opened.lock().unwrap().push(options);
        let (view, events) = self
            .views
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| HostError::ViewCreation("no view prepared".into()))?;
        Ok(OpenedView { view, events })
    }
}
