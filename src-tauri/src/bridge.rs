//! Page value bridge
//!
//! Webview `eval` does not hand back a result, so the evaluated script
//! reports its value through an IPC command instead. Each evaluation gets
//! a request id bound to the view it was sent to; only that view can
//! resolve the matching waiter.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

/// Command the injected script invokes
pub const REPORT_COMMAND: &str = "report_page_value";

/// One evaluation awaiting its answer
#[derive(Debug)]
struct Waiter {
    label: String,
    tx: oneshot::Sender<Option<String>>,
}

/// Registry of evaluations waiting for a page answer
#[derive(Debug, Default)]
pub struct PageBridge {
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, Waiter>>,
}

/// Waiter for one evaluation; unregisters itself when dropped
#[derive(Debug)]
pub struct PendingValue {
    id: u64,
    bridge: Arc<PageBridge>,
    rx: Option<oneshot::Receiver<Option<String>>>,
}

impl PendingValue {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Waits for the page to report; `None` if the waiter was dropped unanswered
    pub async fn recv(mut self) -> Option<Option<String>> {
        let rx = self.rx.take()?;
        rx.await.ok()
    }
}

impl Drop for PendingValue {
    fn drop(&mut self) {
        self.bridge.forget(self.id);
    }
}

impl PageBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new evaluation in the view labelled `label`
    pub fn register(self: &Arc<Self>, label: &str) -> PendingValue {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = oneshot::channel();
        self.lock().insert(
            id,
            Waiter {
                label: label.to_string(),
                tx,
            },
        );
        PendingValue {
            id,
            bridge: Arc::clone(self),
            rx: Some(rx),
        }
    }

    /// Delivers an answer reported by the view labelled `from`
    ///
    /// False for unknown or expired ids, and for answers from any view other
    /// than the one the evaluation was sent to; those leave the waiter intact.
    pub fn resolve(&self, id: u64, from: &str, value: Option<String>) -> bool {
        let waiter = {
            let mut pending = self.lock();
            match pending.get(&id).map(|waiter| waiter.label == from) {
                Some(true) => pending.remove(&id),
                Some(false) => {
                    tracing::warn!("View '{}' answered evaluation {} of another view", from, id);
                    None
                }
                None => None,
            }
        };

        match waiter {
            Some(waiter) => waiter.tx.send(value).is_ok(),
            None => false,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    fn forget(&self, id: u64) {
        self.lock().remove(&id);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, Waiter>> {
        // A poisoned map only ever holds senders; keep using it
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Builds the script that evaluates `expression` and reports it under `id`
///
/// Falsy values and thrown errors report `null`.
pub fn report_script(id: u64, expression: &str) -> String {
    format!(
        r#"(function () {{
  var value = null;
  try {{ value = ({expression}); }} catch (_) {{ value = null; }}
  window.__TAURI_INTERNALS__.invoke("{command}", {{
    requestId: {id},
    value: value ? String(value) : null
  }});
}})();"#,
        expression = expression,
        command = REPORT_COMMAND,
        id = id,
    )
}
