//! Tauri implementation of the browser host
//!
//! Child views are `WebviewWindow`s labelled `harvest-<n>`. Load and
//! destroy events are forwarded to the harvester; script results come back
//! through the [`PageBridge`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tauri::webview::PageLoadEvent;
use tauri::{AppHandle, WebviewUrl, WebviewWindow, WebviewWindowBuilder, WindowEvent};
use tokio::sync::mpsc;

use crate::bridge::{report_script, PageBridge};
use crate::harvest::{
    find_cookie, BrowserHost, BrowserView, HostError, OpenedView, ViewEvent, ViewOptions,
};

/// Label prefix of harvest windows, matched by the remote IPC capability
pub const HARVEST_LABEL_PREFIX: &str = "harvest-";

pub struct TauriHost {
    app: AppHandle,
    bridge: Arc<PageBridge>,
    eval_timeout: Duration,
    next_view: AtomicU64,
}

impl TauriHost {
    pub fn new(app: AppHandle, bridge: Arc<PageBridge>, eval_timeout: Duration) -> Self {
        Self {
            app,
            bridge,
            eval_timeout,
            next_view: AtomicU64::new(1),
        }
    }
}

#[async_trait]
impl BrowserHost for TauriHost {
    async fn open_view(&self, options: ViewOptions) -> Result<OpenedView, HostError> {
        let url = url::Url::parse(&options.url)
            .map_err(|e| HostError::ViewCreation(format!("invalid address: {}", e)))?;
        let label = format!(
            "{}{}",
            HARVEST_LABEL_PREFIX,
            self.next_view.fetch_add(1, Ordering::Relaxed)
        );

        let (tx, events) = mpsc::unbounded_channel();
        let load_tx = tx.clone();

        let window = WebviewWindowBuilder::new(&self.app, &label, WebviewUrl::External(url))
            .title(&options.title)
            .inner_size(options.width, options.height)
            .on_page_load(move |_window, payload| {
                if let PageLoadEvent::Finished = payload.event() {
                    let _ = load_tx.send(ViewEvent::LoadFinished);
                }
            })
            .build()
            .map_err(|e| HostError::ViewCreation(e.to_string()))?;

        window.on_window_event(move |event| {
            if let WindowEvent::Destroyed = event {
                let _ = tx.send(ViewEvent::Closed);
            }
        });

        window
            .show()
            .map_err(|e| HostError::ViewCreation(e.to_string()))?;

        tracing::debug!("Opened harvest window '{}'", label);

        Ok(OpenedView {
            view: Arc::new(TauriView {
                window,
                bridge: Arc::clone(&self.bridge),
                eval_timeout: self.eval_timeout,
            }),
            events,
        })
    }
}

struct TauriView {
    window: WebviewWindow,
    bridge: Arc<PageBridge>,
    eval_timeout: Duration,
}

#[async_trait]
impl BrowserView for TauriView {
    fn label(&self) -> String {
        self.window.label().to_string()
    }

    async fn cookie(&self, domain: &str, name: &str) -> Result<Option<String>, HostError> {
        let window = self.window.clone();
        let domain = domain.to_string();
        let name = name.to_string();

        // Reading the cookie store waits on the main thread
        tauri::async_runtime::spawn_blocking(move || {
            let cookies = window
                .cookies()
                .map_err(|e| HostError::CookieStore(e.to_string()))?;
            Ok::<_, HostError>(find_cookie(
                cookies.iter().map(|c| (c.name(), c.domain(), c.value())),
                &domain,
                &name,
            ))
        })
        .await
        .map_err(|e| HostError::CookieStore(e.to_string()))?
    }

    async fn eval(&self, expression: &str) -> Result<Option<String>, HostError> {
        let pending = self.bridge.register(self.window.label());
        let script = report_script(pending.id(), expression);

        self.window
            .eval(&script)
            .map_err(|e| HostError::Script(e.to_string()))?;

        match tokio::time::timeout(self.eval_timeout, pending.recv()).await {
            Ok(Some(value)) => Ok(value),
            Ok(None) => Err(HostError::ViewClosed),
            Err(_) => Err(HostError::Script("page did not answer".into())),
        }
    }

    fn close(&self) -> Result<(), HostError> {
        self.window.close().map_err(|_| HostError::ViewClosed)
    }
}
