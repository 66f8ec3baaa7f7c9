//! Tauri IPC Commands
//!
//! Commands the main window uses to start and observe harvests, plus the
//! callback harvest pages use to report script values.

use std::sync::Arc;

use tauri::{AppHandle, Emitter, State, WebviewWindow};

use super::AppState;
use crate::harvest::{CompletionSink, HarvestError, InboundRequest, OutboundEvent, SessionInfo};

/// Emits harvest events to the webview that asked for them
struct WebviewSink {
    app: AppHandle,
    label: String,
}

impl CompletionSink for WebviewSink {
    fn send(&self, event: OutboundEvent) -> Result<(), HarvestError> {
        let name = event.name();
        let result = match event {
            OutboundEvent::DataGrabbed(payload) => {
                self.app.emit_to(self.label.as_str(), name, payload)
            }
            OutboundEvent::HarvestAborted(payload) => {
                self.app.emit_to(self.label.as_str(), name, payload)
            }
        };
        result.map_err(|e| HarvestError::Sink(e.to_string()))
    }
}

async fn start(
    app: AppHandle,
    requester: &WebviewWindow,
    state: &AppState,
    target_url: &str,
) -> Result<u64, String> {
    let sink = Arc::new(WebviewSink {
        app,
        label: requester.label().to_string(),
    });
    state
        .manager
        .start(target_url, sink)
        .await
        .map_err(|e| e.to_string())
}

/// Opens a sign-in window and harvests its session for the caller
#[tauri::command]
pub async fn open_new_window(
    app: AppHandle,
    webview: WebviewWindow,
    state: State<'_, AppState>,
    target_url: String,
) -> Result<u64, String> {
    start(app, &webview, &state, &target_url).await
}

/// Accepts the `{ command, ... }` request envelope
#[tauri::command]
pub async fn shell_request(
    app: AppHandle,
    webview: WebviewWindow,
    state: State<'_, AppState>,
    request: InboundRequest,
) -> Result<u64, String> {
    match request {
        InboundRequest::OpenNewWindow { target_url } => {
            start(app, &webview, &state, &target_url).await
        }
    }
}

/// Receives the value of an injected evaluation from the view it ran in
#[tauri::command]
pub fn report_page_value(
    webview: WebviewWindow,
    state: State<'_, AppState>,
    request_id: u64,
    value: Option<String>,
) -> bool {
    state.bridge.resolve(request_id, webview.label(), value)
}

/// Lists harvest sessions still tracked
#[tauri::command]
pub async fn harvest_status(state: State<'_, AppState>) -> Result<Vec<SessionInfo>, String> {
    state.manager.prune().await;
    Ok(state.manager.sessions().await)
}

/// Cancels a harvest by id
#[tauri::command]
pub async fn cancel_harvest(state: State<'_, AppState>, id: u64) -> Result<bool, String> {
    Ok(state.manager.cancel(id).await)
}
