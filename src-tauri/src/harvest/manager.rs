//! Harvest manager - Tracks concurrent harvest sessions
//!
//! Sessions never share state with each other; the manager only keeps
//! their handles so the shell can list them, cancel them, and stop them all
//! when the application exits.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use super::base::{HarvestError, HarvestOutcome, HarvestStatus};
use super::harvester::{CompletionSink, CredentialHarvester, HarvestHandle};
use crate::security::Sanitizer;

/// Summary of one tracked session
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: u64,
    /// Target URL without query or fragment
    pub target_url: String,
    pub status: String,
    pub started_at: DateTime<Utc>,
}

struct Tracked {
    handle: HarvestHandle,
    started_at: DateTime<Utc>,
}

/// Owns the harvester and the handles of its live sessions
pub struct HarvestManager {
    harvester: CredentialHarvester,
    sessions: RwLock<HashMap<u64, Tracked>>,
}

impl HarvestManager {
    pub fn new(harvester: CredentialHarvester) -> Self {
        Self {
            harvester,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Starts a new harvest and tracks it; returns the session id
    pub async fn start(
        &self,
        target_url: &str,
        sink: Arc<dyn CompletionSink>,
    ) -> Result<u64, HarvestError> {
        self.prune().await;

        let handle = self.harvester.start_harvest(target_url, sink).await?;
        let id = handle.id();
        self.sessions.write().await.insert(
            id,
            Tracked {
                handle,
                started_at: Utc::now(),
            },
        );
        Ok(id)
    }

    /// Drops handles of sessions that have ended
    pub async fn prune(&self) {
        self.sessions
            .write()
            .await
            .retain(|_, tracked| !tracked.handle.is_finished());
    }

    /// Lists tracked sessions, oldest first
    pub async fn sessions(&self) -> Vec<SessionInfo> {
        let sessions = self.sessions.read().await;
        let mut list: Vec<SessionInfo> = sessions
            .values()
            .map(|tracked| SessionInfo {
                id: tracked.handle.id(),
                target_url: Sanitizer::sanitize_url(tracked.handle.target_url()),
                status: format!("{:?}", tracked.handle.status()),
                started_at: tracked.started_at,
            })
            .collect();
        list.sort_by_key(|info| info.id);
        list
    }

    /// Gets the status of a specific session
    pub async fn status(&self, id: u64) -> Option<HarvestStatus> {
        self.sessions
            .read()
            .await
            .get(&id)
            .map(|tracked| tracked.handle.status())
    }

    /// Returns the number of sessions still polling or waiting for load
    pub async fn active_count(&self) -> usize {
        self.sessions
            .read()
            .await
            .values()
            .filter(|tracked| tracked.handle.status().is_active())
            .count()
    }

    /// Cancels one session; returns false if it is not tracked
    pub async fn cancel(&self, id: u64) -> bool {
        match self.sessions.read().await.get(&id) {
            Some(tracked) => {
                tracked.handle.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancels every session and waits for all of them to end
    pub async fn cancel_all(&self) {
        let drained: Vec<Tracked> = self.sessions.write().await.drain().map(|(_, t)| t).collect();

        for tracked in &drained {
            tracked.handle.cancel();
        }

        for tracked in drained {
            let id = tracked.handle.id();
            if let Err(e) = tracked.handle.wait().await {
                tracing::error!("Harvest {} ended abnormally: {}", id, e);
            }
        }

        tracing::info!("All harvest sessions stopped");
    }

    /// Stops tracking a session and waits for its outcome
    pub async fn wait(&self, id: u64) -> Option<Result<HarvestOutcome, HarvestError>> {
        let tracked = self.sessions.write().await.remove(&id)?;
        Some(tracked.handle.wait().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harvest::harvester::{ChannelSink, HarvestSettings};
    use crate::harvest::host::ViewEvent;
    use crate::harvest::messages::{DataGrabbed, OutboundEvent};
    use crate::harvest::testing::{FakeHost, FakeView, Step};
    use std::time::Duration;

    fn manager(host: Arc<FakeHost>) -> HarvestManager {
        HarvestManager::new(CredentialHarvester::new(host, HarvestSettings::default()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_manager_start_and_list() {
        let host = Arc::new(FakeHost::default());
        let _events = host.add_view(FakeView::new());
        let manager = manager(host);
        let (sink, _rx) = ChannelSink::channel();

        let id = manager
            .start("https://latex.example.org/login?token=secret", Arc::new(sink))
            .await
            .unwrap();

        let sessions = manager.sessions().await;
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, id);
        assert_eq!(sessions[0].target_url, "https://latex.example.org/login");
        assert_eq!(sessions[0].status, "WaitingForLoad");
        assert_eq!(manager.active_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manager_sessions_are_independent() {
        let first = FakeView::new()
            .with_cookie(vec![], Step::value("sid-one"))
            .with_eval(vec![], Step::value("tok-one"));
        let second = FakeView::new()
            .with_cookie(vec![], Step::value("sid-two"))
            .with_eval(vec![], Step::Pending);

        let host = Arc::new(FakeHost::default());
        let first_events = host.add_view(first.clone());
        let second_events = host.add_view(second.clone());
        let manager = manager(host);

        let (sink_one, mut rx_one) = ChannelSink::channel();
        let (sink_two, mut rx_two) = ChannelSink::channel();
        let id_one = manager
            .start("https://one.example.org/login", Arc::new(sink_one))
            .await
            .unwrap();
        let id_two = manager
            .start("https://two.example.org/login", Arc::new(sink_two))
            .await
            .unwrap();
        assert_ne!(id_one, id_two);

        first_events.send(ViewEvent::LoadFinished).unwrap();
        second_events.send(ViewEvent::LoadFinished).unwrap();

        let outcome = manager.wait(id_one).await.unwrap().unwrap();
        assert_eq!(
            outcome,
            HarvestOutcome::Completed(DataGrabbed::new("sid-one", "tok-one"))
        );
        assert_eq!(
            rx_one.try_recv().unwrap(),
            OutboundEvent::DataGrabbed(DataGrabbed::new("sid-one", "tok-one"))
        );

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(manager.status(id_two).await, Some(HarvestStatus::Polling));
        assert!(rx_two.try_recv().is_err());
        assert_eq!(second.close_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manager_cancel_all_closes_views() {
        let first = FakeView::new();
        let second = FakeView::new();
        let host = Arc::new(FakeHost::default());
        let _first_events = host.add_view(first.clone());
        let second_events = host.add_view(second.clone());
        let manager = manager(host);

        let (sink, mut rx) = ChannelSink::channel();
        let sink: Arc<dyn CompletionSink> = Arc::new(sink);
        manager.start("https://one.example.org", sink.clone()).await.unwrap();
        manager.start("https://two.example.org", sink).await.unwrap();
        second_events.send(ViewEvent::LoadFinished).unwrap();

        manager.cancel_all().await;

        assert!(manager.sessions().await.is_empty());
        assert_eq!(first.close_calls(), 1);
        assert_eq!(second.close_calls(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_manager_prunes_finished_sessions() {
        let view = FakeView::new();
        let host = Arc::new(FakeHost::default());
        let events = host.add_view(view);
        let _next = host.add_view(FakeView::new());
        let manager = manager(host);
        let (sink, _rx) = ChannelSink::channel();
        let sink: Arc<dyn CompletionSink> = Arc::new(sink);

        let id = manager.start("https://one.example.org", sink.clone()).await.unwrap();
        events.send(ViewEvent::Closed).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        manager.start("https://two.example.org", sink).await.unwrap();
        assert!(manager.status(id).await.is_none());
        assert_eq!(manager.sessions().await.len(), 1);
    }

    #[tokio::test]
    async fn test_manager_cancel_unknown() {
        let manager = manager(Arc::new(FakeHost::default()));
        assert!(!manager.cancel(42).await);
        assert!(manager.wait(42).await.is_none());
    }
}
