//! Application State
//!
//! Shared state across all handlers.

use std::sync::Arc;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusHandle;
use tokio::sync::watch;
use voicebot_config::Settings;
use voicebot_services::Services;

use crate::session::SessionRegistry;

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    /// Collaborators shared by every session
    pub services: Services,
    pub sessions: Arc<SessionRegistry>,
    /// Prometheus handle, absent when metrics are disabled
    pub metrics: Option<PrometheusHandle>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl AppState {
    pub fn new(settings: Settings, services: Services) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            sessions: Arc::new(SessionRegistry::new(settings.server.max_sessions)),
            settings: Arc::new(settings),
            services,
            metrics: None,
            shutdown: Arc::new(shutdown),
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Receiver flipped to `true` once the server starts shutting down
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Tell every running session to stop
    pub fn begin_shutdown(&self) {
        tracing::info!(active = self.sessions.count(), "Cancelling running sessions");
        self.shutdown.send_replace(true);
    }

    /// Wait until all sessions are gone, up to `timeout`. Returns whether
    /// the registry drained in time.
    pub async fn drain_sessions(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while !self.sessions.is_empty() {
            if tokio::time::Instant::now() >= deadline {
                tracing::warn!(remaining = self.sessions.count(), "Sessions still running at shutdown");
                return false;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        true
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::test_state;
    use super::*;

    #[tokio::test]
    async fn test_shutdown_signal() {
        let state = test_state(4);
        let mut signal = state.shutdown_signal();
        assert!(!*signal.borrow());

        state.begin_shutdown();
        signal.changed().await.unwrap();
        assert!(*signal.borrow());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_sessions() {
        let state = test_state(4);
        assert!(state.drain_sessions(Duration::from_secs(1)).await);

        let _guard = state.sessions.register().unwrap();
        assert!(!state.drain_sessions(Duration::from_millis(200)).await);
    }
}
