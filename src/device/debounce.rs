use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::equalizer::EqualizerConfiguration;
use super::session::DeviceSession;
use crate::error::SessionError;

/// Coalesces bursts of equalizer changes, e.g. from a slider.
///
/// Only the latest configuration is sent, once no new one has arrived for
/// the quiet period. Dropping the debouncer still sends a pending change.
pub struct EqualizerDebouncer {
    tx: watch::Sender<Option<EqualizerConfiguration>>,
    task: JoinHandle<()>,
}

impl EqualizerDebouncer {
    pub fn new(session: DeviceSession, quiet: Duration) -> Self {
        let (tx, rx) = watch::channel(None);
        let task = tokio::spawn(run(session, rx, quiet));
        Self { tx, task }
    }

    /// Replace any pending configuration with `config`.
    pub fn submit(&self, config: EqualizerConfiguration) {
        self.tx.send_replace(Some(config));
    }

    /// Send whatever is pending and wait until it has been handed to the session.
    pub async fn finish(self) {
        let Self { tx, task } = self;
        drop(tx);
        if let Err(e) = task.await {
            warn!("Equalizer debounce task failed: {}", e);
        }
    }
}

async fn run(
    session: DeviceSession,
    mut rx: watch::Receiver<Option<EqualizerConfiguration>>,
    quiet: Duration,
) {
    while rx.changed().await.is_ok() {
        // Restart the quiet period on every new value.
        while let Ok(Ok(())) = tokio::time::timeout(quiet, rx.changed()).await {}

        let pending = rx.borrow_and_update().clone();
        let Some(config) = pending else {
            continue;
        };
        debug!("Sending debounced equalizer change");
        match session.request_equalizer_change(config).await {
            Ok(_) => {}
            Err(SessionError::Destroyed) => return,
            Err(e) => warn!("Equalizer change failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::bluetooth::demo::{DemoBackend, DemoConfig};
    use crate::bluetooth::ConnectionManager;
    use crate::config::SessionConfig;
    use crate::device::equalizer::VolumeAdjustments;
    use crate::protocol::commands::CMD_SET_EQUALIZER;

    fn bands(level: i16) -> EqualizerConfiguration {
        EqualizerConfiguration::custom(vec![VolumeAdjustments::new([level; 8])])
    }

    async fn connect() -> (Arc<DemoBackend>, DeviceSession) {
        let backend = Arc::new(DemoBackend::new(DemoConfig::default()));
        let manager = ConnectionManager::new(backend.clone(), SessionConfig::default());
        let session = manager
            .connect(backend.descriptor().mac_address)
            .await
            .unwrap();
        (backend, session)
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_sends_only_latest() {
        let (backend, session) = connect().await;
        let debouncer = EqualizerDebouncer::new(session.clone(), Duration::from_millis(200));

        for level in 0..5 {
            debouncer.submit(bands(level * 10));
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(backend.device().writes_for(CMD_SET_EQUALIZER).is_empty());

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(backend.device().writes_for(CMD_SET_EQUALIZER).len(), 1);
        assert_eq!(session.current_state().equalizer, bands(40));
    }

    #[tokio::test(start_paused = true)]
    async fn test_quiet_period_from_session_config() {
        let (backend, session) = connect().await;
        let config = SessionConfig {
            equalizer_debounce_ms: 500,
            ..Default::default()
        };
        let debouncer = session.equalizer_debouncer(&config);

        debouncer.submit(bands(30));
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(backend.device().writes_for(CMD_SET_EQUALIZER).is_empty());

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(backend.device().writes_for(CMD_SET_EQUALIZER).len(), 1);
        assert_eq!(session.current_state().equalizer, bands(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_finish_flushes_pending_change() {
        let (backend, session) = connect().await;
        let debouncer = EqualizerDebouncer::new(session.clone(), Duration::from_millis(200));

        debouncer.submit(bands(-20));
        debouncer.finish().await;

        assert_eq!(session.current_state().equalizer, bands(-20));
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(backend.device().writes_for(CMD_SET_EQUALIZER).len(), 1);
    }
}
