use std::future::Future;
use std::sync::{Mutex, PoisonError};

use tracing::info;

use super::session::DeviceSession;

/// Holds at most one live session.
///
/// Swapping devices destroys the old session before the new one connects,
/// and only one swap runs at a time, so two sessions never hold a GATT
/// connection together.
#[derive(Default)]
pub struct SessionSlot {
    current: Mutex<Option<DeviceSession>>,
    swap: tokio::sync::Mutex<()>,
}

impl SessionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<DeviceSession> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Destroy the current session, then install the one `connect` yields.
    ///
    /// When `connect` fails the slot stays empty.
    pub async fn replace<F, E>(&self, connect: F) -> Result<DeviceSession, E>
    where
        F: Future<Output = Result<DeviceSession, E>>,
    {
        let _swap = self.swap.lock().await;
        self.release();
        let session = connect.await?;
        info!("Active device is now {}", session.descriptor().mac_address);
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(session.clone());
        Ok(session)
    }

    /// Destroy the current session, if any.
    pub async fn clear(&self) {
        let _swap = self.swap.lock().await;
        self.release();
    }

    fn release(&self) {
        let old = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(old) = old {
            info!("Releasing {}", old.descriptor().mac_address);
            old.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::bluetooth::backend::MacAddr;
    use crate::bluetooth::demo::{DemoBackend, DemoConfig, DemoCounters};
    use crate::bluetooth::ConnectionManager;
    use crate::config::SessionConfig;
    use crate::error::ConnectError;

    fn backend(last_byte: u8) -> Arc<DemoBackend> {
        Arc::new(DemoBackend::new(DemoConfig {
            mac_address: MacAddr([0xAC, 0x12, 0x2F, 0x00, 0x00, last_byte]),
            ..Default::default()
        }))
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_swaps_leave_one_session() {
        let first = backend(1);
        let second = backend(2);
        let first_manager = ConnectionManager::new(first.clone(), SessionConfig::default());
        let second_manager = ConnectionManager::new(second.clone(), SessionConfig::default());
        let slot = SessionSlot::new();

        let (a, b) = tokio::join!(
            slot.replace(first_manager.connect(first.descriptor().mac_address)),
            slot.replace(second_manager.connect(second.descriptor().mac_address)),
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert!(a.is_destroyed());
        assert!(!b.is_destroyed());
        assert!(slot.current().unwrap().same_session(&b));
        assert_eq!(DemoCounters::get(&first.counters().gatt_disconnects), 1);
        assert_eq!(DemoCounters::get(&second.counters().gatt_disconnects), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_connect_leaves_slot_empty() {
        let good = backend(1);
        let manager = ConnectionManager::new(good.clone(), SessionConfig::default());
        let slot = SessionSlot::new();
        let old = slot
            .replace(manager.connect(good.descriptor().mac_address))
            .await
            .unwrap();

        let result = slot
            .replace(manager.connect(MacAddr([0xFF; 6])))
            .await;

        assert!(matches!(result, Err(ConnectError::DeviceNotFound { .. })));
        assert!(old.is_destroyed());
        assert!(slot.current().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_destroys_current() {
        let good = backend(1);
        let manager = ConnectionManager::new(good.clone(), SessionConfig::default());
        let slot = SessionSlot::new();
        let session = slot
            .replace(manager.connect(good.descriptor().mac_address))
            .await
            .unwrap();

        slot.clear().await;

        assert!(session.is_destroyed());
        assert!(slot.current().is_none());
    }
}
