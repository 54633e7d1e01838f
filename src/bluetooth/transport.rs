use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::backend::{GattLink, OpenedLink};
use crate::error::SessionError;
use crate::protocol::packet::hex;
use crate::protocol::{decode, Packet};

const COMMAND_QUEUE_DEPTH: usize = 32;

/// An outbound request.
#[derive(Debug)]
pub enum Command {
    Write(Vec<u8>),
    /// Answered once every earlier write has been handed to the link.
    Flush(oneshot::Sender<()>),
}

/// Serializes writes onto a GATT link and decodes its notifications.
///
/// Writes are sent one at a time in submission order. Notifications go to a
/// small ring buffer. A consumer that falls behind loses the oldest entries.
pub struct CommandQueue {
    tx: mpsc::Sender<Command>,
    link: Arc<dyn GattLink>,
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
    closed: AtomicBool,
}

impl CommandQueue {
    /// Spawn the writer and reader tasks for `opened`.
    pub fn start(opened: OpenedLink, notification_buffer: usize) -> (Arc<Self>, Notifications) {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let (notify_tx, notify_rx) = broadcast::channel(notification_buffer.max(1));

        let writer = tokio::spawn(send_loop(opened.link.clone(), rx));
        let reader = tokio::spawn(recv_loop(opened.inbound, notify_tx));

        let queue = Arc::new(Self {
            tx,
            link: opened.link,
            writer,
            reader,
            closed: AtomicBool::new(false),
        });
        (queue, Notifications { rx: notify_rx })
    }

    /// Enqueue raw bytes. Returns once the command is queued, not when it is sent.
    pub async fn write(&self, bytes: Vec<u8>) -> Result<(), SessionError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SessionError::QueueClosed);
        }
        self.tx
            .send(Command::Write(bytes))
            .await
            .map_err(|_| SessionError::QueueClosed)
    }

    /// Wait until everything queued so far has been written.
    pub async fn flush(&self) -> Result<(), SessionError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SessionError::QueueClosed);
        }
        let (done, wait) = oneshot::channel();
        self.tx
            .send(Command::Flush(done))
            .await
            .map_err(|_| SessionError::QueueClosed)?;
        wait.await.map_err(|_| SessionError::QueueClosed)
    }

    /// Stop both tasks and close the link. Only the first call has an effect.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("Closing command queue");
        self.writer.abort();
        self.reader.abort();
        self.link.close();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for CommandQueue {
    fn drop(&mut self) {
        self.close();
    }
}

/// Ordered stream of decoded notifications.
pub struct Notifications {
    rx: broadcast::Receiver<Packet>,
}

impl Notifications {
    /// Next packet, or `None` once the link is gone. Skips over packets lost
    /// to a full buffer.
    pub async fn recv(&mut self) -> Option<Packet> {
        loop {
            match self.rx.recv().await {
                Ok(packet) => return Some(packet),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Notification consumer lagging, dropped {} oldest packet(s)", n);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

async fn send_loop(link: Arc<dyn GattLink>, mut rx: mpsc::Receiver<Command>) {
    while let Some(command) = rx.recv().await {
        match command {
            Command::Write(bytes) => {
                debug!("TX: {}", hex(&bytes));
                if let Err(e) = link.write(&bytes).await {
                    warn!("GATT write error: {}", e);
                    return;
                }
            }
            Command::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    info!("Command channel closed, stopping send loop");
}

async fn recv_loop(mut inbound: mpsc::Receiver<Vec<u8>>, tx: broadcast::Sender<Packet>) {
    while let Some(bytes) = inbound.recv().await {
        match decode(&bytes) {
            Ok(packet) => {
                debug!("RX: {} ({})", packet.name(), hex(&bytes));
                let _ = tx.send(packet);
            }
            Err(e) => {
                warn!("Dropping undecodable notification {}: {}", hex(&bytes), e);
            }
        }
    }
    info!("Notification stream closed, stopping recv loop");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluetooth::backend::{BleBackend, SERVICE_UUID};
    use crate::bluetooth::demo::{DemoBackend, DemoConfig, DemoCounters, DemoDevice};
    use crate::protocol::commands::*;
    use crate::protocol::SoundcorePacket;

    fn battery_frame(level: u8) -> Vec<u8> {
        SoundcorePacket::inbound(CMD_BATTERY_LEVEL_UPDATE, vec![level]).to_bytes()
    }

    async fn open(backend: &DemoBackend) -> OpenedLink {
        let gatt = backend.connect_gatt(&backend.descriptor()).await.unwrap();
        gatt.open_link(SERVICE_UUID).await.unwrap()
    }

    async fn wait_for_writes(device: &DemoDevice, count: usize) {
        while device.writes().len() < count {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_writes_in_submission_order() {
        let backend = DemoBackend::new(DemoConfig::default());
        let (queue, _notifications) = CommandQueue::start(open(&backend).await, 8);

        for i in 0..20u8 {
            queue.write(vec![i]).await.unwrap();
        }
        wait_for_writes(&backend.device(), 20).await;

        let expected: Vec<Vec<u8>> = (0..20u8).map(|i| vec![i]).collect();
        assert_eq!(backend.device().writes(), expected);
    }

    #[tokio::test]
    async fn test_flush_waits_for_queued_writes() {
        let backend = DemoBackend::new(DemoConfig::default());
        let (queue, _notifications) = CommandQueue::start(open(&backend).await, 8);

        for i in 0..3u8 {
            queue.write(vec![i]).await.unwrap();
        }
        queue.flush().await.unwrap();

        assert_eq!(backend.device().writes().len(), 3);
    }

    #[tokio::test]
    async fn test_slow_consumer_drops_oldest() {
        let backend = DemoBackend::new(DemoConfig::default());
        let (_queue, mut notifications) = CommandQueue::start(open(&backend).await, 2);

        let device = backend.device();
        for level in 0..5 {
            assert!(device.notify(battery_frame(level)));
        }
        device.end_notifications();

        let mut seen = Vec::new();
        while let Some(packet) = notifications.recv().await {
            if let Packet::BatteryLevelUpdate(levels) = packet {
                seen.push(levels[0]);
            }
        }
        // Only the newest entries survive, still in order.
        assert_eq!(seen, vec![3, 4]);
    }

    #[tokio::test]
    async fn test_undecodable_notification_is_skipped() {
        let backend = DemoBackend::new(DemoConfig::default());
        let (_queue, mut notifications) = CommandQueue::start(open(&backend).await, 8);

        backend.device().notify(vec![0xDE, 0xAD]);
        backend.device().notify(battery_frame(3));

        assert_eq!(
            notifications.recv().await,
            Some(Packet::BatteryLevelUpdate(vec![3]))
        );
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let backend = DemoBackend::new(DemoConfig::default());
        let (queue, _notifications) = CommandQueue::start(open(&backend).await, 8);

        queue.close();
        queue.close();
        drop(queue);

        let counters = backend.counters();
        assert_eq!(DemoCounters::get(&counters.link_closes), 1);
    }

    #[tokio::test]
    async fn test_write_after_close_fails() {
        let backend = DemoBackend::new(DemoConfig::default());
        let (queue, _notifications) = CommandQueue::start(open(&backend).await, 8);
        queue.close();
        assert!(matches!(
            queue.write(vec![1]).await,
            Err(SessionError::QueueClosed)
        ));
    }
}
