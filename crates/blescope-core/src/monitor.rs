//! The device monitor task.
//!
//! One tokio task owns the [`Reconciler`] and is the only code that mutates
//! it. It waits on three inputs:
//!
//! - the flush timer, which merges the pending buffer and publishes a snapshot;
//! - radio events, which feed `ingest` and out-of-band connection updates;
//! - commands from [`MonitorHandle`]s.
//!
//! Snapshots are published through a `watch` channel, so readers always see
//! the latest consistent catalog without touching the reconciler.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use crate::device::{CanonicalDevice, ScanStatus};
use crate::error::{BlescopeError, Result};
use crate::radio::{RadioEvent, RadioEventReceiver, SubscriptionKind};
use crate::reconciler::Reconciler;

const COMMAND_CHANNEL_CAPACITY: usize = 64;
const VALUE_CHANNEL_CAPACITY: usize = 256;

/// Published view of the catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CatalogSnapshot {
    /// Increments on every publish.
    pub generation: u64,
    /// Devices in first-seen order.
    pub devices: Vec<CanonicalDevice>,
    /// Scan lifecycle.
    pub scan_status: ScanStatus,
    /// Message of the last scan error, cleared when a scan starts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Latest informational scan notice, e.g. an automatic restart.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan_notice: Option<String>,
}

impl CatalogSnapshot {
    /// Look up a device by identity.
    #[must_use]
    pub fn device(&self, identity: &str) -> Option<&CanonicalDevice> {
        self.devices.iter().find(|d| d.identifier == identity)
    }
}

/// A value pushed by a subscribed characteristic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CharacteristicUpdate {
    /// Device identity.
    pub identity: String,
    /// Service UUID.
    pub service: String,
    /// Characteristic UUID.
    pub characteristic: String,
    /// Value as uppercase hex.
    pub value_hex: String,
    /// Subscription kind.
    pub kind: SubscriptionKind,
}

enum Command {
    Flush(oneshot::Sender<()>),
    Clear(oneshot::Sender<()>),
    ApplyConnection {
        identity: String,
        paired: bool,
        reply: oneshot::Sender<bool>,
    },
    SetScanStatus(ScanStatus, oneshot::Sender<()>),
    FirstSeen {
        identity: String,
        reply: oneshot::Sender<Option<u64>>,
    },
    Shutdown,
}

/// Clonable handle to the monitor task.
#[derive(Debug, Clone)]
pub struct MonitorHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<Arc<CatalogSnapshot>>,
    values: broadcast::Sender<CharacteristicUpdate>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Flush(_) => "Flush",
            Self::Clear(_) => "Clear",
            Self::ApplyConnection { .. } => "ApplyConnection",
            Self::SetScanStatus(..) => "SetScanStatus",
            Self::FirstSeen { .. } => "FirstSeen",
            Self::Shutdown => "Shutdown",
        };
        f.write_str(name)
    }
}

/// Spawn the monitor task.
///
/// `flush_interval` is the reconciler cadence; 500-1000 ms keeps the list
/// steady without feeling laggy.
#[must_use]
pub fn spawn(events: RadioEventReceiver, flush_interval: Duration) -> MonitorHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
    let (snap_tx, snap_rx) = watch::channel(Arc::new(CatalogSnapshot::default()));
    let (value_tx, _) = broadcast::channel(VALUE_CHANNEL_CAPACITY);

    let worker = Worker {
        reconciler: Reconciler::new(),
        generation: 0,
        scan_status: ScanStatus::default(),
        last_error: None,
        scan_notice: None,
        publish: snap_tx,
        values: value_tx.clone(),
    };
    let task = tokio::spawn(worker.run(events, cmd_rx, flush_interval));
    info!(interval_ms = flush_interval.as_millis(), "device monitor started");

    MonitorHandle {
        commands: cmd_tx,
        snapshots: snap_rx,
        values: value_tx,
        task: Arc::new(Mutex::new(Some(task))),
    }
}

impl MonitorHandle {
    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| BlescopeError::MonitorStopped)?;
        rx.await.map_err(|_| BlescopeError::MonitorStopped)
    }

    /// Latest published snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        Arc::clone(&self.snapshots.borrow())
    }

    /// Watch for new snapshots.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<CatalogSnapshot>> {
        self.snapshots.clone()
    }

    /// Receive characteristic notifications/indications.
    #[must_use]
    pub fn characteristic_values(&self) -> broadcast::Receiver<CharacteristicUpdate> {
        self.values.subscribe()
    }

    /// Flush the pending buffer now instead of waiting for the timer.
    ///
    /// # Errors
    ///
    /// Returns [`BlescopeError::MonitorStopped`] if the task has exited.
    pub async fn flush_now(&self) -> Result<()> {
        self.request(Command::Flush).await
    }

    /// Discard the catalog and pending buffer.
    ///
    /// # Errors
    ///
    /// Returns [`BlescopeError::MonitorStopped`] if the task has exited.
    pub async fn clear(&self) -> Result<()> {
        self.request(Command::Clear).await
    }

    /// Set the pairing flag on a catalogued device immediately.
    ///
    /// Returns `false` if the identity is not catalogued.
    ///
    /// # Errors
    ///
    /// Returns [`BlescopeError::MonitorStopped`] if the task has exited.
    pub async fn apply_connection_state(&self, identity: &str, paired: bool) -> Result<bool> {
        let identity = identity.to_string();
        self.request(|reply| Command::ApplyConnection {
            identity,
            paired,
            reply,
        })
        .await
    }

    /// Override the published scan status.
    ///
    /// # Errors
    ///
    /// Returns [`BlescopeError::MonitorStopped`] if the task has exited.
    pub async fn set_scan_status(&self, status: ScanStatus) -> Result<()> {
        self.request(|reply| Command::SetScanStatus(status, reply)).await
    }

    /// First-seen index of a catalogued identity.
    ///
    /// # Errors
    ///
    /// Returns [`BlescopeError::MonitorStopped`] if the task has exited.
    pub async fn first_seen_index(&self, identity: &str) -> Result<Option<u64>> {
        let identity = identity.to_string();
        self.request(|reply| Command::FirstSeen { identity, reply }).await
    }

    /// Stop the task and wait for it to exit. Idempotent.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown).await;
        if let Some(task) = self.task.lock().await.take() {
            let _ = task.await;
        }
    }
}

struct Worker {
    reconciler: Reconciler,
    generation: u64,
    scan_status: ScanStatus,
    last_error: Option<String>,
    scan_notice: Option<String>,
    publish: watch::Sender<Arc<CatalogSnapshot>>,
    values: broadcast::Sender<CharacteristicUpdate>,
}

impl Worker {
    async fn run(
        mut self,
        mut events: RadioEventReceiver,
        mut commands: mpsc::Receiver<Command>,
        flush_interval: Duration,
    ) {
        let mut ticker = tokio::time::interval(flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut radio_open = true;

        loop {
            // timer first, then radio events, then commands: a command sees
            // every event that was queued before it
            tokio::select! {
                biased;
                _ = ticker.tick() => self.flush(),
                event = events.recv(), if radio_open => match event {
                    Some(event) => self.handle_event(event),
                    None => {
                        warn!("radio event channel closed");
                        radio_open = false;
                    }
                },
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
            }
        }
        info!("device monitor stopped");
    }

    fn publish(&mut self) {
        self.generation += 1;
        self.publish.send_replace(Arc::new(CatalogSnapshot {
            generation: self.generation,
            devices: self.reconciler.snapshot(),
            scan_status: self.scan_status,
            last_error: self.last_error.clone(),
            scan_notice: self.scan_notice.clone(),
        }));
    }

    fn flush(&mut self) {
        if self.reconciler.flush().is_some() {
            self.publish();
        }
    }

    fn set_status(&mut self, status: ScanStatus) {
        if self.scan_status != status {
            self.scan_status = status;
            self.publish();
        }
    }

    fn handle_event(&mut self, event: RadioEvent) {
        match event {
            RadioEvent::Discovered(obs) => self.reconciler.ingest(obs),
            RadioEvent::ScanStarted => {
                self.last_error = None;
                self.scan_notice = None;
                self.set_status(ScanStatus::Scanning);
            }
            RadioEvent::ScanCompleted => {
                // merge the tail of the scan before reporting completion
                self.flush();
                self.set_status(ScanStatus::Completed);
            }
            RadioEvent::ScanError(message) => {
                warn!(error = %message, "scan failed");
                self.flush();
                self.last_error = Some(message);
                self.scan_status = ScanStatus::Idle;
                self.publish();
            }
            RadioEvent::ScanInfo(message) => {
                info!(notice = %message, "scan notice");
                self.scan_notice = Some(message);
                self.publish();
            }
            RadioEvent::ConnectionChanged { identity, paired } => {
                if self.reconciler.apply_connection_state(&identity, paired) {
                    debug!(identity = %identity, paired, "connection state applied");
                    self.publish();
                }
            }
            RadioEvent::CharacteristicValue {
                identity,
                service,
                characteristic,
                value_hex,
                kind,
            } => {
                let _ = self.values.send(CharacteristicUpdate {
                    identity,
                    service,
                    characteristic,
                    value_hex,
                    kind,
                });
            }
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Flush(reply) => {
                self.flush();
                let _ = reply.send(());
            }
            Command::Clear(reply) => {
                self.reconciler.clear();
                info!("catalog cleared");
                self.publish();
                let _ = reply.send(());
            }
            Command::ApplyConnection {
                identity,
                paired,
                reply,
            } => {
                let applied = self.reconciler.apply_connection_state(&identity, paired);
                if applied {
                    self.publish();
                }
                let _ = reply.send(applied);
            }
            Command::SetScanStatus(status, reply) => {
                self.set_status(status);
                let _ = reply.send(());
            }
            Command::FirstSeen { identity, reply } => {
                let _ = reply.send(self.reconciler.first_seen_index(&identity));
            }
            Command::Shutdown => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::RawObservation;
    use crate::radio::event_channel;

    fn obs(id: &str, rssi: i16) -> RadioEvent {
        RadioEvent::Discovered(RawObservation {
            rssi: Some(rssi),
            ..RawObservation::new(id, "00:00:00:00:00:00")
        })
    }

    // Long interval so only explicit flushes merge.
    const SLOW: Duration = Duration::from_secs(3600);

    #[tokio::test]
    async fn test_events_are_buffered_until_flush() {
        let (tx, rx) = event_channel();
        let monitor = spawn(rx, SLOW);

        tx.send(obs("A", -70)).await.unwrap();
        tx.send(obs("A", -60)).await.unwrap();
        tx.send(obs("B", -50)).await.unwrap();
        monitor.flush_now().await.unwrap();

        let snap = monitor.snapshot();
        let ids: Vec<&str> = snap.devices.iter().map(|d| d.identifier.as_str()).collect();
        assert_eq!(ids, vec!["A", "B"]);
        assert_eq!(snap.device("A").unwrap().rssi, Some(-60));
        assert_eq!(monitor.first_seen_index("B").await.unwrap(), Some(1));

        monitor.shutdown().await;
    }

    #[tokio::test]
    async fn test_timer_flush_publishes() {
        let (tx, rx) = event_channel();
        let monitor = spawn(rx, Duration::from_millis(10));
        let mut watch = monitor.subscribe();

        tx.send(obs("A", -40)).await.unwrap();
        let snap = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                watch.changed().await.unwrap();
                let snap = watch.borrow_and_update().clone();
                if !snap.devices.is_empty() {
                    return snap;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(snap.devices[0].identifier, "A");
        assert!(snap.generation >= 1);

        monitor.shutdown().await;
    }

    #[tokio::test]
    async fn test_connection_change_applies_immediately() {
        let (tx, rx) = event_channel();
        let monitor = spawn(rx, SLOW);
        tx.send(obs("A", -40)).await.unwrap();
        monitor.flush_now().await.unwrap();

        tx.send(RadioEvent::ConnectionChanged {
            identity: "A".into(),
            paired: true,
        })
        .await
        .unwrap();
        // round-trip a command so the event above has been handled
        monitor.first_seen_index("A").await.unwrap();
        assert!(monitor.snapshot().device("A").unwrap().paired);

        assert!(monitor.apply_connection_state("A", false).await.unwrap());
        assert!(!monitor.snapshot().device("A").unwrap().paired);
        assert!(!monitor.apply_connection_state("missing", true).await.unwrap());

        monitor.shutdown().await;
    }

    #[tokio::test]
    async fn test_scan_status_transitions() {
        let (tx, rx) = event_channel();
        let monitor = spawn(rx, SLOW);
        let mut watch = monitor.subscribe();

        tx.send(RadioEvent::ScanStarted).await.unwrap();
        watch.changed().await.unwrap();
        assert_eq!(watch.borrow_and_update().scan_status, ScanStatus::Scanning);

        tx.send(obs("A", -40)).await.unwrap();
        tx.send(RadioEvent::ScanCompleted).await.unwrap();
        watch.changed().await.unwrap();
        let snap = watch.borrow_and_update().clone();
        assert_eq!(snap.scan_status, ScanStatus::Completed);
        assert_eq!(snap.devices.len(), 1);

        tx.send(RadioEvent::ScanError("adapter gone".into())).await.unwrap();
        watch.changed().await.unwrap();
        let snap = watch.borrow_and_update().clone();
        assert_eq!(snap.scan_status, ScanStatus::Idle);
        assert_eq!(snap.last_error.as_deref(), Some("adapter gone"));

        monitor.set_scan_status(ScanStatus::Scanning).await.unwrap();
        assert_eq!(monitor.snapshot().scan_status, ScanStatus::Scanning);

        monitor.shutdown().await;
    }

    #[tokio::test]
    async fn test_scan_completed_publishes_final_batch() {
        let (tx, rx) = event_channel();
        let monitor = spawn(rx, SLOW);
        let mut watch = monitor.subscribe();

        // status is already Completed, so only the flush can publish
        monitor.set_scan_status(ScanStatus::Completed).await.unwrap();
        watch.borrow_and_update();

        tx.send(obs("A", -40)).await.unwrap();
        tx.send(RadioEvent::ScanCompleted).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), watch.changed())
            .await
            .unwrap()
            .unwrap();

        let snap = monitor.snapshot();
        assert_eq!(snap.scan_status, ScanStatus::Completed);
        assert_eq!(snap.device("A").unwrap().rssi, Some(-40));

        monitor.shutdown().await;
    }

    #[tokio::test]
    async fn test_scan_notice_published_and_cleared() {
        let (tx, rx) = event_channel();
        let monitor = spawn(rx, SLOW);

        tx.send(RadioEvent::ScanStarted).await.unwrap();
        tx.send(RadioEvent::ScanInfo("scan restarted after 46s without events".into()))
            .await
            .unwrap();
        monitor.flush_now().await.unwrap();
        let snap = monitor.snapshot();
        assert_eq!(snap.scan_status, ScanStatus::Scanning);
        assert_eq!(
            snap.scan_notice.as_deref(),
            Some("scan restarted after 46s without events")
        );

        tx.send(RadioEvent::ScanStarted).await.unwrap();
        monitor.flush_now().await.unwrap();
        assert_eq!(monitor.snapshot().scan_notice, None);

        monitor.shutdown().await;
    }

    #[tokio::test]
    async fn test_clear_resets_catalog() {
        let (tx, rx) = event_channel();
        let monitor = spawn(rx, SLOW);
        tx.send(obs("A", -40)).await.unwrap();
        monitor.flush_now().await.unwrap();
        assert_eq!(monitor.snapshot().devices.len(), 1);

        monitor.clear().await.unwrap();
        assert!(monitor.snapshot().devices.is_empty());
        assert_eq!(monitor.first_seen_index("A").await.unwrap(), None);

        monitor.shutdown().await;
    }

    #[tokio::test]
    async fn test_characteristic_values_are_forwarded() {
        let (tx, rx) = event_channel();
        let monitor = spawn(rx, SLOW);
        let mut values = monitor.characteristic_values();

        tx.send(RadioEvent::CharacteristicValue {
            identity: "A".into(),
            service: "180F".into(),
            characteristic: "2A19".into(),
            value_hex: "5A".into(),
            kind: SubscriptionKind::Notify,
        })
        .await
        .unwrap();

        let update = values.recv().await.unwrap();
        assert_eq!(update.value_hex, "5A");
        monitor.shutdown().await;
    }

    #[tokio::test]
    async fn test_commands_fail_after_shutdown() {
        let (_tx, rx) = event_channel();
        let monitor = spawn(rx, SLOW);
        monitor.shutdown().await;
        monitor.shutdown().await;
        assert!(matches!(monitor.clear().await, Err(BlescopeError::MonitorStopped)));
    }
}
