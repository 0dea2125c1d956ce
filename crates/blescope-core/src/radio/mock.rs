//! In-memory radio.
//!
//! Devices are re-announced every replay interval while a scan runs. An
//! optional JSON-lines capture of [`RawObservation`]s is replayed one line per
//! tick, looping. GATT characteristics are backed by a value store; writes to
//! a subscribed characteristic are echoed back as notifications.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{
    characteristic_key, find_characteristic, CharacteristicKey, CharacteristicProperty,
    GattCharacteristic, GattService, Radio, RadioError, RadioEvent, RadioEventSender,
    ScanHealthPolicy, ScanMode, ScanWatchdog, SubscriptionKind, WriteKind,
};
use crate::advertisement::synthesize_raw_advertisement;
use crate::device::{AdapterInfo, RawObservation};
use crate::hex::hex_from_bytes;

/// Default interval between announcements.
pub const DEFAULT_REPLAY_INTERVAL: Duration = Duration::from_millis(250);

/// MTU reported for every connected mock device.
pub const MOCK_MTU: u16 = 247;

/// A simulated peripheral.
#[derive(Debug, Clone, Default)]
pub struct MockDevice {
    /// What the device advertises.
    pub observation: RawObservation,
    /// GATT table exposed once connected.
    pub services: Vec<GattService>,
    /// Initial characteristic values keyed by `(service, characteristic)`.
    pub values: Vec<(String, String, Vec<u8>)>,
    /// Make `connect` fail.
    pub fail_connect: bool,
    /// Make `is_connected` fail, leaving command outcomes unverified.
    pub fail_verify: bool,
}

impl MockDevice {
    /// Wrap an observation with no GATT table.
    #[must_use]
    pub fn new(observation: RawObservation) -> Self {
        Self {
            observation,
            ..Self::default()
        }
    }
}

#[derive(Debug)]
struct MockState {
    devices: RwLock<Vec<MockDevice>>,
    replay: Vec<RawObservation>,
    connected: RwLock<HashSet<String>>,
    values: RwLock<HashMap<CharacteristicKey, Vec<u8>>>,
    subscriptions: RwLock<HashMap<CharacteristicKey, SubscriptionKind>>,
    scan_task: Mutex<Option<JoinHandle<()>>>,
    powered: AtomicBool,
}

/// In-memory [`Radio`].
#[derive(Debug, Clone)]
pub struct MockRadio {
    state: Arc<MockState>,
    events: RadioEventSender,
    interval: Duration,
    health: ScanHealthPolicy,
    adapter: AdapterInfo,
}

impl MockRadio {
    /// Create a radio announcing `devices`.
    #[must_use]
    pub fn new(devices: Vec<MockDevice>, events: RadioEventSender) -> Self {
        let mut values = HashMap::new();
        for device in &devices {
            for (service, characteristic, value) in &device.values {
                values.insert(
                    characteristic_key(&device.observation.identifier, service, characteristic),
                    value.clone(),
                );
            }
        }

        Self {
            state: Arc::new(MockState {
                devices: RwLock::new(devices),
                replay: Vec::new(),
                connected: RwLock::new(HashSet::new()),
                values: RwLock::new(values),
                subscriptions: RwLock::new(HashMap::new()),
                scan_task: Mutex::new(None),
                powered: AtomicBool::new(true),
            }),
            events,
            interval: DEFAULT_REPLAY_INTERVAL,
            health: ScanHealthPolicy::default(),
            adapter: AdapterInfo {
                identifier: "mock0".to_string(),
                address: "00:00:00:00:00:00".to_string(),
                powered: true,
            },
        }
    }

    /// Set the announcement interval.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the continuous-scan watchdog timings.
    #[must_use]
    pub const fn with_health_policy(mut self, policy: ScanHealthPolicy) -> Self {
        self.health = policy;
        self
    }

    /// Simulate the adapter being powered on or off.
    ///
    /// A continuous scan notices on its next health check and stops with
    /// [`RadioEvent::ScanError`].
    pub fn set_powered(&self, powered: bool) {
        self.state.powered.store(powered, Ordering::SeqCst);
    }

    fn is_powered(&self) -> bool {
        self.state.powered.load(Ordering::SeqCst)
    }

    /// Replay observations captured in a JSON-lines file.
    ///
    /// Blank and unparsable lines are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`RadioError::SessionInitFailed`] if the file cannot be read.
    pub async fn with_replay_file(self, path: impl AsRef<Path>) -> Result<Self, RadioError> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| RadioError::SessionInitFailed {
                message: format!("cannot read replay file {}: {e}", path.display()),
            })?;

        let mut replay = Vec::new();
        for (line_no, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<RawObservation>(line) {
                Ok(obs) => replay.push(obs),
                Err(e) => warn!(line = line_no + 1, error = %e, "skipping malformed replay line"),
            }
        }
        info!(path = %path.display(), observations = replay.len(), "loaded replay file");
        Ok(self.with_replay(replay))
    }

    /// Replay the given observations, one per tick.
    ///
    /// Must be called before the radio is cloned; otherwise the replay is dropped.
    #[must_use]
    pub fn with_replay(self, replay: Vec<RawObservation>) -> Self {
        let state = match Arc::try_unwrap(self.state) {
            Ok(mut state) => {
                state.replay = replay;
                Arc::new(state)
            }
            Err(shared) => {
                warn!("replay ignored: mock radio already shared");
                shared
            }
        };
        Self { state, ..self }
    }

    /// Add or replace a device at runtime.
    pub async fn upsert_device(&self, device: MockDevice) {
        let mut devices = self.state.devices.write().await;
        match devices
            .iter_mut()
            .find(|d| d.observation.identifier == device.observation.identifier)
        {
            Some(slot) => *slot = device,
            None => devices.push(device),
        }
    }

    /// Emit a raw event, as a radio callback would.
    pub async fn inject(&self, event: RadioEvent) {
        let _ = self.events.send(event).await;
    }

    async fn device(&self, identity: &str) -> Result<MockDevice, RadioError> {
        self.state
            .devices
            .read()
            .await
            .iter()
            .find(|d| d.observation.identifier == identity)
            .cloned()
            .ok_or_else(|| RadioError::DeviceNotFound {
                identity: identity.to_string(),
            })
    }

    async fn connected_device(&self, identity: &str) -> Result<MockDevice, RadioError> {
        let device = self.device(identity).await?;
        if !self.state.connected.read().await.contains(identity) {
            return Err(RadioError::NotConnected {
                identity: identity.to_string(),
            });
        }
        Ok(device)
    }

    async fn characteristic(
        &self,
        identity: &str,
        service: &str,
        characteristic: &str,
    ) -> Result<GattCharacteristic, RadioError> {
        let device = self.connected_device(identity).await?;
        find_characteristic(&device.services, service, characteristic)
            .cloned()
            .ok_or_else(|| RadioError::CharacteristicNotFound {
                service: service.to_string(),
                characteristic: characteristic.to_string(),
            })
    }

    fn announce(observation: &RawObservation) -> RawObservation {
        let mut obs = observation.clone();
        if obs.raw_adv_data.is_none() {
            obs.raw_adv_data = synthesize_raw_advertisement(&obs.manufacturer_data);
        }
        obs
    }

    /// Run one watchdog check. Returns `false` when the scan must stop.
    async fn check_health(&self, watchdog: &mut ScanWatchdog) -> bool {
        if !self.is_powered() {
            warn!("mock adapter powered off during scan");
            let message = RadioError::AdapterPoweredOff.to_string();
            let _ = self.events.send(RadioEvent::ScanError(message)).await;
            return false;
        }

        let now = Instant::now();
        if watchdog.should_restart(now) {
            let silent = watchdog.silent_for(now);
            watchdog.record_restart(now);
            info!(restarts = watchdog.restarts(), ?silent, "restarting stalled mock scan");
            let notice = format!("scan restarted after {}s without events", silent.as_secs());
            let _ = self.events.send(RadioEvent::ScanInfo(notice)).await;
        }
        true
    }

    async fn run_scan(self, mode: ScanMode) {
        let deadline = match mode {
            ScanMode::Timed(duration) => Some(Instant::now() + duration),
            ScanMode::Continuous => None,
        };
        let continuous = deadline.is_none();
        let mut ticker = tokio::time::interval(self.interval);
        let mut health = tokio::time::interval(self.health.check_interval);
        let mut watchdog = ScanWatchdog::new(self.health, Instant::now());
        let mut replay_pos = 0usize;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = health.tick(), if continuous => {
                    if !self.check_health(&mut watchdog).await {
                        return;
                    }
                    continue;
                }
                () = sleep_until(deadline) => {
                    debug!("mock scan finished");
                    let _ = self.events.send(RadioEvent::ScanCompleted).await;
                    return;
                }
            }

            let batch: Vec<RawObservation> = self
                .state
                .devices
                .read()
                .await
                .iter()
                .map(|d| Self::announce(&d.observation))
                .collect();
            let mut announced = !batch.is_empty();
            for obs in batch {
                if self.events.send(RadioEvent::Discovered(obs)).await.is_err() {
                    return;
                }
            }

            if let Some(obs) = self.state.replay.get(replay_pos) {
                replay_pos = (replay_pos + 1) % self.state.replay.len();
                let obs = Self::announce(obs);
                if self.events.send(RadioEvent::Discovered(obs)).await.is_err() {
                    return;
                }
                announced = true;
            }

            if announced {
                watchdog.record_event(Instant::now());
            }
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[async_trait]
impl Radio for MockRadio {
    fn backend(&self) -> &'static str {
        "mock"
    }

    async fn adapters(&self) -> Result<Vec<AdapterInfo>, RadioError> {
        Ok(vec![AdapterInfo {
            powered: self.is_powered(),
            ..self.adapter.clone()
        }])
    }

    async fn start_scan(&self, mode: ScanMode) -> Result<(), RadioError> {
        if !self.is_powered() {
            return Err(RadioError::AdapterPoweredOff);
        }
        let mut task = self.state.scan_task.lock().await;
        if let Some(previous) = task.take() {
            previous.abort();
        }
        let _ = self.events.send(RadioEvent::ScanStarted).await;
        *task = Some(tokio::spawn(self.clone().run_scan(mode)));
        info!(?mode, "mock scan started");
        Ok(())
    }

    async fn stop_scan(&self) -> Result<(), RadioError> {
        if let Some(task) = self.state.scan_task.lock().await.take() {
            task.abort();
            info!("mock scan stopped");
        }
        Ok(())
    }

    async fn is_scanning(&self) -> bool {
        self.state
            .scan_task
            .lock()
            .await
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }

    async fn connect(&self, identity: &str) -> Result<(), RadioError> {
        let device = self.device(identity).await?;
        if device.fail_connect {
            return Err(RadioError::GattOperationFailed {
                operation: "connect".to_string(),
                message: "peer rejected connection".to_string(),
            });
        }
        if self.state.connected.write().await.insert(identity.to_string()) {
            self.inject(RadioEvent::ConnectionChanged {
                identity: identity.to_string(),
                paired: true,
            })
            .await;
        }
        Ok(())
    }

    async fn disconnect(&self, identity: &str) -> Result<(), RadioError> {
        self.device(identity).await?;
        if self.state.connected.write().await.remove(identity) {
            self.state
                .subscriptions
                .write()
                .await
                .retain(|(id, _, _), _| !id.eq_ignore_ascii_case(identity));
            self.inject(RadioEvent::ConnectionChanged {
                identity: identity.to_string(),
                paired: false,
            })
            .await;
        }
        Ok(())
    }

    async fn is_connected(&self, identity: &str) -> Result<bool, RadioError> {
        let device = self.device(identity).await?;
        if device.fail_verify {
            return Err(RadioError::Internal {
                message: "connection state unavailable".to_string(),
            });
        }
        Ok(self.state.connected.read().await.contains(identity))
    }

    async fn mtu(&self, identity: &str) -> Result<u16, RadioError> {
        self.connected_device(identity).await?;
        Ok(MOCK_MTU)
    }

    async fn services(&self, identity: &str) -> Result<Vec<GattService>, RadioError> {
        Ok(self.connected_device(identity).await?.services)
    }

    async fn read_characteristic(
        &self,
        identity: &str,
        service: &str,
        characteristic: &str,
    ) -> Result<String, RadioError> {
        let c = self.characteristic(identity, service, characteristic).await?;
        if !c.supports(CharacteristicProperty::Read) {
            return Err(RadioError::Unsupported {
                operation: format!("read {characteristic}"),
            });
        }
        let key = characteristic_key(identity, service, characteristic);
        let value = self
            .state
            .values
            .read()
            .await
            .get(&key)
            .cloned()
            .unwrap_or_default();
        Ok(hex_from_bytes(&value))
    }

    async fn write_characteristic(
        &self,
        identity: &str,
        service: &str,
        characteristic: &str,
        value: &[u8],
        kind: WriteKind,
    ) -> Result<(), RadioError> {
        let c = self.characteristic(identity, service, characteristic).await?;
        let required = match kind {
            WriteKind::Request => CharacteristicProperty::Write,
            WriteKind::Command => CharacteristicProperty::WriteWithoutResponse,
        };
        if !c.supports(required) {
            return Err(RadioError::Unsupported {
                operation: format!("{kind:?} write {characteristic}"),
            });
        }

        let key = characteristic_key(identity, service, characteristic);
        self.state.values.write().await.insert(key.clone(), value.to_vec());

        let subscribed = self.state.subscriptions.read().await.get(&key).copied();
        if let Some(sub) = subscribed {
            self.inject(RadioEvent::CharacteristicValue {
                identity: identity.to_string(),
                service: service.to_string(),
                characteristic: characteristic.to_string(),
                value_hex: hex_from_bytes(value),
                kind: sub,
            })
            .await;
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        identity: &str,
        service: &str,
        characteristic: &str,
        kind: SubscriptionKind,
    ) -> Result<(), RadioError> {
        let c = self.characteristic(identity, service, characteristic).await?;
        let required = match kind {
            SubscriptionKind::Notify => CharacteristicProperty::Notify,
            SubscriptionKind::Indicate => CharacteristicProperty::Indicate,
        };
        if !c.supports(required) {
            return Err(RadioError::Unsupported {
                operation: format!("{kind:?} {characteristic}"),
            });
        }
        self.state
            .subscriptions
            .write()
            .await
            .insert(characteristic_key(identity, service, characteristic), kind);
        Ok(())
    }

    async fn unsubscribe(
        &self,
        identity: &str,
        service: &str,
        characteristic: &str,
    ) -> Result<(), RadioError> {
        self.state
            .subscriptions
            .write()
            .await
            .remove(&characteristic_key(identity, service, characteristic));
        Ok(())
    }
}

/// A small fixed population used by the server when no hardware backend is built in.
#[must_use]
pub fn demo_devices() -> Vec<MockDevice> {
    use CharacteristicProperty::{Indicate, Notify, Read, Write, WriteWithoutResponse};

    let buds = RawObservation {
        name: Some("JL Buds Pro".to_string()),
        rssi: Some(-52),
        connectable: true,
        manufacturer_data: BTreeMap::from([(
            "5583".to_string(),
            "0201040325AABBCCDDEEFF00E4320A0700000011223344556677880000".to_string(),
        )]),
        services: vec!["180F".to_string(), "FE26".to_string()],
        raw_adv_data: Some(
            "1EFF835502010403250C1D2E3F4A5B01E4320A070000001122334455667788".to_string(),
        ),
        ..RawObservation::new("0C:1D:2E:3F:4A:5B", "0C:1D:2E:3F:4A:5B")
    };

    let beacon = RawObservation {
        rssi: Some(-78),
        manufacturer_data: BTreeMap::from([(
            "004C".to_string(),
            "0215E2C56DB5DFFB48D2B060D0F5A71096E000010002C5".to_string(),
        )]),
        ..RawObservation::new("D4:8A:21:00:11:22", "D4:8A:21:00:11:22")
    };

    let heart = RawObservation {
        name: Some("HRM Strap".to_string()),
        rssi: Some(-64),
        tx_power: Some(0),
        connectable: true,
        services: vec!["180D".to_string(), "180F".to_string()],
        ..RawObservation::new("F0:0D:CA:FE:00:01", "F0:0D:CA:FE:00:01")
    };

    let uart = RawObservation {
        name: Some("nRF UART".to_string()),
        rssi: None,
        connectable: true,
        services: vec!["6E400001-B5A3-F393-E0A9-E50E24DCCA9E".to_string()],
        ..RawObservation::new("C3:00:00:00:00:42", "C3:00:00:00:00:42")
    };

    let battery_service = GattService {
        uuid: "180F".to_string(),
        characteristics: vec![GattCharacteristic {
            uuid: "2A19".to_string(),
            properties: vec![Read, Notify],
        }],
    };

    vec![
        MockDevice {
            observation: buds,
            services: vec![battery_service.clone()],
            values: vec![("180F".into(), "2A19".into(), vec![0x5A])],
            ..MockDevice::default()
        },
        MockDevice::new(beacon),
        MockDevice {
            observation: heart,
            services: vec![
                GattService {
                    uuid: "180D".to_string(),
                    characteristics: vec![GattCharacteristic {
                        uuid: "2A37".to_string(),
                        properties: vec![Notify],
                    }],
                },
                battery_service,
            ],
            values: vec![("180F".into(), "2A19".into(), vec![0x40])],
            ..MockDevice::default()
        },
        MockDevice {
            observation: uart,
            services: vec![GattService {
                uuid: "6E400001-B5A3-F393-E0A9-E50E24DCCA9E".to_string(),
                characteristics: vec![
                    GattCharacteristic {
                        uuid: "6E400002-B5A3-F393-E0A9-E50E24DCCA9E".to_string(),
                        properties: vec![Write, WriteWithoutResponse],
                    },
                    GattCharacteristic {
                        uuid: "6E400003-B5A3-F393-E0A9-E50E24DCCA9E".to_string(),
                        properties: vec![Notify, Indicate],
                    },
                ],
            }],
            ..MockDevice::default()
        },
    ]
}
