//! BlueZ radio backend (Linux, via `bluer`).
//!
//! Device identity is the peer address as printed by BlueZ.
//!
//! Continuous discovery is watched by a [`ScanWatchdog`]: a powered-off
//! adapter ends the scan with [`RadioEvent::ScanError`], a stalled one is
//! restarted and reported with [`RadioEvent::ScanInfo`].

use std::collections::{BTreeMap, HashMap};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bluer::gatt::remote::{Characteristic, CharacteristicWriteRequest};
use bluer::gatt::WriteOp;
use bluer::{Adapter, AdapterEvent, Address, Session};
use futures::{pin_mut, Stream, StreamExt};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{
    characteristic_key, same_uuid, CharacteristicKey, CharacteristicProperty, GattCharacteristic,
    GattService, Radio, RadioError, RadioEvent, RadioEventSender, ScanHealthPolicy, ScanMode,
    ScanWatchdog, SubscriptionKind, WriteKind,
};
use crate::advertisement::synthesize_raw_advertisement;
use crate::device::{AdapterInfo, RawObservation};
use crate::hex::hex_from_bytes;

/// Pause between stopping and restarting a stalled discovery session.
const RESTART_PAUSE: Duration = Duration::from_millis(200);

type DiscoveryStream = Pin<Box<dyn Stream<Item = AdapterEvent> + Send>>;

fn gatt_error(operation: &str, err: &bluer::Error) -> RadioError {
    RadioError::GattOperationFailed {
        operation: operation.to_string(),
        message: err.to_string(),
    }
}

fn uuid_string(uuid: bluer::Uuid) -> String {
    uuid.to_string().to_ascii_uppercase()
}

/// [`Radio`] backed by the system BlueZ daemon.
pub struct BluerRadio {
    session: Session,
    adapter: Adapter,
    events: RadioEventSender,
    scan_task: Mutex<Option<JoinHandle<()>>>,
    notify_tasks: Arc<Mutex<HashMap<CharacteristicKey, JoinHandle<()>>>>,
    health: ScanHealthPolicy,
}

impl BluerRadio {
    /// Open a BlueZ session on the named adapter, or the default one.
    ///
    /// # Errors
    ///
    /// Returns [`RadioError::SessionInitFailed`] when D-Bus or BlueZ is unavailable,
    /// [`RadioError::AdapterNotFound`] or [`RadioError::AdapterPoweredOff`] otherwise.
    pub async fn new(adapter: Option<&str>, events: RadioEventSender) -> Result<Self, RadioError> {
        let session = Session::new()
            .await
            .map_err(|e| RadioError::SessionInitFailed { message: e.to_string() })?;

        let adapter = match adapter {
            Some(name) => session.adapter(name),
            None => session.default_adapter().await,
        }
        .map_err(|_| RadioError::AdapterNotFound)?;

        if !adapter.is_powered().await.unwrap_or(false) {
            return Err(RadioError::AdapterPoweredOff);
        }
        info!(adapter = adapter.name(), "BlueZ adapter ready");

        Ok(Self {
            session,
            adapter,
            events,
            scan_task: Mutex::new(None),
            notify_tasks: Arc::new(Mutex::new(HashMap::new())),
            health: ScanHealthPolicy::default(),
        })
    }

    /// Set the continuous-scan watchdog timings.
    #[must_use]
    pub const fn with_health_policy(mut self, policy: ScanHealthPolicy) -> Self {
        self.health = policy;
        self
    }

    fn address(identity: &str) -> Result<Address, RadioError> {
        identity.parse().map_err(|_| RadioError::InvalidAddress {
            address: identity.to_string(),
        })
    }

    fn device(&self, identity: &str) -> Result<bluer::Device, RadioError> {
        self.adapter
            .device(Self::address(identity)?)
            .map_err(|_| RadioError::DeviceNotFound {
                identity: identity.to_string(),
            })
    }

    async fn find_characteristic(
        &self,
        identity: &str,
        service: &str,
        characteristic: &str,
    ) -> Result<Characteristic, RadioError> {
        let device = self.device(identity)?;
        let services = device.services().await.map_err(|e| gatt_error("discover services", &e))?;
        for s in services {
            let Ok(uuid) = s.uuid().await else { continue };
            if !same_uuid(&uuid_string(uuid), service) {
                continue;
            }
            let chars = s.characteristics().await.map_err(|e| gatt_error("discover characteristics", &e))?;
            for c in chars {
                if let Ok(uuid) = c.uuid().await {
                    if same_uuid(&uuid_string(uuid), characteristic) {
                        return Ok(c);
                    }
                }
            }
        }
        Err(RadioError::CharacteristicNotFound {
            service: service.to_string(),
            characteristic: characteristic.to_string(),
        })
    }
}

async fn observe(adapter: &Adapter, address: Address) -> Option<RawObservation> {
    let device = adapter.device(address).ok()?;
    let identity = address.to_string();

    let manufacturer_data: BTreeMap<String, String> = device
        .manufacturer_data()
        .await
        .ok()
        .flatten()
        .unwrap_or_default()
        .into_iter()
        .map(|(id, data)| (format!("{id:04X}"), hex_from_bytes(&data)))
        .collect();

    let mut services: Vec<String> = device
        .uuids()
        .await
        .ok()
        .flatten()
        .unwrap_or_default()
        .into_iter()
        .map(uuid_string)
        .collect();
    services.sort();

    let raw_adv_data = synthesize_raw_advertisement(&manufacturer_data);

    Some(RawObservation {
        identifier: identity.clone(),
        name: device.name().await.ok().flatten(),
        address: identity,
        rssi: device.rssi().await.ok().flatten(),
        tx_power: device.tx_power().await.ok().flatten(),
        // BlueZ does not expose the advertising PDU type
        connectable: true,
        paired: device.is_connected().await.unwrap_or(false),
        manufacturer_data,
        services,
        adv_data: None,
        raw_adv_data,
    })
}

async fn start_discovery(adapter: &Adapter) -> bluer::Result<DiscoveryStream> {
    let stream = adapter.discover_devices_with_changes().await?;
    Ok(Box::pin(stream))
}

async fn run_discovery(
    adapter: Adapter,
    events: RadioEventSender,
    mode: ScanMode,
    policy: ScanHealthPolicy,
) {
    let mut stream = match start_discovery(&adapter).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!(error = %e, "discovery failed to start");
            let _ = events.send(RadioEvent::ScanError(e.to_string())).await;
            return;
        }
    };

    let deadline = match mode {
        ScanMode::Timed(d) => Some(Instant::now() + d),
        ScanMode::Continuous => None,
    };
    let continuous = deadline.is_none();
    let expired = async {
        match deadline {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending().await,
        }
    };
    pin_mut!(expired);

    let mut health = tokio::time::interval(policy.check_interval);
    let mut watchdog = ScanWatchdog::new(policy, Instant::now());

    loop {
        tokio::select! {
            () = &mut expired => {
                debug!("timed discovery finished");
                let _ = events.send(RadioEvent::ScanCompleted).await;
                return;
            }
            _ = health.tick(), if continuous => {
                if !adapter.is_powered().await.unwrap_or(false) {
                    warn!(adapter = adapter.name(), "adapter powered off during discovery");
                    let message = RadioError::AdapterPoweredOff.to_string();
                    let _ = events.send(RadioEvent::ScanError(message)).await;
                    return;
                }

                let now = Instant::now();
                if !watchdog.should_restart(now) {
                    continue;
                }
                let silent = watchdog.silent_for(now);
                warn!(?silent, restarts = watchdog.restarts(), "discovery stalled, restarting");

                // dropping the stream ends the current discovery session
                stream = Box::pin(futures::stream::empty());
                tokio::time::sleep(RESTART_PAUSE).await;
                stream = match start_discovery(&adapter).await {
                    Ok(fresh) => fresh,
                    Err(e) => {
                        warn!(error = %e, "discovery restart failed");
                        let message = format!("scan restart failed: {e}");
                        let _ = events.send(RadioEvent::ScanError(message)).await;
                        return;
                    }
                };
                watchdog.record_restart(Instant::now());
                let notice = format!("scan restarted after {}s without events", silent.as_secs());
                let _ = events.send(RadioEvent::ScanInfo(notice)).await;
            }
            event = stream.next() => {
                watchdog.record_event(Instant::now());
                match event {
                    Some(AdapterEvent::DeviceAdded(address)) => {
                        if let Some(obs) = observe(&adapter, address).await {
                            if events.send(RadioEvent::Discovered(obs)).await.is_err() {
                                return;
                            }
                        }
                    }
                    Some(_) => {}
                    None => {
                        let _ = events.send(RadioEvent::ScanError("discovery stream ended".into())).await;
                        return;
                    }
                }
            }
        }
    }
}

#[async_trait]
impl Radio for BluerRadio {
    fn backend(&self) -> &'static str {
        "bluez"
    }

    async fn adapters(&self) -> Result<Vec<AdapterInfo>, RadioError> {
        let names = self
            .session
            .adapter_names()
            .await
            .map_err(|e| RadioError::Internal { message: e.to_string() })?;
        let mut adapters = Vec::with_capacity(names.len());
        for name in names {
            let Ok(adapter) = self.session.adapter(&name) else { continue };
            adapters.push(AdapterInfo {
                address: adapter
                    .address()
                    .await
                    .map(|a| a.to_string())
                    .unwrap_or_default(),
                powered: adapter.is_powered().await.unwrap_or(false),
                identifier: name,
            });
        }
        Ok(adapters)
    }

    async fn start_scan(&self, mode: ScanMode) -> Result<(), RadioError> {
        let mut task = self.scan_task.lock().await;
        if let Some(previous) = task.take() {
            previous.abort();
        }
        let _ = self.events.send(RadioEvent::ScanStarted).await;
        *task = Some(tokio::spawn(run_discovery(
            self.adapter.clone(),
            self.events.clone(),
            mode,
            self.health,
        )));
        info!(?mode, "BlueZ discovery started");
        Ok(())
    }

    async fn stop_scan(&self) -> Result<(), RadioError> {
        if let Some(task) = self.scan_task.lock().await.take() {
            // dropping the stream ends the BlueZ discovery session
            task.abort();
            info!("BlueZ discovery stopped");
        }
        Ok(())
    }

    async fn is_scanning(&self) -> bool {
        self.scan_task
            .lock()
            .await
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }

    async fn connect(&self, identity: &str) -> Result<(), RadioError> {
        self.device(identity)?
            .connect()
            .await
            .map_err(|e| gatt_error("connect", &e))?;
        let _ = self
            .events
            .send(RadioEvent::ConnectionChanged { identity: identity.to_string(), paired: true })
            .await;
        Ok(())
    }

    async fn disconnect(&self, identity: &str) -> Result<(), RadioError> {
        self.device(identity)?
            .disconnect()
            .await
            .map_err(|e| gatt_error("disconnect", &e))?;
        self.notify_tasks
            .lock()
            .await
            .retain(|(id, _, _), task| {
                let keep = !id.eq_ignore_ascii_case(identity);
                if !keep {
                    task.abort();
                }
                keep
            });
        let _ = self
            .events
            .send(RadioEvent::ConnectionChanged { identity: identity.to_string(), paired: false })
            .await;
        Ok(())
    }

    async fn is_connected(&self, identity: &str) -> Result<bool, RadioError> {
        self.device(identity)?
            .is_connected()
            .await
            .map_err(|e| RadioError::Internal { message: e.to_string() })
    }

    async fn mtu(&self, identity: &str) -> Result<u16, RadioError> {
        let device = self.device(identity)?;
        if !device.is_connected().await.unwrap_or(false) {
            return Err(RadioError::NotConnected {
                identity: identity.to_string(),
            });
        }
        // BlueZ exposes the negotiated MTU per characteristic; any one will do
        for s in device.services().await.map_err(|e| gatt_error("discover services", &e))? {
            let chars = s
                .characteristics()
                .await
                .map_err(|e| gatt_error("discover characteristics", &e))?;
            for c in chars {
                if let Ok(mtu) = c.mtu().await {
                    return Ok(u16::try_from(mtu).unwrap_or(u16::MAX));
                }
            }
        }
        Err(RadioError::Unsupported {
            operation: "mtu".to_string(),
        })
    }

    async fn services(&self, identity: &str) -> Result<Vec<GattService>, RadioError> {
        let device = self.device(identity)?;
        let mut out = Vec::new();
        for s in device.services().await.map_err(|e| gatt_error("discover services", &e))? {
            let uuid = s.uuid().await.map_err(|e| gatt_error("service uuid", &e))?;
            let mut characteristics = Vec::new();
            for c in s
                .characteristics()
                .await
                .map_err(|e| gatt_error("discover characteristics", &e))?
            {
                let uuid = c.uuid().await.map_err(|e| gatt_error("characteristic uuid", &e))?;
                let flags = c.flags().await.map_err(|e| gatt_error("characteristic flags", &e))?;
                let properties = [
                    (flags.read, CharacteristicProperty::Read),
                    (flags.write, CharacteristicProperty::Write),
                    (flags.write_without_response, CharacteristicProperty::WriteWithoutResponse),
                    (flags.notify, CharacteristicProperty::Notify),
                    (flags.indicate, CharacteristicProperty::Indicate),
                ]
                .into_iter()
                .filter_map(|(set, p)| set.then_some(p))
                .collect();
                characteristics.push(GattCharacteristic {
                    uuid: uuid_string(uuid),
                    properties,
                });
            }
            out.push(GattService {
                uuid: uuid_string(uuid),
                characteristics,
            });
        }
        Ok(out)
    }

    async fn read_characteristic(
        &self,
        identity: &str,
        service: &str,
        characteristic: &str,
    ) -> Result<String, RadioError> {
        let c = self.find_characteristic(identity, service, characteristic).await?;
        let value = c.read().await.map_err(|e| gatt_error("read", &e))?;
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
        let c = self.find_characteristic(identity, service, characteristic).await?;
        let op_type = match kind {
            WriteKind::Request => WriteOp::Request,
            WriteKind::Command => WriteOp::Command,
        };
        let request = CharacteristicWriteRequest {
            op_type,
            ..CharacteristicWriteRequest::default()
        };
        c.write_ext(value, &request)
            .await
            .map_err(|e| gatt_error("write", &e))
    }

    async fn subscribe(
        &self,
        identity: &str,
        service: &str,
        characteristic: &str,
        kind: SubscriptionKind,
    ) -> Result<(), RadioError> {
        let c = self.find_characteristic(identity, service, characteristic).await?;
        // BlueZ chooses notify or indicate from the characteristic flags
        let stream = c.notify().await.map_err(|e| gatt_error("subscribe", &e))?;

        let events = self.events.clone();
        let (id, svc, chr) = (identity.to_string(), service.to_string(), characteristic.to_string());
        let key = characteristic_key(identity, service, characteristic);
        let task = tokio::spawn(async move {
            pin_mut!(stream);
            while let Some(value) = stream.next().await {
                let event = RadioEvent::CharacteristicValue {
                    identity: id.clone(),
                    service: svc.clone(),
                    characteristic: chr.clone(),
                    value_hex: hex_from_bytes(&value),
                    kind,
                };
                if events.send(event).await.is_err() {
                    break;
                }
            }
        });

        if let Some(previous) = self.notify_tasks.lock().await.insert(key, task) {
            previous.abort();
        }
        Ok(())
    }

    async fn unsubscribe(
        &self,
        identity: &str,
        service: &str,
        characteristic: &str,
    ) -> Result<(), RadioError> {
        let key = characteristic_key(identity, service, characteristic);
        if let Some(task) = self.notify_tasks.lock().await.remove(&key) {
            task.abort();
        }
        Ok(())
    }
}
