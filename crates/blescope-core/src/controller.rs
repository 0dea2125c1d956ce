//! Connect/disconnect commands with per-device mutual exclusion.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::error::Result;
use crate::guard::InFlightSet;
use crate::monitor::MonitorHandle;
use crate::radio::Radio;

/// Which command was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionAction {
    /// Connect to the device.
    Connect,
    /// Disconnect from the device.
    Disconnect,
}

impl ConnectionAction {
    /// Pairing state the command is meant to produce.
    #[must_use]
    pub const fn intended_state(self) -> bool {
        matches!(self, Self::Connect)
    }
}

/// Result of a settled command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "identity": "0C:1D:2E:3F:4A:5B",
    "action": "connect",
    "paired": true,
    "verified": true
}))]
pub struct ConnectionOutcome {
    /// Device identity.
    pub identity: String,
    /// Command issued.
    pub action: ConnectionAction,
    /// Pairing flag now recorded in the catalog.
    pub paired: bool,
    /// Whether the radio confirmed the state; `false` means it was assumed.
    pub verified: bool,
}

/// Issues radio connection commands, one at a time per device.
#[derive(Clone)]
pub struct DeviceController {
    radio: Arc<dyn Radio>,
    monitor: MonitorHandle,
    in_flight: InFlightSet,
}

impl std::fmt::Debug for DeviceController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceController")
            .field("radio", &self.radio.backend())
            .field("in_flight", &self.in_flight)
            .finish_non_exhaustive()
    }
}

impl DeviceController {
    /// Create a controller over `radio`, reporting state changes to `monitor`.
    #[must_use]
    pub fn new(radio: Arc<dyn Radio>, monitor: MonitorHandle) -> Self {
        Self {
            radio,
            monitor,
            in_flight: InFlightSet::new(),
        }
    }

    /// Identities with a command currently running.
    #[must_use]
    pub const fn in_flight(&self) -> &InFlightSet {
        &self.in_flight
    }

    /// Connect to `identity`.
    ///
    /// Returns `Ok(None)` if a command for this identity is already running.
    ///
    /// # Errors
    ///
    /// Radio failures are returned unchanged; nothing is retried.
    pub async fn connect(&self, identity: &str) -> Result<Option<ConnectionOutcome>> {
        self.run(identity, ConnectionAction::Connect).await
    }

    /// Disconnect from `identity`.
    ///
    /// Returns `Ok(None)` if a command for this identity is already running.
    ///
    /// # Errors
    ///
    /// Radio failures are returned unchanged; nothing is retried.
    pub async fn disconnect(&self, identity: &str) -> Result<Option<ConnectionOutcome>> {
        self.run(identity, ConnectionAction::Disconnect).await
    }

    async fn run(
        &self,
        identity: &str,
        action: ConnectionAction,
    ) -> Result<Option<ConnectionOutcome>> {
        let Some(_permit) = self.in_flight.try_acquire(identity) else {
            warn!(identity = %identity, ?action, "command already in flight, ignoring");
            return Ok(None);
        };

        match action {
            ConnectionAction::Connect => self.radio.connect(identity).await?,
            ConnectionAction::Disconnect => self.radio.disconnect(identity).await?,
        }

        let (paired, verified) = match self.radio.is_connected(identity).await {
            Ok(connected) => (connected, true),
            Err(e) => {
                warn!(
                    identity = %identity,
                    ?action,
                    error = %e,
                    "could not verify connection state, assuming command took effect"
                );
                (action.intended_state(), false)
            }
        };

        self.monitor.apply_connection_state(identity, paired).await?;
        info!(identity = %identity, ?action, paired, verified, "connection command settled");

        Ok(Some(ConnectionOutcome {
            identity: identity.to_string(),
            action,
            paired,
            verified,
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::device::RawObservation;
    use crate::error::BlescopeError;
    use crate::monitor;
    use crate::radio::{event_channel, MockDevice, MockRadio, RadioEvent};

    async fn setup(devices: Vec<MockDevice>) -> (DeviceController, MonitorHandle) {
        let (tx, rx) = event_channel();
        let monitor = monitor::spawn(rx, Duration::from_secs(3600));
        for d in &devices {
            tx.send(RadioEvent::Discovered(d.observation.clone())).await.unwrap();
        }
        monitor.flush_now().await.unwrap();
        let radio = Arc::new(MockRadio::new(devices, tx));
        (DeviceController::new(radio, monitor.clone()), monitor)
    }

    fn device(id: &str) -> MockDevice {
        MockDevice::new(RawObservation::new(id, id))
    }

    #[tokio::test]
    async fn test_connect_and_disconnect_verified() {
        let (controller, monitor) = setup(vec![device("A")]).await;

        let outcome = controller.connect("A").await.unwrap().unwrap();
        assert!(outcome.paired);
        assert!(outcome.verified);
        assert!(monitor.snapshot().device("A").unwrap().paired);

        let outcome = controller.disconnect("A").await.unwrap().unwrap();
        assert!(!outcome.paired);
        assert!(outcome.verified);
        assert!(!monitor.snapshot().device("A").unwrap().paired);
        assert!(controller.in_flight().is_empty());
    }

    #[tokio::test]
    async fn test_unverified_connect_assumes_intended_state() {
        let mut d = device("A");
        d.fail_verify = true;
        let (controller, monitor) = setup(vec![d]).await;

        let outcome = controller.connect("A").await.unwrap().unwrap();
        assert!(outcome.paired);
        assert!(!outcome.verified);
        assert!(monitor.snapshot().device("A").unwrap().paired);

        let outcome = controller.disconnect("A").await.unwrap().unwrap();
        assert!(!outcome.paired);
        assert!(!outcome.verified);
    }

    #[tokio::test]
    async fn test_radio_failure_is_returned_and_releases_guard() {
        let mut d = device("A");
        d.fail_connect = true;
        let (controller, _monitor) = setup(vec![d]).await;

        let err = controller.connect("A").await.unwrap_err();
        assert!(matches!(err, BlescopeError::RadioOperationFailed(_)));
        assert!(!controller.in_flight().contains("A"));
    }

    #[tokio::test]
    async fn test_in_flight_command_is_rejected() {
        let (controller, _monitor) = setup(vec![device("A")]).await;

        let _held = controller.in_flight().try_acquire("A").unwrap();
        assert_eq!(controller.connect("A").await.unwrap(), None);
        assert_eq!(controller.disconnect("A").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unknown_device() {
        let (controller, _monitor) = setup(vec![]).await;
        assert!(matches!(
            controller.connect("missing").await,
            Err(BlescopeError::DeviceNotFound(_))
        ));
    }
}
