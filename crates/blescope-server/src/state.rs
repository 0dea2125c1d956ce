//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Instant;

use blescope_core::radio::{event_channel, RadioEventSender};
use blescope_core::{
    monitor, Config, DeviceController, MonitorHandle, NameRegistry, Radio, SettingsBus,
};
use tracing::info;

/// Handle passed to every handler.
pub type SharedState = Arc<AppState>;

/// Shared application state.
///
/// Nothing here needs a lock: the catalog lives in the monitor task, the
/// controller and settings bus synchronise internally, and the config is
/// read-only once the server is up.
pub struct AppState {
    /// Loaded configuration.
    pub config: Config,
    /// Radio backend.
    pub radio: Arc<dyn Radio>,
    /// Handle to the task that owns the device catalog.
    pub monitor: MonitorHandle,
    /// Connect/disconnect with the in-flight guard.
    pub controller: DeviceController,
    /// Theme and locale shared with every connected client.
    pub settings: SettingsBus,
    /// Company, service and characteristic names.
    pub names: Arc<NameRegistry>,
    started_at: Instant,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("radio", &self.radio.backend())
            .field("monitor", &self.monitor)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Assemble state around an already running monitor.
    #[must_use]
    pub fn new(config: Config, radio: Arc<dyn Radio>, monitor: MonitorHandle) -> SharedState {
        let controller = DeviceController::new(Arc::clone(&radio), monitor.clone());
        Arc::new(Self {
            config,
            radio,
            monitor,
            controller,
            settings: SettingsBus::default(),
            names: NameRegistry::global(),
            started_at: Instant::now(),
        })
    }

    /// Build the radio selected at compile time and start the monitor.
    ///
    /// # Errors
    ///
    /// Returns an error if the radio backend cannot be initialised.
    pub async fn from_config(config: Config) -> anyhow::Result<SharedState> {
        let (events_tx, events_rx) = event_channel();
        let radio = build_radio(&config, events_tx).await?;
        info!(backend = radio.backend(), "radio ready");

        let monitor = monitor::spawn(events_rx, config.scan.flush_interval());
        Ok(Self::new(config, radio, monitor))
    }

    /// Seconds since the state was built.
    #[must_use]
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

#[cfg(all(feature = "bluetooth", not(feature = "mock-radio")))]
async fn build_radio(config: &Config, events: RadioEventSender) -> anyhow::Result<Arc<dyn Radio>> {
    let radio = blescope_core::BluerRadio::new(config.radio.adapter.as_deref(), events).await?;
    Ok(Arc::new(radio))
}

#[cfg(any(feature = "mock-radio", not(feature = "bluetooth")))]
async fn build_radio(config: &Config, events: RadioEventSender) -> anyhow::Result<Arc<dyn Radio>> {
    use std::time::Duration;

    use blescope_core::radio::demo_devices;
    use blescope_core::MockRadio;

    let mut radio = MockRadio::new(demo_devices(), events)
        .with_interval(Duration::from_millis(config.radio.replay_interval_ms));
    if let Some(path) = &config.radio.replay_file {
        radio = radio.with_replay_file(path).await?;
    }
    Ok(Arc::new(radio))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_from_config_uses_mock_radio() {
        let state = AppState::from_config(Config::default()).await.unwrap();
        assert_eq!(state.radio.backend(), "mock");
        assert!(state.monitor.snapshot().devices.is_empty());
        assert_eq!(state.uptime_secs(), 0);
        state.monitor.shutdown().await;
    }
}
