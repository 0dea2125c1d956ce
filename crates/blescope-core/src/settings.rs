//! Display settings shared between presentation surfaces.
//!
//! Each surface subscribes to the [`SettingsBus`] and applies updates on its
//! own; nothing reads a shared global.

use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;
use utoipa::ToSchema;

/// Broadcast buffer for settings updates.
const SETTINGS_CHANNEL_CAPACITY: usize = 16;

/// Colour theme.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ThemeMode {
    /// Light theme.
    Light,
    /// Dark theme.
    Dark,
    /// Follow the operating system.
    #[default]
    Auto,
}

/// Interface language.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Locale {
    /// English.
    #[default]
    En,
    /// Simplified Chinese.
    Zh,
    /// Spanish.
    Es,
}

/// Theme and locale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({"theme": "dark", "locale": "en"}))]
pub struct Settings {
    /// Colour theme.
    pub theme: ThemeMode,
    /// Interface language.
    pub locale: Locale,
}

/// Partial update; absent fields are left unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({"theme": "light"}))]
pub struct SettingsUpdate {
    /// New theme.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<ThemeMode>,
    /// New locale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<Locale>,
}

/// In-memory settings with change notification.
#[derive(Debug, Clone)]
pub struct SettingsBus {
    current: Arc<RwLock<Settings>>,
    tx: broadcast::Sender<Settings>,
}

impl Default for SettingsBus {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

impl SettingsBus {
    /// Create a bus holding `initial`.
    #[must_use]
    pub fn new(initial: Settings) -> Self {
        let (tx, _) = broadcast::channel(SETTINGS_CHANNEL_CAPACITY);
        Self {
            current: Arc::new(RwLock::new(initial)),
            tx,
        }
    }

    /// Current settings.
    #[must_use]
    pub fn current(&self) -> Settings {
        *self.current.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply an update and notify subscribers if anything changed.
    ///
    /// Returns the resulting settings.
    pub fn apply(&self, update: SettingsUpdate) -> Settings {
        let (next, changed) = {
            let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
            let next = Settings {
                theme: update.theme.unwrap_or(current.theme),
                locale: update.locale.unwrap_or(current.locale),
            };
            let changed = next != *current;
            *current = next;
            (next, changed)
        };

        if changed {
            debug!(theme = ?next.theme, locale = ?next.locale, "settings changed");
            // no subscribers is fine
            let _ = self.tx.send(next);
        }
        next
    }

    /// Receive every subsequent change.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Settings> {
        self.tx.subscribe()
    }
}
