//! Server-Sent Events stream.
//!
//! One connection carries three event types:
//!
//! - `catalog`: a [`CatalogSnapshot`], sent on connect and after every publish
//! - `settings`: the current [`Settings`] on connect, then every change
//! - `characteristic`: a [`CharacteristicUpdate`] from a subscribed characteristic
//!
//! Slow clients skip intermediate snapshots rather than queueing them;
//! broadcast messages they fall behind on are dropped with a debug log.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::Router;
use blescope_core::{CatalogSnapshot, CharacteristicUpdate, Settings, SettingsBus};
use futures::stream::{self, Stream};
use serde::Serialize;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::{BroadcastStream, WatchStream};
use tokio_stream::StreamExt;
use tracing::debug;

use crate::state::SharedState;

/// Event name for catalog snapshots.
pub const CATALOG_EVENT: &str = "catalog";
/// Event name for settings changes.
pub const SETTINGS_EVENT: &str = "settings";
/// Event name for characteristic values.
pub const CHARACTERISTIC_EVENT: &str = "characteristic";

/// Creates the events router.
pub fn router() -> Router<SharedState> {
    Router::new().route("/", get(stream_events))
}

fn to_event<T: Serialize>(name: &'static str, data: &T) -> Option<Event> {
    match Event::default().event(name).json_data(data) {
        Ok(event) => Some(event),
        Err(e) => {
            debug!(event = name, error = %e, "failed to serialize event");
            None
        }
    }
}

fn lagged<T>(item: Result<T, BroadcastStreamRecvError>) -> Option<T> {
    match item {
        Ok(value) => Some(value),
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            debug!(skipped, "event subscriber lagged");
            None
        }
    }
}

/// Current settings followed by every later change.
///
/// The subscription is taken before the current value is read, so an update
/// racing the connect shows up as a second item rather than being lost.
fn settings_stream(bus: &SettingsBus) -> impl Stream<Item = Settings> {
    let updates = BroadcastStream::new(bus.subscribe()).filter_map(lagged);
    stream::once(std::future::ready(bus.current())).chain(updates)
}

/// Merge catalog, settings and characteristic streams into SSE events.
pub fn event_stream(state: &SharedState) -> impl Stream<Item = Result<Event, Infallible>> {
    let catalog = WatchStream::new(state.monitor.subscribe())
        .filter_map(|snapshot: Arc<CatalogSnapshot>| to_event(CATALOG_EVENT, &*snapshot));

    let settings = settings_stream(&state.settings)
        .filter_map(|settings: Settings| to_event(SETTINGS_EVENT, &settings));

    let values = BroadcastStream::new(state.monitor.characteristic_values())
        .filter_map(lagged)
        .filter_map(|update: CharacteristicUpdate| to_event(CHARACTERISTIC_EVENT, &update));

    catalog.merge(settings).merge(values).map(Ok)
}

/// Subscribe to live updates.
#[utoipa::path(
    get,
    path = "/api/events",
    tag = "events",
    operation_id = "streamEvents",
    summary = "Stream catalog, settings and characteristic updates",
    description = "Server-Sent Events. `catalog` carries a full catalog snapshot (sent \
        on connect and after every merge), `settings` carries theme and locale (sent on \
        connect and on change), `characteristic` carries values from subscribed \
        characteristics.",
    responses(
        (status = 200, description = "Event stream", content_type = "text/event-stream", body = String)
    )
)]
pub async fn stream_events(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    debug!("event stream opened");
    Sse::new(event_stream(&state)).keep_alive(KeepAlive::default())
}
