//! Display settings API endpoints.
//!
//! Changes are broadcast to every `/api/events` subscriber as a `settings`
//! event, so all open clients switch theme and locale together.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use blescope_core::{Settings, SettingsUpdate};

use crate::state::SharedState;

/// Creates the settings router.
pub fn router() -> Router<SharedState> {
    Router::new().route("/", get(get_settings).put(update_settings))
}

/// Get display settings.
#[utoipa::path(
    get,
    path = "/api/settings",
    tag = "settings",
    operation_id = "getSettings",
    summary = "Get theme and locale",
    responses(
        (status = 200, description = "Current settings", body = Settings)
    )
)]
pub async fn get_settings(State(state): State<SharedState>) -> Json<Settings> {
    Json(state.settings.current())
}

/// Update display settings.
#[utoipa::path(
    put,
    path = "/api/settings",
    tag = "settings",
    operation_id = "updateSettings",
    summary = "Update theme and/or locale",
    description = "Fields left out are unchanged. Subscribers are notified only when \
        something actually changed.",
    request_body = SettingsUpdate,
    responses(
        (status = 200, description = "Resulting settings", body = Settings),
        (status = 422, description = "Unknown theme or locale")
    )
)]
pub async fn update_settings(
    State(state): State<SharedState>,
    Json(update): Json<SettingsUpdate>,
) -> Json<Settings> {
    Json(state.settings.apply(update))
}
