// src/settings.rs

use crate::api::ApiClient;
use crate::errors::{ParleyError, ParleyResult};
use crate::models::Settings;
use serde_json::{json, Value};

/// Fetches the server settings. The server wraps the settings object in a
/// `{ "settings": "<json string>" }` envelope; the inner string is parsed
/// here so callers only ever see the typed object.
pub async fn fetch_settings(api: &ApiClient) -> ParleyResult<Settings> {
    let envelope = api.post("/api/settings/get", &json!({})).await?;

    let inner = envelope
        .get("settings")
        .and_then(Value::as_str)
        .ok_or_else(|| ParleyError::api_error(200, "settings response missing payload"))?;

    Ok(serde_json::from_str(inner)?)
}

/// Writes the full settings object back to the server.
pub async fn push_settings(api: &ApiClient, settings: &Settings) -> ParleyResult<()> {
    api.post("/api/settings/save", &serde_json::to_value(settings)?)
        .await?;
    Ok(())
}
