// src/worldinfo.rs

use crate::api::ApiClient;
use crate::errors::ParleyResult;
use crate::models::WorldInfoEntry;
use log::warn;
use serde_json::{json, Value};

/// Fetches world-info entries. The server answers with either a bare
/// array, `{ "entries": [...] }`, or `{ "data": [...] }` depending on
/// version; all three layouts are accepted. An unrecognized layout reads
/// as no entries rather than an error.
pub async fn fetch_world_info(api: &ApiClient) -> ParleyResult<Vec<WorldInfoEntry>> {
    let response = api.post("/api/worldinfo/get", &json!({})).await?;

    let entries = match &response {
        Value::Array(items) => items.clone(),
        Value::Object(map) => match map.get("entries").or_else(|| map.get("data")) {
            Some(Value::Array(items)) => items.clone(),
            _ => {
                warn!("unrecognized world-info response layout");
                Vec::new()
            }
        },
        _ => {
            warn!("unrecognized world-info response layout");
            Vec::new()
        }
    };

    Ok(serde_json::from_value(Value::Array(entries))?)
}

/// Creates or updates one entry.
pub async fn edit_world_info(api: &ApiClient, entry: &WorldInfoEntry) -> ParleyResult<()> {
    api.post("/api/worldinfo/edit", &serde_json::to_value(entry)?)
        .await?;
    Ok(())
}

pub async fn delete_world_info(api: &ApiClient, uid: &str) -> ParleyResult<()> {
    api.post("/api/worldinfo/delete", &json!({ "uid": uid }))
        .await?;
    Ok(())
}

/// Imports a whole world-info book as served by another instance.
pub async fn import_world_info(api: &ApiClient, book: &Value) -> ParleyResult<()> {
    api.post("/api/worldinfo/import", book).await?;
    Ok(())
}
