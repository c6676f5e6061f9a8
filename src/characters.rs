// src/characters.rs

use crate::api::ApiClient;
use crate::errors::ParleyResult;
use crate::models::{Character, ChatFileInfo};
use serde_json::{json, Value};
use std::collections::HashMap;

/// Lists every character the server knows about.
pub async fn fetch_characters(api: &ApiClient) -> ParleyResult<Vec<Character>> {
    api.post_json("/api/characters/all", &json!({})).await
}

/// Fetches one character by its avatar identifier.
pub async fn fetch_character(api: &ApiClient, avatar_url: &str) -> ParleyResult<Character> {
    api.post_json("/api/characters/get", &json!({ "avatar_url": avatar_url }))
        .await
}

/// Creates a character from a partial card; the server fills defaults and
/// returns the stored card.
pub async fn create_character(api: &ApiClient, character: &Value) -> ParleyResult<Character> {
    api.post_json("/api/characters/create", character).await
}

/// Edits a character in place. The payload must carry `avatar_url` to
/// identify the card.
pub async fn edit_character(api: &ApiClient, character: &Value) -> ParleyResult<()> {
    api.post("/api/characters/edit", character).await?;
    Ok(())
}

pub async fn delete_character(api: &ApiClient, avatar_url: &str) -> ParleyResult<()> {
    api.post(
        "/api/characters/delete",
        &json!({ "avatar_url": avatar_url }),
    )
    .await?;
    Ok(())
}

pub async fn duplicate_character(api: &ApiClient, avatar_url: &str) -> ParleyResult<Character> {
    api.post_json(
        "/api/characters/duplicate",
        &json!({ "avatar_url": avatar_url }),
    )
    .await
}

/// Lists the chat files recorded for a character, keyed by file name.
pub async fn fetch_character_chats(
    api: &ApiClient,
    avatar_url: &str,
) -> ParleyResult<HashMap<String, ChatFileInfo>> {
    api.post_json("/api/characters/chats", &json!({ "avatar_url": avatar_url }))
        .await
}
