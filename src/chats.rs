// src/chats.rs

use crate::api::ApiClient;
use crate::cache::ChatCache;
use crate::errors::ParleyResult;
use crate::models::{ChatKey, ChatMessage};
use log::warn;
use serde_json::json;

/// Fetches the authoritative transcript from the server.
pub async fn fetch_chat(api: &ApiClient, key: &ChatKey) -> ParleyResult<Vec<ChatMessage>> {
    api.post_json(
        "/api/chats/get",
        &json!({
            "ch_name": key.ch_name,
            "file_name": key.file_name,
        }),
    )
    .await
}

/// Writes a transcript to the server. `force` skips the server's
/// integrity check on the existing file.
pub async fn push_chat(
    api: &ApiClient,
    key: &ChatKey,
    avatar_url: Option<&str>,
    messages: &[ChatMessage],
    force: bool,
) -> ParleyResult<()> {
    api.post(
        "/api/chats/save",
        &json!({
            "ch_name": key.ch_name,
            "file_name": key.file_name,
            "chat": messages,
            "avatar_url": avatar_url,
            "force": force,
        }),
    )
    .await?;
    Ok(())
}

pub async fn rename_chat(
    api: &ApiClient,
    ch_name: &str,
    old_file_name: &str,
    new_file_name: &str,
) -> ParleyResult<()> {
    api.post(
        "/api/chats/rename",
        &json!({
            "ch_name": ch_name,
            "file_name": old_file_name,
            "new_file_name": new_file_name,
        }),
    )
    .await?;
    Ok(())
}

/// Deletes the transcript on the server and drops the local mirror.
pub async fn delete_chat(api: &ApiClient, cache: &ChatCache, key: &ChatKey) -> ParleyResult<()> {
    api.post(
        "/api/chats/delete",
        &json!({
            "ch_name": key.ch_name,
            "file_name": key.file_name,
        }),
    )
    .await?;
    cache.remove(key).await;
    Ok(())
}

/// Loads a transcript, preferring the server but falling back to the
/// local mirror for read continuity:
///
/// - server answers non-empty: mirror is overwritten, server copy wins;
/// - server answers empty while a non-empty mirror exists: the mirror is
///   returned (an empty reply is treated as the server having nothing,
///   not as a deletion);
/// - server unreachable: the mirror is returned when present, otherwise
///   the error propagates.
pub async fn load_chat(
    api: &ApiClient,
    cache: &ChatCache,
    key: &ChatKey,
) -> ParleyResult<Vec<ChatMessage>> {
    let local = cache.get(key).await;

    match fetch_chat(api, key).await {
        Ok(server) if !server.is_empty() => {
            cache.put(key, &server).await;
            Ok(server)
        }
        Ok(server) => match local {
            Some(mirror) if !mirror.is_empty() => {
                warn!(
                    "server returned an empty transcript for {:?}; keeping local mirror of {} messages",
                    key,
                    mirror.len()
                );
                Ok(mirror)
            }
            _ => Ok(server),
        },
        Err(e) => match local {
            Some(mirror) => {
                warn!("chat fetch failed for {:?} ({}); serving local mirror", key, e);
                Ok(mirror)
            }
            None => Err(e),
        },
    }
}

/// Stores a transcript: server first, then the local mirror. On a server
/// failure the mirror is still written so user-authored messages survive,
/// and the error is re-raised so the caller can warn that the remote copy
/// is not durable.
pub async fn store_chat(
    api: &ApiClient,
    cache: &ChatCache,
    key: &ChatKey,
    avatar_url: Option<&str>,
    messages: &[ChatMessage],
) -> ParleyResult<()> {
    match push_chat(api, key, avatar_url, messages, false).await {
        Ok(()) => {
            cache.put(key, messages).await;
            Ok(())
        }
        Err(e) => {
            warn!("chat save failed for {:?} ({}); mirroring locally", key, e);
            cache.put(key, messages).await;
            Err(e)
        }
    }
}
