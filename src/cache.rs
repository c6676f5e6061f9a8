// src/cache.rs

use crate::models::{ChatKey, ChatMessage};
use chrono::{DateTime, TimeZone, Utc};
use log::{debug, warn};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Row, Sqlite};
use std::str::FromStr;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS chat_mirror (
    ch_name    TEXT NOT NULL,
    file_name  TEXT NOT NULL,
    chat_json  TEXT NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (ch_name, file_name)
)";

/// Local mirror of server-owned chat transcripts.
///
/// Storage is an optional capability: when the backing store cannot be
/// opened (read-only filesystem, missing directory, restricted runtime)
/// the cache silently degrades to a no-op that reports every transcript
/// as absent. Opening never fails and mirror operations never error; the
/// server copy is always the source of truth.
pub struct ChatCache {
    pool: Option<Pool<Sqlite>>,
}

impl ChatCache {
    /// Opens (or creates) the mirror database at `path`. On any failure
    /// the cache comes up disabled rather than erroring.
    pub async fn open(path: &str) -> Self {
        match Self::try_open(path).await {
            Ok(pool) => {
                debug!("chat mirror open at {}", path);
                ChatCache { pool: Some(pool) }
            }
            Err(e) => {
                warn!("chat mirror unavailable ({}); continuing without offline cache", e);
                ChatCache { pool: None }
            }
        }
    }

    /// A cache that stores nothing. Every read reports absent.
    pub fn disabled() -> Self {
        ChatCache { pool: None }
    }

    async fn try_open(path: &str) -> Result<Pool<Sqlite>, sqlx::Error> {
        let connection_str = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite://{}", path)
        };

        let options = SqliteConnectOptions::from_str(&connection_str)?.create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        sqlx::query(SCHEMA).execute(&pool).await?;
        Ok(pool)
    }

    pub fn is_enabled(&self) -> bool {
        self.pool.is_some()
    }

    /// Reads the mirrored transcript, or `None` when the cache is
    /// disabled, the key is unknown, or the stored row is corrupt.
    pub async fn get(&self, key: &ChatKey) -> Option<Vec<ChatMessage>> {
        let pool = self.pool.as_ref()?;

        let row = sqlx::query("SELECT chat_json FROM chat_mirror WHERE ch_name = ? AND file_name = ?")
            .bind(&key.ch_name)
            .bind(&key.file_name)
            .fetch_optional(pool)
            .await
            .map_err(|e| warn!("chat mirror read failed for {:?}: {}", key, e))
            .ok()??;

        let json: String = row
            .try_get("chat_json")
            .map_err(|e| warn!("chat mirror row unreadable for {:?}: {}", key, e))
            .ok()?;

        match serde_json::from_str(&json) {
            Ok(messages) => Some(messages),
            Err(e) => {
                warn!("chat mirror row corrupt for {:?}: {}", key, e);
                None
            }
        }
    }

    /// Mirrors a transcript. Best effort: failures are logged, never
    /// raised.
    pub async fn put(&self, key: &ChatKey, messages: &[ChatMessage]) {
        let Some(pool) = self.pool.as_ref() else {
            return;
        };

        let json = match serde_json::to_string(messages) {
            Ok(json) => json,
            Err(e) => {
                warn!("chat mirror serialize failed for {:?}: {}", key, e);
                return;
            }
        };

        let result = sqlx::query(
            "INSERT INTO chat_mirror (ch_name, file_name, chat_json, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT (ch_name, file_name) DO UPDATE
             SET chat_json = excluded.chat_json, updated_at = excluded.updated_at",
        )
        .bind(&key.ch_name)
        .bind(&key.file_name)
        .bind(&json)
        .bind(Utc::now().timestamp())
        .execute(pool)
        .await;

        if let Err(e) = result {
            warn!("chat mirror write failed for {:?}: {}", key, e);
        }
    }

    /// Drops the mirrored transcript for `key`, if any.
    pub async fn remove(&self, key: &ChatKey) {
        let Some(pool) = self.pool.as_ref() else {
            return;
        };

        let result = sqlx::query("DELETE FROM chat_mirror WHERE ch_name = ? AND file_name = ?")
            .bind(&key.ch_name)
            .bind(&key.file_name)
            .execute(pool)
            .await;

        if let Err(e) = result {
            warn!("chat mirror delete failed for {:?}: {}", key, e);
        }
    }

    /// When the mirror was last written, if it exists.
    pub async fn last_updated(&self, key: &ChatKey) -> Option<DateTime<Utc>> {
        let pool = self.pool.as_ref()?;

        let row = sqlx::query("SELECT updated_at FROM chat_mirror WHERE ch_name = ? AND file_name = ?")
            .bind(&key.ch_name)
            .bind(&key.file_name)
            .fetch_optional(pool)
            .await
            .ok()??;

        let seconds: i64 = row.try_get("updated_at").ok()?;
        Utc.timestamp_opt(seconds, 0).single()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_transcript() -> Vec<ChatMessage> {
        vec![
            ChatMessage::from_user("User", "hello"),
            ChatMessage::from_character("Aria", "well met"),
        ]
    }

    #[tokio::test]
    async fn roundtrips_a_transcript() {
        let cache = ChatCache::open("sqlite::memory:").await;
        assert!(cache.is_enabled());

        let key = ChatKey::new("Aria", "chat-1");
        assert!(cache.get(&key).await.is_none());

        let transcript = sample_transcript();
        cache.put(&key, &transcript).await;
        assert_eq!(cache.get(&key).await.unwrap(), transcript);
        assert!(cache.last_updated(&key).await.is_some());
    }

    #[tokio::test]
    async fn overwrites_on_second_put() {
        let cache = ChatCache::open("sqlite::memory:").await;
        let key = ChatKey::new("Aria", "chat-1");

        cache.put(&key, &sample_transcript()).await;
        let longer = {
            let mut t = sample_transcript();
            t.push(ChatMessage::from_user("User", "and another thing"));
            t
        };
        cache.put(&key, &longer).await;

        assert_eq!(cache.get(&key).await.unwrap(), longer);
    }

    #[tokio::test]
    async fn remove_clears_only_that_key() {
        let cache = ChatCache::open("sqlite::memory:").await;
        let key_a = ChatKey::new("Aria", "chat-1");
        let key_b = ChatKey::new("Bram", "chat-1");

        cache.put(&key_a, &sample_transcript()).await;
        cache.put(&key_b, &sample_transcript()).await;
        cache.remove(&key_a).await;

        assert!(cache.get(&key_a).await.is_none());
        assert!(cache.get(&key_b).await.is_some());
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mirror.sqlite");
        let path = path.to_str().unwrap();

        let key = ChatKey::new("Aria", "chat-1");
        {
            let cache = ChatCache::open(path).await;
            cache.put(&key, &sample_transcript()).await;
        }

        let cache = ChatCache::open(path).await;
        assert_eq!(cache.get(&key).await.unwrap(), sample_transcript());
    }

    #[tokio::test]
    async fn unopenable_store_degrades_to_noop() {
        let cache = ChatCache::open("/nonexistent-dir/parley/mirror.sqlite").await;
        assert!(!cache.is_enabled());

        let key = ChatKey::new("Aria", "chat-1");
        // Never raises, reads back absent.
        cache.put(&key, &sample_transcript()).await;
        assert!(cache.get(&key).await.is_none());
        assert!(cache.last_updated(&key).await.is_none());
    }

    #[tokio::test]
    async fn disabled_cache_reports_absent() {
        let cache = ChatCache::disabled();
        assert!(!cache.is_enabled());
        assert!(cache.get(&ChatKey::new("a", "b")).await.is_none());
    }
}
