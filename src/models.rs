// src/models.rs

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Side-channel data attached to a chat message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageExtra {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

/// One message in a chat transcript, in the server's wire format.
///
/// Unknown fields ride in `rest` so a transcript round-trips through the
/// client without losing server-side metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub mes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub is_user: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_system: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<MessageExtra>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl ChatMessage {
    pub fn from_user(name: impl Into<String>, text: impl Into<String>) -> Self {
        ChatMessage {
            mes: text.into(),
            name: Some(name.into()),
            is_user: true,
            ..Default::default()
        }
    }

    pub fn from_character(name: impl Into<String>, text: impl Into<String>) -> Self {
        ChatMessage {
            mes: text.into(),
            name: Some(name.into()),
            is_user: false,
            ..Default::default()
        }
    }
}

/// Identifies one chat transcript: a (character, file) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChatKey {
    pub ch_name: String,
    pub file_name: String,
}

impl ChatKey {
    pub fn new(ch_name: impl Into<String>, file_name: impl Into<String>) -> Self {
        ChatKey {
            ch_name: ch_name.into(),
            file_name: file_name.into(),
        }
    }
}

/// A character card as served by the character store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Character {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_mes: Option<String>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

/// Per-chat-file metadata from `/api/characters/chats`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatFileInfo {
    #[serde(default)]
    pub file_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_mes: Option<i64>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

/// One world-info (lorebook) entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldInfoEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selective: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_keys: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constant: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable: Option<bool>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

/// OpenAI-like backend settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OaiSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reverse_proxy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_completion_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

/// Shared sampler knobs for the text-generation style backends
/// (Kobold-like, NovelAI-like, Horde-like). The server keeps a separate
/// settings object per backend; the field set is the same.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SamplerSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_server: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typical_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tfs: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_a: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repetition_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repetition_penalty_range: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repetition_penalty_slope: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sampler_order: Option<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

/// The server's settings object. The server stores this as an opaque
/// blob; only the fields the client touches are typed, everything else
/// rides in `rest`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_character: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_api: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_gen: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_context: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oai_settings: Option<OaiSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub textgenerationwebui_settings: Option<SamplerSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kai_settings: Option<SamplerSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nai_settings: Option<SamplerSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub horde_settings: Option<SamplerSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power_user: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub world_info_settings: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension_settings: Option<Value>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

/// Role tag on a completion-request message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One role-tagged message in a generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl CompletionMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        CompletionMessage {
            role,
            content: content.into(),
            name: None,
        }
    }
}

/// A generation request for `/api/backends/chat-completions/generate`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub messages: Vec<CompletionMessage>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_completion_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

/// The assembled result of a (streaming or one-shot) generation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionOutput {
    pub content: String,
    pub reasoning: Option<String>,
}

/// Converts a transcript to completion-request history, oldest first.
pub fn transcript_to_history(messages: &[ChatMessage]) -> Vec<CompletionMessage> {
    messages
        .iter()
        .map(|msg| CompletionMessage {
            role: if msg.is_user { Role::User } else { Role::Assistant },
            content: msg.mes.clone(),
            name: msg.name.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_message_roundtrips_unknown_fields() {
        let raw = r#"{"mes":"hi","is_user":true,"send_date":"2024-01-01","extra":{"reasoning":"why","custom":1}}"#;
        let msg: ChatMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.mes, "hi");
        assert!(msg.is_user);
        assert_eq!(
            msg.extra.as_ref().unwrap().reasoning.as_deref(),
            Some("why")
        );
        assert_eq!(msg.rest["send_date"], "2024-01-01");

        let back = serde_json::to_value(&msg).unwrap();
        assert_eq!(back["send_date"], "2024-01-01");
        assert_eq!(back["extra"]["custom"], 1);
    }

    #[test]
    fn settings_keeps_backend_variants_and_rest() {
        let raw = r#"{
            "main_api": "openai",
            "oai_settings": {"model": "gpt-4", "stream": true},
            "kai_settings": {"api_server": "http://127.0.0.1:5000", "top_k": 40},
            "some_plugin": {"enabled": true}
        }"#;
        let settings: Settings = serde_json::from_str(raw).unwrap();
        assert_eq!(settings.main_api.as_deref(), Some("openai"));
        assert_eq!(
            settings.oai_settings.as_ref().unwrap().model.as_deref(),
            Some("gpt-4")
        );
        assert_eq!(settings.kai_settings.as_ref().unwrap().top_k, Some(40));
        assert!(settings.rest.contains_key("some_plugin"));
    }

    #[test]
    fn history_preserves_conversation_order() {
        let transcript = vec![
            ChatMessage::from_user("User", "hello"),
            ChatMessage::from_character("Aria", "hi there"),
            ChatMessage::from_user("User", "how are you?"),
        ];
        let history = transcript_to_history(&transcript);
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[1].role, Role::Assistant);
        assert_eq!(history[2].content, "how are you?");
    }

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&Role::Assistant).unwrap(),
            "\"assistant\""
        );
    }
}
