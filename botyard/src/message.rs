//! Control messages delivered by the ingestion collaborator.

use serde::{Deserialize, Serialize};

use crate::models::{DisplayMetadata, OwnerKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Run,
    Stop,
}

/// A `run` or `stop` request for one tenant container.
///
/// Delivery is at-least-once and unordered; idempotence comes from the owner
/// key lookup, not from deduplicating messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotMessage {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub payload: BotPayload,
    #[serde(default)]
    pub timestamp: i64,
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct BotPayload {
    pub bot_id: i64,
    pub project_id: i64,
    pub user_id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub api_token: String,
}

impl BotPayload {
    pub fn owner_key(&self) -> OwnerKey {
        OwnerKey::new(self.bot_id, self.project_id, self.user_id)
    }

    pub fn metadata(&self) -> DisplayMetadata {
        DisplayMetadata {
            name: self.name.clone(),
            description: self.description.clone(),
            icon: self.icon.clone(),
        }
    }
}

// The API token must never reach the logs.
impl std::fmt::Debug for BotPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotPayload")
            .field("bot_id", &self.bot_id)
            .field("project_id", &self.project_id)
            .field("user_id", &self.user_id)
            .field("name", &self.name)
            .field("description", &self.description)
            .field("icon", &self.icon)
            .field("api_token", &"<redacted>")
            .finish()
    }
}

impl BotMessage {
    pub fn owner_key(&self) -> OwnerKey {
        self.payload.owner_key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_run_message() {
        let raw = r#"{
            "type": "run",
            "payload": {
                "bot_id": 1, "project_id": 2, "user_id": 3,
                "name": "Support Bot", "description": "helps", "icon": "bot.png",
                "api_token": "123:abc"
            },
            "timestamp": 1704067200
        }"#;
        let msg: BotMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.kind, MessageKind::Run);
        assert_eq!(msg.owner_key(), OwnerKey::new(1, 2, 3));
        assert_eq!(msg.payload.metadata().name, "Support Bot");
        assert_eq!(msg.timestamp, 1704067200);
    }

    #[test]
    fn test_stop_message_needs_only_identity() {
        let raw = r#"{"type":"stop","payload":{"bot_id":1,"project_id":1,"user_id":1}}"#;
        let msg: BotMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.kind, MessageKind::Stop);
        assert!(msg.payload.api_token.is_empty());
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let raw = r#"{"type":"restart","payload":{"bot_id":1,"project_id":1,"user_id":1}}"#;
        assert!(serde_json::from_str::<BotMessage>(raw).is_err());
    }

    #[test]
    fn test_debug_redacts_token() {
        let payload = BotPayload {
            bot_id: 1,
            project_id: 1,
            user_id: 1,
            name: "n".into(),
            description: String::new(),
            icon: String::new(),
            api_token: "secret-token".into(),
        };
        let rendered = format!("{:?}", payload);
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("<redacted>"));
    }
}
