//! Inbound update model.
//!
//! The transport adapter normalizes platform events into this enum; the
//! engine consumes nothing else.  Variants the platform can emit but the
//! engine does not handle simply never get constructed by the adapter.

use chrono::{DateTime, Utc};
use dossier_shared::{ActorId, ChatId, MediaKind, PlatformMessageId};
use serde::{Deserialize, Serialize};

/// Identity of the actor behind an update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActorInfo {
    pub id: ActorId,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

impl ActorInfo {
    pub fn bare(id: ActorId) -> Self {
        Self {
            id,
            first_name: None,
            last_name: None,
            username: None,
        }
    }
}

/// One normalized inbound event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundUpdate {
    /// Direct message from an actor in their private chat.
    PrivateMessage {
        actor: ActorInfo,
        chat_id: ChatId,
        message_id: PlatformMessageId,
        text: String,
    },
    /// New message in a group chat.
    GroupMessage {
        chat_id: ChatId,
        chat_title: String,
        message_id: PlatformMessageId,
        #[serde(default)]
        sender: Option<ActorInfo>,
        text: String,
        #[serde(default)]
        media_kind: MediaKind,
        #[serde(default)]
        media_ref: Option<String>,
        #[serde(default)]
        is_forward: bool,
        sent_at: DateTime<Utc>,
    },
    /// Edit of a previously delivered group message.
    EditedGroupMessage {
        chat_id: ChatId,
        message_id: PlatformMessageId,
        text: String,
    },
    /// An interactive control was activated; `payload` is the opaque
    /// string the engine attached when sending it.
    ControlActivated {
        actor: ActorInfo,
        chat_id: ChatId,
        payload: String,
    },
    /// The service account was added to a group chat.
    BotAdded {
        chat_id: ChatId,
        chat_title: String,
        added_by: ActorInfo,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_form_is_tagged_snake_case() {
        let update = InboundUpdate::ControlActivated {
            actor: ActorInfo::bare(ActorId(7)),
            chat_id: ChatId(7),
            payload: "more:1234567890:5:-:all:1".into(),
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["type"], "control_activated");
        assert_eq!(json["payload"], "more:1234567890:5:-:all:1");

        let back: InboundUpdate = serde_json::from_value(json).unwrap();
        assert_eq!(back, update);
    }

    #[test]
    fn group_message_defaults_optional_fields() {
        let json = serde_json::json!({
            "type": "group_message",
            "chat_id": -100,
            "chat_title": "squad 5550001234",
            "message_id": 42,
            "text": "subject 1234567890 spotted",
            "sent_at": "2026-08-30T12:00:00Z",
        });
        let update: InboundUpdate = serde_json::from_value(json).unwrap();
        match update {
            InboundUpdate::GroupMessage {
                sender,
                media_kind,
                is_forward,
                ..
            } => {
                assert!(sender.is_none());
                assert_eq!(media_kind, MediaKind::Text);
                assert!(!is_forward);
            }
            _ => panic!("wrong variant"),
        }
    }
}
