use serde::{Deserialize, Serialize};
use snafu::ResultExt;

use crate::error::{DecodeEventSnafu, EncodeEventSnafu, ProtocolResult};
use crate::ids::{ConversationId, MessageId};
use crate::message::{
    AudioAttachment, DeliveryStatus, ImageAttachment, MediaRef, Message, Origin, TtsState,
    TurnKind,
};
use crate::store::HistoryMessage;

/// Client-to-server events.
///
/// Frames are `{"event": "<kebab-name>", "payload": {...}}` with camelCase fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "payload",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum Outbound {
    FetchHistory {
        conversation_id: ConversationId,
    },
    SendMessage {
        conversation_id: ConversationId,
        client_id: MessageId,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        media_url: Option<String>,
        turn_kind: TurnKind,
    },
    SummarizeTurn {
        conversation_id: ConversationId,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        media_url: Option<String>,
    },
    TriggerTurn {
        conversation_id: ConversationId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        media_url: Option<String>,
        turn_kind: TurnKind,
    },
}

impl Outbound {
    pub fn name(&self) -> &'static str {
        match self {
            Self::FetchHistory { .. } => "fetch-history",
            Self::SendMessage { .. } => "send-message",
            Self::SummarizeTurn { .. } => "summarize-turn",
            Self::TriggerTurn { .. } => "trigger-turn",
        }
    }
}

/// Server-to-client events, plus the `connect` lifecycle signal raised by the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "payload",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum Inbound {
    #[serde(rename = "connect")]
    Connected,
    HistoryReceived {
        #[serde(default)]
        messages: Vec<HistoryEntry>,
    },
    HistoryError {
        error: String,
    },
    ReplyReceived {
        content: String,
        #[serde(default)]
        timestamp: Option<String>,
        #[serde(default)]
        turn_kind: Option<TurnKind>,
    },
    SpeechReady {
        audio_url: String,
    },
    ConnectError {
        reason: String,
    },
}

/// Speaker role as reported by history; servers say either `ai` or `assistant`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireRole {
    User,
    #[serde(alias = "assistant")]
    Ai,
}

/// One message of a full history fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: MessageId,
    #[serde(default)]
    pub client_id: Option<MessageId>,
    pub role: WireRole,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub audio_url: Option<String>,
    #[serde(default)]
    pub audio_duration: Option<f64>,
    #[serde(default)]
    pub turn_kind: Option<TurnKind>,
}

impl HistoryEntry {
    /// Server-confirmed message: users are delivered, replies are fully revealed.
    pub fn into_history_message(self) -> HistoryMessage {
        let origin = match self.role {
            WireRole::User => Origin::User,
            WireRole::Ai => Origin::Ai,
        };
        let turn_kind = self.turn_kind.unwrap_or_else(|| match (origin, &self.audio_url) {
            (Origin::User, Some(_)) => TurnKind::Audio,
            _ => TurnKind::Text,
        });
        let tts = match (origin, turn_kind, &self.audio_url) {
            (Origin::Ai, TurnKind::Audio, Some(_)) => TtsState::Attached,
            _ => TtsState::None,
        };

        let message = Message {
            id: self.id,
            origin,
            content: self.content,
            created_at: self.created_at,
            delivery: match origin {
                Origin::User => Some(DeliveryStatus::Delivered),
                Origin::Ai => None,
            },
            image: self.media_url.map(|url| ImageAttachment {
                source: MediaRef::Remote(url),
                is_uploading: false,
            }),
            audio: self.audio_url.map(|url| AudioAttachment {
                source: MediaRef::Remote(url),
                duration_secs: self.audio_duration,
                is_transcribing: false,
            }),
            turn_kind,
            is_revealing: false,
            revealed: Vec::new(),
            tts,
        };

        HistoryMessage {
            message,
            client_id: self.client_id,
        }
    }
}

pub fn encode(event: &Outbound) -> ProtocolResult<String> {
    serde_json::to_string(event).context(EncodeEventSnafu {
        stage: "encode-outbound",
    })
}

pub fn decode(frame: &str) -> ProtocolResult<Inbound> {
    serde_json::from_str(frame).context(DecodeEventSnafu {
        stage: "decode-inbound",
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_turn_uses_event_envelope() {
        let event = Outbound::TriggerTurn {
            conversation_id: ConversationId::from("c-1"),
            content: Some("hi there".to_string()),
            media_url: None,
            turn_kind: TurnKind::Audio,
        };

        let frame = encode(&event).ok();
        let value = frame
            .as_deref()
            .and_then(|frame| serde_json::from_str::<serde_json::Value>(frame).ok());
        assert_eq!(
            value,
            Some(serde_json::json!({
                "event": "trigger-turn",
                "payload": {
                    "conversationId": "c-1",
                    "content": "hi there",
                    "turnKind": "audio",
                }
            }))
        );
    }

    #[test]
    fn decodes_reply_with_optional_fields_missing() {
        let inbound = decode(r#"{"event":"reply-received","payload":{"content":"Hello!"}}"#).ok();

        assert_eq!(
            inbound,
            Some(Inbound::ReplyReceived {
                content: "Hello!".to_string(),
                timestamp: None,
                turn_kind: None,
            })
        );
    }

    #[test]
    fn rejects_unknown_events() {
        assert!(decode(r#"{"event":"typing","payload":{}}"#).is_err());
    }

    #[test]
    fn history_entries_map_to_confirmed_messages() {
        let frame = r#"{"event":"history-received","payload":{"messages":[
            {"id":"s-1","clientId":"local-1","role":"user","content":"hi","createdAt":"2024-05-01T10:00:00.000Z"},
            {"id":"s-2","role":"assistant","content":"hey","createdAt":"2024-05-01T10:00:01.000Z","audioUrl":"https://cdn/s-2.mp3","turnKind":"audio"}
        ]}}"#;

        let Ok(Inbound::HistoryReceived { messages }) = decode(frame) else {
            panic!("expected history frame");
        };
        let mapped = messages
            .into_iter()
            .map(HistoryEntry::into_history_message)
            .collect::<Vec<_>>();

        assert_eq!(mapped[0].client_id, Some(MessageId::from("local-1")));
        assert_eq!(mapped[0].message.delivery, Some(DeliveryStatus::Delivered));
        assert_eq!(mapped[1].message.origin, Origin::Ai);
        assert_eq!(mapped[1].message.tts, TtsState::Attached);
        assert!(!mapped[1].message.is_revealing);
    }
}
