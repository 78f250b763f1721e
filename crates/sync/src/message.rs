use std::path::PathBuf;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::MessageId;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    User,
    Ai,
}

/// Delivery lifecycle for user messages.
///
/// Transitions only move forward: `Pending -> Sent -> Delivered` or `Pending -> Delivered`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Delivered,
}

impl DeliveryStatus {
    /// Returns true when `next` is reachable without regressing.
    pub fn can_advance_to(self, next: DeliveryStatus) -> bool {
        match (self, next) {
            (Self::Pending, Self::Sent | Self::Delivered) => true,
            (Self::Sent, Self::Delivered) => true,
            (current, next) => current == next,
        }
    }

    pub fn is_delivered(self) -> bool {
        matches!(self, Self::Delivered)
    }
}

/// Whether a turn originated as typed text or transcribed voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnKind {
    #[default]
    Text,
    Audio,
}

/// Synthesized-speech attachment state for audio-kind AI replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TtsState {
    #[default]
    None,
    Pending,
    Attached,
    Expired,
}

/// Local file before conversion, remote URL after.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaRef {
    Local(PathBuf),
    Remote(String),
}

impl MediaRef {
    pub fn remote_url(&self) -> Option<&str> {
        match self {
            Self::Remote(url) => Some(url),
            Self::Local(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    pub source: MediaRef,
    pub is_uploading: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioAttachment {
    pub source: MediaRef,
    pub duration_secs: Option<f64>,
    pub is_transcribing: bool,
}

/// Rejection for a delivery transition that would regress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryRejection {
    NotTracked,
    Regression {
        current: DeliveryStatus,
        attempted: DeliveryStatus,
    },
}

/// One entry of the conversation list.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub origin: Origin,
    pub content: String,
    pub created_at: String,
    pub delivery: Option<DeliveryStatus>,
    pub image: Option<ImageAttachment>,
    pub audio: Option<AudioAttachment>,
    pub turn_kind: TurnKind,
    pub is_revealing: bool,
    pub revealed: Vec<String>,
    pub tts: TtsState,
}

impl Message {
    fn base(id: MessageId, origin: Origin, content: impl Into<String>) -> Self {
        Self {
            id,
            origin,
            content: content.into(),
            created_at: timestamp_now(),
            delivery: match origin {
                Origin::User => Some(DeliveryStatus::Pending),
                Origin::Ai => None,
            },
            image: None,
            audio: None,
            turn_kind: TurnKind::Text,
            is_revealing: false,
            revealed: Vec::new(),
            tts: TtsState::None,
        }
    }

    /// Creates an optimistic typed message.
    pub fn user_text(id: MessageId, content: impl Into<String>) -> Self {
        Self::base(id, Origin::User, content)
    }

    /// Creates an optimistic image message pointing at the local file.
    pub fn user_image_preview(id: MessageId, file: PathBuf, caption: impl Into<String>) -> Self {
        let mut message = Self::base(id, Origin::User, caption);
        message.image = Some(ImageAttachment {
            source: MediaRef::Local(file),
            is_uploading: true,
        });
        message
    }

    /// Creates an optimistic voice message; content arrives with the transcription.
    pub fn user_voice_preview(id: MessageId, recording: PathBuf) -> Self {
        let mut message = Self::base(id, Origin::User, String::new());
        message.audio = Some(AudioAttachment {
            source: MediaRef::Local(recording),
            duration_secs: None,
            is_transcribing: true,
        });
        message.turn_kind = TurnKind::Audio;
        message
    }

    /// Creates an AI reply that starts in the revealing state.
    pub fn ai_reply(
        id: MessageId,
        content: impl Into<String>,
        created_at: Option<String>,
        turn_kind: TurnKind,
    ) -> Self {
        let mut message = Self::base(id, Origin::Ai, content);
        if let Some(created_at) = created_at.filter(|value| !value.trim().is_empty()) {
            message.created_at = created_at;
        }
        message.turn_kind = turn_kind;
        message.is_revealing = true;
        message
    }

    pub fn is_user(&self) -> bool {
        matches!(self.origin, Origin::User)
    }

    /// True while media conversion for this message has not completed.
    pub fn is_converting(&self) -> bool {
        self.image.as_ref().is_some_and(|image| image.is_uploading)
            || self.audio.as_ref().is_some_and(|audio| audio.is_transcribing)
    }

    /// True for user messages the server has not acknowledged yet.
    pub fn is_unconfirmed(&self) -> bool {
        self.is_user()
            && (self.is_converting()
                || self
                    .delivery
                    .is_some_and(|status| !status.is_delivered()))
    }

    /// Applies one delivery transition, rejecting regressions.
    pub fn advance_delivery(
        &mut self,
        next: DeliveryStatus,
    ) -> Result<DeliveryStatus, DeliveryRejection> {
        let Some(current) = self.delivery else {
            return Err(DeliveryRejection::NotTracked);
        };

        if !current.can_advance_to(next) {
            return Err(DeliveryRejection::Regression {
                current,
                attempted: next,
            });
        }

        self.delivery = Some(next);
        Ok(next)
    }

    /// Content plus remote media, used to match local copies against server history.
    pub fn fingerprint(&self) -> (String, Option<String>) {
        let media = self
            .image
            .as_ref()
            .and_then(|image| image.source.remote_url())
            .or_else(|| {
                self.audio
                    .as_ref()
                    .and_then(|audio| audio.source.remote_url())
            })
            .map(str::to_string);
        (self.content.trim().to_string(), media)
    }
}

/// Local timestamp in the same UTC convention the server uses.
pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
