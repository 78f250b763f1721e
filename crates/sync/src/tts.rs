use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::ids::MessageId;
use crate::message::{AudioAttachment, MediaRef, TtsState, TurnKind};
use crate::store::MessageStore;
use crate::text::{is_emoji_extender, is_pictographic};

/// Attaches synthesized speech to audio-kind AI replies.
///
/// Without a timeout a reply whose speech never arrives stays `Pending` forever.
#[derive(Debug, Default)]
pub struct TtsCoordinator {
    timeout: Option<Duration>,
    deadlines: HashMap<MessageId, Instant>,
}

impl TtsCoordinator {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            timeout,
            deadlines: HashMap::new(),
        }
    }

    /// Marks a freshly arrived reply as awaiting speech when it belongs to an audio turn.
    pub fn expect(&mut self, store: &mut MessageStore, message_id: &MessageId, now: Instant) -> bool {
        let Some(message) = store.get_mut(message_id) else {
            return false;
        };
        if message.turn_kind != TurnKind::Audio {
            return false;
        }

        message.tts = TtsState::Pending;
        if let Some(timeout) = self.timeout {
            self.deadlines.insert(message_id.clone(), now + timeout);
        }
        true
    }

    /// Routes a speech-ready event to the most recent reply still awaiting audio.
    pub fn attach(&mut self, store: &mut MessageStore, audio_url: &str) -> Option<MessageId> {
        let Some(message) = store.latest_awaiting_speech() else {
            tracing::warn!(audio_url = %audio_url, "speech arrived with no reply awaiting audio");
            return None;
        };

        message.audio = Some(AudioAttachment {
            source: MediaRef::Remote(audio_url.to_string()),
            duration_secs: None,
            is_transcribing: false,
        });
        message.tts = TtsState::Attached;

        let message_id = message.id.clone();
        self.deadlines.remove(&message_id);
        Some(message_id)
    }

    /// Gives up on replies whose speech is overdue.
    pub fn expire(&mut self, store: &mut MessageStore, now: Instant) -> Vec<MessageId> {
        let due = self
            .deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(message_id, _)| message_id.clone())
            .collect::<Vec<_>>();

        let mut expired = Vec::with_capacity(due.len());
        for message_id in due {
            self.deadlines.remove(&message_id);
            if let Some(message) = store.get_mut(&message_id)
                && message.tts == TtsState::Pending
            {
                message.tts = TtsState::Expired;
                expired.push(message_id);
            }
        }
        expired
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.values().min().copied()
    }

    pub fn clear(&mut self) {
        self.deadlines.clear();
    }
}

/// Keeps only what a speech engine should read aloud.
///
/// Pictographs and symbols are dropped; letters, digits, whitespace and light punctuation stay.
pub fn sanitize_for_speech(text: &str) -> String {
    let kept = text
        .chars()
        .filter(|ch| !is_pictographic(*ch) && !is_emoji_extender(*ch))
        .map(|ch| {
            if ch.is_alphanumeric() || matches!(ch, '.' | ',' | '!' | '?' | '\'' | '-') {
                ch
            } else {
                ' '
            }
        })
        .collect::<String>();

    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}
