use std::path::PathBuf;

use tokio::time::Instant;

use crate::aggregator::TurnAggregator;
use crate::delivery::DeliveryTracker;
use crate::ids::MessageId;
use crate::message::{MediaRef, Message, TurnKind};
use crate::service::Transcript;
use crate::store::MessageStore;

/// Components a pipeline step may touch, borrowed from the engine for one call.
pub struct PipelineContext<'a> {
    pub store: &'a mut MessageStore,
    pub tracker: &'a mut DeliveryTracker,
    pub aggregator: &'a mut TurnAggregator,
    pub now: Instant,
}

/// Content that became final on commit and must be announced to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedMedia {
    pub message_id: MessageId,
    pub content: String,
    pub media_url: String,
    pub turn_kind: TurnKind,
}

/// Why a commit could not be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineRejection {
    /// The message is gone (already failed, or replaced by history).
    UnknownMessage,
    /// The message is not waiting for this conversion.
    NotConverting,
    /// The conversion produced nothing usable.
    BlankResult,
}

impl PipelineContext<'_> {
    /// Shows the local image immediately and starts delivery tracking.
    pub fn preview_image(&mut self, message_id: MessageId, file: PathBuf, caption: &str) {
        self.store.append(Message::user_image_preview(
            message_id.clone(),
            file,
            caption.trim(),
        ));
        self.tracker.register(self.store, &message_id, self.now);
    }

    /// Swaps the local image for its uploaded URL and feeds the aggregator.
    pub fn commit_image(
        &mut self,
        message_id: &MessageId,
        remote_url: &str,
    ) -> Result<CommittedMedia, PipelineRejection> {
        let remote_url = remote_url.trim();
        let message = self
            .store
            .get_mut(message_id)
            .ok_or(PipelineRejection::UnknownMessage)?;
        let image = message
            .image
            .as_mut()
            .filter(|image| image.is_uploading)
            .ok_or(PipelineRejection::NotConverting)?;
        if remote_url.is_empty() {
            return Err(PipelineRejection::BlankResult);
        }

        image.is_uploading = false;
        image.source = MediaRef::Remote(remote_url.to_string());
        let caption = message.content.clone();

        self.aggregator
            .enqueue_text(&caption, TurnKind::Text, self.now);
        self.aggregator.enqueue_image(remote_url, self.now);

        Ok(CommittedMedia {
            message_id: message_id.clone(),
            content: caption,
            media_url: remote_url.to_string(),
            turn_kind: TurnKind::Text,
        })
    }

    /// Shows the pending recording immediately and starts delivery tracking.
    pub fn preview_voice(&mut self, message_id: MessageId, recording: PathBuf) {
        self.store
            .append(Message::user_voice_preview(message_id.clone(), recording));
        self.tracker.register(self.store, &message_id, self.now);
    }

    /// Fills in the transcription and feeds the aggregator as an audio turn.
    pub fn commit_voice(
        &mut self,
        message_id: &MessageId,
        transcript: &Transcript,
    ) -> Result<CommittedMedia, PipelineRejection> {
        let text = transcript.text.trim();
        let audio_url = transcript.audio_url.trim();
        let message = self
            .store
            .get_mut(message_id)
            .ok_or(PipelineRejection::UnknownMessage)?;
        let audio = message
            .audio
            .as_mut()
            .filter(|audio| audio.is_transcribing)
            .ok_or(PipelineRejection::NotConverting)?;
        if text.is_empty() || audio_url.is_empty() {
            return Err(PipelineRejection::BlankResult);
        }

        audio.is_transcribing = false;
        audio.source = MediaRef::Remote(audio_url.to_string());
        audio.duration_secs = transcript.duration_secs;
        message.content = text.to_string();

        self.aggregator.enqueue_text(text, TurnKind::Audio, self.now);

        Ok(CommittedMedia {
            message_id: message_id.clone(),
            content: text.to_string(),
            media_url: audio_url.to_string(),
            turn_kind: TurnKind::Audio,
        })
    }

    /// Rolls back an optimistic media message; no retry is attempted.
    ///
    /// Only messages still waiting on their conversion can be rolled back.
    pub fn fail(&mut self, message_id: &MessageId) -> Result<Message, PipelineRejection> {
        let message = self
            .store
            .get(message_id)
            .ok_or(PipelineRejection::UnknownMessage)?;
        if !message.is_converting() {
            return Err(PipelineRejection::NotConverting);
        }

        self.tracker.cancel(message_id);
        self.store
            .remove(message_id)
            .ok_or(PipelineRejection::UnknownMessage)
    }
}
