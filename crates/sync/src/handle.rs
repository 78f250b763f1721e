use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwap;
use snafu::ResultExt;
use tokio::sync::{mpsc, oneshot};

use crate::engine::{ConversationSnapshot, Intent};
use crate::error::{AcknowledgementDroppedSnafu, EngineResult, EngineStoppedSnafu};
use crate::ids::{ConversationId, MessageId};
use crate::service::Transcript;

/// Cloneable front door to a running [`ConversationEngine`](crate::ConversationEngine).
///
/// Calls enqueue work and return immediately; message ids for optimistic entries are
/// minted here so callers can correlate later commits and failures.
#[derive(Clone)]
pub struct ConversationHandle {
    intents: mpsc::UnboundedSender<Intent>,
    snapshot: Arc<ArcSwap<ConversationSnapshot>>,
}

impl ConversationHandle {
    pub(crate) fn new(
        intents: mpsc::UnboundedSender<Intent>,
        snapshot: Arc<ArcSwap<ConversationSnapshot>>,
    ) -> Self {
        Self { intents, snapshot }
    }

    /// Latest published state.
    pub fn snapshot(&self) -> Arc<ConversationSnapshot> {
        self.snapshot.load_full()
    }

    pub fn conversation_id(&self) -> ConversationId {
        self.snapshot.load().conversation_id.clone()
    }

    pub fn is_running(&self) -> bool {
        !self.intents.is_closed()
    }

    /// Sends typed text; blank input is dropped and yields `None`.
    pub fn send_text(&self, text: &str) -> EngineResult<Option<MessageId>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }

        let message_id = MessageId::generate();
        self.submit(
            "send-text",
            Intent::SendText {
                message_id: message_id.clone(),
                text: text.to_string(),
            },
        )?;
        Ok(Some(message_id))
    }

    /// Reports the composer contents so the turn window can hold while the user types.
    pub fn input_changed(&self, text: &str) -> EngineResult<()> {
        self.submit(
            "input-changed",
            Intent::InputChanged {
                text: text.to_string(),
            },
        )
    }

    /// Shows a local image right away; finish with [`commit_image`](Self::commit_image) or
    /// [`fail_image`](Self::fail_image).
    pub fn preview_image(&self, file: impl Into<PathBuf>, caption: &str) -> EngineResult<MessageId> {
        let message_id = MessageId::generate();
        self.submit(
            "preview-image",
            Intent::PreviewImage {
                message_id: message_id.clone(),
                file: file.into(),
                caption: caption.to_string(),
            },
        )?;
        Ok(message_id)
    }

    pub fn commit_image(&self, message_id: &MessageId, remote_url: &str) -> EngineResult<()> {
        self.submit(
            "commit-image",
            Intent::CommitImage {
                message_id: message_id.clone(),
                remote_url: remote_url.to_string(),
            },
        )
    }

    pub fn fail_image(&self, message_id: &MessageId) -> EngineResult<()> {
        self.submit(
            "fail-image",
            Intent::FailImage {
                message_id: message_id.clone(),
            },
        )
    }

    /// Previews the image and uploads it through the engine's media service.
    pub fn upload_image(&self, file: impl Into<PathBuf>, caption: &str) -> EngineResult<MessageId> {
        let message_id = MessageId::generate();
        self.submit(
            "upload-image",
            Intent::UploadImage {
                message_id: message_id.clone(),
                file: file.into(),
                caption: caption.to_string(),
            },
        )?;
        Ok(message_id)
    }

    pub fn preview_voice(&self, recording: impl Into<PathBuf>) -> EngineResult<MessageId> {
        let message_id = MessageId::generate();
        self.submit(
            "preview-voice",
            Intent::PreviewVoice {
                message_id: message_id.clone(),
                recording: recording.into(),
            },
        )?;
        Ok(message_id)
    }

    pub fn commit_voice(&self, message_id: &MessageId, transcript: Transcript) -> EngineResult<()> {
        self.submit(
            "commit-voice",
            Intent::CommitVoice {
                message_id: message_id.clone(),
                transcript,
            },
        )
    }

    pub fn fail_voice(&self, message_id: &MessageId) -> EngineResult<()> {
        self.submit(
            "fail-voice",
            Intent::FailVoice {
                message_id: message_id.clone(),
            },
        )
    }

    /// Previews the recording and transcribes it through the engine's media service.
    pub fn transcribe_voice(&self, recording: impl Into<PathBuf>) -> EngineResult<MessageId> {
        let message_id = MessageId::generate();
        self.submit(
            "transcribe-voice",
            Intent::TranscribeVoice {
                message_id: message_id.clone(),
                recording: recording.into(),
            },
        )?;
        Ok(message_id)
    }

    /// Synthesizes ad hoc speech; the URL arrives as `UiEvent::SpeechSynthesized`.
    pub fn speak(&self, text: &str) -> EngineResult<()> {
        self.submit(
            "speak",
            Intent::Speak {
                text: text.to_string(),
            },
        )
    }

    /// Tears down the current channel and timers and opens `conversation_id`.
    pub fn switch_conversation(&self, conversation_id: ConversationId) -> EngineResult<()> {
        self.submit(
            "switch-conversation",
            Intent::SwitchConversation { conversation_id },
        )
    }

    /// Resolves once every intent submitted before it, and every channel event or media
    /// result already queued, has been applied.
    pub async fn barrier(&self) -> EngineResult<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.submit("barrier", Intent::Barrier { ack: ack_tx })?;
        ack_rx
            .await
            .context(AcknowledgementDroppedSnafu { stage: "barrier" })
    }

    /// Stops the engine. Further calls on any clone fail with `EngineStopped`.
    pub fn dispose(&self) -> EngineResult<()> {
        self.submit("dispose", Intent::Dispose)
    }

    fn submit(&self, stage: &'static str, intent: Intent) -> EngineResult<()> {
        if self.intents.send(intent).is_err() {
            return EngineStoppedSnafu {
                stage,
                conversation_id: self.conversation_id().to_string(),
            }
            .fail();
        }
        Ok(())
    }
}
