use crate::ids::MessageId;

/// Failure categories surfaced to the view; none of them end the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoticeKind {
    Connection,
    History,
    Upload,
    Transcription,
    Speech,
}

/// The single notification signal raised for handled failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

impl Notice {
    pub fn new(kind: NoticeKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Side effects the engine asks of the (external) view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    /// The snapshot changed; re-read it.
    MessagesChanged,
    ScrollToLatest,
    /// Show or hide the "composing" indicator between reveal units.
    Composing {
        message_id: MessageId,
        active: bool,
    },
    RevealFinished {
        message_id: MessageId,
    },
    /// Result of an ad hoc `speak` request.
    SpeechSynthesized {
        audio_url: String,
    },
    Notice(Notice),
}
