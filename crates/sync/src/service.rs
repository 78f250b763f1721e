use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use crate::error::ServiceResult;
use crate::ids::{ConversationId, MessageId, UserId};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptionRequest {
    pub recording: PathBuf,
    pub language: String,
    pub user_id: UserId,
    pub conversation_id: ConversationId,
    pub message_id: MessageId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    pub text: String,
    pub audio_url: String,
    pub duration_secs: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechRequest {
    pub text: String,
    pub voice: String,
    pub language: String,
}

/// Remote conversions the media pipelines depend on: upload, speech-to-text, text-to-speech.
pub trait MediaService: Send + Sync {
    /// Uploads a local image and returns its public URL.
    fn upload_image(&self, file: PathBuf) -> BoxFuture<'_, ServiceResult<String>>;
    fn transcribe(&self, request: TranscriptionRequest) -> BoxFuture<'_, ServiceResult<Transcript>>;
    /// Synthesizes speech and returns the audio URL.
    fn synthesize(&self, request: SpeechRequest) -> BoxFuture<'_, ServiceResult<String>>;
}
