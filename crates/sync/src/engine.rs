//! Single-owner orchestration task for one active conversation.
//!
//! All state lives inside [`ConversationEngine`] and is only touched from its task. User
//! intents, channel events, media completions and timer deadlines are funneled into one
//! `select!` loop, so every mutation is serialized and every timer is a plain deadline.

use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::aggregator::{PendingTurn, TurnAggregator};
use crate::channel::ChannelConnector;
use crate::config::EngineConfig;
use crate::delivery::DeliveryTracker;
use crate::error::ServiceResult;
use crate::events::{Notice, NoticeKind, UiEvent};
use crate::handle::ConversationHandle;
use crate::ids::{ConversationId, MessageId};
use crate::media::{CommittedMedia, PipelineContext, PipelineRejection};
use crate::message::{Message, TurnKind};
use crate::protocol::{HistoryEntry, Inbound, Outbound};
use crate::reveal::{RevealScheduler, RevealStep};
use crate::service::{MediaService, SpeechRequest, Transcript, TranscriptionRequest};
use crate::store::MessageStore;
use crate::timer::earliest;
use crate::tts::{TtsCoordinator, sanitize_for_speech};

/// Read-only view of the conversation published after every engine step.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationSnapshot {
    pub conversation_id: ConversationId,
    pub messages: Vec<Message>,
    pub loading_history: bool,
    /// Kind of the turn that was triggered and has no reply yet.
    pub awaiting_reply: Option<TurnKind>,
}

impl ConversationSnapshot {
    fn empty(conversation_id: ConversationId) -> Self {
        Self {
            conversation_id,
            messages: Vec::new(),
            loading_history: false,
            awaiting_reply: None,
        }
    }

    pub fn message(&self, message_id: &MessageId) -> Option<&Message> {
        self.messages.iter().find(|message| &message.id == message_id)
    }
}

#[derive(Debug)]
pub(crate) enum Intent {
    SendText {
        message_id: MessageId,
        text: String,
    },
    InputChanged {
        text: String,
    },
    PreviewImage {
        message_id: MessageId,
        file: PathBuf,
        caption: String,
    },
    CommitImage {
        message_id: MessageId,
        remote_url: String,
    },
    FailImage {
        message_id: MessageId,
    },
    UploadImage {
        message_id: MessageId,
        file: PathBuf,
        caption: String,
    },
    PreviewVoice {
        message_id: MessageId,
        recording: PathBuf,
    },
    CommitVoice {
        message_id: MessageId,
        transcript: Transcript,
    },
    FailVoice {
        message_id: MessageId,
    },
    TranscribeVoice {
        message_id: MessageId,
        recording: PathBuf,
    },
    Speak {
        text: String,
    },
    SwitchConversation {
        conversation_id: ConversationId,
    },
    Barrier {
        ack: oneshot::Sender<()>,
    },
    Dispose,
}

/// Results of remote conversions started by the engine, tagged with the conversation
/// they were started for.
#[derive(Debug)]
enum Completion {
    Upload {
        conversation_id: ConversationId,
        message_id: MessageId,
        result: ServiceResult<String>,
    },
    Transcription {
        conversation_id: ConversationId,
        message_id: MessageId,
        result: ServiceResult<Transcript>,
    },
    Speech {
        result: ServiceResult<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MediaKind {
    Image,
    Voice,
}

impl MediaKind {
    fn notice_kind(self) -> NoticeKind {
        match self {
            Self::Image => NoticeKind::Upload,
            Self::Voice => NoticeKind::Transcription,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Image => "image upload",
            Self::Voice => "voice transcription",
        }
    }
}

struct ActiveChannel {
    outbound: mpsc::UnboundedSender<Outbound>,
    inbound: mpsc::UnboundedReceiver<Inbound>,
    worker: JoinHandle<()>,
}

impl ActiveChannel {
    fn close(self) {
        self.worker.abort();
    }
}

pub struct ConversationEngine {
    config: EngineConfig,
    conversation_id: ConversationId,
    connector: Arc<dyn ChannelConnector>,
    media: Arc<dyn MediaService>,
    store: MessageStore,
    tracker: DeliveryTracker,
    aggregator: TurnAggregator,
    reveal: RevealScheduler,
    tts: TtsCoordinator,
    channel: Option<ActiveChannel>,
    awaiting_reply: Option<TurnKind>,
    ui_tx: mpsc::UnboundedSender<UiEvent>,
    completion_tx: mpsc::UnboundedSender<Completion>,
    snapshot: Arc<ArcSwap<ConversationSnapshot>>,
    dirty: bool,
}

impl ConversationEngine {
    /// Spawns the engine on the current tokio runtime and opens the channel for
    /// `conversation_id`.
    pub fn spawn(
        config: EngineConfig,
        conversation_id: ConversationId,
        connector: Arc<dyn ChannelConnector>,
        media: Arc<dyn MediaService>,
    ) -> (ConversationHandle, mpsc::UnboundedReceiver<UiEvent>) {
        let (intent_tx, intent_rx) = mpsc::unbounded_channel();
        let (ui_tx, ui_rx) = mpsc::unbounded_channel();
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let snapshot = Arc::new(ArcSwap::from_pointee(ConversationSnapshot::empty(
            conversation_id.clone(),
        )));

        let engine = Self {
            tracker: DeliveryTracker::new(config.delivery_promotion),
            aggregator: TurnAggregator::new(config.quiet_window),
            reveal: RevealScheduler::new(config.reveal_base, config.reveal_step),
            tts: TtsCoordinator::new(config.tts_timeout),
            config,
            conversation_id,
            connector,
            media,
            store: MessageStore::default(),
            channel: None,
            awaiting_reply: None,
            ui_tx,
            completion_tx,
            snapshot: Arc::clone(&snapshot),
            dirty: true,
        };
        tokio::spawn(engine.run(intent_rx, completion_rx));

        (ConversationHandle::new(intent_tx, snapshot), ui_rx)
    }

    async fn run(
        mut self,
        mut intents: mpsc::UnboundedReceiver<Intent>,
        mut completions: mpsc::UnboundedReceiver<Completion>,
    ) {
        self.connect();
        self.publish();

        loop {
            let deadline = self.next_deadline();
            // Channel events, media results and due timers drain ahead of new intents.
            tokio::select! {
                biased;
                inbound = recv_inbound(&mut self.channel) => self.handle_inbound(inbound),
                Some(completion) = completions.recv() => self.handle_completion(completion),
                () = sleep_until(deadline) => self.handle_deadlines(Instant::now()),
                intent = intents.recv() => match intent {
                    Some(Intent::Dispose) | None => break,
                    Some(intent) => self.handle_intent(intent),
                },
            }
            self.publish();
        }

        tracing::debug!(
            conversation_id = %self.conversation_id,
            "conversation engine disposed"
        );
        self.teardown();
    }

    fn next_deadline(&self) -> Option<Instant> {
        earliest([
            self.tracker.next_deadline(),
            self.aggregator.next_deadline(),
            self.reveal.next_deadline(),
            self.tts.next_deadline(),
        ])
    }

    fn connect(&mut self) {
        match self.connector.open(&self.conversation_id) {
            Ok(handle) => {
                let worker = tokio::spawn(handle.worker);
                self.channel = Some(ActiveChannel {
                    outbound: handle.outbound,
                    inbound: handle.inbound,
                    worker,
                });
                self.store.set_loading_history(true);
            }
            Err(error) => {
                tracing::error!(
                    conversation_id = %self.conversation_id,
                    error = %error,
                    "failed to open conversation channel"
                );
                self.store.set_loading_history(false);
                self.notify(NoticeKind::Connection, error.to_string());
            }
        }
        self.dirty = true;
    }

    /// Cancels every pending timer and closes the channel.
    ///
    /// Remote conversions already in flight keep running; their results are dropped when
    /// they no longer match the active conversation.
    fn teardown(&mut self) {
        self.tracker.clear();
        self.aggregator.reset();
        self.reveal.cancel();
        self.tts.clear();
        self.awaiting_reply = None;
        if let Some(channel) = self.channel.take() {
            channel.close();
        }
    }

    fn handle_intent(&mut self, intent: Intent) {
        let now = Instant::now();
        match intent {
            Intent::SendText { message_id, text } => self.send_text(message_id, &text, now),
            Intent::InputChanged { text } => {
                self.aggregator.set_typing(!text.trim().is_empty(), now);
            }
            Intent::PreviewImage {
                message_id,
                file,
                caption,
            } => self.preview_image(message_id, file, &caption, now),
            Intent::CommitImage {
                message_id,
                remote_url,
            } => self.commit_image(&message_id, &remote_url, now),
            Intent::FailImage { message_id } => {
                self.fail_media(MediaKind::Image, &message_id, "cancelled", now);
            }
            Intent::UploadImage {
                message_id,
                file,
                caption,
            } => {
                self.preview_image(message_id.clone(), file.clone(), &caption, now);
                self.start_upload(message_id, file);
            }
            Intent::PreviewVoice {
                message_id,
                recording,
            } => self.preview_voice(message_id, recording, now),
            Intent::CommitVoice {
                message_id,
                transcript,
            } => self.commit_voice(&message_id, &transcript, now),
            Intent::FailVoice { message_id } => {
                self.fail_media(MediaKind::Voice, &message_id, "cancelled", now);
            }
            Intent::TranscribeVoice {
                message_id,
                recording,
            } => {
                self.preview_voice(message_id.clone(), recording.clone(), now);
                self.start_transcription(message_id, recording);
            }
            Intent::Speak { text } => self.start_speech(&text),
            Intent::SwitchConversation { conversation_id } => {
                self.switch_conversation(conversation_id);
            }
            Intent::Barrier { ack } => {
                let _ = ack.send(());
            }
            Intent::Dispose => {}
        }
    }

    fn send_text(&mut self, message_id: MessageId, text: &str, now: Instant) {
        let text = text.trim();
        if text.is_empty() {
            tracing::debug!("ignoring blank text message");
            return;
        }

        self.store
            .append(Message::user_text(message_id.clone(), text));
        self.tracker.register(&mut self.store, &message_id, now);
        self.aggregator.set_typing(false, now);
        self.aggregator.enqueue_text(text, TurnKind::Text, now);
        self.emit(Outbound::SendMessage {
            conversation_id: self.conversation_id.clone(),
            client_id: message_id,
            content: text.to_string(),
            media_url: None,
            turn_kind: TurnKind::Text,
        });
        self.ui(UiEvent::ScrollToLatest);
        self.dirty = true;
    }

    fn pipeline(&mut self, now: Instant) -> PipelineContext<'_> {
        PipelineContext {
            store: &mut self.store,
            tracker: &mut self.tracker,
            aggregator: &mut self.aggregator,
            now,
        }
    }

    fn preview_image(&mut self, message_id: MessageId, file: PathBuf, caption: &str, now: Instant) {
        self.pipeline(now).preview_image(message_id, file, caption);
        self.ui(UiEvent::ScrollToLatest);
        self.dirty = true;
    }

    fn preview_voice(&mut self, message_id: MessageId, recording: PathBuf, now: Instant) {
        self.pipeline(now).preview_voice(message_id, recording);
        self.ui(UiEvent::ScrollToLatest);
        self.dirty = true;
    }

    fn commit_image(&mut self, message_id: &MessageId, remote_url: &str, now: Instant) {
        let committed = self.pipeline(now).commit_image(message_id, remote_url);
        self.finish_commit(MediaKind::Image, message_id, committed, now);
    }

    fn commit_voice(&mut self, message_id: &MessageId, transcript: &Transcript, now: Instant) {
        let committed = self.pipeline(now).commit_voice(message_id, transcript);
        self.finish_commit(MediaKind::Voice, message_id, committed, now);
    }

    fn finish_commit(
        &mut self,
        kind: MediaKind,
        message_id: &MessageId,
        committed: Result<CommittedMedia, PipelineRejection>,
        now: Instant,
    ) {
        match committed {
            Ok(media) => {
                self.emit(Outbound::SendMessage {
                    conversation_id: self.conversation_id.clone(),
                    client_id: media.message_id,
                    content: media.content,
                    media_url: Some(media.media_url),
                    turn_kind: media.turn_kind,
                });
                self.dirty = true;
            }
            Err(PipelineRejection::BlankResult) => {
                self.fail_media(kind, message_id, "empty result", now);
            }
            Err(rejection) => {
                tracing::warn!(
                    message_id = %message_id,
                    media = kind.label(),
                    rejection = ?rejection,
                    "ignoring media commit"
                );
            }
        }
    }

    fn fail_media(&mut self, kind: MediaKind, message_id: &MessageId, reason: &str, now: Instant) {
        match self.pipeline(now).fail(message_id) {
            Ok(_) => {}
            Err(PipelineRejection::UnknownMessage) => {
                tracing::debug!(
                    message_id = %message_id,
                    media = kind.label(),
                    "media message already gone"
                );
                return;
            }
            Err(rejection) => {
                tracing::warn!(
                    message_id = %message_id,
                    media = kind.label(),
                    rejection = ?rejection,
                    "refusing to roll back a settled message"
                );
                return;
            }
        }

        tracing::warn!(
            message_id = %message_id,
            media = kind.label(),
            reason,
            "removed failed media message"
        );
        self.notify(kind.notice_kind(), format!("{} failed: {reason}", kind.label()));
        self.dirty = true;
    }

    fn start_upload(&self, message_id: MessageId, file: PathBuf) {
        let media = Arc::clone(&self.media);
        let completion_tx = self.completion_tx.clone();
        let conversation_id = self.conversation_id.clone();
        tokio::spawn(async move {
            let result = media.upload_image(file).await;
            let _ = completion_tx.send(Completion::Upload {
                conversation_id,
                message_id,
                result,
            });
        });
    }

    fn start_transcription(&self, message_id: MessageId, recording: PathBuf) {
        let media = Arc::clone(&self.media);
        let completion_tx = self.completion_tx.clone();
        let request = TranscriptionRequest {
            recording,
            language: self.config.language.clone(),
            user_id: self.config.user_id.clone(),
            conversation_id: self.conversation_id.clone(),
            message_id: message_id.clone(),
        };
        let conversation_id = self.conversation_id.clone();
        tokio::spawn(async move {
            let result = media.transcribe(request).await;
            let _ = completion_tx.send(Completion::Transcription {
                conversation_id,
                message_id,
                result,
            });
        });
    }

    fn start_speech(&self, text: &str) {
        let text = sanitize_for_speech(text);
        if text.is_empty() {
            tracing::debug!("nothing speakable left after sanitizing");
            return;
        }

        let media = Arc::clone(&self.media);
        let completion_tx = self.completion_tx.clone();
        let request = SpeechRequest {
            text,
            voice: self.config.voice.clone(),
            language: self.config.language.clone(),
        };
        tokio::spawn(async move {
            let result = media.synthesize(request).await;
            let _ = completion_tx.send(Completion::Speech { result });
        });
    }

    fn handle_completion(&mut self, completion: Completion) {
        let now = Instant::now();
        match completion {
            Completion::Upload {
                conversation_id,
                message_id,
                result,
            } => {
                if !self.is_current(&conversation_id) {
                    return;
                }
                match result {
                    Ok(remote_url) => self.commit_image(&message_id, &remote_url, now),
                    Err(error) => {
                        self.fail_media(MediaKind::Image, &message_id, &error.to_string(), now);
                    }
                }
            }
            Completion::Transcription {
                conversation_id,
                message_id,
                result,
            } => {
                if !self.is_current(&conversation_id) {
                    return;
                }
                match result {
                    Ok(transcript) => self.commit_voice(&message_id, &transcript, now),
                    Err(error) => {
                        self.fail_media(MediaKind::Voice, &message_id, &error.to_string(), now);
                    }
                }
            }
            Completion::Speech { result } => match result {
                Ok(audio_url) => self.ui(UiEvent::SpeechSynthesized { audio_url }),
                Err(error) => {
                    tracing::warn!(error = %error, "speech synthesis failed");
                    self.notify(NoticeKind::Speech, error.to_string());
                }
            },
        }
    }

    fn is_current(&self, conversation_id: &ConversationId) -> bool {
        if conversation_id == &self.conversation_id {
            return true;
        }
        tracing::debug!(
            stale_conversation_id = %conversation_id,
            conversation_id = %self.conversation_id,
            "dropping media result for a previous conversation"
        );
        false
    }

    fn handle_inbound(&mut self, inbound: Option<Inbound>) {
        let now = Instant::now();
        let Some(inbound) = inbound else {
            tracing::warn!(
                conversation_id = %self.conversation_id,
                "conversation channel closed"
            );
            if let Some(channel) = self.channel.take() {
                channel.close();
            }
            if self.store.loading_history() {
                self.store.set_loading_history(false);
                self.dirty = true;
            }
            return;
        };

        match inbound {
            Inbound::Connected => {
                tracing::info!(
                    conversation_id = %self.conversation_id,
                    "channel connected; requesting history"
                );
                self.store.set_loading_history(true);
                self.emit(Outbound::FetchHistory {
                    conversation_id: self.conversation_id.clone(),
                });
                self.dirty = true;
            }
            Inbound::HistoryReceived { messages } => self.apply_history(messages),
            Inbound::HistoryError { error } => {
                tracing::warn!(
                    conversation_id = %self.conversation_id,
                    error = %error,
                    "history request failed"
                );
                self.store.set_loading_history(false);
                self.notify(NoticeKind::History, error);
                self.dirty = true;
            }
            Inbound::ReplyReceived {
                content,
                timestamp,
                turn_kind,
            } => self.accept_reply(content, timestamp, turn_kind, now),
            Inbound::SpeechReady { audio_url } => {
                if self.tts.attach(&mut self.store, &audio_url).is_some() {
                    self.dirty = true;
                }
            }
            Inbound::ConnectError { reason } => {
                tracing::error!(
                    conversation_id = %self.conversation_id,
                    reason = %reason,
                    "channel connection failed"
                );
                self.store.set_loading_history(false);
                self.notify(NoticeKind::Connection, reason);
                self.dirty = true;
            }
        }
    }

    fn apply_history(&mut self, entries: Vec<HistoryEntry>) {
        let history = entries
            .into_iter()
            .map(|entry| entry.into_history_message())
            .collect();
        let merge = self.store.replace_with_history(history);
        for message_id in &merge.superseded {
            self.tracker.cancel(message_id);
        }
        let orphaned_reveal = self
            .reveal
            .active_message()
            .is_some_and(|active| self.store.get(active).is_none());
        if orphaned_reveal {
            self.reveal.cancel();
        }
        self.store.set_loading_history(false);

        tracing::debug!(
            conversation_id = %self.conversation_id,
            messages = self.store.len(),
            retained = merge.retained.len(),
            superseded = merge.superseded.len(),
            "history merged"
        );
        self.ui(UiEvent::ScrollToLatest);
        self.dirty = true;
    }

    fn accept_reply(
        &mut self,
        content: String,
        timestamp: Option<String>,
        turn_kind: Option<TurnKind>,
        now: Instant,
    ) {
        self.tracker.confirm_all_outstanding(&mut self.store);
        let turn_kind = turn_kind
            .or(self.awaiting_reply.take())
            .unwrap_or_default();

        let message_id = MessageId::generate();
        self.store.append(Message::ai_reply(
            message_id.clone(),
            content.clone(),
            timestamp,
            turn_kind,
        ));
        self.tts.expect(&mut self.store, &message_id, now);
        let steps = self.reveal.start(message_id, &content, now);
        self.apply_reveal(steps);
        self.ui(UiEvent::ScrollToLatest);
        self.dirty = true;
    }

    fn apply_reveal(&mut self, steps: Vec<RevealStep>) {
        for step in steps {
            match step {
                RevealStep::Show {
                    message_id, unit, ..
                } => {
                    if let Some(message) = self.store.get_mut(&message_id) {
                        message.revealed.push(unit);
                        self.ui(UiEvent::ScrollToLatest);
                        self.dirty = true;
                    }
                }
                RevealStep::Composing { message_id, active } => {
                    self.ui(UiEvent::Composing { message_id, active });
                }
                RevealStep::Complete { message_id } => self.finish_reveal(message_id, Vec::new()),
                RevealStep::Superseded {
                    message_id,
                    remaining,
                } => {
                    self.ui(UiEvent::Composing {
                        message_id: message_id.clone(),
                        active: false,
                    });
                    self.finish_reveal(message_id, remaining);
                }
            }
        }
    }

    fn finish_reveal(&mut self, message_id: MessageId, remaining: Vec<String>) {
        if let Some(message) = self.store.get_mut(&message_id) {
            message.revealed.extend(remaining);
            message.is_revealing = false;
            self.dirty = true;
        }
        self.ui(UiEvent::RevealFinished { message_id });
    }

    fn handle_deadlines(&mut self, now: Instant) {
        if !self.tracker.expire(&mut self.store, now).is_empty() {
            self.dirty = true;
        }

        if let Some(turn) = self.aggregator.poll(now) {
            self.flush_turn(turn);
        }

        let steps = self.reveal.poll(now);
        self.apply_reveal(steps);

        let expired = self.tts.expire(&mut self.store, now);
        if !expired.is_empty() {
            tracing::debug!(count = expired.len(), "speech wait expired");
            self.dirty = true;
        }
    }

    /// Closes the user's turn: everything sent so far is delivered, then the server is asked
    /// to summarize and answer.
    fn flush_turn(&mut self, turn: PendingTurn) {
        let confirmed = self.tracker.confirm_all_outstanding(&mut self.store);
        let PendingTurn {
            content,
            image_url,
            turn_kind,
        } = turn;

        tracing::debug!(
            conversation_id = %self.conversation_id,
            confirmed,
            turn_kind = ?turn_kind,
            has_image = image_url.is_some(),
            "triggering turn"
        );
        self.emit(Outbound::SummarizeTurn {
            conversation_id: self.conversation_id.clone(),
            content: content.clone(),
            media_url: image_url.clone(),
        });
        self.emit(Outbound::TriggerTurn {
            conversation_id: self.conversation_id.clone(),
            content: (!content.is_empty()).then_some(content),
            media_url: image_url,
            turn_kind,
        });
        self.awaiting_reply = Some(turn_kind);
        self.dirty = true;
    }

    fn switch_conversation(&mut self, conversation_id: ConversationId) {
        if conversation_id == self.conversation_id {
            tracing::debug!(conversation_id = %conversation_id, "already on conversation");
            return;
        }

        tracing::info!(
            from = %self.conversation_id,
            to = %conversation_id,
            "switching conversation"
        );
        self.teardown();
        self.store = MessageStore::default();
        self.conversation_id = conversation_id;
        self.connect();
    }

    fn emit(&self, event: Outbound) {
        let name = event.name();
        let Some(channel) = &self.channel else {
            tracing::warn!(
                conversation_id = %self.conversation_id,
                event = name,
                "no open channel; dropping outbound event"
            );
            return;
        };
        if channel.outbound.send(event).is_err() {
            tracing::warn!(
                conversation_id = %self.conversation_id,
                event = name,
                "channel worker gone; dropping outbound event"
            );
        }
    }

    fn notify(&self, kind: NoticeKind, message: impl Into<String>) {
        self.ui(UiEvent::Notice(Notice::new(kind, message)));
    }

    fn ui(&self, event: UiEvent) {
        let _ = self.ui_tx.send(event);
    }

    fn publish(&mut self) {
        if !self.dirty {
            return;
        }
        self.dirty = false;
        self.snapshot.store(Arc::new(ConversationSnapshot {
            conversation_id: self.conversation_id.clone(),
            messages: self.store.messages().to_vec(),
            loading_history: self.store.loading_history(),
            awaiting_reply: self.awaiting_reply,
        }));
        self.ui(UiEvent::MessagesChanged);
    }
}

async fn recv_inbound(channel: &mut Option<ActiveChannel>) -> Option<Inbound> {
    match channel {
        Some(channel) => channel.inbound.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
