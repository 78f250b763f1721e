use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use kindred_sync::{
    BoxFuture, ConversationEngine, ConversationHandle, ConversationId, DeliveryStatus,
    EngineConfig, HistoryEntry, Inbound, MediaRef, MediaService, MemoryConnector, MemoryPeer,
    MessageId, Notice, NoticeKind, Origin, Outbound, ServiceError, ServiceResult, SpeechRequest,
    Transcript, TranscriptionRequest, TtsState, TurnKind, UiEvent, UserId, WireRole,
};
use tokio::sync::mpsc;
use tokio::time::sleep;

#[derive(Default)]
struct FakeMedia {
    upload_url: Option<String>,
    transcript: Option<Transcript>,
    speech_url: Option<String>,
    speech_requests: Mutex<Vec<SpeechRequest>>,
}

fn unavailable(stage: &'static str) -> ServiceError {
    ServiceError::Request {
        stage,
        service: "fake",
        message: "service unavailable".to_string(),
    }
}

impl MediaService for FakeMedia {
    fn upload_image(&self, _file: PathBuf) -> BoxFuture<'_, ServiceResult<String>> {
        let result = self.upload_url.clone().ok_or_else(|| unavailable("upload"));
        Box::pin(async move { result })
    }

    fn transcribe(&self, _request: TranscriptionRequest) -> BoxFuture<'_, ServiceResult<Transcript>> {
        let result = self.transcript.clone().ok_or_else(|| unavailable("transcribe"));
        Box::pin(async move { result })
    }

    fn synthesize(&self, request: SpeechRequest) -> BoxFuture<'_, ServiceResult<String>> {
        self.speech_requests.lock().unwrap().push(request);
        let result = self.speech_url.clone().ok_or_else(|| unavailable("synthesize"));
        Box::pin(async move { result })
    }
}

struct Harness {
    handle: ConversationHandle,
    events: mpsc::UnboundedReceiver<UiEvent>,
    peers: mpsc::UnboundedReceiver<MemoryPeer>,
    connector: Arc<MemoryConnector>,
}

impl Harness {
    /// Lets spawned media tasks finish, then waits for the engine to apply everything queued.
    async fn settle(&self) {
        sleep(Duration::from_millis(1)).await;
        self.handle.barrier().await.unwrap();
    }

    fn drain_events(&mut self) -> Vec<UiEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    fn notices(&mut self) -> Vec<Notice> {
        self.drain_events()
            .into_iter()
            .filter_map(|event| match event {
                UiEvent::Notice(notice) => Some(notice),
                _ => None,
            })
            .collect()
    }
}

fn conversation() -> ConversationId {
    ConversationId::from("conv-1")
}

fn config() -> EngineConfig {
    EngineConfig::new(UserId::from("user-1"))
}

fn spawn_engine(
    config: EngineConfig,
    media: Arc<FakeMedia>,
    connector: MemoryConnector,
    peers: mpsc::UnboundedReceiver<MemoryPeer>,
) -> Harness {
    let connector = Arc::new(connector);
    let (handle, events) =
        ConversationEngine::spawn(config, conversation(), connector.clone(), media);
    Harness {
        handle,
        events,
        peers,
        connector,
    }
}

/// Starts an engine, accepts its connection and answers the history request with nothing.
async fn start(config: EngineConfig, media: Arc<FakeMedia>) -> (Harness, MemoryPeer) {
    let (connector, peers) = MemoryConnector::new();
    let mut harness = spawn_engine(config, media, connector, peers);

    let mut peer = harness.peers.recv().await.unwrap();
    assert_eq!(peer.conversation_id(), &conversation());
    assert_eq!(
        peer.recv().await,
        Some(Outbound::FetchHistory {
            conversation_id: conversation(),
        })
    );
    assert!(harness.handle.snapshot().loading_history);

    peer.deliver(Inbound::HistoryReceived {
        messages: Vec::new(),
    });
    harness.settle().await;
    assert!(!harness.handle.snapshot().loading_history);
    harness.drain_events();

    (harness, peer)
}

fn triggers(sent: &[Outbound]) -> Vec<&Outbound> {
    sent.iter()
        .filter(|event| matches!(event, Outbound::TriggerTurn { .. }))
        .collect()
}

fn user_entry(id: &str, client_id: Option<&MessageId>, content: &str) -> HistoryEntry {
    HistoryEntry {
        id: MessageId::from(id),
        client_id: client_id.cloned(),
        role: WireRole::User,
        content: content.to_string(),
        created_at: "2026-03-01T09:00:00.000Z".to_string(),
        media_url: None,
        audio_url: None,
        audio_duration: None,
        turn_kind: None,
    }
}

fn reply(content: &str, turn_kind: Option<TurnKind>) -> Inbound {
    Inbound::ReplyReceived {
        content: content.to_string(),
        timestamp: None,
        turn_kind,
    }
}

fn delivery_of(harness: &Harness, message_id: &MessageId) -> Option<DeliveryStatus> {
    harness
        .handle
        .snapshot()
        .message(message_id)
        .and_then(|message| message.delivery)
}

#[tokio::test(start_paused = true)]
async fn burst_of_sends_triggers_a_single_turn() {
    let (harness, mut peer) = start(config(), Arc::default()).await;

    let first = harness.handle.send_text("hey").unwrap().unwrap();
    sleep(Duration::from_millis(500)).await;
    harness.handle.send_text("  are you there ").unwrap();
    sleep(Duration::from_millis(500)).await;
    harness.handle.send_text("?").unwrap();
    sleep(Duration::from_millis(2000)).await;
    harness.settle().await;

    let mut sent = peer.drain();
    assert!(triggers(&sent).is_empty());
    assert_eq!(delivery_of(&harness, &first), Some(DeliveryStatus::Sent));

    sleep(Duration::from_millis(1000)).await;
    harness.settle().await;
    sent.extend(peer.drain());

    let sends = sent
        .iter()
        .filter(|event| matches!(event, Outbound::SendMessage { .. }))
        .count();
    assert_eq!(sends, 3);
    assert_eq!(
        triggers(&sent),
        vec![&Outbound::TriggerTurn {
            conversation_id: conversation(),
            content: Some("hey are you there ?".to_string()),
            media_url: None,
            turn_kind: TurnKind::Text,
        }]
    );
    let summary_position = sent
        .iter()
        .position(|event| matches!(event, Outbound::SummarizeTurn { .. }));
    let trigger_position = sent
        .iter()
        .position(|event| matches!(event, Outbound::TriggerTurn { .. }));
    assert!(summary_position < trigger_position);

    let snapshot = harness.handle.snapshot();
    assert_eq!(snapshot.awaiting_reply, Some(TurnKind::Text));
    assert!(
        snapshot
            .messages
            .iter()
            .all(|message| message.delivery == Some(DeliveryStatus::Delivered))
    );
}

#[tokio::test(start_paused = true)]
async fn blank_text_is_ignored() {
    let (harness, mut peer) = start(config(), Arc::default()).await;

    assert_eq!(harness.handle.send_text("   ").unwrap(), None);
    sleep(Duration::from_secs(5)).await;
    harness.settle().await;

    assert!(peer.drain().is_empty());
    assert!(harness.handle.snapshot().messages.is_empty());
}

#[tokio::test(start_paused = true)]
async fn delivery_status_only_moves_forward() {
    let (harness, peer) = start(config(), Arc::default()).await;
    let mut seen = Vec::new();

    let message_id = harness.handle.send_text("ping").unwrap().unwrap();
    harness.settle().await;
    seen.extend(delivery_of(&harness, &message_id));

    sleep(Duration::from_millis(800)).await;
    harness.settle().await;
    seen.extend(delivery_of(&harness, &message_id));

    sleep(Duration::from_millis(2000)).await;
    harness.settle().await;
    seen.extend(delivery_of(&harness, &message_id));

    peer.deliver(reply("pong", None));
    sleep(Duration::from_secs(5)).await;
    harness.settle().await;
    seen.extend(delivery_of(&harness, &message_id));

    assert_eq!(
        seen,
        vec![
            DeliveryStatus::Pending,
            DeliveryStatus::Sent,
            DeliveryStatus::Delivered,
            DeliveryStatus::Delivered,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn typing_holds_the_turn_until_the_next_send() {
    let (harness, mut peer) = start(config(), Arc::default()).await;

    harness.handle.send_text("first").unwrap();
    sleep(Duration::from_millis(500)).await;
    harness.handle.input_changed("sec").unwrap();
    sleep(Duration::from_secs(6)).await;
    harness.settle().await;
    assert!(triggers(&peer.drain()).is_empty());

    harness.handle.input_changed("").unwrap();
    harness.handle.send_text("second").unwrap();
    sleep(Duration::from_secs(3)).await;
    harness.settle().await;

    let sent = peer.drain();
    assert_eq!(
        triggers(&sent),
        vec![&Outbound::TriggerTurn {
            conversation_id: conversation(),
            content: Some("first second".to_string()),
            media_url: None,
            turn_kind: TurnKind::Text,
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn clearing_the_composer_restarts_the_window() {
    let (harness, mut peer) = start(config(), Arc::default()).await;

    harness.handle.send_text("hello").unwrap();
    harness.handle.input_changed("draft").unwrap();
    sleep(Duration::from_secs(4)).await;
    harness.handle.input_changed("").unwrap();
    sleep(Duration::from_millis(2000)).await;
    harness.settle().await;
    assert!(triggers(&peer.drain()).is_empty());

    sleep(Duration::from_millis(600)).await;
    harness.settle().await;
    assert_eq!(triggers(&peer.drain()).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn send_clear_and_send_again_join_into_one_turn() {
    let (harness, mut peer) = start(config(), Arc::default()).await;

    harness.handle.send_text("first").unwrap();
    sleep(Duration::from_millis(500)).await;
    harness.handle.input_changed("draft").unwrap();
    sleep(Duration::from_millis(500)).await;
    harness.handle.input_changed("").unwrap();
    sleep(Duration::from_millis(500)).await;
    harness.handle.send_text("second").unwrap();

    sleep(Duration::from_secs(1)).await;
    harness.settle().await;
    assert!(triggers(&peer.drain()).is_empty());

    sleep(Duration::from_secs(2)).await;
    harness.settle().await;
    let sent = peer.drain();
    assert_eq!(
        triggers(&sent),
        vec![&Outbound::TriggerTurn {
            conversation_id: conversation(),
            content: Some("first second".to_string()),
            media_url: None,
            turn_kind: TurnKind::Text,
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn reply_is_revealed_unit_by_unit() {
    let (mut harness, mut peer) = start(config(), Arc::default()).await;
    harness.handle.send_text("hi").unwrap();
    sleep(Duration::from_secs(3)).await;
    harness.settle().await;
    assert_eq!(triggers(&peer.drain()).len(), 1);
    harness.drain_events();

    peer.deliver(reply("Hi there! How are you? 🙂", None));
    harness.settle().await;

    let snapshot = harness.handle.snapshot();
    let reply_message = snapshot.messages.last().cloned().unwrap();
    assert_eq!(reply_message.origin, Origin::Ai);
    assert_eq!(reply_message.revealed, vec!["Hi there!"]);
    assert!(reply_message.is_revealing);
    assert_eq!(snapshot.awaiting_reply, None);

    sleep(Duration::from_millis(850)).await;
    harness.settle().await;
    let revealed = harness
        .handle
        .snapshot()
        .message(&reply_message.id)
        .map(|message| message.revealed.clone());
    assert_eq!(
        revealed,
        Some(vec!["Hi there!".to_string(), "How are you?".to_string()])
    );

    sleep(Duration::from_millis(1250)).await;
    harness.settle().await;
    let finished = harness.handle.snapshot().message(&reply_message.id).cloned().unwrap();
    assert_eq!(finished.revealed, vec!["Hi there!", "How are you?", "🙂"]);
    assert!(!finished.is_revealing);

    let events = harness.drain_events();
    assert!(events.contains(&UiEvent::Composing {
        message_id: reply_message.id.clone(),
        active: true,
    }));
    assert_eq!(events.last(), Some(&UiEvent::MessagesChanged));
    assert!(events.contains(&UiEvent::RevealFinished {
        message_id: reply_message.id,
    }));
}

#[tokio::test(start_paused = true)]
async fn newer_reply_finishes_the_previous_reveal() {
    let (harness, peer) = start(config(), Arc::default()).await;

    peer.deliver(reply("One. Two. Three.", None));
    peer.deliver(reply("Fresh answer.", None));
    harness.settle().await;

    let snapshot = harness.handle.snapshot();
    assert_eq!(snapshot.messages.len(), 2);
    assert_eq!(snapshot.messages[0].revealed, vec!["One.", "Two.", "Three."]);
    assert!(!snapshot.messages[0].is_revealing);
    assert_eq!(snapshot.messages[1].revealed, vec!["Fresh answer."]);
    assert!(!snapshot.messages[1].is_revealing);
}

#[tokio::test(start_paused = true)]
async fn uploaded_image_joins_the_turn() {
    let media = Arc::new(FakeMedia {
        upload_url: Some("https://cdn.example/cat.png".to_string()),
        ..FakeMedia::default()
    });
    let (harness, mut peer) = start(config(), media).await;

    let message_id = harness.handle.upload_image("/tmp/cat.png", "look at this").unwrap();
    harness.settle().await;

    let image = harness
        .handle
        .snapshot()
        .message(&message_id)
        .and_then(|message| message.image.clone())
        .unwrap();
    assert_eq!(image.source, MediaRef::Remote("https://cdn.example/cat.png".to_string()));
    assert!(!image.is_uploading);

    sleep(Duration::from_secs(3)).await;
    harness.settle().await;
    let sent = peer.drain();

    assert_eq!(
        sent.first(),
        Some(&Outbound::SendMessage {
            conversation_id: conversation(),
            client_id: message_id,
            content: "look at this".to_string(),
            media_url: Some("https://cdn.example/cat.png".to_string()),
            turn_kind: TurnKind::Text,
        })
    );
    assert_eq!(
        triggers(&sent),
        vec![&Outbound::TriggerTurn {
            conversation_id: conversation(),
            content: Some("look at this".to_string()),
            media_url: Some("https://cdn.example/cat.png".to_string()),
            turn_kind: TurnKind::Text,
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn failed_upload_leaves_no_message_and_no_timer() {
    let (mut harness, mut peer) = start(config(), Arc::default()).await;

    harness.handle.upload_image("/tmp/cat.png", "").unwrap();
    harness.settle().await;

    assert!(harness.handle.snapshot().messages.is_empty());
    let notices = harness.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].kind, NoticeKind::Upload);

    sleep(Duration::from_secs(5)).await;
    harness.settle().await;
    assert!(peer.drain().is_empty());
    assert!(harness.handle.snapshot().messages.is_empty());
}

#[tokio::test(start_paused = true)]
async fn previewed_image_can_be_failed_by_the_caller() {
    let (mut harness, mut peer) = start(config(), Arc::default()).await;

    let message_id = harness.handle.preview_image("/tmp/cat.png", "caption").unwrap();
    harness.settle().await;
    let preview = harness.handle.snapshot().message(&message_id).cloned().unwrap();
    assert_eq!(preview.delivery, Some(DeliveryStatus::Pending));
    assert_eq!(
        preview.image.map(|image| image.source),
        Some(MediaRef::Local(PathBuf::from("/tmp/cat.png")))
    );

    harness.handle.fail_image(&message_id).unwrap();
    sleep(Duration::from_secs(5)).await;
    harness.settle().await;

    assert!(harness.handle.snapshot().message(&message_id).is_none());
    assert!(peer.drain().is_empty());
    assert_eq!(harness.notices().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn rollback_ignores_messages_that_finished_converting() {
    let (mut harness, mut peer) = start(config(), Arc::default()).await;

    let text_id = harness.handle.send_text("hello").unwrap().unwrap();
    let image_id = harness.handle.preview_image("/tmp/a.png", "").unwrap();
    harness.handle.commit_image(&image_id, "https://cdn/a.png").unwrap();
    harness.handle.fail_image(&image_id).unwrap();
    harness.handle.fail_image(&text_id).unwrap();
    harness.handle.fail_voice(&text_id).unwrap();
    harness.settle().await;

    let snapshot = harness.handle.snapshot();
    assert_eq!(snapshot.messages.len(), 2);
    assert!(snapshot.message(&text_id).is_some());
    assert!(snapshot.message(&image_id).is_some());
    assert!(harness.notices().is_empty());

    sleep(Duration::from_secs(3)).await;
    harness.settle().await;
    let sent = peer.drain();
    assert_eq!(
        triggers(&sent),
        vec![&Outbound::TriggerTurn {
            conversation_id: conversation(),
            content: Some("hello".to_string()),
            media_url: Some("https://cdn/a.png".to_string()),
            turn_kind: TurnKind::Text,
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn voice_turn_gets_speech_attached() {
    let media = Arc::new(FakeMedia {
        transcript: Some(Transcript {
            text: "what's the weather".to_string(),
            audio_url: "https://cdn.example/clip.m4a".to_string(),
            duration_secs: Some(1.5),
        }),
        ..FakeMedia::default()
    });
    let (harness, mut peer) = start(config(), media).await;

    let voice_id = harness.handle.transcribe_voice("/tmp/clip.m4a").unwrap();
    sleep(Duration::from_secs(3)).await;
    harness.settle().await;

    let voice = harness.handle.snapshot().message(&voice_id).cloned().unwrap();
    assert_eq!(voice.content, "what's the weather");
    assert_eq!(voice.audio.map(|audio| audio.duration_secs), Some(Some(1.5)));

    let sent = peer.drain();
    assert!(sent.contains(&Outbound::SendMessage {
        conversation_id: conversation(),
        client_id: voice_id,
        content: "what's the weather".to_string(),
        media_url: Some("https://cdn.example/clip.m4a".to_string()),
        turn_kind: TurnKind::Audio,
    }));
    assert_eq!(
        triggers(&sent),
        vec![&Outbound::TriggerTurn {
            conversation_id: conversation(),
            content: Some("what's the weather".to_string()),
            media_url: None,
            turn_kind: TurnKind::Audio,
        }]
    );

    peer.deliver(reply("Sunny all day.", None));
    harness.settle().await;
    let answer = harness.handle.snapshot().messages.last().cloned().unwrap();
    assert_eq!(answer.turn_kind, TurnKind::Audio);
    assert_eq!(answer.tts, TtsState::Pending);

    peer.deliver(Inbound::SpeechReady {
        audio_url: "https://cdn.example/reply.mp3".to_string(),
    });
    harness.settle().await;
    let answer = harness.handle.snapshot().message(&answer.id).cloned().unwrap();
    assert_eq!(answer.tts, TtsState::Attached);
    assert_eq!(
        answer.audio.map(|audio| audio.source),
        Some(MediaRef::Remote("https://cdn.example/reply.mp3".to_string()))
    );
}

#[tokio::test(start_paused = true)]
async fn blank_transcript_rolls_back_the_voice_message() {
    let media = Arc::new(FakeMedia {
        transcript: Some(Transcript {
            text: " ".to_string(),
            audio_url: "https://cdn.example/clip.m4a".to_string(),
            duration_secs: None,
        }),
        ..FakeMedia::default()
    });
    let (mut harness, mut peer) = start(config(), media).await;

    harness.handle.transcribe_voice("/tmp/clip.m4a").unwrap();
    sleep(Duration::from_secs(3)).await;
    harness.settle().await;

    assert!(harness.handle.snapshot().messages.is_empty());
    assert!(peer.drain().is_empty());
    let notices = harness.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].kind, NoticeKind::Transcription);
}

#[tokio::test(start_paused = true)]
async fn pending_speech_expires_when_timeout_is_configured() {
    let config = config().with_tts_timeout(Duration::from_secs(5));
    let (harness, peer) = start(config, Arc::default()).await;

    peer.deliver(reply("Here you go.", Some(TurnKind::Audio)));
    harness.settle().await;
    let answer = harness.handle.snapshot().messages.last().cloned().unwrap();
    assert_eq!(answer.tts, TtsState::Pending);

    sleep(Duration::from_secs(6)).await;
    harness.settle().await;
    let answer = harness.handle.snapshot().message(&answer.id).cloned().unwrap();
    assert_eq!(answer.tts, TtsState::Expired);
}

#[tokio::test(start_paused = true)]
async fn history_replace_does_not_duplicate_echoed_messages() {
    let (harness, peer) = start(config(), Arc::default()).await;

    let echoed = harness.handle.send_text("hello").unwrap().unwrap();
    let unmarked = harness.handle.send_text("same words").unwrap().unwrap();
    let unseen = harness.handle.send_text("still in flight").unwrap().unwrap();
    harness.settle().await;

    peer.deliver(Inbound::HistoryReceived {
        messages: vec![
            user_entry("srv-1", Some(&echoed), "hello"),
            user_entry("srv-2", None, "same words"),
        ],
    });
    harness.settle().await;

    let snapshot = harness.handle.snapshot();
    let ids = snapshot
        .messages
        .iter()
        .map(|message| message.id.clone())
        .collect::<Vec<_>>();
    assert_eq!(
        ids,
        vec![MessageId::from("srv-1"), MessageId::from("srv-2"), unseen.clone()]
    );
    assert!(snapshot.message(&echoed).is_none());
    assert!(snapshot.message(&unmarked).is_none());
    assert_eq!(
        snapshot.message(&MessageId::from("srv-1")).and_then(|message| message.delivery),
        Some(DeliveryStatus::Delivered)
    );

    sleep(Duration::from_secs(1)).await;
    harness.settle().await;
    assert_eq!(delivery_of(&harness, &unseen), Some(DeliveryStatus::Sent));
}

#[tokio::test(start_paused = true)]
async fn history_error_raises_a_notice() {
    let (connector, peers) = MemoryConnector::new();
    let mut harness = spawn_engine(config(), Arc::default(), connector, peers);
    let mut peer = harness.peers.recv().await.unwrap();
    assert!(peer.recv().await.is_some());

    peer.deliver(Inbound::HistoryError {
        error: "history unavailable".to_string(),
    });
    harness.settle().await;

    assert!(!harness.handle.snapshot().loading_history);
    assert_eq!(
        harness.notices(),
        vec![Notice::new(NoticeKind::History, "history unavailable")]
    );
}

#[tokio::test(start_paused = true)]
async fn refused_connection_raises_a_notice() {
    let (connector, peers) = MemoryConnector::new();
    connector.refuse_connections(Some("server unreachable"));
    let mut harness = spawn_engine(config(), Arc::default(), connector, peers);
    harness.settle().await;

    assert!(!harness.handle.snapshot().loading_history);
    assert_eq!(
        harness.notices(),
        vec![Notice::new(NoticeKind::Connection, "server unreachable")]
    );

    let message_id = harness.handle.send_text("anyone?").unwrap().unwrap();
    harness.settle().await;
    assert!(harness.handle.snapshot().message(&message_id).is_some());

    harness.connector.refuse_connections(None);
    let next = ConversationId::from("conv-2");
    harness.handle.switch_conversation(next.clone()).unwrap();
    let mut peer = harness.peers.recv().await.unwrap();
    assert_eq!(
        peer.recv().await,
        Some(Outbound::FetchHistory {
            conversation_id: next,
        })
    );
}

#[tokio::test(start_paused = true)]
async fn switching_conversation_reopens_the_channel() {
    let (mut harness, mut old_peer) = start(config(), Arc::default()).await;
    harness.handle.send_text("left behind").unwrap();
    harness.settle().await;

    let next = ConversationId::from("conv-2");
    harness.handle.switch_conversation(next.clone()).unwrap();
    let mut new_peer = harness.peers.recv().await.unwrap();
    assert_eq!(new_peer.conversation_id(), &next);
    assert_eq!(
        new_peer.recv().await,
        Some(Outbound::FetchHistory {
            conversation_id: next.clone(),
        })
    );
    harness.settle().await;

    assert!(old_peer.is_closed());
    let snapshot = harness.handle.snapshot();
    assert_eq!(snapshot.conversation_id, next);
    assert!(snapshot.messages.is_empty());
    assert_eq!(harness.handle.conversation_id(), next);

    sleep(Duration::from_secs(5)).await;
    harness.settle().await;
    assert!(triggers(&old_peer.drain()).is_empty());
    assert!(new_peer.drain().is_empty());
}

#[tokio::test(start_paused = true)]
async fn speak_sanitizes_and_reports_audio() {
    let media = Arc::new(FakeMedia {
        speech_url: Some("https://cdn.example/speech.mp3".to_string()),
        ..FakeMedia::default()
    });
    let (mut harness, _peer) = start(config(), Arc::clone(&media)).await;

    harness.handle.speak("**Hello** 👋 there").unwrap();
    harness.settle().await;

    assert!(harness.drain_events().contains(&UiEvent::SpeechSynthesized {
        audio_url: "https://cdn.example/speech.mp3".to_string(),
    }));
    let requests = media.speech_requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].text, "Hello there");
    assert_eq!(requests[0].voice, "alloy");
}

#[tokio::test(start_paused = true)]
async fn disposed_engine_rejects_further_calls() {
    let (harness, _peer) = start(config(), Arc::default()).await;

    harness.handle.dispose().unwrap();
    assert!(harness.handle.barrier().await.is_err());
    assert!(!harness.handle.is_running());
    assert!(harness.handle.send_text("late").is_err());
}
