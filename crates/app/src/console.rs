//! Line-oriented terminal front end for one conversation engine.

use std::collections::HashMap;
use std::path::PathBuf;

use kindred_sync::{
    ConversationHandle, ConversationId, ConversationSnapshot, DeliveryStatus, EngineError,
    Message, MessageId, Origin, TtsState, UiEvent,
};
use snafu::{ResultExt, Snafu};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::settings::SettingsStore;

const HELP: &str = "\
commands:
  <text>                  send a message
  /image <path> [caption] upload an image
  /voice <path>           transcribe a voice recording
  /say <text>             synthesize speech
  /switch <conversation>  open another conversation
  /history                print the conversation
  /quit                   leave";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send(String),
    Image { path: PathBuf, caption: String },
    Voice(PathBuf),
    Say(String),
    Switch(String),
    History,
    Help,
    Quit,
}

impl Command {
    /// Returns `None` for blank lines and malformed slash commands.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Some(Self::Send(line.to_string()));
        };

        let (name, argument) = match rest.split_once(char::is_whitespace) {
            Some((name, argument)) => (name, argument.trim()),
            None => (rest, ""),
        };
        match (name, argument) {
            ("quit" | "exit", _) => Some(Self::Quit),
            ("help", _) => Some(Self::Help),
            ("history", _) => Some(Self::History),
            (_, "") => None,
            ("image", argument) => {
                let (path, caption) = match argument.split_once(char::is_whitespace) {
                    Some((path, caption)) => (path, caption.trim()),
                    None => (argument, ""),
                };
                Some(Self::Image {
                    path: PathBuf::from(path),
                    caption: caption.to_string(),
                })
            }
            ("voice", argument) => Some(Self::Voice(PathBuf::from(argument))),
            ("say", argument) => Some(Self::Say(argument.to_string())),
            ("switch", argument) => Some(Self::Switch(argument.to_string())),
            _ => None,
        }
    }
}

/// Tracks how much of each AI reply has already been printed.
#[derive(Debug, Default)]
pub struct ReplyPrinter {
    conversation_id: Option<ConversationId>,
    printed: HashMap<MessageId, usize>,
    composing: bool,
}

impl ReplyPrinter {
    pub fn handle(&mut self, event: &UiEvent, snapshot: &ConversationSnapshot) -> Vec<String> {
        match event {
            UiEvent::MessagesChanged => self.render(snapshot),
            UiEvent::Composing { active, .. } => {
                let started = *active && !self.composing;
                self.composing = *active;
                if started {
                    vec!["ai is typing...".to_string()]
                } else {
                    Vec::new()
                }
            }
            UiEvent::RevealFinished { .. } => {
                self.composing = false;
                Vec::new()
            }
            UiEvent::SpeechSynthesized { audio_url } => vec![format!("speech ready: {audio_url}")],
            UiEvent::Notice(notice) => vec![format!("! {:?}: {}", notice.kind, notice.message)],
            UiEvent::ScrollToLatest => Vec::new(),
        }
    }

    fn render(&mut self, snapshot: &ConversationSnapshot) -> Vec<String> {
        if self.conversation_id.as_ref() != Some(&snapshot.conversation_id) {
            self.conversation_id = Some(snapshot.conversation_id.clone());
            self.printed.clear();
        }

        let mut lines = Vec::new();
        for message in snapshot.messages.iter().filter(|message| message.origin == Origin::Ai) {
            let units: Vec<&str> = if message.is_revealing || !message.revealed.is_empty() {
                message.revealed.iter().map(String::as_str).collect()
            } else {
                vec![message.content.as_str()]
            };

            let printed = self.printed.entry(message.id.clone()).or_default();
            for unit in units.iter().skip(*printed) {
                lines.push(format!("ai: {unit}"));
            }
            *printed = (*printed).max(units.len());
        }
        lines
    }
}

pub fn describe(message: &Message) -> String {
    let speaker = match message.origin {
        Origin::User => "you",
        Origin::Ai => "ai",
    };
    let status = match message.delivery {
        Some(DeliveryStatus::Pending) => " [pending]",
        Some(DeliveryStatus::Sent) => " [sent]",
        Some(DeliveryStatus::Delivered) => " [delivered]",
        None => "",
    };

    let mut line = format!("{speaker}{status}: {}", message.content);
    if let Some(image) = &message.image {
        match image.source.remote_url() {
            Some(url) => line.push_str(&format!(" <image {url}>")),
            None => line.push_str(" <image uploading>"),
        }
    }
    if let Some(audio) = &message.audio {
        match audio.source.remote_url() {
            Some(url) => line.push_str(&format!(" <voice {url}>")),
            None => line.push_str(" <voice transcribing>"),
        }
    }
    if message.tts == TtsState::Attached {
        line.push_str(" <speech>");
    }
    line
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ConsoleError {
    #[snafu(display("failed to read terminal input on `{stage}`: {source}"))]
    ReadInput {
        stage: &'static str,
        source: std::io::Error,
    },
    #[snafu(display("conversation engine rejected a command on `{stage}`: {source}"))]
    Engine {
        stage: &'static str,
        source: EngineError,
    },
}

pub type ConsoleResult<T> = Result<T, ConsoleError>;

pub async fn run(
    handle: ConversationHandle,
    mut events: mpsc::UnboundedReceiver<UiEvent>,
    settings: SettingsStore,
) -> ConsoleResult<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut printer = ReplyPrinter::default();
    println!("{HELP}");

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context(ReadInputSnafu { stage: "read-stdin" })? else {
                    break;
                };
                match Command::parse(&line) {
                    Some(Command::Quit) => break,
                    Some(command) => execute(&handle, &settings, command)?,
                    None => {
                        if line.trim().starts_with('/') {
                            println!("unknown command, try /help");
                        }
                    }
                }
            }
            event = events.recv() => {
                let Some(event) = event else {
                    tracing::info!("conversation engine stopped");
                    break;
                };
                for line in printer.handle(&event, &handle.snapshot()) {
                    println!("{line}");
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    if handle.is_running() {
        handle.dispose().context(EngineSnafu { stage: "dispose" })?;
    }
    Ok(())
}

fn execute(
    handle: &ConversationHandle,
    settings: &SettingsStore,
    command: Command,
) -> ConsoleResult<()> {
    match command {
        Command::Send(text) => {
            handle
                .send_text(&text)
                .context(EngineSnafu { stage: "send-text" })?;
        }
        Command::Image { path, caption } => {
            handle
                .upload_image(path, &caption)
                .context(EngineSnafu { stage: "upload-image" })?;
        }
        Command::Voice(path) => {
            handle
                .transcribe_voice(path)
                .context(EngineSnafu { stage: "transcribe-voice" })?;
        }
        Command::Say(text) => {
            handle.speak(&text).context(EngineSnafu { stage: "speak" })?;
        }
        Command::Switch(raw) => {
            let conversation_id = match ConversationId::parse(&raw) {
                Ok(conversation_id) => conversation_id,
                Err(error) => {
                    println!("{error}");
                    return Ok(());
                }
            };
            handle
                .switch_conversation(conversation_id.clone())
                .context(EngineSnafu {
                    stage: "switch-conversation",
                })?;
            remember_conversation(settings, &conversation_id);
        }
        Command::History => {
            let snapshot = handle.snapshot();
            println!("-- {} --", snapshot.conversation_id);
            for message in &snapshot.messages {
                println!("{}", describe(message));
            }
        }
        Command::Help => println!("{HELP}"),
        Command::Quit => {}
    }
    Ok(())
}

/// Reopens the last conversation on the next launch.
fn remember_conversation(settings: &SettingsStore, conversation_id: &ConversationId) {
    let mut next = (*settings.settings()).clone();
    next.conversation_id = conversation_id.to_string();
    if let Err(error) = settings.update(next) {
        tracing::warn!(error = %error, "failed to remember conversation");
    }
}
