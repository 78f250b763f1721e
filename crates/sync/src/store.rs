use std::collections::HashSet;

use crate::ids::MessageId;
use crate::message::{Message, Origin, TtsState};

/// Outcome of replacing the list with server history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryMerge {
    /// Local optimistic messages kept because the server has not seen them yet.
    pub retained: Vec<MessageId>,
    /// Local optimistic messages dropped because history already carries their server copy.
    pub superseded: Vec<MessageId>,
}

/// A history entry plus the local id it echoes, when the server reports one.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryMessage {
    pub message: Message,
    pub client_id: Option<MessageId>,
}

/// Ordered message list; the single source of truth for the view.
#[derive(Debug, Default)]
pub struct MessageStore {
    messages: Vec<Message>,
    loading_history: bool,
}

impl MessageStore {
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn get(&self, message_id: &MessageId) -> Option<&Message> {
        self.messages.iter().find(|message| message.id == *message_id)
    }

    pub fn get_mut(&mut self, message_id: &MessageId) -> Option<&mut Message> {
        self.messages
            .iter_mut()
            .find(|message| message.id == *message_id)
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Message> {
        self.messages.iter_mut()
    }

    pub fn remove(&mut self, message_id: &MessageId) -> Option<Message> {
        let index = self
            .messages
            .iter()
            .position(|message| message.id == *message_id)?;
        Some(self.messages.remove(index))
    }

    pub fn loading_history(&self) -> bool {
        self.loading_history
    }

    pub fn set_loading_history(&mut self, loading: bool) {
        self.loading_history = loading;
    }

    /// Most recent AI message still waiting for synthesized speech.
    pub fn latest_awaiting_speech(&mut self) -> Option<&mut Message> {
        self.messages
            .iter_mut()
            .rev()
            .find(|message| message.origin == Origin::Ai && message.tts == TtsState::Pending)
    }

    /// Replaces the list wholesale with server history.
    ///
    /// Unconfirmed local user messages survive the replacement unless the history already
    /// holds their server copy, matched first by id/client id and then by content fingerprint.
    /// Each history entry can claim at most one local message. Delivered user messages and AI
    /// replies are never retained, so any the history does not list are dropped.
    pub fn replace_with_history(&mut self, history: Vec<HistoryMessage>) -> HistoryMerge {
        let mut known_ids = HashSet::with_capacity(history.len() * 2);
        for entry in &history {
            known_ids.insert(entry.message.id.clone());
            if let Some(client_id) = &entry.client_id {
                known_ids.insert(client_id.clone());
            }
        }

        let mut unclaimed = history
            .iter()
            .filter(|entry| entry.message.is_user() && entry.client_id.is_none())
            .map(|entry| entry.message.fingerprint())
            .collect::<Vec<_>>();

        let mut merge = HistoryMerge::default();
        let mut retained = Vec::new();
        for message in std::mem::take(&mut self.messages) {
            if !message.is_unconfirmed() {
                continue;
            }

            if known_ids.contains(&message.id) {
                merge.superseded.push(message.id);
                continue;
            }

            let fingerprint = message.fingerprint();
            if let Some(index) = unclaimed.iter().position(|entry| *entry == fingerprint) {
                unclaimed.swap_remove(index);
                merge.superseded.push(message.id);
                continue;
            }

            merge.retained.push(message.id.clone());
            retained.push(message);
        }

        self.messages = history.into_iter().map(|entry| entry.message).collect();
        self.messages.extend(retained);
        merge
    }
}
