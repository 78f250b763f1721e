use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::ids::MessageId;
use crate::message::DeliveryStatus;
use crate::store::MessageStore;

pub const DEFAULT_PROMOTION_DELAY: Duration = Duration::from_millis(750);

/// Per-message timed promotion `pending -> sent`, with forced `delivered` on acknowledgement.
///
/// At most one timer exists per message id; a timer leaves the map as soon as it fires
/// or is cancelled.
#[derive(Debug)]
pub struct DeliveryTracker {
    promotion_delay: Duration,
    timers: HashMap<MessageId, Instant>,
}

impl DeliveryTracker {
    pub fn new(promotion_delay: Duration) -> Self {
        Self {
            promotion_delay,
            timers: HashMap::new(),
        }
    }

    /// Starts tracking a freshly created user message at `pending`.
    pub fn register(&mut self, store: &mut MessageStore, message_id: &MessageId, now: Instant) {
        let Some(message) = store.get_mut(message_id) else {
            tracing::warn!(message_id = %message_id, "cannot track delivery for unknown message");
            return;
        };

        if message.delivery.is_none() {
            message.delivery = Some(DeliveryStatus::Pending);
        }
        if message.delivery != Some(DeliveryStatus::Pending) {
            return;
        }

        // Re-registering replaces the deadline instead of stacking a second timer.
        self.timers
            .insert(message_id.clone(), now + self.promotion_delay);
    }

    /// Forces `delivered` and releases the timer. Idempotent.
    pub fn confirm_delivered(&mut self, store: &mut MessageStore, message_id: &MessageId) -> bool {
        self.timers.remove(message_id);

        let Some(message) = store.get_mut(message_id) else {
            return false;
        };
        message.advance_delivery(DeliveryStatus::Delivered).is_ok()
    }

    /// Promotes every user message not yet delivered; called when the server acknowledges a turn.
    pub fn confirm_all_outstanding(&mut self, store: &mut MessageStore) -> usize {
        self.timers.clear();

        let mut confirmed = 0;
        for message in store.iter_mut() {
            if message
                .delivery
                .is_some_and(|status| !status.is_delivered())
                && message.advance_delivery(DeliveryStatus::Delivered).is_ok()
            {
                confirmed += 1;
            }
        }

        if confirmed > 0 {
            tracing::debug!(confirmed, "confirmed outstanding user messages");
        }
        confirmed
    }

    /// Drops the timer without touching the message (failure and reconciliation paths).
    pub fn cancel(&mut self, message_id: &MessageId) -> bool {
        self.timers.remove(message_id).is_some()
    }

    /// Promotes every due timer to `sent` and returns the promoted ids.
    pub fn expire(&mut self, store: &mut MessageStore, now: Instant) -> Vec<MessageId> {
        let due = self
            .timers
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(message_id, _)| message_id.clone())
            .collect::<Vec<_>>();

        let mut promoted = Vec::with_capacity(due.len());
        for message_id in due {
            self.timers.remove(&message_id);

            let Some(message) = store.get_mut(&message_id) else {
                continue;
            };
            // Superseded messages (already delivered) reject the transition and stay put.
            if message.delivery == Some(DeliveryStatus::Pending)
                && message.advance_delivery(DeliveryStatus::Sent).is_ok()
            {
                promoted.push(message_id);
            }
        }

        promoted
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.values().min().copied()
    }

    pub fn has_timer(&self, message_id: &MessageId) -> bool {
        self.timers.contains_key(message_id)
    }

    pub fn outstanding(&self) -> usize {
        self.timers.len()
    }

    pub fn clear(&mut self) {
        self.timers.clear();
    }
}

impl Default for DeliveryTracker {
    fn default() -> Self {
        Self::new(DEFAULT_PROMOTION_DELAY)
    }
}
