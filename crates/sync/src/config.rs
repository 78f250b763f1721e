use std::time::Duration;

use crate::aggregator::DEFAULT_QUIET_WINDOW;
use crate::delivery::DEFAULT_PROMOTION_DELAY;
use crate::ids::UserId;
use crate::reveal::{DEFAULT_REVEAL_BASE, DEFAULT_REVEAL_STEP};

pub const DEFAULT_LANGUAGE: &str = "en";
pub const DEFAULT_VOICE: &str = "alloy";

/// Tunables for one conversation engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub user_id: UserId,
    pub language: String,
    pub voice: String,
    pub delivery_promotion: Duration,
    pub quiet_window: Duration,
    pub reveal_base: Duration,
    pub reveal_step: Duration,
    /// `None` keeps audio replies waiting for speech indefinitely.
    pub tts_timeout: Option<Duration>,
}

impl EngineConfig {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            language: DEFAULT_LANGUAGE.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            delivery_promotion: DEFAULT_PROMOTION_DELAY,
            quiet_window: DEFAULT_QUIET_WINDOW,
            reveal_base: DEFAULT_REVEAL_BASE,
            reveal_step: DEFAULT_REVEAL_STEP,
            tts_timeout: None,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = voice.into();
        self
    }

    pub fn with_tts_timeout(mut self, timeout: Duration) -> Self {
        self.tts_timeout = Some(timeout);
        self
    }
}
