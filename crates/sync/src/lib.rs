pub mod aggregator;
pub mod channel;
pub mod config;
pub mod delivery;
pub mod engine;
pub mod error;
pub mod events;
pub mod handle;
pub mod ids;
pub mod media;
pub mod memory;
pub mod message;
pub mod protocol;
pub mod reveal;
pub mod service;
pub mod store;
mod text;
pub mod timer;
pub mod tts;

pub use aggregator::{PendingTurn, TurnAggregator};
pub use channel::{ChannelConnector, ChannelEndpoint, ChannelHandle, ChannelWorker, make_channel};
pub use config::EngineConfig;
pub use delivery::DeliveryTracker;
pub use engine::{ConversationEngine, ConversationSnapshot};
pub use error::{
    ChannelError, ChannelResult, EngineError, EngineResult, IdError, IdResult, ProtocolError,
    ProtocolResult, ServiceError, ServiceResult,
};
pub use events::{Notice, NoticeKind, UiEvent};
pub use handle::ConversationHandle;
pub use ids::{ConversationId, MessageId, UserId};
pub use memory::{MemoryConnector, MemoryPeer};
pub use message::{
    AudioAttachment, DeliveryRejection, DeliveryStatus, ImageAttachment, MediaRef, Message,
    Origin, TtsState, TurnKind,
};
pub use protocol::{HistoryEntry, Inbound, Outbound, WireRole};
pub use reveal::{RevealScheduler, RevealStep};
pub use service::{BoxFuture, MediaService, SpeechRequest, Transcript, TranscriptionRequest};
pub use store::{HistoryMerge, HistoryMessage, MessageStore};
pub use tts::TtsCoordinator;
