use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;

use crate::error::ChannelResult;
use crate::ids::ConversationId;
use crate::protocol::{Inbound, Outbound};

pub type ChannelWorker = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Client side of one conversation channel.
///
/// The owner spawns `worker`, which performs the connection and pumps frames between the
/// socket and the two queues. Outbound events queued before the socket is up are sent once
/// it connects.
pub struct ChannelHandle {
    pub outbound: mpsc::UnboundedSender<Outbound>,
    pub inbound: mpsc::UnboundedReceiver<Inbound>,
    pub worker: ChannelWorker,
}

/// Transport end of a channel, held by the worker.
pub struct ChannelEndpoint {
    pub outbound: mpsc::UnboundedReceiver<Outbound>,
    pub inbound: mpsc::UnboundedSender<Inbound>,
}

/// Opens the persistent per-conversation connection.
///
/// Implementations report `Inbound::Connected` after each successful connect and
/// `Inbound::ConnectError` on failure or remote close. They never reconnect on their own.
pub trait ChannelConnector: Send + Sync {
    fn open(&self, conversation_id: &ConversationId) -> ChannelResult<ChannelHandle>;
}

/// Builds the queue pair shared by a handle and its transport endpoint.
pub fn make_channel(
    worker: impl FnOnce(ChannelEndpoint) -> ChannelWorker,
) -> ChannelHandle {
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let worker = worker(ChannelEndpoint {
        outbound: outbound_rx,
        inbound: inbound_tx,
    });

    ChannelHandle {
        outbound: outbound_tx,
        inbound: inbound_rx,
        worker,
    }
}
