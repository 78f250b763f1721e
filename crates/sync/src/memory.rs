//! In-process channel connector for embedding and tests.

use std::sync::Mutex;

use tokio::sync::mpsc;

use crate::channel::{ChannelConnector, ChannelHandle, make_channel};
use crate::error::ChannelResult;
use crate::ids::ConversationId;
use crate::protocol::{Inbound, Outbound};

/// Server side of one in-memory connection.
pub struct MemoryPeer {
    conversation_id: ConversationId,
    outbound: mpsc::UnboundedReceiver<Outbound>,
    inbound: mpsc::UnboundedSender<Inbound>,
}

impl MemoryPeer {
    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    /// Pushes a server event to the client; false once the client has gone away.
    pub fn deliver(&self, event: Inbound) -> bool {
        self.inbound.send(event).is_ok()
    }

    /// Everything the client has sent so far.
    pub fn drain(&mut self) -> Vec<Outbound> {
        let mut events = Vec::new();
        while let Ok(event) = self.outbound.try_recv() {
            events.push(event);
        }
        events
    }

    pub async fn recv(&mut self) -> Option<Outbound> {
        self.outbound.recv().await
    }

    /// True once the client dropped its side of the channel.
    pub fn is_closed(&self) -> bool {
        self.inbound.is_closed()
    }
}

/// Connector whose connections terminate in [`MemoryPeer`]s handed to the owner.
pub struct MemoryConnector {
    peers: mpsc::UnboundedSender<MemoryPeer>,
    refusal: Mutex<Option<String>>,
}

impl MemoryConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MemoryPeer>) {
        let (peers_tx, peers_rx) = mpsc::unbounded_channel();
        (
            Self {
                peers: peers_tx,
                refusal: Mutex::new(None),
            },
            peers_rx,
        )
    }

    /// Makes subsequent connections fail with `reason`; `None` accepts again.
    pub fn refuse_connections(&self, reason: Option<&str>) {
        if let Ok(mut refusal) = self.refusal.lock() {
            *refusal = reason.map(str::to_string);
        }
    }

    fn refusal(&self) -> Option<String> {
        self.refusal.lock().ok().and_then(|refusal| refusal.clone())
    }
}

impl ChannelConnector for MemoryConnector {
    fn open(&self, conversation_id: &ConversationId) -> ChannelResult<ChannelHandle> {
        let refusal = self.refusal();
        let peers = self.peers.clone();
        let conversation_id = conversation_id.clone();

        Ok(make_channel(move |endpoint| {
            Box::pin(async move {
                if let Some(reason) = refusal {
                    let _ = endpoint.inbound.send(Inbound::ConnectError { reason });
                    return;
                }

                let _ = endpoint.inbound.send(Inbound::Connected);
                let _ = peers.send(MemoryPeer {
                    conversation_id,
                    outbound: endpoint.outbound,
                    inbound: endpoint.inbound,
                });
            })
        }))
    }
}
