//! WebSocket transport for the conversation channel.

use futures::{SinkExt, StreamExt};
use kindred_sync::error::InvalidEndpointSnafu;
use kindred_sync::protocol::{decode, encode};
use kindred_sync::{
    ChannelConnector, ChannelEndpoint, ChannelHandle, ChannelResult, ConversationId, Inbound,
    Outbound, UserId, make_channel,
};
use snafu::{ResultExt, ensure};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use crate::error::{
    ClosedSnafu, ConnectSnafu, FrameSnafu, ReceiveSnafu, SendSnafu, TransportResult,
};

/// Opens one socket per conversation at `<endpoint>?conversationId=..&userId=..`.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    endpoint: Url,
    user_id: UserId,
}

impl WebSocketConnector {
    pub fn new(endpoint: Url, user_id: UserId) -> Self {
        Self { endpoint, user_id }
    }

    pub fn conversation_url(&self, conversation_id: &ConversationId) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("conversationId", conversation_id.as_str())
            .append_pair("userId", self.user_id.as_str());
        url
    }
}

impl ChannelConnector for WebSocketConnector {
    fn open(&self, conversation_id: &ConversationId) -> ChannelResult<ChannelHandle> {
        ensure!(
            matches!(self.endpoint.scheme(), "ws" | "wss"),
            InvalidEndpointSnafu {
                stage: "open-websocket",
                endpoint: self.endpoint.to_string(),
                details: "scheme must be ws or wss",
            }
        );

        let url = self.conversation_url(conversation_id);
        let conversation_id = conversation_id.clone();
        Ok(make_channel(move |endpoint| {
            Box::pin(run_socket(url, conversation_id, endpoint))
        }))
    }
}

async fn run_socket(url: Url, conversation_id: ConversationId, endpoint: ChannelEndpoint) {
    let ChannelEndpoint {
        mut outbound,
        inbound,
    } = endpoint;

    match pump_frames(&url, &mut outbound, &inbound).await {
        Ok(()) => {
            tracing::debug!(conversation_id = %conversation_id, "conversation socket closed locally");
        }
        Err(error) => {
            tracing::warn!(
                conversation_id = %conversation_id,
                error = %error,
                "conversation socket ended"
            );
            let _ = inbound.send(Inbound::ConnectError {
                reason: error.to_string(),
            });
        }
    }
}

/// Runs until the engine drops its side (`Ok`) or the socket fails (`Err`).
async fn pump_frames(
    url: &Url,
    outbound: &mut mpsc::UnboundedReceiver<Outbound>,
    inbound: &mpsc::UnboundedSender<Inbound>,
) -> TransportResult<()> {
    let (socket, _response) = connect_async(url.as_str()).await.context(ConnectSnafu {
        stage: "connect",
        endpoint: url.to_string(),
    })?;
    let (mut sink, mut stream) = socket.split();
    tracing::info!(endpoint = %url, "conversation socket connected");

    if inbound.send(Inbound::Connected).is_err() {
        return Ok(());
    }

    loop {
        tokio::select! {
            event = outbound.recv() => {
                let Some(event) = event else {
                    let _ = sink.close().await;
                    return Ok(());
                };
                let frame = match encode_frame(&event) {
                    Ok(frame) => frame,
                    Err(error) => {
                        tracing::warn!(event = event.name(), error = %error, "dropping outbound event");
                        continue;
                    }
                };
                sink.send(frame).await.context(SendSnafu {
                    stage: "send-outbound",
                })?;
            }
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => match decode(text.as_str()) {
                    Ok(event) => {
                        if inbound.send(event).is_err() {
                            return Ok(());
                        }
                    }
                    Err(error) => {
                        tracing::warn!(error = %error, "dropping undecodable frame");
                    }
                },
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|frame| frame.reason.as_str().to_string())
                        .filter(|reason| !reason.is_empty())
                        .unwrap_or_else(|| "closed by server".to_string());
                    return ClosedSnafu {
                        stage: "read-inbound",
                        reason,
                    }
                    .fail();
                }
                Some(Ok(_)) => {}
                Some(Err(source)) => {
                    return Err(source).context(ReceiveSnafu {
                        stage: "read-inbound",
                    });
                }
                None => {
                    return ClosedSnafu {
                        stage: "read-inbound",
                        reason: "stream ended",
                    }
                    .fail();
                }
            }
        }
    }
}

fn encode_frame(event: &Outbound) -> TransportResult<Message> {
    let frame = encode(event).context(FrameSnafu {
        stage: "encode-outbound",
    })?;
    Ok(Message::Text(frame.into()))
}
