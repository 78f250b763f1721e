use std::path::PathBuf;

use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum IdError {
    #[snafu(display("{id_type} must not be blank"))]
    BlankId {
        stage: &'static str,
        id_type: &'static str,
    },
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum EngineError {
    #[snafu(display("conversation engine for '{conversation_id}' has stopped on `{stage}`"))]
    EngineStopped {
        stage: &'static str,
        conversation_id: String,
    },
    #[snafu(display("conversation engine dropped the acknowledgement on `{stage}`"))]
    AcknowledgementDropped {
        stage: &'static str,
        source: tokio::sync::oneshot::error::RecvError,
    },
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ChannelError {
    #[snafu(display("channel endpoint '{endpoint}' is invalid: {details}"))]
    InvalidEndpoint {
        stage: &'static str,
        endpoint: String,
        details: String,
    },
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ServiceError {
    #[snafu(display("{service} request failed on `{stage}`: {message}"))]
    Request {
        stage: &'static str,
        service: &'static str,
        message: String,
    },
    #[snafu(display("{service} returned status {status} on `{stage}`: {body}"))]
    Status {
        stage: &'static str,
        service: &'static str,
        status: u16,
        body: String,
    },
    #[snafu(display("{service} response is unusable on `{stage}`: {details}"))]
    Payload {
        stage: &'static str,
        service: &'static str,
        details: String,
    },
    #[snafu(display("failed to read media file {path:?} on `{stage}`: {source}"))]
    ReadMedia {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ProtocolError {
    #[snafu(display("failed to encode outbound event on `{stage}`: {source}"))]
    EncodeEvent {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to decode inbound frame on `{stage}`: {source}"))]
    DecodeEvent {
        stage: &'static str,
        source: serde_json::Error,
    },
}

pub type IdResult<T> = Result<T, IdError>;
pub type EngineResult<T> = Result<T, EngineError>;
pub type ChannelResult<T> = Result<T, ChannelError>;
pub type ServiceResult<T> = Result<T, ServiceError>;
pub type ProtocolResult<T> = Result<T, ProtocolError>;
