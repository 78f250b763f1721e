use kindred_sync::ProtocolError;
use snafu::Snafu;
use tokio_tungstenite::tungstenite;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TransportError {
    #[snafu(display("failed to connect to '{endpoint}' on `{stage}`: {source}"))]
    Connect {
        stage: &'static str,
        endpoint: String,
        #[snafu(source(from(tungstenite::Error, Box::new)))]
        source: Box<tungstenite::Error>,
    },
    #[snafu(display("failed to write frame on `{stage}`: {source}"))]
    Send {
        stage: &'static str,
        #[snafu(source(from(tungstenite::Error, Box::new)))]
        source: Box<tungstenite::Error>,
    },
    #[snafu(display("failed to read frame on `{stage}`: {source}"))]
    Receive {
        stage: &'static str,
        #[snafu(source(from(tungstenite::Error, Box::new)))]
        source: Box<tungstenite::Error>,
    },
    #[snafu(display("failed to encode frame on `{stage}`: {source}"))]
    Frame {
        stage: &'static str,
        source: ProtocolError,
    },
    #[snafu(display("server closed the connection on `{stage}`: {reason}"))]
    Closed {
        stage: &'static str,
        reason: String,
    },
}

pub type TransportResult<T> = Result<T, TransportError>;
