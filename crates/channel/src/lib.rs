pub mod error;
pub mod http;
pub mod websocket;

pub use error::{TransportError, TransportResult};
pub use http::HttpMediaService;
pub use websocket::WebSocketConnector;
