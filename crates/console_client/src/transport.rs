//! Transport abstractions for the console socket.
//!
//! A connection is split into a [`FrameSink`] and a [`FrameStream`] so the
//! receive loop can run in its own task while commands are written from the
//! session owner. [`WsConnector`] is the websocket implementation; tests plug
//! in an in-memory connector behind the same traits.

use crate::error::TransportError;
use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::ORIGIN, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};

/// Outgoing half of a console connection.
#[async_trait]
pub trait FrameSink: Send {
    /// Send one text frame.
    async fn send(&mut self, text: String) -> Result<(), TransportError>;

    /// Close the connection gracefully.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Incoming half of a console connection.
#[async_trait]
pub trait FrameStream: Send {
    /// Next inbound text frame.
    ///
    /// Returns `None` once the peer has closed the connection cleanly.
    async fn next_frame(&mut self) -> Option<Result<String, TransportError>>;
}

/// Both halves of a freshly opened connection.
pub struct TransportPair {
    pub sink: Box<dyn FrameSink>,
    pub stream: Box<dyn FrameStream>,
}

/// Opens console connections.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, endpoint_url: &str) -> Result<TransportPair, TransportError>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Websocket connector backed by `tokio-tungstenite`.
#[derive(Debug, Clone, Default)]
pub struct WsConnector {
    origin: Option<String>,
}

impl WsConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send this `Origin` header during the handshake. Daemons reject
    /// upgrades whose origin does not match the panel they trust.
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, endpoint_url: &str) -> Result<TransportPair, TransportError> {
        let mut request = endpoint_url
            .into_client_request()
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        if let Some(origin) = &self.origin {
            let value = HeaderValue::from_str(origin)
                .map_err(|e| TransportError::Connect(format!("invalid origin {origin}: {e}")))?;
            request.headers_mut().insert(ORIGIN, value);
        }

        let (ws_stream, response) = connect_async(request)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        debug!(status = %response.status(), "Console websocket handshake complete");

        let (sink, stream) = ws_stream.split();
        Ok(TransportPair {
            sink: Box::new(WsSink(sink)),
            stream: Box::new(WsReceiver(stream)),
        })
    }
}

struct WsSink(SplitSink<WsStream, Message>);

#[async_trait]
impl FrameSink for WsSink {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.0
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.0
            .close()
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }
}

struct WsReceiver(SplitStream<WsStream>);

#[async_trait]
impl FrameStream for WsReceiver {
    async fn next_frame(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            match self.0.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.as_str().to_owned())),
                Ok(Message::Binary(data)) => {
                    return Some(Ok(String::from_utf8_lossy(&data).into_owned()));
                }
                Ok(Message::Close(frame)) => {
                    let reason = frame
                        .map(|f| f.reason.as_str().to_owned())
                        .filter(|r| !r.is_empty());
                    return Some(Err(TransportError::Closed(reason)));
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {
                    trace!("Skipping websocket control frame");
                }
                Err(e) => return Some(Err(TransportError::Receive(e.to_string()))),
            }
        }
    }
}
