// file: src/transport/websocket.rs
// description: real websocket adapter that carries JSON text frames to and from the feed server

use super::{Connection, Transport, TransportEvent};
use crate::error::ChannelError;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{Error as WsError, Message},
};
use tracing::{debug, info, trace, warn};
use url::Url;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct WebSocketTransport {
    url: Url,
    connect_timeout: Duration,
}

impl WebSocketTransport {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    fn endpoint(&self) -> String {
        self.url.to_string()
    }

    async fn open(&self) -> Result<Box<dyn Connection>, ChannelError> {
        debug!("Opening websocket to {}", self.url);
        let (stream, response) = timeout(self.connect_timeout, connect_async(self.url.as_str()))
            .await
            .map_err(|_| {
                ChannelError::ConnectionFailed(format!(
                    "timed out after {}s",
                    self.connect_timeout.as_secs()
                ))
            })??;

        info!(
            "WebSocket connection established to {} (status {})",
            self.url,
            response.status()
        );
        Ok(Box::new(WebSocketConnection {
            stream,
            errored: false,
        }))
    }
}

pub struct WebSocketConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    errored: bool,
}

#[async_trait]
impl Connection for WebSocketConnection {
    async fn next_event(&mut self) -> Option<TransportEvent> {
        // A read error is reported once; the connection counts as closed afterwards
        if self.errored {
            return None;
        }

        while let Some(message) = self.stream.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    trace!("Received text frame: {}", text);
                    return Some(TransportEvent::Text(text.to_string()));
                }
                Ok(Message::Binary(data)) => {
                    debug!("Ignoring binary frame of {} bytes", data.len());
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {
                    // tungstenite answers pings itself
                }
                Ok(Message::Close(frame)) => {
                    info!("Received close frame: {:?}", frame);
                    return None;
                }
                Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => return None,
                Err(e) => {
                    warn!("WebSocket stream error: {}", e);
                    self.errored = true;
                    return Some(TransportEvent::Error(
                        ChannelError::Transport(e.to_string()).to_string(),
                    ));
                }
            }
        }

        debug!("WebSocket stream ended");
        None
    }

    async fn send(&mut self, text: String) -> Result<(), ChannelError> {
        self.stream.send(Message::Text(text.into())).await?;
        Ok(())
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!("Error while closing websocket: {}", e);
        }
    }
}
