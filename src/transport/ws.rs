use crate::protocol::client_events::ClientEvent;
use crate::protocol::models::DEFAULT_MODEL;
use crate::{Error, Result};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use super::channel::{BoxFuture, Channel, ChannelSignal, Connector};
use super::rest::bearer;

pub const DEFAULT_WS_URL: &str = "wss://api.openai.com/v1/realtime";
const TRACE_LOG_MAX_BYTES: usize = 1024;

/// Opens realtime channels over a WebSocket.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
    model: String,
}

impl Default for WsConnector {
    fn default() -> Self {
        Self { url: DEFAULT_WS_URL.to_string(), model: DEFAULT_MODEL.to_string() }
    }
}

impl WsConnector {
    #[must_use]
    pub fn new(url: impl Into<String>, model: impl Into<String>) -> Self {
        Self { url: url.into(), model: model.into() }
    }

    /// Establish a WebSocket connection authenticated with `credential`.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the handshake fails.
    pub async fn open(&self, credential: &str) -> Result<WsChannel> {
        let mut url = Url::parse(&self.url)?;
        url.query_pairs_mut().append_pair("model", &self.model);

        let mut req = url.as_str().into_client_request()?;
        let headers = req.headers_mut();
        headers.insert(reqwest::header::AUTHORIZATION, bearer(credential)?);
        headers.insert("OpenAI-Beta", reqwest::header::HeaderValue::from_static("realtime=v1"));
        let (stream, _) = connect_async(req).await?;

        tracing::info!(model = %self.model, "connected to realtime channel");
        Ok(WsChannel { stream, announced: false })
    }
}

impl Connector for WsConnector {
    fn connect(&self, credential: String) -> BoxFuture<'_, Result<Box<dyn Channel>>> {
        Box::pin(async move {
            let channel = self.open(&credential).await?;
            Ok(Box::new(channel) as Box<dyn Channel>)
        })
    }
}

#[derive(Debug)]
pub struct WsChannel {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    announced: bool,
}

impl WsChannel {
    async fn send_event(&mut self, event: ClientEvent) -> Result<()> {
        let json = serde_json::to_string(&event)?;
        tracing::trace!("Sending event: {}", crate::safe_truncate(&json, TRACE_LOG_MAX_BYTES));
        self.stream.send(Message::Text(json.into())).await?;
        Ok(())
    }

    async fn next_message(&mut self) -> Result<ChannelSignal> {
        if !self.announced {
            self.announced = true;
            return Ok(ChannelSignal::Open);
        }

        while let Some(msg) = self.stream.next().await {
            match msg? {
                Message::Text(text) => {
                    tracing::trace!("Received event: {}", crate::safe_truncate(&text, TRACE_LOG_MAX_BYTES));
                    match serde_json::from_str(&text) {
                        Ok(value) => return Ok(ChannelSignal::Message(value)),
                        Err(err) => tracing::warn!("skipping non-JSON realtime frame: {err}"),
                    }
                }
                Message::Close(_) => {
                    tracing::info!("realtime channel closed by server");
                    return Ok(ChannelSignal::Closed);
                }
                Message::Ping(payload) => {
                    tracing::debug!("Received Ping, sending Pong");
                    self.stream.send(Message::Pong(payload)).await?;
                }
                _ => (),
            }
        }
        Ok(ChannelSignal::Closed)
    }
}

impl Channel for WsChannel {
    fn send(&mut self, event: ClientEvent) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.send_event(event))
    }

    fn next_signal(&mut self) -> BoxFuture<'_, Result<ChannelSignal>> {
        Box::pin(self.next_message())
    }

    fn close(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            match self.stream.close(None).await {
                Ok(()) | Err(tokio_tungstenite::tungstenite::Error::ConnectionClosed) => Ok(()),
                Err(err) => Err(Error::from(err)),
            }
        })
    }
}
