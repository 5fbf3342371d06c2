use crate::protocol::client_events::ClientEvent;
use crate::Result;
use std::future::Future;
use std::pin::Pin;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What a live channel reports to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelSignal {
    /// The data channel is ready; emitted once, before any message.
    Open,
    /// One inbound realtime event, verbatim.
    Message(serde_json::Value),
    /// The remote side went away. Nothing follows.
    Closed,
}

/// A bidirectional realtime event channel.
pub trait Channel: Send {
    fn send(&mut self, event: ClientEvent) -> BoxFuture<'_, Result<()>>;
    fn next_signal(&mut self) -> BoxFuture<'_, Result<ChannelSignal>>;
    fn close(&mut self) -> BoxFuture<'_, Result<()>>;
}

/// Opens a [`Channel`] with an ephemeral credential.
pub trait Connector: Send + Sync {
    fn connect(&self, credential: String) -> BoxFuture<'_, Result<Box<dyn Channel>>>;
}
