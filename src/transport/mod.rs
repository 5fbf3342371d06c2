//! Connections to the realtime service: the REST endpoints and the live event channel.

mod channel;
pub mod rest;
pub mod ws;

pub use channel::{BoxFuture, Channel, ChannelSignal, Connector};
pub use rest::{ClientSecret, EphemeralSession, RealtimeRestAdapter};
pub use ws::{WsChannel, WsConnector};
