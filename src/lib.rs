#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::multiple_crate_versions)]

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod geo;
pub mod places;
pub mod protocol;
pub mod relay;
pub mod server;
pub mod transport;

pub use bootstrap::{BootstrapOutcome, Bootstrapper, LocationContext, PromptContext, TokenResponse};
pub use config::{AppConfig, PlacesConfig, RealtimeConfig};
pub use error::{Error, ErrorBody, Result};
pub use geo::{Coordinates, Geocoder, IpGeolocator, StreetAddress, client_ip};
pub use places::{BackendPlaces, MAX_DISPLAYED_PLACES, Place, PlacesClient, PlacesLookup, PlacesResponse, Rating, RetryPolicy};
pub use protocol::client_events::ClientEvent;
pub use protocol::server_events::ServerEvent;
pub use protocol::models::{
    ContentPart, Item, ItemStatus, Response, ResponseConfig, ResponseStatus, Role, Session,
    SessionRequest, SessionUpdate, Temperature, Tool, ToolChoice,
};
pub use relay::{
    Direction, HttpTokenSource, LoggedEvent, Phase, Relay, RelayConfig, RelayHandle, RelayView,
    SendOutcome, TokenSource, ToolCallRequest,
};
pub use server::{AppState, router};
pub use transport::{Channel, ChannelSignal, Connector, RealtimeRestAdapter, WsConnector};

const TRACE_TRUNCATE_SUFFIX: &str = "... (truncated)";

pub(crate) fn safe_truncate(s: &str, max_bytes: usize) -> std::borrow::Cow<'_, str> {
    if s.len() <= max_bytes {
        return std::borrow::Cow::Borrowed(s);
    }

    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    std::borrow::Cow::Owned(format!(
        "{} {} {} bytes",
        &s[..end],
        TRACE_TRUNCATE_SUFFIX,
        s.len() - end
    ))
}
