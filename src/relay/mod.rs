//! Event relay and tool dispatcher.
//!
//! A single actor owns the live channel, the event log and the displayed place
//! list. Callers talk to it through a cloneable [`RelayHandle`] and observe it
//! through a `watch` channel of [`RelayView`] snapshots. Negotiation and places
//! lookups run as background tasks whose results are applied only if the
//! session that started them is still the current one.

mod log;
mod reaction;
mod session;
mod token;
mod tools;

pub use log::{Direction, EventLog, LoggedEvent};
pub use reaction::{Reaction, react};
pub use session::{Phase, Relay, RelayConfig, RelayHandle, RelayView, SendOutcome};
pub use token::{HttpTokenSource, TokenSource};
pub use tools::{
    SEARCH_PLACES, SearchPlacesArgs, ToolCallRequest, ToolDefinition, search_places_definition,
    tool_registration,
};
