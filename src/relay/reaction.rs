use crate::protocol::server_events::ServerEvent;

use super::tools::{SEARCH_PLACES, ToolCallRequest};

/// What the relay does in response to one inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reaction {
    /// Register the `search_places` tool on the new session.
    RegisterTools,
    /// Run a places lookup for a finished `search_places` call.
    SearchPlaces(ToolCallRequest),
}

/// Decide the reaction to `event`, looking at nothing but that event.
///
/// Malformed `search_places` arguments produce no reaction.
#[must_use]
pub fn react(event: &ServerEvent) -> Option<Reaction> {
    match event {
        ServerEvent::SessionCreated { .. } => Some(Reaction::RegisterTools),
        ServerEvent::ResponseDone { response, .. } => {
            let (call_id, arguments) = response.function_call(SEARCH_PLACES)?;
            match ToolCallRequest::parse(call_id, arguments) {
                Ok(request) => Some(Reaction::SearchPlaces(request)),
                Err(err) => {
                    tracing::debug!(call_id, "ignoring search_places call: {err}");
                    None
                }
            }
        }
        ServerEvent::Error { error, .. } => {
            tracing::warn!(code = ?error.code, "realtime error event: {}", error.message);
            None
        }
        _ => None,
    }
}
