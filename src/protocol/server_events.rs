use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use super::models::{Response, Session};
use crate::error::ServerError;

/// Inbound realtime event.
///
/// Only the shapes the relay reacts to are typed. Anything else, including
/// typed shapes that fail to parse, is kept verbatim in `Unknown`.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    Error {
        event_id: String,
        error: ServerError,
    },
    SessionCreated {
        event_id: String,
        session: Session,
    },
    SessionUpdated {
        event_id: String,
        session: Session,
    },
    ResponseCreated {
        event_id: String,
        response: Response,
    },
    ResponseDone {
        event_id: String,
        response: Response,
    },
    ResponseFunctionCallArgumentsDone {
        event_id: String,
        response_id: String,
        item_id: String,
        output_index: u32,
        call_id: String,
        name: Option<String>,
        arguments: String,
    },
    Unknown(Value),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type")]
enum ServerEventRepr {
    #[serde(rename = "error")]
    Error {
        event_id: String,
        error: ServerError,
    },
    #[serde(rename = "session.created")]
    SessionCreated {
        event_id: String,
        session: Session,
    },
    #[serde(rename = "session.updated")]
    SessionUpdated {
        event_id: String,
        session: Session,
    },
    #[serde(rename = "response.created")]
    ResponseCreated {
        event_id: String,
        response: Response,
    },
    #[serde(rename = "response.done")]
    ResponseDone {
        event_id: String,
        response: Response,
    },
    #[serde(rename = "response.function_call_arguments.done")]
    ResponseFunctionCallArgumentsDone {
        event_id: String,
        response_id: String,
        item_id: String,
        output_index: u32,
        call_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        arguments: String,
    },
}

impl From<ServerEventRepr> for ServerEvent {
    fn from(repr: ServerEventRepr) -> Self {
        match repr {
            ServerEventRepr::Error { event_id, error } => Self::Error { event_id, error },
            ServerEventRepr::SessionCreated { event_id, session } => Self::SessionCreated { event_id, session },
            ServerEventRepr::SessionUpdated { event_id, session } => Self::SessionUpdated { event_id, session },
            ServerEventRepr::ResponseCreated { event_id, response } => Self::ResponseCreated { event_id, response },
            ServerEventRepr::ResponseDone { event_id, response } => Self::ResponseDone { event_id, response },
            ServerEventRepr::ResponseFunctionCallArgumentsDone { event_id, response_id, item_id, output_index, call_id, name, arguments } => {
                Self::ResponseFunctionCallArgumentsDone { event_id, response_id, item_id, output_index, call_id, name, arguments }
            }
        }
    }
}

impl Serialize for ServerEvent {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let repr = match self {
            Self::Unknown(value) => return value.serialize(serializer),
            Self::Error { event_id, error } => ServerEventRepr::Error { event_id: event_id.clone(), error: error.clone() },
            Self::SessionCreated { event_id, session } => ServerEventRepr::SessionCreated { event_id: event_id.clone(), session: session.clone() },
            Self::SessionUpdated { event_id, session } => ServerEventRepr::SessionUpdated { event_id: event_id.clone(), session: session.clone() },
            Self::ResponseCreated { event_id, response } => ServerEventRepr::ResponseCreated { event_id: event_id.clone(), response: response.clone() },
            Self::ResponseDone { event_id, response } => ServerEventRepr::ResponseDone { event_id: event_id.clone(), response: response.clone() },
            Self::ResponseFunctionCallArgumentsDone { event_id, response_id, item_id, output_index, call_id, name, arguments } => {
                ServerEventRepr::ResponseFunctionCallArgumentsDone {
                    event_id: event_id.clone(),
                    response_id: response_id.clone(),
                    item_id: item_id.clone(),
                    output_index: *output_index,
                    call_id: call_id.clone(),
                    name: name.clone(),
                    arguments: arguments.clone(),
                }
            }
        };
        repr.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ServerEvent {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_value(value))
    }
}

impl ServerEvent {
    /// Classify a raw inbound payload. Never fails: unrecognised shapes become `Unknown`.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        match ServerEventRepr::deserialize(&value) {
            Ok(repr) => repr.into(),
            Err(err) => {
                if value.get("type").and_then(|t| t.as_str()).is_some_and(is_typed_kind) {
                    tracing::debug!("Failed to parse ServerEvent: {err}");
                }
                Self::Unknown(value)
            }
        }
    }

    /// Wire `type` of the event, when present.
    #[must_use]
    pub fn kind(&self) -> Option<&str> {
        match self {
            Self::Error { .. } => Some("error"),
            Self::SessionCreated { .. } => Some("session.created"),
            Self::SessionUpdated { .. } => Some("session.updated"),
            Self::ResponseCreated { .. } => Some("response.created"),
            Self::ResponseDone { .. } => Some("response.done"),
            Self::ResponseFunctionCallArgumentsDone { .. } => Some("response.function_call_arguments.done"),
            Self::Unknown(value) => value.get("type").and_then(|v| v.as_str()),
        }
    }

    #[must_use]
    pub fn event_id(&self) -> Option<&str> {
        match self {
            Self::Error { event_id, .. }
            | Self::SessionCreated { event_id, .. }
            | Self::SessionUpdated { event_id, .. }
            | Self::ResponseCreated { event_id, .. }
            | Self::ResponseDone { event_id, .. }
            | Self::ResponseFunctionCallArgumentsDone { event_id, .. } => Some(event_id.as_str()),
            Self::Unknown(value) => value.get("event_id").and_then(|v| v.as_str()),
        }
    }
}

fn is_typed_kind(kind: &str) -> bool {
    matches!(
        kind,
        "error"
            | "session.created"
            | "session.updated"
            | "response.created"
            | "response.done"
            | "response.function_call_arguments.done"
    )
}
