use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inbound,
    Outbound,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoggedEvent {
    pub direction: Direction,
    pub event: Value,
}

impl LoggedEvent {
    #[must_use]
    pub fn kind(&self) -> Option<&str> {
        self.event.get("type").and_then(Value::as_str)
    }

    #[must_use]
    pub fn event_id(&self) -> Option<&str> {
        self.event.get("event_id").and_then(Value::as_str)
    }
}

/// Append-only record of everything exchanged during one session, newest first.
#[derive(Debug, Default)]
pub struct EventLog {
    entries: VecDeque<LoggedEvent>,
}

impl EventLog {
    pub fn record(&mut self, direction: Direction, event: Value) {
        self.entries.push_front(LoggedEvent { direction, event });
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<LoggedEvent> {
        self.entries.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn newest_entry_comes_first() {
        let mut log = EventLog::default();
        log.record(Direction::Outbound, json!({ "type": "response.create", "event_id": "a" }));
        log.record(Direction::Inbound, json!({ "type": "response.created", "event_id": "b" }));
        let entries = log.snapshot();
        assert_eq!(entries[0].event_id(), Some("b"));
        assert_eq!(entries[0].direction, Direction::Inbound);
        assert_eq!(entries[1].kind(), Some("response.create"));
        log.clear();
        assert!(log.is_empty());
    }
}
