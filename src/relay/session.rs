use crate::places::{Place, PlacesLookup, top_places};
use crate::protocol::client_events::ClientEvent;
use crate::protocol::models::Item;
use crate::protocol::server_events::ServerEvent;
use crate::transport::{Channel, ChannelSignal, Connector};
use crate::{Error, Result};

use super::log::{Direction, EventLog, LoggedEvent};
use super::reaction::{Reaction, react};
use super::token::TokenSource;
use super::tools::{ToolCallRequest, tool_registration};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Negotiating,
    Active,
}

/// Snapshot published to observers after every state change.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayView {
    pub phase: Phase,
    /// Newest first.
    pub events: Vec<LoggedEvent>,
    pub places: Vec<Place>,
}

impl Default for RelayView {
    fn default() -> Self {
        Self { phase: Phase::Idle, events: Vec::new(), places: Vec::new() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Sent { event_id: String },
    /// No open channel, or the channel refused the event.
    Dropped,
}

impl SendOutcome {
    #[must_use]
    pub const fn is_sent(&self) -> bool {
        matches!(self, Self::Sent { .. })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RelayConfig {
    /// Answer each `search_places` call with a `function_call_output` and a fresh response.
    pub feed_tool_results: bool,
    pub mailbox: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self { feed_tool_results: true, mailbox: 64 }
    }
}

/// Builder for the relay actor.
pub struct Relay {
    tokens: Arc<dyn TokenSource>,
    connector: Arc<dyn Connector>,
    places: Arc<dyn PlacesLookup>,
    config: RelayConfig,
}

impl Relay {
    #[must_use]
    pub fn new(
        tokens: Arc<dyn TokenSource>,
        connector: Arc<dyn Connector>,
        places: Arc<dyn PlacesLookup>,
    ) -> Self {
        Self { tokens, connector, places, config: RelayConfig::default() }
    }

    #[must_use]
    pub const fn with_config(mut self, config: RelayConfig) -> Self {
        self.config = config;
        self
    }

    /// Start the actor on the current runtime. It runs until every handle is dropped.
    #[must_use]
    pub fn spawn(self) -> RelayHandle {
        let (cmd_tx, cmd_rx) = mpsc::channel::<Command>(self.config.mailbox.max(1));
        let (internal_tx, internal_rx) = mpsc::unbounded_channel::<Internal>();
        let (view_tx, view_rx) = watch::channel(RelayView::default());

        let actor = RelayActor {
            tokens: self.tokens,
            connector: self.connector,
            places: self.places,
            config: self.config,
            channel: None,
            generation: 0,
            phase: Phase::Idle,
            log: EventLog::default(),
            place_list: Vec::new(),
            internal_tx,
            view_tx,
        };
        tokio::spawn(actor.run(cmd_rx, internal_rx));

        RelayHandle { sender: cmd_tx, view: view_rx }
    }
}

#[derive(Clone)]
pub struct RelayHandle {
    sender: mpsc::Sender<Command>,
    view: watch::Receiver<RelayView>,
}

impl RelayHandle {
    /// Begin a new session, tearing down the current one first.
    ///
    /// Returns once negotiation is under way; watch for [`Phase::Active`].
    ///
    /// # Errors
    /// [`Error::ConnectionClosed`] if the relay has shut down.
    pub async fn start(&self) -> Result<()> {
        self.request(|respond| Command::Start { respond }).await
    }

    /// # Errors
    /// [`Error::ConnectionClosed`] if the relay has shut down.
    pub async fn stop(&self) -> Result<()> {
        self.request(|respond| Command::Stop { respond }).await
    }

    /// Send a raw protocol event.
    ///
    /// # Errors
    /// [`Error::ConnectionClosed`] if the relay has shut down. A missing
    /// session is not an error; it yields [`SendOutcome::Dropped`].
    pub async fn send_event(&self, event: ClientEvent) -> Result<SendOutcome> {
        self.request(|respond| Command::Send { event, respond }).await
    }

    /// Send `text` as a user message and ask for a response.
    ///
    /// Returns the outcome of the message itself.
    ///
    /// # Errors
    /// [`Error::ConnectionClosed`] if the relay has shut down.
    pub async fn send_text(&self, text: impl Into<String>) -> Result<SendOutcome> {
        let text = text.into();
        self.request(|respond| Command::SendText { text, respond }).await
    }

    #[must_use]
    pub fn view(&self) -> RelayView {
        self.view.borrow().clone()
    }

    #[must_use]
    pub fn watch(&self) -> watch::Receiver<RelayView> {
        self.view.clone()
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender.send(command(tx)).await.map_err(|_| Error::ConnectionClosed)?;
        rx.await.map_err(|_| Error::ConnectionClosed)
    }
}

enum Command {
    Start { respond: oneshot::Sender<()> },
    Stop { respond: oneshot::Sender<()> },
    Send { event: ClientEvent, respond: oneshot::Sender<SendOutcome> },
    SendText { text: String, respond: oneshot::Sender<SendOutcome> },
}

// Results of background work, tagged with the session generation that started it.
enum Internal {
    Negotiated { generation: u64, result: Result<Box<dyn Channel>> },
    LookupDone { generation: u64, request: ToolCallRequest, places: Vec<Place> },
}

struct RelayActor {
    tokens: Arc<dyn TokenSource>,
    connector: Arc<dyn Connector>,
    places: Arc<dyn PlacesLookup>,
    config: RelayConfig,
    channel: Option<Box<dyn Channel>>,
    generation: u64,
    phase: Phase,
    log: EventLog,
    place_list: Vec<Place>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    view_tx: watch::Sender<RelayView>,
}

impl RelayActor {
    async fn run(mut self, mut cmd_rx: mpsc::Receiver<Command>, mut internal_rx: mpsc::UnboundedReceiver<Internal>) {
        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => self.handle_command(cmd).await,
                        None => break,
                    }
                }
                Some(msg) = internal_rx.recv() => self.handle_internal(msg).await,
                signal = next_signal(&mut self.channel) => self.handle_signal(signal).await,
            }
        }
        self.teardown().await;
        tracing::debug!("relay stopped");
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Start { respond } => {
                self.start().await;
                let _ = respond.send(());
            }
            Command::Stop { respond } => {
                self.teardown().await;
                let _ = respond.send(());
            }
            Command::Send { event, respond } => {
                let outcome = self.dispatch(event).await;
                let _ = respond.send(outcome);
            }
            Command::SendText { text, respond } => {
                let outcome = self.dispatch(ClientEvent::conversation_item(Item::user_text(text))).await;
                self.dispatch(ClientEvent::response_create()).await;
                let _ = respond.send(outcome);
            }
        }
    }

    async fn start(&mut self) {
        if self.phase != Phase::Idle {
            tracing::info!("restarting session, tearing down the current one");
            self.teardown().await;
        }
        self.generation += 1;
        self.phase = Phase::Negotiating;
        self.publish();

        let generation = self.generation;
        let tokens = Arc::clone(&self.tokens);
        let connector = Arc::clone(&self.connector);
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = match tokens.fetch().await {
                Ok(credential) => connector.connect(credential).await,
                Err(err) => Err(err),
            };
            let _ = tx.send(Internal::Negotiated { generation, result });
        });
    }

    async fn handle_internal(&mut self, msg: Internal) {
        match msg {
            Internal::Negotiated { generation, result } => {
                if generation != self.generation || self.phase != Phase::Negotiating {
                    tracing::debug!(generation, "discarding stale negotiation");
                    if let Ok(mut channel) = result {
                        let _ = channel.close().await;
                    }
                    return;
                }
                match result {
                    Ok(channel) => self.channel = Some(channel),
                    Err(err) => {
                        tracing::error!("session negotiation failed: {err}");
                        self.phase = Phase::Idle;
                        self.publish();
                    }
                }
            }
            Internal::LookupDone { generation, request, places } => {
                if generation != self.generation || self.phase != Phase::Active {
                    tracing::debug!(call_id = %request.call_id, "discarding stale places lookup");
                    return;
                }
                self.place_list = top_places(places);
                self.publish();
                if self.config.feed_tool_results {
                    self.feed_tool_result(&request).await;
                }
            }
        }
    }

    async fn handle_signal(&mut self, signal: Result<ChannelSignal>) {
        match signal {
            Ok(ChannelSignal::Open) => {
                tracing::info!("session active");
                self.phase = Phase::Active;
                self.log.clear();
                self.publish();
            }
            Ok(ChannelSignal::Message(value)) => self.on_inbound(value).await,
            Ok(ChannelSignal::Closed) => {
                tracing::info!("channel closed");
                self.teardown().await;
            }
            Err(err) => {
                tracing::warn!("channel failed: {err}");
                self.teardown().await;
            }
        }
    }

    async fn on_inbound(&mut self, value: serde_json::Value) {
        if self.phase != Phase::Active {
            tracing::debug!("dropping event received before the channel opened");
            return;
        }
        let event = ServerEvent::from_value(value.clone());
        self.log.record(Direction::Inbound, value);
        self.publish();

        match react(&event) {
            Some(Reaction::RegisterTools) => match tool_registration() {
                Ok(update) => {
                    self.dispatch(ClientEvent::session_update(update)).await;
                }
                Err(err) => tracing::error!("cannot build tool registration: {err}"),
            },
            Some(Reaction::SearchPlaces(request)) => self.spawn_lookup(request),
            None => {}
        }
    }

    fn spawn_lookup(&self, request: ToolCallRequest) {
        tracing::info!(query = %request.query, location = %request.location, "searching places");
        let generation = self.generation;
        let places = Arc::clone(&self.places);
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let found = places.search(&request.query, &request.location).await.unwrap_or_else(|err| {
                tracing::warn!("places lookup failed, showing no results: {err}");
                Vec::new()
            });
            let _ = tx.send(Internal::LookupDone { generation, request, places: found });
        });
    }

    async fn feed_tool_result(&mut self, request: &ToolCallRequest) {
        match request.output(&self.place_list) {
            Ok(item) => {
                self.dispatch(ClientEvent::conversation_item(item)).await;
                self.dispatch(ClientEvent::response_create()).await;
            }
            Err(err) => tracing::error!("cannot encode places result: {err}"),
        }
    }

    async fn dispatch(&mut self, mut event: ClientEvent) -> SendOutcome {
        let kind = event.kind();
        let channel = match (self.phase, self.channel.as_mut()) {
            (Phase::Active, Some(channel)) => channel,
            _ => {
                tracing::error!(kind, "no open session, event not sent");
                return SendOutcome::Dropped;
            }
        };

        let event_id = event.ensure_event_id().to_string();
        let payload = match serde_json::to_value(&event) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::error!(kind, "cannot encode event: {err}");
                return SendOutcome::Dropped;
            }
        };
        if let Err(err) = channel.send(event).await {
            tracing::error!(kind, "send failed: {err}");
            return SendOutcome::Dropped;
        }

        self.log.record(Direction::Outbound, payload);
        self.publish();
        SendOutcome::Sent { event_id }
    }

    async fn teardown(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            if let Err(err) = channel.close().await {
                tracing::debug!("error closing channel: {err}");
            }
        }
        self.generation += 1;
        self.phase = Phase::Idle;
        self.place_list.clear();
        self.publish();
    }

    fn publish(&self) {
        self.view_tx.send_replace(RelayView {
            phase: self.phase,
            events: self.log.snapshot(),
            places: self.place_list.clone(),
        });
    }
}

async fn next_signal(channel: &mut Option<Box<dyn Channel>>) -> Result<ChannelSignal> {
    match channel {
        Some(channel) => channel.next_signal().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::places::Rating;
    use crate::transport::BoxFuture;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(2);

    struct MockChannel {
        incoming: mpsc::UnboundedReceiver<ChannelSignal>,
        outgoing: mpsc::UnboundedSender<ClientEvent>,
        closed: Arc<std::sync::atomic::AtomicBool>,
    }

    impl Channel for MockChannel {
        fn send(&mut self, event: ClientEvent) -> BoxFuture<'_, Result<()>> {
            let outgoing = self.outgoing.clone();
            Box::pin(async move { outgoing.send(event).map_err(|_| Error::ConnectionClosed) })
        }

        fn next_signal(&mut self) -> BoxFuture<'_, Result<ChannelSignal>> {
            Box::pin(async move { Ok(self.incoming.recv().await.unwrap_or(ChannelSignal::Closed)) })
        }

        fn close(&mut self) -> BoxFuture<'_, Result<()>> {
            self.closed.store(true, std::sync::atomic::Ordering::SeqCst);
            Box::pin(async { Ok(()) })
        }
    }

    struct Remote {
        signals: mpsc::UnboundedSender<ChannelSignal>,
        sent: mpsc::UnboundedReceiver<ClientEvent>,
        closed: Arc<std::sync::atomic::AtomicBool>,
    }

    impl Remote {
        fn emit(&self, value: serde_json::Value) {
            self.signals.send(ChannelSignal::Message(value)).unwrap();
        }

        async fn next_sent(&mut self) -> ClientEvent {
            tokio::time::timeout(WAIT, self.sent.recv()).await.unwrap().unwrap()
        }

        fn is_closed(&self) -> bool {
            self.closed.load(std::sync::atomic::Ordering::SeqCst)
        }
    }

    fn pair() -> (MockChannel, Remote) {
        let (signals, incoming) = mpsc::unbounded_channel();
        let (outgoing, sent) = mpsc::unbounded_channel();
        let closed = Arc::new(std::sync::atomic::AtomicBool::new(false));
        (
            MockChannel { incoming, outgoing, closed: Arc::clone(&closed) },
            Remote { signals, sent, closed },
        )
    }

    /// Hands out channels in the order the test queues them.
    struct MockConnector {
        channels: tokio::sync::Mutex<mpsc::UnboundedReceiver<MockChannel>>,
    }

    impl Connector for MockConnector {
        fn connect(&self, _credential: String) -> BoxFuture<'_, Result<Box<dyn Channel>>> {
            Box::pin(async move {
                let channel = self.channels.lock().await.recv().await.ok_or(Error::ConnectionClosed)?;
                Ok(Box::new(channel) as Box<dyn Channel>)
            })
        }
    }

    struct StaticToken;

    #[async_trait]
    impl TokenSource for StaticToken {
        async fn fetch(&self) -> Result<String> {
            Ok("ek_test".to_string())
        }
    }

    struct FailingToken;

    #[async_trait]
    impl TokenSource for FailingToken {
        async fn fetch(&self) -> Result<String> {
            Err(Error::Bootstrap("Error generating token".to_string()))
        }
    }

    /// Answers each search with the next scripted result, waiting until one is queued.
    struct ScriptedPlaces {
        results: tokio::sync::Mutex<mpsc::UnboundedReceiver<Result<Vec<Place>>>>,
        calls: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl PlacesLookup for ScriptedPlaces {
        async fn search(&self, query: &str, location: &str) -> Result<Vec<Place>> {
            self.calls.lock().unwrap().push((query.to_string(), location.to_string()));
            self.results.lock().await.recv().await.unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    struct Harness {
        handle: RelayHandle,
        channels: mpsc::UnboundedSender<MockChannel>,
        results: mpsc::UnboundedSender<Result<Vec<Place>>>,
        places: Arc<ScriptedPlaces>,
    }

    fn harness_with(tokens: Arc<dyn TokenSource>, config: RelayConfig) -> Harness {
        let (channels, channel_rx) = mpsc::unbounded_channel();
        let (results, result_rx) = mpsc::unbounded_channel();
        let places = Arc::new(ScriptedPlaces {
            results: tokio::sync::Mutex::new(result_rx),
            calls: Mutex::new(Vec::new()),
        });
        let connector = Arc::new(MockConnector { channels: tokio::sync::Mutex::new(channel_rx) });
        let handle = Relay::new(tokens, connector, Arc::clone(&places) as Arc<dyn PlacesLookup>)
            .with_config(config)
            .spawn();
        Harness { handle, channels, results, places }
    }

    fn harness() -> Harness {
        harness_with(Arc::new(StaticToken), RelayConfig::default())
    }

    async fn wait_for(handle: &RelayHandle, pred: impl FnMut(&RelayView) -> bool) -> RelayView {
        let mut rx = handle.watch();
        tokio::time::timeout(WAIT, rx.wait_for(pred)).await.unwrap().unwrap().clone()
    }

    async fn activate(h: &Harness) -> Remote {
        let (channel, remote) = pair();
        h.handle.start().await.unwrap();
        h.channels.send(channel).unwrap();
        remote.signals.send(ChannelSignal::Open).unwrap();
        wait_for(&h.handle, |v| v.phase == Phase::Active).await;
        remote
    }

    fn place(name: &str) -> Place {
        Place { name: name.to_string(), address: "Somewhere".to_string(), rating: Rating::Score(4.0) }
    }

    fn search_done(arguments: &str) -> serde_json::Value {
        json!({
            "type": "response.done",
            "event_id": "evt_done",
            "response": {
                "id": "resp_1",
                "status": "completed",
                "output": [{
                    "type": "function_call",
                    "status": "completed",
                    "name": "search_places",
                    "call_id": "call_1",
                    "arguments": arguments
                }]
            }
        })
    }

    #[tokio::test]
    async fn send_without_session_is_dropped() {
        let h = harness();
        let outcome = h.handle.send_event(ClientEvent::response_create()).await.unwrap();
        assert_eq!(outcome, SendOutcome::Dropped);
        assert!(h.handle.view().events.is_empty());
    }

    #[tokio::test]
    async fn start_walks_through_negotiating_to_active() {
        let h = harness();
        h.handle.start().await.unwrap();
        assert_eq!(h.handle.view().phase, Phase::Negotiating);

        let (channel, remote) = pair();
        h.channels.send(channel).unwrap();
        remote.signals.send(ChannelSignal::Open).unwrap();
        let view = wait_for(&h.handle, |v| v.phase == Phase::Active).await;
        assert!(view.events.is_empty());
    }

    #[tokio::test]
    async fn failed_token_returns_to_idle() {
        let h = harness_with(Arc::new(FailingToken), RelayConfig::default());
        h.handle.start().await.unwrap();
        wait_for(&h.handle, |v| v.phase == Phase::Idle).await;
    }

    #[tokio::test]
    async fn session_created_registers_search_tool() {
        let h = harness();
        let mut remote = activate(&h).await;
        remote.emit(json!({ "type": "session.created", "event_id": "evt_1", "session": { "id": "sess_1" } }));

        let ClientEvent::SessionUpdate { event_id, session } = remote.next_sent().await else {
            panic!("expected session.update");
        };
        assert!(event_id.is_some());
        let tools = session.tools.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name(), "search_places");

        let view = wait_for(&h.handle, |v| v.events.len() == 2).await;
        assert_eq!(view.events[0].direction, Direction::Outbound);
        assert_eq!(view.events[0].kind(), Some("session.update"));
        assert_eq!(view.events[1].kind(), Some("session.created"));
    }

    #[tokio::test]
    async fn send_text_emits_item_then_response_create() {
        let h = harness();
        let mut remote = activate(&h).await;

        let outcome = h.handle.send_text("any dog parks nearby?").await.unwrap();
        let SendOutcome::Sent { event_id } = outcome else {
            panic!("expected the message to be sent");
        };

        let first = remote.next_sent().await;
        assert_eq!(first.kind(), "conversation.item.create");
        assert_eq!(first.event_id(), Some(event_id.as_str()));
        assert_eq!(remote.next_sent().await.kind(), "response.create");

        let view = h.handle.view();
        assert_eq!(view.events.len(), 2);
        assert_eq!(view.events[0].kind(), Some("response.create"));
        assert_eq!(view.events[1].event_id(), Some(event_id.as_str()));
    }

    #[tokio::test]
    async fn caller_event_id_is_kept() {
        let h = harness();
        let mut remote = activate(&h).await;
        let event = ClientEvent::ResponseCreate { event_id: Some("evt_mine".into()), response: None };
        let outcome = h.handle.send_event(event).await.unwrap();
        assert_eq!(outcome, SendOutcome::Sent { event_id: "evt_mine".into() });
        assert_eq!(remote.next_sent().await.event_id(), Some("evt_mine"));
    }

    #[tokio::test]
    async fn search_call_replaces_places_and_feeds_result() {
        let h = harness();
        let mut remote = activate(&h).await;

        h.results.send(Ok(vec![place("old")])).unwrap();
        remote.emit(search_done(r#"{"query":"cafe","location":"1,2"}"#));
        wait_for(&h.handle, |v| v.places.len() == 1).await;
        remote.next_sent().await;
        remote.next_sent().await;

        h.results.send(Ok((0..8).map(|i| place(&format!("p{i}"))).collect())).unwrap();
        remote.emit(search_done(r#"{"query":"park","location":"3,4"}"#));
        let view = wait_for(&h.handle, |v| v.places.first().is_some_and(|p| p.name == "p0")).await;
        assert_eq!(view.places.len(), 5);
        assert!(view.places.iter().all(|p| p.name != "old"));

        let ClientEvent::ConversationItemCreate { item, .. } = remote.next_sent().await else {
            panic!("expected function_call_output");
        };
        assert!(matches!(*item, Item::FunctionCallOutput { ref call_id, .. } if call_id == "call_1"));
        assert_eq!(remote.next_sent().await.kind(), "response.create");

        let calls = h.places.calls.lock().unwrap().clone();
        assert_eq!(calls[1], ("park".to_string(), "3,4".to_string()));
    }

    #[tokio::test]
    async fn lookup_failure_shows_no_results() {
        let h = harness_with(Arc::new(StaticToken), RelayConfig { feed_tool_results: false, mailbox: 8 });
        let remote = activate(&h).await;

        h.results.send(Ok(vec![place("a")])).unwrap();
        remote.emit(search_done(r#"{"query":"cafe","location":"1,2"}"#));
        wait_for(&h.handle, |v| v.places.len() == 1).await;

        h.results.send(Err(Error::upstream("places", "REQUEST_DENIED"))).unwrap();
        remote.emit(search_done(r#"{"query":"cafe","location":"1,2"}"#));
        wait_for(&h.handle, |v| v.places.is_empty()).await;
    }

    #[tokio::test]
    async fn malformed_arguments_are_skipped() {
        let h = harness();
        let remote = activate(&h).await;
        remote.emit(search_done("{not json"));
        remote.emit(json!({ "type": "response.created", "event_id": "evt_x", "response": { "id": "resp_2" } }));
        wait_for(&h.handle, |v| v.events.len() == 2).await;
        assert!(h.places.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn call_without_location_keeps_current_places() {
        let h = harness_with(Arc::new(StaticToken), RelayConfig { feed_tool_results: false, mailbox: 8 });
        let remote = activate(&h).await;

        h.results.send(Ok(vec![place("kept")])).unwrap();
        remote.emit(search_done(r#"{"query":"park","location":"1,2"}"#));
        wait_for(&h.handle, |v| v.places.len() == 1).await;
        let events_before = h.handle.view().events.len();

        remote.emit(search_done(r#"{"query":"cafe"}"#));
        remote.emit(json!({ "type": "response.created", "event_id": "evt_y", "response": { "id": "resp_3" } }));
        let view = wait_for(&h.handle, |v| v.events.len() == events_before + 2).await;

        assert_eq!(h.places.calls.lock().unwrap().len(), 1);
        assert_eq!(view.places, vec![place("kept")]);
    }

    #[tokio::test]
    async fn stop_discards_in_flight_lookup() {
        let h = harness();
        let mut remote = activate(&h).await;
        remote.emit(search_done(r#"{"query":"cafe","location":"1,2"}"#));
        tokio::time::timeout(WAIT, async {
            while h.places.calls.lock().unwrap().is_empty() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        h.handle.stop().await.unwrap();
        assert!(remote.is_closed());
        h.results.send(Ok(vec![place("late")])).unwrap();

        let _next = activate(&h).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(h.handle.view().places.is_empty());
        assert!(remote.sent.try_recv().is_err());
    }

    #[tokio::test]
    async fn restart_tears_down_previous_session() {
        let h = harness();
        let first = activate(&h).await;
        let _second = activate(&h).await;
        assert!(first.is_closed());
        assert_eq!(h.handle.view().phase, Phase::Active);
    }

    #[tokio::test]
    async fn late_negotiation_after_stop_is_closed() {
        let h = harness();
        h.handle.start().await.unwrap();
        h.handle.stop().await.unwrap();

        let (channel, remote) = pair();
        h.channels.send(channel).unwrap();
        tokio::time::timeout(WAIT, async {
            while !remote.is_closed() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(h.handle.view().phase, Phase::Idle);
    }

    #[tokio::test]
    async fn remote_close_returns_to_idle() {
        let h = harness();
        let remote = activate(&h).await;
        remote.signals.send(ChannelSignal::Closed).unwrap();
        wait_for(&h.handle, |v| v.phase == Phase::Idle).await;
        let outcome = h.handle.send_text("hello?").await.unwrap();
        assert_eq!(outcome, SendOutcome::Dropped);
    }
}
