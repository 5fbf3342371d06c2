use std::sync::{Arc, Mutex};
use std::time::Duration;

use dogmap_rt::transport::BoxFuture;
use dogmap_rt::{
    BackendPlaces, Channel, ChannelSignal, ClientEvent, Connector, Error, HttpTokenSource, Item, Phase, Relay,
    RelayHandle, RelayView, Result,
};
use serde_json::json;
use tokio::sync::mpsc;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const WAIT: Duration = Duration::from_secs(3);

struct ScriptedChannel {
    incoming: mpsc::UnboundedReceiver<ChannelSignal>,
    outgoing: mpsc::UnboundedSender<ClientEvent>,
}

impl Channel for ScriptedChannel {
    fn send(&mut self, event: ClientEvent) -> BoxFuture<'_, Result<()>> {
        let result = self.outgoing.send(event).map_err(|_| Error::ConnectionClosed);
        Box::pin(async move { result })
    }

    fn next_signal(&mut self) -> BoxFuture<'_, Result<ChannelSignal>> {
        Box::pin(async move { Ok(self.incoming.recv().await.unwrap_or(ChannelSignal::Closed)) })
    }

    fn close(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async { Ok(()) })
    }
}

/// Hands out one prepared channel and records the credential it was opened with.
struct OneShotConnector {
    channel: Mutex<Option<ScriptedChannel>>,
    credential: Mutex<Option<String>>,
}

impl Connector for OneShotConnector {
    fn connect(&self, credential: String) -> BoxFuture<'_, Result<Box<dyn Channel>>> {
        *self.credential.lock().unwrap() = Some(credential);
        let channel = self.channel.lock().unwrap().take();
        Box::pin(async move {
            let channel = channel.ok_or(Error::ConnectionClosed)?;
            Ok(Box::new(channel) as Box<dyn Channel>)
        })
    }
}

async fn wait_for(handle: &RelayHandle, pred: impl FnMut(&RelayView) -> bool) -> RelayView {
    let mut rx = handle.watch();
    tokio::time::timeout(WAIT, rx.wait_for(pred)).await.unwrap().unwrap().clone()
}

async fn next_sent(rx: &mut mpsc::UnboundedReceiver<ClientEvent>) -> ClientEvent {
    tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap()
}

#[tokio::test]
async fn voice_session_round_trip_through_backend() {
    let backend = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "credential": "ek_round_trip",
            "expires_at": 1,
            "client_secret": { "value": "ek_round_trip", "expires_at": 1 },
            "location": null,
            "places": []
        })))
        .mount(&backend)
        .await;
    let places: Vec<_> = (0..7)
        .map(|i| json!({ "name": format!("Park {i}"), "address": "Berlin", "rating": 4.0 }))
        .collect();
    Mock::given(method("GET"))
        .and(path("/places"))
        .and(query_param("query", "dog park"))
        .and(query_param("location", "52.52,13.405"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "query": "dog park", "places": places })))
        .expect(1)
        .mount(&backend)
        .await;

    let (signals, incoming) = mpsc::unbounded_channel();
    let (outgoing, mut sent) = mpsc::unbounded_channel();
    let connector = Arc::new(OneShotConnector {
        channel: Mutex::new(Some(ScriptedChannel { incoming, outgoing })),
        credential: Mutex::new(None),
    });

    let relay = Relay::new(
        Arc::new(HttpTokenSource::new(&backend.uri()).unwrap()),
        Arc::clone(&connector) as Arc<dyn Connector>,
        Arc::new(BackendPlaces::new(backend.uri()).unwrap()),
    )
    .spawn();

    relay.start().await.unwrap();
    signals.send(ChannelSignal::Open).unwrap();
    wait_for(&relay, |v| v.phase == Phase::Active).await;
    assert_eq!(connector.credential.lock().unwrap().as_deref(), Some("ek_round_trip"));

    signals
        .send(ChannelSignal::Message(json!({
            "type": "session.created",
            "event_id": "evt_1",
            "session": { "id": "sess_1" }
        })))
        .unwrap();
    assert_eq!(next_sent(&mut sent).await.kind(), "session.update");

    signals
        .send(ChannelSignal::Message(json!({
            "type": "response.done",
            "event_id": "evt_2",
            "response": {
                "id": "resp_1",
                "status": "completed",
                "output": [{
                    "type": "function_call",
                    "status": "completed",
                    "name": "search_places",
                    "call_id": "call_9",
                    "arguments": "{\"query\":\"dog park\",\"location\":\"52.52,13.405\"}"
                }]
            }
        })))
        .unwrap();

    let view = wait_for(&relay, |v| !v.places.is_empty()).await;
    assert_eq!(view.places.len(), 5);
    assert_eq!(view.places[0].name, "Park 0");

    let ClientEvent::ConversationItemCreate { item, .. } = next_sent(&mut sent).await else {
        panic!("expected the tool result");
    };
    let Item::FunctionCallOutput { call_id, output, .. } = *item else {
        panic!("expected function_call_output");
    };
    assert_eq!(call_id, "call_9");
    let output: serde_json::Value = serde_json::from_str(&output).unwrap();
    assert_eq!(output["places"].as_array().map(Vec::len), Some(5));
    assert_eq!(next_sent(&mut sent).await.kind(), "response.create");

    relay.stop().await.unwrap();
    let view = relay.view();
    assert_eq!(view.phase, Phase::Idle);
    assert!(view.places.is_empty());
}
