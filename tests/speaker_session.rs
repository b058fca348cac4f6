use async_trait::async_trait;
use futures_util::StreamExt;
use kef_wireless::{
    CancellationToken, Command, CommandExecutor, DeviceFinder, DiscoveredDevice, Discovery,
    KefError, Method, Result, SharedExecutor, Source, Speaker,
};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// In-memory speaker speaking the control API
#[derive(Default)]
struct FakeSpeaker {
    state: Mutex<FakeState>,
}

#[derive(Default)]
struct FakeState {
    values: Vec<(String, Value)>,
    pending: Vec<(String, Value)>,
    queues: usize,
}

impl FakeSpeaker {
    fn with_name(name: &str) -> Arc<Self> {
        let speaker = Arc::new(Self::default());
        speaker.store(
            "settings:/deviceName",
            json!({"type": "string_", "string_": name}),
            false,
        );
        speaker
    }

    fn store(&self, path: &str, value: Value, notify: bool) {
        let mut state = self.state.lock().unwrap();
        state.values.retain(|(p, _)| p != path);
        state.values.push((path.to_string(), value.clone()));
        if notify {
            state.pending.push((path.to_string(), value));
        }
    }

    fn queues_created(&self) -> usize {
        self.state.lock().unwrap().queues
    }
}

fn query<'a>(command: &'a Command, key: &str) -> Option<&'a str> {
    command
        .query
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

#[async_trait]
impl CommandExecutor for FakeSpeaker {
    async fn execute(&self, command: &Command) -> Result<String> {
        match (command.method, command.endpoint.as_str()) {
            (Method::Get, "/api/getData") => {
                let path = query(command, "path").unwrap_or_default();
                let state = self.state.lock().unwrap();
                state
                    .values
                    .iter()
                    .find(|(p, _)| p == path)
                    .map(|(_, v)| json!([v]).to_string())
                    .ok_or_else(|| KefError::Network("HTTP status 404 Not Found".into()))
            }
            (Method::Post, "/api/setData") => {
                let body = command.body.clone().unwrap_or_default();
                let path = body["path"].as_str().unwrap_or_default().to_string();
                self.store(&path, body["value"].clone(), true);
                Ok(String::new())
            }
            (Method::Post, "/api/event/modifyQueue") => {
                let mut state = self.state.lock().unwrap();
                state.queues += 1;
                Ok(format!("\"{{queue-{}}}\"", state.queues))
            }
            (Method::Get, "/api/event/pollQueue") => {
                let mut state = self.state.lock().unwrap();
                let items: Vec<Value> = state
                    .pending
                    .drain(..)
                    .map(|(path, value)| json!({"path": path, "itemValue": value}))
                    .collect();
                Ok(Value::Array(items).to_string())
            }
            _ => Err(KefError::Network("HTTP status 404 Not Found".into())),
        }
    }
}

#[tokio::test]
async fn writes_show_up_in_the_next_poll() {
    let fake = FakeSpeaker::with_name("Living Room");
    let speaker = Speaker::new(fake.clone(), "192.168.1.100");

    assert!(speaker
        .poll_once(Duration::from_secs(1), false)
        .await
        .unwrap()
        .is_empty());

    speaker.set_volume(33).await.unwrap();
    speaker.set_source(Source::Optic).await.unwrap();

    let event = speaker.poll_once(Duration::from_secs(1), false).await.unwrap();
    assert_eq!(event.volume, Some(33));
    assert_eq!(event.source, Some(Source::Optic));
    assert!(event.device_name.is_none());

    assert!(speaker
        .poll_once(Duration::from_secs(1), false)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(speaker.volume().await.unwrap(), 33);
    assert_eq!(fake.queues_created(), 1);
}

#[tokio::test]
async fn event_stream_follows_changes_until_cancelled() {
    let fake = FakeSpeaker::with_name("Study");
    let speaker = Speaker::new(fake.clone(), "192.168.1.101");
    let controller = speaker.clone();

    speaker.mute().await.unwrap();
    speaker.set_name("Office").await.unwrap();

    let cancel = CancellationToken::new();
    let events = speaker.events(Duration::from_secs(1), false, cancel.clone());
    tokio::pin!(events);

    let event = events.next().await.unwrap().unwrap();
    assert_eq!(event.is_muted, Some(true));
    assert_eq!(event.device_name.as_deref(), Some("Office"));

    controller.unmute().await.unwrap();
    let mut unmuted = false;
    while let Some(event) = events.next().await {
        if event.unwrap().is_muted == Some(false) {
            unmuted = true;
            break;
        }
    }
    assert!(unmuted);

    cancel.cancel();
    assert!(events.next().await.is_none());
}

struct StaticFinder(Vec<DiscoveredDevice>);

#[async_trait]
impl DeviceFinder for StaticFinder {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn find(
        &self,
        _timeout: Duration,
        found: Option<mpsc::UnboundedSender<DiscoveredDevice>>,
    ) -> Result<HashSet<DiscoveredDevice>> {
        if let Some(found) = found {
            for device in &self.0 {
                let _ = found.send(device.clone());
            }
        }
        Ok(self.0.iter().cloned().collect())
    }
}

#[tokio::test]
async fn discovered_devices_connect_through_the_shared_executor() {
    let fake = FakeSpeaker::with_name("Kitchen");
    let executor: SharedExecutor = fake;

    let device = DiscoveredDevice::new("Kitchen", "192.168.1.102");
    let discovery = Discovery::with_finders(
        Arc::new(StaticFinder(vec![device.clone()])),
        Arc::new(StaticFinder(Vec::new())),
        Duration::from_secs(1),
    );

    let found = discovery.discover(Duration::from_secs(1)).await.unwrap();
    assert_eq!(found, HashSet::from([device.clone()]));

    let streamed: Vec<_> = discovery.discover_stream().collect().await;
    assert_eq!(streamed, vec![device.clone()]);

    let speaker = device.connect(executor);
    assert_eq!(speaker.host(), "192.168.1.102");
    assert_eq!(speaker.port(), 80);
    assert_eq!(speaker.name().await.unwrap(), "Kitchen");
}

#[tokio::test]
async fn unknown_paths_fail_as_network_errors() {
    let speaker = Speaker::new(FakeSpeaker::with_name("Den"), "192.168.1.103");
    assert!(matches!(speaker.max_volume().await, Err(KefError::Network(_))));
}
