use crate::error::{KefError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;

/// Default HTTP port of the speaker control API
pub const DEFAULT_PORT: u16 = 80;

pub(crate) const GET_DATA: &str = "/api/getData";
pub(crate) const SET_DATA: &str = "/api/setData";
pub(crate) const MODIFY_QUEUE: &str = "/api/event/modifyQueue";
pub(crate) const POLL_QUEUE: &str = "/api/event/pollQueue";

/// Device control paths
pub mod paths {
    pub const PLAY_MODE: &str = "settings:/mediaPlayer/playMode";
    pub const VOLUME: &str = "player:volume";
    pub const SPEAKER_STATUS: &str = "settings:/kef/host/speakerStatus";
    pub const PHYSICAL_SOURCE: &str = "settings:/kef/play/physicalSource";
    pub const PLAYER_DATA: &str = "player:player/data";
    pub const PLAY_TIME: &str = "player:player/data/playTime";
    pub const PLAYER_CONTROL: &str = "player:player/control";
    pub const DEVICE_NAME: &str = "settings:/deviceName";
    pub const MUTE: &str = "settings:/mediaPlayer/mute";
    pub const MAXIMUM_VOLUME: &str = "settings:/kef/host/maximumVolume";
    pub const VOLUME_LIMIT: &str = "settings:/kef/host/volumeLimit";
    pub const MODEL_NAME: &str = "settings:/kef/host/modelName";
    pub const FIRMWARE: &str = "settings:/releasetext";
    pub const MAC_ADDRESS: &str = "settings:/system/primaryMacAddress";
    pub const NETWORK_INFO: &str = "network:info";
    pub const EQ_PROFILE: &str = "kef:eqProfile";
}

/// Paths every event queue observes
pub const CORE_OBSERVED_PATHS: [&str; 13] = [
    paths::PLAY_MODE,
    paths::VOLUME,
    paths::SPEAKER_STATUS,
    paths::PHYSICAL_SOURCE,
    paths::PLAYER_DATA,
    paths::DEVICE_NAME,
    paths::MUTE,
    paths::MAXIMUM_VOLUME,
    paths::VOLUME_LIMIT,
    paths::MODEL_NAME,
    paths::FIRMWARE,
    paths::NETWORK_INFO,
    paths::EQ_PROFILE,
];

/// HTTP methods used by the control API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A single request against a speaker's control API
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub host: String,
    pub port: u16,
    pub endpoint: String,
    pub query: Vec<(String, String)>,
    pub method: Method,
    pub body: Option<Value>,
    pub timeout: Duration,
}

impl Command {
    /// Create a GET command for the given endpoint
    pub fn get(host: impl Into<String>, port: u16, endpoint: impl Into<String>) -> Self {
        Self::new(host, port, endpoint, Method::Get)
    }

    /// Create a POST command for the given endpoint
    pub fn post(host: impl Into<String>, port: u16, endpoint: impl Into<String>) -> Self {
        Self::new(host, port, endpoint, Method::Post)
    }

    fn new(host: impl Into<String>, port: u16, endpoint: impl Into<String>, method: Method) -> Self {
        Self {
            host: host.into(),
            port,
            endpoint: endpoint.into(),
            query: Vec::new(),
            method,
            body: None,
            timeout: Duration::from_secs(10),
        }
    }

    /// Append a query parameter
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Set the JSON body
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Set the transport timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Read the value of a control path
    pub fn get_data(host: impl Into<String>, port: u16, path: &str) -> Self {
        Self::get(host, port, GET_DATA)
            .with_param("path", path)
            .with_param("roles", "value")
    }

    /// Write a typed value to a control path
    pub fn set_data(host: impl Into<String>, port: u16, path: &str, value: Value) -> Self {
        Self::post(host, port, SET_DATA).with_body(json!({
            "path": path,
            "role": "value",
            "value": value,
        }))
    }
}

/// Typed value tags used by the control API
pub mod tags {
    pub const I32: &str = "i32_";
    pub const I64: &str = "i64_";
    pub const STRING: &str = "string_";
    pub const BOOL: &str = "bool_";
    pub const PHYSICAL_SOURCE: &str = "kefPhysicalSource";
    pub const SPEAKER_STATUS: &str = "kefSpeakerStatus";
}

/// Build a typed value object, e.g. `{"type": "i32_", "i32_": 30}`
pub fn typed_value(tag: &str, value: impl Into<Value>) -> Value {
    let mut obj = serde_json::Map::new();
    obj.insert("type".to_string(), Value::String(tag.to_string()));
    obj.insert(tag.to_string(), value.into());
    Value::Object(obj)
}

/// Look up the payload of a typed value by its tag
pub fn typed_field<'a>(value: &'a Value, tag: &str) -> Option<&'a Value> {
    value.get(tag)
}

pub fn typed_i64(value: &Value, tag: &str) -> Option<i64> {
    typed_field(value, tag).and_then(Value::as_i64)
}

pub fn typed_str<'a>(value: &'a Value, tag: &str) -> Option<&'a str> {
    typed_field(value, tag).and_then(Value::as_str)
}

pub fn typed_bool(value: &Value, tag: &str) -> Option<bool> {
    typed_field(value, tag).and_then(Value::as_bool)
}

/// Extract the value from a getData response body
///
/// The API answers with a one-element array; some firmware returns the bare
/// object.
pub fn parse_get_data(body: &str) -> Result<Value> {
    let value: Value = serde_json::from_str(body)?;
    match value {
        Value::Array(mut items) => {
            if items.is_empty() {
                Err(KefError::InvalidResponse("Empty getData response".to_string()))
            } else {
                Ok(items.swap_remove(0))
            }
        }
        Value::Object(_) => Ok(value),
        other => Err(KefError::InvalidResponse(format!(
            "Unexpected getData payload: {}",
            other
        ))),
    }
}

/// One entry of the subscribe declaration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subscription {
    pub path: String,
    #[serde(rename = "type")]
    pub item_type: String,
}

/// Body of a modifyQueue request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueRequest {
    pub subscribe: Vec<Subscription>,
    pub unsubscribe: Vec<Subscription>,
}

impl QueueRequest {
    /// Subscribe to every path with `itemWithValue` semantics
    pub fn subscribe<'a>(paths: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            subscribe: paths
                .into_iter()
                .map(|path| Subscription {
                    path: path.to_string(),
                    item_type: "itemWithValue".to_string(),
                })
                .collect(),
            unsubscribe: Vec::new(),
        }
    }
}

/// Extract the queue id from a modifyQueue response, trimming wrapping quotes
pub fn parse_queue_id(body: &str) -> Result<String> {
    let id = body.trim().trim_matches('"').trim();
    if id.is_empty() {
        return Err(KefError::InvalidResponse("Empty queue id".to_string()));
    }
    Ok(id.to_string())
}

/// One change reported by pollQueue
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PollItem {
    pub path: String,
    #[serde(rename = "itemValue", default)]
    pub item_value: Value,
}

/// Raw event map: control path to its latest reported value
pub type RawEvents = BTreeMap<String, Value>;

/// Parse a pollQueue response into a path → value map
///
/// An empty body or `[]` means nothing changed. Entries without a path are
/// skipped; when a path repeats, the last value wins.
pub fn parse_poll_response(body: &str) -> Result<RawEvents> {
    let body = body.trim();
    if body.is_empty() {
        return Ok(RawEvents::new());
    }

    let items: Vec<Value> = serde_json::from_str(body)?;
    let mut events = RawEvents::new();
    for item in items {
        match serde_json::from_value::<PollItem>(item) {
            Ok(item) => {
                events.insert(item.path, item.item_value);
            }
            Err(e) => {
                tracing::debug!("Skipping malformed poll item: {}", e);
            }
        }
    }
    Ok(events)
}
