//! Scripted executor and payload fixtures shared by unit tests.

use crate::error::{KefError, Result};
use crate::executor::CommandExecutor;
use crate::protocol::Command;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What the mock answers for one command
pub(crate) enum Reply {
    Body(String),
    Fail(KefError),
    /// Answers after the given delay
    Slow(Duration, String),
    /// Never answers; callers must enforce their own timeout
    Hang,
}

type Handler = Box<dyn Fn(&Command) -> Reply + Send + Sync>;

pub(crate) struct MockExecutor {
    handler: Handler,
    calls: Mutex<Vec<Command>>,
}

impl MockExecutor {
    pub(crate) fn new(handler: impl Fn(&Command) -> Reply + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Answers in order; hangs once the script runs out
    pub(crate) fn scripted(replies: Vec<Reply>) -> Arc<Self> {
        let replies = Mutex::new(VecDeque::from(replies));
        Self::new(move |_| replies.lock().unwrap().pop_front().unwrap_or(Reply::Hang))
    }

    pub(crate) fn calls(&self) -> Vec<Command> {
        self.calls.lock().unwrap().clone()
    }

    /// Commands sent to the given endpoint
    pub(crate) fn calls_to(&self, endpoint: &str) -> Vec<Command> {
        self.calls()
            .into_iter()
            .filter(|c| c.endpoint == endpoint)
            .collect()
    }
}

#[async_trait]
impl CommandExecutor for MockExecutor {
    async fn execute(&self, command: &Command) -> Result<String> {
        self.calls.lock().unwrap().push(command.clone());
        match (self.handler)(command) {
            Reply::Body(body) => Ok(body),
            Reply::Fail(error) => Err(error),
            Reply::Slow(delay, body) => {
                tokio::time::sleep(delay).await;
                Ok(body)
            }
            Reply::Hang => std::future::pending().await,
        }
    }
}

/// Query parameter value of a command
pub(crate) fn param<'a>(command: &'a Command, key: &str) -> Option<&'a str> {
    command
        .query
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

/// getData body for a string value
pub(crate) fn string_body(value: &str) -> String {
    serde_json::json!([{"type": "string_", "string_": value}]).to_string()
}

/// getData body for an i32 value
pub(crate) fn i32_body(value: i32) -> String {
    serde_json::json!([{"type": "i32_", "i32_": value}]).to_string()
}

/// Full player data payload for a playing track
pub(crate) const PLAYER_DATA_PLAYING: &str = r#"{
    "type": "playerData",
    "state": "playing",
    "status": {"duration": 215000, "playSpeed": 1},
    "trackRoles": {
        "title": "Teardrop",
        "icon": "http://covers.example/teardrop.jpg",
        "mediaData": {
            "metaData": {"artist": "Massive Attack", "album": "Mezzanine"}
        }
    }
}"#;
