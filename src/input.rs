use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AguiError, Result};
use crate::message::Message;

/// Normalized payload of one AG-UI run request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunInput {
    #[serde(rename = "threadId")]
    pub thread_id: String,
    #[serde(rename = "runId")]
    pub run_id: String,
    #[serde(
        rename = "parentRunId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub parent_run_id: Option<String>,
    #[serde(default)]
    pub messages: Vec<Message>,
    /// Client state, forwarded untouched.
    #[serde(default)]
    pub state: Value,
    #[serde(rename = "forwardedProps", default)]
    pub forwarded_props: Value,
    #[serde(default)]
    pub tools: Vec<Value>,
    #[serde(default)]
    pub context: Vec<Value>,
}

impl RunInput {
    pub fn new(thread_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            run_id: run_id.into(),
            parent_run_id: None,
            messages: Vec::new(),
            state: Value::Null,
            forwarded_props: Value::Null,
            tools: Vec::new(),
            context: Vec::new(),
        }
    }

    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }
}

/// Decodes raw request bodies into [`RunInput`] values.
///
/// Only the shape of the payload is checked here. Whether the message list is
/// usable for a run is decided by the orchestrator.
pub struct InputAdapter;

impl InputAdapter {
    pub fn parse(raw: &[u8]) -> Result<RunInput> {
        serde_json::from_slice(raw).map_err(AguiError::Decode)
    }
}
