//! Events produced by the inner agent runner.
//!
//! The shape follows the chat-completion wire format most model providers
//! stream: an event id shared by every fragment of one logical message, an
//! `object` discriminator and a list of choices holding either an incremental
//! `delta` or the complete `message`.

use serde::{Deserialize, Serialize};

use crate::message::Role;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum ObjectKind {
    /// Incremental fragment of an assistant message.
    #[serde(rename = "chat.completion.chunk")]
    ChatCompletionChunk,
    /// A complete assistant message delivered in one event.
    #[serde(rename = "chat.completion")]
    ChatCompletion,
    #[serde(rename = "tool.response")]
    ToolResponse,
    #[serde(rename = "error")]
    Error,
    #[default]
    #[serde(other)]
    Other,
}

/// A single tool invocation requested by the model.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Serialized JSON arguments; empty when the tool takes none.
    #[serde(default)]
    pub arguments: String,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Id of the tool call this message answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Choice {
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub delta: ChatMessage,
    #[serde(default)]
    pub message: ChatMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventError {
    #[serde(rename = "type", default)]
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// One notification from the agent-execution layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InternalEvent {
    pub id: String,
    #[serde(default)]
    pub object: ObjectKind,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<EventError>,
    /// Set on the last event the runner produces for a run.
    #[serde(default)]
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

impl InternalEvent {
    /// A streaming fragment carrying `content` as its delta.
    pub fn chunk(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            object: ObjectKind::ChatCompletionChunk,
            choices: vec![Choice {
                delta: ChatMessage {
                    role: Role::Assistant,
                    content: content.into(),
                    ..ChatMessage::default()
                },
                ..Choice::default()
            }],
            ..Self::default()
        }
    }

    /// A completed assistant message.
    pub fn completion(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            object: ObjectKind::ChatCompletion,
            choices: vec![Choice {
                message: ChatMessage {
                    role: Role::Assistant,
                    content: content.into(),
                    ..ChatMessage::default()
                },
                ..Choice::default()
            }],
            ..Self::default()
        }
    }

    /// A completed assistant message that only requests tool invocations.
    pub fn tool_calls(id: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        let mut event = Self::completion(id, "");
        event.choices[0].message.tool_calls = calls;
        event
    }

    /// The output of one tool invocation.
    pub fn tool_result(
        id: impl Into<String>,
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            object: ObjectKind::ToolResponse,
            choices: vec![Choice {
                message: ChatMessage {
                    role: Role::Tool,
                    content: content.into(),
                    tool_id: Some(tool_call_id.into()),
                    tool_name: Some(tool_name.into()),
                    ..ChatMessage::default()
                },
                ..Choice::default()
            }],
            ..Self::default()
        }
    }

    pub fn error(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            object: ObjectKind::Error,
            error: Some(EventError {
                kind: "run_error".into(),
                message: message.into(),
                code: None,
            }),
            done: true,
            ..Self::default()
        }
    }

    pub fn with_done(mut self) -> Self {
        self.done = true;
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn first_choice(&self) -> Option<&Choice> {
        self.choices.first()
    }

    pub fn is_tool_call(&self) -> bool {
        self.first_choice()
            .map(|choice| !choice.message.tool_calls.is_empty())
            .unwrap_or(false)
    }

    pub fn is_tool_result(&self) -> bool {
        self.object == ObjectKind::ToolResponse
            && self.choices.iter().any(|choice| choice.message.tool_id.is_some())
    }

    pub fn is_run_completion(&self) -> bool {
        self.done
    }
}
