use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use uuid::Uuid;

use crate::error::{AguiError, Result};
use crate::event::InternalEvent;
use crate::message::Message;
use crate::runner::RunContext;

/// Lazily produced internal events of one agent run.
pub type InternalEventStream = BoxStream<'static, InternalEvent>;

/// The agent-execution layer the bridge drives.
///
/// Every call starts a new run; the returned stream ends when the run does.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    async fn run(
        &self,
        ctx: RunContext,
        user_id: &str,
        thread_id: &str,
        message: Message,
    ) -> Result<InternalEventStream>;
}

/// A deterministic runner used for tests and demos.
///
/// Each call replays the next scripted run; the last script is repeated once
/// the queue is exhausted.
pub struct ScriptedRunner {
    scripts: Mutex<VecDeque<Vec<InternalEvent>>>,
    last: Mutex<Vec<InternalEvent>>,
    launch_error: Option<String>,
}

impl ScriptedRunner {
    pub fn new(events: Vec<InternalEvent>) -> Self {
        Self::with_scripts(vec![events])
    }

    pub fn with_scripts(scripts: Vec<Vec<InternalEvent>>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            last: Mutex::new(Vec::new()),
            launch_error: None,
        }
    }

    /// A runner whose every launch fails with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
            last: Mutex::new(Vec::new()),
            launch_error: Some(message.into()),
        }
    }

    fn next_script(&self) -> Result<Vec<InternalEvent>> {
        let mut scripts = self
            .scripts
            .lock()
            .map_err(|_| AguiError::Agent("scripted runner poisoned".into()))?;
        let mut last = self
            .last
            .lock()
            .map_err(|_| AguiError::Agent("scripted runner poisoned".into()))?;
        if let Some(script) = scripts.pop_front() {
            *last = script;
        }
        Ok(last.clone())
    }
}

#[async_trait]
impl AgentRunner for ScriptedRunner {
    async fn run(
        &self,
        _ctx: RunContext,
        _user_id: &str,
        _thread_id: &str,
        _message: Message,
    ) -> Result<InternalEventStream> {
        if let Some(message) = &self.launch_error {
            return Err(AguiError::Agent(message.clone()));
        }
        Ok(stream::iter(self.next_script()?).boxed())
    }
}

/// Streams the user's message back one word at a time.
#[derive(Debug, Clone, Default)]
pub struct EchoRunner;

#[async_trait]
impl AgentRunner for EchoRunner {
    async fn run(
        &self,
        ctx: RunContext,
        _user_id: &str,
        _thread_id: &str,
        message: Message,
    ) -> Result<InternalEventStream> {
        let id = format!("msg_{}", Uuid::new_v4().simple());
        let mut events: Vec<InternalEvent> = message
            .content
            .split_inclusive(' ')
            .map(|word| InternalEvent::chunk(&id, word))
            .collect();
        events.push(InternalEvent::completion(&id, message.content.clone()).with_done());

        Ok(stream::iter(events)
            .take_until(ctx.cancellation.cancelled_owned())
            .boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_runner_replays_scripts_in_order() {
        let runner = ScriptedRunner::with_scripts(vec![
            vec![InternalEvent::completion("a", "first").with_done()],
            vec![InternalEvent::completion("b", "second").with_done()],
        ]);
        let ctx = RunContext::new("t", "r");

        for expected in ["a", "b", "b"] {
            let events: Vec<_> = runner
                .run(ctx.clone(), "user", "t", Message::user("hi"))
                .await
                .unwrap()
                .collect()
                .await;
            assert_eq!(events[0].id, expected);
        }
    }

    #[tokio::test]
    async fn failing_runner_rejects_launch() {
        let runner = ScriptedRunner::failing("no model");
        let err = runner
            .run(RunContext::new("t", "r"), "user", "t", Message::user("hi"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AguiError::Agent(msg) if msg == "no model"));
    }

    #[tokio::test]
    async fn echo_runner_streams_words_then_completes() {
        let events: Vec<_> = EchoRunner
            .run(RunContext::new("t", "r"), "user", "t", Message::user("hello big world"))
            .await
            .unwrap()
            .collect()
            .await;

        assert_eq!(events.len(), 4);
        assert_eq!(events[1].choices[0].delta.content, "big ");
        assert!(events.iter().all(|ev| ev.id == events[0].id));
        assert!(events[3].done);
        assert_eq!(events[3].choices[0].message.content, "hello big world");
    }

    #[tokio::test]
    async fn echo_runner_stops_when_cancelled() {
        let ctx = RunContext::new("t", "r");
        ctx.cancellation.cancel();
        let events: Vec<_> = EchoRunner
            .run(ctx, "user", "t", Message::user("a b c"))
            .await
            .unwrap()
            .collect()
            .await;
        assert!(events.is_empty());
    }
}
