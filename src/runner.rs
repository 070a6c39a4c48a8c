//! Orchestration of one AG-UI run.
//!
//! [`Runner`] validates the request, resolves who is acting, launches the
//! inner [`AgentRunner`] and pumps every internal event through the callback
//! chains and the translator. Each run is driven by its own tokio task that
//! hands wire events to the caller over a bounded channel, so a slow consumer
//! suspends the producer instead of growing a buffer.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agent::{AgentRunner, InternalEventStream};
use crate::callbacks::TranslateCallbacks;
use crate::error::{AguiError, Result};
use crate::input::RunInput;
use crate::message::Role;
use crate::translator::{default_translator_factory, Translator, TranslatorFactory};
use crate::wire::WireEvent;

pub const DEFAULT_USER_ID: &str = "user";
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Wire events of one run, in delivery order.
pub type WireEventStream = BoxStream<'static, WireEvent>;

/// Request-scoped context handed to collaborators.
///
/// `cancellation` fires once nobody is left to receive the run's events.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub thread_id: String,
    pub run_id: String,
    pub cancellation: CancellationToken,
}

impl RunContext {
    pub fn new(thread_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            run_id: run_id.into(),
            cancellation: CancellationToken::new(),
        }
    }

    pub fn for_input(input: &RunInput) -> Self {
        Self::new(input.thread_id.clone(), input.run_id.clone())
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

#[async_trait]
pub trait UserIdResolver: Send + Sync {
    async fn resolve(&self, ctx: &RunContext, input: &RunInput) -> Result<String>;
}

/// Resolves every run to the same identity.
#[derive(Debug, Clone)]
pub struct DefaultUserIdResolver {
    user_id: String,
}

impl DefaultUserIdResolver {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

impl Default for DefaultUserIdResolver {
    fn default() -> Self {
        Self::new(DEFAULT_USER_ID)
    }
}

#[async_trait]
impl UserIdResolver for DefaultUserIdResolver {
    async fn resolve(&self, _ctx: &RunContext, _input: &RunInput) -> Result<String> {
        Ok(self.user_id.clone())
    }
}

/// Anything able to turn a run request into a stream of wire events.
#[async_trait]
pub trait ProtocolRunner: Send + Sync {
    async fn run(&self, ctx: RunContext, input: RunInput) -> Result<WireEventStream>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Started,
    Streaming,
    Finished,
    Errored,
}

/// How a run ended, as reported to run-end callbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The inner stream ended or a `RUN_FINISHED` was delivered.
    Completed,
    /// A `RUN_ERROR` carrying this message was delivered.
    Failed(String),
    /// The consumer went away before the run ended.
    Abandoned,
}

pub struct Runner {
    agent: Option<Arc<dyn AgentRunner>>,
    translator_factory: TranslatorFactory,
    user_id_resolver: Arc<dyn UserIdResolver>,
    callbacks: TranslateCallbacks,
    channel_capacity: usize,
}

impl Runner {
    pub fn new(agent: Arc<dyn AgentRunner>) -> Self {
        Self::from_parts(Some(agent))
    }

    /// A runner with no agent attached; every run is rejected.
    pub fn detached() -> Self {
        Self::from_parts(None)
    }

    fn from_parts(agent: Option<Arc<dyn AgentRunner>>) -> Self {
        Self {
            agent,
            translator_factory: default_translator_factory(),
            user_id_resolver: Arc::new(DefaultUserIdResolver::default()),
            callbacks: TranslateCallbacks::default(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    pub fn with_translator_factory(mut self, factory: TranslatorFactory) -> Self {
        self.translator_factory = factory;
        self
    }

    pub fn with_user_id_resolver(mut self, resolver: Arc<dyn UserIdResolver>) -> Self {
        self.user_id_resolver = resolver;
        self
    }

    pub fn with_translate_callbacks(mut self, callbacks: TranslateCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }
}

#[async_trait]
impl ProtocolRunner for Runner {
    async fn run(&self, ctx: RunContext, input: RunInput) -> Result<WireEventStream> {
        let agent = self.agent.clone().ok_or(AguiError::RunnerNotConfigured)?;
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let task = RunTask {
            translator: (self.translator_factory)(&input),
            ctx,
            input,
            agent,
            resolver: Arc::clone(&self.user_id_resolver),
            callbacks: self.callbacks.clone(),
            tx,
            phase: RunPhase::Idle,
            last_error: None,
        };
        tokio::spawn(task.drive());
        Ok(ReceiverStream::new(rx).boxed())
    }
}

/// The consumer dropped its end of the channel.
struct Disconnected;

struct RunTask {
    ctx: RunContext,
    input: RunInput,
    agent: Arc<dyn AgentRunner>,
    translator: Box<dyn Translator>,
    resolver: Arc<dyn UserIdResolver>,
    callbacks: TranslateCallbacks,
    tx: mpsc::Sender<WireEvent>,
    phase: RunPhase,
    last_error: Option<String>,
}

impl RunTask {
    async fn drive(mut self) {
        let outcome = match self.execute().await {
            Ok(()) => {
                info!(
                    thread_id = %self.ctx.thread_id,
                    run_id = %self.ctx.run_id,
                    phase = ?self.phase,
                    "run stream closed"
                );
                match self.last_error.take() {
                    Some(message) => RunOutcome::Failed(message),
                    None => RunOutcome::Completed,
                }
            }
            Err(Disconnected) => {
                debug!(
                    thread_id = %self.ctx.thread_id,
                    run_id = %self.ctx.run_id,
                    phase = ?self.phase,
                    "event consumer went away, abandoning run"
                );
                RunOutcome::Abandoned
            }
        };
        // Runs before `tx` drops, so consumers see the hook's effects once
        // the stream ends.
        self.callbacks.run_end(&self.ctx, &outcome);
    }

    async fn execute(&mut self) -> std::result::Result<(), Disconnected> {
        self.emit(WireEvent::run_started(
            &self.input.thread_id,
            &self.input.run_id,
            self.input.parent_run_id.clone(),
        ))
        .await?;
        info!(
            thread_id = %self.ctx.thread_id,
            run_id = %self.ctx.run_id,
            messages = self.input.messages.len(),
            "run started"
        );

        let Some(message) = self.input.last_message().cloned() else {
            return self.fail("no messages provided").await;
        };
        let user_id = match self.resolver.resolve(&self.ctx, &self.input).await {
            Ok(user_id) => user_id,
            Err(err) => return self.fail(format!("resolve user id: {err}")).await,
        };
        if message.role != Role::User {
            return self.fail("last message is not a user message").await;
        }

        let events = match self
            .agent
            .run(self.ctx.clone(), &user_id, &self.input.thread_id, message)
            .await
        {
            Ok(events) => events,
            Err(err) => return self.fail(format!("run agent: {err}")).await,
        };
        self.pump(events).await
    }

    async fn pump(&mut self, mut events: InternalEventStream) -> std::result::Result<(), Disconnected> {
        self.phase = RunPhase::Streaming;
        while let Some(event) = events.next().await {
            let event = match self.callbacks.run_before(&self.ctx, event) {
                Ok(event) => event,
                Err(err) => return self.fail(format!("before translate callback: {err}")).await,
            };
            let translated = match self.translator.translate(&event) {
                Ok(translated) => translated,
                Err(err) => return self.fail(format!("translate event: {err}")).await,
            };
            let mut terminal = false;
            for wire in translated {
                let wire = match self.callbacks.run_after(&self.ctx, wire) {
                    Ok(wire) => wire,
                    Err(err) => return self.fail(format!("after translate callback: {err}")).await,
                };
                terminal |= wire.is_terminal();
                self.emit(wire).await?;
            }
            if terminal {
                debug!(
                    run_id = %self.ctx.run_id,
                    phase = ?self.phase,
                    "terminal event delivered, dropping remaining agent events"
                );
                break;
            }
        }
        Ok(())
    }

    async fn fail(&mut self, message: impl Into<String>) -> std::result::Result<(), Disconnected> {
        let message = message.into();
        warn!(
            thread_id = %self.ctx.thread_id,
            run_id = %self.ctx.run_id,
            error = %message,
            "run failed"
        );
        self.emit(WireEvent::run_error(message, None)).await
    }

    async fn emit(&mut self, event: WireEvent) -> std::result::Result<(), Disconnected> {
        self.phase = match &event {
            WireEvent::RunStarted { .. } => RunPhase::Started,
            WireEvent::RunFinished { .. } => RunPhase::Finished,
            WireEvent::RunError { message, .. } => {
                self.last_error = Some(message.clone());
                RunPhase::Errored
            }
            _ => self.phase,
        };
        let event = event.with_timestamp(WireEvent::now_millis());
        if self.tx.send(event).await.is_err() {
            self.ctx.cancellation.cancel();
            return Err(Disconnected);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::ScriptedRunner;
    use crate::event::InternalEvent;
    use crate::message::Message;

    fn input(messages: Vec<Message>) -> RunInput {
        RunInput {
            messages,
            ..RunInput::new("t1", "r1")
        }
    }

    async fn collect(runner: &Runner, input: RunInput) -> Vec<WireEvent> {
        runner
            .run(RunContext::for_input(&input), input)
            .await
            .unwrap()
            .collect()
            .await
    }

    fn types(events: &[WireEvent]) -> Vec<&'static str> {
        events.iter().map(WireEvent::event_type).collect()
    }

    #[tokio::test]
    async fn detached_runner_rejects_before_streaming() {
        let err = Runner::detached()
            .run(RunContext::new("t", "r"), RunInput::new("t", "r"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AguiError::RunnerNotConfigured));
    }

    #[tokio::test]
    async fn empty_message_list_yields_started_then_error() {
        let runner = Runner::new(Arc::new(ScriptedRunner::new(vec![])));
        let events = collect(&runner, input(vec![])).await;

        assert_eq!(types(&events), vec!["RUN_STARTED", "RUN_ERROR"]);
        assert!(matches!(
            &events[1],
            WireEvent::RunError { message, .. } if message == "no messages provided"
        ));
    }

    #[tokio::test]
    async fn resolver_failures_become_run_errors() {
        struct Denied;

        #[async_trait]
        impl UserIdResolver for Denied {
            async fn resolve(&self, _ctx: &RunContext, _input: &RunInput) -> Result<String> {
                Err(AguiError::Resolve("anonymous".into()))
            }
        }

        let runner = Runner::new(Arc::new(ScriptedRunner::new(vec![])))
            .with_user_id_resolver(Arc::new(Denied));
        let events = collect(&runner, input(vec![Message::user("hi")])).await;

        assert_eq!(types(&events), vec!["RUN_STARTED", "RUN_ERROR"]);
        assert!(matches!(
            &events[1],
            WireEvent::RunError { message, .. } if message.starts_with("resolve user id:")
        ));
    }

    #[tokio::test]
    async fn run_end_callbacks_see_how_the_run_ended() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let callbacks = TranslateCallbacks::new().register_run_end(move |ctx, outcome| {
            let _ = tx.send((ctx.run_id.clone(), outcome.clone()));
        });
        let runner = Runner::new(Arc::new(ScriptedRunner::new(vec![
            InternalEvent::completion("m1", "ok").with_done(),
        ])))
        .with_translate_callbacks(callbacks);

        collect(&runner, input(vec![])).await;
        collect(&runner, input(vec![Message::user("hi")])).await;

        assert_eq!(
            rx.recv().await,
            Some(("r1".to_string(), RunOutcome::Failed("no messages provided".into())))
        );
        assert_eq!(rx.recv().await, Some(("r1".to_string(), RunOutcome::Completed)));
    }

    #[tokio::test]
    async fn stops_after_terminal_event() {
        let runner = Runner::new(Arc::new(ScriptedRunner::new(vec![
            InternalEvent::error("m1", "model down"),
            InternalEvent::completion("m2", "late").with_done(),
        ])));
        let events = collect(&runner, input(vec![Message::user("hi")])).await;

        assert_eq!(types(&events), vec!["RUN_STARTED", "RUN_ERROR"]);
    }

    #[tokio::test]
    async fn stamps_delivery_timestamps() {
        let runner = Runner::new(Arc::new(ScriptedRunner::new(vec![
            InternalEvent::completion("m1", "ok").with_done(),
        ])));
        let events = collect(&runner, input(vec![Message::user("hi")])).await;

        assert!(events.iter().all(|ev| {
            let value = serde_json::to_value(ev).unwrap();
            value.get("timestamp").and_then(|ts| ts.as_u64()).is_some()
        }));
    }

    #[tokio::test]
    async fn dropping_the_stream_cancels_the_context() {
        let runner = Runner::new(Arc::new(ScriptedRunner::new(
            (0..32)
                .map(|i| InternalEvent::chunk("m1", format!("part {i}")))
                .collect(),
        )))
        .with_channel_capacity(1);
        let ctx = RunContext::new("t1", "r1");
        let token = ctx.cancellation.clone();

        let mut stream = runner
            .run(ctx, input(vec![Message::user("hi")]))
            .await
            .unwrap();
        assert_eq!(stream.next().await.unwrap().event_type(), "RUN_STARTED");
        drop(stream);

        tokio::time::timeout(std::time::Duration::from_secs(5), token.cancelled())
            .await
            .unwrap();
    }
}
