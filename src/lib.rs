//! AG-UI streaming bridge for agent runners.
//!
//! The crate sits between an agent-execution layer and an HTTP client:
//! - [`InputAdapter`] decodes a run request into a [`RunInput`].
//! - [`Runner`] validates the request, launches an [`AgentRunner`] and streams
//!   its internal events through [`TranslateCallbacks`] and a [`Translator`].
//! - [`DefaultTranslator`] maps internal events onto AG-UI [`WireEvent`]s.
//! - With the `server` feature, [`SseService`] and [`Server`] expose runs as
//!   server-sent events over axum.

mod agent;
mod callbacks;
mod config;
mod error;
mod event;
mod input;
mod message;
mod planning;
mod runner;
#[cfg(feature = "server")]
mod server;
#[cfg(feature = "server")]
mod service;
mod telemetry;
mod translator;
mod wire;

pub use agent::{AgentRunner, EchoRunner, InternalEventStream, ScriptedRunner};
pub use callbacks::{
    AfterTranslateCallback, BeforeTranslateCallback, RunEndCallback, TranslateCallbacks,
};
pub use config::{AppConfig, LoggingConfig, RunnerConfig, ServerConfig};
pub use error::{AguiError, Result};
pub use event::{ChatMessage, Choice, EventError, InternalEvent, ObjectKind, ToolCall};
pub use input::{InputAdapter, RunInput};
pub use message::{Message, Role};
pub use planning::{planning_translator_factory, PlanningTranslator, PLANNER_SECTION_EVENT};
pub use runner::{
    DefaultUserIdResolver, ProtocolRunner, RunContext, RunOutcome, RunPhase, Runner, UserIdResolver,
    WireEventStream, DEFAULT_CHANNEL_CAPACITY, DEFAULT_USER_ID,
};
#[cfg(feature = "server")]
pub use server::{Server, ServerBuilder};
#[cfg(feature = "server")]
pub use service::{sse_service_factory, ServiceFactory, SseService};
pub use telemetry::{init_tracing, TraceAggregator, TraceRecord};
pub use translator::{
    default_translator_factory, DefaultTranslator, Translator, TranslatorFactory, TranslatorState,
};
pub use wire::{BaseEvent, WireEvent};
