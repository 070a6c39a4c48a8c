use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::callbacks::TranslateCallbacks;
use crate::config::LoggingConfig;
use crate::error::{AguiError, Result};
use crate::runner::{RunContext, RunOutcome};
use crate::wire::WireEvent;

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured filter when it is set.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .map_err(|err| AguiError::Config(format!("invalid log filter: {err}")))?;
    let registry = tracing_subscriber::registry().with(filter);
    let installed = if config.json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    installed.map_err(|err| AguiError::Config(format!("tracing already initialized: {err}")))
}

/// Everything observed for one run, exported once the run ends.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TraceRecord {
    pub thread_id: String,
    pub run_id: String,
    pub text: String,
    pub tool_calls: Vec<String>,
    pub error: Option<String>,
}

/// Aggregates streamed output per run for export to an observability
/// backend, without altering delivered events.
///
/// A record is exported when its run completes or fails and dropped when the
/// consumer abandons the run.
#[derive(Clone, Default)]
pub struct TraceAggregator {
    active: Arc<DashMap<String, TraceRecord>>,
    exported: Arc<Mutex<Vec<TraceRecord>>>,
}

impl TraceAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the aggregation hooks to `callbacks`.
    pub fn attach(&self, callbacks: TranslateCallbacks) -> TranslateCallbacks {
        let observer = self.clone();
        let finisher = self.clone();
        callbacks
            .register_after(move |ctx, event| {
                observer.observe(ctx, event);
                Ok(None)
            })
            .register_run_end(move |ctx, outcome| finisher.finish(ctx, outcome))
    }

    pub fn observe(&self, ctx: &RunContext, event: &WireEvent) {
        match event {
            WireEvent::TextMessageContent { delta, .. } => {
                self.entry(ctx).text.push_str(delta);
            }
            WireEvent::ToolCallStart { tool_call_name, .. } => {
                self.entry(ctx).tool_calls.push(tool_call_name.clone());
            }
            _ => {}
        }
    }

    pub fn finish(&self, ctx: &RunContext, outcome: &RunOutcome) {
        match outcome {
            RunOutcome::Completed => self.export(ctx, None),
            RunOutcome::Failed(message) => self.export(ctx, Some(message.clone())),
            RunOutcome::Abandoned => {
                if self.discard(&ctx.run_id).is_some() {
                    debug!(run_id = %ctx.run_id, "dropping trace of abandoned run");
                }
            }
        }
    }

    /// Runs still being aggregated.
    pub fn pending(&self) -> usize {
        self.active.len()
    }

    /// Drops the aggregation state of a run without exporting it.
    pub fn discard(&self, run_id: &str) -> Option<TraceRecord> {
        self.active.remove(run_id).map(|(_, record)| record)
    }

    pub fn drain(&self) -> Vec<TraceRecord> {
        match self.exported.lock() {
            Ok(mut exported) => std::mem::take(&mut *exported),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }

    fn entry(&self, ctx: &RunContext) -> dashmap::mapref::one::RefMut<'_, String, TraceRecord> {
        self.active
            .entry(ctx.run_id.clone())
            .or_insert_with(|| TraceRecord {
                thread_id: ctx.thread_id.clone(),
                run_id: ctx.run_id.clone(),
                ..TraceRecord::default()
            })
    }

    fn export(&self, ctx: &RunContext, error: Option<String>) {
        let mut record = self.discard(&ctx.run_id).unwrap_or_else(|| TraceRecord {
            thread_id: ctx.thread_id.clone(),
            run_id: ctx.run_id.clone(),
            ..TraceRecord::default()
        });
        record.error = error;
        info!(
            run_id = %record.run_id,
            chars = record.text.len(),
            tool_calls = record.tool_calls.len(),
            failed = record.error.is_some(),
            "exporting run trace"
        );
        match self.exported.lock() {
            Ok(mut exported) => exported.push(record),
            Err(poisoned) => poisoned.into_inner().push(record),
        }
    }
}
