use std::sync::Arc;

use crate::error::Result;
use crate::event::InternalEvent;
use crate::runner::{RunContext, RunOutcome};
use crate::wire::WireEvent;

/// Runs before an internal event reaches the translator. Returning `Some`
/// replaces the event.
pub type BeforeTranslateCallback =
    Arc<dyn Fn(&RunContext, &InternalEvent) -> Result<Option<InternalEvent>> + Send + Sync>;

/// Runs on every wire event the translator produces. Returning `Some`
/// replaces the event.
pub type AfterTranslateCallback =
    Arc<dyn Fn(&RunContext, &WireEvent) -> Result<Option<WireEvent>> + Send + Sync>;

/// Runs once per run after its last event was handed to the consumer, on
/// every exit path.
pub type RunEndCallback = Arc<dyn Fn(&RunContext, &RunOutcome) + Send + Sync>;

/// Ordered hook chains around the translator.
///
/// Within one chain the first callback returning a replacement wins and the
/// remaining callbacks are skipped. Any error aborts the run. Run-end
/// callbacks all run, in registration order.
#[derive(Clone, Default)]
pub struct TranslateCallbacks {
    before: Vec<BeforeTranslateCallback>,
    after: Vec<AfterTranslateCallback>,
    run_end: Vec<RunEndCallback>,
}

impl std::fmt::Debug for TranslateCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranslateCallbacks")
            .field("before", &self.before.len())
            .field("after", &self.after.len())
            .field("run_end", &self.run_end.len())
            .finish()
    }
}

impl TranslateCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_before(
        mut self,
        callback: impl Fn(&RunContext, &InternalEvent) -> Result<Option<InternalEvent>>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.before.push(Arc::new(callback));
        self
    }

    pub fn register_after(
        mut self,
        callback: impl Fn(&RunContext, &WireEvent) -> Result<Option<WireEvent>> + Send + Sync + 'static,
    ) -> Self {
        self.after.push(Arc::new(callback));
        self
    }

    pub fn register_run_end(
        mut self,
        callback: impl Fn(&RunContext, &RunOutcome) + Send + Sync + 'static,
    ) -> Self {
        self.run_end.push(Arc::new(callback));
        self
    }

    pub fn run_before(&self, ctx: &RunContext, event: InternalEvent) -> Result<InternalEvent> {
        for callback in &self.before {
            if let Some(replacement) = callback(ctx, &event)? {
                return Ok(replacement);
            }
        }
        Ok(event)
    }

    pub fn run_after(&self, ctx: &RunContext, event: WireEvent) -> Result<WireEvent> {
        for callback in &self.after {
            if let Some(replacement) = callback(ctx, &event)? {
                return Ok(replacement);
            }
        }
        Ok(event)
    }

    pub fn run_end(&self, ctx: &RunContext, outcome: &RunOutcome) {
        for callback in &self.run_end {
            callback(ctx, outcome);
        }
    }
}
