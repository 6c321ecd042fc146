//! Event system for run lifecycle hooks.
//!
//! Provides an optional, non-intrusive way to observe pipeline execution.
//! The executor emits events when a run starts, when each step starts and
//! finishes, and when the run reaches a terminal state. Handlers cannot
//! influence control flow.

use crate::types::ExecutionStatus;
use std::sync::Arc;
use uuid::Uuid;

/// Events emitted during pipeline execution.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A run record was created in `Running`.
    RunStarted {
        run_id: Uuid,
        pipeline_id: Uuid,
    },
    /// A step record was written and generation is about to be invoked.
    ///
    /// Not emitted for a step whose prompt could not be built; that step
    /// only produces [`Event::StepFinished`] with `ok: false`.
    StepStarted {
        run_id: Uuid,
        step_order: u32,
        provider: String,
        model: String,
    },
    /// A step record reached a terminal state.
    StepFinished {
        run_id: Uuid,
        step_order: u32,
        /// Whether the step completed.
        ok: bool,
    },
    /// The run reached a terminal state.
    RunFinished {
        run_id: Uuid,
        status: ExecutionStatus,
    },
}

/// Handler for run lifecycle events.
///
/// # Example
///
/// ```
/// use prompt_pipeline::events::{Event, EventHandler};
///
/// struct PrintHandler;
///
/// impl EventHandler for PrintHandler {
///     fn on_event(&self, event: Event) {
///         match event {
///             Event::StepStarted { step_order, .. } => println!("[step {}]", step_order),
///             Event::RunFinished { status, .. } => println!("[done] {:?}", status),
///             _ => {}
///         }
///     }
/// }
/// ```
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: Event);
}

/// Emit an event if a handler is present. No-op otherwise.
pub(crate) fn emit(handler: &Option<Arc<dyn EventHandler>>, event: Event) {
    if let Some(ref h) = handler {
        h.on_event(event);
    }
}

/// An [`EventHandler`] backed by a closure.
pub struct FnEventHandler<F: Fn(Event) + Send + Sync>(pub F);

impl<F: Fn(Event) + Send + Sync> EventHandler for FnEventHandler<F> {
    fn on_event(&self, event: Event) {
        (self.0)(event);
    }
}
