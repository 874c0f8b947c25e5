use crate::{EventEmitter, ExecutionId, Params};
use tokio_util::sync::CancellationToken;

/// What started a flow invocation
#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    /// Direct `apply_flow` call
    Manual,
    /// A model raised `name`; `payload` is what it raised it with
    Event { name: String, payload: Params },
}

impl Trigger {
    pub fn label(&self) -> String {
        match self {
            Trigger::Manual => "manual".to_string(),
            Trigger::Event { name, .. } => format!("event:{}", name),
        }
    }

    pub fn event_name(&self) -> Option<&str> {
        match self {
            Trigger::Event { name, .. } => Some(name),
            Trigger::Manual => None,
        }
    }
}

/// Per-invocation context, built once and shared by every step of one run
#[derive(Clone)]
pub struct ExecutionContext {
    pub execution_id: ExecutionId,
    pub flow_key: String,
    pub model_uid: String,
    pub trigger: Trigger,

    /// Event emitter for progress and diagnostics
    pub events: EventEmitter,

    /// Checked by the executor between steps; long-running handlers may poll it too
    pub cancellation: CancellationToken,
}

impl ExecutionContext {
    pub fn is_event_triggered(&self) -> bool {
        matches!(self.trigger, Trigger::Event { .. })
    }

    pub fn event_payload(&self) -> Option<&Params> {
        match &self.trigger {
            Trigger::Event { payload, .. } => Some(payload),
            Trigger::Manual => None,
        }
    }
}
