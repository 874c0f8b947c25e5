use crate::{ExecutionId, FlowModel, Params, Result, Value};
use async_trait::async_trait;
use std::collections::HashMap;

/// Execution entry points a model instance can reach back into
#[async_trait]
pub trait FlowDispatcher: Send + Sync {
    async fn apply_flow(&self, model: &FlowModel, flow_key: &str, params: Params) -> Result<FlowRun>;

    async fn dispatch_event(
        &self,
        model: &FlowModel,
        event_name: &str,
        payload: Params,
    ) -> Result<DispatchReport>;
}

/// Result of one flow invocation
#[derive(Debug, Clone)]
pub struct FlowRun {
    pub execution_id: ExecutionId,
    pub flow_key: String,
    pub completed_steps: Vec<String>,
    pub skipped_steps: Vec<String>,
    /// Step key -> whatever the handler returned
    pub outputs: HashMap<String, Value>,
}

impl FlowRun {
    pub fn output(&self, step_key: &str) -> Option<&Value> {
        self.outputs.get(step_key)
    }
}

/// Result of dispatching one event to a model
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    pub event: String,
    pub runs: Vec<FlowRun>,
}

impl DispatchReport {
    pub fn is_noop(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn flow_keys(&self) -> Vec<&str> {
        self.runs.iter().map(|r| r.flow_key.as_str()).collect()
    }
}
