use async_trait::async_trait;
use flowcore::{ActionDefinition, ActionHandler, ExecutionContext, FlowModel, Params, StepError, Value};
use std::sync::Arc;

/// Logs its parameters and the model's props for debugging
pub struct DebugLogAction;

#[async_trait]
impl ActionHandler for DebugLogAction {
    async fn execute(
        &self,
        ctx: &ExecutionContext,
        model: &FlowModel,
        params: Params,
    ) -> Result<Value, StepError> {
        let message = params
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("(no message)");

        ctx.events.info(format!("DEBUG: {}", message));
        tracing::debug!(flow = %ctx.flow_key, model = %model.uid(), "{}", message);

        // Also log props for visibility
        let props = serde_json::to_string(&model.props())
            .map_err(|e| StepError::ExecutionFailed(format!("Props serialization error: {}", e)))?;
        ctx.events.info(format!("  props: {}", props));

        Ok(Value::from(message))
    }
}

pub(crate) fn definition() -> ActionDefinition {
    ActionDefinition::new("debug.log", Arc::new(DebugLogAction))
        .with_title("Log debug message")
}
