use async_trait::async_trait;
use flowcore::{ActionDefinition, ActionHandler, ConfigSchema, ExecutionContext, FlowModel, Params, StepError, Value};
use serde_json::json;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

/// Suspend the flow for a specified duration
pub struct DelayAction;

#[async_trait]
impl ActionHandler for DelayAction {
    async fn execute(
        &self,
        ctx: &ExecutionContext,
        _model: &FlowModel,
        params: Params,
    ) -> Result<Value, StepError> {
        let delay_ms = match params.get("delay_ms") {
            Some(value) => value
                .as_f64()
                .filter(|ms| *ms >= 0.0)
                .ok_or_else(|| crate::invalid_type("delay_ms", "non-negative number", value))?
                as u64,
            None => 1000,
        };

        ctx.events.info(format!("Delaying for {}ms", delay_ms));

        tokio::select! {
            _ = sleep(Duration::from_millis(delay_ms)) => Ok(Value::Null),
            _ = ctx.cancellation.cancelled() => Err(StepError::Cancelled),
        }
    }
}

pub(crate) fn definition() -> ActionDefinition {
    ActionDefinition::new("time.delay", Arc::new(DelayAction))
        .with_title("Delay")
        .with_default_params(flowcore::params! { "delay_ms" => 1000 })
        .with_config_schema(ConfigSchema::new().with_field(
            "delay_ms",
            json!({ "type": "number", "title": "Delay", "x-component": "InputNumber", "x-component-props": { "addonAfter": "ms" } }),
        ))
}
