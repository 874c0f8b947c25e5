use crate::{object_param, require_str};
use async_trait::async_trait;
use flowcore::{ActionDefinition, ActionHandler, ConfigSchema, ExecutionContext, FlowModel, Params, StepError, Value};
use serde_json::json;
use std::sync::Arc;

/// Apply another flow of the same model and wait for it
pub struct ApplyFlowAction;

#[async_trait]
impl ActionHandler for ApplyFlowAction {
    async fn execute(
        &self,
        ctx: &ExecutionContext,
        model: &FlowModel,
        params: Params,
    ) -> Result<Value, StepError> {
        let flow_key = require_str(&params, "flow")?;
        if flow_key == ctx.flow_key {
            return Err(StepError::ExecutionFailed(format!(
                "flow '{}' cannot apply itself",
                flow_key
            )));
        }
        let nested = object_param(&params, "params")?;

        let run = model
            .apply_flow(flow_key, nested)
            .await
            .map_err(|e| StepError::ExecutionFailed(e.to_string()))?;

        Ok(Value::from(run.completed_steps.len() as i64))
    }
}

/// Raise an event on the same model
pub struct DispatchEventAction;

#[async_trait]
impl ActionHandler for DispatchEventAction {
    async fn execute(
        &self,
        ctx: &ExecutionContext,
        model: &FlowModel,
        params: Params,
    ) -> Result<Value, StepError> {
        let event = require_str(&params, "event")?;
        if ctx.trigger.event_name() == Some(event) {
            return Err(StepError::ExecutionFailed(format!(
                "event '{}' cannot re-raise itself",
                event
            )));
        }
        let payload = object_param(&params, "payload")?;

        let report = model
            .dispatch_event(event, payload)
            .await
            .map_err(|e| StepError::ExecutionFailed(e.to_string()))?;

        Ok(Value::from(
            report
                .flow_keys()
                .into_iter()
                .map(Value::from)
                .collect::<Vec<_>>(),
        ))
    }
}

pub(crate) fn apply_definition() -> ActionDefinition {
    ActionDefinition::new("flow.apply", Arc::new(ApplyFlowAction))
        .with_title("Apply flow")
        .with_config_schema(
            ConfigSchema::new().with_field("flow", json!({ "type": "string", "title": "Flow", "x-component": "Input" })),
        )
}

pub(crate) fn dispatch_definition() -> ActionDefinition {
    ActionDefinition::new("event.dispatch", Arc::new(DispatchEventAction))
        .with_title("Dispatch event")
        .with_config_schema(
            ConfigSchema::new().with_field("event", json!({ "type": "string", "title": "Event", "x-component": "Input" })),
        )
}
