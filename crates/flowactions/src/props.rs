use crate::{invalid_type, require_str};
use async_trait::async_trait;
use flowcore::{ActionDefinition, ActionHandler, ConfigSchema, ExecutionContext, FlowModel, Params, StepError, Value};
use serde_json::json;
use std::sync::Arc;

/// Copy every merged parameter onto the model's props
pub struct SetPropsAction;

#[async_trait]
impl ActionHandler for SetPropsAction {
    async fn execute(
        &self,
        _ctx: &ExecutionContext,
        model: &FlowModel,
        params: Params,
    ) -> Result<Value, StepError> {
        let keys = params.len();
        model.set_props(params);
        Ok(Value::from(keys as i64))
    }
}

/// Add `step` to the numeric prop named by `key`; a missing prop counts as 0
pub struct IncrementPropAction;

#[async_trait]
impl ActionHandler for IncrementPropAction {
    async fn execute(
        &self,
        _ctx: &ExecutionContext,
        model: &FlowModel,
        params: Params,
    ) -> Result<Value, StepError> {
        let key = require_str(&params, "key")?;
        let step = match params.get("step") {
            Some(value) => value.as_f64().ok_or_else(|| invalid_type("step", "number", value))?,
            None => 1.0,
        };

        let current = match model.prop(key) {
            None | Some(Value::Null) => 0.0,
            Some(value) => value.as_f64().ok_or_else(|| invalid_type(key, "number", &value))?,
        };

        let next = current + step;
        model.set_prop(key, next);
        Ok(Value::from(next))
    }
}

/// Flip the boolean prop named by `key`; a missing prop counts as false
pub struct TogglePropAction;

#[async_trait]
impl ActionHandler for TogglePropAction {
    async fn execute(
        &self,
        _ctx: &ExecutionContext,
        model: &FlowModel,
        params: Params,
    ) -> Result<Value, StepError> {
        let key = require_str(&params, "key")?;
        let current = match model.prop(key) {
            None | Some(Value::Null) => false,
            Some(value) => value.as_bool().ok_or_else(|| invalid_type(key, "bool", &value))?,
        };

        model.set_prop(key, !current);
        Ok(Value::from(!current))
    }
}

pub(crate) fn set_definition() -> ActionDefinition {
    ActionDefinition::new("props.set", Arc::new(SetPropsAction)).with_title("Set props")
}

pub(crate) fn increment_definition() -> ActionDefinition {
    ActionDefinition::new("props.increment", Arc::new(IncrementPropAction))
        .with_title("Increment prop")
        .with_default_params(flowcore::params! { "key" => "count", "step" => 1 })
        .with_config_schema(
            ConfigSchema::new()
                .with_field("key", json!({ "type": "string", "title": "Prop", "x-component": "Input" }))
                .with_field("step", json!({ "type": "number", "title": "Step", "x-component": "InputNumber" })),
        )
}

pub(crate) fn toggle_definition() -> ActionDefinition {
    ActionDefinition::new("props.toggle", Arc::new(TogglePropAction))
        .with_title("Toggle prop")
        .with_config_schema(
            ConfigSchema::new().with_field("key", json!({ "type": "string", "title": "Prop", "x-component": "Input" })),
        )
}
