//! Standard action library
//!
//! Collection of built-in actions that flows can reference through `use`

mod debug;
mod flow;
mod props;
mod time;

pub use debug::DebugLogAction;
pub use flow::{ApplyFlowAction, DispatchEventAction};
pub use props::{IncrementPropAction, SetPropsAction, TogglePropAction};
pub use time::DelayAction;

use flowcore::{Params, StepError, Value};
use flowruntime::FlowEngine;

/// Register all standard actions with an engine
pub fn register_all(engine: &FlowEngine) {
    engine.register_action(debug::definition());
    engine.register_action(flow::apply_definition());
    engine.register_action(flow::dispatch_definition());
    engine.register_action(props::set_definition());
    engine.register_action(props::increment_definition());
    engine.register_action(props::toggle_definition());
    engine.register_action(time::definition());
}

/// Get a required parameter or fail the step
pub(crate) fn require_param<'a>(params: &'a Params, name: &str) -> Result<&'a Value, StepError> {
    params
        .get(name)
        .filter(|v| !v.is_null())
        .ok_or_else(|| StepError::MissingParam(name.to_string()))
}

pub(crate) fn require_str<'a>(params: &'a Params, name: &str) -> Result<&'a str, StepError> {
    let value = require_param(params, name)?;
    value.as_str().ok_or_else(|| invalid_type(name, "string", value))
}

/// Optional object parameter, `{}` when absent
pub(crate) fn object_param(params: &Params, name: &str) -> Result<Params, StepError> {
    match params.get(name) {
        None | Some(Value::Null) => Ok(Params::new()),
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(other) => Err(invalid_type(name, "object", other)),
    }
}

pub(crate) fn invalid_type(field: &str, expected: &str, actual: &Value) -> StepError {
    StepError::InvalidParamType {
        field: field.to_string(),
        expected: expected.to_string(),
        actual: actual.type_name().to_string(),
    }
}
