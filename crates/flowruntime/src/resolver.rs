use crate::registry::ActionRegistry;
use flowcore::{
    merge_params, ActionDefinition, ActionHandler, ConfigSchema, FlowModel, Params, StepDefinition,
    StepSource,
};
use parking_lot::RwLock;
use std::sync::Arc;

/// A step ready to run: handler plus fully merged parameters and schema
#[derive(Clone)]
pub struct ResolvedStep {
    pub key: String,
    pub title: Option<String>,
    pub action: Option<String>,
    pub handler: Arc<dyn ActionHandler>,
    pub params: Params,
    pub config_schema: ConfigSchema,
}

/// Result of resolving one step
pub enum StepResolution {
    Ready(ResolvedStep),
    /// The step references an action that is not registered; it runs as a no-op
    Inert { step_key: String, reason: String },
}

/// Turns step definitions into executable steps against the action registry
#[derive(Clone)]
pub struct StepResolver {
    actions: Arc<RwLock<ActionRegistry>>,
}

impl StepResolver {
    pub fn new(actions: Arc<RwLock<ActionRegistry>>) -> Self {
        Self { actions }
    }

    /// Resolve `step` of `flow_key` for `model`.
    ///
    /// Parameters layer, lowest first: action defaults, step defaults, the
    /// instance's stored override, then invocation params.
    pub fn resolve(
        &self,
        step: &StepDefinition,
        model: &FlowModel,
        flow_key: &str,
        invocation: &Params,
    ) -> StepResolution {
        let (action, handler) = match &step.source {
            StepSource::Use(name) => match self.lookup(name) {
                Some(action) => {
                    let handler = Arc::clone(&action.handler);
                    (Some(action), handler)
                }
                None => {
                    return StepResolution::Inert {
                        step_key: step.key.clone(),
                        reason: format!("action '{}' is not registered", name),
                    }
                }
            },
            StepSource::Inline(handler) => (None, Arc::clone(handler)),
        };

        let stored = model.step_params(flow_key, &step.key);
        let params = merge_step_params(action.as_deref(), step, stored.as_ref(), invocation);

        StepResolution::Ready(ResolvedStep {
            key: step.key.clone(),
            title: step.title.clone().or_else(|| action.as_ref().and_then(|a| a.title.clone())),
            action: step.action_name().map(str::to_string),
            handler,
            params,
            config_schema: merge_step_schema(action.as_deref(), step),
        })
    }

    /// Schema a settings form should render for `step`
    pub fn config_schema(&self, step: &StepDefinition) -> ConfigSchema {
        let action = step.action_name().and_then(|name| self.lookup(name));
        merge_step_schema(action.as_deref(), step)
    }

    /// Defaults a settings form should start from (no instance or invocation layer)
    pub fn default_params(&self, step: &StepDefinition) -> Params {
        let action = step.action_name().and_then(|name| self.lookup(name));
        merge_step_params(action.as_deref(), step, None, &Params::new())
    }

    fn lookup(&self, name: &str) -> Option<Arc<ActionDefinition>> {
        self.actions.read().get(name)
    }
}

/// Shallow per-key merge of the four parameter layers
pub fn merge_step_params(
    action: Option<&ActionDefinition>,
    step: &StepDefinition,
    stored: Option<&Params>,
    invocation: &Params,
) -> Params {
    let empty = Params::new();
    merge_params([
        action.map_or(&empty, |a| &a.default_params),
        &step.default_params,
        stored.unwrap_or(&empty),
        invocation,
    ])
}

/// Step schema fields refined over the action's
pub fn merge_step_schema(action: Option<&ActionDefinition>, step: &StepDefinition) -> ConfigSchema {
    match action {
        Some(action) => action.config_schema.merged_with(&step.config_schema),
        None => step.config_schema.clone(),
    }
}
