use crate::{ActionHandler, ConfigSchema, Params, RegistryError};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Event that automatically triggers a flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventBinding {
    pub event_name: String,
}

/// Ordered set of steps attached to a model class
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowDefinition {
    pub key: String,
    #[serde(default)]
    pub title: Option<String>,
    pub steps: Vec<StepDefinition>,
    #[serde(default)]
    pub on: Option<EventBinding>,

    /// Applied by `apply_auto_flows` when a host first brings the model up
    #[serde(default)]
    pub auto_apply: bool,
}

impl FlowDefinition {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            title: None,
            steps: Vec::new(),
            on: None,
            auto_apply: false,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn on_event(mut self, event_name: impl Into<String>) -> Self {
        self.on = Some(EventBinding {
            event_name: event_name.into(),
        });
        self
    }

    pub fn auto_apply(mut self) -> Self {
        self.auto_apply = true;
        self
    }

    pub fn step(mut self, step: StepDefinition) -> Self {
        self.steps.push(step);
        self
    }

    pub fn find_step(&self, key: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.key == key)
    }

    pub fn is_bound_to(&self, event_name: &str) -> bool {
        self.on
            .as_ref()
            .map_or(false, |binding| binding.event_name == event_name)
    }

    /// Step keys address per-instance overrides, so they must be unique
    pub fn validate(&self) -> Result<(), RegistryError> {
        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.key.as_str()) {
                return Err(RegistryError::DuplicateStep {
                    flow_key: self.key.clone(),
                    step_key: step.key.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Where a step's behavior comes from
#[derive(Clone)]
pub enum StepSource {
    /// Delegate to a registered action by name
    Use(String),
    /// Self-contained handler
    Inline(Arc<dyn ActionHandler>),
}

impl fmt::Debug for StepSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepSource::Use(name) => f.debug_tuple("Use").field(name).finish(),
            StepSource::Inline(_) => f.write_str("Inline(..)"),
        }
    }
}

/// One element of a flow
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "StepSpec")]
pub struct StepDefinition {
    pub key: String,
    pub title: Option<String>,
    pub source: StepSource,
    pub default_params: Params,
    pub config_schema: ConfigSchema,
}

impl StepDefinition {
    /// Step delegating to the action registered as `action`
    pub fn uses(key: impl Into<String>, action: impl Into<String>) -> Self {
        Self::with_source(key, StepSource::Use(action.into()))
    }

    /// Step carrying its own handler
    pub fn inline(key: impl Into<String>, handler: Arc<dyn ActionHandler>) -> Self {
        Self::with_source(key, StepSource::Inline(handler))
    }

    fn with_source(key: impl Into<String>, source: StepSource) -> Self {
        Self {
            key: key.into(),
            title: None,
            source,
            default_params: Params::new(),
            config_schema: ConfigSchema::default(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_default_params(mut self, params: Params) -> Self {
        self.default_params = params;
        self
    }

    pub fn with_config_schema(mut self, schema: ConfigSchema) -> Self {
        self.config_schema = schema;
        self
    }

    /// Name of the referenced action, for `use` steps
    pub fn action_name(&self) -> Option<&str> {
        match &self.source {
            StepSource::Use(name) => Some(name),
            StepSource::Inline(_) => None,
        }
    }
}

/// Serialized form of a step. Inline handlers cannot be loaded from data.
#[derive(Deserialize)]
struct StepSpec {
    key: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(rename = "use", default)]
    use_action: Option<String>,
    #[serde(default)]
    default_params: Params,
    #[serde(default)]
    config_schema: ConfigSchema,
}

impl TryFrom<StepSpec> for StepDefinition {
    type Error = String;

    fn try_from(spec: StepSpec) -> Result<Self, Self::Error> {
        let action = spec
            .use_action
            .ok_or_else(|| format!("step '{}' must name an action with `use`", spec.key))?;
        Ok(StepDefinition {
            key: spec.key,
            title: spec.title,
            source: StepSource::Use(action),
            default_params: spec.default_params,
            config_schema: spec.config_schema,
        })
    }
}

impl Serialize for StepDefinition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("StepDefinition", 5)?;
        state.serialize_field("key", &self.key)?;
        state.serialize_field("title", &self.title)?;
        match &self.source {
            StepSource::Use(name) => state.serialize_field("use", name)?,
            StepSource::Inline(_) => state.serialize_field("inline", &true)?,
        }
        state.serialize_field("default_params", &self.default_params)?;
        state.serialize_field("config_schema", &self.config_schema)?;
        state.end()
    }
}
