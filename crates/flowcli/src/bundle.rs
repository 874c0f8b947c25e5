// crates/flowcli/src/bundle.rs

use anyhow::{bail, Context, Result};
use flowcore::{FlowDefinition, ModelClass, Params, StepDefinition, StepParams};
use flowruntime::{FlowEngine, ModelOptions, RuntimeConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A self-contained set of model classes plus the instance to run them on
#[derive(Debug, Serialize, Deserialize)]
pub struct Bundle {
    #[serde(default)]
    pub config: RuntimeConfig,
    pub classes: Vec<ClassSpec>,
    pub model: ModelSpec,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClassSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extends: Option<String>,
    #[serde(default)]
    pub flows: Vec<FlowDefinition>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModelSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(rename = "use")]
    pub class_name: String,
    #[serde(default)]
    pub step_params: StepParams,
}

impl Bundle {
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read bundle {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("invalid bundle {}", path.display()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Build an engine with the standard actions and every class registered.
    ///
    /// Classes are registered in file order, so a parent must appear before its children.
    pub fn engine(&self) -> Result<FlowEngine> {
        let engine = FlowEngine::with_config(self.config.clone());
        flowactions::register_all(&engine);

        for spec in &self.classes {
            let mut class = ModelClass::new(&spec.name);
            if let Some(parent) = &spec.extends {
                class = class.with_parent(parent);
            }
            for flow in &spec.flows {
                class = class.with_flow(flow.clone());
            }
            engine
                .register_model_class(class)
                .with_context(|| format!("cannot register model class '{}'", spec.name))?;
        }

        if !self.classes.iter().any(|c| c.name == self.model.class_name) {
            bail!("model uses unknown class '{}'", self.model.class_name);
        }
        Ok(engine)
    }

    pub fn model_options(&self) -> ModelOptions {
        let options = ModelOptions::new(&self.model.class_name).with_step_params(self.model.step_params.clone());
        match &self.model.uid {
            Some(uid) => options.with_uid(uid),
            None => options,
        }
    }

    /// Steps whose `use` names an action the engine does not know
    pub fn unknown_actions(&self, engine: &FlowEngine) -> Vec<(String, String, String)> {
        let mut unknown = Vec::new();
        for class in &self.classes {
            for flow in &class.flows {
                for step in &flow.steps {
                    if let Some(action) = step.action_name() {
                        if engine.get_action(action).is_none() {
                            unknown.push((flow.key.clone(), step.key.clone(), action.to_string()));
                        }
                    }
                }
            }
        }
        unknown
    }

    /// A counter that raises its own event, used by `flow init`
    pub fn example() -> Self {
        let mut step_params = StepParams::new();
        step_params
            .entry("increment".to_string())
            .or_default()
            .insert("inc".to_string(), flowcore::params! { "step" => 2 });

        Bundle {
            config: RuntimeConfig::default(),
            classes: vec![
                ClassSpec {
                    name: "Block".to_string(),
                    extends: None,
                    flows: vec![FlowDefinition::new("setup").auto_apply().step(
                        StepDefinition::uses("init", "props.set").with_default_params(flowcore::params! { "count" => 0 }),
                    )],
                },
                ClassSpec {
                    name: "Counter".to_string(),
                    extends: Some("Block".to_string()),
                    flows: vec![
                        FlowDefinition::new("increment")
                            .with_title("Increment")
                            .step(StepDefinition::uses("inc", "props.increment"))
                            .step(
                                StepDefinition::uses("notify", "event.dispatch")
                                    .with_default_params(flowcore::params! { "event" => "counter:changed" }),
                            ),
                        FlowDefinition::new("report").on_event("counter:changed").step(
                            StepDefinition::uses("log", "debug.log")
                                .with_default_params(flowcore::params! { "message" => "counter changed" }),
                        ),
                    ],
                },
            ],
            model: ModelSpec {
                uid: Some("counter-1".to_string()),
                class_name: "Counter".to_string(),
                step_params,
            },
        }
    }
}

/// Parse a `--params` argument; it must be a JSON object
pub fn parse_params(input: Option<&str>) -> Result<Params> {
    let Some(input) = input else {
        return Ok(Params::new());
    };
    match serde_json::from_str::<serde_json::Value>(input)? {
        serde_json::Value::Object(map) => Ok(map.into_iter().map(|(k, v)| (k, v.into())).collect()),
        _ => bail!("params must be a JSON object"),
    }
}
