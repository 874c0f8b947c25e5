use crate::executor::FlowExecutor;
use crate::registry::{ActionRegistry, InstanceRegistry, ModelClassRegistry};
use crate::resolver::StepResolver;
use async_trait::async_trait;
use flowcore::{
    ActionDefinition, ConfigSchema, DispatchReport, EventBus, ExecutionEvent, FlowDefinition,
    FlowDispatcher, FlowError, FlowModel, FlowRun, ModelClass, Params, Registration, Result,
    StepParams, Trigger,
};
use futures::future::join_all;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

/// How flows matched by one event are scheduled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// One after another, in effective flow order
    #[default]
    Sequential,
    /// All at once; steps inside each flow stay sequential
    Concurrent,
}

/// Configuration for the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub event_buffer_size: usize,
    pub dispatch_mode: DispatchMode,
    /// Per-step time limit; `None` lets steps run as long as they need
    pub step_timeout_ms: Option<u64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            event_buffer_size: 1000,
            dispatch_mode: DispatchMode::Sequential,
            step_timeout_ms: None,
        }
    }
}

/// Options for creating a model instance
#[derive(Debug, Clone)]
pub struct ModelOptions {
    pub uid: Option<String>,
    pub class_name: String,
    pub step_params: StepParams,
}

impl ModelOptions {
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            uid: None,
            class_name: class_name.into(),
            step_params: StepParams::new(),
        }
    }

    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = Some(uid.into());
        self
    }

    pub fn with_step_params(mut self, step_params: StepParams) -> Self {
        self.step_params = step_params;
        self
    }
}

/// Options for one flow invocation
#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    pub params: Params,
    pub cancellation: Option<CancellationToken>,
}

impl ApplyOptions {
    pub fn with_params(params: Params) -> Self {
        Self {
            params,
            cancellation: None,
        }
    }

    pub fn cancellable(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

/// A flow as a generic settings form sees it
#[derive(Debug, Clone, Serialize)]
pub struct ConfigurableFlow {
    pub key: String,
    pub title: Option<String>,
    pub steps: Vec<ConfigurableStep>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigurableStep {
    pub key: String,
    pub title: Option<String>,
    pub action: Option<String>,
    pub config_schema: ConfigSchema,
    /// Action and step defaults merged
    pub default_params: Params,
    /// What the instance currently stores for this step
    pub params: Option<Params>,
}

/// The composition root: registries, executor and event bus behind one handle.
///
/// Cloning is cheap; clones share all state.
#[derive(Clone)]
pub struct FlowEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    actions: Arc<RwLock<ActionRegistry>>,
    classes: RwLock<ModelClassRegistry>,
    instances: RwLock<InstanceRegistry>,
    executor: FlowExecutor,
    event_bus: EventBus,
    config: RuntimeConfig,
}

impl FlowEngine {
    /// Create an engine with default settings
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        let actions = Arc::new(RwLock::new(ActionRegistry::new()));
        let resolver = StepResolver::new(Arc::clone(&actions));
        let executor = FlowExecutor::new(resolver, config.step_timeout_ms.map(Duration::from_millis));
        let event_bus = EventBus::new(config.event_buffer_size);

        Self {
            inner: Arc::new(EngineInner {
                actions,
                classes: RwLock::new(ModelClassRegistry::new()),
                instances: RwLock::new(InstanceRegistry::new()),
                executor,
                event_bus,
                config,
            }),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    // --- actions ---

    pub fn register_action(&self, definition: ActionDefinition) -> Registration {
        self.inner.actions.write().register(definition)
    }

    pub fn get_action(&self, name: &str) -> Option<Arc<ActionDefinition>> {
        self.inner.actions.read().get(name)
    }

    pub fn action_names(&self) -> Vec<String> {
        self.inner.actions.read().names()
    }

    // --- model classes and flows ---

    pub fn register_model_class(&self, class: ModelClass) -> Result<Registration> {
        Ok(self.inner.classes.write().register(class)?)
    }

    pub fn get_model_class(&self, name: &str) -> Option<ModelClass> {
        self.inner.classes.read().get(name).cloned()
    }

    pub fn model_class_names(&self) -> Vec<String> {
        self.inner.classes.read().names()
    }

    /// Register `flow` on `class_name`'s own table; unknown classes are ignored with a warning
    pub fn register_flow(&self, class_name: &str, flow: FlowDefinition) -> Result<Registration> {
        Ok(self.inner.classes.write().register_flow(class_name, flow)?)
    }

    /// Effective flows of a class, ancestors' flows included
    pub fn flows(&self, class_name: &str) -> Result<Vec<Arc<FlowDefinition>>> {
        Ok(self.inner.classes.read().effective_flows(class_name)?)
    }

    pub fn model_flows(&self, model: &FlowModel) -> Result<Vec<Arc<FlowDefinition>>> {
        self.flows(model.class_name())
    }

    pub fn get_flow(&self, model: &FlowModel, flow_key: &str) -> Option<Arc<FlowDefinition>> {
        self.inner
            .classes
            .read()
            .find_flow(model.class_name(), flow_key)
            .ok()
    }

    /// Flows with at least one step exposing a non-empty merged schema
    pub fn configurable_flows(&self, model: &FlowModel) -> Result<Vec<ConfigurableFlow>> {
        let resolver = self.inner.executor.resolver();
        let flows = self.model_flows(model)?;

        let configurable = flows
            .iter()
            .map(|flow| ConfigurableFlow {
                key: flow.key.clone(),
                title: flow.title.clone(),
                steps: flow
                    .steps
                    .iter()
                    .map(|step| ConfigurableStep {
                        key: step.key.clone(),
                        title: step.title.clone(),
                        action: step.action_name().map(str::to_string),
                        config_schema: resolver.config_schema(step),
                        default_params: resolver.default_params(step),
                        params: model.step_params(&flow.key, &step.key),
                    })
                    .filter(|step| !step.config_schema.is_empty())
                    .collect(),
            })
            .filter(|flow| !flow.steps.is_empty())
            .collect();
        Ok(configurable)
    }

    // --- instances ---

    /// Create an instance, or return the existing one with the same uid.
    ///
    /// The class must be registered even when the uid already exists.
    pub fn create_model(&self, options: ModelOptions) -> Result<FlowModel> {
        let ModelOptions {
            uid,
            class_name,
            step_params,
        } = options;
        let initializer = self
            .inner
            .classes
            .read()
            .require(&class_name)?
            .initializer()
            .cloned();

        let uid = uid.unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
        if let Some(existing) = self.get_model(&uid) {
            if existing.class_name() != class_name {
                tracing::warn!(
                    "Model '{}' already exists as '{}'; requested class '{}' is ignored",
                    uid,
                    existing.class_name(),
                    class_name
                );
            }
            return Ok(existing);
        }

        let model = FlowModel::new(uid, class_name, step_params);
        let weak: Weak<EngineInner> = Arc::downgrade(&self.inner);
        let weak: Weak<dyn FlowDispatcher> = weak;
        model.attach(weak);
        if let Some(init) = initializer {
            init(&model);
        }

        // Another caller may have won the race for this uid; theirs is kept
        let registered = self.inner.instances.write().insert_if_absent(model);
        tracing::debug!("Created model '{}' ({})", registered.uid(), registered.class_name());
        Ok(registered)
    }

    pub fn get_model(&self, uid: &str) -> Option<FlowModel> {
        self.inner.instances.read().get(uid)
    }

    /// Remove an instance; `false` when no such uid exists
    pub fn destroy_model(&self, uid: &str) -> bool {
        let removed = self.inner.instances.write().remove(uid).is_some();
        if removed {
            tracing::debug!("Destroyed model '{}'", uid);
        }
        removed
    }

    pub fn model_uids(&self) -> Vec<String> {
        self.inner.instances.read().uids()
    }

    // --- execution ---

    pub async fn apply_flow(&self, model: &FlowModel, flow_key: &str, params: Params) -> Result<FlowRun> {
        self.inner
            .apply_flow_with(model, flow_key, ApplyOptions::with_params(params))
            .await
    }

    pub async fn apply_flow_with(
        &self,
        model: &FlowModel,
        flow_key: &str,
        options: ApplyOptions,
    ) -> Result<FlowRun> {
        self.inner.apply_flow_with(model, flow_key, options).await
    }

    /// Run every flow bound to `event_name`; no match is a normal no-op
    pub async fn dispatch_event(
        &self,
        model: &FlowModel,
        event_name: &str,
        payload: Params,
    ) -> Result<DispatchReport> {
        self.inner.dispatch(model, event_name, payload).await
    }

    /// Apply the auto-apply flows of the model's class in effective order,
    /// stopping at the first failure
    pub async fn apply_auto_flows(&self, model: &FlowModel) -> Result<Vec<FlowRun>> {
        let flows = self.model_flows(model)?;
        let mut runs = Vec::new();
        for flow in flows.iter().filter(|f| f.auto_apply && f.on.is_none()) {
            let run = self
                .inner
                .run(flow, model, Trigger::Manual, Params::new(), CancellationToken::new())
                .await?;
            runs.push(run);
        }
        Ok(runs)
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.inner.event_bus.subscribe()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.inner.event_bus
    }
}

impl Default for FlowEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineInner {
    async fn apply_flow_with(
        &self,
        model: &FlowModel,
        flow_key: &str,
        options: ApplyOptions,
    ) -> Result<FlowRun> {
        let flow = self.classes.read().find_flow(model.class_name(), flow_key)?;
        let cancellation = options.cancellation.unwrap_or_default();
        self.run(&flow, model, Trigger::Manual, options.params, cancellation)
            .await
    }

    async fn dispatch(&self, model: &FlowModel, event_name: &str, payload: Params) -> Result<DispatchReport> {
        let matched: Vec<_> = self
            .classes
            .read()
            .effective_flows(model.class_name())?
            .into_iter()
            .filter(|flow| flow.is_bound_to(event_name))
            .collect();

        if matched.is_empty() {
            tracing::debug!("No flow on '{}' handles event '{}'", model.uid(), event_name);
            return Ok(DispatchReport {
                event: event_name.to_string(),
                runs: Vec::new(),
            });
        }

        let trigger = Trigger::Event {
            name: event_name.to_string(),
            payload: payload.clone(),
        };
        let invocations = matched.iter().map(|flow| {
            let trigger = trigger.clone();
            let payload = payload.clone();
            async move {
                let result = self
                    .run(flow, model, trigger, payload, CancellationToken::new())
                    .await;
                (flow.key.clone(), result)
            }
        });

        let results = match self.config.dispatch_mode {
            DispatchMode::Sequential => {
                let mut results = Vec::with_capacity(matched.len());
                for invocation in invocations {
                    results.push(invocation.await);
                }
                results
            }
            DispatchMode::Concurrent => join_all(invocations).await,
        };

        let mut report = DispatchReport {
            event: event_name.to_string(),
            runs: Vec::new(),
        };
        let mut failures = Vec::new();
        for (flow_key, result) in results {
            match result {
                Ok(run) => report.runs.push(run),
                Err(e) => failures.push((flow_key, e)),
            }
        }

        if failures.is_empty() {
            Ok(report)
        } else {
            Err(FlowError::EventDispatch {
                event: event_name.to_string(),
                failures,
            })
        }
    }

    async fn run(
        &self,
        flow: &FlowDefinition,
        model: &FlowModel,
        trigger: Trigger,
        params: Params,
        cancellation: CancellationToken,
    ) -> Result<FlowRun> {
        self.executor
            .execute(flow, model, trigger, params, cancellation, &self.event_bus)
            .await
    }
}

#[async_trait]
impl FlowDispatcher for EngineInner {
    async fn apply_flow(&self, model: &FlowModel, flow_key: &str, params: Params) -> Result<FlowRun> {
        self.apply_flow_with(model, flow_key, ApplyOptions::with_params(params))
            .await
    }

    async fn dispatch_event(&self, model: &FlowModel, event_name: &str, payload: Params) -> Result<DispatchReport> {
        self.dispatch(model, event_name, payload).await
    }
}
