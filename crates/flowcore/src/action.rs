use crate::{ConfigSchema, ExecutionContext, FlowModel, Params, StepError, Value};
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Core trait that every step handler implements, whether it is shared
/// through a registered action or written inline on a step
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Run against `model` with the fully merged parameters for this step.
    ///
    /// Handlers with nothing to report return `Value::Null`.
    async fn execute(
        &self,
        ctx: &ExecutionContext,
        model: &FlowModel,
        params: Params,
    ) -> Result<Value, StepError>;
}

/// Adapter turning an async closure into an [`ActionHandler`]
pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> ActionHandler for FnHandler<F>
where
    F: Fn(ExecutionContext, FlowModel, Params) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, StepError>> + Send,
{
    async fn execute(
        &self,
        ctx: &ExecutionContext,
        model: &FlowModel,
        params: Params,
    ) -> Result<Value, StepError> {
        (self.0)(ctx.clone(), model.clone(), params).await
    }
}

/// Wrap an async closure as a shareable handler
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn ActionHandler>
where
    F: Fn(ExecutionContext, FlowModel, Params) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, StepError>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// A named, reusable operation that steps reference through `use`
#[derive(Clone)]
pub struct ActionDefinition {
    pub name: String,
    pub title: Option<String>,
    pub handler: Arc<dyn ActionHandler>,
    pub config_schema: ConfigSchema,
    pub default_params: Params,
}

impl ActionDefinition {
    pub fn new(name: impl Into<String>, handler: Arc<dyn ActionHandler>) -> Self {
        Self {
            name: name.into(),
            title: None,
            handler,
            config_schema: ConfigSchema::default(),
            default_params: Params::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_config_schema(mut self, schema: ConfigSchema) -> Self {
        self.config_schema = schema;
        self
    }

    pub fn with_default_params(mut self, params: Params) -> Self {
        self.default_params = params;
        self
    }
}

impl fmt::Debug for ActionDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionDefinition")
            .field("name", &self.name)
            .field("title", &self.title)
            .field("config_schema", &self.config_schema)
            .field("default_params", &self.default_params)
            .finish_non_exhaustive()
    }
}
