//! Flow execution runtime
//!
//! Registries for actions, model classes and live model instances, the step
//! resolver that merges parameters and configuration schemas, the sequential
//! flow executor, and the `FlowEngine` facade tying them together.

mod executor;
mod registry;
mod resolver;
mod runtime;

pub use executor::FlowExecutor;
pub use registry::{ActionRegistry, InstanceRegistry, ModelClassRegistry};
pub use resolver::{merge_step_params, merge_step_schema, ResolvedStep, StepResolution, StepResolver};
pub use runtime::{
    ApplyOptions, ConfigurableFlow, ConfigurableStep, DispatchMode, FlowEngine, ModelOptions,
    RuntimeConfig,
};
