//! Core abstractions for the flow engine
//!
//! Actions, model classes, flows and steps, live model instances and the
//! per-invocation execution context. Registries and execution live in
//! `flowruntime`; this crate only describes what they operate on.

mod action;
mod class;
mod context;
mod dispatch;
mod error;
pub mod events;
mod flow;
mod model;
mod schema;
mod value;

pub use action::{handler_fn, ActionDefinition, ActionHandler, FnHandler};
pub use class::{ModelClass, ModelInitializer, Registration};
pub use context::{ExecutionContext, Trigger};
pub use dispatch::{DispatchReport, FlowDispatcher, FlowRun};
pub use error::{FlowError, RegistryError, StepError};
pub use events::*;
pub use flow::{EventBinding, FlowDefinition, StepDefinition, StepSource};
pub use model::{FlowModel, Resource};
pub use schema::ConfigSchema;
pub use value::{merge_params, Params, StepParams, Value};

/// Result type for flow operations
pub type Result<T> = std::result::Result<T, FlowError>;
