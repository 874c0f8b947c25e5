use crate::{FlowDefinition, FlowModel, RegistryError};
use std::fmt;
use std::sync::Arc;

/// Hook run once on every freshly created instance of a class
pub type ModelInitializer = Arc<dyn Fn(&FlowModel) + Send + Sync>;

/// Outcome of a registration request.
///
/// Overwrites and ignored requests are not errors; callers that want to
/// treat them as such can match on the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Inserted,
    Replaced,
    Ignored,
}

impl Registration {
    pub fn is_inserted(&self) -> bool {
        matches!(self, Registration::Inserted)
    }
}

/// A registered model type and the flows it declares itself
#[derive(Clone)]
pub struct ModelClass {
    pub name: String,
    pub parent: Option<String>,
    flows: Vec<Arc<FlowDefinition>>,
    initializer: Option<ModelInitializer>,
}

impl ModelClass {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            flows: Vec::new(),
            initializer: None,
        }
    }

    /// Subclass of `parent` declaring `flows` in one go
    pub fn extends(
        name: impl Into<String>,
        parent: impl Into<String>,
        flows: impl IntoIterator<Item = FlowDefinition>,
    ) -> Self {
        let mut class = Self::new(name).with_parent(parent);
        for flow in flows {
            class = class.with_flow(flow);
        }
        class
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_flow(mut self, flow: FlowDefinition) -> Self {
        self.upsert_flow(flow);
        self
    }

    pub fn with_initializer<F>(mut self, init: F) -> Self
    where
        F: Fn(&FlowModel) + Send + Sync + 'static,
    {
        self.initializer = Some(Arc::new(init));
        self
    }

    /// Insert or overwrite a flow in this class's own table
    pub fn register_flow(&mut self, flow: FlowDefinition) -> Result<Registration, RegistryError> {
        flow.validate()?;
        let outcome = self.upsert_flow(flow);
        Ok(outcome)
    }

    fn upsert_flow(&mut self, flow: FlowDefinition) -> Registration {
        let flow = Arc::new(flow);
        match self.flows.iter_mut().find(|f| f.key == flow.key) {
            Some(existing) => {
                *existing = flow;
                Registration::Replaced
            }
            None => {
                self.flows.push(flow);
                Registration::Inserted
            }
        }
    }

    /// Flows declared on this class only, in declaration order
    pub fn own_flows(&self) -> &[Arc<FlowDefinition>] {
        &self.flows
    }

    pub fn initializer(&self) -> Option<&ModelInitializer> {
        self.initializer.as_ref()
    }

    pub fn validate(&self) -> Result<(), RegistryError> {
        self.flows.iter().try_for_each(|flow| flow.validate())
    }
}

impl fmt::Debug for ModelClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelClass")
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("flows", &self.flows.iter().map(|fl| fl.key.as_str()).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
