use flowcore::{ActionDefinition, FlowDefinition, FlowModel, ModelClass, Registration, RegistryError};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Registry of reusable actions
#[derive(Default)]
pub struct ActionRegistry {
    actions: HashMap<String, Arc<ActionDefinition>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or overwrite an action by name
    pub fn register(&mut self, definition: ActionDefinition) -> Registration {
        let name = definition.name.clone();
        match self.actions.insert(name.clone(), Arc::new(definition)) {
            Some(_) => {
                tracing::warn!("Action '{}' is already registered and will be overwritten", name);
                Registration::Replaced
            }
            None => {
                tracing::debug!("Registered action: {}", name);
                Registration::Inserted
            }
        }
    }

    /// Missing actions are a normal outcome, not an error
    pub fn get(&self, name: &str) -> Option<Arc<ActionDefinition>> {
        self.actions.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.actions.keys().cloned().collect();
        names.sort();
        names
    }
}

struct ClassEntry {
    class: ModelClass,
    /// Ancestor names, most distant first; excludes the class itself
    ancestors: Vec<String>,
}

/// Registry of model classes, their own flow tables and cached ancestor chains
#[derive(Default)]
pub struct ModelClassRegistry {
    classes: HashMap<String, ClassEntry>,
}

impl ModelClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or overwrite a class. Its parent must already be registered.
    pub fn register(&mut self, class: ModelClass) -> Result<Registration, RegistryError> {
        class.validate()?;
        if let Some(parent) = &class.parent {
            if parent == &class.name {
                return Err(RegistryError::InheritanceCycle(class.name.clone()));
            }
            if !self.classes.contains_key(parent) {
                return Err(RegistryError::ParentClassNotFound {
                    class: class.name.clone(),
                    parent: parent.clone(),
                });
            }
        }

        let name = class.name.clone();
        let entry = ClassEntry {
            class,
            ancestors: Vec::new(),
        };
        let previous = self.classes.insert(name.clone(), entry);

        // An overwrite can re-parent a class under its own descendant
        if let Err(e) = self.rebuild_chains() {
            match previous {
                Some(prev) => self.classes.insert(name, prev),
                None => self.classes.remove(&name),
            };
            self.rebuild_chains()?;
            return Err(e);
        }

        if previous.is_some() {
            tracing::warn!("Model class '{}' is already registered and will be overwritten", name);
            Ok(Registration::Replaced)
        } else {
            tracing::debug!("Registered model class: {}", name);
            Ok(Registration::Inserted)
        }
    }

    pub fn get(&self, name: &str) -> Option<&ModelClass> {
        self.classes.get(name).map(|entry| &entry.class)
    }

    /// Missing classes are fatal wherever behavior is requested for them
    pub fn require(&self, name: &str) -> Result<&ModelClass, RegistryError> {
        self.get(name)
            .ok_or_else(|| RegistryError::ModelClassNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.classes.keys().cloned().collect();
        names.sort();
        names
    }

    /// Cached ancestor chain, most distant ancestor first
    pub fn ancestors(&self, name: &str) -> Option<&[String]> {
        self.classes.get(name).map(|entry| entry.ancestors.as_slice())
    }

    /// True if `name` is `ancestor` or inherits from it
    pub fn is_a(&self, name: &str, ancestor: &str) -> bool {
        name == ancestor
            || self
                .ancestors(name)
                .map_or(false, |chain| chain.iter().any(|a| a == ancestor))
    }

    /// Register a flow on a class's own table.
    ///
    /// Unknown classes are tolerated so bootstrap order does not matter:
    /// the request is ignored with a warning.
    pub fn register_flow(
        &mut self,
        class_name: &str,
        flow: FlowDefinition,
    ) -> Result<Registration, RegistryError> {
        let Some(entry) = self.classes.get_mut(class_name) else {
            tracing::warn!(
                "Model class '{}' not found. Flow '{}' will not be registered",
                class_name,
                flow.key
            );
            return Ok(Registration::Ignored);
        };

        let key = flow.key.clone();
        let outcome = entry.class.register_flow(flow)?;
        if outcome == Registration::Replaced {
            tracing::warn!("Flow '{}' on '{}' is already registered and will be overwritten", key, class_name);
        }
        Ok(outcome)
    }

    /// Effective flows of a class: every ancestor's table layered from the
    /// root down, a descendant's flow replacing an ancestor's flow of the
    /// same key as a whole
    pub fn effective_flows(&self, name: &str) -> Result<Vec<Arc<FlowDefinition>>, RegistryError> {
        let entry = self
            .classes
            .get(name)
            .ok_or_else(|| RegistryError::ModelClassNotFound(name.to_string()))?;

        let mut flows: Vec<Arc<FlowDefinition>> = Vec::new();
        let levels = entry.ancestors.iter().map(String::as_str).chain(std::iter::once(name));
        for level in levels {
            let Some(class) = self.get(level) else { continue };
            for flow in class.own_flows() {
                match flows.iter_mut().find(|f| f.key == flow.key) {
                    Some(slot) => *slot = Arc::clone(flow),
                    None => flows.push(Arc::clone(flow)),
                }
            }
        }
        Ok(flows)
    }

    /// One flow from the effective view; a missing key is fatal
    pub fn find_flow(&self, name: &str, flow_key: &str) -> Result<Arc<FlowDefinition>, RegistryError> {
        self.effective_flows(name)?
            .into_iter()
            .find(|f| f.key == flow_key)
            .ok_or_else(|| RegistryError::FlowNotFound {
                class: name.to_string(),
                flow_key: flow_key.to_string(),
            })
    }

    fn rebuild_chains(&mut self) -> Result<(), RegistryError> {
        let mut chains = HashMap::with_capacity(self.classes.len());
        for name in self.classes.keys() {
            chains.insert(name.clone(), self.walk_ancestors(name)?);
        }
        for (name, chain) in chains {
            if let Some(entry) = self.classes.get_mut(&name) {
                entry.ancestors = chain;
            }
        }
        Ok(())
    }

    fn walk_ancestors(&self, name: &str) -> Result<Vec<String>, RegistryError> {
        let mut chain = Vec::new();
        let mut seen = HashSet::from([name.to_string()]);
        let mut current = self.classes.get(name).and_then(|e| e.class.parent.clone());

        while let Some(parent) = current {
            if !seen.insert(parent.clone()) {
                return Err(RegistryError::InheritanceCycle(name.to_string()));
            }
            let entry = self.classes.get(&parent).ok_or_else(|| RegistryError::ParentClassNotFound {
                class: name.to_string(),
                parent: parent.clone(),
            })?;
            current = entry.class.parent.clone();
            chain.push(parent);
        }

        chain.reverse();
        Ok(chain)
    }
}

/// Live model instances keyed by uid
#[derive(Default)]
pub struct InstanceRegistry {
    models: HashMap<String, FlowModel>,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, uid: &str) -> Option<FlowModel> {
        self.models.get(uid).cloned()
    }

    /// Insert `model` unless its uid is taken; returns whichever instance ends up registered
    pub fn insert_if_absent(&mut self, model: FlowModel) -> FlowModel {
        self.models
            .entry(model.uid().to_string())
            .or_insert(model)
            .clone()
    }

    pub fn remove(&mut self, uid: &str) -> Option<FlowModel> {
        self.models.remove(uid)
    }

    pub fn uids(&self) -> Vec<String> {
        let mut uids: Vec<_> = self.models.keys().cloned().collect();
        uids.sort();
        uids
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
