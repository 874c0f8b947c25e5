use crate::{DispatchReport, FlowDispatcher, FlowError, FlowRun, Params, StepParams, Value};
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::sync::watch;

/// Opaque, instance-scoped resource handle
pub type Resource = Arc<dyn Any + Send + Sync>;

/// Handle to one live model instance.
///
/// Clones share the same instance; props, resources and step params are
/// owned by it and never shared with other instances.
#[derive(Clone)]
pub struct FlowModel {
    inner: Arc<ModelState>,
}

struct ModelState {
    uid: String,
    class_name: String,
    props: RwLock<Params>,
    resources: RwLock<HashMap<String, Resource>>,
    step_params: RwLock<StepParams>,
    revision: watch::Sender<u64>,
    engine: RwLock<Option<Weak<dyn FlowDispatcher>>>,
}

impl FlowModel {
    pub fn new(uid: impl Into<String>, class_name: impl Into<String>, step_params: StepParams) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            inner: Arc::new(ModelState {
                uid: uid.into(),
                class_name: class_name.into(),
                props: RwLock::new(Params::new()),
                resources: RwLock::new(HashMap::new()),
                step_params: RwLock::new(step_params),
                revision,
                engine: RwLock::new(None),
            }),
        }
    }

    pub fn uid(&self) -> &str {
        &self.inner.uid
    }

    pub fn class_name(&self) -> &str {
        &self.inner.class_name
    }

    /// True when both handles point at the same instance
    pub fn ptr_eq(&self, other: &FlowModel) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // --- props ---

    pub fn prop(&self, key: &str) -> Option<Value> {
        self.inner.props.read().get(key).cloned()
    }

    /// Snapshot of all props
    pub fn props(&self) -> Params {
        self.inner.props.read().clone()
    }

    pub fn set_prop(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.inner.props.write().insert(key.into(), value.into());
        self.bump();
    }

    pub fn set_props(&self, values: Params) {
        if values.is_empty() {
            return;
        }
        self.inner.props.write().extend(values);
        self.bump();
    }

    pub fn remove_prop(&self, key: &str) -> Option<Value> {
        let removed = self.inner.props.write().remove(key);
        if removed.is_some() {
            self.bump();
        }
        removed
    }

    /// Revision counter bumped on every prop mutation; renderers await
    /// `changed()` and re-read `props()`
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.revision.subscribe()
    }

    fn bump(&self) {
        self.inner.revision.send_modify(|rev| *rev += 1);
    }

    // --- resources ---

    pub fn set_resource<T: Any + Send + Sync>(&self, key: impl Into<String>, resource: T) {
        self.inner.resources.write().insert(key.into(), Arc::new(resource));
    }

    /// Typed access; `None` when missing or of another type
    pub fn resource<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let resource = self.inner.resources.read().get(key).cloned()?;
        resource.downcast::<T>().ok()
    }

    pub fn has_resource(&self, key: &str) -> bool {
        self.inner.resources.read().contains_key(key)
    }

    pub fn remove_resource(&self, key: &str) -> bool {
        self.inner.resources.write().remove(key).is_some()
    }

    // --- persisted step configuration ---

    pub fn step_params(&self, flow_key: &str, step_key: &str) -> Option<Params> {
        self.inner
            .step_params
            .read()
            .get(flow_key)
            .and_then(|steps| steps.get(step_key))
            .cloned()
    }

    /// Replace the stored override for one step
    pub fn set_step_params(&self, flow_key: impl Into<String>, step_key: impl Into<String>, params: Params) {
        self.inner
            .step_params
            .write()
            .entry(flow_key.into())
            .or_default()
            .insert(step_key.into(), params);
    }

    pub fn all_step_params(&self) -> StepParams {
        self.inner.step_params.read().clone()
    }

    // --- engine access ---

    /// Wire the instance to the engine that owns it
    pub fn attach(&self, engine: Weak<dyn FlowDispatcher>) {
        *self.inner.engine.write() = Some(engine);
    }

    fn engine(&self) -> Result<Arc<dyn FlowDispatcher>, FlowError> {
        self.inner
            .engine
            .read()
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or_else(|| {
                tracing::warn!(model = %self.uid(), "model is not attached to a running engine");
                FlowError::EngineUnavailable(self.uid().to_string())
            })
    }

    pub async fn apply_flow(&self, flow_key: &str, params: Params) -> Result<FlowRun, FlowError> {
        let engine = self.engine()?;
        engine.apply_flow(self, flow_key, params).await
    }

    pub async fn dispatch_event(&self, event_name: &str, payload: Params) -> Result<DispatchReport, FlowError> {
        let engine = self.engine()?;
        engine.dispatch_event(self, event_name, payload).await
    }
}

impl fmt::Debug for FlowModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowModel")
            .field("uid", &self.inner.uid)
            .field("class_name", &self.inner.class_name)
            .field("props", &*self.inner.props.read())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params;

    #[test]
    fn clones_share_state() {
        let model = FlowModel::new("t1", "Table", StepParams::new());
        let alias = model.clone();

        alias.set_prop("title", "Users");

        assert!(model.ptr_eq(&alias));
        assert_eq!(model.prop("title"), Some(Value::from("Users")));
    }

    #[test]
    fn resources_are_typed() {
        let model = FlowModel::new("t1", "Table", StepParams::new());
        model.set_resource("rows", vec![1u32, 2, 3]);

        assert_eq!(model.resource::<Vec<u32>>("rows").map(|r| r.len()), Some(3));
        assert!(model.resource::<String>("rows").is_none());
        assert!(model.remove_resource("rows"));
        assert!(!model.has_resource("rows"));
    }

    #[test]
    fn step_params_round_trip_per_step() {
        let model = FlowModel::new("t1", "Table", StepParams::new());
        model.set_step_params("default", "setTitle", params! { "title" => "Orders" });

        assert_eq!(model.step_params("default", "setTitle"), Some(params! { "title" => "Orders" }));
        assert_eq!(model.step_params("default", "setFields"), None);
    }

    #[tokio::test]
    async fn prop_mutations_notify_subscribers() {
        let model = FlowModel::new("t1", "Table", StepParams::new());
        let mut rx = model.subscribe();

        model.set_prop("loading", true);
        rx.changed().await.unwrap();

        assert_eq!(*rx.borrow(), 1);
    }

    #[tokio::test]
    async fn detached_model_cannot_apply_flows() {
        let model = FlowModel::new("lonely", "Table", StepParams::new());

        let err = model.apply_flow("default", Params::new()).await.unwrap_err();

        assert!(matches!(err, FlowError::EngineUnavailable(uid) if uid == "lonely"));
    }
}
