// crates/flowruntime/tests/engine_test.rs

use flowcore::{
    handler_fn, params, ActionDefinition, ConfigSchema, ExecutionEvent, FlowDefinition, FlowError,
    FlowModel, ModelClass, Params, Registration, RegistryError, StepDefinition, StepError, StepParams,
    Value,
};
use flowruntime::{ApplyOptions, DispatchMode, FlowEngine, ModelOptions, RuntimeConfig};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;

/// Adds `params.step` to `props.count`
fn inc_action() -> ActionDefinition {
    ActionDefinition::new(
        "inc",
        handler_fn(|_ctx, model, params| async move {
            let step = params.get("step").and_then(Value::as_f64).unwrap_or(0.0);
            let count = model.prop("count").and_then(|v| v.as_f64()).unwrap_or(0.0);
            model.set_prop("count", count + step);
            Ok(Value::from(count + step))
        }),
    )
    .with_default_params(params! { "step" => 1 })
}

/// Inline step that appends `label` to a shared trace
fn record(trace: &Arc<Mutex<Vec<String>>>, key: &str, label: &str) -> StepDefinition {
    let trace = Arc::clone(trace);
    let label = label.to_string();
    StepDefinition::inline(
        key,
        handler_fn(move |_ctx, _model, _params| {
            let trace = Arc::clone(&trace);
            let label = label.clone();
            async move {
                sleep(Duration::from_millis(5)).await;
                trace.lock().push(label);
                Ok(Value::Null)
            }
        }),
    )
}

fn failing_step(key: &str) -> StepDefinition {
    StepDefinition::inline(
        key,
        handler_fn(|_ctx, _model, _params| async {
            Err(StepError::ExecutionFailed("backend unavailable".into()))
        }),
    )
}

fn count_of(model: &FlowModel) -> f64 {
    model.prop("count").and_then(|v| v.as_f64()).unwrap_or(0.0)
}

fn counter_engine() -> FlowEngine {
    let engine = FlowEngine::new();
    engine.register_action(inc_action());
    engine
        .register_model_class(
            ModelClass::new("Counter")
                .with_flow(FlowDefinition::new("add").step(StepDefinition::uses("increment", "inc"))),
        )
        .unwrap();
    engine
}

#[tokio::test]
async fn counter_scenario_counts_three() {
    let engine = counter_engine();
    let c1 = engine.create_model(ModelOptions::new("Counter").with_uid("c1")).unwrap();

    for _ in 0..3 {
        engine.apply_flow(&c1, "add", Params::new()).await.unwrap();
    }

    assert_eq!(c1.prop("count"), Some(Value::from(3)));
}

#[tokio::test]
async fn merged_params_follow_precedence() {
    let engine = FlowEngine::new();
    let seen = Arc::new(Mutex::new(Params::new()));
    let sink = Arc::clone(&seen);
    engine.register_action(
        ActionDefinition::new(
            "capture",
            handler_fn(move |_ctx, _model, params| {
                let sink = Arc::clone(&sink);
                async move {
                    *sink.lock() = params;
                    Ok(Value::Null)
                }
            }),
        )
        .with_default_params(params! { "a" => 1, "b" => 1 }),
    );
    engine
        .register_model_class(ModelClass::new("M").with_flow(
            FlowDefinition::new("main")
                .step(StepDefinition::uses("s", "capture").with_default_params(params! { "b" => 2 })),
        ))
        .unwrap();

    let mut stored = StepParams::new();
    stored
        .entry("main".to_string())
        .or_default()
        .insert("s".to_string(), params! { "b" => 3, "c" => 1 });
    let model = engine
        .create_model(ModelOptions::new("M").with_step_params(stored))
        .unwrap();

    engine.apply_flow(&model, "main", params! { "c" => 2 }).await.unwrap();

    assert_eq!(*seen.lock(), params! { "a" => 1, "b" => 3, "c" => 2 });
    let action = engine.get_action("capture").unwrap();
    assert_eq!(action.default_params, params! { "a" => 1, "b" => 1 });
}

#[tokio::test]
async fn unregistered_action_is_skipped_and_flow_continues() {
    let engine = counter_engine();
    engine
        .register_flow(
            "Counter",
            FlowDefinition::new("mixed")
                .step(StepDefinition::uses("first", "inc"))
                .step(StepDefinition::uses("ghost", "not-registered"))
                .step(StepDefinition::uses("second", "inc")),
        )
        .unwrap();
    let model = engine.create_model(ModelOptions::new("Counter")).unwrap();

    let run = engine.apply_flow(&model, "mixed", Params::new()).await.unwrap();

    assert_eq!(count_of(&model), 2.0);
    assert_eq!(run.skipped_steps, vec!["ghost".to_string()]);
    assert_eq!(run.completed_steps, vec!["first".to_string(), "second".to_string()]);
}

#[tokio::test]
async fn later_steps_observe_earlier_props() {
    let engine = FlowEngine::new();
    engine
        .register_model_class(
            ModelClass::new("Table").with_flow(
                FlowDefinition::new("loadData")
                    .step(StepDefinition::inline(
                        "fetch",
                        handler_fn(|_ctx, model, _params| async move {
                            sleep(Duration::from_millis(20)).await;
                            model.set_prop("rows", vec![1, 2, 3]);
                            Ok(Value::Null)
                        }),
                    ))
                    .step(StepDefinition::inline(
                        "count",
                        handler_fn(|_ctx, model, _params| async move {
                            let rows = model.prop("rows").and_then(|v| v.as_array().map(Vec::len));
                            Ok(Value::from(rows.unwrap_or(0) as i64))
                        }),
                    )),
            ),
        )
        .unwrap();
    let model = engine.create_model(ModelOptions::new("Table")).unwrap();

    let run = engine.apply_flow(&model, "loadData", Params::new()).await.unwrap();

    assert_eq!(run.output("count"), Some(&Value::from(3)));
}

#[tokio::test]
async fn failing_step_aborts_without_rollback() {
    let engine = counter_engine();
    engine
        .register_flow(
            "Counter",
            FlowDefinition::new("fragile")
                .step(StepDefinition::uses("first", "inc"))
                .step(failing_step("boom"))
                .step(StepDefinition::uses("never", "inc")),
        )
        .unwrap();
    let model = engine.create_model(ModelOptions::new("Counter")).unwrap();

    let err = engine.apply_flow(&model, "fragile", Params::new()).await.unwrap_err();

    match err {
        FlowError::Step { flow_key, step_key, source } => {
            assert_eq!(flow_key, "fragile");
            assert_eq!(step_key, "boom");
            assert_eq!(source, StepError::ExecutionFailed("backend unavailable".into()));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(count_of(&model), 1.0);
}

#[tokio::test]
async fn missing_flow_key_is_fatal() {
    let engine = counter_engine();
    let model = engine.create_model(ModelOptions::new("Counter")).unwrap();

    let err = engine.apply_flow(&model, "subtract", Params::new()).await.unwrap_err();

    assert!(matches!(
        err,
        FlowError::Registry(RegistryError::FlowNotFound { ref flow_key, .. }) if flow_key == "subtract"
    ));
}

#[tokio::test]
async fn creation_is_idempotent_per_uid() {
    let engine = counter_engine();

    let first = engine.create_model(ModelOptions::new("Counter").with_uid("c1")).unwrap();
    let second = engine.create_model(ModelOptions::new("Counter").with_uid("c1")).unwrap();
    first.set_prop("count", 41);

    assert!(first.ptr_eq(&second));
    assert_eq!(second.prop("count"), Some(Value::from(41)));
    assert_eq!(engine.model_uids(), vec!["c1".to_string()]);
}

#[tokio::test]
async fn unknown_class_fails_creation() {
    let engine = FlowEngine::new();

    let err = engine.create_model(ModelOptions::new("Ghost")).unwrap_err();

    assert!(matches!(
        err,
        FlowError::Registry(RegistryError::ModelClassNotFound(ref name)) if name == "Ghost"
    ));
}

#[tokio::test]
async fn generated_uids_are_unique() {
    let engine = counter_engine();

    let a = engine.create_model(ModelOptions::new("Counter")).unwrap();
    let b = engine.create_model(ModelOptions::new("Counter")).unwrap();

    assert_ne!(a.uid(), b.uid());
    assert!(!a.ptr_eq(&b));
}

#[tokio::test]
async fn destroy_removes_from_lookup() {
    let engine = counter_engine();
    engine.create_model(ModelOptions::new("Counter").with_uid("c1")).unwrap();

    assert!(engine.destroy_model("c1"));
    assert!(engine.get_model("c1").is_none());
    assert!(!engine.destroy_model("c1"));
    assert!(!engine.destroy_model("never-existed"));
}

#[tokio::test]
async fn descendant_flow_replaces_ancestor_flow() {
    let engine = counter_engine();
    engine
        .register_model_class(ModelClass::new("Block").with_flow(
            FlowDefinition::new("add").with_title("parent").step(failing_step("parent-step")),
        ))
        .unwrap();
    engine
        .register_model_class(ModelClass::new("Table").with_parent("Block"))
        .unwrap();
    engine
        .register_flow(
            "Table",
            FlowDefinition::new("add")
                .with_title("child")
                .step(StepDefinition::uses("increment", "inc")),
        )
        .unwrap();
    let model = engine.create_model(ModelOptions::new("Table")).unwrap();

    let flows = engine.flows("Table").unwrap();
    let run = engine.apply_flow(&model, "add", Params::new()).await.unwrap();

    assert_eq!(flows.len(), 1);
    assert_eq!(flows[0].title.as_deref(), Some("child"));
    assert_eq!(run.completed_steps, vec!["increment".to_string()]);
    assert_eq!(
        engine.flows("Block").unwrap()[0].title.as_deref(),
        Some("parent")
    );
}

#[tokio::test]
async fn flow_for_unknown_class_is_ignored() {
    let engine = FlowEngine::new();

    let outcome = engine
        .register_flow("NotYet", FlowDefinition::new("default"))
        .unwrap();

    assert_eq!(outcome, Registration::Ignored);
}

#[tokio::test]
async fn re_registration_reports_replacement() {
    let engine = counter_engine();

    assert_eq!(engine.register_action(inc_action()), Registration::Replaced);
    assert_eq!(
        engine.register_model_class(ModelClass::new("Counter")).unwrap(),
        Registration::Replaced
    );
}

fn evented_engine(mode: DispatchMode, trace: &Arc<Mutex<Vec<String>>>) -> FlowEngine {
    let engine = FlowEngine::with_config(RuntimeConfig {
        dispatch_mode: mode,
        ..RuntimeConfig::default()
    });
    engine
        .register_model_class(
            ModelClass::new("Table")
                .with_flow(
                    FlowDefinition::new("refresh")
                        .on_event("table:pagination:change")
                        .step(record(trace, "a1", "a1"))
                        .step(record(trace, "a2", "a2")),
                )
                .with_flow(
                    FlowDefinition::new("audit")
                        .on_event("table:pagination:change")
                        .step(record(trace, "b1", "b1"))
                        .step(record(trace, "b2", "b2")),
                )
                .with_flow(FlowDefinition::new("manual").step(record(trace, "m", "m"))),
        )
        .unwrap();
    engine
}

#[tokio::test]
async fn event_runs_every_bound_flow_sequentially() {
    let trace = Arc::new(Mutex::new(Vec::new()));
    let engine = evented_engine(DispatchMode::Sequential, &trace);
    let model = engine.create_model(ModelOptions::new("Table")).unwrap();

    let report = engine
        .dispatch_event(&model, "table:pagination:change", params! { "current" => 2 })
        .await
        .unwrap();

    assert_eq!(report.flow_keys(), vec!["refresh", "audit"]);
    assert_eq!(*trace.lock(), vec!["a1", "a2", "b1", "b2"]);
}

#[tokio::test]
async fn concurrent_dispatch_keeps_each_flow_ordered() {
    let trace = Arc::new(Mutex::new(Vec::new()));
    let engine = evented_engine(DispatchMode::Concurrent, &trace);
    let model = engine.create_model(ModelOptions::new("Table")).unwrap();

    engine
        .dispatch_event(&model, "table:pagination:change", Params::new())
        .await
        .unwrap();

    let trace = trace.lock().clone();
    let pos = |label: &str| trace.iter().position(|l| l == label).unwrap();
    assert_eq!(trace.len(), 4);
    assert!(pos("a1") < pos("a2"));
    assert!(pos("b1") < pos("b2"));
    assert!(!trace.contains(&"m".to_string()));
}

#[tokio::test]
async fn unmatched_event_is_a_noop() {
    let trace = Arc::new(Mutex::new(Vec::new()));
    let engine = evented_engine(DispatchMode::Sequential, &trace);
    let model = engine.create_model(ModelOptions::new("Table")).unwrap();

    let report = engine.dispatch_event(&model, "nobody:listens", Params::new()).await.unwrap();

    assert!(report.is_noop());
    assert!(trace.lock().is_empty());
}

#[tokio::test]
async fn event_payload_reaches_step_params() {
    let engine = FlowEngine::new();
    engine
        .register_model_class(ModelClass::new("Table").with_flow(
            FlowDefinition::new("pagination").on_event("table:pagination:change").step(
                StepDefinition::inline(
                    "updatePagination",
                    handler_fn(|ctx, model, params| async move {
                        assert!(ctx.is_event_triggered());
                        model.set_props(params);
                        Ok(Value::Null)
                    }),
                )
                .with_default_params(params! { "current" => 1, "pageSize" => 10 }),
            ),
        ))
        .unwrap();
    let model = engine.create_model(ModelOptions::new("Table")).unwrap();

    model
        .dispatch_event("table:pagination:change", params! { "current" => 3 })
        .await
        .unwrap();

    assert_eq!(model.prop("current"), Some(Value::from(3)));
    assert_eq!(model.prop("pageSize"), Some(Value::from(10)));
}

#[tokio::test]
async fn failing_event_flow_does_not_stop_siblings() {
    let engine = counter_engine();
    engine
        .register_flow("Counter", FlowDefinition::new("broken").on_event("tick").step(failing_step("boom")))
        .unwrap();
    engine
        .register_flow(
            "Counter",
            FlowDefinition::new("counting").on_event("tick").step(StepDefinition::uses("increment", "inc")),
        )
        .unwrap();
    let model = engine.create_model(ModelOptions::new("Counter")).unwrap();

    let err = engine.dispatch_event(&model, "tick", Params::new()).await.unwrap_err();

    match err {
        FlowError::EventDispatch { event, failures } => {
            assert_eq!(event, "tick");
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].0, "broken");
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(count_of(&model), 1.0);
}

#[tokio::test]
async fn handlers_can_apply_other_flows() {
    let engine = counter_engine();
    engine
        .register_flow(
            "Counter",
            FlowDefinition::new("default").step(StepDefinition::inline(
                "loadInitialData",
                handler_fn(|_ctx, model, _params| async move {
                    let run = model
                        .apply_flow("add", params! { "step" => 5 })
                        .await
                        .map_err(|e| StepError::ExecutionFailed(e.to_string()))?;
                    Ok::<_, StepError>(Value::from(run.completed_steps.len() as i64))
                }),
            )),
        )
        .unwrap();
    let model = engine.create_model(ModelOptions::new("Counter")).unwrap();

    let run = engine.apply_flow(&model, "default", Params::new()).await.unwrap();

    assert_eq!(count_of(&model), 5.0);
    assert_eq!(run.output("loadInitialData"), Some(&Value::from(1)));
}

#[tokio::test]
async fn cancellation_stops_before_next_step() {
    let engine = counter_engine();
    engine
        .register_flow(
            "Counter",
            FlowDefinition::new("interruptible")
                .step(StepDefinition::uses("first", "inc"))
                .step(StepDefinition::inline(
                    "stop",
                    handler_fn(|ctx, _model, _params| async move {
                        ctx.cancellation.cancel();
                        Ok(Value::Null)
                    }),
                ))
                .step(StepDefinition::uses("second", "inc")),
        )
        .unwrap();
    let model = engine.create_model(ModelOptions::new("Counter")).unwrap();
    let token = CancellationToken::new();

    let err = engine
        .apply_flow_with(&model, "interruptible", ApplyOptions::default().cancellable(token.clone()))
        .await
        .unwrap_err();

    assert!(token.is_cancelled());
    assert!(matches!(err, FlowError::Cancelled { completed_steps: 2, .. }));
    assert_eq!(count_of(&model), 1.0);
}

#[tokio::test]
async fn slow_step_times_out() {
    let engine = FlowEngine::with_config(RuntimeConfig {
        step_timeout_ms: Some(20),
        ..RuntimeConfig::default()
    });
    engine
        .register_model_class(ModelClass::new("Slow").with_flow(FlowDefinition::new("wait").step(
            StepDefinition::inline(
                "sleep",
                handler_fn(|_ctx, _model, _params| async {
                    sleep(Duration::from_millis(500)).await;
                    Ok(Value::Null)
                }),
            ),
        )))
        .unwrap();
    let model = engine.create_model(ModelOptions::new("Slow")).unwrap();

    let err = engine.apply_flow(&model, "wait", Params::new()).await.unwrap_err();

    assert_eq!(err.step_error(), Some(&StepError::Timeout { millis: 20 }));
}

#[tokio::test]
async fn auto_flows_run_in_order() {
    let trace = Arc::new(Mutex::new(Vec::new()));
    let engine = FlowEngine::new();
    engine
        .register_model_class(ModelClass::new("Block").with_flow(
            FlowDefinition::new("setup").auto_apply().step(record(&trace, "s", "setup")),
        ))
        .unwrap();
    engine
        .register_model_class(ModelClass::extends(
            "Markdown",
            "Block",
            [
                FlowDefinition::new("setProps").auto_apply().step(record(&trace, "p", "setProps")),
                FlowDefinition::new("refresh").step(record(&trace, "r", "refresh")),
                FlowDefinition::new("onClick").auto_apply().on_event("click").step(record(&trace, "c", "click")),
            ],
        ))
        .unwrap();
    let model = engine.create_model(ModelOptions::new("Markdown")).unwrap();

    let runs = engine.apply_auto_flows(&model).await.unwrap();

    assert_eq!(runs.len(), 2);
    assert_eq!(*trace.lock(), vec!["setup", "setProps"]);
}

#[tokio::test]
async fn configurable_flows_expose_merged_schema() {
    let engine = FlowEngine::new();
    engine.register_action(
        ActionDefinition::new("setTableTitle", handler_fn(|_ctx, _model, _params| async { Ok(Value::Null) }))
            .with_config_schema(
                ConfigSchema::new().with_field("title", serde_json::json!({ "type": "string", "title": "Table title" })),
            )
            .with_default_params(params! { "title" => "Untitled" }),
    );
    engine
        .register_model_class(
            ModelClass::new("Table")
                .with_flow(
                    FlowDefinition::new("default")
                        .with_title("Table settings")
                        .step(
                            StepDefinition::uses("setTitle", "setTableTitle")
                                .with_default_params(params! { "title" => "Users" }),
                        )
                        .step(StepDefinition::inline(
                            "convertToColumns",
                            handler_fn(|_ctx, _model, _params| async { Ok(Value::Null) }),
                        )),
                )
                .with_flow(FlowDefinition::new("loadData").step(StepDefinition::inline(
                    "fetch",
                    handler_fn(|_ctx, _model, _params| async { Ok(Value::Null) }),
                ))),
        )
        .unwrap();
    let model = engine.create_model(ModelOptions::new("Table")).unwrap();
    model.set_step_params("default", "setTitle", params! { "title" => "Orders" });

    let flows = engine.configurable_flows(&model).unwrap();

    assert_eq!(flows.len(), 1);
    assert_eq!(flows[0].key, "default");
    assert_eq!(flows[0].steps.len(), 1);
    let step = &flows[0].steps[0];
    assert_eq!(step.action.as_deref(), Some("setTableTitle"));
    assert_eq!(step.default_params, params! { "title" => "Users" });
    assert_eq!(step.params, Some(params! { "title" => "Orders" }));
    assert!(step.config_schema.field("title").is_some());
}

#[tokio::test]
async fn initializer_runs_once_per_instance() {
    let engine = FlowEngine::new();
    engine
        .register_model_class(ModelClass::new("Table").with_initializer(|model| {
            model.set_resource("data", Mutex::new(Vec::<String>::new()));
            model.set_prop("initialized", true);
        }))
        .unwrap();

    let model = engine.create_model(ModelOptions::new("Table").with_uid("t1")).unwrap();
    model.remove_prop("initialized");
    let again = engine.create_model(ModelOptions::new("Table").with_uid("t1")).unwrap();

    assert!(again.resource::<Mutex<Vec<String>>>("data").is_some());
    assert_eq!(again.prop("initialized"), None);
}

#[tokio::test]
async fn dropped_engine_detaches_models() {
    let engine = counter_engine();
    let model = engine.create_model(ModelOptions::new("Counter")).unwrap();
    engine.destroy_model(model.uid());
    drop(engine);

    let err = model.apply_flow("add", Params::new()).await.unwrap_err();

    assert!(matches!(err, FlowError::EngineUnavailable(_)));
}

#[tokio::test]
async fn execution_events_report_skips_and_completion() {
    let engine = counter_engine();
    engine
        .register_flow(
            "Counter",
            FlowDefinition::new("mixed")
                .step(StepDefinition::uses("ghost", "missing"))
                .step(StepDefinition::uses("increment", "inc")),
        )
        .unwrap();
    let model = engine.create_model(ModelOptions::new("Counter")).unwrap();
    let mut rx = engine.subscribe_events();

    engine.apply_flow(&model, "mixed", Params::new()).await.unwrap();

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert!(matches!(events.first(), Some(ExecutionEvent::FlowStarted { .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, ExecutionEvent::StepSkipped { step_key, .. } if step_key == "ghost")));
    assert!(matches!(
        events.last(),
        Some(ExecutionEvent::FlowCompleted { success: true, .. })
    ));
}
