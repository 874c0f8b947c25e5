// crates/flowactions/tests/actions_test.rs

use flowcore::{params, FlowDefinition, FlowError, ModelClass, Params, StepDefinition, StepError, Value};
use flowruntime::{ApplyOptions, FlowEngine, ModelOptions};
use pretty_assertions::assert_eq;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;

fn engine_with(class: ModelClass) -> FlowEngine {
    let engine = FlowEngine::new();
    flowactions::register_all(&engine);
    engine.register_model_class(class).unwrap();
    engine
}

#[test]
fn registers_every_standard_action() {
    let engine = FlowEngine::new();

    flowactions::register_all(&engine);

    assert_eq!(
        engine.action_names(),
        vec![
            "debug.log",
            "event.dispatch",
            "flow.apply",
            "props.increment",
            "props.set",
            "props.toggle",
            "time.delay",
        ]
    );
}

#[tokio::test]
async fn set_props_copies_merged_params() {
    let engine = engine_with(ModelClass::new("Table").with_flow(
        FlowDefinition::new("default").step(
            StepDefinition::uses("setTitle", "props.set")
                .with_default_params(params! { "title" => "Users", "height" => 300 }),
        ),
    ));
    let model = engine.create_model(ModelOptions::new("Table")).unwrap();
    model.set_step_params("default", "setTitle", params! { "title" => "Orders" });

    engine.apply_flow(&model, "default", Params::new()).await.unwrap();

    assert_eq!(model.props(), params! { "title" => "Orders", "height" => 300 });
}

#[tokio::test]
async fn increment_uses_action_defaults() {
    let engine = engine_with(
        ModelClass::new("Counter")
            .with_flow(FlowDefinition::new("add").step(StepDefinition::uses("inc", "props.increment"))),
    );
    let model = engine.create_model(ModelOptions::new("Counter")).unwrap();

    for _ in 0..3 {
        engine.apply_flow(&model, "add", Params::new()).await.unwrap();
    }
    engine.apply_flow(&model, "add", params! { "step" => 10 }).await.unwrap();

    assert_eq!(model.prop("count"), Some(Value::from(13)));
}

#[tokio::test]
async fn increment_rejects_non_numeric_prop() {
    let engine = engine_with(
        ModelClass::new("Counter")
            .with_flow(FlowDefinition::new("add").step(StepDefinition::uses("inc", "props.increment"))),
    );
    let model = engine.create_model(ModelOptions::new("Counter")).unwrap();
    model.set_prop("count", "many");

    let err = engine.apply_flow(&model, "add", Params::new()).await.unwrap_err();

    assert_eq!(
        err.step_error(),
        Some(&StepError::InvalidParamType {
            field: "count".into(),
            expected: "number".into(),
            actual: "string".into(),
        })
    );
}

#[tokio::test]
async fn toggle_requires_key() {
    let engine = engine_with(
        ModelClass::new("Panel")
            .with_flow(FlowDefinition::new("flip").step(StepDefinition::uses("toggle", "props.toggle"))),
    );
    let model = engine.create_model(ModelOptions::new("Panel")).unwrap();

    let err = engine.apply_flow(&model, "flip", Params::new()).await.unwrap_err();
    engine.apply_flow(&model, "flip", params! { "key" => "open" }).await.unwrap();

    assert_eq!(err.step_error(), Some(&StepError::MissingParam("key".into())));
    assert_eq!(model.prop("open"), Some(Value::from(true)));
}

#[tokio::test]
async fn apply_flow_action_runs_nested_flow() {
    let engine = engine_with(
        ModelClass::new("Table")
            .with_flow(
                FlowDefinition::new("default").step(
                    StepDefinition::uses("loadInitialData", "flow.apply")
                        .with_default_params(params! { "flow" => "loadData", "params" => params! { "loading" => false } }),
                ),
            )
            .with_flow(FlowDefinition::new("loadData").step(StepDefinition::uses("setLoading", "props.set"))),
    );
    let model = engine.create_model(ModelOptions::new("Table")).unwrap();

    let run = engine.apply_flow(&model, "default", Params::new()).await.unwrap();

    assert_eq!(model.prop("loading"), Some(Value::from(false)));
    assert_eq!(run.output("loadInitialData"), Some(&Value::from(1)));
}

#[tokio::test]
async fn dispatch_action_raises_event_on_same_model() {
    let engine = engine_with(
        ModelClass::new("Table")
            .with_flow(
                FlowDefinition::new("nextPage").step(
                    StepDefinition::uses("raise", "event.dispatch").with_default_params(params! {
                        "event" => "table:pagination:change",
                        "payload" => params! { "current" => 2 },
                    }),
                ),
            )
            .with_flow(
                FlowDefinition::new("pagination")
                    .on_event("table:pagination:change")
                    .step(StepDefinition::uses("update", "props.set")),
            ),
    );
    let model = engine.create_model(ModelOptions::new("Table")).unwrap();

    let run = engine.apply_flow(&model, "nextPage", Params::new()).await.unwrap();

    assert_eq!(model.prop("current"), Some(Value::from(2)));
    assert_eq!(run.output("raise"), Some(&Value::from(vec!["pagination"])));
}

#[tokio::test]
async fn delay_stops_when_cancelled() {
    let engine = engine_with(ModelClass::new("Slow").with_flow(
        FlowDefinition::new("wait")
            .step(StepDefinition::uses("pause", "time.delay").with_default_params(params! { "delay_ms" => 5000 }))
            .step(StepDefinition::uses("after", "props.toggle").with_default_params(params! { "key" => "done" })),
    ));
    let model = engine.create_model(ModelOptions::new("Slow")).unwrap();
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = engine
        .apply_flow_with(&model, "wait", ApplyOptions::default().cancellable(token))
        .await
        .unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(matches!(err, FlowError::Cancelled { completed_steps: 0, .. }));
    assert_eq!(model.prop("done"), None);
}

#[tokio::test]
async fn debug_log_returns_message() {
    let engine = engine_with(ModelClass::new("Block").with_flow(
        FlowDefinition::new("inspect").step(
            StepDefinition::uses("log", "debug.log").with_default_params(params! { "message" => "rendered" }),
        ),
    ));
    let model = engine.create_model(ModelOptions::new("Block")).unwrap();

    let run = engine.apply_flow(&model, "inspect", Params::new()).await.unwrap();

    assert_eq!(run.output("log"), Some(&Value::from("rendered")));
}
