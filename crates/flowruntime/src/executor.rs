use crate::resolver::{ResolvedStep, StepResolution, StepResolver};
use chrono::Utc;
use flowcore::{
    EventBus, ExecutionContext, ExecutionEvent, ExecutionId, FlowDefinition, FlowError, FlowModel,
    FlowRun, Params, StepError, Trigger, Value,
};
use std::collections::HashMap;
use std::time::Instant;
use tokio::time::{timeout, Duration};
use tokio_util::sync::CancellationToken;

/// Runs the steps of one flow, in declaration order, one at a time
pub struct FlowExecutor {
    resolver: StepResolver,
    step_timeout: Option<Duration>,
}

impl FlowExecutor {
    pub fn new(resolver: StepResolver, step_timeout: Option<Duration>) -> Self {
        Self {
            resolver,
            step_timeout,
        }
    }

    pub fn resolver(&self) -> &StepResolver {
        &self.resolver
    }

    /// Execute `flow` against `model`.
    ///
    /// A failing step aborts the remaining steps and its error is returned;
    /// whatever earlier steps changed on the model stays changed.
    pub async fn execute(
        &self,
        flow: &FlowDefinition,
        model: &FlowModel,
        trigger: Trigger,
        invocation: Params,
        cancellation: CancellationToken,
        event_bus: &EventBus,
    ) -> Result<FlowRun, FlowError> {
        let execution_id = ExecutionId::new_v4();
        let start_time = Instant::now();

        event_bus.emit(ExecutionEvent::FlowStarted {
            execution_id,
            model_uid: model.uid().to_string(),
            flow_key: flow.key.clone(),
            trigger: trigger.label(),
            timestamp: Utc::now(),
        });

        tracing::info!(
            "Starting flow '{}' on model '{}' ({})",
            flow.key,
            model.uid(),
            trigger.label()
        );

        let ctx = ExecutionContext {
            execution_id,
            flow_key: flow.key.clone(),
            model_uid: model.uid().to_string(),
            trigger,
            events: event_bus.create_emitter(execution_id, &flow.key),
            cancellation,
        };

        let result = self.run_steps(flow, model, &ctx, &invocation, event_bus).await;

        let duration_ms = start_time.elapsed().as_millis() as u64;
        event_bus.emit(ExecutionEvent::FlowCompleted {
            execution_id,
            flow_key: flow.key.clone(),
            success: result.is_ok(),
            duration_ms,
            timestamp: Utc::now(),
        });

        match &result {
            Ok(run) => tracing::info!(
                "Flow '{}' completed in {}ms ({} run, {} skipped)",
                flow.key,
                duration_ms,
                run.completed_steps.len(),
                run.skipped_steps.len()
            ),
            Err(e) => tracing::error!("Flow '{}' failed after {}ms: {}", flow.key, duration_ms, e),
        }

        result
    }

    async fn run_steps(
        &self,
        flow: &FlowDefinition,
        model: &FlowModel,
        ctx: &ExecutionContext,
        invocation: &Params,
        event_bus: &EventBus,
    ) -> Result<FlowRun, FlowError> {
        let mut run = FlowRun {
            execution_id: ctx.execution_id,
            flow_key: flow.key.clone(),
            completed_steps: Vec::new(),
            skipped_steps: Vec::new(),
            outputs: HashMap::new(),
        };

        for step in &flow.steps {
            if ctx.cancellation.is_cancelled() {
                return Err(FlowError::Cancelled {
                    flow_key: flow.key.clone(),
                    completed_steps: run.completed_steps.len(),
                });
            }

            // Resolved lazily so each step sees the registry as it is now
            let resolved = match self.resolver.resolve(step, model, &flow.key, invocation) {
                StepResolution::Ready(resolved) => resolved,
                StepResolution::Inert { step_key, reason } => {
                    tracing::warn!("Skipping step '{}' of flow '{}': {}", step_key, flow.key, reason);
                    event_bus.emit(ExecutionEvent::StepSkipped {
                        execution_id: ctx.execution_id,
                        flow_key: flow.key.clone(),
                        step_key: step_key.clone(),
                        reason,
                        timestamp: Utc::now(),
                    });
                    run.skipped_steps.push(step_key);
                    continue;
                }
            };

            event_bus.emit(ExecutionEvent::StepStarted {
                execution_id: ctx.execution_id,
                flow_key: flow.key.clone(),
                step_key: resolved.key.clone(),
                timestamp: Utc::now(),
            });
            tracing::debug!("Running step '{}' of flow '{}'", resolved.key, flow.key);

            let start = Instant::now();
            let step_key = resolved.key.clone();
            let outcome = self.invoke(resolved, ctx, model).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            match outcome {
                Ok(output) => {
                    tracing::debug!("Step '{}' completed in {}ms", step_key, duration_ms);
                    event_bus.emit(ExecutionEvent::StepCompleted {
                        execution_id: ctx.execution_id,
                        flow_key: flow.key.clone(),
                        step_key: step_key.clone(),
                        output: output.clone(),
                        duration_ms,
                        timestamp: Utc::now(),
                    });
                    run.outputs.insert(step_key.clone(), output);
                    run.completed_steps.push(step_key);
                }
                Err(e) => {
                    tracing::error!("Step '{}' of flow '{}' failed: {}", step_key, flow.key, e);
                    event_bus.emit(ExecutionEvent::StepFailed {
                        execution_id: ctx.execution_id,
                        flow_key: flow.key.clone(),
                        step_key: step_key.clone(),
                        error: e.to_string(),
                        timestamp: Utc::now(),
                    });

                    if e == StepError::Cancelled {
                        return Err(FlowError::Cancelled {
                            flow_key: flow.key.clone(),
                            completed_steps: run.completed_steps.len(),
                        });
                    }
                    return Err(FlowError::Step {
                        flow_key: flow.key.clone(),
                        step_key,
                        source: e,
                    });
                }
            }
        }

        Ok(run)
    }

    async fn invoke(
        &self,
        step: ResolvedStep,
        ctx: &ExecutionContext,
        model: &FlowModel,
    ) -> Result<Value, StepError> {
        let ResolvedStep { handler, params, .. } = step;
        let task = handler.execute(ctx, model, params);

        match self.step_timeout {
            Some(limit) => match timeout(limit, task).await {
                Ok(result) => result,
                Err(_) => Err(StepError::Timeout {
                    millis: limit.as_millis() as u64,
                }),
            },
            None => task.await,
        }
    }
}
