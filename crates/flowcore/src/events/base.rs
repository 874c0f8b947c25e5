use crate::Value;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

pub type ExecutionId = Uuid;

/// Events emitted while flows execute
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExecutionEvent {
    FlowStarted {
        execution_id: ExecutionId,
        model_uid: String,
        flow_key: String,
        trigger: String,
        timestamp: DateTime<Utc>,
    },
    FlowCompleted {
        execution_id: ExecutionId,
        flow_key: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    StepStarted {
        execution_id: ExecutionId,
        flow_key: String,
        step_key: String,
        timestamp: DateTime<Utc>,
    },
    StepCompleted {
        execution_id: ExecutionId,
        flow_key: String,
        step_key: String,
        output: Value,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    StepSkipped {
        execution_id: ExecutionId,
        flow_key: String,
        step_key: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    StepFailed {
        execution_id: ExecutionId,
        flow_key: String,
        step_key: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
    StepEvent {
        execution_id: ExecutionId,
        flow_key: String,
        event: StepEvent,
        timestamp: DateTime<Utc>,
    },
}

impl ExecutionEvent {
    pub fn execution_id(&self) -> ExecutionId {
        match self {
            ExecutionEvent::FlowStarted { execution_id, .. }
            | ExecutionEvent::FlowCompleted { execution_id, .. }
            | ExecutionEvent::StepStarted { execution_id, .. }
            | ExecutionEvent::StepCompleted { execution_id, .. }
            | ExecutionEvent::StepSkipped { execution_id, .. }
            | ExecutionEvent::StepFailed { execution_id, .. }
            | ExecutionEvent::StepEvent { execution_id, .. } => *execution_id,
        }
    }
}

/// Events raised by step handlers themselves
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum StepEvent {
    Info { message: String },
    Warning { message: String },
    Progress { percent: f64, message: Option<String> },
}

/// Emitter handed to step handlers through the execution context
#[derive(Clone)]
pub struct EventEmitter {
    execution_id: ExecutionId,
    flow_key: String,
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventEmitter {
    pub fn new(
        execution_id: ExecutionId,
        flow_key: impl Into<String>,
        sender: broadcast::Sender<ExecutionEvent>,
    ) -> Self {
        Self {
            execution_id,
            flow_key: flow_key.into(),
            sender,
        }
    }

    pub fn emit(&self, event: StepEvent) {
        // No subscribers is fine
        let _ = self.sender.send(ExecutionEvent::StepEvent {
            execution_id: self.execution_id,
            flow_key: self.flow_key.clone(),
            event,
            timestamp: Utc::now(),
        });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit(StepEvent::Info {
            message: message.into(),
        });
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.emit(StepEvent::Warning {
            message: message.into(),
        });
    }

    pub fn progress(&self, percent: f64, message: Option<String>) {
        self.emit(StepEvent::Progress { percent, message });
    }
}

/// Engine-wide event bus
pub struct EventBus {
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: ExecutionEvent) {
        let _ = self.sender.send(event);
    }

    pub fn create_emitter(&self, execution_id: ExecutionId, flow_key: &str) -> EventEmitter {
        EventEmitter::new(execution_id, flow_key, self.sender.clone())
    }
}
