use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::models::{RunPhase, TaskResult};

/// Notifications published by the queue scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueEvent {
    StateChanged {
        phase: RunPhase,
    },
    /// `cursor` is the 1-based position of the task just finished.
    Progress {
        cursor: usize,
        total: usize,
        task: String,
        result: Option<TaskResult>,
    },
    Done,
    AnomalyDetected {
        cursor: usize,
        task: String,
    },
}

impl QueueEvent {
    pub fn event_name(&self) -> &'static str {
        match self {
            QueueEvent::StateChanged { .. } => "state_changed",
            QueueEvent::Progress { .. } => "progress",
            QueueEvent::Done => "done",
            QueueEvent::AnomalyDetected { .. } => "anomaly_detected",
        }
    }
}

/// Fire-and-forget fan-out of [`QueueEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<QueueEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes to whoever is listening; no listener is not an error.
    pub fn emit(&self, event: QueueEvent) {
        tracing::debug!(event = event.event_name(), "queue event");
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.sender.subscribe()
    }
}
