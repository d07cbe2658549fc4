//! Run event system for observability.
//!
//! Emits [`PipelineEvent`]s via a [`tokio::sync::broadcast`] channel so that
//! observers can follow a run's progress without coupling to the orchestrator.

use serde::{Deserialize, Serialize};

use sigforge_types::Stage;

/// Events emitted during a pipeline run and its notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineEvent {
    RunStarted {
        run_id: String,
        asset: String,
    },
    StageStarted {
        run_id: String,
        stage: Stage,
    },
    StageCompleted {
        run_id: String,
        stage: Stage,
        duration_ms: u64,
    },
    StageFailed {
        run_id: String,
        stage: Stage,
        error: String,
    },
    RunCompleted {
        run_id: String,
        is_valid: bool,
        duration_ms: u64,
    },
    RunFailed {
        run_id: String,
        error: String,
    },
    NotificationSkipped {
        asset: String,
        reason: String,
    },
    NotificationDispatched {
        asset: String,
        notifier: String,
    },
}

/// Event emitter wrapping a broadcast sender.
#[derive(Clone)]
pub struct EventEmitter {
    sender: tokio::sync::broadcast::Sender<PipelineEvent>,
}

impl EventEmitter {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all current subscribers.
    ///
    /// If there are no active receivers the event is dropped.
    pub fn emit(&self, event: PipelineEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("receivers", &self.sender.receiver_count())
            .finish()
    }
}
