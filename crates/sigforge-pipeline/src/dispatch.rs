//! Gate & dispatch: hands validated results to the notifier on a detached task.

use std::sync::Arc;

use tokio::task::JoinHandle;

use sigforge_types::{PipelineResult, SignalRequest};

use crate::events::{EventEmitter, PipelineEvent};
use crate::notifier::Notifier;

#[derive(Clone, Default)]
pub struct Dispatcher {
    notifier: Option<Arc<dyn Notifier>>,
    events: Option<EventEmitter>,
}

impl Dispatcher {
    pub fn with_notifier(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifier = Some(Arc::new(notifier));
        self
    }

    pub fn with_events(mut self, events: EventEmitter) -> Self {
        self.events = Some(events);
        self
    }

    pub fn has_notifier(&self) -> bool {
        self.notifier.is_some()
    }

    /// Start a notification for a valid result and return without waiting.
    ///
    /// Returns `None` when nothing was started. Notifier errors are logged in
    /// the spawned task and never reach the caller.
    pub fn maybe_notify(
        &self,
        request: &SignalRequest,
        result: &PipelineResult,
    ) -> Option<JoinHandle<()>> {
        if !result.is_valid {
            tracing::info!(asset = %request.asset, "signal not validated; skipping notification");
            self.emit(PipelineEvent::NotificationSkipped {
                asset: request.asset.clone(),
                reason: "not valid".into(),
            });
            return None;
        }

        let Some(notifier) = self.notifier.clone() else {
            tracing::debug!(asset = %request.asset, "no notifier configured; skipping notification");
            self.emit(PipelineEvent::NotificationSkipped {
                asset: request.asset.clone(),
                reason: "no notifier configured".into(),
            });
            return None;
        };

        self.emit(PipelineEvent::NotificationDispatched {
            asset: request.asset.clone(),
            notifier: notifier.name().to_string(),
        });

        let request = request.clone();
        let result = result.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = notifier.notify(&request, &result).await {
                tracing::error!(
                    notifier = notifier.name(),
                    asset = %request.asset,
                    error = %e,
                    "notification failed"
                );
            }
        }))
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(ref events) = self.events {
            events.emit(event);
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("notifier", &self.notifier.as_ref().map(|n| n.name().to_string()))
            .finish()
    }
}
