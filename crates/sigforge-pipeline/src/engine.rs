//! Pipeline orchestrator: generate, then validate, then optionally summarize.

use std::sync::Arc;
use std::time::Instant;

use tracing::Instrument;

use sigforge_llm::LlmClient;
use sigforge_types::{
    PipelineResult, ProposedSignal, Result, SignalError, SignalRequest, StageFailure,
};

use crate::config::{PipelineConfig, PipelineOptions};
use crate::contract::{GenerateStage, StageContract, SummarizeStage, SummaryInput, ValidateStage};
use crate::events::{EventEmitter, PipelineEvent};
use crate::schema::SchemaRegistry;
use crate::stage::StageRunner;

// ---------------------------------------------------------------------------
// SignalPipeline
// ---------------------------------------------------------------------------

/// Runs the staged signal pipeline. Holds no per-run state, so one instance
/// can serve concurrent runs behind an `Arc`.
#[derive(Clone)]
pub struct SignalPipeline {
    runner: StageRunner,
    options: PipelineOptions,
    events: Option<EventEmitter>,
}

impl SignalPipeline {
    pub fn new(client: Arc<LlmClient>, config: &PipelineConfig) -> Result<Self> {
        config.validate()?;
        let registry = Arc::new(SchemaRegistry::new(config.timeframes.clone()));
        Ok(Self {
            runner: StageRunner::new(client, registry, config),
            options: config.options,
            events: None,
        })
    }

    pub fn with_events(mut self, events: EventEmitter) -> Self {
        self.events = Some(events);
        self
    }

    pub fn options(&self) -> PipelineOptions {
        self.options
    }

    pub fn registry(&self) -> &SchemaRegistry {
        self.runner.registry()
    }

    /// Run the pipeline for one request. Any stage failure aborts the run.
    pub async fn run(&self, request: &SignalRequest) -> Result<PipelineResult> {
        request.validate()?;

        let run_id = uuid::Uuid::new_v4().to_string();
        let span = tracing::info_span!("signal_run", run_id = %run_id, asset = %request.asset);

        async {
            let started = Instant::now();
            self.emit(PipelineEvent::RunStarted {
                run_id: run_id.clone(),
                asset: request.asset.clone(),
            });

            match self.execute(&run_id, request).await {
                Ok(result) => {
                    tracing::info!(is_valid = result.is_valid, "run completed");
                    self.emit(PipelineEvent::RunCompleted {
                        run_id: run_id.clone(),
                        is_valid: result.is_valid,
                        duration_ms: started.elapsed().as_millis() as u64,
                    });
                    Ok(result)
                }
                Err(err) => {
                    tracing::warn!(error = %err, "run aborted");
                    self.emit(PipelineEvent::RunFailed {
                        run_id: run_id.clone(),
                        error: err.to_string(),
                    });
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn execute(&self, run_id: &str, request: &SignalRequest) -> Result<PipelineResult> {
        // generate
        let params = self
            .stage::<GenerateStage>(run_id, request)
            .await
            .map_err(SignalError::GenerationFailed)?;

        let proposed = ProposedSignal::from_parameters(params, request);

        // validate
        let outcome = self
            .stage::<ValidateStage>(run_id, &proposed)
            .await
            .map_err(SignalError::ValidationFailed)?;

        if !outcome.is_consistent() {
            tracing::warn!(
                confidence = %outcome.confidence_level,
                reported = outcome.is_valid,
                "isValid disagrees with confidence level; re-deriving"
            );
        }
        let outcome = outcome.normalized();
        let is_valid = outcome.is_valid;

        // summarize
        let summary = if self.options.summarize {
            let input = SummaryInput {
                proposed_signal: proposed.clone(),
                validation_outcome: outcome.clone(),
            };
            let summary = self
                .stage::<SummarizeStage>(run_id, &input)
                .await
                .map_err(SignalError::SummarizationFailed)?;
            Some(summary)
        } else {
            None
        };

        Ok(PipelineResult {
            proposed_signal: proposed,
            is_valid,
            validation_outcome: self.options.expose_validation.then_some(outcome),
            summary,
        })
    }

    async fn stage<C: StageContract>(
        &self,
        run_id: &str,
        input: &C::Input,
    ) -> std::result::Result<C::Output, StageFailure> {
        let stage = C::STAGE;
        let started = Instant::now();
        tracing::debug!(stage = %stage, "stage started");
        self.emit(PipelineEvent::StageStarted {
            run_id: run_id.to_string(),
            stage,
        });

        match self.runner.run::<C>(input).await {
            Ok(output) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                tracing::info!(stage = %stage, duration_ms, "stage completed");
                self.emit(PipelineEvent::StageCompleted {
                    run_id: run_id.to_string(),
                    stage,
                    duration_ms,
                });
                Ok(output)
            }
            Err(failure) => {
                tracing::warn!(stage = %stage, error = %failure, "stage failed");
                self.emit(PipelineEvent::StageFailed {
                    run_id: run_id.to_string(),
                    stage,
                    error: failure.to_string(),
                });
                Err(failure)
            }
        }
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(ref events) = self.events {
            events.emit(event);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
