//! Completion stage runner: one structured completion per stage, checked
//! against the stage's output schema before it is trusted.

use std::sync::Arc;

use serde_json::Value;

use sigforge_llm::{LlmClient, Message, Request, ResponseFormat};
use sigforge_types::{FailureCause, StageFailure};

use crate::config::PipelineConfig;
use crate::contract::StageContract;
use crate::schema::{SchemaDirection, SchemaRegistry};

#[derive(Clone)]
pub struct StageRunner {
    client: Arc<LlmClient>,
    registry: Arc<SchemaRegistry>,
    model: String,
    provider: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl StageRunner {
    pub fn new(client: Arc<LlmClient>, registry: Arc<SchemaRegistry>, config: &PipelineConfig) -> Self {
        Self {
            client,
            registry,
            model: config.model.clone(),
            provider: config.provider.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Build the completion request for `input` without sending it.
    pub fn build_request<C: StageContract>(&self, input: &C::Input) -> Request {
        let schema = self
            .registry
            .schema(C::STAGE, SchemaDirection::Output)
            .to_json_schema();

        let mut request = Request::new(
            self.model.clone(),
            vec![
                Message::system(C::system_prompt()),
                Message::user(C::render(input)),
            ],
        )
        .with_response_format(ResponseFormat {
            name: C::STAGE.contract_name().to_string(),
            schema,
        });
        request.provider = self.provider.clone();
        request.temperature = self.temperature;
        request.max_tokens = self.max_tokens;
        request
    }

    /// Run one stage: exactly one completion call, no retries.
    pub async fn run<C: StageContract>(&self, input: &C::Input) -> Result<C::Output, StageFailure> {
        let stage = C::STAGE;
        let request = self.build_request::<C>(input);

        let response = self
            .client
            .complete(&request)
            .await
            .map_err(|e| StageFailure::new(stage, e))?;

        if response.is_empty() {
            return Err(StageFailure::new(stage, FailureCause::EmptyResponse));
        }

        let body = extract_json(&response.text);
        if body.is_empty() {
            return Err(StageFailure::new(stage, FailureCause::EmptyResponse));
        }

        let candidate: Value = serde_json::from_str(body)
            .map_err(|e| StageFailure::new(stage, FailureCause::MalformedOutput(e.to_string())))?;

        let output = self
            .registry
            .validate::<C::Output>(stage, SchemaDirection::Output, &candidate)
            .map_err(|violation| StageFailure::new(stage, violation))?;

        tracing::debug!(
            stage = %stage,
            tokens = response.usage.total_tokens,
            "stage output accepted"
        );
        Ok(output)
    }
}

/// Pull the JSON body out of a completion that may wrap it in a markdown fence,
/// with or without prose around the fence.
pub fn extract_json(text: &str) -> &str {
    let text = text.trim();
    if text.starts_with('{') {
        return text;
    }
    let Some(open) = text.find("```") else {
        return text;
    };

    // Skip the language tag on the opening fence line.
    let after = &text[open + 3..];
    let body = match after.find('\n') {
        Some(idx) => &after[idx + 1..],
        None => after.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };
    match body.find("```") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}
