use async_trait::async_trait;
use serde_json::json;

use crate::provider::transport_error;
use crate::{FinishReason, Message, ProviderAdapter, Request, Response, Role, Usage};
use sigforge_types::SignalError;

// ---------------------------------------------------------------------------
// OpenAiAdapter
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct OpenAiAdapter {
    api_key: String,
    client: reqwest::Client,
    base_url: String,
    default_model: String,
}

impl OpenAiAdapter {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            client: reqwest::Client::new(),
            base_url: "https://api.openai.com".to_string(),
            default_model: "gpt-4o".to_string(),
        }
    }

    pub fn from_env() -> Result<Self, SignalError> {
        let key = std::env::var("OPENAI_API_KEY").map_err(|_| SignalError::AuthError {
            provider: "openai".into(),
        })?;
        Ok(Self::new(key))
    }

    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    fn build_request_body(&self, request: &Request) -> serde_json::Value {
        let input: Vec<serde_json::Value> = request.messages.iter().map(convert_message).collect();

        let mut body = json!({
            "model": request.model,
            "input": input,
        });

        if let Some(max_tokens) = request.max_tokens {
            body["max_output_tokens"] = json!(max_tokens);
        }

        if let Some(temp) = request.temperature {
            body["temperature"] = json!(temp);
        }

        // Optional fields in the stage contracts rule out strict mode.
        if let Some(ref format) = request.response_format {
            body["text"] = json!({
                "format": {
                    "type": "json_schema",
                    "name": format.name,
                    "schema": format.schema,
                    "strict": false,
                }
            });
        }

        body
    }

    fn parse_response(&self, body: serde_json::Value) -> Result<Response, SignalError> {
        let id = body["id"].as_str().unwrap_or("").to_string();
        let model = body["model"].as_str().unwrap_or("").to_string();

        let finish_reason = match (
            body["status"].as_str(),
            body["incomplete_details"]["reason"].as_str(),
        ) {
            (Some("incomplete"), Some("content_filter")) => FinishReason::ContentFilter,
            (Some("incomplete"), _) => FinishReason::MaxTokens,
            _ => FinishReason::EndTurn,
        };

        let mut text_parts: Vec<String> = Vec::new();
        let mut refusal: Option<String> = None;

        if let Some(output) = body["output"].as_array() {
            for item in output.iter().filter(|item| item["type"] == "message") {
                for block in item["content"].as_array().into_iter().flatten() {
                    match block["type"].as_str() {
                        Some("output_text") => {
                            if let Some(t) = block["text"].as_str() {
                                text_parts.push(t.to_string());
                            }
                        }
                        Some("refusal") => {
                            refusal = block["refusal"].as_str().map(String::from);
                        }
                        _ => {}
                    }
                }
            }
        }

        if text_parts.is_empty() {
            if let Some(reason) = refusal {
                return Err(SignalError::ProviderError {
                    provider: "openai".into(),
                    status: 0,
                    message: format!("Model refused: {reason}"),
                });
            }
        }

        let usage_obj = &body["usage"];
        let input_tokens = usage_obj["input_tokens"].as_u64().unwrap_or(0);
        let output_tokens = usage_obj["output_tokens"].as_u64().unwrap_or(0);

        Ok(Response {
            id,
            text: text_parts.join(""),
            usage: Usage {
                input_tokens,
                output_tokens,
                total_tokens: input_tokens + output_tokens,
            },
            model,
            finish_reason,
        })
    }
}

// ---------------------------------------------------------------------------
// Message conversion helpers
// ---------------------------------------------------------------------------

fn convert_message(msg: &Message) -> serde_json::Value {
    let role = match msg.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    };

    json!({
        "role": role,
        "content": msg.text,
    })
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn map_error(status: reqwest::StatusCode, body: &str) -> SignalError {
    let status_u16 = status.as_u16();
    match status_u16 {
        429 => {
            let retry_ms = serde_json::from_str::<serde_json::Value>(body)
                .ok()
                .and_then(|v| v["error"]["retry_after"].as_f64())
                .map(|s| (s * 1000.0) as u64)
                .unwrap_or(1000);
            SignalError::RateLimited {
                provider: "openai".into(),
                retry_after_ms: retry_ms,
            }
        }
        401 => SignalError::AuthError {
            provider: "openai".into(),
        },
        408 | 504 => SignalError::RequestTimeout {
            provider: "openai".into(),
        },
        _ => SignalError::ProviderError {
            provider: "openai".into(),
            status: status_u16,
            message: extract_error_message(body),
        },
    }
}

fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(String::from))
        .unwrap_or_else(|| body.to_string())
}

// ---------------------------------------------------------------------------
// ProviderAdapter implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    async fn complete(&self, request: &Request) -> Result<Response, SignalError> {
        let body = self.build_request_body(request);

        let resp = self
            .client
            .post(format!("{}/v1/responses", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error("openai", e))?;

        let status = resp.status();
        let response_body = resp
            .text()
            .await
            .map_err(|e| transport_error("openai", e))?;

        if !status.is_success() {
            return Err(map_error(status, &response_body));
        }

        let json: serde_json::Value =
            serde_json::from_str(&response_body).map_err(|e| SignalError::ProviderError {
                provider: "openai".into(),
                status: status.as_u16(),
                message: format!("Failed to parse response JSON: {e}"),
            })?;

        self.parse_response(json)
    }

    fn name(&self) -> &str {
        "openai"
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn supports_structured_output(&self) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
