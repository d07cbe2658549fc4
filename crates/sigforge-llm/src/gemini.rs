use async_trait::async_trait;
use serde_json::json;

use crate::provider::transport_error;
use crate::{FinishReason, Message, ProviderAdapter, Request, Response, Role, Usage};
use sigforge_types::SignalError;

// ---------------------------------------------------------------------------
// GeminiAdapter
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct GeminiAdapter {
    api_key: String,
    client: reqwest::Client,
    base_url: String,
    default_model: String,
}

impl GeminiAdapter {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            client: reqwest::Client::new(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            default_model: "gemini-2.5-flash".to_string(),
        }
    }

    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    pub fn from_env() -> Result<Self, SignalError> {
        let key = std::env::var("GOOGLE_API_KEY")
            .or_else(|_| std::env::var("GEMINI_API_KEY"))
            .map_err(|_| SignalError::AuthError {
                provider: "google".into(),
            })?;
        Ok(Self::new(key))
    }

    fn build_request_body(&self, request: &Request) -> serde_json::Value {
        // 1. System messages become systemInstruction
        let contents: Vec<serde_json::Value> = request
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(convert_message)
            .collect();

        let mut body = json!({
            "contents": contents,
        });

        if let Some(system) = request.system_text() {
            body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
        }

        // 2. Generation config, including the structured-output contract
        let mut gen_config = json!({});
        if let Some(max_tokens) = request.max_tokens {
            gen_config["maxOutputTokens"] = json!(max_tokens);
        }
        if let Some(temp) = request.temperature {
            gen_config["temperature"] = json!(temp);
        }
        if let Some(ref format) = request.response_format {
            gen_config["responseMimeType"] = json!("application/json");
            gen_config["responseJsonSchema"] = format.schema.clone();
        }
        if gen_config.as_object().map_or(false, |o| !o.is_empty()) {
            body["generationConfig"] = gen_config;
        }

        body
    }

    fn parse_response(&self, json: serde_json::Value) -> Result<Response, SignalError> {
        if let Some(reason) = json["promptFeedback"]["blockReason"].as_str() {
            return Err(SignalError::ProviderError {
                provider: "google".into(),
                status: 0,
                message: format!("Prompt blocked: {reason}"),
            });
        }

        let candidates = json["candidates"]
            .as_array()
            .ok_or_else(|| SignalError::ProviderError {
                provider: "google".into(),
                status: 0,
                message: "Missing candidates in response".into(),
            })?;

        let candidate = candidates.first().ok_or_else(|| SignalError::ProviderError {
            provider: "google".into(),
            status: 0,
            message: "Empty candidates array".into(),
        })?;

        let finish_reason = match candidate["finishReason"].as_str() {
            Some("MAX_TOKENS") => FinishReason::MaxTokens,
            Some("SAFETY") | Some("RECITATION") | Some("BLOCKLIST") => FinishReason::ContentFilter,
            Some("STOP_SEQUENCE") => FinishReason::StopSequence,
            _ => FinishReason::EndTurn,
        };

        // Thought parts are not part of the answer.
        let text: String = candidate["content"]["parts"]
            .as_array()
            .map(|parts| {
                parts
                    .iter()
                    .filter(|p| !p["thought"].as_bool().unwrap_or(false))
                    .filter_map(|p| p["text"].as_str())
                    .collect()
            })
            .unwrap_or_default();

        let usage_meta = &json["usageMetadata"];
        let input_tokens = usage_meta["promptTokenCount"].as_u64().unwrap_or(0);
        let output_tokens = usage_meta["candidatesTokenCount"].as_u64().unwrap_or(0);
        let total_tokens = usage_meta["totalTokenCount"]
            .as_u64()
            .unwrap_or(input_tokens + output_tokens);

        Ok(Response {
            id: json["responseId"]
                .as_str()
                .map(String::from)
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            text,
            usage: Usage {
                input_tokens,
                output_tokens,
                total_tokens,
            },
            model: json["modelVersion"].as_str().unwrap_or("").to_string(),
            finish_reason,
        })
    }
}

// ---------------------------------------------------------------------------
// Message conversion helpers
// ---------------------------------------------------------------------------

fn convert_message(msg: &Message) -> serde_json::Value {
    let role = match msg.role {
        Role::Assistant => "model",
        Role::User | Role::System => "user",
    };

    json!({
        "role": role,
        "parts": [{ "text": msg.text }]
    })
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn map_error(status: reqwest::StatusCode, body: &str) -> SignalError {
    let status_u16 = status.as_u16();
    match status_u16 {
        429 => SignalError::RateLimited {
            provider: "google".into(),
            retry_after_ms: 1000,
        },
        401 | 403 => SignalError::AuthError {
            provider: "google".into(),
        },
        408 | 504 => SignalError::RequestTimeout {
            provider: "google".into(),
        },
        _ => SignalError::ProviderError {
            provider: "google".into(),
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
impl ProviderAdapter for GeminiAdapter {
    async fn complete(&self, request: &Request) -> Result<Response, SignalError> {
        let body = self.build_request_body(request);
        let model = if request.model.is_empty() {
            &self.default_model
        } else {
            &request.model
        };

        let url = format!("{}/models/{}:generateContent", self.base_url, model);

        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error("google", e))?;

        let status = resp.status();
        let response_body = resp
            .text()
            .await
            .map_err(|e| transport_error("google", e))?;

        if !status.is_success() {
            return Err(map_error(status, &response_body));
        }

        let json: serde_json::Value =
            serde_json::from_str(&response_body).map_err(|e| SignalError::ProviderError {
                provider: "google".into(),
                status: status.as_u16(),
                message: format!("Failed to parse response JSON: {e}"),
            })?;

        let mut response = self.parse_response(json)?;
        if response.model.is_empty() {
            response.model = model.to_string();
        }
        Ok(response)
    }

    fn name(&self) -> &str {
        "google"
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ResponseFormat;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn make_basic_request() -> Request {
        let mut req = Request::new(
            "gemini-2.5-flash",
            vec![
                Message::system("You are an expert trading analyst."),
                Message::user("Asset: AAPL"),
            ],
        );
        req.max_tokens = Some(1024);
        req
    }

    fn signal_format() -> ResponseFormat {
        ResponseFormat {
            name: "generate_trading_signal".into(),
            schema: json!({
                "type": "object",
                "properties": { "tradeDirection": { "type": "string", "enum": ["BUY", "SELL"] } },
                "required": ["tradeDirection"]
            }),
        }
    }

    #[test]
    fn new_sets_defaults() {
        let adapter = GeminiAdapter::new("test-google-key".into());
        assert_eq!(adapter.api_key, "test-google-key");
        assert_eq!(adapter.default_model, "gemini-2.5-flash");
        assert!(adapter.base_url.contains("generativelanguage.googleapis.com"));
    }

    #[test]
    fn build_request_body_extracts_system_instruction() {
        let adapter = GeminiAdapter::new("test-key".into());
        let body = adapter.build_request_body(&make_basic_request());

        let parts = body["systemInstruction"]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0]["text"], "You are an expert trading analyst.");

        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 1);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[0]["parts"][0]["text"], "Asset: AAPL");
    }

    #[test]
    fn build_request_body_includes_response_schema() {
        let adapter = GeminiAdapter::new("test-key".into());
        let mut req = make_basic_request().with_response_format(signal_format());
        req.temperature = Some(0.2);

        let body = adapter.build_request_body(&req);
        let config = &body["generationConfig"];
        assert_eq!(config["responseMimeType"], "application/json");
        assert_eq!(
            config["responseJsonSchema"]["properties"]["tradeDirection"]["enum"][1],
            "SELL"
        );
        assert_eq!(config["maxOutputTokens"], 1024);
        assert!((config["temperature"].as_f64().unwrap() - 0.2).abs() < 0.001);
    }

    #[test]
    fn build_request_body_without_optional_fields() {
        let adapter = GeminiAdapter::new("test-key".into());
        let req = Request::new("gemini-2.5-flash", vec![Message::user("Hi")]);
        let body = adapter.build_request_body(&req);
        assert!(body.get("generationConfig").is_none());
        assert!(body.get("systemInstruction").is_none());
    }

    #[test]
    fn parse_response_joins_text_and_skips_thoughts() {
        let adapter = GeminiAdapter::new("test-key".into());
        let json = json!({
            "responseId": "resp-42",
            "modelVersion": "gemini-2.5-flash",
            "candidates": [{
                "content": {
                    "parts": [
                        { "text": "weighing RSI...", "thought": true },
                        { "text": "{\"tradeDirection\":" },
                        { "text": " \"BUY\"}" }
                    ],
                    "role": "model"
                },
                "finishReason": "STOP"
            }],
            "usageMetadata": {
                "promptTokenCount": 10,
                "candidatesTokenCount": 20,
                "totalTokenCount": 30
            }
        });

        let resp = adapter.parse_response(json).unwrap();
        assert_eq!(resp.id, "resp-42");
        assert_eq!(resp.model, "gemini-2.5-flash");
        assert_eq!(resp.text, "{\"tradeDirection\": \"BUY\"}");
        assert_eq!(resp.finish_reason, FinishReason::EndTurn);
        assert_eq!(resp.usage.total_tokens, 30);
    }

    #[test]
    fn parse_response_without_parts_is_empty() {
        let adapter = GeminiAdapter::new("test-key".into());
        let json = json!({
            "candidates": [{ "finishReason": "SAFETY" }]
        });
        let resp = adapter.parse_response(json).unwrap();
        assert!(resp.is_empty());
        assert_eq!(resp.finish_reason, FinishReason::ContentFilter);
    }

    #[test]
    fn parse_response_blocked_prompt_is_error() {
        let adapter = GeminiAdapter::new("test-key".into());
        let json = json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        let err = adapter.parse_response(json).unwrap_err();
        assert!(err.to_string().contains("Prompt blocked: SAFETY"));
    }

    #[test]
    fn parse_response_missing_candidates_is_error() {
        let adapter = GeminiAdapter::new("test-key".into());
        assert!(adapter.parse_response(json!({})).is_err());
        assert!(adapter.parse_response(json!({ "candidates": [] })).is_err());
    }

    #[test]
    fn error_mapping() {
        assert!(matches!(
            map_error(reqwest::StatusCode::TOO_MANY_REQUESTS, "{}"),
            SignalError::RateLimited { .. }
        ));
        assert!(matches!(
            map_error(reqwest::StatusCode::FORBIDDEN, "{}"),
            SignalError::AuthError { .. }
        ));
        match map_error(
            reqwest::StatusCode::BAD_REQUEST,
            r#"{"error": {"message": "Invalid JSON schema"}}"#,
        ) {
            SignalError::ProviderError {
                status, message, ..
            } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Invalid JSON schema");
            }
            other => panic!("expected ProviderError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn complete_posts_to_generate_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.5-flash:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": { "parts": [{ "text": "{\"tradeDirection\": \"SELL\"}" }] },
                    "finishReason": "STOP"
                }],
                "usageMetadata": { "promptTokenCount": 3, "candidatesTokenCount": 4 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = GeminiAdapter::new("test-key".into()).with_base_url(server.uri());
        let req = make_basic_request().with_response_format(signal_format());
        let resp = adapter.complete(&req).await.unwrap();

        assert_eq!(resp.text, "{\"tradeDirection\": \"SELL\"}");
        assert_eq!(resp.model, "gemini-2.5-flash");
        assert_eq!(resp.usage.total_tokens, 7);
    }

    #[tokio::test]
    async fn complete_maps_http_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(503)
                    .set_body_json(json!({ "error": { "message": "model overloaded" } })),
            )
            .mount(&server)
            .await;

        let adapter = GeminiAdapter::new("test-key".into()).with_base_url(server.uri());
        let err = adapter.complete(&make_basic_request()).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Provider google returned HTTP 503: model overloaded"
        );
    }

    #[tokio::test]
    async fn slow_response_maps_to_request_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(std::time::Duration::from_millis(500))
                    .set_body_json(json!({ "candidates": [] })),
            )
            .mount(&server)
            .await;

        let mut adapter = GeminiAdapter::new("test-key".into()).with_base_url(server.uri());
        adapter.client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(50))
            .build()
            .unwrap();

        let err = adapter.complete(&make_basic_request()).await.unwrap_err();
        assert!(matches!(err, SignalError::RequestTimeout { ref provider } if provider == "google"));
    }

    #[test]
    fn gateway_timeout_status_maps_to_request_timeout() {
        let err = map_error(reqwest::StatusCode::GATEWAY_TIMEOUT, "");
        assert!(matches!(err, SignalError::RequestTimeout { .. }));
    }
}
