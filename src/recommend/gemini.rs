//! Google Gemini `generateContent` client.
//!
//! The key travels as the `key` query parameter. 401/403, and 400 responses
//! that name an invalid key, are reported as [`AiError::Auth`] so the UI can
//! ask for a new key instead of offering a retry.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::types::{AiError, RecommendationTransport};
use crate::config::GeminiConfig;

const MAX_OUTPUT_TOKENS: u32 = 1024;
const TEMPERATURE: f32 = 0.7;

pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(config: &GeminiConfig) -> Result<Self, AiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| AiError::HttpClientBuild(e.to_string()))?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl RecommendationTransport for GeminiClient {
    async fn generate(&self, api_key: &str, prompt: &str) -> Result<String, AiError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let body = GenerateRequest {
            contents: vec![RequestContent {
                role: "user",
                parts: vec![RequestPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: TEMPERATURE,
                max_output_tokens: MAX_OUTPUT_TOKENS,
                response_mime_type: "application/json",
            },
        };

        let response = self
            .http
            .post(url)
            .query(&[("key", api_key)])
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(transport_error)?;
        debug!(status, bytes = text.len(), model = %self.model, "gemini responded");

        if status == 401 || status == 403 || (status == 400 && names_invalid_key(&text)) {
            warn!(status, "gemini rejected the API key");
            return Err(AiError::Auth { status });
        }
        if !(200..300).contains(&status) {
            return Err(AiError::Network {
                status: Some(status),
                message: provider_message(&text).unwrap_or_else(|| format!("status {status}")),
            });
        }
        extract_text(&text)
    }
}

/// The request URL carries the API key, so it is stripped before the error
/// can reach a log line or a response body.
fn transport_error(e: reqwest::Error) -> AiError {
    if e.is_timeout() {
        AiError::Timeout
    } else {
        AiError::Network {
            status: None,
            message: e.without_url().to_string(),
        }
    }
}

fn names_invalid_key(body: &str) -> bool {
    body.contains("API_KEY_INVALID") || body.contains("API key not valid")
}

fn provider_message(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .map(|e| e.error.message)
}

/// Concatenate the text parts of the first candidate.
fn extract_text(body: &str) -> Result<String, AiError> {
    let parsed: GenerateResponse = serde_json::from_str(body)
        .map_err(|e| AiError::parse(format!("unexpected response body: {e}"), body))?;

    let Some(candidate) = parsed.candidates.into_iter().next() else {
        let reason = parsed
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .map(|r| format!("no candidates (blocked: {r})"))
            .unwrap_or_else(|| "no candidates".to_string());
        return Err(AiError::parse(reason, body));
    };

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();
    if text.trim().is_empty() {
        let reason = match candidate.finish_reason {
            Some(r) => format!("empty candidate (finish reason {r})"),
            None => "empty candidate".to_string(),
        };
        return Err(AiError::parse(reason, body));
    }
    Ok(text)
}

// --- wire types ---

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct RequestContent<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    response_mime_type: &'static str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> GeminiClient {
        let config = GeminiConfig {
            api_key: None,
            model: "gemini-test".into(),
            base_url: server.uri(),
            request_timeout_secs: 5,
            connect_timeout_secs: 2,
        };
        GeminiClient::new(&config).expect("client")
    }

    fn candidate_body(text: &str) -> serde_json::Value {
        serde_json::json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": text }] },
                "finishReason": "STOP"
            }]
        })
    }

    #[tokio::test]
    async fn returns_candidate_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-test:generateContent"))
            .and(query_param("key", "good-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(candidate_body("{\"suggestions\":[]}")))
            .expect(1)
            .mount(&server)
            .await;

        let text = client_for(&server)
            .generate("good-key", "suggest lunch")
            .await
            .expect("text");
        assert_eq!(text, "{\"suggestions\":[]}");
    }

    #[tokio::test]
    async fn unauthorized_maps_to_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;

        let err = client_for(&server).generate("k", "p").await.unwrap_err();
        assert!(matches!(err, AiError::Auth { status: 403 }));
    }

    #[tokio::test]
    async fn invalid_key_400_maps_to_auth() {
        let server = MockServer::start().await;
        let body = serde_json::json!({
            "error": { "code": 400, "message": "API key not valid. Please pass a valid API key.", "status": "INVALID_ARGUMENT" }
        });
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(body))
            .mount(&server)
            .await;

        let err = client_for(&server).generate("bad", "p").await.unwrap_err();
        assert!(matches!(err, AiError::Auth { status: 400 }));
    }

    #[tokio::test]
    async fn server_error_maps_to_network() {
        let server = MockServer::start().await;
        let body = serde_json::json!({ "error": { "code": 500, "message": "backend overloaded" } });
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_json(body))
            .mount(&server)
            .await;

        let err = client_for(&server).generate("k", "p").await.unwrap_err();
        match err {
            AiError::Network { status, message } => {
                assert_eq!(status, Some(500));
                assert_eq!(message, "backend overloaded");
            }
            other => panic!("expected network error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_provider_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(candidate_body("late"))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let config = GeminiConfig {
            api_key: None,
            model: "gemini-test".into(),
            base_url: server.uri(),
            request_timeout_secs: 1,
            connect_timeout_secs: 1,
        };
        let err = GeminiClient::new(&config)
            .unwrap()
            .generate("k", "p")
            .await
            .unwrap_err();
        assert!(matches!(err, AiError::Timeout));
    }

    #[tokio::test]
    async fn connection_failure_does_not_echo_the_key() {
        let config = GeminiConfig {
            api_key: None,
            model: "gemini-test".into(),
            base_url: "http://127.0.0.1:1".into(),
            request_timeout_secs: 5,
            connect_timeout_secs: 2,
        };
        let err = GeminiClient::new(&config)
            .unwrap()
            .generate("SECRET-KEY-123", "p")
            .await
            .unwrap_err();

        assert!(matches!(err, AiError::Network { status: None, .. }));
        assert!(!err.to_string().contains("SECRET-KEY-123"));
        assert!(!format!("{err:?}").contains("SECRET-KEY-123"));
    }

    #[test]
    fn blocked_prompt_is_parse_error_with_raw_body() {
        let body = r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#;
        match extract_text(body).unwrap_err() {
            AiError::Parse { reason, raw } => {
                assert!(reason.contains("SAFETY"));
                assert_eq!(raw, body);
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn joins_multiple_parts() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"{\"a\":"},{"text":"1}"}]}}]}"#;
        assert_eq!(extract_text(body).unwrap(), "{\"a\":1}");
    }
}
