//! Google Gemini `generateContent` provider.

use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use reqwest::{Client, StatusCode, header::RETRY_AFTER};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{AiError, AiFuture, Prompt, Provider};
use crate::config::{ApiKey, Config};

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text { text: &'a str },
    InlineData { inline_data: InlineData<'a> },
}

#[derive(Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: String,
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
    parts: Vec<ReplyPart>,
}

#[derive(Deserialize)]
struct ReplyPart {
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
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    details: Vec<serde_json::Value>,
}

/// Calls `POST {base_url}/models/{model}:generateContent`.
pub struct GeminiProvider {
    client: Client,
    endpoint: String,
    api_key: ApiKey,
    label: String,
}

impl GeminiProvider {
    /// Builds a provider with its own HTTP client bounded by `timeout`.
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: ApiKey,
        timeout: Duration,
    ) -> Result<Self, AiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AiError::Provider(format!("failed to build HTTP client: {e}")))?;
        let model = model.strip_prefix("models/").unwrap_or(model);
        Ok(Self {
            client,
            endpoint: format!(
                "{}/models/{model}:generateContent",
                base_url.trim_end_matches('/')
            ),
            api_key,
            label: format!("gemini/{model}"),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, AiError> {
        Self::new(
            &config.gemini_base_url,
            &config.gemini_model,
            config.gemini_api_key.clone(),
            config.ai_timeout,
        )
    }
}

impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        &self.label
    }

    fn generate(&self, prompt: Prompt) -> AiFuture<Result<String, AiError>> {
        let request = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", self.api_key.expose())
            .json(&build_request(&prompt));

        Box::pin(async move {
            let response = request.send().await.map_err(transport_error)?;
            let status = response.status();
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let body = response.text().await.map_err(transport_error)?;
            debug!(%status, body_len = body.len(), "gemini response");

            if !status.is_success() {
                return Err(classify_failure(status, retry_after, &body));
            }
            parse_reply(&body)
        })
    }
}

fn build_request(prompt: &Prompt) -> GenerateRequest<'_> {
    let parts = match prompt {
        Prompt::Text(text) => vec![Part::Text { text }],
        Prompt::Audio {
            mime_type,
            data,
            instruction,
        } => vec![
            Part::Text { text: instruction },
            Part::InlineData {
                inline_data: InlineData {
                    mime_type,
                    data: STANDARD.encode(data),
                },
            },
        ],
    };
    GenerateRequest {
        contents: vec![Content { role: "user", parts }],
    }
}

fn transport_error(e: reqwest::Error) -> AiError {
    if e.is_timeout() {
        AiError::Provider("request timed out".to_owned())
    } else if e.is_connect() {
        AiError::Provider(format!("could not connect: {e}"))
    } else {
        AiError::Provider(e.to_string())
    }
}

/// Maps a non-2xx Gemini response to an [`AiError`].
///
/// Gemini reports a bad key as `400 INVALID_ARGUMENT` with an
/// `API_KEY_INVALID` reason, so the body is inspected as well as the status.
fn classify_failure(status: StatusCode, retry_after: Option<Duration>, body: &str) -> AiError {
    let envelope = serde_json::from_str::<ErrorEnvelope>(body).ok();
    let (message, api_status, key_invalid) = match &envelope {
        Some(ErrorEnvelope { error }) => (
            error.message.clone(),
            error.status.as_str(),
            error
                .details
                .iter()
                .any(|d| d.get("reason").and_then(|r| r.as_str()) == Some("API_KEY_INVALID")),
        ),
        None => (truncate(body, 200), "", false),
    };

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AiError::Auth(message),
        StatusCode::BAD_REQUEST if key_invalid => AiError::Auth(message),
        StatusCode::TOO_MANY_REQUESTS => AiError::RateLimit { retry_after },
        _ if api_status == "RESOURCE_EXHAUSTED" => AiError::RateLimit { retry_after },
        _ if message.is_empty() => AiError::Provider(format!("HTTP {status}")),
        _ => AiError::Provider(format!("HTTP {status}: {message}")),
    }
}

/// Joins the text parts of the first candidate and trims the result.
fn parse_reply(body: &str) -> Result<String, AiError> {
    let response: GenerateResponse = serde_json::from_str(body)
        .map_err(|e| AiError::Provider(format!("malformed response: {e}")))?;

    let Some(candidate) = response.candidates.into_iter().next() else {
        let reason = response
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .unwrap_or_else(|| "no candidates returned".to_owned());
        return Err(AiError::Provider(format!("prompt blocked: {reason}")));
    };

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();
    let text = text.trim();

    if text.is_empty() {
        let reason = candidate.finish_reason.unwrap_or_else(|| "UNKNOWN".to_owned());
        return Err(AiError::Provider(format!("empty reply (finish reason {reason})")));
    }
    Ok(text.to_owned())
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_prompt_wire_format() {
        let prompt = Prompt::text("What is energy?");
        let json = serde_json::to_value(build_request(&prompt)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "contents": [{"role": "user", "parts": [{"text": "What is energy?"}]}]
            })
        );
    }

    #[test]
    fn audio_prompt_is_inlined_as_base64() {
        let prompt = Prompt::Audio {
            mime_type: "audio/webm".into(),
            data: bytes::Bytes::from_static(b"abc"),
            instruction: "Answer the question in the recording.".into(),
        };
        let json = serde_json::to_value(build_request(&prompt)).unwrap();
        let parts = &json["contents"][0]["parts"];
        assert_eq!(parts[0]["text"], "Answer the question in the recording.");
        assert_eq!(parts[1]["inline_data"]["mime_type"], "audio/webm");
        assert_eq!(parts[1]["inline_data"]["data"], "YWJj");
    }

    #[test]
    fn reply_parts_are_joined_and_trimmed() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"  Plants make "},{"text":"food.\n"}]},"finishReason":"STOP"}]}"#;
        assert_eq!(parse_reply(body).unwrap(), "Plants make food.");
    }

    #[test]
    fn blocked_prompt_is_provider_error() {
        let body = r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#;
        let err = parse_reply(body).unwrap_err();
        assert!(matches!(err, AiError::Provider(m) if m.contains("SAFETY")));
    }

    #[test]
    fn empty_candidate_is_provider_error() {
        let body = r#"{"candidates":[{"finishReason":"MAX_TOKENS"}]}"#;
        let err = parse_reply(body).unwrap_err();
        assert!(matches!(err, AiError::Provider(m) if m.contains("MAX_TOKENS")));
    }

    #[test]
    fn malformed_body_is_provider_error() {
        assert!(matches!(parse_reply("<html>"), Err(AiError::Provider(_))));
    }

    #[test]
    fn invalid_key_on_400_is_auth() {
        let body = r#"{"error":{"code":400,"message":"API key not valid. Please pass a valid API key.","status":"INVALID_ARGUMENT","details":[{"@type":"type.googleapis.com/google.rpc.ErrorInfo","reason":"API_KEY_INVALID"}]}}"#;
        let err = classify_failure(StatusCode::BAD_REQUEST, None, body);
        assert!(matches!(err, AiError::Auth(m) if m.starts_with("API key not valid")));
    }

    #[test]
    fn other_400_is_provider() {
        let body = r#"{"error":{"code":400,"message":"Invalid JSON payload","status":"INVALID_ARGUMENT"}}"#;
        let err = classify_failure(StatusCode::BAD_REQUEST, None, body);
        assert!(matches!(err, AiError::Provider(m) if m.contains("Invalid JSON payload")));
    }

    #[test]
    fn forbidden_is_auth() {
        assert!(matches!(
            classify_failure(StatusCode::FORBIDDEN, None, ""),
            AiError::Auth(_)
        ));
    }

    #[test]
    fn throttling_is_rate_limit() {
        let err = classify_failure(
            StatusCode::TOO_MANY_REQUESTS,
            Some(Duration::from_secs(12)),
            r#"{"error":{"code":429,"message":"Quota exceeded","status":"RESOURCE_EXHAUSTED"}}"#,
        );
        assert!(matches!(
            err,
            AiError::RateLimit { retry_after: Some(d) } if d == Duration::from_secs(12)
        ));
    }

    #[test]
    fn server_error_is_provider() {
        let err = classify_failure(StatusCode::SERVICE_UNAVAILABLE, None, "upstream down");
        assert!(matches!(err, AiError::Provider(m) if m.contains("503") && m.contains("upstream down")));
    }

    #[test]
    fn model_prefix_is_accepted() {
        let provider = GeminiProvider::new(
            "http://localhost:1/v1beta/",
            "models/gemini-1.5-flash",
            ApiKey::parse("GEMINI_API_KEY", Some("k")).unwrap(),
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(
            provider.endpoint,
            "http://localhost:1/v1beta/models/gemini-1.5-flash:generateContent"
        );
        assert_eq!(provider.name(), "gemini/gemini-1.5-flash");
    }
}
