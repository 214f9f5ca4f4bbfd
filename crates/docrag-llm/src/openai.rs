//! OpenAI-compatible chat-completion client.
//!
//! Transient failures are retried with exponential backoff:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (other) → fail immediately
//! - Network errors → retry

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use docrag_core::{ChatMessage, ChatRole, CompletionClient, CompletionParams, LlmConfig, RagError, Result};

/// Client for `POST {base_url}/chat/completions`.
pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    max_retries: u32,
    retry_base: Duration,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiClient {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: Option<String>,
        timeout: Duration,
        max_retries: u32,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RagError::llm(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
            max_retries,
            retry_base: Duration::from_secs(1),
        })
    }

    /// Build a client from configuration, reading the API key from the
    /// configured environment variable.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.is_empty());
        if api_key.is_none() {
            warn!(
                "{} not set, sending unauthenticated requests to {}",
                config.api_key_env, config.base_url
            );
        }

        Self::new(
            &config.base_url,
            &config.model,
            api_key,
            Duration::from_secs(config.timeout_secs),
            config.max_retries,
        )
    }

    /// Override the first backoff delay (doubles on each retry).
    pub fn with_retry_base(mut self, delay: Duration) -> Self {
        self.retry_base = delay;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

fn role_name(role: ChatRole) -> &'static str {
    match role {
        ChatRole::System => "system",
        ChatRole::User => "user",
        ChatRole::Assistant => "assistant",
    }
}

/// Extract the first choice's message content.
fn parse_response(body: &str) -> Result<String> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|e| RagError::llm(format!("Invalid completion response: {}", e)))?;

    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| RagError::llm("Completion response contained no message content"))
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, messages: &[ChatMessage], params: CompletionParams) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: messages
                .iter()
                .map(|m| WireMessage {
                    role: role_name(m.role),
                    content: &m.content,
                })
                .collect(),
            max_tokens: params.max_tokens,
            temperature: params.temperature,
        };

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: base, 2x, 4x, ...
                let delay = self.retry_base * (1u32 << (attempt - 1).min(5));
                debug!("Retrying completion in {:?} (attempt {})", delay, attempt + 1);
                tokio::time::sleep(delay).await;
            }

            let mut builder = self.client.post(self.endpoint()).json(&request);
            if let Some(key) = &self.api_key {
                builder = builder.bearer_auth(key);
            }

            match builder.send().await {
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();

                    if status.is_success() {
                        return parse_response(&body);
                    }

                    let err = RagError::llm(format!("API error {}: {}", status, body));

                    // Rate limited or server error: retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        warn!("Completion request failed with {}", status);
                        last_err = Some(err);
                        continue;
                    }

                    return Err(err);
                }
                Err(e) => {
                    warn!("Completion request error: {}", e);
                    last_err = Some(RagError::llm(format!("Request failed: {}", e)));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| RagError::llm("Completion failed after retries")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::Router;
    use tokio::net::TcpListener;

    const OK_BODY: &str = r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"Refunds take 30 days."}}]}"#;

    /// Scripted `chat/completions` endpoint recording every request it sees.
    #[derive(Default)]
    struct Endpoint {
        responses: Mutex<VecDeque<(u16, &'static str)>>,
        requests: Mutex<Vec<(Option<String>, serde_json::Value)>>,
    }

    impl Endpoint {
        fn hits(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    async fn completions(
        State(endpoint): State<Arc<Endpoint>>,
        headers: HeaderMap,
        body: String,
    ) -> (StatusCode, String) {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let json = serde_json::from_str(&body).unwrap_or(serde_json::Value::Null);
        endpoint.requests.lock().unwrap().push((auth, json));

        let (status, reply) = endpoint
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or((500, "{}"));
        (StatusCode::from_u16(status).unwrap(), reply.to_string())
    }

    /// Serve the scripted responses in order, one per request.
    async fn serve(responses: Vec<(u16, &'static str)>) -> (String, Arc<Endpoint>) {
        let endpoint = Arc::new(Endpoint {
            responses: Mutex::new(responses.into()),
            ..Default::default()
        });
        let app = Router::new()
            .route("/chat/completions", post(completions))
            .with_state(endpoint.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{}", addr), endpoint)
    }

    fn client(base_url: &str, retries: u32) -> OpenAiClient {
        OpenAiClient::new(base_url, "gpt-4o-mini", Some("test-key".to_string()), Duration::from_secs(5), retries)
            .unwrap()
            .with_retry_base(Duration::from_millis(10))
    }

    fn params() -> CompletionParams {
        CompletionParams {
            max_tokens: 1000,
            temperature: 0.3,
        }
    }

    #[test]
    fn test_request_shape() {
        let request = ChatRequest {
            model: "gpt-4o-mini",
            messages: vec![WireMessage {
                role: role_name(ChatRole::System),
                content: "You are a helpful AI assistant.",
            }],
            max_tokens: 1000,
            temperature: 0.7,
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["max_tokens"], 1000);
    }

    #[test]
    fn test_parse_response() {
        assert_eq!(parse_response(OK_BODY).unwrap(), "Refunds take 30 days.");
        assert!(parse_response(r#"{"choices":[]}"#).is_err());
        assert!(parse_response("not json").is_err());
    }

    #[tokio::test]
    async fn test_complete_success() {
        let (url, endpoint) = serve(vec![(200, OK_BODY)]).await;

        let answer = client(&url, 2)
            .complete(&[ChatMessage::user("What is the refund policy?")], params())
            .await
            .unwrap();

        assert_eq!(answer, "Refunds take 30 days.");
        assert_eq!(endpoint.hits(), 1);

        let requests = endpoint.requests.lock().unwrap();
        let (auth, body) = &requests[0];
        assert_eq!(auth.as_deref(), Some("Bearer test-key"));
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "What is the refund policy?");
    }

    #[tokio::test]
    async fn test_retries_server_errors() {
        let (url, endpoint) = serve(vec![(500, "{}"), (429, "{}"), (200, OK_BODY)]).await;

        let answer = client(&url, 2)
            .complete(&[ChatMessage::user("hi")], params())
            .await
            .unwrap();

        assert_eq!(answer, "Refunds take 30 days.");
        assert_eq!(endpoint.hits(), 3);
    }

    #[tokio::test]
    async fn test_client_error_not_retried() {
        let (url, endpoint) = serve(vec![(400, r#"{"error":"bad request"}"#)]).await;

        let err = client(&url, 3)
            .complete(&[ChatMessage::user("hi")], params())
            .await
            .unwrap_err();

        assert_eq!(err.error_code(), "LLM_ERROR");
        assert!(err.to_string().contains("400"));
        assert_eq!(endpoint.hits(), 1);
    }
}
