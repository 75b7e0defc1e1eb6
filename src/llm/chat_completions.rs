//! `OpenAI` Chat Completions API client.
//!
//! Issues one non-streaming request to `/v1/chat/completions` carrying the
//! prompt as a single user turn and extracts `choices[0].message.content`.

use serde::Serialize;

use crate::error::CompletionError;

use super::{CompletionClient, LlmSettings, MessageRole};

/// Longest slice of an error body kept in a transport error.
const ERROR_BODY_LIMIT: usize = 512;

/// One turn in the request body.
#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: MessageRole,
    content: &'a str,
}

/// Request body for `/v1/chat/completions`.
#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: [WireMessage<'a>; 1],
}

/// Client for the `OpenAI` Chat Completions API.
#[derive(Clone)]
pub struct ChatCompletionsClient {
    http: reqwest::Client,
    settings: LlmSettings,
}

impl std::fmt::Debug for ChatCompletionsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionsClient")
            .field("base_url", &self.settings.base_url)
            .field("model", &self.settings.model)
            .field("provider", &self.settings.provider)
            .finish()
    }
}

impl ChatCompletionsClient {
    /// Create a new client with the given settings.
    pub fn new(settings: LlmSettings) -> Result<Self, CompletionError> {
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()?;
        Ok(Self { http, settings })
    }
}

#[async_trait::async_trait]
impl CompletionClient for ChatCompletionsClient {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let url = self
            .settings
            .provider
            .completions_url(&self.settings.base_url);

        let body = CompletionRequest {
            model: &self.settings.model,
            messages: [WireMessage {
                role: MessageRole::User,
                content: prompt,
            }],
        };

        tracing::debug!(
            url = %url,
            model = %self.settings.model,
            prompt_length = prompt.len(),
            "Sending completion request"
        );

        let rb = self.http.post(&url).json(&body);
        let rb = self
            .settings
            .provider
            .authorize(rb, self.settings.api_key.as_deref());

        let resp = rb.send().await?;
        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            let snippet: String = text.chars().take(ERROR_BODY_LIMIT).collect();
            tracing::warn!(status = %status, "Completion service returned error status");
            return Err(CompletionError::Transport(format!(
                "completion service returned {status}: {snippet}"
            )));
        }

        let reply = extract_reply(&text)?;
        tracing::debug!(reply_length = reply.len(), "Completion received");
        Ok(reply)
    }
}

/// Pull `choices[0].message.content` out of a response body.
fn extract_reply(body: &str) -> Result<String, CompletionError> {
    let v: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| CompletionError::MalformedResponse(format!("invalid JSON: {e}")))?;

    v["choices"][0]["message"]["content"]
        .as_str()
        .map(ToString::to_string)
        .ok_or_else(|| {
            CompletionError::MalformedResponse("missing choices[0].message.content".to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Provider;
    use std::time::Duration;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(base_url: &str, api_key: Option<&str>) -> ChatCompletionsClient {
        ChatCompletionsClient::new(LlmSettings {
            base_url: base_url.to_string(),
            api_key: api_key.map(ToString::to_string),
            model: "gpt-3.5-turbo".to_string(),
            provider: Provider::Generic,
            request_timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[test]
    fn test_extract_reply() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"Paris."}}]}"#;
        assert_eq!(extract_reply(body).unwrap(), "Paris.");

        let err = extract_reply(r#"{"choices":[]}"#).unwrap_err();
        assert!(matches!(err, CompletionError::MalformedResponse(_)));

        let err = extract_reply("not json").unwrap_err();
        assert!(matches!(err, CompletionError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_complete_sends_single_user_turn() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_json(serde_json::json!({
                "model": "gpt-3.5-turbo",
                "messages": [{"role": "user", "content": "What is the capital of France?"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "Paris."}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server.uri(), Some("sk-test"));
        let reply = client
            .complete("What is the capital of France?")
            .await
            .unwrap();
        assert_eq!(reply, "Paris.");
    }

    #[tokio::test]
    async fn test_missing_content_is_malformed() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "choices": [] })),
            )
            .mount(&server)
            .await;

        let err = client_for(&server.uri(), None)
            .complete("hi")
            .await
            .unwrap_err();
        assert!(matches!(err, CompletionError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_error_status_is_transport() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
            .mount(&server)
            .await;

        let err = client_for(&server.uri(), None)
            .complete("hi")
            .await
            .unwrap_err();
        match err {
            CompletionError::Transport(msg) => assert!(msg.contains("upstream down")),
            other => panic!("expected transport error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport() {
        // Port 9 (discard) on localhost is not listening in test environments.
        let err = client_for("http://127.0.0.1:9", None)
            .complete("hi")
            .await
            .unwrap_err();
        assert!(matches!(err, CompletionError::Transport(_)));
    }
}
