use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use tracing::debug;

use crate::util::text::truncate_error_message;

use super::models::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage, SYSTEM_PROMPT};
use super::{GenerationError, GenerationSettings, TextGenerator};

/// OpenAI互換 Chat Completions API クライアント。
#[derive(Debug, Clone)]
pub struct ChatCompletionClient {
    client: Client,
    endpoint: Url,
    settings: GenerationSettings,
}

impl ChatCompletionClient {
    /// # Errors
    /// HTTPクライアントの構築、もしくはベースURLのパースに失敗した場合はエラーを返す。
    pub fn new(settings: GenerationSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .context("failed to build generation client")?;

        let base_url = Url::parse(&settings.base_url).context("invalid generation base URL")?;
        let endpoint = base_url
            .join("v1/chat/completions")
            .context("failed to build chat completions URL")?;

        Ok(Self {
            client,
            endpoint,
            settings,
        })
    }

    fn build_request(&self, prompt: &str) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.settings.model.clone(),
            messages: vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(prompt)],
            temperature: Some(self.settings.temperature),
            max_tokens: Some(self.settings.max_tokens),
        }
    }
}

#[async_trait]
impl TextGenerator for ChatCompletionClient {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let request = self.build_request(prompt);

        debug!(
            model = %self.settings.model,
            prompt_chars = prompt.chars().count(),
            "sending chat completion request"
        );

        let mut builder = self
            .client
            .post(self.endpoint.clone())
            .json(&request)
            .timeout(self.settings.timeout);
        if let Some(api_key) = &self.settings.api_key {
            builder = builder.bearer_auth(api_key);
        }

        let response = builder.send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                status,
                body: truncate_error_message(&body),
            });
        }

        let payload: ChatCompletionResponse = response.json().await?;
        payload
            .first_text()
            .map(ToString::to_string)
            .ok_or(GenerationError::EmptyResponse)
    }

    fn name(&self) -> &str {
        &self.settings.model
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(base_url: String) -> GenerationSettings {
        GenerationSettings {
            base_url,
            api_key: Some("test-key".to_string()),
            model: "gpt-3.5-turbo".to_string(),
            temperature: 0.7,
            max_tokens: 150,
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn generate_returns_first_choice_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": " 217107, 273613 "}}]
            })))
            .mount(&server)
            .await;

        let client = ChatCompletionClient::new(settings(server.uri())).expect("client should build");
        let text = client.generate("prompt").await.expect("generation succeeds");

        assert_eq!(text, "217107, 273613");
    }

    #[tokio::test]
    async fn generate_truncates_large_error_bodies() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("x".repeat(10_000)))
            .mount(&server)
            .await;

        let client = ChatCompletionClient::new(settings(server.uri())).expect("client should build");
        let error = client.generate("prompt").await.expect_err("should fail");

        match error {
            GenerationError::Status { status, body } => {
                assert_eq!(status, 500);
                assert!(body.contains("truncated"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn generate_rejects_empty_choices() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})),
            )
            .mount(&server)
            .await;

        let client = ChatCompletionClient::new(settings(server.uri())).expect("client should build");
        let error = client.generate("prompt").await.expect_err("should fail");

        assert!(matches!(error, GenerationError::EmptyResponse));
    }

    #[test]
    fn new_rejects_invalid_base_url() {
        let error = ChatCompletionClient::new(settings("not a url".to_string()))
            .expect_err("invalid URL");
        assert!(error.to_string().contains("invalid generation base URL"));
    }
}
