use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::client::LlmClient;
use crate::util::{preview, SecretString};

const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Extraction replies are parsed line by line; keep sampling tame.
const DEFAULT_TEMPERATURE: f32 = 0.2;

fn http_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .context("failed to build HTTP client")
}

// ============================================================================
// Anthropic Client
// ============================================================================

pub struct AnthropicClient {
    api_key: SecretString,
    model: String,
    base_url: String,
    max_tokens: u32,
    client: Client,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    #[serde(default)]
    text: String,
}

impl AnthropicClient {
    pub fn new(api_key: String, model: String, max_tokens: u32, timeout_secs: u64) -> Result<Self> {
        Self::with_base_url(
            api_key,
            model,
            ANTHROPIC_BASE_URL.to_string(),
            max_tokens,
            timeout_secs,
        )
    }

    pub fn with_base_url(
        api_key: String,
        model: String,
        base_url: String,
        max_tokens: u32,
        timeout_secs: u64,
    ) -> Result<Self> {
        Ok(Self {
            api_key: api_key.into(),
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_tokens,
            client: http_client(timeout_secs)?,
        })
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let request = AnthropicRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        debug!("Calling Anthropic API with model: {}", self.model);

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", self.api_key.expose())
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .context("Failed to send request to Anthropic API")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            bail!("Anthropic API error {}: {}", status, error_text);
        }

        let api_response: AnthropicResponse = response
            .json()
            .await
            .context("Failed to parse Anthropic API response")?;

        let text = api_response
            .content
            .first()
            .map(|c| c.text.clone())
            .context("No content in Anthropic response")?;
        debug!("Anthropic reply: {}", preview(&text, 200));
        Ok(text)
    }
}

// ============================================================================
// OpenAI Client (also Groq, Ollama and other OpenAI-compatible servers)
// ============================================================================

pub struct OpenAIClient {
    api_key: SecretString,
    model: String,
    base_url: String,
    max_tokens: u32,
    temperature: f32,
    client: Client,
}

#[derive(Debug, Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIReplyMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAIClient {
    pub fn new(api_key: String, model: String, max_tokens: u32, timeout_secs: u64) -> Result<Self> {
        Self::with_base_url(
            api_key,
            model,
            OPENAI_BASE_URL.to_string(),
            max_tokens,
            timeout_secs,
        )
    }

    pub fn with_base_url(
        api_key: String,
        model: String,
        base_url: String,
        max_tokens: u32,
        timeout_secs: u64,
    ) -> Result<Self> {
        Ok(Self {
            api_key: api_key.into(),
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_tokens,
            temperature: DEFAULT_TEMPERATURE,
            client: http_client(timeout_secs)?,
        })
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn sends_auth(&self) -> bool {
        let key = self.api_key.expose();
        !key.is_empty() && key.to_lowercase() != "none"
    }
}

#[async_trait]
impl LlmClient for OpenAIClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let request = OpenAIRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        debug!(
            "Calling OpenAI-compatible API at {} with model: {}",
            self.base_url, self.model
        );

        let mut req = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("content-type", "application/json")
            .json(&request);

        // Local servers run without a key
        if self.sends_auth() {
            req = req.header("authorization", format!("Bearer {}", self.api_key.expose()));
        }

        let response = req
            .send()
            .await
            .context("Failed to send request to OpenAI API")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            bail!("OpenAI API error {}: {}", status, error_text);
        }

        let api_response: OpenAIResponse = response
            .json()
            .await
            .context("Failed to parse OpenAI API response")?;

        let text = api_response
            .choices
            .into_iter()
            .next()
            .context("No choices in OpenAI response")?
            .message
            .content
            .unwrap_or_default();
        debug!("OpenAI reply: {}", preview(&text, 200));
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_client_defaults() {
        let client =
            OpenAIClient::new("test_key".to_string(), "gpt-4o".to_string(), 4096, 120).unwrap();
        assert_eq!(client.api_key.expose(), "test_key");
        assert_eq!(client.base_url, "https://api.openai.com/v1");
        assert!((client.temperature - DEFAULT_TEMPERATURE).abs() < f32::EPSILON);
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = OpenAIClient::with_base_url(
            "".to_string(),
            "llama3-8b-8192".to_string(),
            "https://api.groq.com/openai/v1/".to_string(),
            8192,
            120,
        )
        .unwrap();
        assert_eq!(client.base_url, "https://api.groq.com/openai/v1");
    }

    #[test]
    fn test_openai_auth_header_skipped_for_empty_or_none_key() {
        let empty = OpenAIClient::new("".to_string(), "m".to_string(), 1, 1).unwrap();
        assert!(!empty.sends_auth());
        let none = OpenAIClient::new("NONE".to_string(), "m".to_string(), 1, 1).unwrap();
        assert!(!none.sends_auth());
        let real = OpenAIClient::new("gsk-1".to_string(), "m".to_string(), 1, 1).unwrap();
        assert!(real.sends_auth());
    }

    #[test]
    fn test_openai_request_structure() {
        let request = OpenAIRequest {
            model: "llama3-8b-8192",
            messages: vec![ChatMessage {
                role: "user",
                content: "test",
            }],
            temperature: 0.2,
            max_tokens: 8192,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "llama3-8b-8192");
        assert_eq!(json["max_tokens"], 8192);
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "test");
    }

    #[test]
    fn test_openai_response_null_content() {
        let json = r#"{"choices": [{"message": {"role": "assistant", "content": null}}]}"#;
        let response: OpenAIResponse = serde_json::from_str(json).unwrap();
        assert!(response.choices[0].message.content.is_none());
    }

    #[test]
    fn test_anthropic_response_parsing() {
        let json = r#"{"content": [{"type": "text", "text": "Hello"}]}"#;
        let response: AnthropicResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.content[0].text, "Hello");
    }

    #[tokio::test]
    async fn test_openai_complete_against_mock_server() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer gsk-test")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "model": "llama3-8b-8192",
                "messages": [{"role": "user", "content": "hello"}]
            })))
            .with_status(200)
            .with_body(r#"{"choices": [{"message": {"role": "assistant", "content": "specific skill"}}]}"#)
            .create_async()
            .await;

        let client = OpenAIClient::with_base_url(
            "gsk-test".to_string(),
            "llama3-8b-8192".to_string(),
            server.url(),
            512,
            10,
        )
        .unwrap();
        assert_eq!(client.complete("hello").await.unwrap(), "specific skill");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_openai_error_status_is_reported() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_body("rate limit reached")
            .create_async()
            .await;

        let client =
            OpenAIClient::with_base_url("k".to_string(), "m".to_string(), server.url(), 1, 10)
                .unwrap();
        let err = client.complete("hello").await.unwrap_err().to_string();
        assert!(err.contains("OpenAI API error 429"));
        assert!(err.contains("rate limit reached"));
    }

    #[tokio::test]
    async fn test_openai_empty_choices_is_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices": []}"#)
            .create_async()
            .await;

        let client =
            OpenAIClient::with_base_url("k".to_string(), "m".to_string(), server.url(), 1, 10)
                .unwrap();
        let err = client.complete("hello").await.unwrap_err();
        assert!(err.to_string().contains("No choices"));
    }

    #[tokio::test]
    async fn test_anthropic_complete_against_mock_server() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/messages")
            .match_header("x-api-key", "sk-ant-test")
            .match_header("anthropic-version", "2023-06-01")
            .with_status(200)
            .with_body(r#"{"content": [{"type": "text", "text": "domain skills"}]}"#)
            .create_async()
            .await;

        let client = AnthropicClient::with_base_url(
            "sk-ant-test".to_string(),
            "claude-sonnet-4-5".to_string(),
            server.url(),
            1024,
            10,
        )
        .unwrap();
        assert_eq!(client.complete("classify").await.unwrap(), "domain skills");
        mock.assert_async().await;
    }
}
