use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::SearchProvider;
use crate::error::SearchError;
use crate::util::SecretString;

const DEFAULT_BASE_URL: &str = "https://api.tavily.com";

/// Tavily search API client.
pub struct TavilySearch {
    api_key: SecretString,
    base_url: String,
    client: Client,
}

#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    query: &'a str,
    search_depth: &'a str,
    max_results: usize,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    url: String,
}

impl TavilySearch {
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL.to_string())
    }

    pub fn with_base_url(api_key: String, base_url: String) -> Result<Self> {
        Ok(Self {
            api_key: api_key.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .context("failed to build HTTP client")?,
        })
    }
}

#[async_trait]
impl SearchProvider for TavilySearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<String>, SearchError> {
        let request = TavilyRequest {
            query,
            search_depth: "basic",
            max_results,
        };

        debug!("Calling Tavily search for: {}", query);

        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .header("content-type", "application/json")
            .header("authorization", format!("Bearer {}", self.api_key.expose()))
            .json(&request)
            .send()
            .await
            .map_err(|e| SearchError::Transient(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let msg = format!("Tavily API error {}: {}", status, body);
            return Err(if status.as_u16() == 429 || status.is_server_error() {
                SearchError::Transient(msg)
            } else {
                SearchError::Fatal(msg)
            });
        }

        let parsed: TavilyResponse = response
            .json()
            .await
            .map_err(|e| SearchError::Fatal(format!("failed to parse Tavily response: {}", e)))?;

        Ok(parsed
            .results
            .into_iter()
            .map(|r| r.url)
            .take(max_results)
            .collect())
    }

    fn name(&self) -> &str {
        "tavily"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_parsing_ignores_extra_fields() {
        let json = r#"{
            "query": "rust",
            "results": [
                {"title": "Rust", "url": "https://www.rust-lang.org/", "content": "...", "score": 0.9}
            ]
        }"#;
        let response: TavilyResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.results[0].url, "https://www.rust-lang.org/");
    }

    #[tokio::test]
    async fn test_search_sends_bearer_and_limits_results() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/search")
            .match_header("authorization", "Bearer tvly-test")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "query": "kubernetes",
                "max_results": 2
            })))
            .with_status(200)
            .with_body(
                r#"{"results": [
                    {"url": "https://kubernetes.io/docs/"},
                    {"url": "https://github.com/kubernetes/kubernetes"},
                    {"url": "https://example.com/extra"}
                ]}"#,
            )
            .create_async()
            .await;

        let search = TavilySearch::with_base_url("tvly-test".to_string(), server.url()).unwrap();
        let urls = search.search("kubernetes", 2).await.unwrap();
        assert_eq!(
            urls,
            vec![
                "https://kubernetes.io/docs/".to_string(),
                "https://github.com/kubernetes/kubernetes".to_string()
            ]
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unauthorized_is_fatal() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/search")
            .with_status(401)
            .with_body("invalid key")
            .create_async()
            .await;

        let search = TavilySearch::with_base_url("bad".to_string(), server.url()).unwrap();
        let err = search.search("kubernetes", 5).await.unwrap_err();
        assert!(!err.is_transient());
        assert!(err.to_string().contains("401"));
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/search")
            .with_status(503)
            .create_async()
            .await;

        let search = TavilySearch::with_base_url("key".to_string(), server.url()).unwrap();
        assert!(search.search("x", 5).await.unwrap_err().is_transient());
    }
}
