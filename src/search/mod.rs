//! Content fetching: web search providers behind a retry policy.

pub mod duckduckgo;
pub mod retry;
pub mod tavily;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{FetchError, SearchError};
use retry::RetryPolicy;

pub use duckduckgo::DuckDuckGoSearch;
pub use tavily::TavilySearch;

/// A web search backend returning candidate source URLs in ranked order.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// One attempt. Callers decide whether to retry based on the error kind.
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<String>, SearchError>;

    fn name(&self) -> &str;
}

/// Provider returning a fixed URL list. Used for `--dry-run`.
pub struct StaticSearchProvider {
    urls: Vec<String>,
}

impl StaticSearchProvider {
    pub fn new(urls: Vec<String>) -> Self {
        Self { urls }
    }
}

impl Default for StaticSearchProvider {
    fn default() -> Self {
        Self::new(vec![
            "https://example.com/overview".to_string(),
            "https://example.org/guide".to_string(),
        ])
    }
}

#[async_trait]
impl SearchProvider for StaticSearchProvider {
    async fn search(&self, _query: &str, max_results: usize) -> Result<Vec<String>, SearchError> {
        Ok(self.urls.iter().take(max_results).cloned().collect())
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// Search provider + retry policy + result limit.
pub struct Fetcher {
    provider: Box<dyn SearchProvider>,
    policy: RetryPolicy,
    max_results: usize,
}

impl Fetcher {
    pub fn new(provider: Box<dyn SearchProvider>, policy: RetryPolicy, max_results: usize) -> Self {
        Self {
            provider,
            policy,
            max_results,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Query the provider with the configured limit and policy.
    pub async fn fetch(&self, query: &str) -> Result<Vec<String>, FetchError> {
        self.fetch_with(query, self.max_results, &self.policy).await
    }

    /// Query the provider, re-querying on transient failures. Nothing is cached.
    pub async fn fetch_with(
        &self,
        query: &str,
        max_results: usize,
        policy: &RetryPolicy,
    ) -> Result<Vec<String>, FetchError> {
        info!("Searching {} for: {}", self.provider.name(), query);
        let urls = policy
            .run(|attempt| {
                debug!("Search attempt {} for {:?}", attempt, query);
                self.provider.search(query, max_results)
            })
            .await?;
        debug!("Search returned {} URLs", urls.len());
        Ok(urls)
    }
}

/// Build the fetcher described by the config.
pub fn create_fetcher(config: &Config, dry_run: bool) -> Result<Fetcher> {
    let provider: Box<dyn SearchProvider> = if dry_run {
        Box::new(StaticSearchProvider::default())
    } else {
        match config.search.provider.as_str() {
            "duckduckgo" => {
                let search = match &config.search.base_url {
                    Some(url) => DuckDuckGoSearch::with_base_url(url.clone())?,
                    None => DuckDuckGoSearch::new()?,
                };
                Box::new(search)
            }
            "tavily" => {
                let key = config.get_search_api_key()?;
                let search = match &config.search.base_url {
                    Some(url) => TavilySearch::with_base_url(key, url.clone())?,
                    None => TavilySearch::new(key)?,
                };
                Box::new(search)
            }
            unknown => bail!("Unknown search provider: {}", unknown),
        }
    };

    Ok(Fetcher::new(
        provider,
        config.search.retry_policy(),
        config.search.max_results,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use retry::Backoff;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::time::Instant;

    /// Fails with a transient error `failures` times, then succeeds.
    struct FlakyProvider {
        failures: usize,
        calls: Arc<Mutex<Vec<Instant>>>,
    }

    #[async_trait]
    impl SearchProvider for FlakyProvider {
        async fn search(&self, query: &str, max_results: usize) -> Result<Vec<String>, SearchError> {
            let mut calls = self.calls.lock().unwrap();
            calls.push(Instant::now());
            if calls.len() <= self.failures {
                return Err(SearchError::Transient("ratelimit".to_string()));
            }
            Ok(vec![format!("https://example.com/{}", query)]
                .into_iter()
                .take(max_results)
                .collect())
        }

        fn name(&self) -> &str {
            "flaky"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_succeeds_on_third_attempt_with_increasing_delays() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let fetcher = Fetcher::new(
            Box::new(FlakyProvider {
                failures: 2,
                calls: calls.clone(),
            }),
            RetryPolicy::new(3, Duration::from_millis(500), Backoff::Linear),
            5,
        );

        let urls = fetcher.fetch("java").await.unwrap();
        assert_eq!(urls, vec!["https://example.com/java".to_string()]);

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        let first_wait = calls[1] - calls[0];
        let second_wait = calls[2] - calls[1];
        assert_eq!(first_wait, Duration::from_millis(500));
        assert_eq!(second_wait, Duration::from_millis(1000));
        assert!(second_wait > first_wait);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_exhausted_is_an_error() {
        let fetcher = Fetcher::new(
            Box::new(FlakyProvider {
                failures: usize::MAX,
                calls: Arc::new(Mutex::new(Vec::new())),
            }),
            RetryPolicy::new(2, Duration::from_millis(10), Backoff::Linear),
            5,
        );
        let err = fetcher.fetch("rust").await.unwrap_err();
        assert!(matches!(err, FetchError::ExhaustedRetries { attempts: 2, .. }));
    }

    #[tokio::test]
    async fn test_static_provider_respects_limit() {
        let provider = StaticSearchProvider::default();
        let urls = provider.search("anything", 1).await.unwrap();
        assert_eq!(urls.len(), 1);
    }

    #[test]
    fn test_create_fetcher_rejects_unknown_provider() {
        let mut config = Config::default();
        config.search.provider = "altavista".to_string();
        let result = create_fetcher(&config, false);
        assert!(result.is_err());
        if let Err(e) = result {
            assert!(e.to_string().contains("Unknown search provider"));
        }
    }

    #[test]
    fn test_create_fetcher_dry_run_ignores_provider() {
        let mut config = Config::default();
        config.search.provider = "altavista".to_string();
        assert!(create_fetcher(&config, true).is_ok());
    }
}
