use anyhow::{bail, Result};
use std::sync::Arc;
use tracing::debug;

use super::client::{LlmClient, MockLlmClient};
use super::client_impl::{AnthropicClient, OpenAIClient};
use crate::config::Config;

const LOCAL_OPENAI_BASE_URL: &str = "http://localhost:11434/v1";

/// Create an LLM client based on configuration. Shared across pipeline stages.
pub fn create_client(config: &Config, dry_run: bool) -> Result<Arc<dyn LlmClient>> {
    if dry_run {
        debug!("Using mock LLM client");
        return Ok(Arc::new(MockLlmClient::new()));
    }

    let llm = &config.llm;
    let api_key = config.get_api_key()?;
    let max_tokens = llm.get_max_tokens();

    match llm.provider.as_str() {
        "anthropic" => {
            let client = match &llm.base_url {
                Some(url) => AnthropicClient::with_base_url(
                    api_key,
                    llm.model.clone(),
                    url.clone(),
                    max_tokens,
                    llm.timeout_secs,
                )?,
                None => AnthropicClient::new(
                    api_key,
                    llm.model.clone(),
                    max_tokens,
                    llm.timeout_secs,
                )?,
            };
            Ok(Arc::new(client))
        }

        "openai" => {
            let client = match &llm.base_url {
                Some(url) => OpenAIClient::with_base_url(
                    api_key,
                    llm.model.clone(),
                    url.clone(),
                    max_tokens,
                    llm.timeout_secs,
                )?,
                None => {
                    OpenAIClient::new(api_key, llm.model.clone(), max_tokens, llm.timeout_secs)?
                }
            };
            Ok(Arc::new(client))
        }

        "openai-compatible" => {
            let base_url = llm
                .base_url
                .clone()
                .unwrap_or_else(|| LOCAL_OPENAI_BASE_URL.to_string());

            Ok(Arc::new(OpenAIClient::with_base_url(
                api_key,
                llm.model.clone(),
                base_url,
                max_tokens,
                llm.timeout_secs,
            )?))
        }

        unknown => bail!("Unknown LLM provider: {}", unknown),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    #[tokio::test]
    async fn test_create_mock_client_for_dry_run() {
        let mut config = Config::default();
        config.llm.provider = "nonsense".to_string();
        let client = create_client(&config, true).unwrap();
        assert!(client.complete("anything").await.is_ok());
    }

    #[test]
    fn test_create_default_client_without_key() {
        // openai-compatible tolerates a missing key
        let mut config = Config::default();
        config.llm.api_key_env = Some("SKILLMINER_FACTORY_UNSET_KEY_1".to_string());
        assert!(create_client(&config, false).is_ok());
    }

    #[test]
    #[serial]
    fn test_create_anthropic_and_openai_clients() {
        env::set_var("SKILLMINER_FACTORY_KEY", "test_key");
        let mut config = Config::default();
        config.llm.api_key_env = Some("SKILLMINER_FACTORY_KEY".to_string());
        config.llm.base_url = None;

        config.llm.provider = "anthropic".to_string();
        assert!(create_client(&config, false).is_ok());

        config.llm.provider = "openai".to_string();
        assert!(create_client(&config, false).is_ok());
        env::remove_var("SKILLMINER_FACTORY_KEY");
    }

    #[test]
    fn test_create_client_with_unknown_provider() {
        let mut config = Config::default();
        config.llm.provider = "gemini".to_string();
        let err = create_client(&config, false).err().unwrap();
        assert!(err.to_string().contains("Unknown LLM provider"));
    }

    #[test]
    fn test_create_client_without_required_api_key() {
        let mut config = Config::default();
        config.llm.provider = "anthropic".to_string();
        config.llm.api_key_env = Some("SKILLMINER_FACTORY_NONEXISTENT_99999".to_string());
        let err = create_client(&config, false).err().unwrap();
        assert!(err.to_string().contains("API key not found"));
    }
}
