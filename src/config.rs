use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::search::retry::{Backoff, RetryPolicy};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub llm: LlmConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub merge: MergeConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>, // For OpenAI-compatible APIs (Groq, Ollama, ...)

    /// Optional: Override max_tokens for LLM requests
    /// If not specified, uses provider-specific defaults:
    /// - anthropic: 4096
    /// - openai: 4096
    /// - openai-compatible: 8192
    #[serde(default)]
    pub max_tokens: Option<u32>,

    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl LlmConfig {
    /// Get max_tokens value, using provider-specific default if not specified
    pub fn get_max_tokens(&self) -> u32 {
        if let Some(tokens) = self.max_tokens {
            return tokens;
        }

        match self.provider.as_str() {
            "anthropic" => 4096,
            "openai" => 4096,
            "openai-compatible" => 8192,
            _ => 4096,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// "duckduckgo" (default) or "tavily"
    #[serde(default = "default_search_provider")]
    pub provider: String,

    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Total attempts per query, including the first one
    #[serde(default = "default_retries")]
    pub retries: usize,

    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// "linear" (base * attempt) or "exponential" (base * 2^(attempt-1))
    #[serde(default = "default_backoff")]
    pub backoff: String,

    /// Only used by providers that need a key (tavily)
    #[serde(default)]
    pub api_key_env: Option<String>,

    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            provider: default_search_provider(),
            max_results: default_max_results(),
            retries: default_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff: default_backoff(),
            api_key_env: None,
            base_url: None,
        }
    }
}

impl SearchConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        let backoff = match self.backoff.to_lowercase().as_str() {
            "exponential" => Backoff::Exponential,
            _ => Backoff::Linear,
        };
        RetryPolicy::new(
            self.retries,
            Duration::from_millis(self.backoff_base_ms),
            backoff,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Cap on detailed sub-extractions per run (each costs a search + model call)
    #[serde(default = "default_max_targets")]
    pub max_targets: usize,

    /// One model call per fetched URL. When false, a single call is made per target.
    #[serde(default = "default_true")]
    pub per_source: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_targets: default_max_targets(),
            per_source: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConfig {
    /// "llm" (model reconciles both records) or "local" (deterministic union)
    #[serde(default = "default_merge_strategy")]
    pub strategy: String,

    /// "conservative" or "saturate"
    #[serde(default = "default_merge_policy")]
    pub policy: String,

    /// Appended verbatim to the rule list of the merge prompt
    #[serde(default)]
    pub extra_rules: Vec<String>,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            strategy: default_merge_strategy(),
            policy: default_merge_policy(),
            extra_rules: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_json_path")]
    pub json_path: PathBuf,

    #[serde(default = "default_csv_path")]
    pub csv_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            json_path: default_json_path(),
            csv_path: default_csv_path(),
        }
    }
}

fn default_llm_timeout() -> u64 {
    120
}

fn default_search_provider() -> String {
    "duckduckgo".to_string()
}

fn default_max_results() -> usize {
    5
}

fn default_retries() -> usize {
    3
}

fn default_backoff_base_ms() -> u64 {
    2000
}

fn default_backoff() -> String {
    "linear".to_string()
}

fn default_max_targets() -> usize {
    7
}

fn default_true() -> bool {
    true
}

fn default_merge_strategy() -> String {
    "llm".to_string()
}

fn default_merge_policy() -> String {
    "conservative".to_string()
}

fn default_json_path() -> PathBuf {
    PathBuf::from("master_it_subdomains.json")
}

fn default_csv_path() -> PathBuf {
    PathBuf::from("master_it_skills.csv")
}

impl Config {
    /// Load configuration from a specific path, or use default search paths
    pub fn load_with_path(path: Option<String>) -> Result<Self> {
        if let Some(config_path) = path {
            debug!("Loading config from explicit path: {}", config_path);
            return Self::load_from_path(&config_path);
        }

        if let Ok(config) = Self::load_from_path("skillminer.toml") {
            debug!("Loaded config from ./skillminer.toml");
            return Ok(config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let config_path = config_dir.join("skillminer").join("config.toml");
            if let Ok(config) = Self::load_from_path(&config_path) {
                debug!("Loaded config from {:?}", config_path);
                return Ok(config);
            }
        }

        debug!("Using default config");
        Ok(Self::default())
    }

    fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Get API key from environment variable specified in config
    pub fn get_api_key(&self) -> Result<String> {
        resolve_key(self.llm.api_key_env.as_deref(), &self.llm.provider)
    }

    /// Key for the search provider; empty when the provider needs none.
    pub fn get_search_api_key(&self) -> Result<String> {
        match self.search.provider.as_str() {
            "tavily" => {
                let env_var = self
                    .search
                    .api_key_env
                    .clone()
                    .unwrap_or_else(|| "TAVILY_API_KEY".to_string());
                env::var(&env_var).map_err(|_| {
                    anyhow::anyhow!("API key not found in environment variable: {}", env_var)
                })
            }
            _ => Ok(String::new()),
        }
    }

    /// Reject combinations that would only fail later, mid-run.
    pub fn validate(&self) -> Result<()> {
        if self.search.retries == 0 {
            bail!("search.retries must be at least 1");
        }
        if self.search.max_results == 0 {
            bail!("search.max_results must be at least 1");
        }
        match self.merge.strategy.as_str() {
            "llm" | "local" => {}
            other => bail!("Unknown merge strategy: {}", other),
        }
        Ok(())
    }
}

fn resolve_key(api_key_env: Option<&str>, provider: &str) -> Result<String> {
    match api_key_env {
        Some(env_var) => {
            // "none" means no API key needed (local servers)
            if env_var.to_lowercase() == "none" {
                return Ok(String::new());
            }

            // openai-compatible: local models need no key, hosted gateways do
            if provider == "openai-compatible" {
                return Ok(env::var(env_var).unwrap_or_default());
            }

            env::var(env_var).map_err(|_| {
                anyhow::anyhow!("API key not found in environment variable: {}", env_var)
            })
        }
        None => Ok(String::new()),
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                provider: "openai-compatible".to_string(),
                model: "llama3-8b-8192".to_string(),
                api_key_env: Some("GROQ_API_KEY".to_string()),
                base_url: Some("https://api.groq.com/openai/v1".to_string()),
                max_tokens: None,
                timeout_secs: default_llm_timeout(),
            },
            search: SearchConfig::default(),
            extraction: ExtractionConfig::default(),
            merge: MergeConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.llm.provider, "openai-compatible");
        assert_eq!(config.llm.model, "llama3-8b-8192");
        assert_eq!(config.llm.api_key_env, Some("GROQ_API_KEY".to_string()));
        assert_eq!(config.search.max_results, 5);
        assert_eq!(config.search.retries, 3);
        assert_eq!(config.search.backoff_base_ms, 2000);
        assert_eq!(config.extraction.max_targets, 7);
        assert_eq!(config.merge.strategy, "llm");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("provider = \"openai-compatible\""));
        assert!(toml_str.contains("GROQ_API_KEY"));
        assert!(toml_str.contains("master_it_subdomains.json"));
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let toml_str = r#"
[llm]
provider = "openai"
model = "gpt-4o-mini"
api_key_env = "OPENAI_API_KEY"

[search]
retries = 5
backoff = "exponential"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.llm.timeout_secs, 120);
        assert_eq!(config.search.retries, 5);
        assert_eq!(config.search.provider, "duckduckgo");
        assert_eq!(config.search.retry_policy().backoff, Backoff::Exponential);
        assert_eq!(config.merge.policy, "conservative");
        assert_eq!(config.store.csv_path, PathBuf::from("master_it_skills.csv"));
    }

    #[test]
    fn test_retry_policy_from_config() {
        let config = SearchConfig::default();
        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_secs(2));
        assert_eq!(policy.backoff, Backoff::Linear);
    }

    #[test]
    fn test_validate_rejects_zero_retries() {
        let mut config = Config::default();
        config.search.retries = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_merge_strategy() {
        let mut config = Config::default();
        config.merge.strategy = "vote".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Unknown merge strategy"));
    }

    #[test]
    fn test_max_tokens_provider_defaults() {
        let mut llm = Config::default().llm;
        assert_eq!(llm.get_max_tokens(), 8192);

        llm.provider = "anthropic".to_string();
        assert_eq!(llm.get_max_tokens(), 4096);

        llm.max_tokens = Some(2000);
        assert_eq!(llm.get_max_tokens(), 2000);
    }

    #[test]
    #[serial]
    fn test_api_key_from_env() {
        env::set_var("SKILLMINER_TEST_API_KEY", "test_key_123");
        let mut config = Config::default();
        config.llm.provider = "openai".to_string();
        config.llm.api_key_env = Some("SKILLMINER_TEST_API_KEY".to_string());

        assert_eq!(config.get_api_key().unwrap(), "test_key_123");
        env::remove_var("SKILLMINER_TEST_API_KEY");
    }

    #[test]
    fn test_api_key_missing_fails() {
        let mut config = Config::default();
        config.llm.provider = "openai".to_string();
        config.llm.api_key_env = Some("SKILLMINER_NONEXISTENT_KEY_XYZ".to_string());
        assert!(config.get_api_key().is_err());
    }

    #[test]
    fn test_api_key_openai_compatible_missing_ok() {
        let mut config = Config::default();
        config.llm.api_key_env = Some("SKILLMINER_NONEXISTENT_KEY_OAI_999".to_string());
        assert_eq!(config.get_api_key().unwrap(), "");
    }

    #[test]
    fn test_api_key_none_for_local_server() {
        let mut config = Config::default();
        config.llm.provider = "anthropic".to_string();
        config.llm.api_key_env = Some("none".to_string());
        assert_eq!(config.get_api_key().unwrap(), "");
    }

    #[test]
    #[serial]
    fn test_search_api_key_for_tavily() {
        let mut config = Config::default();
        assert_eq!(config.get_search_api_key().unwrap(), "");

        config.search.provider = "tavily".to_string();
        config.search.api_key_env = Some("SKILLMINER_TEST_TAVILY_KEY".to_string());
        assert!(config.get_search_api_key().is_err());

        env::set_var("SKILLMINER_TEST_TAVILY_KEY", "tvly-123");
        assert_eq!(config.get_search_api_key().unwrap(), "tvly-123");
        env::remove_var("SKILLMINER_TEST_TAVILY_KEY");
    }
}
