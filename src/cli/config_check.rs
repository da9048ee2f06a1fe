use anyhow::Result;
use std::env;
use std::path::Path;

use crate::config::Config;
use crate::pipeline::merge::{MergePolicy, MergeStrategy};
use crate::pipeline::TargetKind;

struct CheckResult {
    passed: Vec<String>,
    warnings: Vec<String>,
    errors: Vec<String>,
}

impl CheckResult {
    fn new() -> Self {
        Self {
            passed: Vec::new(),
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn pass(&mut self, msg: impl Into<String>) {
        self.passed.push(msg.into());
    }

    fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }
}

pub fn run(config_path: Option<String>) -> Result<()> {
    let mut results = CheckResult::new();

    let config = match Config::load_with_path(config_path.clone()) {
        Ok(config) => {
            let source = config_path.as_deref().unwrap_or("default search path");
            results.pass(format!("Config loaded from {}", source));
            config
        }
        Err(e) => {
            // Reported through print_results, not propagated, so it is printed once
            results.error(format!("Failed to load config: {}", e));
            print_results(&results);
            return Ok(());
        }
    };

    check_config(&config, &mut results);
    print_results(&results);

    if !results.errors.is_empty() {
        anyhow::bail!("{} config error(s) found", results.errors.len());
    }
    Ok(())
}

fn check_config(config: &Config, results: &mut CheckResult) {
    // LLM provider and key
    match config.llm.provider.as_str() {
        "anthropic" | "openai" | "openai-compatible" => results.pass(format!(
            "LLM provider: {} (model: {})",
            config.llm.provider, config.llm.model
        )),
        other => results.error(format!("Unknown LLM provider: {}", other)),
    }
    check_api_key(
        config.llm.api_key_env.as_deref(),
        "LLM",
        config.llm.provider == "openai-compatible",
        results,
    );
    if config.llm.provider == "openai-compatible" && config.llm.base_url.is_none() {
        results.warn(
            "openai-compatible provider without base_url, will use http://localhost:11434/v1",
        );
    }

    // Search provider and key
    match config.search.provider.as_str() {
        "duckduckgo" => results.pass("Search provider: duckduckgo (no API key needed)"),
        "tavily" => {
            let env_var = config
                .search
                .api_key_env
                .as_deref()
                .unwrap_or("TAVILY_API_KEY");
            check_api_key(Some(env_var), "Search", false, results);
        }
        other => results.error(format!("Unknown search provider: {}", other)),
    }
    if config.search.retries == 0 {
        results.error("search.retries must be at least 1");
    } else {
        results.pass(format!(
            "Search retries: {} ({} backoff from {}ms)",
            config.search.retries, config.search.backoff, config.search.backoff_base_ms
        ));
    }
    if !matches!(
        config.search.backoff.to_lowercase().as_str(),
        "linear" | "exponential"
    ) {
        results.warn(format!(
            "Unknown backoff '{}', linear will be used",
            config.search.backoff
        ));
    }

    // Merge settings
    match MergeStrategy::parse(&config.merge.strategy) {
        Ok(strategy) => results.pass(format!("Merge strategy: {:?}", strategy)),
        Err(e) => results.error(e.to_string()),
    }
    match MergePolicy::from_config(&config.merge, TargetKind::Skill) {
        Ok(_) => results.pass(format!(
            "Merge policy: {} ({} extra rules)",
            config.merge.policy,
            config.merge.extra_rules.len()
        )),
        Err(e) => results.error(e.to_string()),
    }

    if config.extraction.max_targets == 0 {
        results.warn("extraction.max_targets is 0, reports will carry no details");
    }

    check_store_path(&config.store.json_path, "JSON store", results);
    check_store_path(&config.store.csv_path, "CSV store", results);
}

fn check_api_key(
    api_key_env: Option<&str>,
    label: &str,
    optional: bool,
    results: &mut CheckResult,
) {
    match api_key_env {
        Some(env_var) if env_var.to_lowercase() == "none" => {
            results.pass(format!("{}: no API key needed", label));
        }
        Some(env_var) => match env::var(env_var) {
            Ok(v) if !v.trim().is_empty() => {
                results.pass(format!("{}: {} is set", label, env_var));
            }
            _ if optional => {
                results.warn(format!(
                    "{}: {} is not set (OK for local models, needed for gateways)",
                    label, env_var
                ));
            }
            _ => {
                results.error(format!("{}: {} is not set", label, env_var));
            }
        },
        None => results.pass(format!("{}: no API key configured", label)),
    }
}

fn check_store_path(path: &Path, label: &str, results: &mut CheckResult) {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    if path.exists() {
        results.pass(format!("{}: {} (exists)", label, path.display()));
    } else if dir.is_dir() {
        results.pass(format!("{}: {} (will be created)", label, path.display()));
    } else {
        results.error(format!(
            "{}: directory {} does not exist",
            label,
            dir.display()
        ));
    }
}

fn print_results(results: &CheckResult) {
    println!();
    for msg in &results.passed {
        println!("  \u{2713} {}", msg);
    }
    for msg in &results.warnings {
        println!("  ! {}", msg);
    }
    for msg in &results.errors {
        println!("  \u{2717} {}", msg);
    }
    println!();
    println!(
        "{} passed, {} warnings, {} errors",
        results.passed.len(),
        results.warnings.len(),
        results.errors.len()
    );
}
