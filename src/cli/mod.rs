pub mod config_check;
pub mod extract;
pub mod update;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::io::{self, BufRead, Write};
use tracing::info;

use crate::config::Config;
use crate::llm;
use crate::pipeline::Extractor;
use crate::search;
use crate::store::json::to_pretty_json;

/// Command-line overrides applied on top of the loaded config.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
}

/// Load config from `config_path` (or the default search path) and apply overrides.
pub fn load_config(config_path: Option<String>, overrides: &Overrides) -> Result<Config> {
    let mut config = Config::load_with_path(config_path)?;

    if let Some(provider) = &overrides.provider {
        info!("CLI override: provider = {}", provider);
        config.llm.provider = provider.clone();
    }
    if let Some(model) = &overrides.model {
        info!("CLI override: model = {}", model);
        config.llm.model = model.clone();
    }
    if let Some(base_url) = &overrides.base_url {
        info!("CLI override: base_url = {}", base_url);
        config.llm.base_url = Some(base_url.clone());
    }

    config.validate()?;
    Ok(config)
}

/// The model client and fetcher wired together, mock-backed under `--dry-run`.
pub(crate) fn build_extractor(config: &Config, dry_run: bool) -> Result<Extractor> {
    if dry_run {
        info!("Dry run: using mock LLM client and static search results");
    }
    let client = llm::create_client(config, dry_run)?;
    let fetcher = search::create_fetcher(config, dry_run)?;
    Ok(Extractor::from_config(client, fetcher, &config.extraction))
}

/// Use `arg` when given, otherwise prompt on stderr and read one line from stdin.
pub fn read_argument(arg: Option<String>, prompt: &str) -> Result<String> {
    let stdin = io::stdin();
    read_argument_from(arg, prompt, &mut stdin.lock(), &mut io::stderr())
}

/// Stdout carries only the JSON result, so the prompt goes to `prompt_out`.
fn read_argument_from<R: BufRead, W: Write>(
    arg: Option<String>,
    prompt: &str,
    input: &mut R,
    prompt_out: &mut W,
) -> Result<String> {
    let value = match arg {
        Some(value) => value,
        None => {
            write!(prompt_out, "{}: ", prompt).context("failed to write prompt")?;
            prompt_out.flush().ok();
            let mut line = String::new();
            input
                .read_line(&mut line)
                .context("failed to read from stdin")?;
            line
        }
    };

    let value = value.trim();
    if value.is_empty() {
        bail!("{} must not be empty", prompt);
    }
    Ok(value.to_string())
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let bytes = to_pretty_json(value)?;
    io::stdout()
        .write_all(&bytes)
        .context("failed to write to stdout")?;
    Ok(())
}
