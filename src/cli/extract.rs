use anyhow::{anyhow, Result};
use std::path::PathBuf;
use tracing::info;

use super::{build_extractor, load_config, print_json, read_argument, Overrides};
use crate::pipeline::{ExtractionSchema, ExtractionTarget};
use crate::store::json::to_pretty_json;
use crate::store::write_atomic;

/// Classify a free-text query and run skill or domain extraction on it.
pub async fn run_query(
    query: Option<String>,
    config_path: Option<String>,
    overrides: Overrides,
    dry_run: bool,
) -> Result<()> {
    let config = load_config(config_path, &overrides)?;
    let query = read_argument(query, "Enter your query")?;
    let extractor = build_extractor(&config, dry_run)?;

    let report = extractor.run_query(&query).await?;
    print_json(&report)
}

/// Extract one record for a named target with the given schema.
pub async fn run_skill(
    name: Option<String>,
    schema: String,
    config_path: Option<String>,
    overrides: Overrides,
    dry_run: bool,
) -> Result<()> {
    let schema = ExtractionSchema::by_name(&schema).ok_or_else(|| {
        anyhow!(
            "Unknown schema: {} (expected skill, subdomain or subdomain-skills)",
            schema
        )
    })?;
    let config = load_config(config_path, &overrides)?;
    let name = read_argument(name, "Enter a skill")?;
    let extractor = build_extractor(&config, dry_run)?;

    let target = ExtractionTarget::new(name, schema.kind);
    let record = extractor.extract_record(&target, &schema).await?;
    print_json(&record)
}

/// Required skills of a domain, with details for the first few.
pub async fn run_domain(
    domain: Option<String>,
    config_path: Option<String>,
    overrides: Overrides,
    dry_run: bool,
) -> Result<()> {
    let config = load_config(config_path, &overrides)?;
    let domain = read_argument(domain, "Enter a domain")?;
    let extractor = build_extractor(&config, dry_run)?;

    let report = extractor.domain_report(&domain).await?;
    print_json(&report)
}

/// Subfields of a domain with details, also written to `output`.
pub async fn run_subdomains(
    domain: Option<String>,
    output: PathBuf,
    config_path: Option<String>,
    overrides: Overrides,
    dry_run: bool,
) -> Result<()> {
    let config = load_config(config_path, &overrides)?;
    let domain = read_argument(domain, "Enter a domain")?;
    let extractor = build_extractor(&config, dry_run)?;

    let report = extractor.subdomain_report(&domain).await?;
    write_atomic(&output, &to_pretty_json(&report)?)?;
    info!("Saved subdomain report to {}", output.display());
    print_json(&report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn dry_config(dir: &tempfile::TempDir) -> Option<String> {
        let path = dir.path().join("skillminer.toml");
        fs::write(
            &path,
            "[llm]\nprovider = \"openai\"\nmodel = \"gpt-4o-mini\"\napi_key_env = \"none\"\n",
        )
        .unwrap();
        Some(path.to_string_lossy().to_string())
    }

    #[tokio::test]
    async fn test_subdomains_writes_report() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("report.json");
        run_subdomains(
            Some("Artificial Intelligence".to_string()),
            output.clone(),
            dry_config(&dir),
            Overrides::default(),
            true,
        )
        .await
        .unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(written["Domain"], "Artificial Intelligence");
        assert!(written["Subdomains"].is_array());
        assert!(written["Detailed Subdomains"].is_array());
    }

    #[tokio::test]
    async fn test_unknown_schema_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_skill(
            Some("Rust".to_string()),
            "recipe".to_string(),
            dry_config(&dir),
            Overrides::default(),
            true,
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("Unknown schema"));
    }

    #[tokio::test]
    async fn test_skill_dry_run() {
        let dir = tempfile::tempdir().unwrap();
        run_skill(
            Some("Rust".to_string()),
            "skill".to_string(),
            dry_config(&dir),
            Overrides::default(),
            true,
        )
        .await
        .unwrap();
    }
}
