use anyhow::Result;
use tracing::info;

use super::{build_extractor, load_config, print_json, read_argument, Overrides};
use crate::pipeline::{ExtractionSchema, UpdateStatus, Updater};
use crate::store::{CsvFile, JsonFile};

/// Refresh the subdomains of a domain in the JSON store.
pub async fn run_domain(
    domain: Option<String>,
    config_path: Option<String>,
    overrides: Overrides,
    dry_run: bool,
) -> Result<()> {
    let config = load_config(config_path, &overrides)?;
    let domain = read_argument(domain, "Enter a domain")?;
    let file = JsonFile::new(&config.store.json_path);
    let updater = Updater::new(build_extractor(&config, dry_run)?, config.merge.clone());

    let report = updater.update_domain(&domain, &file).await?;
    if report.status == UpdateStatus::Success {
        info!(
            "Updated {} subdomains in {}",
            report.updated.len(),
            file.path().display()
        );
    }
    print_json(&report)
}

/// Refresh the required skills of a domain in the CSV store.
pub async fn run_skills(
    domain: Option<String>,
    config_path: Option<String>,
    overrides: Overrides,
    dry_run: bool,
) -> Result<()> {
    let config = load_config(config_path, &overrides)?;
    let domain = read_argument(domain, "Enter a domain")?;
    let file = CsvFile::new(&config.store.csv_path, ExtractionSchema::skill());
    let updater = Updater::new(build_extractor(&config, dry_run)?, config.merge.clone());

    let report = updater.update_skills(&domain, &file).await?;
    if report.status == UpdateStatus::Success {
        info!(
            "Updated {} skills in {}",
            report.updated.len(),
            file.path().display()
        );
    }
    print_json(&report)
}
