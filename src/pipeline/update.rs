//! Incremental store updates: extract, then put-or-merge into the persisted store.

use anyhow::Result;
use serde::Serialize;
use tracing::{info, warn};

use super::extractor::Extractor;
use super::merge::Merger;
use super::parser;
use super::record::{ExtractedRecord, ExtractionTarget, TargetKind};
use super::schema::ExtractionSchema;
use crate::config::MergeConfig;
use crate::llm::prompts;
use crate::store::{CsvFile, DomainStore, JsonFile, Store};
use crate::util::normalize_key;

pub const DEFAULT_DOMAIN: &str = "General IT";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UpdateStatus {
    Success,
    #[serde(rename = "No updates")]
    NoUpdates,
}

/// Summary of one update run. The store is only rewritten when `updated` is non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateReport {
    pub status: UpdateStatus,
    pub domain: String,
    pub updated: Vec<String>,
}

impl UpdateReport {
    fn new(domain: String, updated: Vec<String>) -> Self {
        let status = if updated.is_empty() {
            UpdateStatus::NoUpdates
        } else {
            UpdateStatus::Success
        };
        Self {
            status,
            domain,
            updated,
        }
    }
}

enum Applied {
    Added,
    Merged,
    Kept,
}

pub struct Updater {
    extractor: Extractor,
    merge_config: MergeConfig,
}

impl Updater {
    pub fn new(extractor: Extractor, merge_config: MergeConfig) -> Self {
        Self {
            extractor,
            merge_config,
        }
    }

    fn merger(&self, kind: TargetKind) -> Result<Merger> {
        Merger::from_config(self.extractor.client(), &self.merge_config, kind)
    }

    /// Main IT domain for `name`, falling back to "General IT".
    pub async fn infer_domain(&self, name: &str) -> String {
        let prompt = prompts::infer_domain_prompt(name);
        match self.extractor.client().complete(&prompt).await {
            Ok(reply) => parser::parse_json_field(&reply, "domain").unwrap_or_else(|| {
                warn!("Domain inference reply unusable, using {}", DEFAULT_DOMAIN);
                DEFAULT_DOMAIN.to_string()
            }),
            Err(e) => {
                warn!("Domain inference failed: {}", e);
                DEFAULT_DOMAIN.to_string()
            }
        }
    }

    /// Most generalized name for a subdomain ("ml" -> "Machine Learning"), or the input.
    pub async fn normalize_name(&self, name: &str) -> String {
        let prompt = prompts::normalize_name_prompt(name);
        let normalized = match self.extractor.client().complete(&prompt).await {
            Ok(reply) => parser::parse_json_field(&reply, "subdomain"),
            Err(e) => {
                warn!("Name normalization failed for {}: {}", name, e);
                None
            }
        };
        normalized.unwrap_or_else(|| name.trim().to_string())
    }

    /// Put `incoming` under `name`, merging with what is stored there.
    async fn apply(
        &self,
        merger: &Merger,
        existing: Option<&ExtractedRecord>,
        incoming: ExtractedRecord,
        name: &str,
    ) -> (Applied, Option<ExtractedRecord>) {
        let Some(existing) = existing else {
            info!("Adding new entry: {}", name);
            return (Applied::Added, Some(incoming));
        };

        info!("Updating existing entry: {}", name);
        match merger.merge(existing, &incoming).await {
            Ok(outcome) if !outcome.is_fallback() => (Applied::Merged, Some(outcome.record)),
            Ok(_) => (Applied::Kept, None),
            Err(e) => {
                warn!("Merge failed for {}, keeping old data: {:#}", name, e);
                (Applied::Kept, None)
            }
        }
    }

    /// Refresh the subdomains of a domain in the two-level JSON store.
    pub async fn update_domain(&self, query: &str, file: &JsonFile) -> Result<UpdateReport> {
        let mut store: DomainStore = file.load()?;
        let merger = self.merger(TargetKind::Subdomain)?;
        let schema = ExtractionSchema::subdomain();

        let mut subdomains = self.extractor.subfields(query).await?;

        let domain = match query.trim() {
            "" => self.infer_domain(query).await,
            name => name.to_string(),
        };

        if subdomains.is_empty() {
            warn!("No subdomains found for {}, using the query itself", domain);
            subdomains = vec![self.normalize_name(query).await];
        }

        info!("Processing subdomains under {}", domain);
        let domain_key = normalize_key(&domain);
        let mut updated = Vec::new();

        for subdomain in subdomains.iter().take(self.extractor.max_targets()) {
            let name = self.normalize_name(subdomain).await;
            if normalize_key(&name) == domain_key {
                info!("Skipping {} as it matches its main domain", name);
                continue;
            }

            let target = ExtractionTarget::new(subdomain.clone(), TargetKind::Subdomain);
            let mut incoming = match self.extractor.extract_record(&target, &schema).await {
                Ok(record) if record.has_content() => record,
                Ok(_) => {
                    warn!("No details extracted for {}, skipping", name);
                    continue;
                }
                Err(e) => {
                    warn!("Extraction failed for {}: {:#}", name, e);
                    continue;
                }
            };
            incoming.set_name(name.clone());

            let existing = store.get(&domain, &name);
            let (applied, record) = self.apply(&merger, existing, incoming, &name).await;
            if let (Applied::Added | Applied::Merged, Some(record)) = (applied, record) {
                store.put(&domain, &name, record);
                updated.push(name);
            }
        }

        if updated.is_empty() {
            info!("No updates were made for {}", domain);
        } else {
            file.save(&store)?;
        }
        Ok(UpdateReport::new(domain, updated))
    }

    /// Refresh the required skills of a domain in the flat CSV store.
    pub async fn update_skills(&self, query: &str, file: &CsvFile) -> Result<UpdateReport> {
        let mut store: Store = file.load()?;
        let merger = self.merger(TargetKind::Skill)?;
        let schema = ExtractionSchema::skill();

        let domain_skills = self.extractor.domain_skills(query.trim()).await?;
        info!(
            "Checking {} skills for {}",
            domain_skills.required_skills.len(),
            domain_skills.domain
        );

        let mut updated = Vec::new();
        for skill in domain_skills
            .required_skills
            .iter()
            .take(self.extractor.max_targets())
        {
            let target = ExtractionTarget::new(skill.clone(), TargetKind::Skill);
            let incoming = match self.extractor.extract_record(&target, &schema).await {
                Ok(record) if record.has_content() => record,
                Ok(_) => {
                    warn!("No details extracted for {}, skipping", skill);
                    continue;
                }
                Err(e) => {
                    warn!("Extraction failed for {}: {:#}", skill, e);
                    continue;
                }
            };

            let (applied, record) = self
                .apply(&merger, store.get(skill), incoming, skill)
                .await;
            if let (Applied::Added | Applied::Merged, Some(record)) = (applied, record) {
                store.put(skill, record);
                updated.push(skill.clone());
            }
        }

        if !updated.is_empty() {
            file.save(&store)?;
        }
        Ok(UpdateReport::new(domain_skills.domain, updated))
    }
}
