//! Fetch, prompt, parse: turning a target name into a record.

use anyhow::{bail, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::parser::{self, QueryCategory};
use super::record::{union_items, ExtractedRecord, ExtractionTarget, TargetKind};
use super::schema::ExtractionSchema;
use crate::config::ExtractionConfig;
use crate::llm::{prompts, LlmClient};
use crate::search::Fetcher;
use crate::util::{capitalize, preview};

const UNCLASSIFIED: &str = "Unable to classify the query.";

/// Required skills of a domain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainSkills {
    #[serde(rename = "Domain")]
    pub domain: String,
    #[serde(rename = "Required Skills")]
    pub required_skills: Vec<String>,
}

/// What a free-text query resolved to.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryReport {
    Skill(ExtractedRecord),
    Domain(DomainSkills),
    Error {
        #[serde(rename = "Error")]
        error: String,
    },
}

/// A domain's required skills plus details for the first few of them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainReport {
    #[serde(rename = "Domain")]
    pub domain: String,
    #[serde(rename = "Domain Skills")]
    pub skills: Vec<String>,
    #[serde(rename = "Detailed Skills")]
    pub detailed: Vec<ExtractedRecord>,
}

/// A domain's subfields plus details for the first few of them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubdomainReport {
    #[serde(rename = "Domain")]
    pub domain: String,
    #[serde(rename = "Subdomains")]
    pub subdomains: Vec<String>,
    #[serde(rename = "Detailed Subdomains")]
    pub detailed: Vec<ExtractedRecord>,
}

/// The words after the last "for" ("essential skills for agriculture" -> "agriculture").
/// Falls back to the whole query when nothing follows.
pub fn target_from_query(query: &str) -> String {
    let words: Vec<&str> = query.split_whitespace().collect();
    let tail = words
        .iter()
        .rposition(|w| w.eq_ignore_ascii_case("for"))
        .map(|i| words[i + 1..].join(" "))
        .unwrap_or_else(|| words.join(" "));
    if tail.is_empty() {
        words.join(" ")
    } else {
        tail
    }
}

pub struct Extractor {
    client: Arc<dyn LlmClient>,
    fetcher: Fetcher,
    per_source: bool,
    max_targets: usize,
}

impl Extractor {
    pub fn new(client: Arc<dyn LlmClient>, fetcher: Fetcher) -> Self {
        let defaults = ExtractionConfig::default();
        Self {
            client,
            fetcher,
            per_source: defaults.per_source,
            max_targets: defaults.max_targets,
        }
    }

    pub fn from_config(
        client: Arc<dyn LlmClient>,
        fetcher: Fetcher,
        config: &ExtractionConfig,
    ) -> Self {
        Self::new(client, fetcher)
            .with_per_source(config.per_source)
            .with_max_targets(config.max_targets)
    }

    pub fn with_per_source(mut self, per_source: bool) -> Self {
        self.per_source = per_source;
        self
    }

    pub fn with_max_targets(mut self, max_targets: usize) -> Self {
        self.max_targets = max_targets;
        self
    }

    pub fn client(&self) -> Arc<dyn LlmClient> {
        Arc::clone(&self.client)
    }

    pub fn max_targets(&self) -> usize {
        self.max_targets
    }

    /// Extract one record for `target`.
    ///
    /// With `per_source`, every fetched page gets its own model call and the partial
    /// records are unioned. A failed fetch aborts this target; a failed model call only
    /// loses that page. Without `per_source` a single ungrounded call is made.
    pub async fn extract_record(
        &self,
        target: &ExtractionTarget,
        schema: &ExtractionSchema,
    ) -> Result<ExtractedRecord> {
        info!("Extracting {} details for: {}", target.kind, target.name);
        let mut record = schema.empty_record();

        let requests: Vec<String> = if self.per_source {
            let urls = self.fetcher.fetch(&prompts::search_query(target)).await?;
            if urls.is_empty() {
                warn!("No sources found for {}, asking without one", target.name);
                vec![prompts::build_prompt(target, schema)]
            } else {
                urls.iter()
                    .map(|url| prompts::build_source_prompt(target, schema, url))
                    .collect()
            }
        } else {
            vec![prompts::build_prompt(target, schema)]
        };

        let mut answered = 0usize;
        let mut last_error = None;
        for prompt in &requests {
            match self.client.complete(prompt).await {
                Ok(reply) => {
                    debug!("Raw reply: {}", preview(&reply, 300));
                    record.absorb(&parser::parse(&reply, schema));
                    answered += 1;
                }
                Err(e) => {
                    warn!("Model call failed for {}: {}", target.name, e);
                    last_error = Some(e);
                }
            }
        }

        if answered == 0 {
            if let Some(e) = last_error {
                return Err(e.context(format!("every model call failed for {}", target.name)));
            }
        }

        if !record.has_content() {
            warn!("No fields recovered for {}", target.name);
        }
        record.set_name(capitalize(target.name.trim()));
        Ok(record)
    }

    /// Union of `- item` bullets across every page fetched for `query`.
    pub async fn extract_bullets<F>(&self, query: &str, prompt_for: F) -> Result<Vec<String>>
    where
        F: Fn(&str) -> String,
    {
        let urls = self.fetcher.fetch(query).await?;
        let mut items = Vec::new();
        let mut answered = 0usize;
        let mut last_error = None;

        for url in &urls {
            debug!("Fetching data from: {}", url);
            match self.client.complete(&prompt_for(url)).await {
                Ok(reply) => {
                    union_items(&mut items, &parser::parse_bullets(&reply));
                    answered += 1;
                }
                Err(e) => {
                    warn!("Model call failed for {}: {}", url, e);
                    last_error = Some(e);
                }
            }
        }

        if answered == 0 {
            if let Some(e) = last_error {
                return Err(e.context(format!("every model call failed for {:?}", query)));
            }
        }

        info!("Collected {} items for {:?}", items.len(), query);
        Ok(items)
    }

    pub async fn domain_skills(&self, domain: &str) -> Result<DomainSkills> {
        let required_skills = self
            .extract_bullets(&prompts::domain_skills_query(domain), |url| {
                prompts::domain_skills_prompt(domain, url)
            })
            .await?;
        Ok(DomainSkills {
            domain: domain.to_string(),
            required_skills,
        })
    }

    pub async fn subfields(&self, domain: &str) -> Result<Vec<String>> {
        self.extract_bullets(&prompts::subfields_query(domain), |url| {
            prompts::subfields_prompt(domain, url)
        })
        .await
    }

    pub async fn classify(&self, query: &str) -> Result<QueryCategory> {
        let reply = self
            .client
            .complete(&prompts::classify_query_prompt(query))
            .await?;
        let category = parser::parse_category(&reply);
        info!("Classified {:?} as {:?}", query, category);
        Ok(category)
    }

    /// Classify the query, then run skill or domain extraction on its target.
    pub async fn run_query(&self, query: &str) -> Result<QueryReport> {
        let query = query.trim();
        if query.is_empty() {
            bail!("query is empty");
        }

        match self.classify(query).await? {
            QueryCategory::Skill => {
                let target = ExtractionTarget::new(target_from_query(query), TargetKind::Skill);
                let record = self
                    .extract_record(&target, &ExtractionSchema::skill())
                    .await?;
                Ok(QueryReport::Skill(record))
            }
            QueryCategory::Domain => {
                let skills = self.domain_skills(&target_from_query(query)).await?;
                Ok(QueryReport::Domain(skills))
            }
            QueryCategory::Unknown => Ok(QueryReport::Error {
                error: UNCLASSIFIED.to_string(),
            }),
        }
    }

    /// Extract every target in turn, capped at `max_targets`. Failed targets are skipped.
    async fn extract_many(
        &self,
        names: &[String],
        kind: TargetKind,
        schema: &ExtractionSchema,
    ) -> Vec<ExtractedRecord> {
        let mut detailed = Vec::new();
        for name in names.iter().take(self.max_targets) {
            let target = ExtractionTarget::new(name.clone(), kind);
            match self.extract_record(&target, schema).await {
                Ok(record) => detailed.push(record),
                Err(e) => warn!("Skipping {}: {:#}", name, e),
            }
        }
        detailed
    }

    /// Domain required skills, with skill details for the first `max_targets`.
    pub async fn domain_report(&self, domain: &str) -> Result<DomainReport> {
        let skills = self.domain_skills(domain).await?;
        let detailed = self
            .extract_many(
                &skills.required_skills,
                TargetKind::Skill,
                &ExtractionSchema::skill(),
            )
            .await;
        Ok(DomainReport {
            domain: skills.domain,
            skills: skills.required_skills,
            detailed,
        })
    }

    /// Domain subfields, with subdomain details for the first `max_targets`.
    pub async fn subdomain_report(&self, domain: &str) -> Result<SubdomainReport> {
        let subdomains = self.subfields(domain).await?;
        let detailed = self
            .extract_many(
                &subdomains,
                TargetKind::Subdomain,
                &ExtractionSchema::subdomain(),
            )
            .await;
        Ok(SubdomainReport {
            domain: domain.to_string(),
            subdomains,
            detailed,
        })
    }
}
