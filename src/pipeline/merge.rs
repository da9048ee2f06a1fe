//! Reconciling a stored record with a freshly extracted one.
//!
//! The `llm` strategy hands both records to the model and fails closed: an unusable reply
//! leaves the stored record untouched. The `local` strategy is a deterministic union.

use anyhow::{bail, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::parser::extract_json_block;
use super::record::{ExtractedRecord, TargetKind};
use crate::config::MergeConfig;
use crate::error::MergeParseError;
use crate::llm::{prompts, LlmClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    Llm,
    Local,
}

impl MergeStrategy {
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "llm" => Ok(MergeStrategy::Llm),
            "local" => Ok(MergeStrategy::Local),
            other => bail!("Unknown merge strategy: {}", other),
        }
    }
}

/// The rules handed to the model, plus what the merger enforces itself afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePolicy {
    /// What the dataset holds ("IT skill")
    pub subject: String,
    pub rules: Vec<String>,
    /// Restore the stored `name` if the model rewrote it
    pub keep_name: bool,
}

fn subject_for(kind: TargetKind) -> String {
    format!("IT {}", kind)
}

impl MergePolicy {
    /// Only add missing information and leave the stored name alone.
    pub fn conservative(kind: TargetKind) -> Self {
        let noun = kind.to_string();
        Self {
            subject: subject_for(kind),
            rules: vec![
                format!(
                    "No duplicate {} names or aliases (e.g., \"Java\" and \"Java Developer\" should be merged)",
                    noun
                ),
                format!("No redundant or repeated {} descriptions", noun),
                "Only add missing and useful details".to_string(),
                "Keep subsets properly structured".to_string(),
                "Never change the name field".to_string(),
            ],
            keep_name: true,
        }
    }

    /// Push lists towards completeness; the model may also rename.
    pub fn saturate(kind: TargetKind) -> Self {
        let noun = kind.to_string();
        Self {
            subject: subject_for(kind),
            rules: vec![
                format!("No duplicate {} names", noun),
                format!("No redundant or repeated {} descriptions", noun),
                "Ensure skill lists are fully saturated and comprehensive".to_string(),
                "Only add missing and useful details".to_string(),
                "Keep subsets properly structured".to_string(),
            ],
            keep_name: false,
        }
    }

    pub fn from_config(config: &MergeConfig, kind: TargetKind) -> Result<Self> {
        let mut policy = match config.policy.to_lowercase().as_str() {
            "conservative" => Self::conservative(kind),
            "saturate" => Self::saturate(kind),
            other => bail!("Unknown merge policy: {}", other),
        };
        policy.rules.extend(config.extra_rules.iter().cloned());
        Ok(policy)
    }
}

/// Result of a merge. `error` is set when the model reply was unusable and `record` is
/// the stored record unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub record: ExtractedRecord,
    pub error: Option<MergeParseError>,
}

impl MergeOutcome {
    pub fn is_fallback(&self) -> bool {
        self.error.is_some()
    }
}

pub struct Merger {
    client: Arc<dyn LlmClient>,
    policy: MergePolicy,
    strategy: MergeStrategy,
}

impl Merger {
    pub fn new(client: Arc<dyn LlmClient>, policy: MergePolicy) -> Self {
        Self {
            client,
            policy,
            strategy: MergeStrategy::Llm,
        }
    }

    pub fn with_strategy(mut self, strategy: MergeStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn from_config(
        client: Arc<dyn LlmClient>,
        config: &MergeConfig,
        kind: TargetKind,
    ) -> Result<Self> {
        Ok(Self::new(client, MergePolicy::from_config(config, kind)?)
            .with_strategy(MergeStrategy::parse(&config.strategy)?))
    }

    pub fn policy(&self) -> &MergePolicy {
        &self.policy
    }

    pub fn strategy(&self) -> MergeStrategy {
        self.strategy
    }

    /// Merge `incoming` into `existing`.
    ///
    /// An unusable model reply is not an error: the outcome carries `existing` and the
    /// parse error. `Err` means the model call itself failed.
    pub async fn merge(
        &self,
        existing: &ExtractedRecord,
        incoming: &ExtractedRecord,
    ) -> Result<MergeOutcome> {
        let label = existing.name().or(incoming.name()).unwrap_or("unnamed");

        if self.strategy == MergeStrategy::Local {
            debug!("Merging {} locally", label);
            return Ok(MergeOutcome {
                record: merge_local(existing, incoming),
                error: None,
            });
        }

        info!("Merging {} with the model", label);
        let prompt = prompts::merge_prompt(existing, incoming, &self.policy);
        let reply = self.client.complete(&prompt).await?;

        match parse_merge_reply(&reply).and_then(|merged| {
            check_field_kinds(&merged, existing, incoming)?;
            Ok(merged)
        }) {
            Ok(merged) => {
                let mut record = reconcile(merged, existing, incoming);
                if self.policy.keep_name {
                    if let Some(name) = existing.name().filter(|n| !n.trim().is_empty()) {
                        record.set_name(name.to_string());
                    }
                }
                Ok(MergeOutcome {
                    record,
                    error: None,
                })
            }
            Err(err) => {
                warn!("Merge reply for {} unusable, keeping stored data: {}", label, err);
                Ok(MergeOutcome {
                    record: existing.clone(),
                    error: Some(err),
                })
            }
        }
    }
}

/// Deterministic union of both records, stored values first.
pub fn merge_local(existing: &ExtractedRecord, incoming: &ExtractedRecord) -> ExtractedRecord {
    let mut record = existing.clone();
    record.absorb(incoming);
    record
}

/// Outermost brace span of the reply, read as a record.
pub fn parse_merge_reply(reply: &str) -> Result<ExtractedRecord, MergeParseError> {
    let block = extract_json_block(reply).ok_or(MergeParseError::NoJsonObject)?;
    let value: serde_json::Value =
        serde_json::from_str(block).map_err(|e| MergeParseError::InvalidJson(e.to_string()))?;
    serde_json::from_value(value).map_err(|e| MergeParseError::UnexpectedShape(e.to_string()))
}

/// Every field the reply shares with either input must keep that input's kind.
fn check_field_kinds(
    merged: &ExtractedRecord,
    existing: &ExtractedRecord,
    incoming: &ExtractedRecord,
) -> Result<(), MergeParseError> {
    for (key, value) in merged.iter() {
        let Some(expected) = existing.get(key).or(incoming.get(key)) else {
            continue;
        };
        if std::mem::discriminant(value) != std::mem::discriminant(expected) {
            return Err(MergeParseError::UnexpectedShape(format!(
                "field '{}' changed kind",
                key
            )));
        }
    }
    Ok(())
}

/// Key order follows `existing`, then `incoming`, then keys only the model added.
/// Any field the model dropped is restored from the side that had it.
fn reconcile(
    merged: ExtractedRecord,
    existing: &ExtractedRecord,
    incoming: &ExtractedRecord,
) -> ExtractedRecord {
    let mut out = ExtractedRecord::new();
    for (key, value) in existing.iter().chain(incoming.iter()) {
        if out.contains_key(key) {
            continue;
        }
        let chosen = merged.get(key).unwrap_or(value);
        out.insert(key.clone(), chosen.clone());
    }
    for (key, value) in merged.iter() {
        if !out.contains_key(key) {
            out.insert(key.clone(), value.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;
    use crate::pipeline::record::{FieldValue, SUBSETS_KEY};

    fn java() -> ExtractedRecord {
        let mut record = ExtractedRecord::new();
        record.set_name("Java");
        record.insert("description", FieldValue::Scalar("A language".into()));
        record.insert("aliases", FieldValue::List(vec!["java".into()]));
        record
    }

    fn merger(replies: &[&str]) -> (Arc<ScriptedLlmClient>, Merger) {
        let client = Arc::new(ScriptedLlmClient::new(replies.iter().copied()));
        let merger = Merger::new(client.clone(), MergePolicy::conservative(TargetKind::Skill));
        (client, merger)
    }

    #[tokio::test]
    async fn test_unparseable_reply_keeps_existing() {
        let (_, merger) = merger(&["not json"]);
        let existing = java();
        let outcome = merger.merge(&existing, &ExtractedRecord::new()).await.unwrap();
        assert_eq!(outcome.record, existing);
        assert_eq!(outcome.error, Some(MergeParseError::NoJsonObject));
        assert!(outcome.is_fallback());
    }

    #[tokio::test]
    async fn test_invalid_json_and_wrong_shape_are_reported() {
        let (_, merger) = merger(&["{name: Java}", r#"{"name": "Java", "rank": 3}"#]);
        let existing = java();

        let outcome = merger.merge(&existing, &existing).await.unwrap();
        assert!(matches!(outcome.error, Some(MergeParseError::InvalidJson(_))));
        assert_eq!(outcome.record, existing);

        let outcome = merger.merge(&existing, &existing).await.unwrap();
        assert!(matches!(
            outcome.error,
            Some(MergeParseError::UnexpectedShape(_))
        ));
    }

    #[tokio::test]
    async fn test_reply_changing_field_kind_keeps_existing() {
        let mut existing = java();
        let mut subsets = indexmap::IndexMap::new();
        subsets.insert("frameworks".to_string(), vec!["Spring".to_string()]);
        existing.insert(SUBSETS_KEY, FieldValue::Map(subsets));

        let (_, merger) = merger(&[
            r#"{"name": "Java", "aliases": "java, JDK", "subsets": ["Spring"]}"#,
            r#"{"name": "Java", "subsets": ["Spring"]}"#,
        ]);

        let outcome = merger.merge(&existing, &existing).await.unwrap();
        assert!(matches!(
            outcome.error,
            Some(MergeParseError::UnexpectedShape(ref msg)) if msg.contains("aliases")
        ));
        assert_eq!(outcome.record, existing);

        let outcome = merger.merge(&existing, &existing).await.unwrap();
        assert!(outcome.is_fallback());
        assert_eq!(outcome.record.subsets().unwrap()["frameworks"], vec!["Spring"]);
    }

    #[tokio::test]
    async fn test_reply_with_commentary_is_accepted() {
        let reply = r#"Here is the merged entry:
{"name": "Java", "description": "A language", "aliases": ["java", "JDK"]}
Let me know if you need anything else."#;
        let (client, merger) = merger(&[reply]);
        let mut incoming = ExtractedRecord::new();
        incoming.insert("aliases", FieldValue::List(vec!["JDK".into()]));

        let outcome = merger.merge(&java(), &incoming).await.unwrap();
        assert!(outcome.error.is_none());
        assert_eq!(outcome.record.list("aliases"), &["java".to_string(), "JDK".to_string()]);
        assert!(client.prompts()[0].contains("Never change the name field"));
    }

    #[tokio::test]
    async fn test_dropped_fields_are_restored() {
        let (_, merger) = merger(&[r#"{"name": "Java", "aliases": ["java"]}"#]);
        let mut incoming = ExtractedRecord::new();
        incoming.insert("type", FieldValue::Scalar("Programming Language".into()));

        let outcome = merger.merge(&java(), &incoming).await.unwrap();
        let keys: Vec<_> = outcome.record.keys().cloned().collect();
        assert_eq!(keys, vec!["name", "description", "aliases", "type"]);
        assert_eq!(outcome.record.scalar("description"), Some("A language"));
        assert_eq!(outcome.record.scalar("type"), Some("Programming Language"));
    }

    #[tokio::test]
    async fn test_conservative_policy_keeps_stored_name() {
        let (_, merger) = merger(&[r#"{"name": "Java Developer"}"#]);
        let outcome = merger.merge(&java(), &java()).await.unwrap();
        assert_eq!(outcome.record.name(), Some("Java"));
    }

    #[tokio::test]
    async fn test_saturate_policy_accepts_new_name() {
        let client = Arc::new(ScriptedLlmClient::new([r#"{"name": "Java SE"}"#]));
        let merger = Merger::new(client.clone(), MergePolicy::saturate(TargetKind::Skill));
        let outcome = merger.merge(&java(), &java()).await.unwrap();
        assert_eq!(outcome.record.name(), Some("Java SE"));
        assert!(client.prompts()[0].contains("fully saturated"));
    }

    #[tokio::test]
    async fn test_model_failure_is_an_error() {
        let client = Arc::new(ScriptedLlmClient::default());
        client.push_failure("OpenAI API error 500");
        let merger = Merger::new(client, MergePolicy::conservative(TargetKind::Skill));
        assert!(merger.merge(&java(), &java()).await.is_err());
    }

    #[tokio::test]
    async fn test_local_strategy_makes_no_model_call() {
        let (client, merger) = merger(&[]);
        let merger = merger.with_strategy(MergeStrategy::Local);

        let mut incoming = ExtractedRecord::new();
        incoming.insert("aliases", FieldValue::List(vec!["JAVA".into(), "J2EE".into()]));
        let outcome = merger.merge(&java(), &incoming).await.unwrap();

        assert_eq!(outcome.record.list("aliases"), &["java".to_string(), "J2EE".to_string()]);
        assert!(client.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_merging_record_with_itself_is_idempotent() {
        let record = java();
        let local = Merger::new(
            Arc::new(ScriptedLlmClient::default()),
            MergePolicy::conservative(TargetKind::Skill),
        )
        .with_strategy(MergeStrategy::Local);
        let outcome = local.merge(&record, &record).await.unwrap();
        assert_eq!(outcome.record, record);

        // A model echoing the record back gives the same field set
        let echo = serde_json::to_string(&record).unwrap();
        let (_, merger) = merger(&[echo.as_str()]);
        let outcome = merger.merge(&record, &record).await.unwrap();
        assert!(outcome.record.same_field_set(&record));
        assert_eq!(outcome.record, record);
    }

    #[test]
    fn test_policy_from_config() {
        let mut config = MergeConfig::default();
        config.extra_rules = vec!["Keep certifications vendor-neutral".to_string()];
        let policy = MergePolicy::from_config(&config, TargetKind::Subdomain).unwrap();
        assert_eq!(policy.subject, "IT subdomain");
        assert!(policy.keep_name);
        assert_eq!(
            policy.rules.last().map(String::as_str),
            Some("Keep certifications vendor-neutral")
        );

        config.policy = "saturate".to_string();
        assert!(!MergePolicy::from_config(&config, TargetKind::Skill)
            .unwrap()
            .keep_name);

        config.policy = "aggressive".to_string();
        assert!(MergePolicy::from_config(&config, TargetKind::Skill).is_err());
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!(MergeStrategy::parse("LLM").unwrap(), MergeStrategy::Llm);
        assert_eq!(MergeStrategy::parse("local").unwrap(), MergeStrategy::Local);
        assert!(MergeStrategy::parse("vote").is_err());
    }
}
