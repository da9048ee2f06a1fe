//! Persisted keyed collections of records.
//!
//! Stores are loaded whole, mutated in memory and written back whole. Keys are sorted and
//! record field order is preserved, so saving an unchanged store is byte-stable.

pub mod csv;
pub mod json;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::pipeline::record::ExtractedRecord;
use crate::util::normalize_key;

pub use self::csv::CsvFile;
pub use self::json::JsonFile;

/// Flat store: normalized target name -> record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Store {
    entries: BTreeMap<String, ExtractedRecord>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&ExtractedRecord> {
        self.entries.get(&normalize_key(name))
    }

    /// Insert or replace the record stored under `name`.
    pub fn put(&mut self, name: &str, record: ExtractedRecord) {
        self.entries.insert(normalize_key(name), record);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&normalize_key(name))
    }

    pub fn remove(&mut self, name: &str) -> Option<ExtractedRecord> {
        self.entries.remove(&normalize_key(name))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ExtractedRecord)> {
        self.entries.iter()
    }
}

/// Two-level store: domain -> normalized subdomain name -> record.
///
/// Domain keys keep the spelling they were first written with and are matched
/// case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DomainStore {
    domains: BTreeMap<String, Store>,
}

impl DomainStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn domain_key(&self, domain: &str) -> Option<&String> {
        let wanted = normalize_key(domain);
        self.domains.keys().find(|k| normalize_key(k) == wanted)
    }

    pub fn domain(&self, domain: &str) -> Option<&Store> {
        self.domain_key(domain).and_then(|k| self.domains.get(k))
    }

    pub fn get(&self, domain: &str, name: &str) -> Option<&ExtractedRecord> {
        self.domain(domain).and_then(|store| store.get(name))
    }

    /// Insert or replace a record, creating the domain bucket on first write.
    pub fn put(&mut self, domain: &str, name: &str, record: ExtractedRecord) {
        let key = self
            .domain_key(domain)
            .cloned()
            .unwrap_or_else(|| domain.trim().to_string());
        self.domains.entry(key).or_default().put(name, record);
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Store)> {
        self.domains.iter()
    }
}

/// Write `bytes` to a temporary file beside `path`, then rename it into place.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to create temp file in {}", dir.display()))?;
    tmp.write_all(bytes)
        .with_context(|| format!("failed to write {}", path.display()))?;
    tmp.as_file()
        .sync_all()
        .with_context(|| format!("failed to sync {}", path.display()))?;
    tmp.persist(path)
        .with_context(|| format!("failed to replace {}", path.display()))?;

    debug!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::record::FieldValue;

    fn record(description: &str) -> ExtractedRecord {
        let mut record = ExtractedRecord::new();
        record.insert("description", FieldValue::Scalar(description.to_string()));
        record
    }

    #[test]
    fn test_store_keys_are_normalized() {
        let mut store = Store::new();
        store.put("  Java ", record("a"));
        assert!(store.contains("JAVA"));
        assert_eq!(store.get("java"), Some(&record("a")));

        store.put("java", record("b"));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("Java"), Some(&record("b")));
        assert_eq!(store.iter().next().unwrap().0, "java");
    }

    #[test]
    fn test_domain_bucket_created_on_first_write() {
        let mut store = DomainStore::new();
        assert!(store.get("Artificial Intelligence", "ml").is_none());

        store.put("Artificial Intelligence", "Machine Learning", record("x"));
        store.put("artificial intelligence", "NLP", record("y"));

        assert_eq!(store.len(), 1);
        let (domain, bucket) = store.iter().next().unwrap();
        assert_eq!(domain, "Artificial Intelligence");
        assert_eq!(bucket.len(), 2);
        assert_eq!(
            store.get("ARTIFICIAL INTELLIGENCE", "machine learning"),
            Some(&record("x"))
        );
    }

    #[test]
    fn test_write_atomic_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
        // No stray temp files left behind
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
