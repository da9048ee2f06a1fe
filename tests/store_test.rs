//! Store persistence: load/save round trips must not drift.

use anyhow::Result;
use skillminer::pipeline::record::FieldValue;
use skillminer::pipeline::{ExtractedRecord, ExtractionSchema};
use skillminer::store::{CsvFile, DomainStore, JsonFile, Store};
use std::fs;

fn skill(name: &str, aliases: &[&str], frameworks: &[&str]) -> ExtractedRecord {
    let mut record = ExtractionSchema::skill().empty_record();
    record.insert(
        "description",
        FieldValue::Scalar(format!("{}, with a comma and \"quotes\"", name)),
    );
    record.insert(
        "aliases",
        FieldValue::List(aliases.iter().map(|s| s.to_string()).collect()),
    );
    if let Some(subsets) = record.subsets_mut() {
        subsets.insert(
            "frameworks".to_string(),
            frameworks.iter().map(|s| s.to_string()).collect(),
        );
    }
    record.set_name(name);
    record
}

#[test]
fn test_json_store_save_load_is_byte_stable() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let file = JsonFile::new(dir.path().join("subdomains.json"));

    let mut store = DomainStore::new();
    store.put("Web Development", "Frontend", skill("Frontend", &["ui"], &["React"]));
    store.put("Artificial Intelligence", "NLP", skill("NLP", &[], &["spaCy"]));
    store.put("artificial intelligence", "ML", skill("ML", &["ml"], &[]));
    file.save(&store)?;
    let first = fs::read(file.path())?;

    let loaded: DomainStore = file.load()?;
    assert_eq!(loaded, store);
    file.save(&loaded)?;
    assert_eq!(fs::read(file.path())?, first);

    // Domains are sorted, spelling of the first write is kept
    let text = String::from_utf8(first)?;
    let ai = text.find("\"Artificial Intelligence\"").unwrap();
    let web = text.find("\"Web Development\"").unwrap();
    assert!(ai < web);
    assert!(!text.contains("\"artificial intelligence\""));
    Ok(())
}

#[test]
fn test_csv_store_save_load_is_byte_stable() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let file = CsvFile::new(dir.path().join("skills.csv"), ExtractionSchema::skill());

    let mut store = Store::new();
    store.put("Rust", skill("Rust", &["rust-lang"], &["Tokio", "Axum"]));
    store.put("Java", skill("Java", &["java", "Java SE"], &["Spring"]));
    file.save(&store)?;
    let first = fs::read(file.path())?;

    let loaded = file.load()?;
    assert_eq!(loaded.len(), 2);
    file.save(&loaded)?;
    assert_eq!(fs::read(file.path())?, first);

    let java = loaded.get("JAVA").unwrap();
    assert_eq!(java.name(), Some("Java"));
    assert_eq!(
        java.scalar("description"),
        Some("Java, with a comma and \"quotes\"")
    );
    assert_eq!(java.subsets().unwrap()["frameworks"], vec!["Spring"]);

    // Rows in key order under the schema header
    let text = String::from_utf8(first)?;
    let mut lines = text.lines();
    assert_eq!(
        lines.next(),
        Some("Skill Name,Skill Description,Aliases,Skill Type,Skill Usages,Subsets")
    );
    assert!(lines.next().unwrap().starts_with("Java,"));
    assert!(lines.next().unwrap().starts_with("Rust,"));
    Ok(())
}

#[test]
fn test_saving_into_missing_directory_fails_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let file = JsonFile::new(dir.path().join("missing").join("store.json"));
    assert!(file.save(&Store::new()).is_err());
    assert!(!file.path().exists());
}
