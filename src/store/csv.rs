use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::{write_atomic, Store};
use crate::pipeline::record::{ExtractedRecord, FieldValue, SUBSETS_KEY};
use crate::pipeline::schema::{ExtractionSchema, FieldKind};

const SUBSETS_COLUMN: &str = "Subsets";

/// A flat store persisted as CSV, one row per record.
///
/// Columns come from the schema: the name column, one per fixed field, then `Subsets`.
/// List and subset cells hold JSON strings.
#[derive(Debug, Clone)]
pub struct CsvFile {
    path: PathBuf,
    schema: ExtractionSchema,
}

impl CsvFile {
    pub fn new(path: impl Into<PathBuf>, schema: ExtractionSchema) -> Self {
        Self {
            path: path.into(),
            schema,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn headers(&self) -> Vec<String> {
        let mut headers = vec![self.schema.name_label.clone()];
        headers.extend(self.schema.fields.iter().map(|f| f.label.clone()));
        if self.schema.subsets.is_some() {
            headers.push(SUBSETS_COLUMN.to_string());
        }
        headers
    }

    /// Load the store. A missing file is an empty store.
    pub fn load(&self) -> Result<Store> {
        let mut store = Store::new();
        if !self.path.exists() {
            info!(
                "No existing data at {}, starting empty",
                self.path.display()
            );
            return Ok(store);
        }

        let mut reader = ::csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))?;

        let columns: HashMap<String, usize> = reader
            .headers()
            .with_context(|| format!("failed to read header of {}", self.path.display()))?
            .iter()
            .enumerate()
            .map(|(i, h)| (h.trim().to_string(), i))
            .collect();

        let name_col = *columns.get(&self.schema.name_label).with_context(|| {
            format!(
                "{} has no '{}' column",
                self.path.display(),
                self.schema.name_label
            )
        })?;

        for (line, row) in reader.records().enumerate() {
            let row = row.with_context(|| {
                format!("failed to read row {} of {}", line + 2, self.path.display())
            })?;
            let name = row.get(name_col).unwrap_or("").trim();
            if name.is_empty() {
                warn!("Skipping row {} without a name", line + 2);
                continue;
            }

            let record = self.row_to_record(name, &columns, &row);
            store.put(name, record);
        }

        debug!("Loaded {} rows from {}", store.len(), self.path.display());
        Ok(store)
    }

    fn row_to_record(
        &self,
        name: &str,
        columns: &HashMap<String, usize>,
        row: &::csv::StringRecord,
    ) -> ExtractedRecord {
        let cell = |label: &str| {
            columns
                .get(label)
                .and_then(|&i| row.get(i))
                .unwrap_or("")
                .trim()
        };

        let mut record = self.schema.empty_record();
        record.set_name(name.to_string());

        for field in &self.schema.fields {
            let raw = cell(&field.label);
            let value = match field.kind {
                FieldKind::Scalar => FieldValue::Scalar(raw.to_string()),
                FieldKind::List => FieldValue::List(decode_list(raw)),
            };
            record.insert(field.key.clone(), value);
        }

        if self.schema.subsets.is_some() {
            let raw = cell(SUBSETS_COLUMN);
            if !raw.is_empty() {
                match serde_json::from_str(raw) {
                    Ok(map) => record.insert(SUBSETS_KEY, FieldValue::Map(map)),
                    Err(e) => warn!("Unreadable subsets for {}: {}", name, e),
                }
            }
        }

        record
    }

    fn record_to_row(&self, key: &str, record: &ExtractedRecord) -> Vec<String> {
        let mut row = vec![record
            .name()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(key)
            .to_string()];

        for field in &self.schema.fields {
            row.push(encode_cell(record.get(&field.key), field.kind));
        }
        if self.schema.subsets.is_some() {
            let subsets = record
                .get(SUBSETS_KEY)
                .cloned()
                .unwrap_or_else(|| FieldValue::Map(Default::default()));
            row.push(serde_json::to_string(&subsets).unwrap_or_else(|_| "{}".to_string()));
        }
        row
    }

    /// Overwrite the file with every record in key order.
    pub fn save(&self, store: &Store) -> Result<()> {
        let mut writer = ::csv::Writer::from_writer(Vec::new());
        writer
            .write_record(self.headers())
            .context("failed to write CSV header")?;
        for (key, record) in store.iter() {
            writer
                .write_record(self.record_to_row(key, record))
                .with_context(|| format!("failed to write CSV row for {}", key))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("failed to flush CSV: {}", e))?;

        write_atomic(&self.path, &bytes)?;
        info!("Saved {} rows to {}", store.len(), self.path.display());
        Ok(())
    }
}

/// A JSON array cell, or a plain comma-separated one from hand-edited files.
fn decode_list(raw: &str) -> Vec<String> {
    if raw.is_empty() {
        return Vec::new();
    }
    serde_json::from_str::<Vec<String>>(raw).unwrap_or_else(|_| {
        raw.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
}

fn encode_cell(value: Option<&FieldValue>, kind: FieldKind) -> String {
    match (value, kind) {
        (Some(FieldValue::Scalar(s)), _) => s.clone(),
        (Some(other), _) => serde_json::to_string(other).unwrap_or_default(),
        (None, FieldKind::Scalar) => String::new(),
        (None, FieldKind::List) => "[]".to_string(),
    }
}
