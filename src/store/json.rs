use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::write_atomic;

/// A store persisted as one pretty-printed JSON object.
#[derive(Debug, Clone)]
pub struct JsonFile {
    path: PathBuf,
}

impl JsonFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the store. A missing or blank file is an empty store.
    pub fn load<T>(&self) -> Result<T>
    where
        T: DeserializeOwned + Default,
    {
        if !self.path.exists() {
            info!(
                "No existing data at {}, starting empty",
                self.path.display()
            );
            return Ok(T::default());
        }

        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        if content.trim().is_empty() {
            return Ok(T::default());
        }

        let store = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse {}", self.path.display()))?;
        debug!("Loaded {}", self.path.display());
        Ok(store)
    }

    /// Overwrite the file with `store`, four-space indented with a trailing newline.
    pub fn save<T: Serialize>(&self, store: &T) -> Result<()> {
        let bytes = to_pretty_json(store)?;
        write_atomic(&self.path, &bytes)?;
        info!("Saved {}", self.path.display());
        Ok(())
    }
}

pub fn to_pretty_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut bytes, formatter);
    value
        .serialize(&mut serializer)
        .context("failed to serialize store")?;
    bytes.push(b'\n');
    Ok(bytes)
}
