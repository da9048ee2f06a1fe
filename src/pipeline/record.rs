//! Extracted records: an ordered map of field name to a scalar, a list, or a map of
//! open-ended subset categories.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::util::normalize_key;

pub const NAME_KEY: &str = "name";
pub const SUBSETS_KEY: &str = "subsets";

/// What kind of thing a target names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Skill,
    Domain,
    Subdomain,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetKind::Skill => write!(f, "skill"),
            TargetKind::Domain => write!(f, "domain"),
            TargetKind::Subdomain => write!(f, "subdomain"),
        }
    }
}

/// A skill, domain or subdomain name plus the category an upstream classification gave it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionTarget {
    pub name: String,
    pub kind: TargetKind,
}

impl ExtractionTarget {
    pub fn new(name: impl Into<String>, kind: TargetKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// The store key: trimmed and lower-cased name.
    pub fn key(&self) -> String {
        normalize_key(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Scalar(String),
    List(Vec<String>),
    Map(IndexMap<String, Vec<String>>),
}

impl FieldValue {
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Scalar(s) => s.trim().is_empty(),
            FieldValue::List(items) => items.is_empty(),
            FieldValue::Map(map) => map.is_empty(),
        }
    }

    /// Fold `other` into `self` without losing anything either side holds.
    ///
    /// Scalars keep the first non-empty value, lists append items not already present
    /// (case-insensitive), maps union per category. Mismatched kinds keep `self`.
    pub fn absorb(&mut self, other: &FieldValue) {
        match (self, other) {
            (FieldValue::Scalar(mine), FieldValue::Scalar(theirs)) => {
                if mine.trim().is_empty() && !theirs.trim().is_empty() {
                    *mine = theirs.clone();
                }
            }
            (FieldValue::List(mine), FieldValue::List(theirs)) => union_items(mine, theirs),
            (FieldValue::Map(mine), FieldValue::Map(theirs)) => {
                for (category, items) in theirs {
                    match mine.get_mut(category) {
                        Some(existing) => union_items(existing, items),
                        None => {
                            mine.insert(category.clone(), dedup_items(items));
                        }
                    }
                }
            }
            (mine, theirs) => {
                if mine.is_empty() && !theirs.is_empty() {
                    *mine = theirs.clone();
                }
            }
        }
    }
}

/// Append items from `extra` that `items` does not already hold (case-insensitive).
pub fn union_items(items: &mut Vec<String>, extra: &[String]) {
    for item in extra {
        let needle = item.trim().to_lowercase();
        if needle.is_empty() {
            continue;
        }
        if !items.iter().any(|i| i.trim().to_lowercase() == needle) {
            items.push(item.trim().to_string());
        }
    }
}

fn dedup_items(items: &[String]) -> Vec<String> {
    let mut out = Vec::with_capacity(items.len());
    union_items(&mut out, items);
    out
}

/// Structured result of one extraction. Field order is insertion order and survives
/// serialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtractedRecord {
    fields: IndexMap<String, FieldValue>,
}

impl ExtractedRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: FieldValue) {
        self.fields.insert(key.into(), value);
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// True when at least one field carries a value.
    pub fn has_content(&self) -> bool {
        self.fields
            .iter()
            .any(|(k, v)| k != NAME_KEY && !v.is_empty())
    }

    pub fn scalar(&self, key: &str) -> Option<&str> {
        match self.fields.get(key) {
            Some(FieldValue::Scalar(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn list(&self, key: &str) -> &[String] {
        match self.fields.get(key) {
            Some(FieldValue::List(items)) => items,
            _ => &[],
        }
    }

    pub fn subsets(&self) -> Option<&IndexMap<String, Vec<String>>> {
        match self.fields.get(SUBSETS_KEY) {
            Some(FieldValue::Map(map)) => Some(map),
            _ => None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.scalar(NAME_KEY)
    }

    /// Set the `name` field, keeping it first in field order.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.fields
            .shift_insert(0, NAME_KEY.to_string(), FieldValue::Scalar(name.into()));
    }

    /// Mutable list for `key`, created empty if missing. `None` if the field holds
    /// another kind of value.
    pub fn list_mut(&mut self, key: &str) -> Option<&mut Vec<String>> {
        let entry = self
            .fields
            .entry(key.to_string())
            .or_insert_with(|| FieldValue::List(Vec::new()));
        match entry {
            FieldValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Mutable subset category map, created empty if missing.
    pub fn subsets_mut(&mut self) -> Option<&mut IndexMap<String, Vec<String>>> {
        let entry = self
            .fields
            .entry(SUBSETS_KEY.to_string())
            .or_insert_with(|| FieldValue::Map(IndexMap::new()));
        match entry {
            FieldValue::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Union `other` into `self`. Keys only in `other` are appended in `other`'s order.
    pub fn absorb(&mut self, other: &ExtractedRecord) {
        for (key, value) in &other.fields {
            match self.fields.get_mut(key) {
                Some(mine) => mine.absorb(value),
                None => {
                    self.fields.insert(key.clone(), value.clone());
                }
            }
        }
    }

    /// Same keys, regardless of values or order.
    pub fn same_field_set(&self, other: &ExtractedRecord) -> bool {
        self.len() == other.len() && self.keys().all(|k| other.contains_key(k))
    }
}

impl FromIterator<(String, FieldValue)> for ExtractedRecord {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}
