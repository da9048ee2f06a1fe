//! Tolerant parsing of free-text model replies.
//!
//! The model is asked to answer in a line-oriented layout (`Field: value`, a `Subsets:`
//! marker, `Category:` headers and `- item` lines). Replies rarely follow it exactly, so
//! nothing here fails: unrecognised lines are dropped and missing fields stay empty.

use tracing::debug;

use super::record::{ExtractedRecord, FieldValue};
use super::schema::{ExtractionSchema, FieldKind};

const ITEM_MARKER: &str = "- ";

/// Where the line-oriented parse currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseState {
    /// Before the subsets marker. Only fixed fields are recognised.
    FixedFields,
    /// Saw the subsets marker, no category open yet.
    AwaitingSubsets,
    /// Items append to this category key.
    InSubset(String),
}

/// A reply line after classification.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Line<'a> {
    /// Index into `schema.fields` and the text after the colon
    Field(usize, &'a str),
    SubsetsMarker,
    /// Normalised category key
    CategoryHeader(String),
    Item(&'a str),
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Action<'a> {
    SetField(usize, &'a str),
    OpenCategory(String),
    AppendItem(String, &'a str),
    Ignore,
}

fn classify<'a>(line: &'a str, schema: &ExtractionSchema) -> Line<'a> {
    for (idx, field) in schema.fields.iter().enumerate() {
        if let Some(rest) = strip_label(line, &field.label) {
            return Line::Field(idx, rest);
        }
    }

    if let Some(subsets) = &schema.subsets {
        if strip_label(line, &subsets.marker).is_some() {
            return Line::SubsetsMarker;
        }
    }

    if let Some(item) = line.strip_prefix(ITEM_MARKER) {
        return Line::Item(item.trim());
    }

    if let Some(header) = line.strip_suffix(':') {
        if !line.starts_with('-') {
            let key = category_key(header);
            if !key.is_empty() {
                return Line::CategoryHeader(key);
            }
        }
    }

    Line::Other
}

/// The explicit transition table.
fn transition<'a>(state: &ParseState, line: Line<'a>) -> (ParseState, Action<'a>) {
    match (state, line) {
        // Fixed fields are honoured wherever they appear
        (_, Line::Field(idx, rest)) => (state.clone(), Action::SetField(idx, rest)),

        (ParseState::FixedFields, Line::SubsetsMarker) => {
            (ParseState::AwaitingSubsets, Action::Ignore)
        }
        (ParseState::AwaitingSubsets | ParseState::InSubset(_), Line::SubsetsMarker) => {
            (state.clone(), Action::Ignore)
        }

        (ParseState::AwaitingSubsets | ParseState::InSubset(_), Line::CategoryHeader(key)) => (
            ParseState::InSubset(key.clone()),
            Action::OpenCategory(key),
        ),

        (ParseState::InSubset(key), Line::Item(text)) => {
            (state.clone(), Action::AppendItem(key.clone(), text))
        }

        (_, Line::CategoryHeader(_) | Line::Item(_) | Line::Other) => {
            (state.clone(), Action::Ignore)
        }
    }
}

/// `"Skill Type: Language"` with label `"Skill Type"` gives `Some("Language")`.
fn strip_label<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    line.strip_prefix(label)
        .and_then(|rest| rest.strip_prefix(':'))
        .map(str::trim)
}

/// `"Build Tools"` -> `"build_tools"`
pub fn category_key(header: &str) -> String {
    header.trim().to_lowercase().replace(' ', "_")
}

/// Trim and drop markdown bold markers models like to add despite instructions.
fn clean_line(line: &str) -> String {
    line.trim().replace("**", "").trim().to_string()
}

fn split_list(rest: &str) -> Vec<String> {
    rest.split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

/// Parse a reply into a record shaped by `schema`. Never fails.
pub fn parse(raw_text: &str, schema: &ExtractionSchema) -> ExtractedRecord {
    let mut record = schema.empty_record();
    let mut state = ParseState::FixedFields;
    let mut ignored = 0usize;

    for raw_line in raw_text.lines() {
        let line = clean_line(raw_line);
        if line.is_empty() {
            continue;
        }

        let (next, action) = transition(&state, classify(&line, schema));
        state = next;

        match action {
            Action::SetField(idx, rest) => {
                let field = &schema.fields[idx];
                let value = match field.kind {
                    FieldKind::Scalar => FieldValue::Scalar(rest.to_string()),
                    FieldKind::List => FieldValue::List(split_list(rest)),
                };
                record.insert(field.key.clone(), value);
            }
            Action::OpenCategory(key) => {
                if let Some(subsets) = record.subsets_mut() {
                    // A repeated header keeps what was already collected
                    subsets.entry(key).or_default();
                }
            }
            Action::AppendItem(key, text) => {
                if text.is_empty() {
                    continue;
                }
                if let Some(subsets) = record.subsets_mut() {
                    subsets.entry(key).or_default().push(text.to_string());
                }
            }
            Action::Ignore => ignored += 1,
        }
    }

    debug!(
        "Parsed {:?} reply: {} fields, {} subset categories, {} lines ignored",
        schema.kind,
        record.len(),
        record.subsets().map(|s| s.len()).unwrap_or(0),
        ignored
    );

    record
}

/// Collect `- item` lines, de-duplicated case-insensitively in first-seen order.
pub fn parse_bullets(raw_text: &str) -> Vec<String> {
    let mut items: Vec<String> = Vec::new();
    for raw_line in raw_text.lines() {
        let line = clean_line(raw_line);
        if let Some(item) = line.strip_prefix(ITEM_MARKER) {
            let item = item.trim();
            if item.is_empty() {
                continue;
            }
            let needle = item.to_lowercase();
            if !items.iter().any(|i| i.to_lowercase() == needle) {
                items.push(item.to_string());
            }
        }
    }
    items
}

/// How a free-text query was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryCategory {
    /// About one specific skill, language or framework
    Skill,
    /// About the skills a profession, role or industry needs
    Domain,
    Unknown,
}

/// Map a classification reply onto a category. Anything unrecognised is `Unknown`.
pub fn parse_category(raw_text: &str) -> QueryCategory {
    let cleaned: String = raw_text
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_whitespace())
        .collect();
    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");

    match cleaned.as_str() {
        "specific skill" | "related skills" => QueryCategory::Skill,
        "domain skills" => QueryCategory::Domain,
        _ => QueryCategory::Unknown,
    }
}

/// The outermost `{ ... }` span of a reply, tolerating commentary around it.
pub fn extract_json_block(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end > start {
        Some(&text[start..=end])
    } else {
        None
    }
}

/// Pull one string field out of a JSON reply. `None` if anything about it is off.
pub fn parse_json_field(raw_text: &str, key: &str) -> Option<String> {
    let block = extract_json_block(raw_text)?;
    let value: serde_json::Value = serde_json::from_str(block).ok()?;
    value
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
