//! Prompt templates. Every builder is a pure function of its inputs.
//!
//! Extraction prompts describe the exact line layout that `pipeline::parser` reads back,
//! so the two must change together.

use crate::pipeline::merge::MergePolicy;
use crate::pipeline::record::{ExtractedRecord, ExtractionTarget, TargetKind};
use crate::pipeline::schema::ExtractionSchema;

/// Web search query used to find sources for a target.
pub fn search_query(target: &ExtractionTarget) -> String {
    match target.kind {
        TargetKind::Skill => format!("{} skill details", target.name),
        TargetKind::Subdomain => format!("{} in IT industry", target.name),
        TargetKind::Domain => format!("essential skills for {}", target.name),
    }
}

pub fn domain_skills_query(domain: &str) -> String {
    format!("essential skills for {}", domain)
}

pub fn subfields_query(domain: &str) -> String {
    format!("subfields of {} in IT", domain)
}

fn subject(target: &ExtractionTarget) -> String {
    match target.kind {
        TargetKind::Skill => format!("'{}'", target.name),
        TargetKind::Subdomain => format!("the '{}' subdomain in IT", target.name),
        TargetKind::Domain => format!("the '{}' domain", target.name),
    }
}

/// The field and subset layout the parser expects, one line per field.
fn layout(schema: &ExtractionSchema) -> String {
    let mut out = String::new();
    for field in &schema.fields {
        out.push_str(&format!("{}: <{}>\n", field.label, field.hint));
    }

    if let Some(subsets) = &schema.subsets {
        out.push('\n');
        out.push_str(&format!("{}:\n", subsets.marker));
        out.push_str(
            "For dynamic subsets, first output a category name followed by a colon,\n\
             then on subsequent lines list related items, each prefixed with \"- \".\n",
        );
        if !subsets.examples.is_empty() {
            out.push_str("\nExample:\n");
            for (category, items) in &subsets.examples {
                out.push_str(&format!("{}:\n", category));
                for item in items {
                    out.push_str(&format!("- {}\n", item));
                }
            }
        }
    }
    out
}

fn render(target: &ExtractionTarget, schema: &ExtractionSchema, source: Option<&str>) -> String {
    let from = source
        .map(|url| format!(" from this webpage: {}", url))
        .unwrap_or_default();

    format!(
        r#"Extract structured information about {}{}.
Provide the following details in the same format. Do not add stars, numbering or any other symbols at the beginning or end of a line, and do not add an introduction.

{}"#,
        subject(target),
        from,
        layout(schema)
    )
}

/// Single-call extraction prompt for `target`.
pub fn build_prompt(target: &ExtractionTarget, schema: &ExtractionSchema) -> String {
    render(target, schema, None)
}

/// Extraction prompt grounded on one fetched source.
pub fn build_source_prompt(
    target: &ExtractionTarget,
    schema: &ExtractionSchema,
    url: &str,
) -> String {
    render(target, schema, Some(url))
}

pub fn classify_query_prompt(query: &str) -> String {
    format!(
        r#"Classify the intent of the following query strictly. If the query is about a specific skill (whether IT or non-IT), classify it as 'specific skill'. If the query is about the essential skills required for a profession, job role, or industry, classify it as 'domain skills'.

If the query does not fit either category, respond with 'unknown'. Do not provide any explanations, just return one of these exact values:
- specific skill
- domain skills
- unknown

Query: "{}"
"#,
        query
    )
}

pub fn domain_skills_prompt(domain: &str, url: &str) -> String {
    format!(
        r#"Extract essential skills for a career in '{}' from this webpage: {}

Provide a concise bullet list of key skills with no redundant or extraneous information.
Only include the most important keywords that are directly relevant.

Format:
Required Skills:
- Skill1
- Skill2
- Skill3
"#,
        domain, url
    )
}

pub fn subfields_prompt(domain: &str, url: &str) -> String {
    format!(
        r#"Identify and list all major subfields within the '{}' domain in IT based on this webpage: {}.

Provide a concise list in the format below, with no extra information, no stars and nothing redundant.

Format:
- Subfield1
- Subfield2
- Subfield3
"#,
        domain, url
    )
}

/// Ask the model to reconcile two records of the same entity into one JSON object.
pub fn merge_prompt(
    existing: &ExtractedRecord,
    incoming: &ExtractedRecord,
    policy: &MergePolicy,
) -> String {
    let existing_json = serde_json::to_string_pretty(existing).unwrap_or_else(|_| "{}".into());
    let incoming_json = serde_json::to_string_pretty(incoming).unwrap_or_else(|_| "{}".into());
    let rules: String = policy
        .rules
        .iter()
        .map(|rule| format!("- {}\n", rule))
        .collect();

    format!(
        r#"Optimize the {} dataset by merging these two entries while ensuring no redundant or repetitive information.

Existing Entry:
{}

New Data:
{}

Ensure:
{}
Use exactly the same keys as the entries above. Respond with only the final optimized JSON object.
"#,
        policy.subject, existing_json, incoming_json, rules
    )
}

pub fn infer_domain_prompt(name: &str) -> String {
    format!(
        r#"The user has provided a subdomain: "{}".

Determine the most appropriate main IT domain under which this subdomain should fall.

Ensure:
- The domain is well-recognized in the tech industry.
- Only return a single domain name.
- The output must be a JSON object with the format: {{"domain": "correct_domain_name"}}.

Example output:
{{"domain": "Artificial Intelligence"}}
"#,
        name
    )
}

pub fn normalize_name_prompt(name: &str) -> String {
    format!(
        r#"Given an IT subdomain, or a similar name used for it, identify the most generalized name of the input.

Subdomain: "{}"

Instructions:
- Return a JSON object whose "subdomain" value is the most generalized name of the input.
- Do not return any code.
- Example: if the input is ml then the output has to be:
{{"subdomain": "Machine Learning"}}
"#,
        name
    )
}
