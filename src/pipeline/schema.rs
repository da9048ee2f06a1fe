//! Extraction schemas: the fixed fields a reply is expected to carry and, optionally, the
//! open-ended subsets block that follows them.

use indexmap::IndexMap;

use super::record::{ExtractedRecord, FieldValue, TargetKind, SUBSETS_KEY};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Scalar,
    /// Comma-separated on a single line
    List,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    /// Line prefix the model is asked to emit, without the colon ("Skill Description")
    pub label: String,
    /// Record key the value lands under ("description")
    pub key: String,
    pub kind: FieldKind,
    /// Placeholder text shown to the model
    pub hint: String,
}

impl FieldSpec {
    pub fn scalar(label: &str, key: &str, hint: &str) -> Self {
        Self {
            label: label.to_string(),
            key: key.to_string(),
            kind: FieldKind::Scalar,
            hint: hint.to_string(),
        }
    }

    pub fn list(label: &str, key: &str, hint: &str) -> Self {
        Self {
            label: label.to_string(),
            key: key.to_string(),
            kind: FieldKind::List,
            hint: hint.to_string(),
        }
    }

    pub fn default_value(&self) -> FieldValue {
        match self.kind {
            FieldKind::Scalar => FieldValue::Scalar(String::new()),
            FieldKind::List => FieldValue::List(Vec::new()),
        }
    }
}

/// The trailing block of model-discovered categories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubsetSpec {
    /// Marker line opening the block, without the colon ("Subsets")
    pub marker: String,
    /// Example categories shown in the prompt to anchor the layout
    pub examples: Vec<(String, Vec<String>)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionSchema {
    pub kind: TargetKind,
    /// Column header for the target name in tabular output ("Skill Name")
    pub name_label: String,
    pub fields: Vec<FieldSpec>,
    pub subsets: Option<SubsetSpec>,
}

impl ExtractionSchema {
    /// Skill details: description, aliases, type, usages, then subsets.
    pub fn skill() -> Self {
        Self {
            kind: TargetKind::Skill,
            name_label: "Skill Name".to_string(),
            fields: vec![
                FieldSpec::scalar(
                    "Skill Description",
                    "description",
                    "brief description of the skill",
                ),
                FieldSpec::list("Aliases", "aliases", "comma-separated alternative names"),
                FieldSpec::scalar(
                    "Skill Type",
                    "type",
                    "category like Programming Language, Farming Technique, etc.",
                ),
                FieldSpec::list("Skill Usages", "usages", "comma-separated key applications"),
            ],
            subsets: Some(SubsetSpec {
                marker: "Subsets".to_string(),
                examples: vec![
                    example("Frameworks", &["Spring", "Hibernate"]),
                    example("Libraries", &["Apache Commons", "Guava"]),
                    example("Build Tools", &["Maven", "Gradle"]),
                ],
            }),
        }
    }

    /// IT subdomain overview: description, roles, technologies, skills, then subsets.
    pub fn subdomain() -> Self {
        Self {
            kind: TargetKind::Subdomain,
            name_label: "Subdomain Name".to_string(),
            fields: vec![
                FieldSpec::scalar("Subdomain Description", "description", "brief overview"),
                FieldSpec::list(
                    "Related Roles",
                    "related_roles",
                    "comma-separated job roles related to this subdomain",
                ),
                FieldSpec::list(
                    "Key Technologies",
                    "key_technologies",
                    "comma-separated major technologies/tools used",
                ),
                FieldSpec::list(
                    "Required Skills",
                    "required_skills",
                    "comma-separated essential skills a person needs",
                ),
            ],
            subsets: Some(SubsetSpec {
                marker: "Subsets".to_string(),
                examples: vec![
                    example("Popular Frameworks", &["TensorFlow", "PyTorch"]),
                    example("Common Tools", &["Jupyter Notebook", "VS Code"]),
                ],
            }),
        }
    }

    /// Skill breakdown for working in an IT subdomain. No subsets block.
    pub fn subdomain_skills() -> Self {
        Self {
            kind: TargetKind::Subdomain,
            name_label: "Subdomain Name".to_string(),
            fields: vec![
                FieldSpec::list(
                    "Technical Skills",
                    "technical_skills",
                    "comma-separated list of programming languages, tools, frameworks",
                ),
                FieldSpec::list(
                    "Soft Skills",
                    "soft_skills",
                    "comma-separated list of communication, teamwork, problem-solving skills",
                ),
                FieldSpec::list(
                    "Industry-Specific Skills",
                    "industry_specific_skills",
                    "comma-separated list of domain-specific expertise, regulations",
                ),
                FieldSpec::list(
                    "Certifications",
                    "certifications",
                    "comma-separated list of relevant certifications or degrees",
                ),
            ],
            subsets: None,
        }
    }

    /// Look a schema up by name, as used on the command line and in config.
    pub fn by_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "skill" => Some(Self::skill()),
            "subdomain" => Some(Self::subdomain()),
            "subdomain-skills" | "subdomain_skills" => Some(Self::subdomain_skills()),
            _ => None,
        }
    }

    pub fn field_by_key(&self, key: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.key == key)
    }

    /// A record holding every schema field at its empty default.
    pub fn empty_record(&self) -> ExtractedRecord {
        let mut record = ExtractedRecord::new();
        for field in &self.fields {
            record.insert(field.key.clone(), field.default_value());
        }
        if self.subsets.is_some() {
            record.insert(SUBSETS_KEY, FieldValue::Map(IndexMap::new()));
        }
        record
    }
}

fn example(category: &str, items: &[&str]) -> (String, Vec<String>) {
    (
        category.to_string(),
        items.iter().map(|s| s.to_string()).collect(),
    )
}
