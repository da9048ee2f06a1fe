use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Answers every prompt family with a canned, well-formed reply. Backs `--dry-run`.
pub struct MockLlmClient;

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self
    }
}

/// Text between `Existing Entry:` and `New Data:` in a merge prompt.
fn existing_entry(prompt: &str) -> Option<&str> {
    let rest = prompt.split("Existing Entry:").nth(1)?;
    rest.split("New Data:").next().map(str::trim)
}

/// The quoted name on the `<label>: "..."` line.
fn quoted_value<'a>(prompt: &'a str, label: &str) -> Option<&'a str> {
    prompt.lines().find_map(|line| {
        line.trim()
            .strip_prefix(label)
            .and_then(|rest| rest.trim().strip_prefix('"'))
            .and_then(|rest| rest.strip_suffix('"'))
    })
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        if prompt.contains("Classify the intent of the following query") {
            Ok("specific skill".to_string())
        } else if prompt.contains("by merging these two entries") {
            // Keep whatever is already stored
            Ok(existing_entry(prompt).unwrap_or("{}").to_string())
        } else if prompt.contains("most appropriate main IT domain") {
            Ok(r#"{"domain": "General IT"}"#.to_string())
        } else if prompt.contains("most generalized name") {
            let name = quoted_value(prompt, "Subdomain:").unwrap_or("General IT");
            Ok(serde_json::json!({ "subdomain": name }).to_string())
        } else if prompt.contains("Identify and list all major subfields") {
            Ok("- Machine Learning\n- Data Engineering\n- Computer Vision".to_string())
        } else if prompt.contains("Extract essential skills for a career") {
            Ok("Required Skills:\n- Python\n- SQL\n- Communication".to_string())
        } else if prompt.contains("Technical Skills:") {
            Ok(r#"Technical Skills: Python, SQL, Spark
Soft Skills: Communication, Teamwork
Industry-Specific Skills: Data Governance
Certifications: AWS Certified Data Analytics"#
                .to_string())
        } else if prompt.contains("Subdomain Description:") {
            Ok(r#"Subdomain Description: Building systems that learn from data.
Related Roles: ML Engineer, Data Scientist
Key Technologies: Python, TensorFlow, PyTorch
Required Skills: Statistics, Linear Algebra, Programming

Subsets:
Popular Frameworks:
- TensorFlow
- PyTorch
Common Tools:
- Jupyter Notebook"#
                .to_string())
        } else if prompt.contains("Skill Description:") {
            Ok(r#"Skill Description: A general-purpose programming language.
Aliases: java, Java SE
Skill Type: Programming Language
Skill Usages: Backend Development, Android App Development

Subsets:
Frameworks:
- Spring
- Hibernate
Build Tools:
- Maven
- Gradle"#
                .to_string())
        } else {
            Ok(r#"{"status": "mock"}"#.to_string())
        }
    }
}

/// Returns queued replies in order and records every prompt it was sent.
#[derive(Default)]
pub struct ScriptedLlmClient {
    replies: Mutex<VecDeque<Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlmClient {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Queue a reply after the ones already queued.
    pub fn push_reply(&self, reply: impl Into<String>) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(Ok(reply.into()));
        }
    }

    /// Queue a failed call, as if the endpoint returned an error.
    pub fn push_failure(&self, message: impl Into<String>) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(Err(message.into()));
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts
            .lock()
            .map_err(|_| anyhow!("prompt log poisoned"))?
            .push(prompt.to_string());

        let next = self
            .replies
            .lock()
            .map_err(|_| anyhow!("reply queue poisoned"))?
            .pop_front();

        match next {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => bail!("{}", message),
            None => bail!("ScriptedLlmClient has no reply left for prompt"),
        }
    }
}
