use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One retrieved mail item: the provider's opaque id plus the text used for classification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailItem {
    pub id: String,
    pub snippet: String,
}

impl MailItem {
    pub fn new(id: impl Into<String>, snippet: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            snippet: snippet.into(),
        }
    }
}

/// The closed set of classification categories.
///
/// The serialized name doubles as the JSON key expected from the model and as
/// the mail label name applied to classified items.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    #[serde(rename = "Time Sensitive")]
    TimeSensitive,
    #[serde(rename = "For Review")]
    ForReview,
    #[serde(rename = "Junk")]
    Junk,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::TimeSensitive, Category::ForReview, Category::Junk];

    /// Key used in the model's JSON response
    pub fn key(&self) -> &'static str {
        match self {
            Category::TimeSensitive => "Time Sensitive",
            Category::ForReview => "For Review",
            Category::Junk => "Junk",
        }
    }

    /// Label name in the mail store
    pub fn label_name(&self) -> &'static str {
        self.key()
    }

    /// One-line description rendered into the prompt preamble
    pub fn description(&self) -> &'static str {
        match self {
            Category::TimeSensitive => "urgent or deadline-based messages",
            Category::ForReview => "messages that require attention but are not urgent",
            Category::Junk => "promotions, spam, or irrelevant content",
        }
    }

    /// Strict lookup by JSON key
    pub fn from_key(key: &str) -> Option<Category> {
        Category::ALL.into_iter().find(|c| c.key() == key)
    }

    pub fn label_names() -> Vec<String> {
        Category::ALL.iter().map(|c| c.label_name().to_string()).collect()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Category -> positional references ("Email <N>") as returned by the model.
///
/// Every category is always present; construct through [`ClassificationResult::empty`]
/// or the strict parser in [`crate::classifier`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassificationResult {
    references: BTreeMap<Category, Vec<String>>,
}

impl ClassificationResult {
    pub fn empty() -> Self {
        Self {
            references: Category::ALL.iter().map(|c| (*c, Vec::new())).collect(),
        }
    }

    /// Build from per-category references; categories not given stay empty
    pub fn from_references<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (Category, Vec<String>)>,
    {
        let mut result = Self::empty();
        for (category, refs) in entries {
            result.references.insert(category, refs);
        }
        result
    }

    pub fn references(&self, category: Category) -> &[String] {
        self.references
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Category, &[String])> {
        self.references.iter().map(|(c, refs)| (*c, refs.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.references.values().all(Vec::is_empty)
    }

    pub fn total_references(&self) -> usize {
        self.references.values().map(Vec::len).sum()
    }
}

impl Default for ClassificationResult {
    fn default() -> Self {
        Self::empty()
    }
}

/// Outcome of one pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct MutationReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub items_fetched: usize,
    /// A search call failed mid-way; only the items before it were classified
    pub fetch_truncated: bool,
    /// The model's category -> reference mapping as parsed
    pub categorized: ClassificationResult,
    /// Category -> item ids after resolving references
    pub resolved: BTreeMap<Category, Vec<String>>,
    pub applied_count: usize,
    pub failed_count: usize,
    /// Model references that pointed outside the fetched range or did not parse
    pub dropped_references: usize,
    pub labels_created: usize,
    /// Category labels could not be prepared; every planned mutation is in `failed_count`
    pub label_setup_failed: bool,
    pub classification_attempts: u32,
    /// True when classification fell back to the empty result
    pub degraded: bool,
    pub dry_run: bool,
}

impl MutationReport {
    pub fn duration_seconds(&self) -> i64 {
        (self.completed_at - self.started_at).num_seconds()
    }

    pub fn planned_mutations(&self) -> usize {
        self.resolved.values().map(Vec::len).sum()
    }

    /// Generate Markdown report
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        if self.dry_run {
            md.push_str("# Inbox Triage Report (DRY RUN)\n\n");
            md.push_str("> **DRY RUN MODE** - No labels were created or applied.\n\n");
        } else {
            md.push_str("# Inbox Triage Report\n\n");
        }
        md.push_str(&format!(
            "Generated: {}\n\n",
            self.completed_at.format("%Y-%m-%d %H:%M:%S")
        ));

        md.push_str("## Summary\n\n");
        md.push_str(&format!("- **Run ID:** {}\n", self.run_id));
        md.push_str(&format!(
            "- **Emails fetched:** {}{}\n",
            self.items_fetched,
            if self.fetch_truncated { " (search stopped early)" } else { "" }
        ));
        md.push_str(&format!(
            "- **Classification attempts:** {}{}\n",
            self.classification_attempts,
            if self.degraded { " (gave up, nothing classified)" } else { "" }
        ));
        md.push_str(&format!(
            "- **Dropped references:** {}\n",
            self.dropped_references
        ));
        md.push_str(&format!("- **Duration:** {} seconds\n\n", self.duration_seconds()));

        md.push_str("## Categories\n\n");
        md.push_str("| Category | References | Emails |\n");
        md.push_str("|----------|------------|--------|\n");
        for (category, refs) in self.categorized.iter() {
            let resolved = self.resolved.get(&category).map(Vec::len).unwrap_or(0);
            md.push_str(&format!("| {} | {} | {} |\n", category, refs.len(), resolved));
        }
        md.push('\n');

        md.push_str("## Actions\n\n");
        if self.dry_run {
            md.push_str(&format!(
                "- **Mutations that would be issued:** {}\n",
                self.planned_mutations()
            ));
        } else {
            md.push_str(&format!("- **Labels created:** {}\n", self.labels_created));
            md.push_str(&format!("- **Mutations applied:** {}\n", self.applied_count));
            md.push_str(&format!("- **Mutations failed:** {}\n", self.failed_count));
            if self.label_setup_failed {
                md.push_str("- **Label setup failed:** no item was moved\n");
            }
        }

        md
    }
}
