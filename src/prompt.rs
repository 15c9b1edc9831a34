//! Classification prompt rendering

use crate::config::TaxonomyConfig;
use crate::models::Category;

/// Renders the classification prompt for an ordered list of snippets.
///
/// Output depends only on the inputs, so identical items and policy always
/// produce a byte-identical prompt.
pub struct PromptBuilder<'a> {
    taxonomy: &'a TaxonomyConfig,
}

impl<'a> PromptBuilder<'a> {
    pub fn new(taxonomy: &'a TaxonomyConfig) -> Self {
        Self { taxonomy }
    }

    pub fn render<S: AsRef<str>>(&self, items: &[S]) -> String {
        build(items, &self.taxonomy.policy)
    }
}

/// Build the prompt from snippets (numbered from 1) and a policy block
pub fn build<S: AsRef<str>>(items: &[S], policy: &str) -> String {
    let mut prompt =
        String::from("You are an AI assistant that categorizes emails into the following folders:\n");
    for category in Category::ALL {
        prompt.push_str(&format!("- '{}' for {}.\n", category.key(), category.description()));
    }

    let policy = policy.trim();
    if !policy.is_empty() {
        prompt.push_str("\nThe user has additional rules or preferences:\n");
        prompt.push_str(policy);
        prompt.push('\n');
    }

    prompt.push_str("\nCategorize the following emails:\n");
    for (i, item) in items.iter().enumerate() {
        // Keep one email per line so positions stay unambiguous
        let content = item.as_ref().replace(['\r', '\n'], " ");
        prompt.push_str(&format!("Email {}: {}\n", i + 1, content));
    }

    let keys = Category::ALL
        .iter()
        .map(|c| format!("  \"{}\": [...]", c.key()))
        .collect::<Vec<_>>()
        .join(",\n");
    prompt.push_str(
        "\nRespond in *strict* JSON format with a single object containing exactly these keys, \
         each mapped to an array of strings such as \"Email 1\":\n",
    );
    prompt.push_str(&format!("{{\n{}\n}}", keys));

    prompt
}
