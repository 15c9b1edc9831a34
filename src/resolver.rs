//! Maps the model's positional references back to provider item ids

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::models::{Category, ClassificationResult, MailItem};

static EMAIL_REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*email\s*(\d+)\s*$").unwrap());

/// Category -> resolved item ids, plus how many references were discarded
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub ids: BTreeMap<Category, Vec<String>>,
    pub dropped: usize,
}

impl Resolution {
    pub fn ids_for(&self, category: Category) -> &[String] {
        self.ids.get(&category).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn total_ids(&self) -> usize {
        self.ids.values().map(Vec::len).sum()
    }
}

/// Extract N from "Email <N>", tolerating case and surrounding whitespace
pub fn parse_reference(reference: &str) -> Option<usize> {
    EMAIL_REFERENCE
        .captures(reference)
        .and_then(|c| c.get(1))
        .and_then(|n| n.as_str().parse().ok())
}

/// Resolve references against the items fetched in this run.
///
/// References outside `1..=items.len()` are dropped and counted. The same
/// item may appear under several categories; a repeat within one category
/// is kept once.
pub fn resolve(result: &ClassificationResult, items: &[MailItem]) -> Resolution {
    let mut resolution = Resolution::default();

    for (category, references) in result.iter() {
        let mut ids: Vec<String> = Vec::new();

        for reference in references {
            match parse_reference(reference) {
                Some(n) if (1..=items.len()).contains(&n) => {
                    let id = &items[n - 1].id;
                    if !ids.contains(id) {
                        ids.push(id.clone());
                    }
                }
                _ => {
                    debug!("Dropping reference '{}' under {}", reference, category);
                    resolution.dropped += 1;
                }
            }
        }

        resolution.ids.insert(category, ids);
    }

    if resolution.dropped > 0 {
        info!(
            "Dropped {} references outside the {} fetched items",
            resolution.dropped,
            items.len()
        );
    }

    resolution
}
