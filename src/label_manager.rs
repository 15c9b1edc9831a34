//! Label catalog setup and per-item label mutation
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

use crate::client::MailService;
use crate::error::{Result, TriageError};
use crate::models::Category;

/// Counts from one mutation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub applied: usize,
    pub failed: usize,
    pub labels_created: usize,
}

/// Ensures category labels exist and applies them to classified items.
///
/// The name -> id catalog lives only as long as the applier, i.e. one run.
pub struct LabelApplier<'a> {
    service: &'a dyn MailService,
    inbox_label_id: String,
    label_cache: HashMap<String, String>, // lowercase name -> id
    loaded: bool,
    created_labels: Vec<String>,
}

impl<'a> LabelApplier<'a> {
    pub fn new(service: &'a dyn MailService, inbox_label_id: impl Into<String>) -> Self {
        Self {
            service,
            inbox_label_id: inbox_label_id.into(),
            label_cache: HashMap::new(),
            loaded: false,
            created_labels: Vec::new(),
        }
    }

    /// Loads all existing labels into the cache, once per applier
    pub async fn load_existing_labels(&mut self) -> Result<usize> {
        if self.loaded {
            return Ok(self.label_cache.len());
        }

        let labels = self.service.list_labels().await?;
        let count = labels.len();
        for label in labels {
            self.cache_insert(&label.name, label.id);
        }
        self.loaded = true;

        info!("Loaded {} existing labels into cache", count);
        Ok(count)
    }

    fn cache_get(&self, name: &str) -> Option<&String> {
        self.label_cache.get(&name.to_lowercase())
    }

    fn cache_insert(&mut self, name: &str, id: String) {
        self.label_cache.insert(name.to_lowercase(), id);
    }

    /// Make sure every named label exists, creating the missing ones.
    ///
    /// Matching is case-insensitive so an existing label is reused rather
    /// than duplicated. Returns name -> id for the requested names.
    pub async fn ensure_labels(&mut self, names: &[String]) -> Result<HashMap<String, String>> {
        self.load_existing_labels().await?;

        let mut catalog = HashMap::with_capacity(names.len());
        for name in names {
            let id = match self.cache_get(name) {
                Some(id) => {
                    debug!("Label '{}' already exists", name);
                    id.clone()
                }
                None => {
                    info!("Creating label: {}", name);
                    let created = self.service.create_label(name).await.map_err(|e| match e {
                        TriageError::Unauthenticated => TriageError::Unauthenticated,
                        other => TriageError::LabelError(format!(
                            "Failed to create label '{}': {}",
                            name, other
                        )),
                    })?;
                    self.cache_insert(name, created.id.clone());
                    self.created_labels.push(created.id.clone());
                    created.id
                }
            };
            catalog.insert(name.clone(), id);
        }

        Ok(catalog)
    }

    /// Label ids created by this applier
    pub fn created_labels(&self) -> &[String] {
        &self.created_labels
    }

    /// Apply category labels to resolved items.
    ///
    /// Each item gets one request adding its category label and removing the
    /// inbox label. A failed request is counted and the pass continues.
    pub async fn apply(
        &mut self,
        mapping: &BTreeMap<Category, Vec<String>>,
        required_label_names: &[String],
    ) -> Result<ApplyOutcome> {
        let created_before = self.created_labels.len();
        let catalog = self.ensure_labels(required_label_names).await?;
        let mut outcome = ApplyOutcome {
            labels_created: self.created_labels.len() - created_before,
            ..Default::default()
        };

        // Resolve every label id before the first mutation
        let mut batches = Vec::with_capacity(mapping.len());
        for (category, ids) in mapping {
            if ids.is_empty() {
                continue;
            }
            let label_id = catalog.get(category.label_name()).ok_or_else(|| {
                TriageError::LabelError(format!(
                    "No label for category '{}' in required labels",
                    category
                ))
            })?;
            batches.push((*category, vec![label_id.clone()], ids));
        }

        let remove = vec![self.inbox_label_id.clone()];
        for (category, add, ids) in batches {
            for id in ids {
                match self.service.modify_labels(id, &add, &remove).await {
                    Ok(()) => {
                        debug!("Labelled {} as {}", id, category);
                        outcome.applied += 1;
                    }
                    Err(e) => {
                        warn!("Failed to label {} as {}: {}", id, category, e);
                        outcome.failed += 1;
                    }
                }
            }
        }

        info!(
            "Applied {} label mutations ({} failed, {} labels created)",
            outcome.applied, outcome.failed, outcome.labels_created
        );
        Ok(outcome)
    }
}
