//! End-to-end classification run: fetch, classify, resolve, label

use chrono::Utc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::auth::Session;
use crate::classifier::{ClassificationClient, ClassificationOutcome};
use crate::config::Config;
use crate::error::{Result, TriageError};
use crate::fetcher::MailFetcher;
use crate::label_manager::{ApplyOutcome, LabelApplier};
use crate::model::GenerativeModel;
use crate::models::{Category, ClassificationResult, MailItem, MutationReport};
use crate::prompt::PromptBuilder;
use crate::resolver;

/// Parameters for one run
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub query: String,
    pub page_size: u32,
    pub max_total: usize,
    pub policy: String,
    pub retries: u32,
    pub retry_delay: Duration,
    /// Upper bound for the whole classification step, retries included
    pub classification_timeout: Duration,
    pub inbox_label_id: String,
    pub dry_run: bool,
}

impl RunRequest {
    pub fn from_config(config: &Config) -> Self {
        Self {
            query: config.fetch.query.clone(),
            page_size: config.fetch.page_size,
            max_total: config.fetch.max_total,
            policy: config.taxonomy.policy.clone(),
            retries: config.classification.retries,
            retry_delay: config.classification.retry_delay(),
            classification_timeout: config.classification.timeout(),
            inbox_label_id: config.labels.inbox_label_id.clone(),
            dry_run: config.execution.dry_run,
        }
    }
}

/// Run the classification pipeline once.
///
/// Returns `Unauthenticated` when the session has no usable credential.
/// Every other outcome, partial ones included, is a report: a search
/// failure keeps the items fetched so far, and a label setup failure counts
/// every planned mutation as failed.
pub async fn run_classification(
    session: &Session,
    model: &dyn GenerativeModel,
    request: &RunRequest,
) -> Result<MutationReport> {
    let mailbox = session.mailbox()?;
    let started_at = Utc::now();
    let run_id = uuid::Uuid::new_v4().to_string();

    info!("Starting classification run {}", run_id);

    let batch = MailFetcher::new(mailbox.as_ref())
        .fetch_batch(&request.query, request.page_size, request.max_total)
        .await?;
    let items = batch.items;

    let outcome = if items.is_empty() {
        info!("No items matched '{}', skipping classification", request.query);
        ClassificationOutcome {
            result: ClassificationResult::empty(),
            attempts: 0,
            degraded: false,
        }
    } else {
        let snippets: Vec<&str> = items.iter().map(|i| i.snippet.as_str()).collect();
        let prompt = crate::prompt::build(&snippets, &request.policy);
        let client = ClassificationClient::new(model);

        match tokio::time::timeout(
            request.classification_timeout,
            client.classify_with_outcome(&prompt, request.retries, request.retry_delay),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(
                    "Classification exceeded {:?}, continuing with empty result",
                    request.classification_timeout
                );
                ClassificationOutcome {
                    result: ClassificationResult::empty(),
                    attempts: client.attempts_started(),
                    degraded: true,
                }
            }
        }
    };

    let resolution = resolver::resolve(&outcome.result, &items);

    let planned = resolution.total_ids();
    let mut label_setup_failed = false;
    let apply = if request.dry_run {
        info!("Dry run: would issue {} label mutations", planned);
        ApplyOutcome::default()
    } else if planned == 0 {
        debug!("Nothing to label");
        ApplyOutcome::default()
    } else {
        let mut applier = LabelApplier::new(mailbox.as_ref(), request.inbox_label_id.clone());
        let applied = applier.apply(&resolution.ids, &Category::label_names()).await;
        match applied {
            Ok(outcome) => outcome,
            Err(TriageError::Unauthenticated) => return Err(TriageError::Unauthenticated),
            Err(e) => {
                warn!("Label setup failed, no items were moved: {}", e);
                label_setup_failed = true;
                ApplyOutcome {
                    applied: 0,
                    failed: planned,
                    labels_created: applier.created_labels().len(),
                }
            }
        }
    };

    let report = MutationReport {
        run_id,
        started_at,
        completed_at: Utc::now(),
        items_fetched: items.len(),
        fetch_truncated: batch.truncated,
        categorized: outcome.result,
        resolved: resolution.ids,
        applied_count: apply.applied,
        failed_count: apply.failed,
        dropped_references: resolution.dropped,
        labels_created: apply.labels_created,
        label_setup_failed,
        classification_attempts: outcome.attempts,
        degraded: outcome.degraded,
        dry_run: request.dry_run,
    };

    info!(
        "Run {} complete: {} fetched, {} applied, {} failed",
        report.run_id, report.items_fetched, report.applied_count, report.failed_count
    );
    Ok(report)
}

/// Fetch the items a run would classify, without touching the model or labels
pub async fn fetch_preview(session: &Session, request: &RunRequest) -> Result<Vec<MailItem>> {
    let mailbox = session.mailbox()?;
    MailFetcher::new(mailbox.as_ref())
        .fetch(&request.query, request.page_size, request.max_total)
        .await
}

/// Render the prompt a run would send for the given items
pub fn preview_prompt(config: &Config, items: &[MailItem]) -> String {
    let snippets: Vec<&str> = items.iter().map(|i| i.snippet.as_str()).collect();
    PromptBuilder::new(&config.taxonomy).render(&snippets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_from_config() {
        let mut config = Config::default();
        config.classification.retry_delay_ms = 250;
        config.classification.timeout_secs = 9;
        config.execution.dry_run = true;

        let request = RunRequest::from_config(&config);

        assert_eq!(request.query, "is:unread in:inbox");
        assert_eq!(request.retry_delay, Duration::from_millis(250));
        assert_eq!(request.classification_timeout, Duration::from_secs(9));
        assert_eq!(request.inbox_label_id, "INBOX");
        assert!(request.dry_run);
    }

    #[test]
    fn test_preview_prompt_uses_configured_policy() {
        let mut config = Config::default();
        config.taxonomy.policy = "Receipts go to For Review.".to_string();
        let items = vec![MailItem::new("a", "Your receipt"), MailItem::new("b", "Sale!")];

        let prompt = preview_prompt(&config, &items);

        assert!(prompt.contains("Receipts go to For Review."));
        assert!(prompt.contains("Email 1: Your receipt"));
        assert!(prompt.contains("Email 2: Sale!"));
    }
}
