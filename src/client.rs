//! Mail provider interface and the Gmail implementation with retry logic

use async_trait::async_trait;
use google_gmail1::api::{Label, ModifyMessageRequest};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::auth::GmailHub;
use crate::error::{Result, TriageError};

const MODIFY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.modify";
const LABELS_SCOPE: &str = "https://www.googleapis.com/auth/gmail.labels";

/// Label info returned from the mail provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelInfo {
    pub id: String,
    pub name: String,
}

/// One page of search results
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPage {
    pub ids: Vec<String>,
    pub next_page_token: Option<String>,
}

/// Full content of a single item, reduced to what classification needs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailContent {
    pub id: String,
    pub snippet: Option<String>,
}

/// Narrow view of the mail provider used by the pipeline
#[async_trait]
pub trait MailService: Send + Sync {
    /// Fetch one page of item ids matching a query
    async fn search(
        &self,
        query: &str,
        page_token: Option<String>,
        page_size: u32,
    ) -> Result<SearchPage>;

    /// Fetch the full content of one item
    async fn get_full(&self, id: &str) -> Result<MailContent>;

    /// List all labels in the account
    async fn list_labels(&self) -> Result<Vec<LabelInfo>>;

    /// Create a new label
    async fn create_label(&self, name: &str) -> Result<LabelInfo>;

    /// Add and remove labels on one item
    async fn modify_labels(&self, id: &str, add: &[String], remove: &[String]) -> Result<()>;
}

#[async_trait]
impl<T: MailService + ?Sized> MailService for Arc<T> {
    async fn search(
        &self,
        query: &str,
        page_token: Option<String>,
        page_size: u32,
    ) -> Result<SearchPage> {
        self.as_ref().search(query, page_token, page_size).await
    }

    async fn get_full(&self, id: &str) -> Result<MailContent> {
        self.as_ref().get_full(id).await
    }

    async fn list_labels(&self) -> Result<Vec<LabelInfo>> {
        self.as_ref().list_labels().await
    }

    async fn create_label(&self, name: &str) -> Result<LabelInfo> {
        self.as_ref().create_label(name).await
    }

    async fn modify_labels(&self, id: &str, add: &[String], remove: &[String]) -> Result<()> {
        self.as_ref().modify_labels(id, add, remove).await
    }
}

/// Gmail-backed mail service
///
/// Read calls and label management retry transient failures with exponential
/// backoff. Item mutations are attempted once; the caller counts failures.
pub struct GmailMailService {
    hub: GmailHub,
    max_retries: u32,
    call_timeout: Duration,
}

impl GmailMailService {
    pub fn new(hub: GmailHub) -> Self {
        Self {
            hub,
            max_retries: 3,
            call_timeout: Duration::from_secs(30),
        }
    }

    /// Execute an async operation with exponential backoff retry
    async fn with_retry<T, F, Fut>(
        operation_name: &str,
        max_retries: u32,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut delay = Duration::from_secs(1);
        let mut attempts = 0;

        loop {
            attempts += 1;
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_transient() && attempts <= max_retries => {
                    warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {:?}...",
                        operation_name,
                        attempts,
                        max_retries + 1,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    delay = std::cmp::min(delay * 2, Duration::from_secs(30));
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Bound a single API call so a hung connection surfaces as a network error
    async fn timed<T, Fut>(&self, operation_name: &str, call: Fut) -> Result<T>
    where
        Fut: std::future::Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "Gmail API {} call timed out after {:?}",
                    operation_name, self.call_timeout
                );
                Err(TriageError::NetworkError(format!(
                    "API call timed out after {:?}",
                    self.call_timeout
                )))
            }
        }
    }
}

#[async_trait]
impl MailService for GmailMailService {
    async fn search(
        &self,
        query: &str,
        page_token: Option<String>,
        page_size: u32,
    ) -> Result<SearchPage> {
        let page_token = page_token.as_deref();
        Self::with_retry("search", self.max_retries, || async move {
            self.timed("messages.list", async {
                let mut call = self
                    .hub
                    .users()
                    .messages_list("me")
                    .q(query)
                    .max_results(page_size);

                if let Some(token) = page_token {
                    call = call.page_token(token);
                }

                let (_, response) = call.add_scope(MODIFY_SCOPE).doit().await?;

                let ids = response
                    .messages
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|m| m.id)
                    .collect::<Vec<_>>();

                debug!("Search page returned {} ids", ids.len());
                Ok(SearchPage {
                    ids,
                    next_page_token: response.next_page_token.filter(|t| !t.is_empty()),
                })
            })
            .await
        })
        .await
    }

    async fn get_full(&self, id: &str) -> Result<MailContent> {
        Self::with_retry("get_full", self.max_retries, || async move {
            self.timed("messages.get", async {
                let (_, msg) = self
                    .hub
                    .users()
                    .messages_get("me", id)
                    .format("minimal")
                    .add_scope(MODIFY_SCOPE)
                    .doit()
                    .await?;

                Ok(MailContent {
                    id: msg.id.unwrap_or_else(|| id.to_string()),
                    snippet: msg.snippet,
                })
            })
            .await
        })
        .await
    }

    async fn list_labels(&self) -> Result<Vec<LabelInfo>> {
        Self::with_retry("list_labels", self.max_retries, || async move {
            self.timed("labels.list", async {
                let (_, response) = self
                    .hub
                    .users()
                    .labels_list("me")
                    .add_scope(LABELS_SCOPE)
                    .doit()
                    .await?;

                let labels: Vec<LabelInfo> = response
                    .labels
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|label| match (label.id, label.name) {
                        (Some(id), Some(name)) => Some(LabelInfo { id, name }),
                        _ => None,
                    })
                    .collect();

                debug!("Successfully parsed {} labels", labels.len());
                Ok(labels)
            })
            .await
        })
        .await
    }

    async fn create_label(&self, name: &str) -> Result<LabelInfo> {
        Self::with_retry("create_label", self.max_retries, || async move {
            let label = Label {
                name: Some(name.to_string()),
                message_list_visibility: Some("show".to_string()),
                label_list_visibility: Some("labelShow".to_string()),
                ..Default::default()
            };

            let (_, created) = self
                .hub
                .users()
                .labels_create(label, "me")
                .add_scope(LABELS_SCOPE)
                .doit()
                .await?;

            let id = created
                .id
                .ok_or_else(|| TriageError::LabelError("Created label has no ID".to_string()))?;

            Ok(LabelInfo {
                id,
                name: created.name.unwrap_or_else(|| name.to_string()),
            })
        })
        .await
    }

    async fn modify_labels(&self, id: &str, add: &[String], remove: &[String]) -> Result<()> {
        let request = ModifyMessageRequest {
            add_label_ids: (!add.is_empty()).then(|| add.to_vec()),
            remove_label_ids: (!remove.is_empty()).then(|| remove.to_vec()),
        };

        self.hub
            .users()
            .messages_modify(request, "me", id)
            .add_scope(MODIFY_SCOPE)
            .doit()
            .await?;

        Ok(())
    }
}
