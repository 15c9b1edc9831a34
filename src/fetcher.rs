//! Paginated retrieval of mail summaries

use tracing::{debug, info, warn};

use crate::client::MailService;
use crate::error::{Result, TriageError};
use crate::models::MailItem;

/// Pages through provider search results and collects item snippets in provider order
pub struct MailFetcher<'a> {
    service: &'a dyn MailService,
}

impl<'a> MailFetcher<'a> {
    pub fn new(service: &'a dyn MailService) -> Self {
        Self { service }
    }

    /// Fetch at most `max_total` items matching `query`.
    ///
    /// Stops at an empty page, an exhausted continuation token, or the cap.
    /// A failed content fetch for one item keeps the item with an empty snippet.
    pub async fn fetch(&self, query: &str, page_size: u32, max_total: usize) -> Result<Vec<MailItem>> {
        Ok(self.fetch_batch(query, page_size, max_total).await?.items)
    }

    /// Like [`fetch`](Self::fetch), also reporting whether paging was cut short.
    ///
    /// Only an unauthorized session is an error. Any other search failure
    /// ends paging and the items collected so far are returned with
    /// `truncated` set.
    pub async fn fetch_batch(
        &self,
        query: &str,
        page_size: u32,
        max_total: usize,
    ) -> Result<FetchedBatch> {
        let mut items: Vec<MailItem> = Vec::new();
        let mut page_token: Option<String> = None;
        let mut truncated = false;
        let page_size = page_size.max(1);

        while items.len() < max_total {
            let page = match self.service.search(query, page_token.take(), page_size).await {
                Ok(page) => page,
                Err(TriageError::Unauthenticated | TriageError::AuthError(_)) => {
                    return Err(TriageError::Unauthenticated);
                }
                Err(e) => {
                    warn!(
                        "Search failed after {} items, continuing with what was fetched: {}",
                        items.len(),
                        e
                    );
                    truncated = true;
                    break;
                }
            };

            debug!(
                "Search page: {} ids, more pages: {}",
                page.ids.len(),
                page.next_page_token.is_some()
            );

            if page.ids.is_empty() {
                break;
            }

            let remaining = max_total - items.len();
            for id in page.ids.into_iter().take(remaining) {
                let snippet = match self.service.get_full(&id).await {
                    Ok(content) => content.snippet.unwrap_or_default(),
                    Err(TriageError::Unauthenticated) => return Err(TriageError::Unauthenticated),
                    Err(e) => {
                        warn!("Failed to fetch content for {}: {}", id, e);
                        String::new()
                    }
                };
                items.push(MailItem { id, snippet });
            }

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        info!("Fetched {} items for query '{}'", items.len(), query);
        Ok(FetchedBatch { items, truncated })
    }
}

/// Items from one fetch, in provider order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchedBatch {
    pub items: Vec<MailItem>,
    /// A search call failed before paging finished
    pub truncated: bool,
}
