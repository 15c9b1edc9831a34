//! Common test utilities and fixtures
#![allow(dead_code)]

use async_trait::async_trait;
use inbox_triage::client::{LabelInfo, MailContent, MailService, SearchPage};
use inbox_triage::error::{Result, TriageError};
use inbox_triage::model::{GenerativeModel, ResponseFormat};
use inbox_triage::models::MailItem;
use inbox_triage::pipeline::RunRequest;
use mockall::mock;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

pub const INBOX: &str = "INBOX";

/// Create a test item with default values
pub fn create_test_item(id: &str, snippet: &str) -> MailItem {
    MailItem::new(id, snippet)
}

/// Create a test LabelInfo
pub fn create_test_label_info(id: &str, name: &str) -> LabelInfo {
    LabelInfo {
        id: id.to_string(),
        name: name.to_string(),
    }
}

/// Model response with the given references per category
pub fn classification_json(time_sensitive: &[&str], for_review: &[&str], junk: &[&str]) -> String {
    serde_json::json!({
        "Time Sensitive": time_sensitive,
        "For Review": for_review,
        "Junk": junk,
    })
    .to_string()
}

/// Run parameters with no waiting between attempts
pub fn test_request() -> RunRequest {
    RunRequest {
        query: "is:unread in:inbox".to_string(),
        page_size: 10,
        max_total: 50,
        policy: "Newsletters are Junk.".to_string(),
        retries: 3,
        retry_delay: Duration::ZERO,
        classification_timeout: Duration::from_secs(30),
        inbox_label_id: INBOX.to_string(),
        dry_run: false,
    }
}

// Mock implementation of MailService for testing
mock! {
    pub MailService {}

    #[async_trait]
    impl MailService for MailService {
        async fn search(&self, query: &str, page_token: Option<String>, page_size: u32) -> Result<SearchPage>;
        async fn get_full(&self, id: &str) -> Result<MailContent>;
        async fn list_labels(&self) -> Result<Vec<LabelInfo>>;
        async fn create_label(&self, name: &str) -> Result<LabelInfo>;
        async fn modify_labels(&self, id: &str, add: &[String], remove: &[String]) -> Result<()>;
    }
}

// Mock implementation of GenerativeModel for testing
mock! {
    pub Model {}

    #[async_trait]
    impl GenerativeModel for Model {
        async fn generate(&self, prompt: &str, format: ResponseFormat) -> Result<String>;
    }
}

/// A model that never answers within any reasonable timeout
pub struct StalledModel {
    pub calls: Mutex<u32>,
}

impl StalledModel {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(0),
        }
    }
}

#[async_trait]
impl GenerativeModel for StalledModel {
    async fn generate(&self, _prompt: &str, _format: ResponseFormat) -> Result<String> {
        *self.calls.lock().unwrap() += 1;
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(TriageError::NetworkError("stalled".to_string()))
    }
}

#[derive(Default)]
struct FakeState {
    labels: Vec<LabelInfo>,
    item_labels: HashMap<String, BTreeSet<String>>,
    created_names: Vec<String>,
    modifications: Vec<(String, Vec<String>, Vec<String>)>,
    search_calls: usize,
}

/// In-memory mailbox that behaves like the provider for the calls the pipeline makes.
///
/// Search only returns items still carrying the inbox label, so a second run
/// sees what the first one left behind.
pub struct FakeMailbox {
    items: Vec<(String, String)>,
    failing_ids: HashSet<String>,
    revoked: bool,
    state: Mutex<FakeState>,
}

impl FakeMailbox {
    pub fn with_snippets(snippets: &[&str]) -> Self {
        let items: Vec<(String, String)> = snippets
            .iter()
            .enumerate()
            .map(|(i, s)| (format!("msg-{}", i + 1), s.to_string()))
            .collect();

        let mut state = FakeState {
            labels: vec![create_test_label_info(INBOX, INBOX)],
            ..Default::default()
        };
        for (id, _) in &items {
            state
                .item_labels
                .insert(id.clone(), BTreeSet::from([INBOX.to_string()]));
        }

        Self {
            items,
            failing_ids: HashSet::new(),
            revoked: false,
            state: Mutex::new(state),
        }
    }

    pub fn with_items(count: usize) -> Self {
        let snippets: Vec<String> = (1..=count).map(|i| format!("Snippet {}", i)).collect();
        let refs: Vec<&str> = snippets.iter().map(String::as_str).collect();
        Self::with_snippets(&refs)
    }

    pub fn with_label(self, id: &str, name: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .labels
            .push(create_test_label_info(id, name));
        self
    }

    pub fn failing_on(mut self, id: &str) -> Self {
        self.failing_ids.insert(id.to_string());
        self
    }

    pub fn revoked(mut self) -> Self {
        self.revoked = true;
        self
    }

    pub fn item_id(&self, position: usize) -> String {
        self.items[position].0.clone()
    }

    pub fn label_id(&self, name: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .labels
            .iter()
            .find(|l| l.name == name)
            .map(|l| l.id.clone())
    }

    pub fn label_count(&self) -> usize {
        self.state.lock().unwrap().labels.len()
    }

    pub fn created_label_names(&self) -> Vec<String> {
        self.state.lock().unwrap().created_names.clone()
    }

    pub fn modifications(&self) -> Vec<(String, Vec<String>, Vec<String>)> {
        self.state.lock().unwrap().modifications.clone()
    }

    pub fn labels_of(&self, id: &str) -> BTreeSet<String> {
        self.state
            .lock()
            .unwrap()
            .item_labels
            .get(id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn search_calls(&self) -> usize {
        self.state.lock().unwrap().search_calls
    }
}

#[async_trait]
impl MailService for FakeMailbox {
    async fn search(&self, _query: &str, page_token: Option<String>, page_size: u32) -> Result<SearchPage> {
        if self.revoked {
            return Err(TriageError::AuthError("invalid_grant".to_string()));
        }

        let mut state = self.state.lock().unwrap();
        state.search_calls += 1;

        let in_inbox: Vec<String> = self
            .items
            .iter()
            .filter(|(id, _)| state.item_labels.get(id).map_or(false, |l| l.contains(INBOX)))
            .map(|(id, _)| id.clone())
            .collect();

        let start: usize = page_token.and_then(|t| t.parse().ok()).unwrap_or(0);
        let end = (start + page_size as usize).min(in_inbox.len());
        let ids = in_inbox[start.min(end)..end].to_vec();
        let next_page_token = (end < in_inbox.len()).then(|| end.to_string());

        Ok(SearchPage {
            ids,
            next_page_token,
        })
    }

    async fn get_full(&self, id: &str) -> Result<MailContent> {
        self.items
            .iter()
            .find(|(item_id, _)| item_id == id)
            .map(|(item_id, snippet)| MailContent {
                id: item_id.clone(),
                snippet: Some(snippet.clone()),
            })
            .ok_or_else(|| TriageError::MessageNotFound(id.to_string()))
    }

    async fn list_labels(&self) -> Result<Vec<LabelInfo>> {
        Ok(self.state.lock().unwrap().labels.clone())
    }

    async fn create_label(&self, name: &str) -> Result<LabelInfo> {
        let mut state = self.state.lock().unwrap();
        if state
            .labels
            .iter()
            .any(|l| l.name.eq_ignore_ascii_case(name))
        {
            return Err(TriageError::BadRequest(format!(
                "Label name exists or conflicts: {}",
                name
            )));
        }

        let label = create_test_label_info(&format!("Label_{}", state.labels.len()), name);
        state.labels.push(label.clone());
        state.created_names.push(name.to_string());
        Ok(label)
    }

    async fn modify_labels(&self, id: &str, add: &[String], remove: &[String]) -> Result<()> {
        if self.failing_ids.contains(id) {
            return Err(TriageError::ServerError {
                status: 500,
                message: "backend error".to_string(),
            });
        }

        let mut state = self.state.lock().unwrap();
        state
            .modifications
            .push((id.to_string(), add.to_vec(), remove.to_vec()));

        let labels = state.item_labels.entry(id.to_string()).or_default();
        for label in remove {
            labels.remove(label);
        }
        labels.extend(add.iter().cloned());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_json_has_every_key() {
        let json: serde_json::Value =
            serde_json::from_str(&classification_json(&["Email 1"], &[], &[])).unwrap();
        assert_eq!(json["Time Sensitive"][0], "Email 1");
        assert!(json["For Review"].as_array().unwrap().is_empty());
        assert!(json["Junk"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fake_mailbox_hides_items_leaving_inbox() {
        let mailbox = FakeMailbox::with_items(2);
        mailbox
            .modify_labels("msg-1", &["X".to_string()], &[INBOX.to_string()])
            .await
            .unwrap();

        let page = mailbox.search("q", None, 10).await.unwrap();
        assert_eq!(page.ids, vec!["msg-2".to_string()]);
    }
}
