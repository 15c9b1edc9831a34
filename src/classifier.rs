//! Resilient classification calls against the generative model

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{Result, TriageError};
use crate::model::{GenerativeModel, ResponseFormat};
use crate::models::{Category, ClassificationResult};

/// Markdown code fences the model sometimes wraps JSON in
static CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*\s*(.*?)\s*```$").unwrap());

/// Result of a classification call, including how it was reached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationOutcome {
    pub result: ClassificationResult,
    pub attempts: u32,
    /// True when every attempt failed and the empty result was substituted
    pub degraded: bool,
}

/// Sends prompts to the model, retrying transient failures with a fixed delay.
///
/// Never fails: after the last attempt it falls back to the all-empty result.
pub struct ClassificationClient<'a> {
    model: &'a dyn GenerativeModel,
    attempts_started: AtomicU32,
}

impl<'a> ClassificationClient<'a> {
    pub fn new(model: &'a dyn GenerativeModel) -> Self {
        Self {
            model,
            attempts_started: AtomicU32::new(0),
        }
    }

    /// Attempts started so far, including one cut short by cancellation
    pub fn attempts_started(&self) -> u32 {
        self.attempts_started.load(Ordering::Relaxed)
    }

    pub async fn classify(&self, prompt: &str, retries: u32, delay: Duration) -> ClassificationResult {
        self.classify_with_outcome(prompt, retries, delay).await.result
    }

    /// Like [`classify`](Self::classify), also reporting attempts used.
    ///
    /// The delay between attempts is an async sleep, so dropping this future
    /// (e.g. under `tokio::time::timeout`) cancels between attempts.
    pub async fn classify_with_outcome(
        &self,
        prompt: &str,
        retries: u32,
        delay: Duration,
    ) -> ClassificationOutcome {
        let max_attempts = retries.max(1);

        for attempt in 1..=max_attempts {
            self.attempts_started.fetch_add(1, Ordering::Relaxed);
            info!("Sending classification request, attempt {}/{}", attempt, max_attempts);

            match self.attempt(prompt).await {
                Ok(result) => {
                    info!(
                        "Classification parsed with {} references",
                        result.total_references()
                    );
                    return ClassificationOutcome {
                        result,
                        attempts: attempt,
                        degraded: false,
                    };
                }
                Err(e) => {
                    warn!("Classification attempt {} failed: {}", attempt, e);
                    if attempt < max_attempts {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        warn!(
            "Classification failed after {} attempts, returning empty result",
            max_attempts
        );
        ClassificationOutcome {
            result: ClassificationResult::empty(),
            attempts: max_attempts,
            degraded: true,
        }
    }

    async fn attempt(&self, prompt: &str) -> Result<ClassificationResult> {
        let raw = self.model.generate(prompt, ResponseFormat::Json).await?;
        parse_classification(strip_fences(&raw))
    }
}

/// Remove a surrounding ``` / ```json fence, if present
pub fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    match CODE_FENCE.captures(trimmed).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => trimmed,
    }
}

/// Strictly parse the model's JSON.
///
/// The payload must be a single object with exactly the category keys, each
/// mapped to an array of strings.
pub fn parse_classification(json: &str) -> Result<ClassificationResult> {
    let value: Value = serde_json::from_str(json)
        .map_err(|e| TriageError::MalformedResponse(format!("invalid JSON: {}", e)))?;

    let object = value
        .as_object()
        .ok_or_else(|| TriageError::MalformedResponse("expected a JSON object".to_string()))?;

    if let Some(unknown) = object.keys().find(|k| Category::from_key(k).is_none()) {
        return Err(TriageError::MalformedResponse(format!(
            "unexpected category '{}'",
            unknown
        )));
    }

    let mut entries = Vec::with_capacity(Category::ALL.len());
    for category in Category::ALL {
        let values = object
            .get(category.key())
            .ok_or_else(|| {
                TriageError::MalformedResponse(format!("missing category '{}'", category))
            })?
            .as_array()
            .ok_or_else(|| {
                TriageError::MalformedResponse(format!("'{}' is not an array", category))
            })?;

        let refs = values
            .iter()
            .map(|v| {
                v.as_str().map(str::to_string).ok_or_else(|| {
                    TriageError::MalformedResponse(format!(
                        "'{}' contains a non-string value",
                        category
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        entries.push((category, refs));
    }

    Ok(ClassificationResult::from_references(entries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    const VALID: &str = r#"{"Time Sensitive": ["Email 1"], "For Review": [], "Junk": ["Email 2", "Email 3"]}"#;

    /// Replays scripted responses in order
    struct ScriptedModel {
        responses: Mutex<VecDeque<Result<String>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedModel {
        fn new(responses: Vec<Result<String>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl GenerativeModel for ScriptedModel {
        async fn generate(&self, _prompt: &str, format: ResponseFormat) -> Result<String> {
            assert_eq!(format, ResponseFormat::Json);
            *self.calls.lock().unwrap() += 1;
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(TriageError::NetworkError("script exhausted".to_string())))
        }
    }

    #[test]
    fn test_strip_fences() {
        assert_eq!(strip_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_fences("```\n{}\n```"), "{}");
        assert_eq!(strip_fences("  {\"a\": 1}  "), "{\"a\": 1}");
    }

    #[test]
    fn test_parse_valid_payload() {
        let result = parse_classification(VALID).unwrap();
        assert_eq!(result.references(Category::TimeSensitive), ["Email 1".to_string()]);
        assert!(result.references(Category::ForReview).is_empty());
        assert_eq!(result.references(Category::Junk).len(), 2);
    }

    #[test]
    fn test_parse_rejects_missing_key() {
        let err = parse_classification(r#"{"Time Sensitive": [], "Junk": []}"#).unwrap_err();
        assert!(err.to_string().contains("For Review"));
    }

    #[test]
    fn test_parse_rejects_unknown_key() {
        let err = parse_classification(
            r#"{"Time Sensitive": [], "For Review": [], "Junk": [], "Spam": []}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Spam"));
    }

    #[test]
    fn test_parse_rejects_non_string_values() {
        assert!(parse_classification(r#"{"Time Sensitive": [1], "For Review": [], "Junk": []}"#).is_err());
        assert!(parse_classification(r#"{"Time Sensitive": "Email 1", "For Review": [], "Junk": []}"#).is_err());
        assert!(parse_classification(r#"["Email 1"]"#).is_err());
        assert!(parse_classification("not json").is_err());
    }

    #[tokio::test]
    async fn test_first_success_returns_immediately() {
        let model = ScriptedModel::new(vec![Ok(VALID.to_string())]);
        let client = ClassificationClient::new(&model);

        let outcome = client
            .classify_with_outcome("prompt", 3, Duration::from_millis(1))
            .await;

        assert_eq!(model.calls(), 1);
        assert_eq!(outcome.attempts, 1);
        assert!(!outcome.degraded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_failures() {
        let model = ScriptedModel::new(vec![
            Err(TriageError::RateLimitExceeded { retry_after: 1 }),
            Ok("this is not json".to_string()),
            Ok(format!("```json\n{}\n```", VALID)),
        ]);
        let client = ClassificationClient::new(&model);

        let result = client.classify("prompt", 3, Duration::from_secs(2)).await;

        assert_eq!(model.calls(), 3);
        assert_eq!(result, parse_classification(VALID).unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_key_triggers_retry() {
        let model = ScriptedModel::new(vec![
            Ok(r#"{"Junk": ["Email 1"]}"#.to_string()),
            Ok(VALID.to_string()),
        ]);
        let client = ClassificationClient::new(&model);

        let outcome = client
            .classify_with_outcome("prompt", 5, Duration::from_secs(1))
            .await;

        assert_eq!(model.calls(), 2);
        assert_eq!(outcome.attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_degrades_to_empty() {
        let model = ScriptedModel::new(vec![]);
        let client = ClassificationClient::new(&model);

        let outcome = client
            .classify_with_outcome("prompt", 4, Duration::from_secs(2))
            .await;

        assert_eq!(model.calls(), 4);
        assert_eq!(outcome.attempts, 4);
        assert_eq!(client.attempts_started(), 4);
        assert!(outcome.degraded);
        assert_eq!(outcome.result, ClassificationResult::empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_is_slept_between_attempts_only() {
        let model = ScriptedModel::new(vec![]);
        let client = ClassificationClient::new(&model);

        let start = tokio::time::Instant::now();
        client.classify("prompt", 3, Duration::from_secs(2)).await;

        // Two sleeps for three attempts
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(4), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(6), "elapsed {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_zero_retries_still_attempts_once() {
        let model = ScriptedModel::new(vec![Ok(VALID.to_string())]);
        let client = ClassificationClient::new(&model);

        let outcome = client
            .classify_with_outcome("prompt", 0, Duration::ZERO)
            .await;

        assert_eq!(model.calls(), 1);
        assert!(!outcome.degraded);
    }
}
