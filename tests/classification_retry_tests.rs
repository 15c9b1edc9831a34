//! Retry behaviour of the classification client against a mocked model

mod common;

use std::time::Duration;

use common::{classification_json, MockModel};
use inbox_triage::classifier::ClassificationClient;
use inbox_triage::error::TriageError;
use inbox_triage::models::{Category, ClassificationResult};
use mockall::Sequence;

/// Model that fails `failures` times with a mix of transient errors, then answers
fn flaky_model(failures: usize, answer: String) -> MockModel {
    let mut model = MockModel::new();
    let mut seq = Sequence::new();

    for i in 0..failures {
        let expectation = model.expect_generate().times(1).in_sequence(&mut seq);
        if i % 2 == 0 {
            expectation.returning(|_, _| Err(TriageError::RateLimitExceeded { retry_after: 1 }));
        } else {
            expectation.returning(|_, _| Ok("{\"Junk\": \"not a list\"}".to_string()));
        }
    }
    model
        .expect_generate()
        .times(1)
        .in_sequence(&mut seq)
        .returning(move |_, _| Ok(answer.clone()));

    model
}

#[tokio::test]
async fn test_succeeds_on_the_last_allowed_attempt() {
    for retries in 1..=5u32 {
        let answer = classification_json(&["Email 2"], &[], &["Email 1"]);
        let model = flaky_model(retries as usize - 1, answer.clone());
        let client = ClassificationClient::new(&model);

        let outcome = client
            .classify_with_outcome("prompt", retries, Duration::ZERO)
            .await;

        assert_eq!(outcome.attempts, retries);
        assert!(!outcome.degraded);
        assert_eq!(outcome.result.references(Category::Junk), ["Email 1".to_string()]);
    }
}

#[tokio::test]
async fn test_always_failing_model_yields_empty_after_retries_calls() {
    for retries in 1..=4u32 {
        let mut model = MockModel::new();
        model
            .expect_generate()
            .times(retries as usize)
            .returning(|_, _| Err(TriageError::NetworkError("connection reset".to_string())));
        let client = ClassificationClient::new(&model);

        let result = client.classify("prompt", retries, Duration::ZERO).await;

        assert_eq!(result, ClassificationResult::empty());
    }
}

#[tokio::test]
async fn test_fenced_response_is_accepted() {
    let mut model = MockModel::new();
    model.expect_generate().times(1).returning(|_, _| {
        Ok(format!(
            "```json\n{}\n```",
            classification_json(&[], &["Email 1"], &[])
        ))
    });
    let client = ClassificationClient::new(&model);

    let result = client.classify("prompt", 3, Duration::ZERO).await;
    assert_eq!(result.references(Category::ForReview), ["Email 1".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_during_delay_stops_further_attempts() {
    let mut model = MockModel::new();
    model
        .expect_generate()
        .times(1)
        .returning(|_, _| Err(TriageError::ServerError {
            status: 500,
            message: "internal".to_string(),
        }));
    let client = ClassificationClient::new(&model);

    let result = tokio::time::timeout(
        Duration::from_secs(1),
        client.classify_with_outcome("prompt", 3, Duration::from_secs(10)),
    )
    .await;

    assert!(result.is_err());
    assert_eq!(client.attempts_started(), 1);
}
