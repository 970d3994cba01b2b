/*!
 * Integration tests for the extraction pipeline against scripted backends
 */

use std::sync::Arc;
use std::time::Duration;

use droneterms::errors::ExtractionError;
use droneterms::extraction::{CancellationFlag, JobProgress, JobState, RetryPolicy};
use droneterms::providers::mock::{MockFailure, MockProvider};
use crate::common::{self, StallingProvider};

/// A whole document runs through split, process and merge
#[tokio::test]
async fn test_run_uavDocument_shouldProduceOneTerm() {
    let provider = MockProvider::working().with_custom_response(|_| common::UAV_RESPONSE.to_string());
    let pipeline = common::heuristic_pipeline(Arc::new(provider.clone()), common::fast_policy(), 4000);
    let progress = JobProgress::new();

    let glossary = pipeline
        .run(&common::paragraphs(9, 4000, 'a'), "БАС", &progress, &CancellationFlag::new())
        .await
        .unwrap();

    // three chunks, all answering the same term
    assert_eq!(provider.request_count(), 3);
    assert_eq!(glossary.len(), 1);
    let record = glossary.get("UAV").unwrap();
    assert_eq!(record.translation, "БПЛА");
    assert_eq!(record.relevance, 95.0);
    assert_eq!(progress.state(), JobState::Done);
}

/// A stalled first request times out, backs off once and then succeeds
#[tokio::test(start_paused = true)]
async fn test_run_timeoutThenSuccess_shouldRetryWithBackoff() {
    common::init_test_logging();
    let provider = Arc::new(StallingProvider::new(1, Duration::from_secs(60), common::UAV_RESPONSE));
    let policy = RetryPolicy {
        max_retries: 3,
        initial_backoff: Duration::from_secs(1),
        backoff_ceiling: Duration::from_secs(8),
        request_timeout: Duration::from_secs(10),
        ..RetryPolicy::default()
    };
    let pipeline = common::heuristic_pipeline(provider.clone(), policy, 4000);
    let text = "Беспилотный летательный аппарат управляется автопилотом и наземной станцией управления";

    let output = pipeline
        .run_detailed(text, "БАС", &JobProgress::new(), &CancellationFlag::new())
        .await
        .unwrap();

    assert_eq!(provider.calls(), 2);
    let report = &output.reports[0];
    assert_eq!(report.attempts, 2);
    assert_eq!(report.delays, vec![Duration::from_secs(1)]);
    assert!(report.result.is_success());
    assert!(output.glossary.contains("UAV"));

    // a timeout shrinks the chunk with the generic ratio: 9 words -> 8
    let prompts = provider.prompts();
    assert!(prompts[0].ends_with("станцией управления"));
    assert!(prompts[1].ends_with("наземной станцией"));
}

/// Cancelling before the job starts dispatches nothing
#[tokio::test]
async fn test_run_cancelledUpfront_shouldNotCallBackend() {
    let provider = MockProvider::working();
    let pipeline = common::heuristic_pipeline(Arc::new(provider.clone()), common::fast_policy(), 4000);
    let cancel = CancellationFlag::new();
    cancel.cancel();

    let result = pipeline
        .run(&common::paragraphs(9, 4000, 'a'), "БАС", &JobProgress::new(), &cancel)
        .await;

    assert_eq!(result, Err(ExtractionError::Cancelled { completed: 0, total: 3 }));
    assert_eq!(provider.request_count(), 0);
}

/// Cancelling from another task stops the job between chunks
#[tokio::test(start_paused = true)]
async fn test_run_cancelledMidway_shouldStopBetweenChunks() {
    let provider = MockProvider::slow(1_000);
    let pipeline = common::heuristic_pipeline(Arc::new(provider.clone()), common::fast_policy(), 4000);
    let cancel = CancellationFlag::new();
    let progress = Arc::new(JobProgress::new());

    let canceller = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1_500)).await;
            cancel.cancel();
        })
    };

    let result = pipeline
        .run(&common::paragraphs(9, 4000, 'a'), "БАС", &progress, &cancel)
        .await;
    canceller.await.unwrap();

    assert_eq!(result, Err(ExtractionError::Cancelled { completed: 2, total: 3 }));
    assert_eq!(provider.request_count(), 2);
    assert_eq!(progress.completed(), 2);
}

/// Truncated responses shrink harder than other failures
#[tokio::test]
async fn test_run_truncatedResponses_shouldShrinkAggressively() {
    let provider = MockProvider::fail_first(1, MockFailure::Truncated);
    let pipeline = common::heuristic_pipeline(Arc::new(provider.clone()), common::fast_policy(), 4000);
    let text = "один два три четыре пять шесть семь восемь девять десять";

    pipeline
        .run(text, "БАС", &JobProgress::new(), &CancellationFlag::new())
        .await
        .unwrap();

    let requests = provider.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].prompt.contains("десять"));
    // 10 words * 0.6 = 6 words kept
    assert!(requests[1].prompt.contains("один два три четыре пять шесть"));
    assert!(!requests[1].prompt.contains("семь"));
}

/// Every chunk failing means the job reports no terms
#[tokio::test]
async fn test_run_backendDown_shouldFailWithNoTerms() {
    let provider = MockProvider::failing();
    let pipeline = common::heuristic_pipeline(Arc::new(provider.clone()), common::fast_policy(), 4000);
    let progress = JobProgress::new();

    let error = pipeline
        .run(&common::paragraphs(9, 4000, 'a'), "БАС", &progress, &CancellationFlag::new())
        .await
        .unwrap_err();

    assert_eq!(error, ExtractionError::AllChunksFailed(3));
    // first attempt plus two retries per chunk
    assert_eq!(provider.request_count(), 9);
    assert_eq!(progress.state(), JobState::Failed(ExtractionError::AllChunksFailed(3)));
}
