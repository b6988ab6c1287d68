//! End-to-end scheduler scenarios from the design's concrete test list.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ml_inference_gateway::error::SchedulerError;
use ml_inference_gateway::scheduler::{BatchScheduler, PredictionFn};
use ml_inference_gateway::types::{FeatureRow, Prediction};

fn row(value: f64) -> FeatureRow {
    let mut row = FeatureRow::new();
    row.insert("v".to_string(), value);
    row
}

fn counting_identity_fn(calls: Arc<AtomicUsize>) -> PredictionFn {
    Arc::new(move |rows: &[FeatureRow]| {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(rows
            .iter()
            .map(|r| Prediction::from_probability(r.get("v").copied().unwrap_or(0.0), "v1".to_string()))
            .collect())
    })
}

#[tokio::test]
async fn coalesced_batch_invokes_scorer_exactly_once_for_eight_concurrent_rows() {
    let calls = Arc::new(AtomicUsize::new(0));
    let scheduler = Arc::new(BatchScheduler::new(
        counting_identity_fn(Arc::clone(&calls)),
        8,
        Duration::from_millis(10),
        64,
    ));
    scheduler.start();

    let mut handles = Vec::new();
    for i in 0..8 {
        let scheduler = Arc::clone(&scheduler);
        handles.push(tokio::spawn(async move {
            scheduler.predict(row(i as f64 / 10.0)).await.unwrap()
        }));
    }

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(results.len(), 8);
    for (i, prediction) in results.iter().enumerate() {
        assert!((prediction.probability - i as f64 / 10.0).abs() < 1e-9);
    }

    scheduler.stop().await;
}

#[tokio::test]
async fn deadline_flush_completes_batch_of_three_near_max_latency() {
    let calls = Arc::new(AtomicUsize::new(0));
    let scheduler = Arc::new(BatchScheduler::new(
        counting_identity_fn(Arc::clone(&calls)),
        8,
        Duration::from_millis(10),
        64,
    ));
    scheduler.start();

    let start = Instant::now();
    let mut handles = Vec::new();
    for i in 0..3 {
        let scheduler = Arc::clone(&scheduler);
        handles.push(tokio::spawn(async move {
            scheduler.predict(row(i as f64)).await.unwrap()
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }
    let elapsed = start.elapsed();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    // The batch should flush at or just after the 10ms deadline, not
    // immediately and not long after.
    assert!(elapsed >= Duration::from_millis(9));
    assert!(elapsed < Duration::from_millis(100));

    scheduler.stop().await;
}

#[tokio::test]
async fn overload_rejects_fifth_submission_synchronously_while_first_four_resolve() {
    let slow_fn: PredictionFn = Arc::new(|rows: &[FeatureRow]| {
        std::thread::sleep(Duration::from_millis(150));
        Ok(rows
            .iter()
            .map(|_| Prediction::from_probability(0.5, "v1".to_string()))
            .collect())
    });

    let scheduler = Arc::new(BatchScheduler::new(slow_fn, 1, Duration::from_millis(5), 4));
    scheduler.start();

    // First submission is popped into the in-flight batch immediately,
    // leaving the 4-slot queue free to accept four more before it's full.
    let mut handles = Vec::new();
    for i in 0..5 {
        let scheduler = Arc::clone(&scheduler);
        handles.push(tokio::spawn(async move { (i, scheduler.predict(row(i as f64)).await) }));
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let mut queue_full_count = 0;
    let mut resolved_count = 0;
    for handle in handles {
        let (_, result) = handle.await.unwrap();
        match result {
            Ok(_) => resolved_count += 1,
            Err(SchedulerError::QueueFull) => queue_full_count += 1,
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert!(queue_full_count >= 1, "at least one submission should overflow");
    assert!(resolved_count >= 1, "earlier submissions should still resolve");

    scheduler.stop().await;
}

#[tokio::test]
async fn shared_failure_rejects_every_item_in_the_batch() {
    let failing_fn: PredictionFn = Arc::new(|_rows: &[FeatureRow]| {
        panic!("scoring function blew up");
    });

    let scheduler = Arc::new(BatchScheduler::new(failing_fn, 4, Duration::from_millis(10), 16));
    scheduler.start();

    let mut handles = Vec::new();
    for i in 0..4 {
        let scheduler = Arc::clone(&scheduler);
        handles.push(tokio::spawn(async move { scheduler.predict(row(i as f64)).await }));
    }

    for handle in handles {
        let result = handle.await.unwrap();
        assert!(matches!(result, Err(SchedulerError::ScoringFailed(_))));
    }

    scheduler.stop().await;
}
