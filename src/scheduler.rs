//! Request-coalescing batch scheduler.
//!
//! Individual `predict` calls are queued and a background worker groups
//! them into batches bounded by `max_batch_size` and `max_latency`, then
//! runs the scoring function once per batch. Each caller gets back an
//! `oneshot::Receiver` standing in for the original's `asyncio.Future`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::error::{SchedulerError, ServiceError};
use crate::types::{FeatureRow, Prediction};

struct QueueItem {
    row: FeatureRow,
    respond_to: oneshot::Sender<Result<Prediction, SchedulerError>>,
    received_at: Instant,
}

/// A boxed, thread-offloadable scoring function: `Batch[Row] -> Batch[Prediction]`.
///
/// Invoked via `spawn_blocking` since the bundled scorer holds a
/// synchronous device lock for the duration of the call. Returns a
/// `Result` rather than a bare `Vec` so that whatever this closure wraps
/// around the registry lookup — most notably a circuit breaker — can
/// surface its real error instead of being squashed into a generic
/// scoring failure. One call here is one breaker transaction: the
/// breaker belongs inside this closure, guarding exactly the batch-sized
/// invocation the scheduler makes, not each caller's individual request.
pub type PredictionFn =
    Arc<dyn Fn(&[FeatureRow]) -> Result<Vec<Prediction>, ServiceError> + Send + Sync>;

/// Aggregates individual requests into batches for a single scoring function.
pub struct BatchScheduler {
    sender: parking_lot::Mutex<Option<mpsc::Sender<QueueItem>>>,
    prediction_fn: PredictionFn,
    max_batch_size: usize,
    max_latency: Duration,
    worker: parking_lot::Mutex<Option<JoinHandle<()>>>,
    shutdown: Arc<AtomicBool>,
    receiver: parking_lot::Mutex<Option<mpsc::Receiver<QueueItem>>>,
}

impl BatchScheduler {
    pub fn new(
        prediction_fn: PredictionFn,
        max_batch_size: usize,
        max_latency: Duration,
        max_queue_size: usize,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(max_queue_size);
        Self {
            sender: parking_lot::Mutex::new(Some(sender)),
            prediction_fn,
            max_batch_size,
            max_latency,
            worker: parking_lot::Mutex::new(None),
            shutdown: Arc::new(AtomicBool::new(false)),
            receiver: parking_lot::Mutex::new(Some(receiver)),
        }
    }

    /// Start the background worker loop. Idempotent: calling twice has no effect.
    pub fn start(self: &Arc<Self>) {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return;
        }
        let receiver = self
            .receiver
            .lock()
            .take()
            .expect("scheduler receiver already taken");
        let this = Arc::clone(self);
        *worker = Some(tokio::spawn(async move { this.worker_loop(receiver).await }));
        info!(max_batch_size = self.max_batch_size, "batch scheduler started");
    }

    /// Signal shutdown, close the queue, and wait for the worker to drain
    /// and exit.
    ///
    /// Dropping the sole `Sender` closes the channel, so a worker parked
    /// in `receiver.recv().await` with an empty queue (the ordinary,
    /// idle case) wakes immediately with `None` instead of blocking
    /// forever — `recv()` has no timeout and the worker only re-checks
    /// the shutdown flag between batches, so without closing the channel
    /// there is nothing to wake it.
    pub async fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.sender.lock().take();
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
            info!("batch scheduler stopped");
        }
    }

    /// Submit a single row and await its prediction. Returns `QueueFull`
    /// synchronously (mirroring `asyncio.QueueFull`) rather than blocking
    /// the caller when the queue is saturated, or `SchedulerStopped` if
    /// the scheduler has already been asked to shut down.
    pub async fn predict(&self, row: FeatureRow) -> Result<Prediction, SchedulerError> {
        let (respond_to, rx) = oneshot::channel();
        let item = QueueItem {
            row,
            respond_to,
            received_at: Instant::now(),
        };
        {
            let sender = self.sender.lock();
            match sender.as_ref() {
                Some(sender) => sender.try_send(item).map_err(|err| match err {
                    TrySendError::Full(_) => SchedulerError::QueueFull,
                    TrySendError::Closed(_) => SchedulerError::SchedulerStopped,
                })?,
                None => return Err(SchedulerError::SchedulerStopped),
            }
        }
        rx.await
            .unwrap_or(Err(SchedulerError::SchedulerStopped))
    }

    async fn worker_loop(&self, mut receiver: mpsc::Receiver<QueueItem>) {
        while !self.shutdown.load(Ordering::SeqCst) {
            let first_item = match receiver.recv().await {
                Some(item) => item,
                None => break,
            };

            let mut batch = Vec::with_capacity(self.max_batch_size);
            let deadline = first_item.received_at + self.max_latency;
            batch.push(first_item);

            while batch.len() < self.max_batch_size {
                let now = Instant::now();
                if now < deadline {
                    match tokio::time::timeout(deadline - now, receiver.recv()).await {
                        Ok(Some(item)) => batch.push(item),
                        Ok(None) => break,
                        Err(_) => break, // deadline elapsed while waiting
                    }
                } else {
                    // Behind schedule: grab whatever is immediately available
                    // to maximize throughput instead of waiting further.
                    match receiver.try_recv() {
                        Ok(item) => batch.push(item),
                        Err(_) => break,
                    }
                }
            }

            self.process_batch(batch).await;
        }

        // Drain and fail anything left in the channel so no caller hangs forever.
        while let Ok(item) = receiver.try_recv() {
            let _ = item.respond_to.send(Err(SchedulerError::SchedulerStopped));
        }
    }

    async fn process_batch(&self, batch: Vec<QueueItem>) {
        let rows: Vec<FeatureRow> = batch.iter().map(|item| item.row.clone()).collect();
        let prediction_fn = Arc::clone(&self.prediction_fn);

        let result = tokio::task::spawn_blocking(move || prediction_fn(&rows)).await;

        match result {
            Ok(Ok(predictions)) if predictions.len() == batch.len() => {
                for (item, prediction) in batch.into_iter().zip(predictions.into_iter()) {
                    let _ = item.respond_to.send(Ok(prediction));
                }
            }
            Ok(Ok(predictions)) => {
                error!(
                    expected = batch.len(),
                    got = predictions.len(),
                    "scoring function returned a mismatched batch size"
                );
                let err = SchedulerError::ScoringFailed(
                    "scoring function returned a mismatched batch size".to_string(),
                );
                for item in batch {
                    let _ = item.respond_to.send(Err(err.clone()));
                }
            }
            Ok(Err(upstream_err)) => {
                error!(error = %upstream_err, "batch prediction failed");
                let err = SchedulerError::Upstream(upstream_err);
                for item in batch {
                    let _ = item.respond_to.send(Err(err.clone()));
                }
            }
            Err(join_err) => {
                error!(error = %join_err, "batch prediction panicked");
                let err = SchedulerError::ScoringFailed(join_err.to_string());
                for item in batch {
                    let _ = item.respond_to.send(Err(err.clone()));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn row_with(key: &str, value: f64) -> FeatureRow {
        let mut row = FeatureRow::new();
        row.insert(key.to_string(), value);
        row
    }

    fn echo_fn() -> PredictionFn {
        Arc::new(|rows: &[FeatureRow]| {
            Ok(rows
                .iter()
                .map(|row| {
                    let v = row.get("v").copied().unwrap_or(0.0);
                    Prediction::from_probability(v, "v1".to_string())
                })
                .collect())
        })
    }

    #[tokio::test]
    async fn single_request_round_trips() {
        let scheduler = Arc::new(BatchScheduler::new(
            echo_fn(),
            8,
            Duration::from_millis(10),
            16,
        ));
        scheduler.start();

        let result = scheduler.predict(row_with("v", 0.9)).await.unwrap();
        assert!((result.probability - 0.9).abs() < 1e-9);

        scheduler.stop().await;
    }

    #[tokio::test]
    async fn concurrent_requests_are_coalesced_and_all_resolve() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let counted_fn: PredictionFn = {
            let call_count = Arc::clone(&call_count);
            Arc::new(move |rows: &[FeatureRow]| {
                call_count.fetch_add(1, Ordering::SeqCst);
                Ok(rows
                    .iter()
                    .map(|row| {
                        let v = row.get("v").copied().unwrap_or(0.0);
                        Prediction::from_probability(v, "v1".to_string())
                    })
                    .collect())
            })
        };

        let scheduler = Arc::new(BatchScheduler::new(
            counted_fn,
            32,
            Duration::from_millis(50),
            1024,
        ));
        scheduler.start();

        let mut handles = Vec::new();
        for i in 0..16 {
            let scheduler = Arc::clone(&scheduler);
            let v = if i % 2 == 0 { 0.9 } else { 0.1 };
            handles.push(tokio::spawn(async move {
                scheduler.predict(row_with("v", v)).await.unwrap()
            }));
        }

        for handle in handles {
            let _ = handle.await.unwrap();
        }

        // With a 50ms window, 16 roughly-concurrent submissions should
        // coalesce into far fewer than 16 scoring calls.
        assert!(call_count.load(Ordering::SeqCst) < 16);

        scheduler.stop().await;
    }

    #[tokio::test]
    async fn queue_full_is_reported_synchronously() {
        let slow_fn: PredictionFn = Arc::new(|rows: &[FeatureRow]| {
            std::thread::sleep(Duration::from_millis(200));
            Ok(rows
                .iter()
                .map(|_| Prediction::from_probability(0.5, "v1".to_string()))
                .collect())
        });

        let scheduler = Arc::new(BatchScheduler::new(slow_fn, 1, Duration::from_millis(5), 1));
        scheduler.start();

        // Saturate the single-slot queue while the worker is busy on the first item.
        let _first = {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move { scheduler.predict(row_with("v", 0.1)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        let _second = {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move { scheduler.predict(row_with("v", 0.2)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let overflow = scheduler.predict(row_with("v", 0.3)).await;
        assert!(matches!(overflow, Err(SchedulerError::QueueFull)));

        scheduler.stop().await;
    }

    #[tokio::test]
    async fn stop_returns_promptly_when_the_worker_is_idle() {
        // The worker is parked in `receiver.recv().await` with nothing
        // queued — this is the ordinary shutdown path (idle service, or
        // any caller that awaits its predictions before stopping) and
        // must not hang.
        let scheduler = Arc::new(BatchScheduler::new(echo_fn(), 8, Duration::from_millis(10), 16));
        scheduler.start();
        tokio::time::sleep(Duration::from_millis(10)).await;

        tokio::time::timeout(Duration::from_secs(1), scheduler.stop())
            .await
            .expect("stop() must return promptly on an idle scheduler");
    }

    #[tokio::test]
    async fn submissions_after_stop_are_rejected_with_scheduler_stopped() {
        let scheduler = Arc::new(BatchScheduler::new(echo_fn(), 8, Duration::from_millis(10), 16));
        scheduler.start();
        scheduler.stop().await;

        let result = scheduler.predict(row_with("v", 0.5)).await;
        assert!(matches!(result, Err(SchedulerError::SchedulerStopped)));
    }
}
