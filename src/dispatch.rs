//! Batch dispatcher for advisory requests.
//!
//! Turns an arbitrary-length package list into a bounded number of
//! concurrent strategy invocations and streams results back incrementally.
//!
//! Packages are dequeued FIFO and accumulated into batches of at most
//! `max_batch_length`. A ready batch becomes one "flight": the in-flight
//! counter grows by the batch size, the strategy invocation joins the
//! outstanding set, and the counter shrinks again when that invocation
//! settles. When the counter is at or above `max_sending` the dispatcher
//! waits for the earliest-finishing outstanding flight before launching
//! more. Artifact groups are delivered in batch-completion order, not
//! enqueue order; consumers key results by package identity, not position.
//!
//! The original event-loop generator shape is rendered here as a producer
//! task feeding a bounded channel: the consumer pulls groups until the
//! channel closes (normal completion) or an error item arrives (abnormal
//! completion).

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::ScanError;
use crate::model::{Package, RawArtifact};
use crate::strategy::FetchStrategy;

/// Limits for one dispatch run.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Maximum number of packages allowed to belong to unresolved flights.
    pub max_sending: usize,
    /// Maximum number of packages grouped into one strategy invocation.
    pub max_batch_length: usize,
}

/// A settled flight: the batch size it accounted for, and its outcome.
type Settled = (usize, Result<Vec<RawArtifact>, ScanError>);

type FlightFuture = Pin<Box<dyn Future<Output = Settled> + Send>>;

/// Runs the batching loop on a background task and returns the receiving
/// end of the group stream.
///
/// Every received group is non-empty. An `Err` item terminates the stream;
/// groups received before it stay valid. The stream is finite and not
/// restartable; call again for a new package list.
pub fn dispatch(
    packages: Vec<Package>,
    strategy: Arc<dyn FetchStrategy>,
    config: DispatchConfig,
) -> mpsc::Receiver<Result<Vec<RawArtifact>, ScanError>> {
    let (tx, rx) = mpsc::channel(1);

    tokio::spawn(async move {
        if let Err(error) = run(packages, strategy, &config, &tx).await {
            let _ = tx.send(Err(error)).await;
        }
    });

    rx
}

async fn run(
    packages: Vec<Package>,
    strategy: Arc<dyn FetchStrategy>,
    config: &DispatchConfig,
    tx: &mpsc::Sender<Result<Vec<RawArtifact>, ScanError>>,
) -> Result<(), ScanError> {
    let mut queue: VecDeque<Package> = packages.into();
    let mut batch: Vec<Package> = Vec::with_capacity(config.max_batch_length);
    let mut flights = Flights::new(Arc::clone(&strategy), config.max_sending);

    while let Some(package) = queue.pop_front() {
        batch.push(package);

        if batch.len() >= config.max_batch_length {
            flights.launch(&mut batch).await?;

            if let Some(group) = flights.take_group() {
                if tx.send(Ok(group)).await.is_err() {
                    // Consumer went away; stop producing.
                    return Ok(());
                }
            }
        }
    }

    if !batch.is_empty() {
        flights.launch(&mut batch).await?;
    }

    flights.drain().await?;

    if let Some(group) = flights.take_group() {
        let _ = tx.send(Ok(group)).await;
    }

    Ok(())
}

/// Concurrency accounting for the dispatcher: the outstanding invocation
/// set, the package-granular in-flight counter, and the artifact buffer
/// completed flights fold into.
struct Flights {
    strategy: Arc<dyn FetchStrategy>,
    max_sending: usize,
    in_flight: usize,
    outstanding: FuturesUnordered<FlightFuture>,
    buffer: Vec<RawArtifact>,
}

impl Flights {
    fn new(strategy: Arc<dyn FetchStrategy>, max_sending: usize) -> Self {
        Self {
            strategy,
            max_sending,
            in_flight: 0,
            outstanding: FuturesUnordered::new(),
            buffer: Vec::new(),
        }
    }

    /// Launches the accumulated batch as one strategy invocation, clearing
    /// the batch.
    ///
    /// When the in-flight counter is at the cap this first waits for one
    /// outstanding flight to settle. An empty outstanding set at that point
    /// is an accounting fault and fails the dispatch rather than proceeding
    /// over the cap.
    async fn launch(&mut self, batch: &mut Vec<Package>) -> Result<(), ScanError> {
        let purls: Vec<String> = batch.drain(..).map(|p| p.purl()).collect();
        let size = purls.len();
        self.in_flight += size;

        if self.in_flight >= self.max_sending {
            match self.outstanding.next().await {
                Some(settled) => self.settle(settled)?,
                None => {
                    return Err(ScanError::FlightAccounting {
                        in_flight: self.in_flight,
                        max_sending: self.max_sending,
                    });
                }
            }
        }

        debug!(size, in_flight = self.in_flight, "starting flight");

        let strategy = Arc::clone(&self.strategy);
        self.outstanding.push(Box::pin(async move {
            let result = strategy.fetch(&purls).await;
            (size, result)
        }));

        Ok(())
    }

    /// Awaits every outstanding flight.
    async fn drain(&mut self) -> Result<(), ScanError> {
        while let Some(settled) = self.outstanding.next().await {
            self.settle(settled)?;
        }
        Ok(())
    }

    fn settle(&mut self, (size, result): Settled) -> Result<(), ScanError> {
        self.in_flight -= size;
        self.buffer.extend(result?);
        Ok(())
    }

    /// Swaps the buffer out for an empty one; `None` if nothing arrived
    /// since the last take.
    fn take_group(&mut self) -> Option<Vec<RawArtifact>> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buffer))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Package;
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records every batch it sees and tracks how many fetches overlap.
    struct RecordingStrategy {
        batches: Mutex<Vec<Vec<String>>>,
        running: AtomicUsize,
        high_water: AtomicUsize,
        delay: Duration,
        fail_with: Option<StatusCode>,
    }

    impl RecordingStrategy {
        fn new() -> Self {
            Self {
                batches: Mutex::new(Vec::new()),
                running: AtomicUsize::new(0),
                high_water: AtomicUsize::new(0),
                delay: Duration::from_millis(5),
                fail_with: None,
            }
        }

        fn failing(status: StatusCode) -> Self {
            Self {
                fail_with: Some(status),
                ..Self::new()
            }
        }

        fn recorded_batches(&self) -> Vec<Vec<String>> {
            self.batches.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl FetchStrategy for RecordingStrategy {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn fetch(&self, purls: &[String]) -> Result<Vec<RawArtifact>, ScanError> {
            let now = self.running.fetch_add(purls.len(), Ordering::SeqCst) + purls.len();
            self.high_water.fetch_max(now, Ordering::SeqCst);

            self.batches.lock().unwrap().push(purls.to_vec());
            tokio::time::sleep(self.delay).await;

            self.running.fetch_sub(purls.len(), Ordering::SeqCst);

            if let Some(status) = self.fail_with {
                return Err(ScanError::Status { status });
            }

            Ok(purls
                .iter()
                .map(|purl| {
                    serde_json::from_str(&format!(
                        r#"{{"inputPurl":"{purl}","alerts":[]}}"#
                    ))
                    .unwrap()
                })
                .collect())
        }
    }

    fn packages(count: usize) -> Vec<Package> {
        (0..count)
            .map(|i| Package::new(format!("pkg-{i}"), "1.0.0"))
            .collect()
    }

    async fn collect_groups(
        mut rx: mpsc::Receiver<Result<Vec<RawArtifact>, ScanError>>,
    ) -> Vec<Result<Vec<RawArtifact>, ScanError>> {
        let mut groups = Vec::new();
        while let Some(group) = rx.recv().await {
            groups.push(group);
        }
        groups
    }

    #[tokio::test]
    async fn test_every_package_sent_exactly_once() {
        let strategy = Arc::new(RecordingStrategy::new());
        let rx = dispatch(
            packages(7),
            strategy.clone(),
            DispatchConfig {
                max_sending: 10,
                max_batch_length: 3,
            },
        );
        let groups = collect_groups(rx).await;

        let batches = strategy.recorded_batches();
        assert_eq!(batches.len(), 3); // ceil(7 / 3)
        let mut sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![1, 3, 3]);

        let mut sent: Vec<String> = batches.into_iter().flatten().collect();
        sent.sort();
        let mut expected: Vec<String> = packages(7).iter().map(Package::purl).collect();
        expected.sort();
        assert_eq!(sent, expected);

        let delivered: usize = groups.iter().map(|g| g.as_ref().unwrap().len()).sum();
        assert_eq!(delivered, 7);
    }

    #[tokio::test]
    async fn test_batches_preserve_queue_order() {
        let strategy = Arc::new(RecordingStrategy::new());
        let rx = dispatch(
            packages(4),
            strategy.clone(),
            DispatchConfig {
                max_sending: 10,
                max_batch_length: 2,
            },
        );
        collect_groups(rx).await;

        // Record order across flights is completion-order, so key the
        // batches by their first member instead.
        let batches = strategy.recorded_batches();
        let batch_of = |purl: &str| {
            batches
                .iter()
                .find(|batch| batch.iter().any(|p| p == purl))
                .unwrap()
                .clone()
        };
        assert_eq!(
            batch_of("pkg:npm/pkg-0@1.0.0"),
            vec!["pkg:npm/pkg-0@1.0.0", "pkg:npm/pkg-1@1.0.0"]
        );
        assert_eq!(
            batch_of("pkg:npm/pkg-2@1.0.0"),
            vec!["pkg:npm/pkg-2@1.0.0", "pkg:npm/pkg-3@1.0.0"]
        );
    }

    #[tokio::test]
    async fn test_in_flight_stays_under_cap() {
        let strategy = Arc::new(RecordingStrategy::new());
        let rx = dispatch(
            packages(20),
            strategy.clone(),
            DispatchConfig {
                max_sending: 3,
                max_batch_length: 1,
            },
        );
        collect_groups(rx).await;

        assert!(strategy.high_water.load(Ordering::SeqCst) <= 3);
        assert_eq!(strategy.recorded_batches().len(), 20);
    }

    #[tokio::test]
    async fn test_empty_input_yields_nothing() {
        let strategy = Arc::new(RecordingStrategy::new());
        let rx = dispatch(
            Vec::new(),
            strategy.clone(),
            DispatchConfig {
                max_sending: 10,
                max_batch_length: 3,
            },
        );
        let groups = collect_groups(rx).await;

        assert!(groups.is_empty());
        assert!(strategy.recorded_batches().is_empty());
    }

    #[tokio::test]
    async fn test_groups_flush_per_completed_batch() {
        // cap 3 with batch 2: every launch past the first waits for the
        // previous flight, so each full batch drains as its own group.
        let strategy = Arc::new(RecordingStrategy::new());
        let rx = dispatch(
            packages(6),
            strategy.clone(),
            DispatchConfig {
                max_sending: 3,
                max_batch_length: 2,
            },
        );
        let groups = collect_groups(rx).await;

        assert_eq!(groups.len(), 3);
        for group in &groups {
            assert_eq!(group.as_ref().unwrap().len(), 2);
        }
    }

    #[tokio::test]
    async fn test_partial_final_batch_arrives_in_closing_group() {
        let strategy = Arc::new(RecordingStrategy::new());
        let rx = dispatch(
            packages(3),
            strategy.clone(),
            DispatchConfig {
                max_sending: 10,
                max_batch_length: 2,
            },
        );
        let groups = collect_groups(rx).await;

        let batches = strategy.recorded_batches();
        let mut sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![1, 2]);

        let delivered: usize = groups.iter().map(|g| g.as_ref().unwrap().len()).sum();
        assert_eq!(delivered, 3);
    }

    #[tokio::test]
    async fn test_failing_flight_aborts_the_stream() {
        let strategy = Arc::new(RecordingStrategy::failing(
            StatusCode::INTERNAL_SERVER_ERROR,
        ));
        let rx = dispatch(
            packages(1),
            strategy.clone(),
            DispatchConfig {
                max_sending: 10,
                max_batch_length: 1,
            },
        );
        let groups = collect_groups(rx).await;

        assert_eq!(groups.len(), 1);
        let error = groups.into_iter().next().unwrap().unwrap_err();
        assert!(error.to_string().contains("500"));
    }

    #[tokio::test]
    async fn test_batch_longer_than_cap_faults_fast() {
        // A batch of 5 against a cap of 3 hits the cap with nothing
        // outstanding to wait on.
        let strategy = Arc::new(RecordingStrategy::new());
        let rx = dispatch(
            packages(5),
            strategy.clone(),
            DispatchConfig {
                max_sending: 3,
                max_batch_length: 5,
            },
        );
        let groups = collect_groups(rx).await;

        assert_eq!(groups.len(), 1);
        let error = groups.into_iter().next().unwrap().unwrap_err();
        assert!(matches!(
            error,
            ScanError::FlightAccounting {
                in_flight: 5,
                max_sending: 3
            }
        ));
        assert!(strategy.recorded_batches().is_empty());
    }
}
