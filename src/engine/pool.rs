// Bounded-concurrency executor for probe fan-out. Outcomes are correlated
// back to their unit by index; completion order carries no meaning.
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error};

use crate::engine::run::RunState;
use crate::probe::ProbeOutcome;

/// One unit of probe work. Nothing runs until the pool polls it.
pub type ProbeUnit = Pin<Box<dyn Future<Output = ProbeOutcome> + Send + 'static>>;

pub struct WorkerPool;

impl WorkerPool {
    /// Box a future into a probe unit.
    pub fn unit<F>(fut: F) -> ProbeUnit
    where
        F: Future<Output = ProbeOutcome> + Send + 'static,
    {
        Box::pin(fut)
    }

    /// Run a batch of units with at most `concurrency` in flight. Before a
    /// unit starts, the run's cancellation flag is checked; units that never
    /// start are recorded as skipped. Started units always drain — in-flight
    /// network calls finish rather than leak, at the cost of bounded extra
    /// latency after a cancellation request.
    pub async fn run_batch(
        units: Vec<ProbeUnit>,
        concurrency: usize,
        run: Arc<RunState>,
    ) -> Vec<(usize, ProbeOutcome)> {
        if units.is_empty() {
            return Vec::new();
        }

        debug!(
            "Running batch of {} units with max concurrency {}",
            units.len(),
            concurrency
        );

        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let (tx, mut rx) = mpsc::channel(units.len());
        let mut handles = Vec::with_capacity(units.len());

        for (index, unit) in units.into_iter().enumerate() {
            let tx = tx.clone();
            let semaphore = semaphore.clone();
            let run = run.clone();

            handles.push(tokio::spawn(async move {
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => return,
                };

                let outcome = if run.is_cancelled() {
                    debug!("Unit {} not attempted: cancellation requested", index);
                    ProbeOutcome::skipped()
                } else {
                    unit.await
                };

                // Capacity equals the unit count, so this never blocks.
                let _ = tx.send((index, outcome)).await;
            }));
        }
        drop(tx);

        for handle in handles {
            if let Err(e) = handle.await {
                error!("Probe unit panicked: {}", e);
            }
        }

        let mut outcomes = Vec::new();
        while let Some(item) = rx.recv().await {
            outcomes.push(item);
        }
        outcomes
    }
}
