// Orchestrator: iterates targets sequentially off the caller's thread,
// delegates each to its analyzer, and folds the findings into the store.
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::analyzers;
use crate::config::Config;
use crate::error::{EngineError, EngineResult};
use crate::finding::{Finding, ResultStore};
use crate::probe::Prober;
use crate::target::Target;

/// Engine lifecycle. Terminal phases still accept a new run; only `Running`
/// rejects one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    Idle,
    Running,
    Completed,
    Cancelled,
    Fatal,
}

/// Shared state for one collection run. The only state mutated across
/// worker boundaries; everything goes through atomics.
pub struct RunState {
    cancelled: AtomicBool,
    targets_total: usize,
    targets_completed: AtomicUsize,
}

impl RunState {
    pub fn new(targets_total: usize) -> Self {
        Self {
            cancelled: AtomicBool::new(false),
            targets_total,
            targets_completed: AtomicUsize::new(0),
        }
    }

    pub fn request_cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn targets_total(&self) -> usize {
        self.targets_total
    }

    pub fn targets_completed(&self) -> usize {
        self.targets_completed.load(Ordering::SeqCst)
    }

    /// Monotonically increments the completed count, never past the total.
    pub fn mark_completed(&self) -> usize {
        let prev = self
            .targets_completed
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                if n < self.targets_total {
                    Some(n + 1)
                } else {
                    None
                }
            });
        match prev {
            Ok(n) => n + 1,
            Err(n) => n,
        }
    }

    pub fn progress_percent(&self) -> f32 {
        if self.targets_total == 0 {
            return 100.0;
        }
        (self.targets_completed() as f32 / self.targets_total as f32) * 100.0
    }
}

/// Receiver for live run updates. Invoked from the single engine task, so
/// calls are serialized; implementations still need to be `Send + Sync`
/// because the task runs off the caller's thread.
pub trait RunObserver: Send + Sync {
    fn on_progress(&self, _percent: f32, _label: &str) {}
    fn on_finding(&self, _finding: &Finding) {}
}

/// Observer that discards everything.
pub struct NullObserver;

impl RunObserver for NullObserver {}

/// Everything an analyzer needs to do its work.
pub struct RunContext {
    pub prober: Arc<dyn Prober>,
    pub config: Config,
    pub state: Arc<RunState>,
    pub observer: Arc<dyn RunObserver>,
}

/// Handle to an in-flight (or finished) run.
pub struct RunHandle {
    id: Uuid,
    state: Arc<RunState>,
    phase: Arc<Mutex<EnginePhase>>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl RunHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> Arc<RunState> {
        self.state.clone()
    }

    /// Request cooperative cancellation. Idempotent; safe after completion.
    pub fn cancel(&self) {
        self.state.request_cancel();
    }

    /// Wait for the run to finish. Returns immediately on repeated calls.
    pub async fn wait(&self) {
        let handle = self.join.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Run task failed: {}", e);
                *self.phase.lock() = EnginePhase::Fatal;
            }
        }
    }
}

pub struct ProbeEngine {
    prober: Arc<dyn Prober>,
    config: Config,
    observer: Arc<dyn RunObserver>,
    store: Arc<ResultStore>,
    phase: Arc<Mutex<EnginePhase>>,
}

impl ProbeEngine {
    pub fn new(config: Config, prober: Arc<dyn Prober>) -> Self {
        Self {
            prober,
            config,
            observer: Arc::new(NullObserver),
            store: Arc::new(ResultStore::new()),
            phase: Arc::new(Mutex::new(EnginePhase::Idle)),
        }
    }

    /// Engine backed by real network probes.
    pub fn with_network(config: Config) -> anyhow::Result<Self> {
        let prober = crate::probe::net::NetProber::new(&config.user_agent, config.timeout())?;
        Ok(Self::new(config, Arc::new(prober)))
    }

    pub fn with_observer(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn phase(&self) -> EnginePhase {
        *self.phase.lock()
    }

    pub fn store(&self) -> Arc<ResultStore> {
        self.store.clone()
    }

    /// Start a collection run. Fails fast with an engine error when a run is
    /// already active, the configuration is invalid, or no targets were
    /// submitted; those are the only fatal surfaces.
    pub fn start_run(&self, targets: Vec<Target>) -> EngineResult<RunHandle> {
        self.config.validate()?;
        if targets.is_empty() {
            return Err(EngineError::NoTargets);
        }

        {
            let mut phase = self.phase.lock();
            if *phase == EnginePhase::Running {
                return Err(EngineError::RunActive);
            }
            *phase = EnginePhase::Running;
        }

        // Each run starts from an empty store.
        self.store.clear();

        let state = Arc::new(RunState::new(targets.len()));
        let cx = RunContext {
            prober: self.prober.clone(),
            config: self.config.clone(),
            state: state.clone(),
            observer: self.observer.clone(),
        };

        let id = Uuid::new_v4();
        let store = self.store.clone();
        let phase = self.phase.clone();

        info!("Starting collection run {} with {} targets", id, targets.len());
        let task_phase = phase.clone();
        let join = tokio::spawn(async move {
            let outcome = Self::run_loop(targets, cx, store).await;
            *task_phase.lock() = outcome;
        });

        Ok(RunHandle {
            id,
            state,
            phase,
            join: Mutex::new(Some(join)),
        })
    }

    /// Idempotent; a handle from a finished run is safe to cancel.
    pub fn cancel_run(&self, handle: &RunHandle) {
        handle.cancel();
    }

    async fn run_loop(
        targets: Vec<Target>,
        cx: RunContext,
        store: Arc<ResultStore>,
    ) -> EnginePhase {
        let total = targets.len();

        for target in &targets {
            // Cancellation is honored between targets; the current target is
            // always allowed to finish.
            if cx.state.is_cancelled() {
                warn!("Collection cancelled before {}", target);
                cx.observer
                    .on_progress(cx.state.progress_percent(), "Cancelled");
                return EnginePhase::Cancelled;
            }

            info!("Processing {}", target);
            let analyzer = analyzers::for_kind(target.kind);
            let finding = analyzer.analyze(&target.value, &cx).await;

            store.append(finding.clone());
            cx.observer.on_finding(&finding);

            let completed = cx.state.mark_completed();
            cx.observer.on_progress(
                cx.state.progress_percent(),
                &format!("Completed {}/{}", completed, total),
            );
        }

        if cx.state.is_cancelled() {
            warn!("Collection cancelled after {} targets", total);
            EnginePhase::Cancelled
        } else {
            info!("Collection completed: {} findings", store.len());
            cx.observer.on_progress(100.0, "Completed");
            EnginePhase::Completed
        }
    }
}
