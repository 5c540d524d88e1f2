pub mod pool;
pub mod run;

pub use pool::{ProbeUnit, WorkerPool};
pub use run::{EnginePhase, ProbeEngine, RunContext, RunHandle, RunObserver, RunState};
