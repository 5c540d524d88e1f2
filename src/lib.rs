pub mod analyzers;
pub mod config;
pub mod engine;
pub mod error;
pub mod finding;
pub mod probe;
pub mod report;
pub mod target;

// Re-export main types for easier access
pub use config::Config;
pub use engine::{EnginePhase, ProbeEngine, RunHandle, RunObserver, RunState};
pub use error::{EngineError, EngineResult};
pub use finding::{Finding, FindingData, FindingKind, FindingStatus, ResultStore};
pub use probe::{ProbeOutcome, Prober};
pub use report::Report;
pub use target::{Target, TargetKind};
