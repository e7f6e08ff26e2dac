pub mod cancel;
pub mod mode;
pub mod orchestrator;
pub mod phase;
pub mod result;

pub use cancel::CancellationFlag;
pub use mode::RunMode;
pub use orchestrator::{AuditOrchestrator, Collaborators, RunError, RunSettings, RunSummary};
pub use phase::RunPhase;
pub use result::{AuditResult, FailedGroup, GroupProgress, SkippedGroup};
