pub mod audit;
pub mod aws;
pub mod catalog;
pub mod config;
pub mod cost;
pub mod error;
pub mod report;
pub mod retention;
pub mod retry;
pub mod service;
pub mod testing;

pub use audit::{
    AuditOrchestrator, AuditResult, CancellationFlag, Collaborators, FailedGroup, RunError,
    RunMode, RunPhase, RunSettings, RunSummary, SkippedGroup,
};
pub use aws::{CloudWatchLogsClient, CredentialSource, Credentials, StsClient};
pub use catalog::{CatalogError, LogGroupCatalog, LogGroupRecord};
pub use config::{load_keeper_config, KeeperConfig};
pub use cost::{CostEstimate, CostModel};
pub use error::{ConfigError, Result};
pub use report::{render_report, FileReportWriter, ReportWriteError, ReportWriter};
pub use retention::{classify, EnforcementOutcome, RetentionDecision, RetentionEnforcer};
pub use retry::RetryPolicy;
pub use service::{IdentityService, LogService, ServiceError};
