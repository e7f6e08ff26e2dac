use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use futures::{StreamExt, TryStreamExt};
use thiserror::Error;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::catalog::{CatalogError, LogGroupCatalog, LogGroupRecord};
use crate::config::KeeperConfig;
use crate::cost::CostModel;
use crate::report::{ReportWriteError, ReportWriter};
use crate::retention::{
    classify, EnforcementOutcome, GroupError, RetentionDecision, RetentionEnforcer, SkipReason,
};
use crate::retry::RetryPolicy;
use crate::service::{IdentityService, LogService, ServiceError};

use super::cancel::CancellationFlag;
use super::phase::{PhaseHistory, RunPhase};
use super::result::{AuditResult, GroupProgress, ResultInputs};
use super::RunMode;

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    CatalogUnavailable(#[from] CatalogError),
    #[error("failed to resolve account identity: {0}")]
    IdentityUnavailable(ServiceError),
    #[error(transparent)]
    ReportWrite(#[from] ReportWriteError),
    #[error("run cancelled during {phase}")]
    Cancelled { phase: RunPhase },
}

impl RunError {
    /// Phase the run was in when it aborted.
    pub fn failed_in(&self) -> RunPhase {
        match self {
            RunError::CatalogUnavailable(_) | RunError::IdentityUnavailable(_) => {
                RunPhase::Cataloging
            }
            RunError::ReportWrite(_) => RunPhase::Reporting,
            RunError::Cancelled { phase } => *phase,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSettings {
    pub mode: RunMode,
    pub target_days: u32,
    pub concurrency: usize,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            mode: RunMode::AuditOnly,
            target_days: 3,
            concurrency: 8,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub result: AuditResult,
    pub report_path: PathBuf,
    pub phases: Vec<RunPhase>,
}

/// External collaborators, constructed once by the caller.
#[derive(Clone)]
pub struct Collaborators {
    pub logs: Arc<dyn LogService>,
    pub identity: Arc<dyn IdentityService>,
    pub writer: Arc<dyn ReportWriter>,
}

/// Drives one pass of catalog, classify, enforce, estimate and report.
pub struct AuditOrchestrator {
    catalog: LogGroupCatalog,
    enforcer: RetentionEnforcer,
    identity: Arc<dyn IdentityService>,
    writer: Arc<dyn ReportWriter>,
    cost: CostModel,
    settings: RunSettings,
    cancellation: CancellationFlag,
    history: Mutex<PhaseHistory>,
}

impl AuditOrchestrator {
    pub fn new(collaborators: Collaborators, settings: RunSettings, retry: RetryPolicy) -> Self {
        let cancellation = CancellationFlag::new();
        let catalog = LogGroupCatalog::new(Arc::clone(&collaborators.logs), retry.clone())
            .with_cancellation(cancellation.clone());
        let enforcer =
            RetentionEnforcer::new(Arc::clone(&collaborators.logs), catalog.clone(), retry)
                .with_cancellation(cancellation.clone());
        Self {
            catalog,
            enforcer,
            identity: collaborators.identity,
            writer: collaborators.writer,
            cost: CostModel::default(),
            settings: RunSettings {
                concurrency: settings.concurrency.max(1),
                ..settings
            },
            cancellation,
            history: Mutex::new(PhaseHistory::new()),
        }
    }

    pub fn from_config(config: &KeeperConfig, collaborators: Collaborators) -> Self {
        let settings = RunSettings {
            mode: config.audit.mode,
            target_days: config.audit.target_retention_days,
            concurrency: config.audit.concurrency,
        };
        let retry = RetryPolicy::new(&config.retry);
        let mut orchestrator = Self::new(collaborators, settings, retry)
            .with_cost_model(CostModel::from_config(&config.cost));
        orchestrator.catalog = orchestrator
            .catalog
            .with_name_prefix(config.audit.name_prefix.clone())
            .with_page_limit(config.audit.page_limit);
        orchestrator.enforcer = orchestrator
            .enforcer
            .with_catalog(orchestrator.catalog.clone());
        orchestrator
    }

    pub fn with_cost_model(mut self, cost: CostModel) -> Self {
        self.cost = cost;
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationFlag) -> Self {
        self.catalog = self.catalog.with_cancellation(cancellation.clone());
        self.enforcer = self
            .enforcer
            .with_catalog(self.catalog.clone())
            .with_cancellation(cancellation.clone());
        self.cancellation = cancellation;
        self
    }

    pub fn with_name_prefix(mut self, prefix: Option<String>) -> Self {
        self.catalog = self.catalog.with_name_prefix(prefix);
        self.enforcer = self.enforcer.with_catalog(self.catalog.clone());
        self
    }

    pub fn settings(&self) -> RunSettings {
        self.settings
    }

    pub fn phase(&self) -> RunPhase {
        self.lock_history().current()
    }

    pub fn phase_history(&self) -> Vec<RunPhase> {
        self.lock_history().phases().to_vec()
    }

    pub async fn run(&self) -> Result<RunSummary, RunError> {
        let run_id = Uuid::new_v4();
        let span = info_span!(
            "audit_run",
            %run_id,
            mode = %self.settings.mode,
            target_days = self.settings.target_days
        );
        self.run_inner(run_id).instrument(span).await
    }

    async fn run_inner(&self, run_id: Uuid) -> Result<RunSummary, RunError> {
        *self.lock_history() = PhaseHistory::new();

        self.advance(RunPhase::Cataloging);
        let (account_id, records) = match self.catalog_phase().await {
            Ok(found) => found,
            Err(err) => return Err(self.fail(err)),
        };
        info!(account_id = %account_id, log_groups = records.len(), "catalog complete");

        self.advance(RunPhase::Classifying);
        let classified: Vec<(LogGroupRecord, RetentionDecision)> = records
            .into_iter()
            .map(|record| {
                let decision = classify(&record);
                (record, decision)
            })
            .collect();

        self.advance(RunPhase::Enforcing);
        let progress = if self.settings.mode.enforces() {
            let candidates = classified
                .iter()
                .filter(|(_, decision)| decision.needs_enforcement())
                .map(|(record, _)| record.clone())
                .collect();
            self.enforce_all(candidates).await
        } else {
            BTreeMap::new()
        };
        let cancelled = progress
            .values()
            .any(|entry| matches!(entry, GroupProgress::NotAttempted));

        self.advance(RunPhase::Estimating);
        let result = AuditResult::assemble(ResultInputs {
            run_id,
            mode: self.settings.mode,
            account_id,
            target_days: self.settings.target_days,
            classified,
            progress,
            cancelled,
            cost: &self.cost,
        });

        self.advance(RunPhase::Reporting);
        let report_path = match self.writer.write(&result).await {
            Ok(path) => path,
            Err(err) => return Err(self.fail(RunError::ReportWrite(err))),
        };

        self.advance(RunPhase::Done);
        info!(
            total = result.total,
            with_retention = result.with_retention,
            without_retention = result.without_retention,
            enforced = result.enforced,
            failed = result.failed.len(),
            savings = %result.estimate.formatted(),
            "audit run finished"
        );
        Ok(RunSummary {
            result,
            report_path,
            phases: self.phase_history(),
        })
    }

    async fn catalog_phase(&self) -> Result<(String, Vec<LogGroupRecord>), RunError> {
        let account_id = self
            .identity
            .caller_account_id()
            .await
            .map_err(RunError::IdentityUnavailable)?;

        let mut records = Vec::new();
        let mut pages = std::pin::pin!(self.catalog.pages());
        loop {
            if self.cancellation.is_cancelled() {
                return Err(RunError::Cancelled {
                    phase: RunPhase::Cataloging,
                });
            }
            match pages.try_next().await {
                Ok(Some(page)) => records.extend(page),
                Ok(None) => break,
                Err(CatalogError::Unavailable { source, .. }) if source.is_cancelled() => {
                    return Err(RunError::Cancelled {
                        phase: RunPhase::Cataloging,
                    });
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok((account_id, records))
    }

    async fn enforce_all(
        &self,
        candidates: Vec<LogGroupRecord>,
    ) -> BTreeMap<String, GroupProgress> {
        let concurrency = self.settings.concurrency;
        futures::stream::iter(candidates)
            .map(|record| async move {
                let progress = self.process_group(&record).await;
                (record.log_group_name, progress)
            })
            .buffer_unordered(concurrency)
            .collect()
            .await
    }

    /// Re-reads the group right before mutating it, since the catalog
    /// snapshot may be stale by now.
    async fn process_group(&self, listed: &LogGroupRecord) -> GroupProgress {
        let identifier = listed.identifier();
        if self.cancellation.is_cancelled() {
            return GroupProgress::NotAttempted;
        }
        let fresh = match self.catalog.describe_one(identifier).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                warn!(log_group = %identifier, "log group disappeared before enforcement");
                return GroupProgress::Completed {
                    record: listed.clone(),
                    outcome: EnforcementOutcome::Skipped(SkipReason::NotFound),
                };
            }
            Err(error) if error.is_cancelled() => return GroupProgress::NotAttempted,
            Err(error) => {
                warn!(log_group = %identifier, error = %error, "detail lookup failed");
                return GroupProgress::Completed {
                    record: listed.clone(),
                    outcome: EnforcementOutcome::Failed(GroupError::DetailLookupFailed(error)),
                };
            }
        };

        match classify(&fresh) {
            RetentionDecision::HasRetention(days) => {
                info!(log_group = %identifier, days, "retention set concurrently, skipping");
                GroupProgress::Completed {
                    record: fresh,
                    outcome: EnforcementOutcome::Skipped(SkipReason::AlreadySet(days)),
                }
            }
            RetentionDecision::NoRetention => {
                if self.cancellation.is_cancelled() {
                    return GroupProgress::NotAttempted;
                }
                match self
                    .enforcer
                    .enforce(identifier, self.settings.target_days)
                    .await
                {
                    EnforcementOutcome::Cancelled => GroupProgress::NotAttempted,
                    outcome => GroupProgress::Completed {
                        record: fresh,
                        outcome,
                    },
                }
            }
        }
    }

    fn advance(&self, next: RunPhase) {
        self.lock_history().advance(next);
    }

    fn fail(&self, err: RunError) -> RunError {
        warn!(error = %err, phase = %self.phase(), "audit run failed");
        self.advance(RunPhase::Failed);
        err
    }

    fn lock_history(&self) -> std::sync::MutexGuard<'_, PhaseHistory> {
        self.history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for AuditOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditOrchestrator")
            .field("catalog", &self.catalog)
            .field("settings", &self.settings)
            .field("cost", &self.cost)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::FileReportWriter;
    use crate::testing::{InMemoryLogService, StaticIdentity};
    use tempfile::tempdir;

    fn orchestrator(
        service: Arc<InMemoryLogService>,
        identity: StaticIdentity,
        mode: RunMode,
        dir: &std::path::Path,
    ) -> AuditOrchestrator {
        AuditOrchestrator::new(
            Collaborators {
                logs: service,
                identity: Arc::new(identity),
                writer: Arc::new(FileReportWriter::new(dir)),
            },
            RunSettings {
                mode,
                ..RunSettings::default()
            },
            RetryPolicy::none(),
        )
    }

    #[test]
    fn every_error_names_the_phase_it_aborted() {
        let identity = RunError::IdentityUnavailable(ServiceError::Transport("reset".into()));
        assert_eq!(identity.failed_in(), RunPhase::Cataloging);
        let cancelled = RunError::Cancelled {
            phase: RunPhase::Cataloging,
        };
        assert_eq!(cancelled.failed_in(), RunPhase::Cataloging);
        assert_eq!(cancelled.to_string(), "run cancelled during cataloging");
    }

    #[test]
    fn zero_concurrency_is_raised_to_one() {
        let dir = tempdir().unwrap();
        let orchestrator = AuditOrchestrator::new(
            Collaborators {
                logs: Arc::new(InMemoryLogService::new(Vec::new())),
                identity: Arc::new(StaticIdentity::new("1")),
                writer: Arc::new(FileReportWriter::new(dir.path())),
            },
            RunSettings {
                concurrency: 0,
                ..RunSettings::default()
            },
            RetryPolicy::none(),
        );
        assert_eq!(orchestrator.settings().concurrency, 1);
        assert_eq!(orchestrator.phase(), RunPhase::Idle);
    }

    #[tokio::test]
    async fn audit_only_run_never_writes_retention() {
        let dir = tempdir().unwrap();
        let service = Arc::new(InMemoryLogService::new(vec![
            LogGroupRecord::new("/app/a"),
            LogGroupRecord::new("/app/b").with_retention(30),
        ]));
        let summary = orchestrator(
            Arc::clone(&service),
            StaticIdentity::new("123456789012"),
            RunMode::AuditOnly,
            dir.path(),
        )
        .run()
        .await
        .unwrap();
        assert!(service.put_calls().is_empty());
        assert_eq!(summary.result.without_retention, 1);
        assert_eq!(summary.phases.last(), Some(&RunPhase::Done));
        assert!(summary
            .report_path
            .ends_with("loggroups-noretention-123456789012.txt"));
    }

    #[tokio::test]
    async fn identity_failure_fails_before_any_listing() {
        let dir = tempdir().unwrap();
        let service = Arc::new(InMemoryLogService::new(vec![LogGroupRecord::new("/app/a")]));
        let orchestrator = orchestrator(
            Arc::clone(&service),
            StaticIdentity::failing(ServiceError::Credentials("no credentials".into())),
            RunMode::AuditAndEnforce,
            dir.path(),
        );
        let err = orchestrator.run().await.unwrap_err();
        assert!(matches!(err, RunError::IdentityUnavailable(_)));
        assert_eq!(service.describe_calls(), 0);
        assert_eq!(
            orchestrator.phase_history(),
            vec![RunPhase::Idle, RunPhase::Cataloging, RunPhase::Failed]
        );
    }

    #[tokio::test]
    async fn cancellation_before_listing_aborts_the_catalog() {
        let dir = tempdir().unwrap();
        let flag = CancellationFlag::new();
        flag.cancel();
        let service = Arc::new(InMemoryLogService::new(vec![LogGroupRecord::new("/app/a")]));
        let orchestrator = orchestrator(
            Arc::clone(&service),
            StaticIdentity::new("1"),
            RunMode::AuditAndEnforce,
            dir.path(),
        )
        .with_cancellation(flag);
        let err = orchestrator.run().await.unwrap_err();
        assert!(matches!(
            err,
            RunError::Cancelled {
                phase: RunPhase::Cataloging
            }
        ));
        assert!(service.put_calls().is_empty());
        assert_eq!(orchestrator.phase(), RunPhase::Failed);
    }
}
