use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::audit::CancellationFlag;
use crate::catalog::LogGroupCatalog;
use crate::retry::RetryPolicy;
use crate::service::{LogService, ServiceError};

use super::classifier::{classify, RetentionDecision};

/// Per-group failure. Recorded in the run result, never fatal to the run.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GroupError {
    #[error("detail lookup failed: {0}")]
    DetailLookupFailed(ServiceError),
    #[error("enforcement failed: {0}")]
    EnforcementFailed(ServiceError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The group was deleted before retention could be set.
    NotFound,
    /// Someone else set a retention between listing and enforcement.
    AlreadySet(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnforcementOutcome {
    Applied(u32),
    Skipped(SkipReason),
    Failed(GroupError),
    /// Cancellation arrived before retention was confirmed. Calls already
    /// sent are not revoked.
    Cancelled,
}

impl EnforcementOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, EnforcementOutcome::Applied(_))
    }
}

/// Sets the target retention on groups already classified `NoRetention`.
///
/// A retry after a transient failure first re-reads the group: if the earlier
/// attempt already landed the outcome is `Applied` without a second write.
#[derive(Clone)]
pub struct RetentionEnforcer {
    service: Arc<dyn LogService>,
    catalog: LogGroupCatalog,
    retry: RetryPolicy,
}

impl RetentionEnforcer {
    pub fn new(service: Arc<dyn LogService>, catalog: LogGroupCatalog, retry: RetryPolicy) -> Self {
        Self {
            service,
            catalog,
            retry,
        }
    }

    pub fn with_catalog(mut self, catalog: LogGroupCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// No put or recheck is sent once `flag` is set.
    pub fn with_cancellation(mut self, flag: CancellationFlag) -> Self {
        self.catalog = self.catalog.with_cancellation(flag.clone());
        self.retry = self.retry.with_cancellation(flag);
        self
    }

    pub async fn enforce(&self, identifier: &str, target_days: u32) -> EnforcementOutcome {
        let mut attempt = 0usize;
        loop {
            if attempt > 0 {
                self.retry.pause(attempt).await;
            }
            if self.retry.is_cancelled() {
                info!(log_group = %identifier, attempt, "cancelled, no further calls");
                return EnforcementOutcome::Cancelled;
            }
            if attempt > 0 {
                if let Some(outcome) = self.recheck(identifier, target_days).await {
                    return outcome;
                }
            }
            match self
                .service
                .put_retention_policy(identifier, target_days)
                .await
            {
                Ok(()) => {
                    info!(log_group = %identifier, days = target_days, "retention applied");
                    return EnforcementOutcome::Applied(target_days);
                }
                Err(error) if error.is_not_found() => {
                    warn!(log_group = %identifier, "log group vanished before retention was set");
                    return EnforcementOutcome::Skipped(SkipReason::NotFound);
                }
                Err(error) if self.retry.should_retry(attempt, &error) => {
                    warn!(
                        log_group = %identifier,
                        attempt = attempt + 1,
                        error = %error,
                        "put retention failed, rechecking before retry"
                    );
                    attempt += 1;
                }
                Err(error) => {
                    warn!(log_group = %identifier, error = %error, "put retention failed");
                    return EnforcementOutcome::Failed(GroupError::EnforcementFailed(error));
                }
            }
        }
    }

    /// `Some` when the fresh state settles the outcome without another write.
    async fn recheck(&self, identifier: &str, target_days: u32) -> Option<EnforcementOutcome> {
        match self.catalog.describe_one(identifier).await {
            Ok(None) => Some(EnforcementOutcome::Skipped(SkipReason::NotFound)),
            Ok(Some(record)) => match classify(&record) {
                RetentionDecision::HasRetention(days) if days == target_days => {
                    info!(log_group = %identifier, days, "earlier attempt already applied retention");
                    Some(EnforcementOutcome::Applied(days))
                }
                RetentionDecision::HasRetention(days) => {
                    Some(EnforcementOutcome::Skipped(SkipReason::AlreadySet(days)))
                }
                RetentionDecision::NoRetention => None,
            },
            Err(error) if error.is_cancelled() => Some(EnforcementOutcome::Cancelled),
            Err(error) => Some(EnforcementOutcome::Failed(GroupError::DetailLookupFailed(
                error,
            ))),
        }
    }
}

impl std::fmt::Debug for RetentionEnforcer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetentionEnforcer")
            .field("retry", &self.retry)
            .finish()
    }
}
