use std::collections::BTreeMap;

use serde::Serialize;
use uuid::Uuid;

use crate::catalog::LogGroupRecord;
use crate::cost::{CostEstimate, CostModel};
use crate::retention::{EnforcementOutcome, RetentionDecision, SkipReason};

use super::RunMode;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedGroup {
    pub log_group_name: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedGroup {
    pub log_group_name: String,
    pub reason: String,
}

/// What happened to one enforcement candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupProgress {
    /// Cancellation arrived before retention was set on the group.
    NotAttempted,
    Completed {
        /// Snapshot the decision to enforce was based on.
        record: LogGroupRecord,
        outcome: EnforcementOutcome,
    },
}

/// Aggregate of one run. Lists are ordered by log group name, independent of
/// the order concurrent enforcement calls finished in.
#[derive(Debug, Clone, Serialize)]
pub struct AuditResult {
    pub run_id: Uuid,
    pub mode: RunMode,
    pub account_id: String,
    pub target_days: u32,
    pub total: usize,
    pub with_retention: usize,
    pub without_retention: usize,
    pub enforced: usize,
    pub affected: Vec<LogGroupRecord>,
    pub skipped: Vec<SkippedGroup>,
    pub failed: Vec<FailedGroup>,
    pub not_attempted: Vec<String>,
    pub cancelled: bool,
    pub estimate: CostEstimate,
}

pub(crate) struct ResultInputs<'a> {
    pub run_id: Uuid,
    pub mode: RunMode,
    pub account_id: String,
    pub target_days: u32,
    pub classified: Vec<(LogGroupRecord, RetentionDecision)>,
    pub progress: BTreeMap<String, GroupProgress>,
    pub cancelled: bool,
    pub cost: &'a CostModel,
}

impl AuditResult {
    pub(crate) fn assemble(inputs: ResultInputs<'_>) -> Self {
        let ResultInputs {
            run_id,
            mode,
            account_id,
            target_days,
            mut classified,
            progress,
            cancelled,
            cost,
        } = inputs;
        classified.sort_by(|a, b| a.0.log_group_name.cmp(&b.0.log_group_name));

        let total = classified.len();
        let with_retention = classified
            .iter()
            .filter(|(_, decision)| !decision.needs_enforcement())
            .count();
        let without_retention = total - with_retention;

        let mut affected = Vec::new();
        let mut skipped = Vec::new();
        let mut failed = Vec::new();
        let mut not_attempted = Vec::new();

        if mode.enforces() {
            for (name, entry) in progress {
                match entry {
                    GroupProgress::NotAttempted => not_attempted.push(name),
                    GroupProgress::Completed { record, outcome } => match outcome {
                        EnforcementOutcome::Applied(_) => affected.push(record),
                        EnforcementOutcome::Skipped(reason) => skipped.push(SkippedGroup {
                            log_group_name: name,
                            reason: describe_skip(reason),
                        }),
                        EnforcementOutcome::Failed(error) => failed.push(FailedGroup {
                            log_group_name: name,
                            reason: error.to_string(),
                        }),
                        EnforcementOutcome::Cancelled => not_attempted.push(name),
                    },
                }
            }
        } else {
            affected = classified
                .into_iter()
                .filter(|(_, decision)| decision.needs_enforcement())
                .map(|(record, _)| record)
                .collect();
        }

        let enforced = if mode.enforces() { affected.len() } else { 0 };
        let estimated_groups = if mode.enforces() {
            enforced
        } else {
            without_retention
        };
        let estimate = cost.estimate(estimated_groups as i64, i64::from(target_days));

        Self {
            run_id,
            mode,
            account_id,
            target_days,
            total,
            with_retention,
            without_retention,
            enforced,
            affected,
            skipped,
            failed,
            not_attempted,
            cancelled,
            estimate,
        }
    }
}

fn describe_skip(reason: SkipReason) -> String {
    match reason {
        SkipReason::NotFound => "log group no longer exists".to_string(),
        SkipReason::AlreadySet(days) => format!("retention already set to {days} days"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retention::{classify, GroupError};
    use crate::service::ServiceError;

    fn inputs(mode: RunMode, progress: BTreeMap<String, GroupProgress>) -> AuditResult {
        let records = vec![
            LogGroupRecord::new("c"),
            LogGroupRecord::new("a").with_retention(14),
            LogGroupRecord::new("b"),
            LogGroupRecord::new("d"),
        ];
        let classified = records
            .into_iter()
            .map(|record| {
                let decision = classify(&record);
                (record, decision)
            })
            .collect();
        AuditResult::assemble(ResultInputs {
            run_id: Uuid::nil(),
            mode,
            account_id: "123456789012".into(),
            target_days: 3,
            classified,
            progress,
            cancelled: false,
            cost: &CostModel::default(),
        })
    }

    #[test]
    fn audit_only_lists_unset_groups_in_name_order() {
        let result = inputs(RunMode::AuditOnly, BTreeMap::new());
        assert_eq!(result.total, 4);
        assert_eq!(result.with_retention, 1);
        assert_eq!(result.without_retention, 3);
        assert_eq!(result.enforced, 0);
        let names: Vec<_> = result.affected.iter().map(|r| r.identifier()).collect();
        assert_eq!(names, vec!["b", "c", "d"]);
        assert_eq!(result.estimate.affected_groups, 3);
    }

    #[test]
    fn enforcement_outcomes_are_split_by_kind() {
        let mut progress = BTreeMap::new();
        progress.insert(
            "d".to_string(),
            GroupProgress::Completed {
                record: LogGroupRecord::new("d"),
                outcome: EnforcementOutcome::Failed(GroupError::EnforcementFailed(
                    ServiceError::Transport("reset".into()),
                )),
            },
        );
        progress.insert(
            "b".to_string(),
            GroupProgress::Completed {
                record: LogGroupRecord::new("b"),
                outcome: EnforcementOutcome::Applied(3),
            },
        );
        progress.insert(
            "c".to_string(),
            GroupProgress::Completed {
                record: LogGroupRecord::new("c"),
                outcome: EnforcementOutcome::Skipped(SkipReason::NotFound),
            },
        );
        let result = inputs(RunMode::AuditAndEnforce, progress);
        assert_eq!(result.without_retention, 3);
        assert_eq!(result.enforced, 1);
        assert_eq!(result.affected, vec![LogGroupRecord::new("b")]);
        assert_eq!(result.skipped[0].log_group_name, "c");
        assert_eq!(result.failed[0].log_group_name, "d");
        assert!(result.failed[0].reason.contains("reset"));
        assert_eq!(result.estimate.affected_groups, 1);
    }
}
