use serde::{Deserialize, Serialize};

use crate::catalog::LogGroupRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "decision", content = "days")]
pub enum RetentionDecision {
    HasRetention(u32),
    NoRetention,
}

impl RetentionDecision {
    pub fn needs_enforcement(&self) -> bool {
        matches!(self, RetentionDecision::NoRetention)
    }
}

pub fn classify(record: &LogGroupRecord) -> RetentionDecision {
    match record.retention_in_days {
        Some(days) => RetentionDecision::HasRetention(days),
        None => RetentionDecision::NoRetention,
    }
}
