use std::fmt;

use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    Cataloging,
    Classifying,
    Enforcing,
    Estimating,
    Reporting,
    Done,
    Failed,
}

impl RunPhase {
    /// Linear pipeline; `Failed` only from `Cataloging` or `Reporting`.
    pub fn can_advance_to(self, next: RunPhase) -> bool {
        use RunPhase::*;
        matches!(
            (self, next),
            (Idle, Cataloging)
                | (Cataloging, Classifying)
                | (Classifying, Enforcing)
                | (Enforcing, Estimating)
                | (Estimating, Reporting)
                | (Reporting, Done)
                | (Cataloging, Failed)
                | (Reporting, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunPhase::Done | RunPhase::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunPhase::Idle => "idle",
            RunPhase::Cataloging => "cataloging",
            RunPhase::Classifying => "classifying",
            RunPhase::Enforcing => "enforcing",
            RunPhase::Estimating => "estimating",
            RunPhase::Reporting => "reporting",
            RunPhase::Done => "done",
            RunPhase::Failed => "failed",
        }
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered record of the phases one run went through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseHistory {
    phases: Vec<RunPhase>,
}

impl PhaseHistory {
    pub fn new() -> Self {
        Self {
            phases: vec![RunPhase::Idle],
        }
    }

    pub fn current(&self) -> RunPhase {
        self.phases.last().copied().unwrap_or(RunPhase::Idle)
    }

    pub fn phases(&self) -> &[RunPhase] {
        &self.phases
    }

    pub fn advance(&mut self, next: RunPhase) {
        let from = self.current();
        if from.can_advance_to(next) {
            info!(from = %from, to = %next, "run phase changed");
        } else {
            warn!(from = %from, to = %next, "unexpected run phase transition");
        }
        self.phases.push(next);
    }
}

impl Default for PhaseHistory {
    fn default() -> Self {
        Self::new()
    }
}
