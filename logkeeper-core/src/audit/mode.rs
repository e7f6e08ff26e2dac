use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    #[default]
    AuditOnly,
    AuditAndEnforce,
}

impl RunMode {
    pub fn enforces(&self) -> bool {
        matches!(self, RunMode::AuditAndEnforce)
    }

    /// Tag embedded in the report file name.
    pub fn report_tag(&self) -> &'static str {
        match self {
            RunMode::AuditOnly => "noretention",
            RunMode::AuditAndEnforce => "retention-set",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::AuditOnly => "audit-only",
            RunMode::AuditAndEnforce => "audit-and-enforce",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
