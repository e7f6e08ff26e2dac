use serde::{Deserialize, Serialize};

/// Snapshot of one log group as returned by `DescribeLogGroups`.
///
/// Fields are declared in key order so the serialized form stays diffable
/// between runs. The snapshot is stale as soon as another actor touches the
/// group; anything that mutates must re-fetch first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogGroupRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arn: Option<String>,
    /// Milliseconds since the epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_group_class: Option<String>,
    pub log_group_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric_filter_count: Option<u32>,
    /// `None` means the group never expires its events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention_in_days: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stored_bytes: Option<u64>,
}

impl LogGroupRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            arn: None,
            creation_time: None,
            log_group_class: None,
            log_group_name: name.into(),
            metric_filter_count: None,
            retention_in_days: None,
            stored_bytes: None,
        }
    }

    pub fn with_retention(mut self, days: u32) -> Self {
        self.retention_in_days = Some(days);
        self
    }

    pub fn identifier(&self) -> &str {
        &self.log_group_name
    }
}
