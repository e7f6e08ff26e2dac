use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::audit::{AuditResult, RunMode};

#[derive(Debug, Error)]
pub enum ReportWriteError {
    #[error("failed to write report {path}: {source}")]
    Io { source: io::Error, path: PathBuf },
    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type ReportResult<T> = std::result::Result<T, ReportWriteError>;

/// `loggroups-<mode>-<account>.txt`
pub fn report_file_name(mode: RunMode, account_id: &str) -> String {
    format!("loggroups-{}-{}.txt", mode.report_tag(), account_id)
}

pub fn render_report(result: &AuditResult) -> ReportResult<String> {
    let mut sections = Vec::new();
    let affected = serde_json::to_string_pretty(&result.affected)?;
    match result.mode {
        RunMode::AuditOnly => {
            sections.push(format!(
                "Number of log groups without retention: {}",
                result.without_retention
            ));
            sections.push(format!("Log groups without retention:\n{affected}"));
            sections.push(format!(
                "Projected cost savings with a {} day retention: {} per month",
                result.target_days,
                result.estimate.formatted()
            ));
        }
        RunMode::AuditAndEnforce => {
            sections.push(format!("Number of changed log groups: {}", result.enforced));
            sections.push(format!("Log groups with updated retention:\n{affected}"));
            if !result.failed.is_empty() {
                let failed = serde_json::to_string_pretty(&result.failed)?;
                sections.push(format!("Log groups that failed enforcement:\n{failed}"));
            }
            sections.push(format!(
                "Estimated cost savings after retention policy: {} per month",
                result.estimate.formatted()
            ));
        }
    }
    if result.cancelled {
        sections.push(format!(
            "Run cancelled: {} log groups were not processed.",
            result.not_attempted.len()
        ));
    }
    let mut body = sections.join("\n\n");
    body.push('\n');
    Ok(body)
}

#[async_trait]
pub trait ReportWriter: Send + Sync {
    /// Persists the report and returns where it landed.
    async fn write(&self, result: &AuditResult) -> ReportResult<PathBuf>;
}

/// Writes reports into a directory, replacing any previous report of the same
/// name through a temporary sibling file.
#[derive(Debug, Clone)]
pub struct FileReportWriter {
    output_dir: PathBuf,
}

impl FileReportWriter {
    pub fn new(output_dir: impl AsRef<Path>) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, result: &AuditResult) -> PathBuf {
        self.output_dir
            .join(report_file_name(result.mode, &result.account_id))
    }
}

#[async_trait]
impl ReportWriter for FileReportWriter {
    async fn write(&self, result: &AuditResult) -> ReportResult<PathBuf> {
        let body = render_report(result)?;
        let path = self.path_for(result);
        let io_error = |source, path: &Path| ReportWriteError::Io {
            source,
            path: path.to_path_buf(),
        };

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|err| io_error(err, &self.output_dir))?;
        let staging = path.with_extension("txt.tmp");
        tokio::fs::write(&staging, body.as_bytes())
            .await
            .map_err(|err| io_error(err, &staging))?;
        if let Err(err) = tokio::fs::rename(&staging, &path).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(io_error(err, &path));
        }
        info!(path = %path.display(), bytes = body.len(), "report written");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::FailedGroup;
    use crate::catalog::LogGroupRecord;
    use crate::cost::CostModel;
    use tempfile::tempdir;
    use uuid::Uuid;

    fn result(mode: RunMode) -> AuditResult {
        AuditResult {
            run_id: Uuid::nil(),
            mode,
            account_id: "123456789012".into(),
            target_days: 3,
            total: 2,
            with_retention: 0,
            without_retention: 2,
            enforced: if mode.enforces() { 2 } else { 0 },
            affected: vec![LogGroupRecord::new("/app/a"), LogGroupRecord::new("/app/b")],
            skipped: Vec::new(),
            failed: Vec::new(),
            not_attempted: Vec::new(),
            cancelled: false,
            estimate: CostModel::default().estimate(2, 3),
        }
    }

    #[test]
    fn file_name_embeds_mode_and_account() {
        assert_eq!(
            report_file_name(RunMode::AuditOnly, "123456789012"),
            "loggroups-noretention-123456789012.txt"
        );
        assert_eq!(
            report_file_name(RunMode::AuditAndEnforce, "123456789012"),
            "loggroups-retention-set-123456789012.txt"
        );
    }

    #[test]
    fn audit_report_layout() {
        let body = render_report(&result(RunMode::AuditOnly)).unwrap();
        let expected = "Number of log groups without retention: 2\n\n\
Log groups without retention:\n\
[\n  {\n    \"logGroupName\": \"/app/a\"\n  },\n  {\n    \"logGroupName\": \"/app/b\"\n  }\n]\n\n\
Projected cost savings with a 3 day retention: $162.00 per month\n";
        assert_eq!(body, expected);
    }

    #[test]
    fn enforcement_report_lists_failures_when_present() {
        let mut result = result(RunMode::AuditAndEnforce);
        let body = render_report(&result).unwrap();
        assert!(body.starts_with("Number of changed log groups: 2\n\n"));
        assert!(!body.contains("failed enforcement"));
        assert!(body.ends_with("Estimated cost savings after retention policy: $162.00 per month\n"));

        result.failed.push(FailedGroup {
            log_group_name: "/app/c".into(),
            reason: "enforcement failed: transport error: reset".into(),
        });
        result.cancelled = true;
        result.not_attempted.push("/app/d".into());
        let body = render_report(&result).unwrap();
        assert!(body.contains("Log groups that failed enforcement:\n["));
        assert!(body.contains("\"logGroupName\": \"/app/c\""));
        assert!(body.ends_with("Run cancelled: 1 log groups were not processed.\n"));
    }

    #[tokio::test]
    async fn writes_into_output_dir_and_replaces_previous_report() {
        let dir = tempdir().unwrap();
        let writer = FileReportWriter::new(dir.path().join("reports"));
        let first = writer.write(&result(RunMode::AuditOnly)).await.unwrap();
        let mut updated = result(RunMode::AuditOnly);
        updated.without_retention = 5;
        let second = writer.write(&updated).await.unwrap();
        assert_eq!(first, second);
        let content = std::fs::read_to_string(&second).unwrap();
        assert!(content.starts_with("Number of log groups without retention: 5"));
        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("reports"))
            .unwrap()
            .collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[tokio::test]
    async fn unwritable_destination_is_a_report_write_error() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"occupied").unwrap();
        let writer = FileReportWriter::new(&blocker);
        let err = writer.write(&result(RunMode::AuditOnly)).await.unwrap_err();
        assert!(matches!(err, ReportWriteError::Io { .. }));
    }
}
