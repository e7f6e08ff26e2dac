use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::audit::RunMode;
use crate::aws::CredentialSource;
use crate::error::{ConfigError, Result};

/// Retention values accepted by `PutRetentionPolicy`.
pub const VALID_RETENTION_DAYS: &[u32] = &[
    1, 3, 5, 7, 14, 30, 60, 90, 120, 150, 180, 365, 400, 545, 731, 1096, 1827, 2192, 2557, 2922,
    3288, 3653,
];

/// Largest page size `DescribeLogGroups` accepts.
pub const MAX_PAGE_LIMIT: u32 = 50;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct KeeperConfig {
    pub aws: AwsSection,
    pub audit: AuditSection,
    pub cost: CostSection,
    pub retry: RetrySection,
    pub report: ReportSection,
}

impl KeeperConfig {
    pub fn validate(&self) -> Result<()> {
        if self.aws.region.trim().is_empty() {
            return Err(ConfigError::Invalid("aws.region must not be empty".into()));
        }
        if !VALID_RETENTION_DAYS.contains(&self.audit.target_retention_days) {
            return Err(ConfigError::Invalid(format!(
                "audit.target_retention_days = {} is not a retention the log service accepts",
                self.audit.target_retention_days
            )));
        }
        if self.audit.concurrency == 0 {
            return Err(ConfigError::Invalid(
                "audit.concurrency must be at least 1".into(),
            ));
        }
        if let Some(limit) = self.audit.page_limit {
            if limit == 0 || limit > MAX_PAGE_LIMIT {
                return Err(ConfigError::Invalid(format!(
                    "audit.page_limit = {limit} must be within 1..={MAX_PAGE_LIMIT}"
                )));
            }
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn resolve_output_dir<P: AsRef<Path>>(&self, base: P) -> PathBuf {
        if self.report.output_dir.is_absolute() {
            self.report.output_dir.clone()
        } else {
            base.as_ref().join(&self.report.output_dir)
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AwsSection {
    pub region: String,
    pub credential_source: CredentialSource,
    pub profile: String,
    pub endpoint_url: Option<String>,
    pub request_timeout_seconds: u64,
}

impl AwsSection {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds.max(1))
    }
}

impl Default for AwsSection {
    fn default() -> Self {
        Self {
            region: "ap-southeast-2".to_string(),
            credential_source: CredentialSource::Auto,
            profile: "default".to_string(),
            endpoint_url: None,
            request_timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuditSection {
    pub mode: RunMode,
    pub target_retention_days: u32,
    pub name_prefix: Option<String>,
    pub concurrency: usize,
    pub page_limit: Option<u32>,
}

impl Default for AuditSection {
    fn default() -> Self {
        Self {
            mode: RunMode::AuditOnly,
            target_retention_days: 3,
            name_prefix: None,
            concurrency: 8,
            page_limit: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CostSection {
    pub daily_volume_gb: f64,
    pub price_per_gb_month: f64,
    pub baseline_days: u32,
}

impl Default for CostSection {
    fn default() -> Self {
        Self {
            daily_volume_gb: 100.0,
            price_per_gb_month: 0.03,
            baseline_days: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_attempts: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_ms: u64,
}

impl RetrySection {
    /// Single attempt, no waiting.
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 0,
            max_delay_ms: 0,
            jitter_ms: 0,
        }
    }
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 5_000,
            jitter_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReportSection {
    pub output_dir: PathBuf,
}

impl Default for ReportSection {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
        }
    }
}

pub fn load_keeper_config<P: AsRef<Path>>(path: P) -> Result<KeeperConfig> {
    let config: KeeperConfig = load_toml(path)?;
    config.validate()?;
    Ok(config)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_fixture_config() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../configs/logkeeper.toml");
        let config = load_keeper_config(path).expect("sample config should parse");
        assert_eq!(config.aws.region, "ap-southeast-2");
        assert_eq!(config.audit.mode, RunMode::AuditOnly);
        assert_eq!(config.audit.target_retention_days, 3);
        assert_eq!(config.cost.baseline_days, 30);
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn empty_document_uses_defaults() {
        let config: KeeperConfig = toml::from_str("").unwrap();
        config.validate().unwrap();
        assert_eq!(config.audit.concurrency, 8);
        assert_eq!(config.cost.daily_volume_gb, 100.0);
        assert_eq!(config.cost.price_per_gb_month, 0.03);
        assert_eq!(config.aws.credential_source, CredentialSource::Auto);
        assert!(config.aws.endpoint_url.is_none());
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config: KeeperConfig = toml::from_str(
            r#"
            [audit]
            mode = "audit-and-enforce"
            target_retention_days = 14

            [aws]
            credential_source = "profile"
            profile = "ops"
            "#,
        )
        .unwrap();
        config.validate().unwrap();
        assert_eq!(config.audit.mode, RunMode::AuditAndEnforce);
        assert_eq!(config.audit.target_retention_days, 14);
        assert_eq!(config.audit.concurrency, 8);
        assert_eq!(config.aws.region, "ap-southeast-2");
        assert_eq!(config.aws.credential_source, CredentialSource::Profile);
        assert_eq!(config.aws.profile, "ops");
    }

    #[test]
    fn rejects_retention_the_service_does_not_accept() {
        let mut config = KeeperConfig::default();
        config.audit.target_retention_days = 4;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_zero_concurrency_and_oversized_pages() {
        let mut config = KeeperConfig::default();
        config.audit.concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = KeeperConfig::default();
        config.audit.page_limit = Some(51);
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_keeper_config("/nonexistent/logkeeper.toml").unwrap_err();
        match err {
            ConfigError::Io { path, .. } => {
                assert!(path.ends_with("logkeeper.toml"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
