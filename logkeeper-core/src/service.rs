use async_trait::async_trait;
use thiserror::Error;

use crate::catalog::LogGroupRecord;

/// Failure reported by an external collaborator (log service or identity service).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("resource not found: {resource}")]
    NotFound { resource: String },
    #[error("throttled ({code}): {message}")]
    Throttled { code: String, message: String },
    #[error("service unavailable (status {status}): {message}")]
    Unavailable { status: u16, message: String },
    #[error("service error ({code}): {message}")]
    Api { code: String, message: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("credentials error: {0}")]
    Credentials(String),
    #[error("failed to decode response: {0}")]
    Decode(String),
    #[error("cancelled before the request was sent")]
    Cancelled,
}

impl ServiceError {
    pub fn not_found(resource: impl Into<String>) -> Self {
        ServiceError::NotFound {
            resource: resource.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ServiceError::NotFound { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ServiceError::Cancelled)
    }

    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ServiceError::Throttled { .. }
                | ServiceError::Unavailable { .. }
                | ServiceError::Transport(_)
        )
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ServiceError::Decode(err.to_string())
        } else {
            ServiceError::Transport(err.to_string())
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescribeRequest {
    pub next_token: Option<String>,
    pub name_prefix: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescribePage {
    pub records: Vec<LogGroupRecord>,
    /// Absent when the listing is exhausted.
    pub next_token: Option<String>,
}

#[async_trait]
pub trait LogService: Send + Sync {
    async fn describe_log_groups(
        &self,
        request: DescribeRequest,
    ) -> Result<DescribePage, ServiceError>;

    /// `Err(ServiceError::NotFound)` when the group no longer exists.
    async fn put_retention_policy(&self, identifier: &str, days: u32)
        -> Result<(), ServiceError>;
}

#[async_trait]
pub trait IdentityService: Send + Sync {
    async fn caller_account_id(&self) -> Result<String, ServiceError>;
}
