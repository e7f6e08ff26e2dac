use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::LogGroupRecord;
use crate::config::AwsSection;
use crate::service::{DescribePage, DescribeRequest, LogService, ServiceError};

use super::{AwsHttp, AwsResponse};

const SERVICE: &str = "logs";
const TARGET_PREFIX: &str = "Logs_20140328";
const JSON_CONTENT_TYPE: &str = "application/x-amz-json-1.1";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DescribeLogGroupsInput<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    log_group_name_prefix: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_token: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescribeLogGroupsOutput {
    #[serde(default)]
    log_groups: Vec<LogGroupRecord>,
    #[serde(default)]
    next_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PutRetentionPolicyInput<'a> {
    log_group_name: &'a str,
    retention_in_days: u32,
}

/// CloudWatch Logs over the JSON 1.1 protocol.
#[derive(Debug, Clone)]
pub struct CloudWatchLogsClient {
    http: AwsHttp,
}

impl CloudWatchLogsClient {
    pub fn new(http: AwsHttp) -> Self {
        Self { http }
    }

    pub fn from_config(config: &AwsSection) -> Result<Self, ServiceError> {
        Ok(Self::new(AwsHttp::from_config(config)?))
    }

    async fn call<I: Serialize>(
        &self,
        operation: &str,
        input: &I,
    ) -> Result<AwsResponse, ServiceError> {
        let body =
            serde_json::to_vec(input).map_err(|err| ServiceError::Decode(err.to_string()))?;
        debug!(operation, "calling cloudwatch logs");
        self.http
            .post(
                SERVICE,
                vec![
                    ("content-type", JSON_CONTENT_TYPE.to_string()),
                    ("x-amz-target", format!("{TARGET_PREFIX}.{operation}")),
                ],
                body,
            )
            .await?
            .into_success()
    }
}

#[async_trait]
impl LogService for CloudWatchLogsClient {
    async fn describe_log_groups(
        &self,
        request: DescribeRequest,
    ) -> Result<DescribePage, ServiceError> {
        let input = DescribeLogGroupsInput {
            log_group_name_prefix: request.name_prefix.as_deref(),
            next_token: request.next_token.as_deref(),
            limit: request.limit,
        };
        let response = self.call("DescribeLogGroups", &input).await?;
        parse_describe_output(&response.body)
    }

    async fn put_retention_policy(&self, identifier: &str, days: u32) -> Result<(), ServiceError> {
        let input = PutRetentionPolicyInput {
            log_group_name: identifier,
            retention_in_days: days,
        };
        match self.call("PutRetentionPolicy", &input).await {
            Ok(_) => Ok(()),
            Err(err) if err.is_not_found() => Err(ServiceError::not_found(identifier)),
            Err(err) => Err(err),
        }
    }
}

pub(crate) fn parse_describe_output(body: &str) -> Result<DescribePage, ServiceError> {
    let output: DescribeLogGroupsOutput =
        serde_json::from_str(body).map_err(|err| ServiceError::Decode(err.to_string()))?;
    Ok(DescribePage {
        records: output.log_groups,
        next_token: output.next_token.filter(|token| !token.is_empty()),
    })
}
