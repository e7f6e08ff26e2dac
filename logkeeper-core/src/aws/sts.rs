use async_trait::async_trait;
use serde_json::Value;

use crate::config::AwsSection;
use crate::service::{IdentityService, ServiceError};

use super::AwsHttp;

const SERVICE: &str = "sts";
const GET_CALLER_IDENTITY: &str = "Action=GetCallerIdentity&Version=2011-06-15";

/// Resolves the account the credentials belong to.
#[derive(Debug, Clone)]
pub struct StsClient {
    http: AwsHttp,
}

impl StsClient {
    pub fn new(http: AwsHttp) -> Self {
        Self { http }
    }

    pub fn from_config(config: &AwsSection) -> Result<Self, ServiceError> {
        Ok(Self::new(AwsHttp::from_config(config)?))
    }
}

#[async_trait]
impl IdentityService for StsClient {
    async fn caller_account_id(&self) -> Result<String, ServiceError> {
        let response = self
            .http
            .post(
                SERVICE,
                vec![
                    (
                        "content-type",
                        "application/x-www-form-urlencoded; charset=utf-8".to_string(),
                    ),
                    ("accept", "application/json".to_string()),
                ],
                GET_CALLER_IDENTITY.as_bytes().to_vec(),
            )
            .await?
            .into_success()?;
        parse_account_id(&response.body)
    }
}

/// Accepts the JSON rendering and falls back to the XML one.
pub(crate) fn parse_account_id(body: &str) -> Result<String, ServiceError> {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        return value
            .pointer("/GetCallerIdentityResponse/GetCallerIdentityResult/Account")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ServiceError::Decode("response carries no account id".into()));
    }
    body.split_once("<Account>")
        .and_then(|(_, rest)| rest.split_once("</Account>"))
        .map(|(account, _)| account.trim().to_string())
        .filter(|account| !account.is_empty())
        .ok_or_else(|| ServiceError::Decode("response carries no account id".into()))
}
