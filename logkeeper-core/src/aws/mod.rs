//! Signed HTTP clients for the CloudWatch Logs and STS APIs.

pub mod credentials;
pub mod logs;
pub mod sigv4;
pub mod sts;

use chrono::Utc;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::config::AwsSection;
use crate::service::ServiceError;

pub use credentials::{CredentialSource, Credentials};
pub use logs::CloudWatchLogsClient;
pub use sts::StsClient;

const THROTTLING_CODES: &[&str] = &[
    "ThrottlingException",
    "Throttling",
    "TooManyRequestsException",
    "RequestLimitExceeded",
    "RequestThrottled",
    "RequestThrottledException",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsResponse {
    pub status: u16,
    pub body: String,
}

impl AwsResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Passes successful responses through, otherwise maps the error payload.
    pub fn into_success(self) -> Result<Self, ServiceError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(error_from_response(self.status, &self.body))
        }
    }
}

/// Shared transport: one reqwest client, one set of credentials, one region.
#[derive(Clone)]
pub struct AwsHttp {
    client: reqwest::Client,
    credentials: Credentials,
    region: String,
    endpoint_override: Option<Url>,
}

impl AwsHttp {
    pub fn from_config(config: &AwsSection) -> Result<Self, ServiceError> {
        let credentials = credentials::resolve(config.credential_source, &config.profile)?;
        Self::new(config, credentials)
    }

    pub fn new(config: &AwsSection, credentials: Credentials) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        let endpoint_override = config
            .endpoint_url
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .map(Url::parse)
            .transpose()
            .map_err(|err| ServiceError::Transport(format!("invalid endpoint url: {err}")))?;
        Ok(Self {
            client,
            credentials,
            region: config.region.clone(),
            endpoint_override,
        })
    }

    pub fn endpoint_for(&self, service: &str) -> Result<Url, ServiceError> {
        match &self.endpoint_override {
            Some(url) => Ok(url.clone()),
            None => Url::parse(&format!("https://{service}.{}.amazonaws.com/", self.region))
                .map_err(|err| ServiceError::Transport(format!("invalid endpoint url: {err}"))),
        }
    }

    pub async fn post(
        &self,
        service: &str,
        headers: Vec<(&str, String)>,
        body: Vec<u8>,
    ) -> Result<AwsResponse, ServiceError> {
        let url = self.endpoint_for(service)?;
        let host = host_header(&url)?;
        let signed = sigv4::sign(
            &sigv4::SignableRequest {
                method: "POST",
                host: &host,
                path: url.path(),
                headers: headers.clone(),
                body: &body,
            },
            &self.credentials,
            &self.region,
            service,
            Utc::now(),
        )?;

        let mut request = self.client.post(url);
        for (name, value) in headers {
            request = request.header(name, value);
        }
        for (name, value) in signed.pairs() {
            request = request.header(name, value);
        }
        let response = request.body(body).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        debug!(service, status, bytes = body.len(), "aws response");
        Ok(AwsResponse { status, body })
    }
}

impl std::fmt::Debug for AwsHttp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsHttp")
            .field("credentials", &self.credentials)
            .field("region", &self.region)
            .field("endpoint_override", &self.endpoint_override)
            .finish()
    }
}

fn host_header(url: &Url) -> Result<String, ServiceError> {
    let host = url
        .host_str()
        .ok_or_else(|| ServiceError::Transport(format!("endpoint {url} has no host")))?;
    Ok(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

/// Maps an error response from either the JSON 1.1 protocol
/// (`{"__type": "...#Code", "message": ...}`) or the query protocol rendered as
/// JSON (`{"Error": {"Code": ..., "Message": ...}}`).
pub fn error_from_response(status: u16, body: &str) -> ServiceError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let (code, message) = match &parsed {
        Some(value) => extract_error(value),
        None => (None, None),
    };
    let message = message.unwrap_or_else(|| body.trim().to_string());

    match code {
        Some(code) if code == "ResourceNotFoundException" => ServiceError::NotFound {
            resource: message,
        },
        Some(code) if THROTTLING_CODES.contains(&code.as_str()) => {
            ServiceError::Throttled { code, message }
        }
        _ if status == 429 => ServiceError::Throttled {
            code: "TooManyRequests".to_string(),
            message,
        },
        _ if status >= 500 => ServiceError::Unavailable { status, message },
        Some(code) => ServiceError::Api { code, message },
        None => ServiceError::Api {
            code: format!("Http{status}"),
            message,
        },
    }
}

fn extract_error(value: &Value) -> (Option<String>, Option<String>) {
    let text = |value: Option<&Value>| value.and_then(Value::as_str).map(str::to_string);
    if let Some(kind) = value.get("__type").and_then(Value::as_str) {
        let code = kind.rsplit('#').next().unwrap_or(kind).to_string();
        let message = text(value.get("message")).or_else(|| text(value.get("Message")));
        return (Some(code), message);
    }
    if let Some(error) = value.get("Error") {
        return (text(error.get("Code")), text(error.get("Message")));
    }
    (None, None)
}
