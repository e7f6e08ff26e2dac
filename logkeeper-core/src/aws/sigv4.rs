//! Signature Version 4 request signing for single-shot JSON and query POSTs.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::credentials::Credentials;
use crate::service::ServiceError;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("failed to initialise request signer")]
    Hmac,
}

impl From<SigningError> for ServiceError {
    fn from(err: SigningError) -> Self {
        ServiceError::Credentials(err.to_string())
    }
}

/// What gets signed. Header names may be in any case; `host` and
/// `x-amz-date` are added by [`sign`].
#[derive(Debug, Clone)]
pub struct SignableRequest<'a> {
    pub method: &'a str,
    pub host: &'a str,
    pub path: &'a str,
    pub headers: Vec<(&'a str, String)>,
    pub body: &'a [u8],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub amz_date: String,
    pub authorization: String,
    pub security_token: Option<String>,
}

impl SignedHeaders {
    /// Header pairs to attach to the outgoing request.
    pub fn pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("x-amz-date", self.amz_date.clone()),
            ("authorization", self.authorization.clone()),
        ];
        if let Some(token) = &self.security_token {
            pairs.push(("x-amz-security-token", token.clone()));
        }
        pairs
    }
}

pub fn sign(
    request: &SignableRequest<'_>,
    credentials: &Credentials,
    region: &str,
    service: &str,
    now: DateTime<Utc>,
) -> Result<SignedHeaders, SigningError> {
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date = now.format("%Y%m%d").to_string();

    let mut headers: Vec<(String, String)> = request
        .headers
        .iter()
        .map(|(name, value)| (name.to_ascii_lowercase(), value.trim().to_string()))
        .collect();
    headers.push(("host".to_string(), request.host.to_string()));
    headers.push(("x-amz-date".to_string(), amz_date.clone()));
    if let Some(token) = &credentials.session_token {
        headers.push(("x-amz-security-token".to_string(), token.clone()));
    }
    headers.sort_by(|a, b| a.0.cmp(&b.0));

    let canonical_headers: String = headers
        .iter()
        .map(|(name, value)| format!("{name}:{value}\n"))
        .collect();
    let signed_headers = headers
        .iter()
        .map(|(name, _)| name.as_str())
        .collect::<Vec<_>>()
        .join(";");
    let payload_hash = hex::encode(Sha256::digest(request.body));
    let canonical_request = [
        request.method,
        request.path,
        "",
        canonical_headers.as_str(),
        signed_headers.as_str(),
        payload_hash.as_str(),
    ]
    .join("\n");

    let scope = format!("{date}/{region}/{service}/aws4_request");
    let request_hash = hex::encode(Sha256::digest(canonical_request.as_bytes()));
    let string_to_sign = [
        ALGORITHM,
        amz_date.as_str(),
        scope.as_str(),
        request_hash.as_str(),
    ]
    .join("\n");
    let key = signing_key(&credentials.secret_access_key, &date, region, service)?;
    let signature = hex::encode(hmac(&key, string_to_sign.as_bytes())?);

    Ok(SignedHeaders {
        amz_date,
        authorization: format!(
            "{ALGORITHM} Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
            credentials.access_key_id
        ),
        security_token: credentials.session_token.clone(),
    })
}

pub fn signing_key(
    secret: &str,
    date: &str,
    region: &str,
    service: &str,
) -> Result<Vec<u8>, SigningError> {
    let date_key = hmac(format!("AWS4{secret}").as_bytes(), date.as_bytes())?;
    let region_key = hmac(&date_key, region.as_bytes())?;
    let service_key = hmac(&region_key, service.as_bytes())?;
    hmac(&service_key, b"aws4_request")
}

fn hmac(key: &[u8], message: &[u8]) -> Result<Vec<u8>, SigningError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| SigningError::Hmac)?;
    mac.update(message);
    Ok(mac.finalize().into_bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SECRET: &str = "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY";

    #[test]
    fn derives_documented_signing_key() {
        let key = signing_key(SECRET, "20120215", "us-east-1", "iam").unwrap();
        assert_eq!(
            hex::encode(key),
            "f4780e2d9f65fa895f9c67b32ce1baf0b0d8a43505a000a1a9e090d414db404d"
        );
    }

    #[test]
    fn signs_json_post() {
        let request = SignableRequest {
            method: "POST",
            host: "logs.us-east-1.amazonaws.com",
            path: "/",
            headers: vec![
                ("Content-Type", "application/x-amz-json-1.1".to_string()),
                ("X-Amz-Target", "Logs_20140328.DescribeLogGroups".to_string()),
            ],
            body: b"{}",
        };
        let now = Utc.with_ymd_and_hms(2015, 8, 30, 12, 36, 0).unwrap();
        let signed = sign(
            &request,
            &Credentials::new("AKIDEXAMPLE", SECRET),
            "us-east-1",
            "logs",
            now,
        )
        .unwrap();
        assert_eq!(signed.amz_date, "20150830T123600Z");
        assert_eq!(
            signed.authorization,
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20150830/us-east-1/logs/aws4_request, \
             SignedHeaders=content-type;host;x-amz-date;x-amz-target, \
             Signature=9f337b5ec2364ef0509f256b6997d4bff32228e045845b5a05a14a1e291645bf"
        );
        assert_eq!(signed.pairs().len(), 2);
    }

    #[test]
    fn session_token_is_signed_and_attached() {
        let request = SignableRequest {
            method: "POST",
            host: "sts.amazonaws.com",
            path: "/",
            headers: Vec::new(),
            body: b"",
        };
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let credentials = Credentials::new("AKID", SECRET).with_session_token("session");
        let signed = sign(&request, &credentials, "us-east-1", "sts", now).unwrap();
        assert!(signed
            .authorization
            .contains("SignedHeaders=host;x-amz-date;x-amz-security-token,"));
        assert_eq!(signed.security_token.as_deref(), Some("session"));
        assert_eq!(signed.pairs().len(), 3);
    }

    #[test]
    fn signing_errors_surface_as_credential_failures() {
        let err: ServiceError = SigningError::Hmac.into();
        assert!(matches!(err, ServiceError::Credentials(_)));
        assert!(!err.is_retryable());
    }
}
