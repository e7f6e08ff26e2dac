use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::service::ServiceError;

const ACCESS_KEY_VAR: &str = "AWS_ACCESS_KEY_ID";
const SECRET_KEY_VAR: &str = "AWS_SECRET_ACCESS_KEY";
const SESSION_TOKEN_VAR: &str = "AWS_SESSION_TOKEN";
const CREDENTIALS_FILE_VAR: &str = "AWS_SHARED_CREDENTIALS_FILE";

/// Where signing keys are read from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialSource {
    /// Environment first, then the shared credentials file.
    #[default]
    Auto,
    Environment,
    Profile,
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl Credentials {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }

    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

pub fn resolve(source: CredentialSource, profile: &str) -> Result<Credentials, ServiceError> {
    let from_env = || from_lookup(|name| std::env::var(name).ok());
    let from_profile = || -> Result<Option<Credentials>, ServiceError> {
        let Some(path) = credentials_file_path() else {
            return Ok(None);
        };
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(ServiceError::Credentials(format!(
                    "failed to read {}: {err}",
                    path.display()
                )))
            }
        };
        debug!(path = %path.display(), profile, "reading shared credentials file");
        Ok(parse_credentials_file(&contents, profile))
    };

    let resolved = match source {
        CredentialSource::Environment => from_env(),
        CredentialSource::Profile => from_profile()?,
        CredentialSource::Auto => match from_env() {
            Some(found) => Some(found),
            None => from_profile()?,
        },
    };
    resolved.ok_or_else(|| {
        ServiceError::Credentials(match source {
            CredentialSource::Environment => {
                format!("{ACCESS_KEY_VAR} and {SECRET_KEY_VAR} are not set")
            }
            _ => format!("no credentials found in the environment or for profile `{profile}`"),
        })
    })
}

/// Reads the standard environment variables through `lookup`. Both keys must
/// be present and non-empty.
pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Credentials> {
    let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
    let access = non_empty(ACCESS_KEY_VAR)?;
    let secret = non_empty(SECRET_KEY_VAR)?;
    let mut credentials = Credentials::new(access, secret);
    credentials.session_token = non_empty(SESSION_TOKEN_VAR);
    Some(credentials)
}

fn credentials_file_path() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os(CREDENTIALS_FILE_VAR) {
        return Some(PathBuf::from(path));
    }
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".aws").join("credentials"))
}

/// Extracts one profile from an INI-style shared credentials file.
pub fn parse_credentials_file(contents: &str, profile: &str) -> Option<Credentials> {
    let mut in_profile = false;
    let mut access = None;
    let mut secret = None;
    let mut token = None;
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(section) = line.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            let section = section.trim();
            let name = section.strip_prefix("profile ").unwrap_or(section).trim();
            in_profile = name == profile;
            continue;
        }
        if !in_profile {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim().to_string();
        match key.trim().to_ascii_lowercase().as_str() {
            "aws_access_key_id" => access = Some(value),
            "aws_secret_access_key" => secret = Some(value),
            "aws_session_token" => token = Some(value),
            _ => {}
        }
    }
    let mut credentials = Credentials::new(access?, secret?);
    credentials.session_token = token.filter(|value| !value.is_empty());
    Some(credentials)
}
