use std::fmt;
use std::time::Duration;

use crate::error::{ArchiveError, ArchiveResult};

pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// AWS-style access credentials.
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

/// Connection settings for an S3-compatible backend.
#[derive(Clone, Debug)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    /// Base URL of the service, without the bucket. Requests use path-style
    /// addressing: `<endpoint>/<bucket>/<key>`.
    pub endpoint: String,
    pub credentials: Credentials,
    pub timeout: Duration,
}

impl S3Config {
    /// Settings for `bucket` on AWS in `region`.
    pub fn new(bucket: impl Into<String>, region: impl Into<String>, credentials: Credentials) -> Self {
        let region = region.into();
        Self {
            bucket: bucket.into(),
            endpoint: format!("https://s3.{region}.amazonaws.com"),
            region,
            credentials,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Point the backend at a custom S3-compatible endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    /// Build from the standard AWS environment variables.
    ///
    /// `AWS_ACCESS_KEY_ID` and `AWS_SECRET_ACCESS_KEY` are required;
    /// `AWS_SESSION_TOKEN`, `AWS_DEFAULT_REGION`, and `AWS_ENDPOINT_URL` are
    /// optional.
    pub fn from_env(bucket: &str) -> ArchiveResult<Self> {
        Self::from_lookup(bucket, |name| std::env::var(name).ok())
    }

    /// Like [`S3Config::from_env`], reading variables through `lookup`.
    pub fn from_lookup(bucket: &str, lookup: impl Fn(&str) -> Option<String>) -> ArchiveResult<Self> {
        let var = |name: &str| lookup(name).filter(|v| !v.is_empty());

        let access_key_id = var("AWS_ACCESS_KEY_ID")
            .ok_or_else(|| ArchiveError::Config("AWS_ACCESS_KEY_ID is not set".into()))?;
        let secret_access_key = var("AWS_SECRET_ACCESS_KEY")
            .ok_or_else(|| ArchiveError::Config("AWS_SECRET_ACCESS_KEY is not set".into()))?;
        let credentials = Credentials {
            access_key_id,
            secret_access_key,
            session_token: var("AWS_SESSION_TOKEN"),
        };

        let region = var("AWS_DEFAULT_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string());
        let config = Self::new(bucket, region, credentials);
        Ok(match var("AWS_ENDPOINT_URL") {
            Some(endpoint) => config.with_endpoint(endpoint),
            None => config,
        })
    }
}
