use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{CONTENT_LENGTH, ETAG};
use reqwest::{Method, StatusCode};
use tokio::fs::File;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;
use url::Url;

use crate::backend::{ObjectBackend, ObjectHead, PutOptions};
use crate::config::S3Config;
use crate::error::{ArchiveError, ArchiveResult};
use crate::sigv4::{uri_encode_path, RequestSigner, SigningRequest, UNSIGNED_PAYLOAD};

/// Object backend for the S3 HTTP API.
///
/// Uses path-style addressing and SigV4 header authentication with an
/// unsigned payload; uploads carry `Content-MD5` so the service rejects a
/// body that changed in transit.
#[derive(Clone, Debug)]
pub struct S3Backend {
    http: reqwest::Client,
    config: S3Config,
    signer: RequestSigner,
    host: String,
}

impl S3Backend {
    pub fn new(config: S3Config) -> ArchiveResult<Self> {
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|e| ArchiveError::Config(format!("invalid endpoint {:?}: {e}", config.endpoint)))?;
        let host = match (endpoint.host_str(), endpoint.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => {
                return Err(ArchiveError::Config(format!(
                    "endpoint {:?} has no host",
                    config.endpoint
                )))
            }
        };
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ArchiveError::Config(format!("HTTP client: {e}")))?;
        let signer = RequestSigner::new(config.credentials.clone(), config.region.clone());
        Ok(Self {
            http,
            config,
            signer,
            host,
        })
    }

    pub fn config(&self) -> &S3Config {
        &self.config
    }

    fn request(&self, method: Method, key: &str, headers: BTreeMap<String, String>) -> reqwest::RequestBuilder {
        let canonical_uri = uri_encode_path(&format!("/{}/{}", self.config.bucket, key));
        let url = format!("{}{canonical_uri}", self.config.endpoint);
        let signed = self.signer.sign(
            SigningRequest {
                method: method.as_str(),
                host: &self.host,
                canonical_uri: &canonical_uri,
                payload_hash: UNSIGNED_PAYLOAD,
                headers,
            },
            Utc::now(),
        );
        debug!(%method, %url, "s3 request");
        let mut builder = self.http.request(method, url);
        for (name, value) in signed {
            builder = builder.header(name, value);
        }
        builder
    }

    async fn failure(key: &str, resp: reqwest::Response) -> ArchiveError {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        ArchiveError::Http {
            status,
            key: key.to_string(),
            message: error_code(&body),
        }
    }
}

#[async_trait]
impl ObjectBackend for S3Backend {
    async fn head(&self, key: &str) -> ArchiveResult<Option<ObjectHead>> {
        let resp = self.request(Method::HEAD, key, BTreeMap::new()).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(Self::failure(key, resp).await);
        }
        let header = |name: reqwest::header::HeaderName| resp.headers().get(name).and_then(|v| v.to_str().ok());
        let etag = header(ETAG).map(str::to_string);
        let size = header(CONTENT_LENGTH).and_then(|v| v.parse().ok());
        Ok(Some(ObjectHead { etag, size }))
    }

    async fn put(&self, key: &str, body: File, options: &PutOptions) -> ArchiveResult<()> {
        let mut headers = BTreeMap::new();
        headers.insert("content-length".to_string(), options.content_length.to_string());
        headers.insert("content-md5".to_string(), options.content_md5.clone());
        headers.insert("content-type".to_string(), options.content_type.clone());
        headers.insert("x-amz-acl".to_string(), "bucket-owner-full-control".to_string());
        if options.server_side_encryption {
            headers.insert("x-amz-server-side-encryption".to_string(), "AES256".to_string());
        }
        let resp = self
            .request(Method::PUT, key, headers)
            .body(reqwest::Body::from(body))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::failure(key, resp).await);
        }
        Ok(())
    }

    async fn get(&self, key: &str, sink: &mut (dyn AsyncWrite + Send + Unpin)) -> ArchiveResult<u64> {
        let mut resp = self.request(Method::GET, key, BTreeMap::new()).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(ArchiveError::NotFound(key.to_string()));
        }
        if !resp.status().is_success() {
            return Err(Self::failure(key, resp).await);
        }
        let mut written = 0u64;
        while let Some(chunk) = resp.chunk().await? {
            sink.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        Ok(written)
    }
}

/// Pull the `<Code>` out of an S3 XML error body, or fall back to the
/// first line of the body.
fn error_code(body: &str) -> String {
    if let Some(start) = body.find("<Code>") {
        let rest = &body[start + "<Code>".len()..];
        if let Some(end) = rest.find("</Code>") {
            return rest[..end].to_string();
        }
    }
    let line = body.lines().next().unwrap_or("").trim();
    if line.is_empty() {
        "no error details".to_string()
    } else {
        line.chars().take(200).collect()
    }
}
