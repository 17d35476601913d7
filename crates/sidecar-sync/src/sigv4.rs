//! AWS Signature Version 4 header signing for S3 requests.

use std::collections::BTreeMap;
use std::fmt::Write;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest as _, Sha256};

use crate::config::Credentials;

pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";
pub const SERVICE: &str = "s3";
/// Payload hash placeholder; integrity is asserted with `Content-MD5` instead.
pub const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

/// A request to be signed.
#[derive(Clone, Debug)]
pub struct SigningRequest<'a> {
    pub method: &'a str,
    /// `host[:port]` exactly as it will be sent.
    pub host: &'a str,
    /// Already URI-encoded path, see [`uri_encode_path`].
    pub canonical_uri: &'a str,
    pub payload_hash: &'a str,
    /// Additional headers to sign, lowercase names.
    pub headers: BTreeMap<String, String>,
}

/// Signs requests with one set of credentials for one region.
#[derive(Clone, Debug)]
pub struct RequestSigner {
    credentials: Credentials,
    region: String,
}

impl RequestSigner {
    pub fn new(credentials: Credentials, region: impl Into<String>) -> Self {
        Self {
            credentials,
            region: region.into(),
        }
    }

    /// Compute the headers to send with `request` at time `now`.
    ///
    /// The result holds the request's own headers plus `x-amz-date`,
    /// `x-amz-content-sha256`, the session token if any, and `authorization`.
    /// `host` is signed but not returned; the HTTP client sets it.
    pub fn sign(&self, request: SigningRequest<'_>, now: DateTime<Utc>) -> BTreeMap<String, String> {
        let date = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let scope = format!("{date}/{}/{SERVICE}/aws4_request", self.region);

        let mut headers = request.headers;
        headers.insert("x-amz-date".into(), amz_date.clone());
        headers.insert("x-amz-content-sha256".into(), request.payload_hash.to_string());
        if let Some(token) = &self.credentials.session_token {
            headers.insert("x-amz-security-token".into(), token.clone());
        }

        let mut signed: BTreeMap<&str, &str> = headers
            .iter()
            .map(|(k, v)| (k.as_str(), v.trim()))
            .collect();
        signed.insert("host", request.host);

        let mut canonical_headers = String::new();
        for (name, value) in &signed {
            let _ = writeln!(canonical_headers, "{name}:{value}");
        }
        let signed_headers = signed.keys().copied().collect::<Vec<_>>().join(";");

        let canonical_request = format!(
            "{}\n{}\n\n{}\n{}\n{}",
            request.method, request.canonical_uri, canonical_headers, signed_headers, request.payload_hash
        );
        let string_to_sign = format!(
            "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
            hex_sha256(canonical_request.as_bytes())
        );
        let signature = calculate_signature(
            &self.credentials.secret_access_key,
            &date,
            &self.region,
            &string_to_sign,
        );

        let authorization = format!(
            "{ALGORITHM} Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
            self.credentials.access_key_id
        );
        headers.insert("authorization".into(), authorization);
        headers
    }
}

/// URI-encode a path, preserving slashes.
pub fn uri_encode_path(path: &str) -> String {
    let mut result = String::with_capacity(path.len() * 3);
    for byte in path.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                result.push(byte as char);
            }
            _ => {
                let _ = write!(result, "%{byte:02X}");
            }
        }
    }
    result
}

fn hex_sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn calculate_signature(secret_key: &str, date: &str, region: &str, string_to_sign: &str) -> String {
    let k_date = hmac_sha256(format!("AWS4{secret_key}").as_bytes(), date.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, SERVICE.as_bytes());
    let k_signing = hmac_sha256(&k_service, b"aws4_request");
    hex::encode(hmac_sha256(&k_signing, string_to_sign.as_bytes()))
}
