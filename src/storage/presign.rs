// Copyright PingCAP Inc. 2025.
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; version 2 of the License.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! Presigned GET links (AWS Signature Version 4, query-string form).
//!
//! Links point at `{endpoint}/storage/{bucket}/{key}` and carry the usual
//! `X-Amz-*` parameters. The same [`Presigner`] that issues a link verifies it
//! when the link is followed.

use chrono::{DateTime, Duration as ChronoDuration, NaiveDateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Route prefix under which presigned links are served.
pub const PRESIGN_ROUTE_PREFIX: &str = "/storage";

/// Maximum expiration time for presigned URLs (7 days in seconds).
const MAX_EXPIRES_SECONDS: u64 = 604800;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SERVICE: &str = "s3";
const SIGNED_HEADERS: &str = "host";
const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";
const AMZ_DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PresignError {
    #[error("access key and secret key are required")]
    MissingCredentials,
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("missing query parameter {0}")]
    MissingParameter(&'static str),
    #[error("malformed query parameter {0}")]
    Malformed(&'static str),
    #[error("unknown access key")]
    UnknownAccessKey,
    #[error("link expired")]
    Expired,
    #[error("signature mismatch")]
    SignatureMismatch,
}

#[derive(Debug, Clone)]
pub struct Presigner {
    endpoint: String,
    host: String,
    access_key: String,
    secret_key: String,
    region: String,
}

impl Presigner {
    pub fn new(
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
        region: &str,
    ) -> Result<Self, PresignError> {
        if access_key.is_empty() || secret_key.is_empty() {
            return Err(PresignError::MissingCredentials);
        }
        let endpoint = endpoint.trim_end_matches('/').to_string();
        let host = extract_host(&endpoint)?;
        Ok(Self {
            endpoint,
            host,
            access_key: access_key.to_string(),
            secret_key: secret_key.to_string(),
            region: region.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Build a GET link for `bucket/key` valid for `ttl` from `now`.
    pub fn presign_get(
        &self,
        bucket: &str,
        key: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<String, PresignError> {
        let expires = ttl.as_secs().clamp(1, MAX_EXPIRES_SECONDS);
        let date_str = now.format("%Y%m%d").to_string();
        let amz_date = now.format(AMZ_DATE_FORMAT).to_string();

        let mut params = BTreeMap::new();
        params.insert("X-Amz-Algorithm".to_string(), ALGORITHM.to_string());
        params.insert(
            "X-Amz-Credential".to_string(),
            format!("{}/{}", self.access_key, self.credential_scope(&date_str)),
        );
        params.insert("X-Amz-Date".to_string(), amz_date.clone());
        params.insert("X-Amz-Expires".to_string(), expires.to_string());
        params.insert("X-Amz-SignedHeaders".to_string(), SIGNED_HEADERS.to_string());

        let encoded_uri = uri_encode_path(&canonical_path(bucket, key));
        let canonical_query = build_canonical_query_string(&params);
        let signature = self
            .signing_mac(&encoded_uri, &canonical_query, &date_str, &amz_date)
            .finalize()
            .into_bytes();

        Ok(format!(
            "{}{}?{}&X-Amz-Signature={}",
            self.endpoint,
            encoded_uri,
            canonical_query,
            hex::encode(signature)
        ))
    }

    /// Check the decoded query parameters of a followed link.
    pub fn verify_get(
        &self,
        bucket: &str,
        key: &str,
        query: &BTreeMap<String, String>,
        now: DateTime<Utc>,
    ) -> Result<(), PresignError> {
        let param = |name: &'static str| {
            query
                .get(name)
                .map(String::as_str)
                .ok_or(PresignError::MissingParameter(name))
        };

        if param("X-Amz-Algorithm")? != ALGORITHM {
            return Err(PresignError::Malformed("X-Amz-Algorithm"));
        }
        if param("X-Amz-SignedHeaders")? != SIGNED_HEADERS {
            return Err(PresignError::Malformed("X-Amz-SignedHeaders"));
        }

        let amz_date = param("X-Amz-Date")?;
        let signed_at = NaiveDateTime::parse_from_str(amz_date, AMZ_DATE_FORMAT)
            .map_err(|_| PresignError::Malformed("X-Amz-Date"))?
            .and_utc();
        let date_str = signed_at.format("%Y%m%d").to_string();

        let credential = param("X-Amz-Credential")?;
        let (access_key, scope) = credential
            .split_once('/')
            .ok_or(PresignError::Malformed("X-Amz-Credential"))?;
        if access_key != self.access_key {
            return Err(PresignError::UnknownAccessKey);
        }
        if scope != self.credential_scope(&date_str) {
            return Err(PresignError::Malformed("X-Amz-Credential"));
        }

        let expires: u64 = param("X-Amz-Expires")?
            .parse()
            .map_err(|_| PresignError::Malformed("X-Amz-Expires"))?;
        if expires > MAX_EXPIRES_SECONDS {
            return Err(PresignError::Malformed("X-Amz-Expires"));
        }
        if now > signed_at + ChronoDuration::seconds(expires as i64) {
            return Err(PresignError::Expired);
        }

        let provided = hex::decode(param("X-Amz-Signature")?)
            .map_err(|_| PresignError::SignatureMismatch)?;
        let signed_params: BTreeMap<String, String> = query
            .iter()
            .filter(|(k, _)| k.as_str() != "X-Amz-Signature")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let encoded_uri = uri_encode_path(&canonical_path(bucket, key));
        let canonical_query = build_canonical_query_string(&signed_params);
        self.signing_mac(&encoded_uri, &canonical_query, &date_str, amz_date)
            .verify_slice(&provided)
            .map_err(|_| PresignError::SignatureMismatch)
    }

    fn credential_scope(&self, date_str: &str) -> String {
        format!("{}/{}/{}/aws4_request", date_str, self.region, SERVICE)
    }

    /// HMAC over the string to sign, keyed with the derived signing key.
    fn signing_mac(
        &self,
        encoded_uri: &str,
        canonical_query: &str,
        date_str: &str,
        amz_date: &str,
    ) -> HmacSha256 {
        let canonical_request = format!(
            "GET\n{}\n{}\nhost:{}\n\n{}\n{}",
            encoded_uri, canonical_query, self.host, SIGNED_HEADERS, UNSIGNED_PAYLOAD
        );
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            ALGORITHM,
            amz_date,
            self.credential_scope(date_str),
            hex_sha256(canonical_request.as_bytes())
        );
        let k_signing = signing_key(&self.secret_key, date_str, &self.region);
        let mut mac = keyed_mac(&k_signing);
        mac.update(string_to_sign.as_bytes());
        mac
    }
}

pub fn canonical_path(bucket: &str, key: &str) -> String {
    format!("{}/{}/{}", PRESIGN_ROUTE_PREFIX, bucket, key)
}

/// URI-encode each path segment, keeping the slashes between them.
fn uri_encode_path(path: &str) -> String {
    path.split('/')
        .map(urlencoding::encode)
        .collect::<Vec<_>>()
        .join("/")
}

fn build_canonical_query_string(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn keyed_mac(key: &[u8]) -> HmacSha256 {
    HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length")
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = keyed_mac(key);
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn signing_key(secret_key: &str, date: &str, region: &str) -> Vec<u8> {
    let k_date = hmac_sha256(format!("AWS4{}", secret_key).as_bytes(), date.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, SERVICE.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

fn extract_host(endpoint: &str) -> Result<String, PresignError> {
    let host = endpoint
        .strip_prefix("http://")
        .or_else(|| endpoint.strip_prefix("https://"))
        .ok_or_else(|| PresignError::InvalidEndpoint(endpoint.to_string()))?;
    let host = host.split('/').next().unwrap_or(host);
    if host.is_empty() {
        return Err(PresignError::InvalidEndpoint(endpoint.to_string()));
    }
    Ok(host.to_string())
}

/// Split a presigned link into its path and decoded query parameters.
/// Returns `None` if any parameter does not decode to UTF-8.
pub fn parse_link(url: &str) -> Option<(String, BTreeMap<String, String>)> {
    let rest = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"))?;
    let path_start = rest.find('/')?;
    let (path, query) = rest[path_start..].split_once('?')?;
    let params = query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| {
            let k = urlencoding::decode(k).ok()?;
            let v = urlencoding::decode(v).ok()?;
            Some((k.into_owned(), v.into_owned()))
        })
        .collect::<Option<BTreeMap<_, _>>>()?;
    Some((path.to_string(), params))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn presigner() -> Presigner {
        Presigner::new("http://localhost:8080", "demo", "demo-secret", "us-east-1").unwrap()
    }

    fn signed_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_presigned_url_shape() {
        let url = presigner()
            .presign_get("tenant-1", "docs/a b.txt", Duration::from_secs(3600), signed_at())
            .unwrap();

        assert!(url.starts_with("http://localhost:8080/storage/tenant-1/docs/a%20b.txt?"));
        assert!(url.contains("X-Amz-Algorithm=AWS4-HMAC-SHA256"));
        assert!(url.contains("X-Amz-Credential=demo%2F20250115%2Fus-east-1%2Fs3%2Faws4_request"));
        assert!(url.contains("X-Amz-Expires=3600"));
        assert!(url.contains("X-Amz-Signature="));
    }

    #[test]
    fn test_issued_link_verifies() {
        let p = presigner();
        let url = p
            .presign_get("tenant-1", "docs/a b.txt", Duration::from_secs(3600), signed_at())
            .unwrap();
        let (path, query) = parse_link(&url).unwrap();
        assert_eq!(path, "/storage/tenant-1/docs/a%20b.txt");

        let later = signed_at() + ChronoDuration::minutes(30);
        assert_eq!(p.verify_get("tenant-1", "docs/a b.txt", &query, later), Ok(()));
    }

    #[test]
    fn test_expired_link_rejected() {
        let p = presigner();
        let url = p
            .presign_get("tenant-1", "a.txt", Duration::from_secs(60), signed_at())
            .unwrap();
        let (_, query) = parse_link(&url).unwrap();

        let later = signed_at() + ChronoDuration::minutes(5);
        assert_eq!(
            p.verify_get("tenant-1", "a.txt", &query, later),
            Err(PresignError::Expired)
        );
    }

    #[test]
    fn test_link_for_other_key_rejected() {
        let p = presigner();
        let url = p
            .presign_get("tenant-1", "a.txt", Duration::from_secs(60), signed_at())
            .unwrap();
        let (_, query) = parse_link(&url).unwrap();

        assert_eq!(
            p.verify_get("tenant-2", "a.txt", &query, signed_at()),
            Err(PresignError::SignatureMismatch)
        );
    }

    #[test]
    fn test_other_secret_rejected() {
        let url = presigner()
            .presign_get("tenant-1", "a.txt", Duration::from_secs(60), signed_at())
            .unwrap();
        let (_, query) = parse_link(&url).unwrap();

        let other = Presigner::new("http://localhost:8080", "demo", "other", "us-east-1").unwrap();
        assert_eq!(
            other.verify_get("tenant-1", "a.txt", &query, signed_at()),
            Err(PresignError::SignatureMismatch)
        );
    }

    #[test]
    fn test_short_or_non_hex_signature_rejected() {
        let p = presigner();
        let url = p
            .presign_get("tenant-1", "a.txt", Duration::from_secs(60), signed_at())
            .unwrap();
        let (_, mut query) = parse_link(&url).unwrap();
        let genuine = query["X-Amz-Signature"].clone();

        for bad in [&genuine[..62], "zz", ""] {
            query.insert("X-Amz-Signature".into(), bad.to_string());
            assert_eq!(
                p.verify_get("tenant-1", "a.txt", &query, signed_at()),
                Err(PresignError::SignatureMismatch),
                "signature {bad:?}"
            );
        }

        query.insert("X-Amz-Signature".into(), genuine.to_uppercase());
        assert_eq!(p.verify_get("tenant-1", "a.txt", &query, signed_at()), Ok(()));
    }

    #[test]
    fn test_reserved_characters_are_escaped_per_segment() {
        let url = presigner()
            .presign_get("tenant-1", "r&d/50%+more é.txt", Duration::from_secs(60), signed_at())
            .unwrap();
        let (path, query) = parse_link(&url).unwrap();
        assert_eq!(path, "/storage/tenant-1/r%26d/50%25%2Bmore%20%C3%A9.txt");
        assert_eq!(query["X-Amz-Credential"], "demo/20250115/us-east-1/s3/aws4_request");
        assert_eq!(
            presigner().verify_get("tenant-1", "r&d/50%+more é.txt", &query, signed_at()),
            Ok(())
        );
    }

    #[test]
    fn test_undecodable_parameter_rejected() {
        assert!(parse_link("http://localhost:8080/storage/t/a.txt?X-Amz-Date=%FF%FE").is_none());
        assert!(parse_link("http://localhost:8080/storage/t/a.txt").is_none());
    }

    #[test]
    fn test_missing_credentials() {
        assert_eq!(
            Presigner::new("http://localhost:8080", "", "x", "us-east-1").unwrap_err(),
            PresignError::MissingCredentials
        );
        assert!(matches!(
            Presigner::new("localhost:8080", "a", "b", "us-east-1"),
            Err(PresignError::InvalidEndpoint(_))
        ));
    }
}
