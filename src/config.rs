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

use crate::storage::presign::{PresignError, Presigner};
use crate::vfs::VfsConfig;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// HTTP listen address, e.g. "127.0.0.1:8080"
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Path to the sessions file (token:principal lines)
    #[serde(default = "default_sessions_file")]
    pub sessions_file: String,

    /// Base URL clients use to reach this server; presigned links point here
    #[serde(default = "default_public_endpoint")]
    pub public_endpoint: String,

    /// Region embedded in the presigned credential scope
    #[serde(default = "default_region")]
    pub region: String,

    /// Prefix for x-request-id response headers (helpful for log correlation)
    #[serde(default = "default_request_id_prefix")]
    pub request_id_prefix: String,

    #[serde(default)]
    pub quota: QuotaConfig,

    #[serde(default)]
    pub presign: PresignConfig,

    #[serde(default)]
    pub delete: DeleteConfig,

    #[serde(default)]
    pub export: ExportConfig,

    #[serde(default)]
    pub upload: UploadConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuotaConfig {
    /// Per-tenant cap in bytes
    #[serde(default = "default_quota_limit_bytes")]
    pub limit_bytes: u64,
    /// Serialize quota check and write per tenant
    #[serde(default)]
    pub strict: bool,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            limit_bytes: default_quota_limit_bytes(),
            strict: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PresignConfig {
    /// Empty key pair disables direct-access links
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub secret_key: String,
    /// Lifetime of links handed out in listings
    #[serde(default = "default_presign_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for PresignConfig {
    fn default() -> Self {
        Self {
            access_key: String::new(),
            secret_key: String::new(),
            ttl_secs: default_presign_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeleteConfig {
    /// Keys per batch-delete request
    #[serde(default = "default_delete_batch_size")]
    pub batch_size: usize,
    /// Capacity of the queue between the listing and deleting stages
    #[serde(default = "default_delete_queue_depth")]
    pub queue_depth: usize,
}

impl Default for DeleteConfig {
    fn default() -> Self {
        Self {
            batch_size: default_delete_batch_size(),
            queue_depth: default_delete_queue_depth(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExportConfig {
    /// Refuse to archive subtrees larger than this (0 = unlimited)
    #[serde(default)]
    pub max_subtree_bytes: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    /// Largest accepted request body
    #[serde(default = "default_max_request_bytes")]
    pub max_request_bytes: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_request_bytes: default_max_request_bytes(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            sessions_file: default_sessions_file(),
            public_endpoint: default_public_endpoint(),
            region: default_region(),
            request_id_prefix: default_request_id_prefix(),
            quota: QuotaConfig::default(),
            presign: PresignConfig::default(),
            delete: DeleteConfig::default(),
            export: ExportConfig::default(),
            upload: UploadConfig::default(),
        }
    }
}

impl Config {
    pub fn from_path(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let s = std::fs::read_to_string(path)?;
        let cfg: Config = toml::from_str(&s)?;
        Ok(cfg)
    }

    pub fn vfs_config(&self) -> VfsConfig {
        VfsConfig {
            quota_limit_bytes: self.quota.limit_bytes,
            strict_quota: self.quota.strict,
            link_ttl: Duration::from_secs(self.presign.ttl_secs),
            delete_batch_size: self.delete.batch_size,
            delete_queue_depth: self.delete.queue_depth,
            max_archive_bytes: self.export.max_subtree_bytes,
        }
    }

    /// `None` when no signing key pair is configured.
    pub fn presigner(&self) -> Result<Option<Presigner>, PresignError> {
        if self.presign.access_key.is_empty() && self.presign.secret_key.is_empty() {
            return Ok(None);
        }
        Presigner::new(
            &self.public_endpoint,
            &self.presign.access_key,
            &self.presign.secret_key,
            &self.region,
        )
        .map(Some)
    }
}

fn default_listen_addr() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_sessions_file() -> String {
    "./sessions.txt".to_string()
}

fn default_public_endpoint() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_request_id_prefix() -> String {
    "req-".to_string()
}

fn default_quota_limit_bytes() -> u64 {
    100 * 1024 * 1024 // 100 MiB
}

fn default_presign_ttl_secs() -> u64 {
    3600 // 1 hour
}

fn default_delete_batch_size() -> usize {
    1000
}

fn default_delete_queue_depth() -> usize {
    1000
}

fn default_max_request_bytes() -> usize {
    128 * 1024 * 1024 // 128 MiB
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.listen_addr, "127.0.0.1:8080");
        assert_eq!(cfg.quota.limit_bytes, 100 * 1024 * 1024);
        assert!(!cfg.quota.strict);
        assert_eq!(cfg.delete.batch_size, 1000);
        assert_eq!(cfg.export.max_subtree_bytes, 0);
        assert!(cfg.presigner().unwrap().is_none());
    }

    #[test]
    fn test_sections_override_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            listen_addr = "0.0.0.0:9000"
            public_endpoint = "https://files.example.com"

            [quota]
            limit_bytes = 1048576
            strict = true

            [presign]
            access_key = "demo"
            secret_key = "demo-secret"
            ttl_secs = 60

            [export]
            max_subtree_bytes = 4096
            "#,
        )
        .unwrap();

        let vfs = cfg.vfs_config();
        assert_eq!(vfs.quota_limit_bytes, 1048576);
        assert!(vfs.strict_quota);
        assert_eq!(vfs.link_ttl, Duration::from_secs(60));
        assert_eq!(vfs.max_archive_bytes, 4096);

        let presigner = cfg.presigner().unwrap().unwrap();
        assert_eq!(presigner.endpoint(), "https://files.example.com");
    }

    #[test]
    fn test_bad_endpoint_rejected() {
        let cfg: Config = toml::from_str(
            r#"
            public_endpoint = "files.example.com"
            [presign]
            access_key = "demo"
            secret_key = "demo-secret"
            "#,
        )
        .unwrap();
        assert!(cfg.presigner().is_err());
    }
}
