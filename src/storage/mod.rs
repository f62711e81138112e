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

//! Object store client contract.
//!
//! The store is flat: a container (bucket) holds keys, and nothing here knows
//! about folders. Everything hierarchical is layered on top in `crate::vfs`.

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;

pub mod common;
pub mod in_memory;
pub mod presign;

/// Depth of the channel backing an [`ObjectListing`].
pub const LISTING_CHANNEL_DEPTH: usize = 1000;

#[derive(Debug, Clone)]
pub struct ObjectMetadata {
    pub content_type: String,
    pub etag: String,
    pub size: u64,
    pub last_modified_unix_secs: i64,
}

/// One row of a prefix listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    pub key: String,
    pub size: u64,
    pub last_modified_unix_secs: i64,
    pub content_type: String,
}

impl ObjectEntry {
    /// Zero-length objects whose key ends in `/` exist only to keep empty
    /// folders visible.
    pub fn is_folder_marker(&self) -> bool {
        self.key.ends_with('/')
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("bucket not found: {0}")]
    BucketNotFound(String),
    #[error("object not found: {bucket}/{key}")]
    ObjectNotFound { bucket: String, key: String },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("internal storage error: {0}")]
    Internal(String),
}

/// Byte stream of a stored object.
pub type ObjectReader = Box<dyn AsyncRead + Send + Unpin>;

/// Per-key outcome of a failed entry in a batch delete.
#[derive(Debug)]
pub struct DeleteError {
    pub key: String,
    pub error: StorageError,
}

/// Lazily produced listing. Entries arrive over a bounded channel; a failed
/// entry is delivered in-band so consumers can log it and keep going.
///
/// Dropping the listing stops the producer at its next send.
#[derive(Debug)]
pub struct ObjectListing {
    rx: mpsc::Receiver<Result<ObjectEntry, StorageError>>,
}

impl ObjectListing {
    pub fn new(rx: mpsc::Receiver<Result<ObjectEntry, StorageError>>) -> Self {
        Self { rx }
    }

    /// Feed an already materialized set of entries through a producer task.
    pub fn spawn_from(entries: Vec<ObjectEntry>) -> Self {
        let (tx, rx) = mpsc::channel(LISTING_CHANNEL_DEPTH);
        tokio::spawn(async move {
            for entry in entries {
                if tx.send(Ok(entry)).await.is_err() {
                    break;
                }
            }
        });
        Self { rx }
    }

    pub async fn next(&mut self) -> Option<Result<ObjectEntry, StorageError>> {
        self.rx.recv().await
    }

    /// Drain the listing, logging and skipping failed entries.
    pub async fn collect_ok(mut self, bucket: &str) -> Vec<ObjectEntry> {
        let mut out = Vec::new();
        while let Some(item) = self.next().await {
            match item {
                Ok(entry) => out.push(entry),
                Err(e) => tracing::warn!(bucket, error = %e, "skipping listing entry"),
            }
        }
        out
    }
}

#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError>;

    /// Returns `false` when the bucket already existed.
    async fn create_bucket(&self, bucket: &str) -> Result<bool, StorageError>;

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<ObjectMetadata, StorageError>;

    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<(ObjectReader, ObjectMetadata), StorageError>;

    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectMetadata, StorageError>;

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<bool, StorageError>;

    /// Remove many keys in one request. Only keys that failed are reported;
    /// an `Err` means the request as a whole could not be issued.
    async fn delete_objects(
        &self,
        bucket: &str,
        keys: Vec<String>,
    ) -> Result<Vec<DeleteError>, StorageError> {
        let mut errors = Vec::new();
        for key in keys {
            if let Err(error) = self.delete_object(bucket, &key).await {
                errors.push(DeleteError { key, error });
            }
        }
        Ok(errors)
    }

    async fn copy_object(
        &self,
        bucket: &str,
        src_key: &str,
        dst_key: &str,
    ) -> Result<ObjectMetadata, StorageError>;

    /// Every key starting with `prefix`, at any depth, in key order.
    async fn list_objects(&self, bucket: &str, prefix: &str)
        -> Result<ObjectListing, StorageError>;

    async fn presigned_get(
        &self,
        bucket: &str,
        key: &str,
        ttl: Duration,
    ) -> Result<String, StorageError>;
}
