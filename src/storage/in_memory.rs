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

use crate::storage::common::{compute_etag, validate_bucket, validate_key};
use crate::storage::presign::Presigner;
use crate::storage::{
    DeleteError, ObjectEntry, ObjectListing, ObjectMetadata, ObjectReader, StorageBackend,
    StorageError,
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    meta: ObjectMetadata,
}

/// In-memory storage implementation.
///
/// Data structures:
/// - `buckets`: a set of bucket names
/// - `objects`: a BTreeMap keyed by (bucket, key) => StoredObject
///
/// BTreeMap gives deterministic iteration order (useful for tests and predictable listing).
/// Every put and remove takes the write lock, so each is atomic per key.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStorage {
    buckets: Arc<RwLock<BTreeSet<String>>>,
    objects: Arc<RwLock<BTreeMap<(String, String), StoredObject>>>,
    presigner: Option<Presigner>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage that can hand out presigned GET links.
    pub fn with_presigner(presigner: Presigner) -> Self {
        Self {
            presigner: Some(presigner),
            ..Self::default()
        }
    }

    async fn ensure_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        let b = self.buckets.read().await;
        if !b.contains(bucket) {
            return Err(StorageError::BucketNotFound(bucket.to_string()));
        }
        Ok(())
    }

    fn not_found(bucket: &str, key: &str) -> StorageError {
        StorageError::ObjectNotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    }
}

#[async_trait]
impl StorageBackend for InMemoryStorage {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError> {
        validate_bucket(bucket)?;
        Ok(self.buckets.read().await.contains(bucket))
    }

    async fn create_bucket(&self, bucket: &str) -> Result<bool, StorageError> {
        validate_bucket(bucket)?;
        let mut b = self.buckets.write().await;
        Ok(b.insert(bucket.to_string()))
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<ObjectMetadata, StorageError> {
        validate_bucket(bucket)?;
        validate_key(key)?;
        if content_type.is_empty() {
            return Err(StorageError::InvalidInput("content_type must be non-empty".into()));
        }
        self.ensure_bucket(bucket).await?;

        let meta = ObjectMetadata {
            content_type: content_type.to_string(),
            etag: compute_etag(&data),
            size: data.len() as u64,
            last_modified_unix_secs: Utc::now().timestamp(),
        };

        let mut objs = self.objects.write().await;
        objs.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                data,
                meta: meta.clone(),
            },
        );
        Ok(meta)
    }

    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<(ObjectReader, ObjectMetadata), StorageError> {
        validate_bucket(bucket)?;
        validate_key(key)?;
        let objs = self.objects.read().await;
        let obj = objs
            .get(&(bucket.to_string(), key.to_string()))
            .ok_or_else(|| Self::not_found(bucket, key))?;
        let reader: ObjectReader = Box::new(Cursor::new(obj.data.clone()));
        Ok((reader, obj.meta.clone()))
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectMetadata, StorageError> {
        validate_bucket(bucket)?;
        validate_key(key)?;
        let objs = self.objects.read().await;
        objs.get(&(bucket.to_string(), key.to_string()))
            .map(|obj| obj.meta.clone())
            .ok_or_else(|| Self::not_found(bucket, key))
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<bool, StorageError> {
        validate_bucket(bucket)?;
        validate_key(key)?;
        let mut objs = self.objects.write().await;
        Ok(objs.remove(&(bucket.to_string(), key.to_string())).is_some())
    }

    async fn delete_objects(
        &self,
        bucket: &str,
        keys: Vec<String>,
    ) -> Result<Vec<DeleteError>, StorageError> {
        validate_bucket(bucket)?;
        self.ensure_bucket(bucket).await?;

        let mut errors = Vec::new();
        let mut objs = self.objects.write().await;
        for key in keys {
            if let Err(error) = validate_key(&key) {
                errors.push(DeleteError { key, error });
                continue;
            }
            // Removing an absent key is not an error, same as a single delete.
            objs.remove(&(bucket.to_string(), key));
        }
        Ok(errors)
    }

    async fn copy_object(
        &self,
        bucket: &str,
        src_key: &str,
        dst_key: &str,
    ) -> Result<ObjectMetadata, StorageError> {
        validate_bucket(bucket)?;
        validate_key(src_key)?;
        validate_key(dst_key)?;
        self.ensure_bucket(bucket).await?;

        let mut objs = self.objects.write().await;
        let src = objs
            .get(&(bucket.to_string(), src_key.to_string()))
            .cloned()
            .ok_or_else(|| Self::not_found(bucket, src_key))?;
        let meta = ObjectMetadata {
            last_modified_unix_secs: Utc::now().timestamp(),
            ..src.meta
        };
        objs.insert(
            (bucket.to_string(), dst_key.to_string()),
            StoredObject {
                data: src.data,
                meta: meta.clone(),
            },
        );
        Ok(meta)
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<ObjectListing, StorageError> {
        validate_bucket(bucket)?;
        self.ensure_bucket(bucket).await?;

        let objs = self.objects.read().await;
        let mut out: Vec<ObjectEntry> = Vec::new();

        // Because keys are (bucket, key) sorted lexicographically, we can range-scan.
        let start = (bucket.to_string(), prefix.to_string());
        for ((b, k), v) in objs.range(start..) {
            if b != bucket || !k.starts_with(prefix) {
                break;
            }

            out.push(ObjectEntry {
                key: k.clone(),
                size: v.meta.size,
                last_modified_unix_secs: v.meta.last_modified_unix_secs,
                content_type: v.meta.content_type.clone(),
            });
        }
        drop(objs);

        Ok(ObjectListing::spawn_from(out))
    }

    async fn presigned_get(
        &self,
        bucket: &str,
        key: &str,
        ttl: Duration,
    ) -> Result<String, StorageError> {
        validate_bucket(bucket)?;
        validate_key(key)?;
        let presigner = self
            .presigner
            .as_ref()
            .ok_or_else(|| StorageError::Internal("presigning is not configured".into()))?;
        presigner
            .presign_get(bucket, key, ttl, Utc::now())
            .map_err(|e| StorageError::Internal(format!("presign {bucket}/{key}: {e}")))
    }
}
