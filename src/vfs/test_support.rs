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

//! Store wrapper that fails chosen keys, for exercising partial failures.

use crate::storage::in_memory::InMemoryStorage;
use crate::storage::{
    ObjectListing, ObjectMetadata, ObjectReader, StorageBackend, StorageError,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashSet;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};
use tokio::sync::mpsc;

/// Bytes handed out by a reader before it breaks.
const PARTIAL_READ_BYTES: usize = 4;

/// Reader that errors on every poll.
struct BrokenReader;

impl AsyncRead for BrokenReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Ready(Err(io::Error::new(
            io::ErrorKind::ConnectionReset,
            "injected read failure",
        )))
    }
}

#[derive(Default)]
struct Faults {
    copy: HashSet<String>,
    delete: HashSet<String>,
    get: HashSet<String>,
    put: HashSet<String>,
    read: HashSet<String>,
    list: HashSet<String>,
}

pub struct FlakyStorage {
    inner: Arc<InMemoryStorage>,
    faults: Faults,
}

impl FlakyStorage {
    pub fn new(inner: Arc<InMemoryStorage>) -> Self {
        Self {
            inner,
            faults: Faults::default(),
        }
    }

    pub fn fail_copy(mut self, key: &str) -> Self {
        self.faults.copy.insert(key.to_string());
        self
    }

    pub fn fail_delete(mut self, key: &str) -> Self {
        self.faults.delete.insert(key.to_string());
        self
    }

    /// `get_object` on `key` fails outright.
    pub fn fail_get(mut self, key: &str) -> Self {
        self.faults.get.insert(key.to_string());
        self
    }

    pub fn fail_put(mut self, key: &str) -> Self {
        self.faults.put.insert(key.to_string());
        self
    }

    /// `get_object` on `key` succeeds but the stream breaks after a few bytes.
    pub fn fail_read(mut self, key: &str) -> Self {
        self.faults.read.insert(key.to_string());
        self
    }

    /// Listings deliver an in-band error in place of `key`.
    pub fn fail_list_entry(mut self, key: &str) -> Self {
        self.faults.list.insert(key.to_string());
        self
    }
}

fn injected(op: &str, key: &str) -> StorageError {
    StorageError::Unavailable(format!("injected {op} failure for {key}"))
}

#[async_trait]
impl StorageBackend for FlakyStorage {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError> {
        self.inner.bucket_exists(bucket).await
    }

    async fn create_bucket(&self, bucket: &str) -> Result<bool, StorageError> {
        self.inner.create_bucket(bucket).await
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<ObjectMetadata, StorageError> {
        if self.faults.put.contains(key) {
            return Err(injected("put", key));
        }
        self.inner.put_object(bucket, key, data, content_type).await
    }

    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<(ObjectReader, ObjectMetadata), StorageError> {
        if self.faults.get.contains(key) {
            return Err(injected("get", key));
        }
        let (reader, meta) = self.inner.get_object(bucket, key).await?;
        if self.faults.read.contains(key) {
            let broken: ObjectReader =
                Box::new(reader.take(PARTIAL_READ_BYTES as u64).chain(BrokenReader));
            return Ok((broken, meta));
        }
        Ok((reader, meta))
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectMetadata, StorageError> {
        self.inner.head_object(bucket, key).await
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<bool, StorageError> {
        if self.faults.delete.contains(key) {
            return Err(injected("delete", key));
        }
        self.inner.delete_object(bucket, key).await
    }

    async fn copy_object(
        &self,
        bucket: &str,
        src_key: &str,
        dst_key: &str,
    ) -> Result<ObjectMetadata, StorageError> {
        if self.faults.copy.contains(src_key) {
            return Err(injected("copy", src_key));
        }
        self.inner.copy_object(bucket, src_key, dst_key).await
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<ObjectListing, StorageError> {
        let mut listing = self.inner.list_objects(bucket, prefix).await?;
        if self.faults.list.is_empty() {
            return Ok(listing);
        }

        let fail = self.faults.list.clone();
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            while let Some(item) = listing.next().await {
                let item = match item {
                    Ok(entry) if fail.contains(&entry.key) => Err(injected("list", &entry.key)),
                    other => other,
                };
                if tx.send(item).await.is_err() {
                    break;
                }
            }
        });
        Ok(ObjectListing::new(rx))
    }

    async fn presigned_get(
        &self,
        bucket: &str,
        key: &str,
        ttl: Duration,
    ) -> Result<String, StorageError> {
        self.inner.presigned_get(bucket, key, ttl).await
    }
}
