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

//! Two-phase recursive delete.
//!
//! Folder removal is a pipeline: a spawned producer feeds keys into a bounded
//! queue and the calling task drains it in `delete_objects` batches. Per-key
//! failures are logged and collected, never retried.

use crate::observability::metrics;
use crate::storage::{StorageBackend, StorageError};
use crate::vfs::entry::ItemKind;
use crate::vfs::path::folder_marker;
use crate::vfs::{BatchReport, ItemFailure, VfsError};
use std::sync::Arc;
use tokio::sync::mpsc;

pub const DEFAULT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_QUEUE_DEPTH: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The folder has contents and the caller has not confirmed yet.
    NeedsConfirmation { count: usize },
    Deleted(BatchReport),
}

#[derive(Clone)]
pub struct DeleteOperator {
    storage: Arc<dyn StorageBackend>,
    batch_size: usize,
    queue_depth: usize,
}

impl DeleteOperator {
    pub fn new(storage: Arc<dyn StorageBackend>, batch_size: usize, queue_depth: usize) -> Self {
        Self {
            storage,
            batch_size: batch_size.max(1),
            queue_depth: queue_depth.max(1),
        }
    }

    /// Delete `key` (normalized, no trailing slash).
    ///
    /// A file is removed right away. A folder with contents is only counted
    /// until `confirmed` is set.
    #[tracing::instrument(skip(self))]
    pub async fn delete(
        &self,
        bucket: &str,
        key: &str,
        kind: ItemKind,
        confirmed: bool,
    ) -> Result<DeleteOutcome, VfsError> {
        match kind {
            ItemKind::File => {
                let mut report = BatchReport::default();
                if self.storage.delete_object(bucket, key).await? {
                    report.succeeded.push(key.to_string());
                } else {
                    tracing::debug!(bucket, key, "file already absent");
                }
                Ok(DeleteOutcome::Deleted(report))
            }
            ItemKind::Folder => {
                let marker = folder_marker(key);
                let count = self.count_contents(bucket, &marker).await?;
                if count > 0 && !confirmed {
                    return Ok(DeleteOutcome::NeedsConfirmation { count });
                }

                let mut report = self.remove_prefix(bucket, &marker).await?;
                match self.storage.delete_object(bucket, &marker).await {
                    Ok(true) => report.succeeded.push(marker),
                    Ok(false) => {}
                    Err(e) => {
                        tracing::warn!(bucket, key = %marker, error = %e, "failed to delete folder marker");
                        report.failed.push(ItemFailure::new(marker, e));
                    }
                }
                metrics::increment_batch_failures("delete", report.failed.len());
                Ok(DeleteOutcome::Deleted(report))
            }
        }
    }

    /// Objects under `prefix`, the folder's own marker included.
    async fn count_contents(&self, bucket: &str, prefix: &str) -> Result<usize, VfsError> {
        let entries = self
            .storage
            .list_objects(bucket, prefix)
            .await?
            .collect_ok(bucket)
            .await;
        Ok(entries.len())
    }

    /// Remove every object under `prefix`.
    pub async fn remove_prefix(&self, bucket: &str, prefix: &str) -> Result<BatchReport, VfsError> {
        let (tx, rx) = mpsc::channel::<String>(self.queue_depth);
        let storage = self.storage.clone();
        let list_bucket = bucket.to_string();
        let list_prefix = prefix.to_string();

        let producer = tokio::spawn(async move {
            let mut listing = storage.list_objects(&list_bucket, &list_prefix).await?;
            while let Some(item) = listing.next().await {
                match item {
                    Ok(entry) => {
                        if tx.send(entry.key).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(bucket = %list_bucket, error = %e, "skipping entry while deleting")
                    }
                }
            }
            Ok::<(), StorageError>(())
        });

        let report = self.drain(bucket, rx).await;
        match producer.await {
            Ok(Ok(())) => Ok(report),
            Ok(Err(e)) => Err(e.into()),
            Err(e) => Err(VfsError::Internal(format!("delete producer: {e}"))),
        }
    }

    /// Remove exactly `keys`.
    pub async fn remove_keys(&self, bucket: &str, keys: Vec<String>) -> BatchReport {
        let (tx, rx) = mpsc::channel::<String>(self.queue_depth);
        let producer = tokio::spawn(async move {
            for key in keys {
                if tx.send(key).await.is_err() {
                    break;
                }
            }
        });
        let report = self.drain(bucket, rx).await;
        if let Err(e) = producer.await {
            tracing::error!(bucket, error = %e, "delete producer failed");
        }
        report
    }

    async fn drain(&self, bucket: &str, mut rx: mpsc::Receiver<String>) -> BatchReport {
        let mut report = BatchReport::default();
        let mut batch = Vec::with_capacity(self.batch_size);
        while let Some(key) = rx.recv().await {
            batch.push(key);
            if batch.len() >= self.batch_size {
                let full = std::mem::replace(&mut batch, Vec::with_capacity(self.batch_size));
                self.flush(bucket, full, &mut report).await;
            }
        }
        if !batch.is_empty() {
            self.flush(bucket, batch, &mut report).await;
        }
        report
    }

    async fn flush(&self, bucket: &str, keys: Vec<String>, report: &mut BatchReport) {
        tracing::debug!(bucket, count = keys.len(), "submitting batch delete");
        match self.storage.delete_objects(bucket, keys.clone()).await {
            Ok(errors) => {
                for err in &errors {
                    tracing::warn!(bucket, key = %err.key, error = %err.error, "failed to delete object");
                }
                let failed: std::collections::HashSet<&str> =
                    errors.iter().map(|e| e.key.as_str()).collect();
                report
                    .succeeded
                    .extend(keys.into_iter().filter(|k| !failed.contains(k.as_str())));
                report
                    .failed
                    .extend(errors.iter().map(|e| ItemFailure::new(e.key.clone(), &e.error)));
            }
            Err(e) => {
                tracing::warn!(bucket, count = keys.len(), error = %e, "batch delete request failed");
                report
                    .failed
                    .extend(keys.into_iter().map(|k| ItemFailure::new(k, &e)));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::in_memory::InMemoryStorage;
    use crate::vfs::test_support::FlakyStorage;
    use bytes::Bytes;

    async fn storage_with(keys: &[&str]) -> Arc<InMemoryStorage> {
        let storage = Arc::new(InMemoryStorage::new());
        storage.create_bucket("tenant-1").await.unwrap();
        for key in keys {
            storage
                .put_object("tenant-1", key, Bytes::from_static(b"x"), "text/plain")
                .await
                .unwrap();
        }
        storage
    }

    async fn keys(storage: &InMemoryStorage) -> Vec<String> {
        storage
            .list_objects("tenant-1", "")
            .await
            .unwrap()
            .collect_ok("tenant-1")
            .await
            .into_iter()
            .map(|e| e.key)
            .collect()
    }

    #[tokio::test]
    async fn test_folder_delete_needs_confirmation() {
        let storage = storage_with(&["docs/", "docs/a", "docs/b", "docs/sub/c", "keep"]).await;
        let op = DeleteOperator::new(storage.clone(), 2, 1);

        let outcome = op.delete("tenant-1", "docs", ItemKind::Folder, false).await.unwrap();
        assert_eq!(outcome, DeleteOutcome::NeedsConfirmation { count: 4 });
        assert_eq!(keys(&storage).await.len(), 5);

        let outcome = op.delete("tenant-1", "docs", ItemKind::Folder, true).await.unwrap();
        match outcome {
            DeleteOutcome::Deleted(report) => {
                assert!(report.failed.is_empty());
                assert_eq!(report.succeeded.len(), 4);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(keys(&storage).await, vec!["keep".to_string()]);
    }

    #[tokio::test]
    async fn test_marker_only_folder_needs_confirmation() {
        let storage = storage_with(&["empty/"]).await;
        let op = DeleteOperator::new(storage.clone(), DEFAULT_BATCH_SIZE, DEFAULT_QUEUE_DEPTH);
        let outcome = op.delete("tenant-1", "empty", ItemKind::Folder, false).await.unwrap();
        assert_eq!(outcome, DeleteOutcome::NeedsConfirmation { count: 1 });
        assert_eq!(keys(&storage).await, vec!["empty/".to_string()]);

        let outcome = op.delete("tenant-1", "empty", ItemKind::Folder, true).await.unwrap();
        assert!(matches!(outcome, DeleteOutcome::Deleted(r) if r.is_complete()));
        assert!(keys(&storage).await.is_empty());
    }

    #[tokio::test]
    async fn test_absent_folder_deletes_without_confirmation() {
        let storage = storage_with(&["keep"]).await;
        let op = DeleteOperator::new(storage.clone(), DEFAULT_BATCH_SIZE, DEFAULT_QUEUE_DEPTH);
        let outcome = op.delete("tenant-1", "ghost", ItemKind::Folder, false).await.unwrap();
        assert!(matches!(outcome, DeleteOutcome::Deleted(_)));
        assert_eq!(keys(&storage).await, vec!["keep".to_string()]);
    }

    #[tokio::test]
    async fn test_file_delete() {
        let storage = storage_with(&["a.txt", "b.txt"]).await;
        let op = DeleteOperator::new(storage.clone(), DEFAULT_BATCH_SIZE, DEFAULT_QUEUE_DEPTH);
        op.delete("tenant-1", "a.txt", ItemKind::File, false).await.unwrap();
        assert_eq!(keys(&storage).await, vec!["b.txt".to_string()]);
    }

    #[tokio::test]
    async fn test_per_key_failures_are_reported() {
        let storage = storage_with(&["d/1", "d/2", "d/3"]).await;
        let flaky = Arc::new(FlakyStorage::new(storage.clone()).fail_delete("d/2"));
        let op = DeleteOperator::new(flaky, 2, 4);

        let outcome = op.delete("tenant-1", "d", ItemKind::Folder, true).await.unwrap();
        let DeleteOutcome::Deleted(report) = outcome else {
            panic!("expected deletion");
        };
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].key, "d/2");
        assert_eq!(keys(&storage).await, vec!["d/2".to_string()]);
    }

    #[tokio::test]
    async fn test_remove_keys_only_touches_given_keys() {
        let storage = storage_with(&["a", "b", "c"]).await;
        let op = DeleteOperator::new(storage.clone(), 1, 1);
        let report = op.remove_keys("tenant-1", vec!["a".into(), "c".into()]).await;
        assert_eq!(report.succeeded, vec!["a".to_string(), "c".to_string()]);
        assert_eq!(keys(&storage).await, vec!["b".to_string()]);
    }
}
