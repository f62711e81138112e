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

//! Per-tenant byte quota.
//!
//! The ledger keeps no counter of its own. Usage is always the sum of object
//! sizes currently in the container, so deletes and out-of-band changes are
//! reflected on the next check.

use crate::observability::metrics;
use crate::storage::StorageBackend;
use crate::vfs::VfsError;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

pub const DEFAULT_LIMIT_BYTES: u64 = 100 * 1024 * 1024;
const MIB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    pub used_bytes: u64,
    pub limit_bytes: u64,
    pub percent_used: f64,
    #[serde(rename = "usedMiB")]
    pub used_mib: f64,
    #[serde(rename = "limitMiB")]
    pub limit_mib: f64,
}

impl UsageStats {
    fn new(used_bytes: u64, limit_bytes: u64) -> Self {
        let percent_used = if limit_bytes == 0 {
            0.0
        } else {
            used_bytes as f64 / limit_bytes as f64 * 100.0
        };
        Self {
            used_bytes,
            limit_bytes,
            percent_used,
            used_mib: used_bytes as f64 / MIB,
            limit_mib: limit_bytes as f64 / MIB,
        }
    }
}

/// Permission to write `incoming` bytes. In strict mode it also holds the
/// tenant's write lock until dropped, so check and write cannot interleave
/// with another strict writer.
#[derive(Debug)]
pub struct Reservation {
    pub used: u64,
    pub incoming: u64,
    _guard: Option<OwnedMutexGuard<()>>,
}

pub struct QuotaLedger {
    storage: Arc<dyn StorageBackend>,
    limit: u64,
    strict: bool,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl QuotaLedger {
    pub fn new(storage: Arc<dyn StorageBackend>, limit: u64, strict: bool) -> Self {
        Self {
            storage,
            limit,
            strict,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Bytes currently stored in `bucket`, from a full recursive listing.
    /// A scan that cannot be completed is an error, never a smaller total.
    pub async fn usage(&self, bucket: &str) -> Result<u64, VfsError> {
        let mut listing = self.storage.list_objects(bucket, "").await?;
        let mut used: u64 = 0;
        while let Some(item) = listing.next().await {
            match item {
                Ok(entry) => used = used.saturating_add(entry.size),
                Err(e) => {
                    tracing::warn!(bucket, error = %e, "usage scan failed");
                    return Err(VfsError::BackingStoreUnavailable(format!(
                        "usage scan of {bucket}: {e}"
                    )));
                }
            }
        }
        metrics::set_tenant_used_bytes(bucket, used);
        Ok(used)
    }

    /// Reject with `QuotaExceeded` if `used + incoming` would pass the limit.
    #[tracing::instrument(skip(self))]
    pub async fn check_and_reserve(
        &self,
        bucket: &str,
        incoming: u64,
    ) -> Result<Reservation, VfsError> {
        let guard = if self.strict {
            Some(self.tenant_lock(bucket).await.lock_owned().await)
        } else {
            None
        };

        let used = self.usage(bucket).await?;
        if used.saturating_add(incoming) > self.limit {
            metrics::increment_quota_rejection();
            tracing::info!(bucket, used, incoming, limit = self.limit, "quota exceeded");
            return Err(VfsError::QuotaExceeded {
                used,
                incoming,
                limit: self.limit,
            });
        }

        Ok(Reservation {
            used,
            incoming,
            _guard: guard,
        })
    }

    pub async fn stats(&self, bucket: &str) -> Result<UsageStats, VfsError> {
        let used = self.usage(bucket).await?;
        Ok(UsageStats::new(used, self.limit))
    }

    async fn tenant_lock(&self, bucket: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(bucket.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::in_memory::InMemoryStorage;
    use crate::vfs::test_support::FlakyStorage;
    use bytes::Bytes;
    use std::time::Duration;

    const MB: u64 = 1024 * 1024;

    async fn storage_with_mb(sizes: &[u64]) -> Arc<InMemoryStorage> {
        let storage = Arc::new(InMemoryStorage::new());
        storage.create_bucket("tenant-1").await.unwrap();
        for (i, size) in sizes.iter().enumerate() {
            let data = Bytes::from(vec![0u8; (*size * MB) as usize]);
            storage
                .put_object("tenant-1", &format!("dir/f{i}"), data, "application/octet-stream")
                .await
                .unwrap();
        }
        storage
    }

    #[tokio::test]
    async fn test_over_limit_rejected() {
        let storage = storage_with_mb(&[60]).await;
        let ledger = QuotaLedger::new(storage, DEFAULT_LIMIT_BYTES, false);

        match ledger.check_and_reserve("tenant-1", 50 * MB).await {
            Err(VfsError::QuotaExceeded { used, incoming, limit }) => {
                assert_eq!(used, 60 * MB);
                assert_eq!(incoming, 50 * MB);
                assert_eq!(limit, DEFAULT_LIMIT_BYTES);
            }
            other => panic!("expected quota error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_within_limit_allowed() {
        let storage = storage_with_mb(&[60]).await;
        let ledger = QuotaLedger::new(storage, DEFAULT_LIMIT_BYTES, false);
        let reservation = ledger.check_and_reserve("tenant-1", 30 * MB).await.unwrap();
        assert_eq!(reservation.used, 60 * MB);
    }

    #[tokio::test]
    async fn test_exactly_at_limit_allowed() {
        let storage = storage_with_mb(&[]).await;
        let ledger = QuotaLedger::new(storage, 10, false);
        assert!(ledger.check_and_reserve("tenant-1", 10).await.is_ok());
        assert!(ledger.check_and_reserve("tenant-1", 11).await.is_err());
    }

    #[tokio::test]
    async fn test_usage_counts_nested_objects() {
        let storage = storage_with_mb(&[1, 2]).await;
        storage
            .put_object("tenant-1", "a/b/c/deep", Bytes::from(vec![0u8; 10]), "x/y")
            .await
            .unwrap();
        let ledger = QuotaLedger::new(storage, DEFAULT_LIMIT_BYTES, false);

        let stats = ledger.stats("tenant-1").await.unwrap();
        assert_eq!(stats.used_bytes, 3 * MB + 10);
        assert_eq!(stats.limit_bytes, DEFAULT_LIMIT_BYTES);
        assert!((stats.limit_mib - 100.0).abs() < f64::EPSILON);
        assert!(stats.percent_used > 3.0 && stats.percent_used < 3.1);
    }

    #[tokio::test]
    async fn test_incomplete_scan_refuses_writes() {
        let storage = storage_with_mb(&[1, 1]).await;
        let flaky = Arc::new(FlakyStorage::new(storage).fail_list_entry("dir/f1"));
        let ledger = QuotaLedger::new(flaky, DEFAULT_LIMIT_BYTES, false);

        assert!(matches!(
            ledger.check_and_reserve("tenant-1", 1).await,
            Err(VfsError::BackingStoreUnavailable(_))
        ));
        assert!(matches!(
            ledger.stats("tenant-1").await,
            Err(VfsError::BackingStoreUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_strict_mode_serializes_writers() {
        let storage = storage_with_mb(&[]).await;
        let ledger = Arc::new(QuotaLedger::new(storage, DEFAULT_LIMIT_BYTES, true));

        let held = ledger.check_and_reserve("tenant-1", 1).await.unwrap();
        let contender = {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.check_and_reserve("tenant-1", 1).await.is_ok() })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!contender.is_finished());

        drop(held);
        assert!(contender.await.unwrap());
    }
}
