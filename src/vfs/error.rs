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

use crate::storage::StorageError;
use crate::tenant::TenantError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VfsError {
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("bucket not found: {0}")]
    BucketNotFound(String),
    #[error("object not found: {0}")]
    ObjectNotFound(String),
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("quota exceeded: {used} bytes used, {incoming} incoming, limit {limit}")]
    QuotaExceeded { used: u64, incoming: u64, limit: u64 },
    #[error("move failed: {0}")]
    MoveFailed(String),
    #[error("{} item(s) failed", failed.len())]
    PartialFailure { failed: Vec<ItemFailure> },
    #[error("archive too large: {size} bytes, limit {limit}")]
    ArchiveTooLarge { size: u64, limit: u64 },
    #[error("backing store unavailable: {0}")]
    BackingStoreUnavailable(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl VfsError {
    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            VfsError::NotAuthenticated => "not_authenticated",
            VfsError::BucketNotFound(_) => "bucket_not_found",
            VfsError::ObjectNotFound(_) => "object_not_found",
            VfsError::InvalidPath(_) => "invalid_path",
            VfsError::QuotaExceeded { .. } => "quota_exceeded",
            VfsError::MoveFailed(_) => "move_failed",
            VfsError::PartialFailure { .. } => "partial_failure",
            VfsError::ArchiveTooLarge { .. } => "archive_too_large",
            VfsError::BackingStoreUnavailable(_) => "backing_store_unavailable",
            VfsError::Internal(_) => "internal",
        }
    }
}

impl From<StorageError> for VfsError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::BucketNotFound(b) => VfsError::BucketNotFound(b),
            StorageError::ObjectNotFound { key, .. } => VfsError::ObjectNotFound(key),
            StorageError::InvalidInput(m) => VfsError::InvalidPath(m),
            StorageError::Unavailable(m) => VfsError::BackingStoreUnavailable(m),
            StorageError::Internal(m) => VfsError::Internal(m),
        }
    }
}

impl From<TenantError> for VfsError {
    fn from(e: TenantError) -> Self {
        match e {
            TenantError::BackingStoreUnavailable(m) => VfsError::BackingStoreUnavailable(m),
            TenantError::ResolutionFailed(m) => VfsError::Internal(format!("resolve tenant: {m}")),
        }
    }
}

/// One item that failed inside a batch operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub key: String,
    pub reason: String,
}

impl ItemFailure {
    pub fn new(key: impl Into<String>, reason: impl ToString) -> Self {
        Self {
            key: key.into(),
            reason: reason.to_string(),
        }
    }
}

/// Per-item outcome of a batch: which keys went through, which did not.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<ItemFailure>,
}

impl BatchReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Turn sub-failures into an error for callers that want all-or-report.
    pub fn ensure_complete(self) -> Result<Self, VfsError> {
        if self.is_complete() {
            Ok(self)
        } else {
            Err(VfsError::PartialFailure {
                failed: self.failed,
            })
        }
    }
}
