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

//! Move as copy-then-delete. The store has no rename, so a move is never
//! atomic: a failure between the two steps leaves the object at both places.

use crate::observability::metrics;
use crate::storage::StorageBackend;
use crate::vfs::deleter::DeleteOperator;
use crate::vfs::entry::ItemKind;
use crate::vfs::path::{base_name, folder_marker};
use crate::vfs::{ItemFailure, VfsError};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MoveReport {
    /// Destination keys written.
    pub moved: Vec<String>,
    /// Sources that could not be copied. A folder move still removes them.
    pub failed: Vec<ItemFailure>,
    /// Sources that could not be removed afterwards.
    pub residual: Vec<String>,
}

impl MoveReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.residual.is_empty()
    }

    pub fn ensure_complete(self) -> Result<Self, VfsError> {
        if self.is_complete() {
            return Ok(self);
        }
        let mut failed = self.failed;
        failed.extend(
            self.residual
                .into_iter()
                .map(|k| ItemFailure::new(k, "source not removed")),
        );
        Err(VfsError::PartialFailure { failed })
    }
}

#[derive(Clone)]
pub struct MoveOperator {
    storage: Arc<dyn StorageBackend>,
    deleter: DeleteOperator,
}

impl MoveOperator {
    pub fn new(storage: Arc<dyn StorageBackend>, deleter: DeleteOperator) -> Self {
        Self { storage, deleter }
    }

    /// Move `source` (object key form) into the folder `dest_prefix`
    /// (`""` or `a/b/`), keeping its base name.
    #[tracing::instrument(skip(self))]
    pub async fn move_item(
        &self,
        bucket: &str,
        source: &str,
        dest_prefix: &str,
        kind: ItemKind,
    ) -> Result<MoveReport, VfsError> {
        let report = match kind {
            ItemKind::File => self.move_file(bucket, source, dest_prefix).await?,
            ItemKind::Folder => self.move_folder(bucket, source, dest_prefix).await?,
        };
        metrics::increment_batch_failures("move", report.failed.len() + report.residual.len());
        Ok(report)
    }

    async fn move_file(
        &self,
        bucket: &str,
        source: &str,
        dest_prefix: &str,
    ) -> Result<MoveReport, VfsError> {
        let target = format!("{dest_prefix}{}", base_name(source));
        if target == source {
            return Ok(MoveReport::default());
        }

        self.storage
            .copy_object(bucket, source, &target)
            .await
            .map_err(|e| VfsError::MoveFailed(format!("copy {source} to {target}: {e}")))?;

        let mut report = MoveReport {
            moved: vec![target],
            ..MoveReport::default()
        };
        if let Err(e) = self.storage.delete_object(bucket, source).await {
            tracing::warn!(bucket, key = source, error = %e, "copied but could not remove source");
            report.residual.push(source.to_string());
        }
        Ok(report)
    }

    async fn move_folder(
        &self,
        bucket: &str,
        source: &str,
        dest_prefix: &str,
    ) -> Result<MoveReport, VfsError> {
        let src_prefix = folder_marker(source);
        let dst_root = format!("{dest_prefix}{}/", base_name(source));
        if dst_root == src_prefix {
            return Ok(MoveReport::default());
        }
        if dst_root.starts_with(&src_prefix) {
            return Err(VfsError::InvalidPath(format!(
                "cannot move {source} into its own subtree"
            )));
        }

        let objects = self
            .storage
            .list_objects(bucket, &src_prefix)
            .await
            .map_err(|e| VfsError::MoveFailed(format!("list {src_prefix}: {e}")))?
            .collect_ok(bucket)
            .await;
        if objects.is_empty() {
            tracing::debug!(bucket, source, "nothing to move");
            return Ok(MoveReport::default());
        }

        let mut report = MoveReport::default();
        let mut sources = Vec::with_capacity(objects.len());
        for object in objects {
            let relative = &object.key[src_prefix.len()..];
            let target = format!("{dst_root}{relative}");
            match self.storage.copy_object(bucket, &object.key, &target).await {
                Ok(_) => report.moved.push(target),
                Err(e) => {
                    tracing::warn!(bucket, key = %object.key, error = %e, "failed to copy object");
                    report.failed.push(ItemFailure::new(object.key.clone(), e));
                }
            }
            sources.push(object.key);
        }

        // The whole source subtree goes, copied or not.
        let removed = self.deleter.remove_keys(bucket, sources).await;
        report
            .residual
            .extend(removed.failed.into_iter().map(|f| f.key));
        Ok(report)
    }
}
