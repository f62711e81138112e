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

//! Hierarchical filesystem over a flat object store.
//!
//! Every operation is scoped to one tenant container. Folders are not stored
//! as such: a folder exists while any key lives under its prefix, or while
//! its zero-length marker object (`name/`) does.

pub mod content_type;
pub mod deleter;
pub mod entry;
pub mod error;
pub mod export;
pub mod lister;
pub mod mover;
pub mod path;
pub mod quota;
#[cfg(test)]
pub(crate) mod test_support;

pub use deleter::DeleteOutcome;
pub use entry::{DirEntry, FileEntry, FolderEntry, ItemKind};
pub use error::{BatchReport, ItemFailure, VfsError};
pub use export::Archive;
pub use mover::MoveReport;
pub use quota::UsageStats;

use crate::observability::metrics;
use crate::storage::{ObjectReader, StorageBackend};
use crate::tenant::{Tenant, TenantDirectory, TenantResolver};
use bytes::Bytes;
use deleter::DeleteOperator;
use export::ArchiveExporter;
use lister::NamespaceLister;
use mover::MoveOperator;
use quota::QuotaLedger;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct VfsConfig {
    pub quota_limit_bytes: u64,
    /// Serialize check-and-write per tenant so concurrent uploads cannot
    /// jointly overshoot the limit.
    pub strict_quota: bool,
    pub link_ttl: Duration,
    pub delete_batch_size: usize,
    pub delete_queue_depth: usize,
    /// 0 means unbounded.
    pub max_archive_bytes: u64,
}

impl Default for VfsConfig {
    fn default() -> Self {
        Self {
            quota_limit_bytes: quota::DEFAULT_LIMIT_BYTES,
            strict_quota: false,
            link_ttl: Duration::from_secs(3600),
            delete_batch_size: deleter::DEFAULT_BATCH_SIZE,
            delete_queue_depth: deleter::DEFAULT_QUEUE_DEPTH,
            max_archive_bytes: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub entries: Vec<DirEntry>,
    pub current_path: String,
}

/// One file of an upload request.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UploadReport {
    pub uploaded: Vec<String>,
    pub failed: Vec<ItemFailure>,
}

pub struct Download {
    pub reader: ObjectReader,
    pub content_type: String,
    pub size: u64,
    pub file_name: String,
}

fn observe<T>(operation: &str, start: Instant, result: &Result<T, VfsError>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(e) => e.kind(),
    };
    metrics::record_vfs_op(operation, outcome, start.elapsed().as_secs_f64());
    if let Err(e) = result {
        metrics::increment_error(e.kind(), "vfs");
    }
}

#[derive(Clone)]
pub struct VirtualFs {
    storage: Arc<dyn StorageBackend>,
    resolver: TenantResolver,
    lister: NamespaceLister,
    quota: Arc<QuotaLedger>,
    deleter: DeleteOperator,
    mover: MoveOperator,
    exporter: ArchiveExporter,
}

impl VirtualFs {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        directory: Arc<dyn TenantDirectory>,
        config: VfsConfig,
    ) -> Self {
        let deleter = DeleteOperator::new(
            storage.clone(),
            config.delete_batch_size,
            config.delete_queue_depth,
        );
        Self {
            resolver: TenantResolver::new(storage.clone(), directory),
            lister: NamespaceLister::new(storage.clone(), config.link_ttl),
            quota: Arc::new(QuotaLedger::new(
                storage.clone(),
                config.quota_limit_bytes,
                config.strict_quota,
            )),
            mover: MoveOperator::new(storage.clone(), deleter.clone()),
            exporter: ArchiveExporter::new(storage.clone(), config.max_archive_bytes),
            deleter,
            storage,
        }
    }

    pub fn storage(&self) -> &Arc<dyn StorageBackend> {
        &self.storage
    }

    /// Map an authenticated principal to its tenant, provisioning on first use.
    pub async fn resolve(&self, principal: &str) -> Result<Tenant, VfsError> {
        if principal.is_empty() {
            return Err(VfsError::NotAuthenticated);
        }
        Ok(self.resolver.resolve(principal).await?)
    }

    pub async fn list(&self, tenant: &Tenant, path: &str) -> Result<Listing, VfsError> {
        let start = Instant::now();
        let result = async {
            let prefix = path::dir_prefix(path)?;
            let entries = self.lister.list(&tenant.container, &prefix).await?;
            Ok::<_, VfsError>(Listing {
                entries,
                current_path: prefix,
            })
        }
        .await;
        observe("list", start, &result);
        result
    }

    /// Store `files` under the folder `path`. The quota is checked once for
    /// the whole request; a rejection writes nothing.
    pub async fn upload(
        &self,
        tenant: &Tenant,
        path: &str,
        files: Vec<UploadFile>,
    ) -> Result<UploadReport, VfsError> {
        let start = Instant::now();
        let result = async {
            let prefix = path::dir_prefix(path)?;
            let incoming = files
                .iter()
                .fold(0u64, |acc, f| acc.saturating_add(f.data.len() as u64));
            let _reservation = self
                .quota
                .check_and_reserve(&tenant.container, incoming)
                .await?;

            let mut report = UploadReport::default();
            for file in files {
                let name = match path::name(&file.name) {
                    Ok(name) => name,
                    Err(e) => {
                        tracing::warn!(bucket = %tenant.container, name = %file.name, "rejecting upload name");
                        report.failed.push(ItemFailure::new(file.name.clone(), e));
                        continue;
                    }
                };
                let key = format!("{prefix}{name}");
                let content_type = file
                    .content_type
                    .as_deref()
                    .filter(|ct| !ct.is_empty())
                    .unwrap_or(content_type::DEFAULT_CONTENT_TYPE);
                match self
                    .storage
                    .put_object(&tenant.container, &key, file.data.clone(), content_type)
                    .await
                {
                    Ok(_) => report.uploaded.push(key),
                    Err(e) => {
                        tracing::warn!(bucket = %tenant.container, key = %key, error = %e, "upload failed");
                        report.failed.push(ItemFailure::new(file.name.clone(), e));
                    }
                }
            }
            metrics::increment_batch_failures("upload", report.failed.len());
            Ok::<_, VfsError>(report)
        }
        .await;
        observe("upload", start, &result);
        result
    }

    pub async fn download(&self, tenant: &Tenant, path: &str) -> Result<Download, VfsError> {
        let start = Instant::now();
        let result = async {
            let key = path::object_key(path)?;
            let (reader, meta) = self.storage.get_object(&tenant.container, &key).await?;
            let file_name = path::base_name(&key).to_string();
            let content_type = content_type::resolve(&file_name, Some(&meta.content_type));
            Ok::<_, VfsError>(Download {
                reader,
                content_type,
                size: meta.size,
                file_name,
            })
        }
        .await;
        observe("download", start, &result);
        result
    }

    pub async fn delete(
        &self,
        tenant: &Tenant,
        path: &str,
        kind: ItemKind,
        confirmed: bool,
    ) -> Result<DeleteOutcome, VfsError> {
        let start = Instant::now();
        let result = async {
            let key = path::object_key(path)?;
            self.deleter
                .delete(&tenant.container, &key, kind, confirmed)
                .await
        }
        .await;
        observe("delete", start, &result);
        result
    }

    /// Create the marker for `parent/name/`. Returns the marker key.
    pub async fn create_folder(
        &self,
        tenant: &Tenant,
        parent: &str,
        name: &str,
    ) -> Result<String, VfsError> {
        let start = Instant::now();
        let result = async {
            let prefix = path::dir_prefix(parent)?;
            let name = path::name(name.trim())?;
            let marker = format!("{prefix}{name}/");
            self.storage
                .put_object(
                    &tenant.container,
                    &marker,
                    Bytes::new(),
                    content_type::FOLDER_MARKER_CONTENT_TYPE,
                )
                .await?;
            tracing::info!(bucket = %tenant.container, key = %marker, "created folder");
            Ok::<_, VfsError>(marker)
        }
        .await;
        observe("create_folder", start, &result);
        result
    }

    pub async fn move_item(
        &self,
        tenant: &Tenant,
        source: &str,
        destination: &str,
        kind: ItemKind,
    ) -> Result<MoveReport, VfsError> {
        let start = Instant::now();
        let result = async {
            let source = path::object_key(source)?;
            let dest_prefix = path::dir_prefix(destination)?;
            self.mover
                .move_item(&tenant.container, &source, &dest_prefix, kind)
                .await
        }
        .await;
        observe("move", start, &result);
        result
    }

    pub async fn export_zip(&self, tenant: &Tenant, path: &str) -> Result<Archive, VfsError> {
        let start = Instant::now();
        let result = async {
            let prefix = path::dir_prefix(path)?;
            self.exporter.export(&tenant.container, &prefix).await
        }
        .await;
        observe("export", start, &result);
        result
    }

    pub async fn usage_stats(&self, tenant: &Tenant) -> Result<UsageStats, VfsError> {
        let start = Instant::now();
        let result = self.quota.stats(&tenant.container).await;
        observe("usage", start, &result);
        result
    }
}
