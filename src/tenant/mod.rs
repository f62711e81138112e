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

//! Principal -> container resolution.

use crate::storage::{StorageBackend, StorageError};
use std::sync::Arc;
use thiserror::Error;

pub mod directory;

pub use directory::{InMemoryTenantDirectory, TenantDirectory};

#[derive(Debug, Error)]
pub enum TenantError {
    #[error("backing store unavailable: {0}")]
    BackingStoreUnavailable(String),
    #[error("tenant resolution failed: {0}")]
    ResolutionFailed(String),
}

/// A resolved tenant: who it is and which container holds its files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tenant {
    pub id: u64,
    pub principal: String,
    pub container: String,
}

/// Container names depend on nothing but the internal tenant id.
pub fn container_name(tenant_id: u64) -> String {
    format!("tenant-{tenant_id}")
}

#[derive(Clone)]
pub struct TenantResolver {
    storage: Arc<dyn StorageBackend>,
    directory: Arc<dyn TenantDirectory>,
}

impl TenantResolver {
    pub fn new(storage: Arc<dyn StorageBackend>, directory: Arc<dyn TenantDirectory>) -> Self {
        Self { storage, directory }
    }

    /// Resolve `principal` to its container, creating the container and the
    /// persisted association on first use. Safe to race: a concurrent creator
    /// winning is the same as the container already existing.
    #[tracing::instrument(skip(self))]
    pub async fn resolve(&self, principal: &str) -> Result<Tenant, TenantError> {
        let id = self.directory.tenant_id(principal).await?;
        let container = container_name(id);

        match self.storage.create_bucket(&container).await {
            Ok(true) => tracing::info!(bucket = %container, "created tenant container"),
            Ok(false) => tracing::debug!(bucket = %container, "tenant container already exists"),
            Err(e) => return Err(map_storage_err(e)),
        }

        match self.directory.container_name(id).await? {
            Some(stored) if stored == container => {}
            Some(stored) => {
                return Err(TenantError::ResolutionFailed(format!(
                    "tenant {id} is associated with {stored}, expected {container}"
                )))
            }
            None => self.directory.set_container_name(id, &container).await?,
        }

        Ok(Tenant {
            id,
            principal: principal.to_string(),
            container,
        })
    }
}

fn map_storage_err(e: StorageError) -> TenantError {
    match e {
        StorageError::Unavailable(m) => TenantError::BackingStoreUnavailable(m),
        other => TenantError::ResolutionFailed(other.to_string()),
    }
}
