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

use crate::tenant::TenantError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Persistence for tenant ids and their container names. In production this
/// is a row in the user table.
#[async_trait]
pub trait TenantDirectory: Send + Sync + 'static {
    /// Internal id for `principal`, registering it on first sight.
    async fn tenant_id(&self, principal: &str) -> Result<u64, TenantError>;

    async fn container_name(&self, tenant_id: u64) -> Result<Option<String>, TenantError>;

    async fn set_container_name(&self, tenant_id: u64, name: &str) -> Result<(), TenantError>;
}

#[derive(Debug, Default)]
struct DirectoryState {
    ids: HashMap<String, u64>,
    names: HashMap<u64, String>,
    next_id: u64,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryTenantDirectory {
    state: Arc<RwLock<DirectoryState>>,
}

impl InMemoryTenantDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TenantDirectory for InMemoryTenantDirectory {
    async fn tenant_id(&self, principal: &str) -> Result<u64, TenantError> {
        if principal.is_empty() {
            return Err(TenantError::ResolutionFailed("empty principal".into()));
        }
        if let Some(id) = self.state.read().await.ids.get(principal) {
            return Ok(*id);
        }

        let mut state = self.state.write().await;
        // Re-check: another caller may have registered between the two locks.
        if let Some(id) = state.ids.get(principal) {
            return Ok(*id);
        }
        state.next_id += 1;
        let id = state.next_id;
        state.ids.insert(principal.to_string(), id);
        tracing::info!(tenant_id = id, "registered tenant");
        Ok(id)
    }

    async fn container_name(&self, tenant_id: u64) -> Result<Option<String>, TenantError> {
        Ok(self.state.read().await.names.get(&tenant_id).cloned())
    }

    async fn set_container_name(&self, tenant_id: u64, name: &str) -> Result<(), TenantError> {
        let mut state = self.state.write().await;
        if !state.ids.values().any(|id| *id == tenant_id) {
            return Err(TenantError::ResolutionFailed(format!(
                "unknown tenant id {tenant_id}"
            )));
        }
        state.names.insert(tenant_id, name.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ids_are_stable_and_distinct() {
        let dir = InMemoryTenantDirectory::new();
        let a = dir.tenant_id("a").await.unwrap();
        let b = dir.tenant_id("b").await.unwrap();
        assert_ne!(a, b);
        assert_eq!(dir.tenant_id("a").await.unwrap(), a);
    }

    #[tokio::test]
    async fn test_set_name_for_unknown_tenant() {
        let dir = InMemoryTenantDirectory::new();
        assert!(dir.set_container_name(42, "tenant-42").await.is_err());
        assert_eq!(dir.container_name(42).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_empty_principal_rejected() {
        let dir = InMemoryTenantDirectory::new();
        assert!(dir.tenant_id("").await.is_err());
    }
}
