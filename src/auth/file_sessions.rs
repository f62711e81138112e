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

use crate::auth::{AuthError, Session, SessionStore, PRINCIPAL_KEY};
use async_trait::async_trait;
use std::{collections::HashMap, path::PathBuf, sync::Arc};
use tokio::sync::RwLock;

/// File-backed session store.
///
/// File format (one per line):
///   token:principal
/// Lines starting with '#' are comments. Blank lines are ignored.
///
/// Sessions are loaded on startup; `reload()` re-reads the file.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
    sessions: Arc<RwLock<HashMap<String, String>>>,
}

impl FileSessionStore {
    pub async fn new(path: impl Into<PathBuf>) -> Result<Self, AuthError> {
        let this = Self {
            path: path.into(),
            sessions: Arc::new(RwLock::new(HashMap::new())),
        };
        this.reload().await?;
        Ok(this)
    }

    pub async fn reload(&self) -> Result<(), AuthError> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| AuthError::Internal(format!("read {}: {e}", self.path.display())))?;

        let mut map = HashMap::new();
        for (idx, line) in raw.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (token, principal) = line.split_once(':').ok_or_else(|| {
                AuthError::Internal(format!(
                    "invalid sessions file format at line {} (expected token:principal)",
                    idx + 1
                ))
            })?;
            map.insert(token.trim().to_string(), principal.trim().to_string());
        }

        tracing::info!(path = %self.path.display(), sessions = map.len(), "loaded sessions");
        let mut guard = self.sessions.write().await;
        *guard = map;
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self, token: &str) -> Result<Option<Session>, AuthError> {
        let guard = self.sessions.read().await;
        Ok(guard
            .get(token)
            .map(|principal| Session::new().with_value(PRINCIPAL_KEY, principal.clone())))
    }
}
