use crate::auth::{AuthError, SessionStore};
use crate::storage::presign::Presigner;
use crate::tenant::Tenant;
use crate::vfs::{VfsError, VirtualFs};
use axum::http::HeaderMap;
use std::sync::Arc;

/// Components shared by every request handler
#[derive(Clone)]
pub struct BaseHandler {
    pub sessions: Arc<dyn SessionStore>,
    pub vfs: VirtualFs,
    /// Verifies followed direct-access links; `None` rejects them all
    pub presigner: Option<Presigner>,
}

impl BaseHandler {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        vfs: VirtualFs,
        presigner: Option<Presigner>,
    ) -> Self {
        Self {
            sessions,
            vfs,
            presigner,
        }
    }

    /// Session -> principal -> tenant for one request.
    pub async fn tenant(&self, headers: &HeaderMap) -> Result<Tenant, VfsError> {
        let ctx = self
            .sessions
            .authenticate(headers)
            .await
            .map_err(|e| match e {
                AuthError::MissingSession | AuthError::InvalidSession => VfsError::NotAuthenticated,
                AuthError::Internal(msg) => VfsError::Internal(format!("session store: {msg}")),
            })?;
        self.vfs.resolve(&ctx.principal).await
    }
}
