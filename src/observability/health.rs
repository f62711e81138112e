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

/// Health checks for the object store and the session store
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::auth::SessionStore;
use crate::storage::StorageBackend;

const CHECK_BUCKET: &str = "tenant-0";
const CHECK_TOKEN: &str = "__health_check__";

/// Overall health status
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: String,
    pub checks: Vec<HealthCheck>,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

/// Individual health check result
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthCheck {
    pub name: String,
    pub status: String,
    pub message: Option<String>,
    pub duration_ms: f64,
}

impl HealthCheck {
    fn from_result<E: std::fmt::Display>(name: &str, start: Instant, result: Result<(), E>) -> Self {
        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        match result {
            Ok(()) => Self {
                name: name.to_string(),
                status: "healthy".to_string(),
                message: None,
                duration_ms,
            },
            Err(e) => Self {
                name: name.to_string(),
                status: "unhealthy".to_string(),
                message: Some(format!("{name} check failed: {e}")),
                duration_ms,
            },
        }
    }
}

/// The store answers an existence check
pub async fn check_storage_health(storage: &Arc<dyn StorageBackend>) -> HealthCheck {
    let start = Instant::now();
    let result = storage.bucket_exists(CHECK_BUCKET).await.map(|_| ());
    HealthCheck::from_result("storage", start, result)
}

/// An unknown token is a miss, not an error
pub async fn check_session_health(sessions: &Arc<dyn SessionStore>) -> HealthCheck {
    let start = Instant::now();
    let result = sessions.load(CHECK_TOKEN).await.map(|_| ());
    HealthCheck::from_result("sessions", start, result)
}

/// Get overall health status by checking all backends
pub async fn get_health_status(
    storage: &Arc<dyn StorageBackend>,
    sessions: &Arc<dyn SessionStore>,
) -> HealthStatus {
    let checks = vec![
        check_storage_health(storage).await,
        check_session_health(sessions).await,
    ];

    let all_healthy = checks.iter().all(|c| c.status == "healthy");

    HealthStatus {
        status: if all_healthy {
            "healthy".to_string()
        } else {
            "unhealthy".to_string()
        },
        timestamp: chrono::Utc::now().to_rfc3339(),
        checks,
    }
}
