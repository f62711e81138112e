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

use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tenantfs::auth::file_sessions::FileSessionStore;
use tenantfs::auth::SessionStore;
use tenantfs::config::Config;
use tenantfs::handler::BaseHandler;
use tenantfs::http::FsHttpHandler;
use tenantfs::observability::tracing_setup;
use tenantfs::server::{ConnectionManager, HttpConnectionManager};
use tenantfs::storage::in_memory::InMemoryStorage;
use tenantfs::storage::StorageBackend;
use tenantfs::tenant::InMemoryTenantDirectory;
use tenantfs::vfs::VirtualFs;

#[derive(Parser, Debug)]
#[command(name = "tenantfs")]
#[command(about = "Per-tenant hierarchical file storage over a flat object store", long_about = None)]
struct Args {
    /// Address to listen on (e.g., 0.0.0.0:8080)
    #[arg(short, long)]
    listen: Option<String>,

    /// Path to configuration file; built-in defaults are used when absent
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Path to sessions file (token:principal lines)
    #[arg(short, long)]
    sessions_file: Option<String>,
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_setup::init_tracing_from_env();

    let args = Args::parse();

    let cfg = if std::path::Path::new(&args.config).exists() {
        Config::from_path(&args.config).map_err(|e| e.to_string())?
    } else {
        tracing::warn!(config = %args.config, "config file not found, using defaults");
        Config::default()
    };

    // Command line args override config file
    let addr: SocketAddr = args.listen.as_ref().unwrap_or(&cfg.listen_addr).parse()?;
    let sessions_file = args.sessions_file.as_ref().unwrap_or(&cfg.sessions_file);
    let sessions: Arc<dyn SessionStore> = Arc::new(FileSessionStore::new(sessions_file).await?);

    let presigner = cfg.presigner()?;
    let storage: Arc<dyn StorageBackend> = match &presigner {
        Some(p) => {
            tracing::info!(endpoint = %p.endpoint(), ttl_secs = cfg.presign.ttl_secs, "direct-access links enabled");
            Arc::new(InMemoryStorage::with_presigner(p.clone()))
        }
        None => {
            tracing::warn!("no presign key pair configured, listings will carry empty links");
            Arc::new(InMemoryStorage::new())
        }
    };

    let vfs = VirtualFs::new(
        storage,
        Arc::new(InMemoryTenantDirectory::new()),
        cfg.vfs_config(),
    );
    tracing::info!(
        limit_bytes = cfg.quota.limit_bytes,
        strict = cfg.quota.strict,
        "tenant quota configured"
    );

    let handler = BaseHandler::new(sessions, vfs, presigner);
    let http = FsHttpHandler::new(handler, cfg.upload.max_request_bytes, &cfg.request_id_prefix);

    let manager = HttpConnectionManager::new(http).with_shutdown(shutdown_signal());
    manager.serve(addr).await?;
    Ok(())
}
