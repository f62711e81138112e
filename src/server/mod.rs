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

use crate::http::FsHttpHandler;
use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Mutex;

const LISTEN_BACKLOG: i32 = 1024;
const SOCKET_BUFFER_BYTES: usize = 4 * 1024 * 1024;

type ShutdownSignal = Pin<Box<dyn Future<Output = ()> + Send>>;

#[async_trait]
pub trait ConnectionManager: Send + Sync + 'static {
    async fn serve(&self, addr: SocketAddr)
        -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Bind a TCP listener with latency-oriented socket options.
pub fn bind_listener(addr: SocketAddr) -> std::io::Result<tokio::net::TcpListener> {
    let domain = if addr.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;

    // Small JSON responses; do not wait to coalesce them.
    socket.set_nodelay(true)?;
    socket.set_recv_buffer_size(SOCKET_BUFFER_BYTES)?;
    socket.set_send_buffer_size(SOCKET_BUFFER_BYTES)?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;

    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;

    tokio::net::TcpListener::from_std(socket.into())
}

/// HTTP connection manager using Axum.
pub struct HttpConnectionManager {
    handler: FsHttpHandler,
    shutdown: Mutex<Option<ShutdownSignal>>,
}

impl HttpConnectionManager {
    pub fn new(handler: FsHttpHandler) -> Self {
        Self {
            handler,
            shutdown: Mutex::new(None),
        }
    }

    /// Stop accepting and drain in-flight requests once `signal` resolves.
    pub fn with_shutdown(self, signal: impl Future<Output = ()> + Send + 'static) -> Self {
        Self {
            shutdown: Mutex::new(Some(Box::pin(signal))),
            ..self
        }
    }
}

#[async_trait]
impl ConnectionManager for HttpConnectionManager {
    async fn serve(
        &self,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let listener = bind_listener(addr)?;
        tracing::info!(%addr, "HTTP server listening (TCP_NODELAY, 4MB socket buffers)");

        let app = self.handler.clone().router();
        let signal = self
            .shutdown
            .lock()
            .map_err(|_| "shutdown signal lock poisoned")?
            .take();

        match signal {
            Some(signal) => axum::serve(listener, app).with_graceful_shutdown(signal).await?,
            None => axum::serve(listener, app).await?,
        }
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
