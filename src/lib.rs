pub mod auth;
pub mod config;
pub mod handler;
pub mod http;
pub mod observability;
pub mod server;
pub mod storage;
pub mod tenant;
pub mod vfs;

pub use auth::{AuthContext, SessionStore};
pub use handler::BaseHandler;
pub use http::FsHttpHandler;
pub use storage::{ObjectMetadata, StorageBackend};
pub use vfs::{VfsError, VirtualFs};
