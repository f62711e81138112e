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

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use bytes::Bytes;
use chrono::{Duration as ChronoDuration, Utc};
use http_body_util::BodyExt;
use std::sync::Arc;
use std::time::Duration;
use tenantfs::auth::{AuthError, Session, SessionStore, PRINCIPAL_KEY};
use tenantfs::handler::BaseHandler;
use tenantfs::http::FsHttpHandler;
use tenantfs::storage::in_memory::InMemoryStorage;
use tenantfs::storage::presign::{parse_link, Presigner};
use tenantfs::storage::StorageBackend;
use tenantfs::tenant::InMemoryTenantDirectory;
use tenantfs::vfs::{DirEntry, UploadFile, VfsConfig, VirtualFs};
use tower::ServiceExt;

const ACCESS_KEY: &str = "demo";
const SECRET_KEY: &str = "demo-secret";
const REGION: &str = "us-east-1";
const ENDPOINT: &str = "http://localhost:8080";

struct SingleSession;

#[async_trait::async_trait]
impl SessionStore for SingleSession {
    async fn load(&self, token: &str) -> Result<Option<Session>, AuthError> {
        Ok((token == "tok-ann")
            .then(|| Session::new().with_value(PRINCIPAL_KEY, "ann@example.com")))
    }
}

fn presigner() -> Presigner {
    Presigner::new(ENDPOINT, ACCESS_KEY, SECRET_KEY, REGION).unwrap()
}

fn setup() -> (VirtualFs, axum::Router) {
    let storage = Arc::new(InMemoryStorage::with_presigner(presigner()));
    let vfs = VirtualFs::new(
        storage,
        Arc::new(InMemoryTenantDirectory::new()),
        VfsConfig::default(),
    );
    let base = BaseHandler::new(Arc::new(SingleSession), vfs.clone(), Some(presigner()));
    let app = FsHttpHandler::new(base, 1024 * 1024, "req-").router();
    (vfs, app)
}

fn follow(url: &str) -> Request<Body> {
    let path_and_query = url.strip_prefix(ENDPOINT).unwrap();
    Request::builder()
        .uri(path_and_query)
        .body(Body::empty())
        .unwrap()
}

/// Upload one file and return the direct link the listing hands out for it.
async fn listed_link(vfs: &VirtualFs) -> String {
    let tenant = vfs.resolve("ann@example.com").await.unwrap();
    vfs.upload(
        &tenant,
        "docs",
        vec![UploadFile {
            name: "hello.txt".into(),
            content_type: Some("text/plain".into()),
            data: Bytes::from_static(b"Hello, World!"),
        }],
    )
    .await
    .unwrap();

    let listing = vfs.list(&tenant, "docs").await.unwrap();
    match &listing.entries[0] {
        DirEntry::File(f) => f.url.clone(),
        other => panic!("expected a file entry, got {other:?}"),
    }
}

#[tokio::test]
async fn test_listing_link_is_followable() {
    let (vfs, app) = setup();
    let url = listed_link(&vfs).await;
    assert!(url.starts_with("http://localhost:8080/storage/tenant-1/docs/hello.txt?"));

    let (path, params) = parse_link(&url).unwrap();
    assert_eq!(path, "/storage/tenant-1/docs/hello.txt");
    assert_eq!(params["X-Amz-Expires"], "3600");
    assert!(params["X-Amz-Credential"].starts_with("demo/"));

    let response = app.oneshot(follow(&url)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"Hello, World!");
}

#[tokio::test]
async fn test_tampered_signature_is_forbidden() {
    let (vfs, app) = setup();
    let url = listed_link(&vfs).await;

    let (sig_start, _) = url.split_once("X-Amz-Signature=").unwrap();
    let tampered = format!("{sig_start}X-Amz-Signature={}", "0".repeat(64));
    let response = app.oneshot(follow(&tampered)).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_link_does_not_cover_other_keys() {
    let (vfs, app) = setup();
    let url = listed_link(&vfs).await;

    let other = url.replace("hello.txt", "other.txt");
    let response = app.oneshot(follow(&other)).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_expired_link_is_forbidden() {
    let (vfs, app) = setup();
    let tenant = vfs.resolve("ann@example.com").await.unwrap();
    vfs.storage()
        .put_object(
            &tenant.container,
            "old.txt",
            Bytes::from_static(b"stale"),
            "text/plain",
        )
        .await
        .unwrap();

    let issued = Utc::now() - ChronoDuration::hours(2);
    let url = presigner()
        .presign_get(&tenant.container, "old.txt", Duration::from_secs(60), issued)
        .unwrap();
    let response = app.oneshot(follow(&url)).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_missing_signature_is_forbidden() {
    let (vfs, app) = setup();
    let url = listed_link(&vfs).await;

    let (without_sig, _) = url.split_once("&X-Amz-Signature=").unwrap();
    let response = app.oneshot(follow(without_sig)).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
