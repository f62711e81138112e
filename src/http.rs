use crate::handler::BaseHandler;
use crate::observability::{health, metrics};
use crate::storage::presign::PRESIGN_ROUTE_PREFIX;
use crate::vfs::{DeleteOutcome, ItemKind, UploadFile, VfsError};
use axum::{
    body::Body,
    extract::{DefaultBodyLimit, MatchedPath, Multipart, Path, Query, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::io::ReaderStream;

/// Sequential request ids, e.g. `req-42`
#[derive(Debug)]
struct RequestIds {
    prefix: String,
    next: AtomicU64,
}

impl RequestIds {
    fn next(&self) -> String {
        format!("{}{}", self.prefix, self.next.fetch_add(1, Ordering::Relaxed))
    }
}

/// JSON file API wrapping BaseHandler
#[derive(Clone)]
pub struct FsHttpHandler {
    handler: Arc<BaseHandler>,
    max_request_bytes: usize,
    request_ids: Arc<RequestIds>,
}

impl FsHttpHandler {
    pub fn new(handler: BaseHandler, max_request_bytes: usize, request_id_prefix: &str) -> Self {
        Self {
            handler: Arc::new(handler),
            max_request_bytes,
            request_ids: Arc::new(RequestIds {
                prefix: request_id_prefix.to_string(),
                next: AtomicU64::new(1),
            }),
        }
    }

    /// Create the router for the file API
    pub fn router(self) -> Router {
        Router::new()
            .route("/api/list", get(list))
            .route("/api/upload", post(upload))
            .route("/api/download/*path", get(download))
            .route("/api/delete", post(delete))
            .route("/api/folders", post(create_folder))
            .route("/api/move", post(move_item))
            .route("/api/export", get(export_root))
            .route("/api/export/*path", get(export))
            .route("/api/usage", get(usage))
            .route(
                &format!("{PRESIGN_ROUTE_PREFIX}/:bucket/*key"),
                get(presigned_get),
            )
            .route("/health", get(health_check))
            .route("/metrics", get(metrics_text))
            .route_layer(middleware::from_fn_with_state(
                self.request_ids,
                track_requests,
            ))
            .layer(DefaultBodyLimit::max(self.max_request_bytes))
            .with_state(self.handler)
    }
}

async fn track_requests(
    State(ids): State<Arc<RequestIds>>,
    req: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let endpoint = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let request_id = ids.next();

    metrics::inc_concurrent_requests("http");
    let mut response = next.run(req).await;
    metrics::dec_concurrent_requests("http");

    let status = response.status().as_u16().to_string();
    metrics::increment_http_request(&method, &endpoint, &status);
    metrics::record_http_duration(&method, &endpoint, &status, start.elapsed().as_secs_f64());
    tracing::debug!(%method, %endpoint, %status, %request_id, "request finished");

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

#[derive(Debug)]
pub enum HttpError {
    Vfs(VfsError),
    BadRequest(String),
    Forbidden(String),
}

impl From<VfsError> for HttpError {
    fn from(e: VfsError) -> Self {
        HttpError::Vfs(e)
    }
}

fn vfs_error_response(e: VfsError) -> (StatusCode, serde_json::Value) {
    match e {
        VfsError::NotAuthenticated => (
            StatusCode::UNAUTHORIZED,
            json!({ "error": "Not authenticated" }),
        ),
        VfsError::BucketNotFound(_) | VfsError::ObjectNotFound(_) => {
            (StatusCode::NOT_FOUND, json!({ "error": e.to_string() }))
        }
        VfsError::InvalidPath(_) => (StatusCode::BAD_REQUEST, json!({ "error": e.to_string() })),
        VfsError::QuotaExceeded {
            used,
            incoming,
            limit,
        } => (
            StatusCode::PAYLOAD_TOO_LARGE,
            json!({
                "error": "Storage limit exceeded",
                "usedBytes": used,
                "incomingBytes": incoming,
                "limitBytes": limit,
            }),
        ),
        VfsError::ArchiveTooLarge { size, limit } => (
            StatusCode::PAYLOAD_TOO_LARGE,
            json!({ "error": "Folder too large to export", "size": size, "limit": limit }),
        ),
        VfsError::PartialFailure { failed } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "error": format!("{} item(s) failed", failed.len()), "failed": failed }),
        ),
        VfsError::BackingStoreUnavailable(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            json!({ "error": e.to_string() }),
        ),
        VfsError::MoveFailed(_) | VfsError::Internal(_) => {
            tracing::error!(error = %e, "request failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": e.to_string() }),
            )
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            HttpError::Vfs(e) => vfs_error_response(e),
            HttpError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            HttpError::Forbidden(msg) => (StatusCode::FORBIDDEN, json!({ "error": msg })),
        };
        (status, Json(body)).into_response()
    }
}

fn parse_kind(raw: &str) -> Result<ItemKind, HttpError> {
    Ok(raw.parse::<ItemKind>()?)
}

/// `attachment; filename="..."` with anything unsafe for a header replaced.
fn attachment(file_name: &str) -> HeaderValue {
    let safe: String = file_name
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();
    HeaderValue::from_str(&format!("attachment; filename=\"{safe}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

fn content_type_value(ct: &str) -> HeaderValue {
    HeaderValue::from_str(ct)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"))
}

#[derive(Debug, Default, Deserialize)]
struct PathQuery {
    #[serde(default)]
    path: String,
}

#[derive(Debug, Default, Deserialize)]
struct FlagsQuery {
    #[serde(default)]
    confirmed: bool,
    #[serde(default)]
    strict: bool,
}

#[derive(Debug, Deserialize)]
struct DeleteRequest {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateFolderRequest {
    folder_name: String,
    #[serde(default)]
    path: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MoveRequest {
    source_path: String,
    #[serde(default)]
    destination_path: String,
    #[serde(rename = "type")]
    kind: String,
}

/// GET /api/list?path= - One directory level
async fn list(
    State(handler): State<Arc<BaseHandler>>,
    headers: HeaderMap,
    Query(q): Query<PathQuery>,
) -> Result<impl IntoResponse, HttpError> {
    let tenant = handler.tenant(&headers).await?;
    let listing = handler.vfs.list(&tenant, &q.path).await?;
    Ok(Json(listing))
}

/// POST /api/upload - multipart `path` field plus `files` parts
async fn upload(
    State(handler): State<Arc<BaseHandler>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, HttpError> {
    let tenant = handler.tenant(&headers).await?;

    let mut path = String::new();
    let mut files = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| HttpError::BadRequest(format!("invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "path" {
            path = field
                .text()
                .await
                .map_err(|e| HttpError::BadRequest(format!("invalid path field: {e}")))?;
            continue;
        }
        let Some(file_name) = field.file_name().map(str::to_string) else {
            tracing::debug!(field = %name, "ignoring non-file multipart field");
            continue;
        };
        let content_type = field.content_type().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| HttpError::BadRequest(format!("failed to read {file_name}: {e}")))?;
        files.push(UploadFile {
            name: file_name,
            content_type,
            data,
        });
    }

    if files.is_empty() {
        return Err(HttpError::BadRequest("no files in request".into()));
    }
    let report = handler.vfs.upload(&tenant, &path, files).await?;
    Ok(Json(report))
}

/// GET /api/download/*path - Stream one file
async fn download(
    State(handler): State<Arc<BaseHandler>>,
    headers: HeaderMap,
    Path(path): Path<String>,
) -> Result<impl IntoResponse, HttpError> {
    let tenant = handler.tenant(&headers).await?;
    let download = handler.vfs.download(&tenant, &path).await?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type_value(&download.content_type)),
            (header::CONTENT_LENGTH, HeaderValue::from(download.size)),
            (header::CONTENT_DISPOSITION, attachment(&download.file_name)),
        ],
        Body::from_stream(ReaderStream::new(download.reader)),
    ))
}

/// POST /api/delete?confirmed=&strict= - Delete a file or a folder subtree
async fn delete(
    State(handler): State<Arc<BaseHandler>>,
    headers: HeaderMap,
    Query(flags): Query<FlagsQuery>,
    Json(req): Json<DeleteRequest>,
) -> Result<impl IntoResponse, HttpError> {
    let kind = parse_kind(&req.kind)?;
    let tenant = handler.tenant(&headers).await?;

    match handler
        .vfs
        .delete(&tenant, &req.path, kind, flags.confirmed)
        .await?
    {
        DeleteOutcome::NeedsConfirmation { count } => Ok(Json(json!({
            "hasContents": true,
            "needsConfirmation": true,
            "count": count,
        }))),
        DeleteOutcome::Deleted(report) => {
            let report = if flags.strict {
                report.ensure_complete()?
            } else {
                report
            };
            Ok(Json(json!({
                "message": "Deleted successfully",
                "deleted": report.succeeded,
                "failed": report.failed,
            })))
        }
    }
}

/// POST /api/folders - Create an empty folder
async fn create_folder(
    State(handler): State<Arc<BaseHandler>>,
    headers: HeaderMap,
    Json(req): Json<CreateFolderRequest>,
) -> Result<impl IntoResponse, HttpError> {
    let tenant = handler.tenant(&headers).await?;
    let marker = handler
        .vfs
        .create_folder(&tenant, &req.path, &req.folder_name)
        .await?;
    Ok(Json(json!({
        "message": "Folder created successfully",
        "folderPath": marker,
    })))
}

/// POST /api/move?strict= - Move a file or folder into another folder
async fn move_item(
    State(handler): State<Arc<BaseHandler>>,
    headers: HeaderMap,
    Query(flags): Query<FlagsQuery>,
    Json(req): Json<MoveRequest>,
) -> Result<impl IntoResponse, HttpError> {
    let kind = parse_kind(&req.kind)?;
    let tenant = handler.tenant(&headers).await?;

    let report = handler
        .vfs
        .move_item(&tenant, &req.source_path, &req.destination_path, kind)
        .await?;
    let report = if flags.strict {
        report.ensure_complete()?
    } else {
        report
    };
    Ok(Json(json!({
        "message": "Moved successfully",
        "moved": report.moved,
        "failed": report.failed,
        "residual": report.residual,
    })))
}

/// GET /api/export/*path - Zip a folder
async fn export(
    State(handler): State<Arc<BaseHandler>>,
    headers: HeaderMap,
    Path(path): Path<String>,
) -> Result<Response, HttpError> {
    export_archive(&handler, &headers, &path).await
}

/// GET /api/export - Zip everything
async fn export_root(
    State(handler): State<Arc<BaseHandler>>,
    headers: HeaderMap,
) -> Result<Response, HttpError> {
    export_archive(&handler, &headers, "").await
}

async fn export_archive(
    handler: &BaseHandler,
    headers: &HeaderMap,
    path: &str,
) -> Result<Response, HttpError> {
    let tenant = handler.tenant(headers).await?;
    let archive = handler.vfs.export_zip(&tenant, path).await?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/zip")),
            (header::CONTENT_LENGTH, HeaderValue::from(archive.size)),
            (header::CONTENT_DISPOSITION, attachment(&archive.file_name)),
        ],
        Body::from_stream(ReaderStream::new(archive.file)),
    )
        .into_response())
}

/// GET /api/usage - Quota usage
async fn usage(
    State(handler): State<Arc<BaseHandler>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, HttpError> {
    let tenant = handler.tenant(&headers).await?;
    let stats = handler.vfs.usage_stats(&tenant).await?;
    Ok(Json(stats))
}

/// GET /storage/{bucket}/{key} - Follow a presigned link
async fn presigned_get(
    State(handler): State<Arc<BaseHandler>>,
    Path((bucket, key)): Path<(String, String)>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<impl IntoResponse, HttpError> {
    let presigner = handler
        .presigner
        .as_ref()
        .ok_or_else(|| HttpError::Forbidden("direct links are disabled".into()))?;
    if let Err(e) = presigner.verify_get(&bucket, &key, &params, Utc::now()) {
        tracing::info!(%bucket, %key, error = %e, "rejected presigned link");
        return Err(HttpError::Forbidden(e.to_string()));
    }

    let (reader, meta) = handler
        .vfs
        .storage()
        .get_object(&bucket, &key)
        .await
        .map_err(VfsError::from)?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type_value(&meta.content_type)),
            (header::CONTENT_LENGTH, HeaderValue::from(meta.size)),
        ],
        Body::from_stream(ReaderStream::new(reader)),
    ))
}

/// GET /health
async fn health_check(State(handler): State<Arc<BaseHandler>>) -> impl IntoResponse {
    let status = health::get_health_status(handler.vfs.storage(), &handler.sessions).await;
    let code = if status.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(status))
}

/// GET /metrics - Prometheus text exposition
async fn metrics_text() -> impl IntoResponse {
    (
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; version=0.0.4"),
        )],
        metrics::gather_metrics(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthError, Session, SessionStore, PRINCIPAL_KEY};
    use crate::storage::in_memory::InMemoryStorage;
    use crate::tenant::InMemoryTenantDirectory;
    use crate::vfs::{VfsConfig, VirtualFs};
    use async_trait::async_trait;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    /// Every non-empty token is a session for "<token>@example.com".
    struct MockSessions;

    #[async_trait]
    impl SessionStore for MockSessions {
        async fn load(&self, token: &str) -> Result<Option<Session>, AuthError> {
            Ok(Some(
                Session::new().with_value(PRINCIPAL_KEY, format!("{token}@example.com")),
            ))
        }
    }

    fn create_test_handler() -> FsHttpHandler {
        let vfs = VirtualFs::new(
            Arc::new(InMemoryStorage::new()),
            Arc::new(InMemoryTenantDirectory::new()),
            VfsConfig::default(),
        );
        let base = BaseHandler::new(Arc::new(MockSessions), vfs, None);
        FsHttpHandler::new(base, 1024 * 1024, "test-")
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> axum::http::Request<Body> {
        axum::http::Request::builder()
            .method(method)
            .uri(uri)
            .header("x-session-token", "ann")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_list_requires_session() {
        let app = create_test_handler().router();
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/api/list")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["error"], "Not authenticated");
    }

    #[tokio::test]
    async fn test_create_folder_then_list() {
        let app = create_test_handler().router();

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/folders",
                json!({ "folderName": "docs", "path": "" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));

        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/api/list?path=")
                    .header("x-session-token", "ann")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["currentPath"], "");
        assert_eq!(body["entries"][0]["name"], "docs");
        assert_eq!(body["entries"][0]["type"], "folder");
    }

    #[tokio::test]
    async fn test_unknown_item_type_is_bad_request() {
        let app = create_test_handler().router();
        let response = app
            .oneshot(json_request(
                "POST",
                "/api/move",
                json!({ "sourcePath": "a", "destinationPath": "b", "type": "symlink" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_presigned_links_disabled() {
        let app = create_test_handler().router();
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/storage/tenant-1/a.txt?X-Amz-Signature=00")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_attachment_header_is_sanitized() {
        assert_eq!(
            attachment("report \"final\".pdf"),
            "attachment; filename=\"report _final_.pdf\""
        );
        assert_eq!(attachment("naïve.txt"), "attachment; filename=\"na_ve.txt\"");
    }
}
