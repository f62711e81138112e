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

/// Prometheus metrics definitions for tenantfs
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, GaugeVec,
    HistogramVec, TextEncoder,
};

lazy_static! {
    // ============================================================================
    // HTTP Metrics
    // ============================================================================

    /// HTTP request duration in seconds
    pub static ref HTTP_REQUEST_DURATION: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "endpoint", "status"],
        vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0]
    ).unwrap();

    /// HTTP request count
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "endpoint", "status"]
    ).unwrap();

    // ============================================================================
    // Session Metrics
    // ============================================================================

    /// Session lookups by result
    pub static ref SESSION_LOOKUPS_TOTAL: CounterVec = register_counter_vec!(
        "session_lookups_total",
        "Total session lookups",
        &["result"]
    ).unwrap();

    // ============================================================================
    // Filesystem Operation Metrics
    // ============================================================================

    /// Filesystem operation duration in seconds
    pub static ref VFS_OP_DURATION: HistogramVec = register_histogram_vec!(
        "vfs_operation_duration_seconds",
        "Virtual filesystem operation duration in seconds",
        &["operation", "result"],
        vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 30.0]
    ).unwrap();

    /// Writes refused by the quota ledger
    pub static ref QUOTA_REJECTIONS_TOTAL: CounterVec = register_counter_vec!(
        "quota_rejections_total",
        "Total writes rejected for exceeding the tenant quota",
        &[]
    ).unwrap();

    /// Last computed usage per tenant container
    pub static ref TENANT_USED_BYTES: GaugeVec = register_gauge_vec!(
        "tenant_used_bytes",
        "Bytes stored per tenant container at last check",
        &["bucket"]
    ).unwrap();

    /// Items that failed inside an otherwise successful batch
    pub static ref BATCH_ITEM_FAILURES_TOTAL: CounterVec = register_counter_vec!(
        "batch_item_failures_total",
        "Per-item failures inside batch operations",
        &["operation"]
    ).unwrap();

    /// Bytes written into exported archives
    pub static ref ARCHIVE_BYTES_TOTAL: CounterVec = register_counter_vec!(
        "archive_bytes_total",
        "Total uncompressed bytes copied into archives",
        &[]
    ).unwrap();

    // ============================================================================
    // Error Metrics
    // ============================================================================

    /// Error count by type and component
    pub static ref ERROR_TOTAL: CounterVec = register_counter_vec!(
        "error_total",
        "Total number of errors",
        &["error_type", "component"]
    ).unwrap();

    // ============================================================================
    // System Metrics
    // ============================================================================

    /// Concurrent requests gauge
    pub static ref CONCURRENT_REQUESTS: GaugeVec = register_gauge_vec!(
        "concurrent_requests",
        "Number of concurrent requests being processed",
        &["protocol"]
    ).unwrap();
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Count a session lookup ("hit", "miss", "error")
pub fn increment_session_lookup(result: &str) {
    SESSION_LOOKUPS_TOTAL.with_label_values(&[result]).inc();
}

/// Record filesystem operation duration
pub fn record_vfs_op(operation: &str, result: &str, duration: f64) {
    VFS_OP_DURATION
        .with_label_values(&[operation, result])
        .observe(duration);
}

pub fn increment_quota_rejection() {
    QUOTA_REJECTIONS_TOTAL.with_label_values(&[]).inc();
}

pub fn set_tenant_used_bytes(bucket: &str, bytes: u64) {
    TENANT_USED_BYTES
        .with_label_values(&[bucket])
        .set(bytes as f64);
}

/// Add per-item batch failures
pub fn increment_batch_failures(operation: &str, count: usize) {
    if count > 0 {
        BATCH_ITEM_FAILURES_TOTAL
            .with_label_values(&[operation])
            .inc_by(count as f64);
    }
}

pub fn increment_archive_bytes(bytes: u64) {
    ARCHIVE_BYTES_TOTAL.with_label_values(&[]).inc_by(bytes as f64);
}

/// Increment error counter
pub fn increment_error(error_type: &str, component: &str) {
    ERROR_TOTAL
        .with_label_values(&[error_type, component])
        .inc();
}

/// Increment HTTP request counter
pub fn increment_http_request(method: &str, endpoint: &str, status: &str) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, endpoint, status])
        .inc();
}

/// Record HTTP request duration
pub fn record_http_duration(method: &str, endpoint: &str, status: &str, duration: f64) {
    HTTP_REQUEST_DURATION
        .with_label_values(&[method, endpoint, status])
        .observe(duration);
}

/// Increment concurrent requests
pub fn inc_concurrent_requests(protocol: &str) {
    CONCURRENT_REQUESTS.with_label_values(&[protocol]).inc();
}

/// Decrement concurrent requests
pub fn dec_concurrent_requests(protocol: &str) {
    CONCURRENT_REQUESTS.with_label_values(&[protocol]).dec();
}

/// Gather all metrics for Prometheus exposition
pub fn gather_metrics() -> Vec<u8> {
    use prometheus::Encoder;
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "failed to encode metrics");
    }
    buffer
}
