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

/// Tracing and structured logging configuration
use std::str::FromStr;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Output format for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable format for development
    Human,
    /// JSON format for log aggregation
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            _ => Ok(OutputFormat::Human),
        }
    }
}

/// Filter used when `RUST_LOG` is not set.
fn default_filter(level: &str) -> String {
    format!("tenantfs={level},tower_http=warn,axum=info")
}

/// Initialize the global subscriber.
///
/// # Environment Variables
/// * `RUST_LOG` - Log level filter (e.g., "tenantfs=debug,axum=warn")
/// * `LOG_LEVEL` - Level for this crate if RUST_LOG is not set (default: "info")
///
/// Calling it twice is harmless: the second subscriber is not installed.
pub fn init_tracing(format: OutputFormat) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        EnvFilter::new(default_filter(&log_level))
    });

    let installed = match format {
        OutputFormat::Human => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_line_number(true)
                    .with_ansi(true),
            )
            .try_init(),
        OutputFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_line_number(true),
            )
            .try_init(),
    };

    match installed {
        Ok(()) => tracing::info!(format = ?format, "tracing initialized"),
        Err(e) => tracing::debug!(error = %e, "tracing already initialized"),
    }
}

/// Initialize tracing with the format named by `LOG_FORMAT` ("json" or "human").
pub fn init_tracing_from_env() {
    let format_str = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "human".to_string());
    let format = OutputFormat::from_str(&format_str).unwrap_or(OutputFormat::Human);
    init_tracing(format);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_parsing() {
        assert_eq!(OutputFormat::from_str("json"), Ok(OutputFormat::Json));
        assert_eq!(OutputFormat::from_str(" JSON "), Ok(OutputFormat::Json));
        assert_eq!(OutputFormat::from_str("human"), Ok(OutputFormat::Human));
        assert_eq!(OutputFormat::from_str("invalid"), Ok(OutputFormat::Human));
    }

    #[test]
    fn test_default_filter() {
        assert_eq!(default_filter("debug"), "tenantfs=debug,tower_http=warn,axum=info");
    }
}
