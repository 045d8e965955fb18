//! Logging setup with daily-rolling log files.
//!
//! - `RUST_LOG` / configured filter directives
//! - Log file retention cleanup
//! - Local timezone timestamps

use chrono::{Local, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "transcode_registry=info,sqlx=warn,reqwest=warn";

/// Prefix of the rolling log files.
const LOG_FILE_PREFIX: &str = "transcode-registry.log";

/// Log retention period in days.
const LOG_RETENTION_DAYS: i64 = 7;

/// Formats timestamps in the server's local timezone.
#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

/// Log directory owned by the installed subscriber.
pub struct LoggingConfig {
    log_dir: PathBuf,
}

impl LoggingConfig {
    /// Start the daily log retention cleanup task.
    pub fn start_retention_cleanup(self: &Arc<Self>, cancel_token: CancellationToken) {
        let log_dir = self.log_dir.clone();

        tokio::spawn(async move {
            let cleanup_interval = Duration::from_secs(24 * 60 * 60);

            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        debug!("Log retention cleanup task shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(cleanup_interval) => {
                        if let Err(e) = cleanup_old_logs(&log_dir, LOG_RETENTION_DAYS).await {
                            warn!(error = %e, "Failed to cleanup old logs");
                        }
                    }
                }
            }
        });
    }
}

/// Whether a rolled log file name is older than the cutoff date.
fn is_expired_log(filename: &str, cutoff: chrono::NaiveDate) -> bool {
    filename
        .strip_prefix(LOG_FILE_PREFIX)
        .and_then(|rest| rest.strip_prefix('.'))
        .and_then(|date| chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d").ok())
        .is_some_and(|date| date < cutoff)
}

/// Delete log files older than the specified number of days.
async fn cleanup_old_logs(log_dir: &Path, retention_days: i64) -> std::io::Result<()> {
    let cutoff = (Utc::now() - chrono::Duration::days(retention_days)).date_naive();

    let mut entries = tokio::fs::read_dir(log_dir).await?;
    let mut deleted_count = 0;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let expired = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| is_expired_log(name, cutoff));
        if !expired {
            continue;
        }

        if let Err(e) = tokio::fs::remove_file(&path).await {
            warn!(path = %path.display(), error = %e, "Failed to delete old log file");
        } else {
            deleted_count += 1;
            debug!(path = %path.display(), "Deleted old log file");
        }
    }

    if deleted_count > 0 {
        info!(count = deleted_count, "Cleaned up old log files");
    }

    Ok(())
}

/// Initialize logging to stderr and a daily-rolling file in `log_dir`.
///
/// `RUST_LOG` takes precedence over `filter`, which falls back to
/// [`DEFAULT_LOG_FILTER`]. Keep the returned guard alive for the app lifetime.
pub fn init_logging(
    log_dir: &Path,
    filter: Option<&str>,
) -> crate::Result<(Arc<LoggingConfig>, WorkerGuard)> {
    std::fs::create_dir_all(log_dir)?;

    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let initial_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter.unwrap_or(DEFAULT_LOG_FILTER)))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::registry()
        .with(initial_filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true)
                .with_timer(LocalTimer),
        )
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_timer(LocalTimer),
        )
        .try_init()
        .map_err(|e| {
            crate::Error::Other(format!("Failed to set global default subscriber: {}", e))
        })?;

    let config = Arc::new(LoggingConfig {
        log_dir: log_dir.to_path_buf(),
    });

    Ok((config, guard))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter() {
        assert!(DEFAULT_LOG_FILTER.contains("transcode_registry=info"));
        assert!(DEFAULT_LOG_FILTER.contains("sqlx=warn"));
    }

    #[test]
    fn test_is_expired_log() {
        let cutoff = chrono::NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        assert!(is_expired_log("transcode-registry.log.2025-03-01", cutoff));
        assert!(!is_expired_log("transcode-registry.log.2025-03-10", cutoff));
        assert!(!is_expired_log("transcode-registry.log.garbage", cutoff));
        assert!(!is_expired_log("other.log.2025-01-01", cutoff));
    }

    #[tokio::test]
    async fn test_cleanup_old_logs() {
        let dir = tempfile::TempDir::new().unwrap();
        let old = dir.path().join("transcode-registry.log.2000-01-01");
        let today = dir
            .path()
            .join(format!("transcode-registry.log.{}", Utc::now().format("%Y-%m-%d")));
        std::fs::write(&old, "old").unwrap();
        std::fs::write(&today, "new").unwrap();

        cleanup_old_logs(dir.path(), LOG_RETENTION_DAYS).await.unwrap();

        assert!(!old.exists());
        assert!(today.exists());
    }
}
