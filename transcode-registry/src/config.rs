//! Process configuration, read from the environment.
//!
//! A `.env` file in the working directory is loaded first (see `main.rs`).
//!
//! | Variable | Default |
//! |---|---|
//! | `DATABASE_URL` | `sqlite:transcode-registry.db?mode=rwc` |
//! | `WORKER_BASE_URL` | required |
//! | `DISPATCH_TIMEOUT_MS` | 30000 |
//! | `STATUS_QUERY_TIMEOUT_MS` | 10000 |
//! | `LIST_RECONCILE_CONCURRENCY` | 8 |
//! | `LOG_DIR` | `logs` |
//! | `LOG_FILTER` | [`crate::logging::DEFAULT_LOG_FILTER`] |

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::registry::RegistryServiceConfig;
use crate::{Error, Result};

const DEFAULT_DATABASE_URL: &str = "sqlite:transcode-registry.db?mode=rwc";
const DEFAULT_LOG_DIR: &str = "logs";

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub database_url: String,
    pub worker_base_url: String,
    pub service: RegistryServiceConfig,
    pub log_dir: PathBuf,
    pub log_filter: Option<String>,
}

impl RegistryConfig {
    /// Read the configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let defaults = RegistryServiceConfig::default();

        let worker_base_url = get("WORKER_BASE_URL")
            .ok_or_else(|| Error::config("WORKER_BASE_URL must be set"))?;

        let dispatch_timeout = parse_millis(&get, "DISPATCH_TIMEOUT_MS", defaults.dispatch_timeout)?;
        let status_query_timeout =
            parse_millis(&get, "STATUS_QUERY_TIMEOUT_MS", defaults.status_query_timeout)?;
        let list_reconcile_concurrency = parse_or(
            &get,
            "LIST_RECONCILE_CONCURRENCY",
            defaults.list_reconcile_concurrency,
        )?;
        if list_reconcile_concurrency == 0 {
            return Err(Error::config("LIST_RECONCILE_CONCURRENCY must be at least 1"));
        }

        Ok(Self {
            database_url: get("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            worker_base_url,
            service: RegistryServiceConfig {
                dispatch_timeout,
                status_query_timeout,
                list_reconcile_concurrency,
            },
            log_dir: get("LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR)),
            log_filter: get("LOG_FILTER"),
        })
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::config(format!("{} has invalid value '{}': {}", key, raw, e))),
        None => Ok(default),
    }
}

fn parse_millis<G>(get: &G, key: &str, default: Duration) -> Result<Duration>
where
    G: Fn(&str) -> Option<String>,
{
    let millis: u64 = parse_or(get, key, default.as_millis() as u64)?;
    if millis == 0 {
        return Err(Error::config(format!("{} must be greater than zero", key)));
    }
    Ok(Duration::from_millis(millis))
}
