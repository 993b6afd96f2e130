// Upload server configuration.
//
// Centralizes environment variable parsing with defaults for local
// development. Storage paths derive from `data_dir`; the blob store
// owns the directory layout beneath it.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_MAX_FILE_SIZE: u64 = 5 * 1024 * 1024 * 1024;
const DEFAULT_MAX_REQUEST_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Core upload server configuration.
///
/// Constructed via [`ServerConfig::from_env`] which reads environment
/// variables and falls back to sensible development defaults.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address (host:port).
    pub listen_addr: SocketAddr,
    /// Root directory for chunk and assembled blobs.
    pub data_dir: PathBuf,
    /// Upper bound on a declared upload size, in bytes.
    pub max_file_size: u64,
    /// Allowed mime types for initialize, or `None` to accept any.
    pub allowed_mime_types: Option<Vec<String>>,
    /// Request body cap; must exceed the chunk size clients use.
    pub max_request_body_bytes: usize,
    /// Concurrent media pipeline runs across sessions.
    pub processing_concurrency: usize,
    /// Interval between heartbeat broadcasts to all connections.
    pub heartbeat_interval: Duration,
    /// Interval between terminal-session sweeps.
    pub sweep_interval: Duration,
    /// Age after which a terminal session is swept away.
    pub session_max_age: Duration,
    /// Log filter directive (e.g. `info`, `uplink_server=debug`).
    pub log_filter: String,
    /// Comma-separated CORS origins (or `"*"` for any).
    pub cors_origins: Option<String>,
}

impl ServerConfig {
    /// Parse configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `UPLINK_HOST` | `0.0.0.0` |
    /// | `UPLINK_PORT` | `8080` |
    /// | `UPLINK_DATA_DIR` | `./uploads` |
    /// | `UPLINK_MAX_FILE_SIZE` | 5 GiB |
    /// | `UPLINK_ALLOWED_MIME_TYPES` | *(none — any type accepted)* |
    /// | `UPLINK_MAX_REQUEST_BODY_BYTES` | 16 MiB |
    /// | `UPLINK_PROCESSING_CONCURRENCY` | `2` |
    /// | `UPLINK_HEARTBEAT_INTERVAL_SECS` | `30` |
    /// | `UPLINK_SWEEP_INTERVAL_SECS` | `3600` |
    /// | `UPLINK_SESSION_MAX_AGE_SECS` | `604800` (7 days) |
    /// | `UPLINK_LOG_FILTER` | `info` |
    /// | `UPLINK_CORS_ORIGINS` | *(none — cors.rs uses dev defaults)* |
    pub fn from_env() -> Self {
        Self::from_env_fn(|key| std::env::var(key))
    }

    /// Testable constructor that accepts an environment lookup function.
    fn from_env_fn<F>(env: F) -> Self
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let host = env("UPLINK_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = env("UPLINK_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8080);
        let listen_addr = format!("{host}:{port}")
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], port)));

        let data_dir = env("UPLINK_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./uploads"));

        let max_file_size = env("UPLINK_MAX_FILE_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_FILE_SIZE);

        let allowed_mime_types = env("UPLINK_ALLOWED_MIME_TYPES").ok().map(|raw| {
            raw.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        });

        let max_request_body_bytes = env("UPLINK_MAX_REQUEST_BODY_BYTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_REQUEST_BODY_BYTES);

        let processing_concurrency = env("UPLINK_PROCESSING_CONCURRENCY")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|&n: &usize| n > 0)
            .unwrap_or(2);

        let heartbeat_interval = duration_secs(&env, "UPLINK_HEARTBEAT_INTERVAL_SECS", 30);
        let sweep_interval = duration_secs(&env, "UPLINK_SWEEP_INTERVAL_SECS", 3600);
        let session_max_age = duration_secs(&env, "UPLINK_SESSION_MAX_AGE_SECS", 7 * 24 * 3600);

        let log_filter = env("UPLINK_LOG_FILTER").unwrap_or_else(|_| "info".into());
        let cors_origins = env("UPLINK_CORS_ORIGINS").ok();

        Self {
            listen_addr,
            data_dir,
            max_file_size,
            allowed_mime_types,
            max_request_body_bytes,
            processing_concurrency,
            heartbeat_interval,
            sweep_interval,
            session_max_age,
            log_filter,
            cors_origins,
        }
    }
}

fn duration_secs<F>(env: &F, key: &str, default_secs: u64) -> Duration
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let secs = env(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .filter(|&n| n > 0)
        .unwrap_or(default_secs);
    Duration::from_secs(secs)
}
