use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use kbase_core::import_job::{CompensationStrategy, DEFAULT_ALLOWED_EXTENSION, DEFAULT_MAX_FILE_BYTES};
use kbase_core::rate_limit::{RateLimitPolicy, TierLimit};

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Counter store location; `None` selects the in-process store.
    pub redis_url: Option<String>,
    pub storage: StorageConfig,
    pub import: ImportConfig,
    pub rate_limit: RateLimitConfig,
    /// Reaper threshold for jobs stuck in `processing`; `0` disables it.
    pub stale_job_timeout_secs: u64,
    /// Content-generation backend; `None` makes `/generate` answer 503.
    pub generation: Option<GenerationConfig>,
}

/// Where uploaded files go.
#[derive(Debug, Clone)]
pub enum StorageConfig {
    /// Files on local disk, served by this process under `/files`.
    Local {
        dir: PathBuf,
        public_base_url: String,
    },
    S3 {
        bucket: String,
        public_base_url: String,
    },
}

/// Upload and cancellation rules.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    pub allowed_extension: String,
    pub max_file_bytes: usize,
    /// Cap on a whole multipart submission.
    pub max_request_bytes: usize,
    pub compensation: CompensationStrategy,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            allowed_extension: DEFAULT_ALLOWED_EXTENSION.to_string(),
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
            compensation: CompensationStrategy::default(),
        }
    }
}

/// Default cap on one multipart submission: 64 MiB.
pub const DEFAULT_MAX_REQUEST_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, Default)]
pub struct RateLimitConfig {
    pub policy: RateLimitPolicy,
    /// Let requests through when the counter store is unreachable.
    pub fail_open: bool,
}

/// OpenAI-compatible chat completions endpoint.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub model: String,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                      | Default                       |
    /// |------------------------------|-------------------------------|
    /// | `HOST`                       | `0.0.0.0`                     |
    /// | `PORT`                       | `3000`                        |
    /// | `CORS_ORIGINS`               | `http://localhost:5173`       |
    /// | `REQUEST_TIMEOUT_SECS`       | `30`                          |
    /// | `REDIS_URL`                  | unset (in-process counters)   |
    /// | `STORAGE_BACKEND`            | `local`                       |
    /// | `LOCAL_STORAGE_DIR`          | `./data/uploads`              |
    /// | `PUBLIC_BASE_URL`            | `http://localhost:3000/files` |
    /// | `S3_BUCKET`                  | required when backend is `s3` |
    /// | `S3_PUBLIC_BASE_URL`         | required when backend is `s3` |
    /// | `IMPORT_ALLOWED_EXTENSION`   | `.txt`                        |
    /// | `IMPORT_MAX_FILE_BYTES`      | `10485760`                    |
    /// | `IMPORT_MAX_REQUEST_BYTES`   | `67108864`                    |
    /// | `COMPENSATION_STRATEGY`      | `watermark`                   |
    /// | `RATE_LIMIT_GLOBAL_MAX`      | `5000`                        |
    /// | `RATE_LIMIT_GLOBAL_WINDOW_SECS` | `86400`                    |
    /// | `RATE_LIMIT_USER_MAX`        | `10`                          |
    /// | `RATE_LIMIT_USER_WINDOW_SECS`| `60`                          |
    /// | `RATE_LIMIT_IP_MAX`          | `5`                           |
    /// | `RATE_LIMIT_IP_WINDOW_SECS`  | `60`                          |
    /// | `RATE_LIMIT_FAIL_OPEN`       | `false`                       |
    /// | `STALE_JOB_TIMEOUT_SECS`     | `0` (reaper disabled)         |
    /// | `GENERATION_API_URL`         | unset                         |
    /// | `GENERATION_API_KEY`         | unset                         |
    /// | `GENERATION_MODEL`           | `gpt-4o-mini`                 |
    ///
    /// Panics on unparseable values; the server cannot run misconfigured.
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = parse_env("PORT", 3000);

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = parse_env("REQUEST_TIMEOUT_SECS", 30);

        let defaults = RateLimitPolicy::default();
        let policy = RateLimitPolicy {
            global: tier_from_env("GLOBAL", defaults.global),
            user: tier_from_env("USER", defaults.user),
            ip: tier_from_env("IP", defaults.ip),
        };

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            redis_url: optional_env("REDIS_URL"),
            storage: StorageConfig::from_env(),
            import: ImportConfig {
                allowed_extension: std::env::var("IMPORT_ALLOWED_EXTENSION")
                    .unwrap_or_else(|_| DEFAULT_ALLOWED_EXTENSION.into()),
                max_file_bytes: parse_env("IMPORT_MAX_FILE_BYTES", DEFAULT_MAX_FILE_BYTES),
                max_request_bytes: parse_env("IMPORT_MAX_REQUEST_BYTES", DEFAULT_MAX_REQUEST_BYTES),
                compensation: parse_env("COMPENSATION_STRATEGY", CompensationStrategy::Watermark),
            },
            rate_limit: RateLimitConfig {
                policy,
                fail_open: parse_env("RATE_LIMIT_FAIL_OPEN", false),
            },
            stale_job_timeout_secs: parse_env("STALE_JOB_TIMEOUT_SECS", 0),
            generation: optional_env("GENERATION_API_URL").map(|api_url| GenerationConfig {
                api_url,
                api_key: optional_env("GENERATION_API_KEY"),
                model: std::env::var("GENERATION_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into()),
            }),
        }
    }

    /// Reaper threshold, if the reaper is enabled.
    pub fn stale_job_timeout(&self) -> Option<Duration> {
        (self.stale_job_timeout_secs > 0).then(|| Duration::from_secs(self.stale_job_timeout_secs))
    }
}

impl StorageConfig {
    fn from_env() -> Self {
        let backend = std::env::var("STORAGE_BACKEND").unwrap_or_else(|_| "local".into());
        match backend.trim().to_ascii_lowercase().as_str() {
            "local" => Self::Local {
                dir: std::env::var("LOCAL_STORAGE_DIR")
                    .unwrap_or_else(|_| "./data/uploads".into())
                    .into(),
                public_base_url: std::env::var("PUBLIC_BASE_URL")
                    .unwrap_or_else(|_| "http://localhost:3000/files".into()),
            },
            "s3" => Self::S3 {
                bucket: std::env::var("S3_BUCKET")
                    .expect("S3_BUCKET must be set when STORAGE_BACKEND=s3"),
                public_base_url: std::env::var("S3_PUBLIC_BASE_URL")
                    .expect("S3_PUBLIC_BASE_URL must be set when STORAGE_BACKEND=s3"),
            },
            other => panic!("STORAGE_BACKEND must be 'local' or 's3', got '{other}'"),
        }
    }
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(name: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|e| panic!("{name} has an invalid value '{raw}': {e}")),
        Err(_) => default,
    }
}

fn tier_from_env(tier: &str, default: TierLimit) -> TierLimit {
    let window_name = format!("RATE_LIMIT_{tier}_WINDOW_SECS");
    let window_secs: u64 = parse_env(&window_name, default.window.as_secs());
    TierLimit {
        max_requests: parse_env(&format!("RATE_LIMIT_{tier}_MAX"), default.max_requests),
        window: window_from_secs(&window_name, window_secs),
    }
}

/// A zero-length window never holds a hit, so the tier would admit everything.
fn window_from_secs(name: &str, secs: u64) -> Duration {
    if secs == 0 {
        panic!("{name} must be at least 1 second");
    }
    Duration::from_secs(secs)
}
