//! Configuration management for the archive viewer server

use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub database: DatabaseConfig,
    pub viewer: ViewerConfig,
    pub jobs: JobsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub provider: StorageProvider,
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: Option<String>,
    /// Base used to build directly usable page URLs.
    /// Defaults to `<endpoint>/<bucket>` when unset.
    pub public_base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    Minio,
    R2,
    S3,
    B2,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

/// Per-session viewer tuning
#[derive(Debug, Clone, Deserialize)]
pub struct ViewerConfig {
    /// Maximum pages resident in one session's cache
    pub max_cached_pages: usize,
    /// Pages kept ahead of and behind the current page
    pub preload_distance: u32,
    /// Fetch attempts per page before it is marked failed
    pub max_retries: u32,
    /// Upper bound for a single page fetch, in milliseconds
    pub fetch_timeout_ms: u64,
    /// Maximum concurrently open viewer sessions
    pub max_sessions: usize,
    /// Sessions untouched for this long are closed by the sweep (0 = never)
    pub session_idle_ttl_secs: u64,
    pub session_sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobsConfig {
    /// Base URL of the backend job functions (`<url>/<job-name>`)
    pub functions_url: String,
    pub api_key: Option<String>,
    pub poll_interval_ms: u64,
    pub max_polls: u32,
}

impl ViewerConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn session_idle_ttl(&self) -> Duration {
        Duration::from_secs(self.session_idle_ttl_secs)
    }

    pub fn session_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.session_sweep_interval_secs.max(1))
    }
}

impl JobsConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for ViewerConfig {
    fn default() -> Self {
        ViewerConfig {
            max_cached_pages: 10,
            preload_distance: 2,
            max_retries: 3,
            fetch_timeout_ms: 10_000,
            max_sessions: 64,
            session_idle_ttl_secs: 30 * 60,
            session_sweep_interval_secs: 60,
        }
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        JobsConfig {
            functions_url: "http://localhost:54321/functions/v1".to_string(),
            api_key: None,
            poll_interval_ms: 5_000,
            max_polls: 120,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            storage: StorageConfig {
                provider: StorageProvider::Minio,
                endpoint: "http://localhost:9000".to_string(),
                bucket: "archive".to_string(),
                access_key: "admin".to_string(),
                secret_key: "password123".to_string(),
                region: Some("us-east-1".to_string()),
                public_base_url: None,
            },
            database: DatabaseConfig {
                url: "sqlite:./archive.db".to_string(),
            },
            viewer: ViewerConfig::default(),
            jobs: JobsConfig::default(),
        }
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        let viewer_defaults = ViewerConfig::default();
        let jobs_defaults = JobsConfig::default();

        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parse_or("SERVER_PORT", 3000),
            },
            storage: StorageConfig {
                provider: match env::var("S3_PROVIDER").unwrap_or_else(|_| "minio".to_string()).as_str() {
                    "r2" => StorageProvider::R2,
                    "s3" => StorageProvider::S3,
                    "b2" => StorageProvider::B2,
                    _ => StorageProvider::Minio,
                },
                endpoint: env::var("S3_ENDPOINT")?,
                bucket: env::var("S3_BUCKET")?,
                access_key: env::var("S3_ACCESS_KEY")?,
                secret_key: env::var("S3_SECRET_KEY")?,
                region: env::var("S3_REGION").ok(),
                public_base_url: env::var("S3_PUBLIC_URL").ok(),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:./archive.db".to_string()),
            },
            viewer: ViewerConfig {
                max_cached_pages: parse_or("VIEWER_MAX_CACHED_PAGES", viewer_defaults.max_cached_pages),
                preload_distance: parse_or("VIEWER_PRELOAD_DISTANCE", viewer_defaults.preload_distance),
                max_retries: parse_or("VIEWER_MAX_RETRIES", viewer_defaults.max_retries),
                fetch_timeout_ms: parse_or("VIEWER_FETCH_TIMEOUT_MS", viewer_defaults.fetch_timeout_ms),
                max_sessions: parse_or("VIEWER_MAX_SESSIONS", viewer_defaults.max_sessions),
                session_idle_ttl_secs: parse_or(
                    "VIEWER_SESSION_IDLE_TTL_SECS",
                    viewer_defaults.session_idle_ttl_secs,
                ),
                session_sweep_interval_secs: parse_or(
                    "VIEWER_SESSION_SWEEP_INTERVAL_SECS",
                    viewer_defaults.session_sweep_interval_secs,
                ),
            },
            jobs: JobsConfig {
                functions_url: env::var("JOBS_FUNCTIONS_URL").unwrap_or(jobs_defaults.functions_url),
                api_key: env::var("JOBS_API_KEY").ok(),
                poll_interval_ms: parse_or("JOBS_POLL_INTERVAL_MS", jobs_defaults.poll_interval_ms),
                max_polls: parse_or("JOBS_MAX_POLLS", jobs_defaults.max_polls),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_viewer_defaults() {
        let config = Config::default();
        assert_eq!(config.viewer.max_cached_pages, 10);
        assert_eq!(config.viewer.preload_distance, 2);
        assert_eq!(config.viewer.max_retries, 3);
        assert_eq!(config.viewer.fetch_timeout(), Duration::from_secs(10));
        assert_eq!(config.viewer.session_idle_ttl(), Duration::from_secs(1800));
        assert_eq!(config.jobs.poll_interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_parse_or_falls_back_on_garbage() {
        // Key is unlikely to exist in any environment
        assert_eq!(parse_or("ARCHIVE_VIEWER_TEST_UNSET_KEY", 7u32), 7);
    }
}
