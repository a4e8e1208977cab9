//! Server configuration
//!
//! Configuration is loaded from environment variables over built-in defaults.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::session::SessionConfig;

/// Main server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address
    pub host: String,
    /// Server port
    pub port: u16,

    /// Segmentation oracle configuration
    pub oracle: OracleConfig,

    /// Try the oracle's compositor before painting locally
    pub remote_paint_enabled: bool,

    /// Session lifetime configuration
    pub session: SessionConfig,

    /// Upload configuration
    pub upload: UploadConfig,

    /// Directory for downloadable results
    pub results_dir: PathBuf,
}

/// Oracle endpoint and per-call deadlines
#[derive(Debug, Clone)]
pub struct OracleConfig {
    /// Base URL for segment/generate/paint calls
    pub url: String,
    /// Full URL of the health endpoint
    pub health_url: String,
    /// Deadline for single-mask, point and paint calls
    pub segment_timeout: Duration,
    /// Deadline for whole-image mask generation
    pub generate_timeout: Duration,
    pub health_timeout: Duration,
}

/// Upload-related configuration
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Maximum upload size in bytes
    pub max_upload_size: usize,
    /// Identical content uploaded within this window reuses the session
    pub dedup_window: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            oracle: OracleConfig::default(),
            remote_paint_enabled: true,
            session: SessionConfig::default(),
            upload: UploadConfig::default(),
            results_dir: PathBuf::from("results"),
        }
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        let url = "http://127.0.0.1:8001".to_string();
        Self {
            health_url: format!("{}/health", url),
            url,
            segment_timeout: Duration::from_secs(60),
            generate_timeout: Duration::from_secs(120),
            health_timeout: Duration::from_secs(10),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_upload_size: 50 * 1024 * 1024, // 50 MB
            dedup_window: Duration::from_secs(5 * 60),
        }
    }
}

fn parse_bool(val: &str) -> bool {
    val.to_lowercase() == "true" || val == "1"
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // Server config
        if let Ok(host) = env::var("HOST") {
            config.host = host;
        }
        if let Ok(port) = env::var("PORT")
            && let Ok(p) = port.parse()
        {
            config.port = p;
        }

        // Oracle config
        if let Ok(url) = env::var("ORACLE_URL")
            && !url.is_empty()
        {
            config.oracle.health_url = format!("{}/health", url.trim_end_matches('/'));
            config.oracle.url = url;
        }
        if let Ok(url) = env::var("ORACLE_HEALTH_URL")
            && !url.is_empty()
        {
            config.oracle.health_url = url;
        }
        if let Ok(val) = env::var("ORACLE_SEGMENT_TIMEOUT_SECS")
            && let Ok(secs) = val.parse::<u64>()
        {
            config.oracle.segment_timeout = Duration::from_secs(secs);
        }
        if let Ok(val) = env::var("ORACLE_GENERATE_TIMEOUT_SECS")
            && let Ok(secs) = val.parse::<u64>()
        {
            config.oracle.generate_timeout = Duration::from_secs(secs);
        }
        if let Ok(val) = env::var("ORACLE_HEALTH_TIMEOUT_SECS")
            && let Ok(secs) = val.parse::<u64>()
        {
            config.oracle.health_timeout = Duration::from_secs(secs);
        }
        if let Ok(val) = env::var("REMOTE_PAINT_ENABLED") {
            config.remote_paint_enabled = parse_bool(&val);
        }

        // Session config
        if let Ok(val) = env::var("SESSION_TTL_SECS")
            && let Ok(secs) = val.parse::<u64>()
        {
            config.session.ttl = Duration::from_secs(secs);
        }
        if let Ok(val) = env::var("SESSION_REAPER_INTERVAL_SECS")
            && let Ok(secs) = val.parse::<u64>()
            && secs > 0
        {
            config.session.reaper_interval = Duration::from_secs(secs);
        }

        // Upload config
        if let Ok(val) = env::var("UPLOAD_MAX_SIZE_MB")
            && let Ok(mb) = val.parse::<usize>()
        {
            config.upload.max_upload_size = mb * 1024 * 1024;
        }
        if let Ok(val) = env::var("UPLOAD_DEDUP_WINDOW_SECS")
            && let Ok(secs) = val.parse::<u64>()
        {
            config.upload.dedup_window = Duration::from_secs(secs);
        }

        // Results config
        if let Ok(path) = env::var("RESULTS_DIR")
            && !path.is_empty()
        {
            config.results_dir = PathBuf::from(path);
        }

        config
    }
}
