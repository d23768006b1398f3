//! Configuration parsing and structures

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::env::substitute_env_vars;

/// Default directory mode (rwxr-xr-x)
pub const DEFAULT_DIR_MODE: u32 = 0o755;
/// Default file mode (rw-r--r--)
pub const DEFAULT_FILE_MODE: u32 = 0o644;

// =============================================================================
// Document
// =============================================================================

/// Top-level configuration document
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// The mount to establish
    pub mount: UserConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// =============================================================================
// User-facing mount configuration
// =============================================================================

/// Stable, user-facing mount configuration.
///
/// This is what callers fill in. The orchestration layer never reads it
/// directly past translation; see [`crate::flags::RuntimeFlags`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    // File system
    /// Extra FUSE mount options, `-o key=value` style. Empty values are flags.
    pub mount_options: BTreeMap<String, String>,
    pub mount_point: PathBuf,

    /// Arguments for the local caching process. Empty disables caching.
    pub cache: Vec<String>,
    #[serde(deserialize_with = "deserialize_mode")]
    pub dir_mode: u32,
    #[serde(deserialize_with = "deserialize_mode")]
    pub file_mode: u32,
    pub uid: u32,
    pub gid: u32,

    // Object storage
    pub endpoint: String,
    pub region: String,
    /// Whether `region` was given explicitly rather than defaulted
    pub region_set: bool,
    pub storage_class: String,
    pub requester_pays: bool,
    pub access_key: String,
    pub secret_key: String,
    pub profile: String,
    pub use_content_type: bool,
    pub use_sse: bool,
    pub use_kms: bool,
    pub kms_key_id: String,
    pub acl: String,
    /// Virtual-hosted style addressing instead of path style
    pub subdomain: bool,

    // Tuning
    pub cheap: bool,
    pub explicit_dir: bool,
    #[serde(with = "humantime_serde")]
    pub stat_cache_ttl: Duration,
    #[serde(with = "humantime_serde")]
    pub type_cache_ttl: Duration,
    #[serde(with = "humantime_serde")]
    pub http_timeout: Duration,

    // Debugging
    pub debug_fuse: bool,
    pub debug_s3: bool,
    pub foreground: bool,
}

impl Default for UserConfig {
    fn default() -> Self {
        // SAFETY: getuid/getgid cannot fail
        let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };

        Self {
            mount_options: BTreeMap::new(),
            mount_point: PathBuf::new(),
            cache: Vec::new(),
            dir_mode: DEFAULT_DIR_MODE,
            file_mode: DEFAULT_FILE_MODE,
            uid,
            gid,
            endpoint: String::new(),
            region: "us-east-1".to_string(),
            region_set: false,
            storage_class: "STANDARD".to_string(),
            requester_pays: false,
            access_key: String::new(),
            secret_key: String::new(),
            profile: String::new(),
            use_content_type: false,
            use_sse: false,
            use_kms: false,
            kms_key_id: String::new(),
            acl: String::new(),
            subdomain: false,
            cheap: false,
            explicit_dir: false,
            stat_cache_ttl: Duration::from_secs(60),
            type_cache_ttl: Duration::from_secs(60),
            http_timeout: Duration::from_secs(30),
            debug_fuse: false,
            debug_s3: false,
            foreground: false,
        }
    }
}

impl UserConfig {
    /// Config for a mount point with every other field defaulted
    pub fn new(mount_point: impl Into<PathBuf>) -> Self {
        Self {
            mount_point: mount_point.into(),
            ..Default::default()
        }
    }

    /// Whether a local caching process should front the mount
    pub fn cache_enabled(&self) -> bool {
        !self.cache.is_empty()
    }

    /// Validate field combinations serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mount_point.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "mount_point is required".to_string(),
            ));
        }

        if !self.access_key.is_empty() && self.secret_key.is_empty() {
            return Err(ConfigError::ValidationError(
                "access_key is set but secret_key is empty".to_string(),
            ));
        }

        if self.use_kms && !self.use_sse {
            return Err(ConfigError::ValidationError(
                "use_kms requires use_sse".to_string(),
            ));
        }

        if let Some(key) = self.mount_options.keys().find(|k| k.trim().is_empty()) {
            return Err(ConfigError::ValidationError(format!(
                "Mount option with empty name: {:?}",
                key
            )));
        }

        Ok(())
    }
}

/// Accept either an integer or an octal string ("0755", "0o755") for modes
fn deserialize_mode<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Mode {
        Int(u32),
        Str(String),
    }

    match Mode::deserialize(deserializer)? {
        Mode::Int(mode) => Ok(mode),
        Mode::Str(s) => {
            let digits = s.trim().trim_start_matches("0o");
            u32::from_str_radix(digits, 8)
                .map_err(|_| serde::de::Error::custom(format!("invalid octal mode: {:?}", s)))
        }
    }
}

// =============================================================================
// Loading
// =============================================================================

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(path.to_path_buf(), e.to_string()))?;

        Self::from_str(&content)
    }

    /// Parse configuration from a YAML string, substituting `${VAR}` references first
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let content = substitute_env_vars(content)?;
        serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.mount.validate()
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    ReadError(PathBuf, String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}
