//! Runtime flags
//!
//! [`RuntimeFlags`] is what the engine and the mount layer actually read. It
//! carries every [`UserConfig`] field plus values derived for one mount
//! attempt.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::backend::BackendConfig;
use crate::config::UserConfig;

/// Internal flags for a single mount attempt
#[derive(Debug, Clone)]
pub struct RuntimeFlags {
    // File system
    pub mount_options: BTreeMap<String, String>,
    /// Where the engine is mounted
    pub mount_point: PathBuf,
    /// The mount point the user asked for. Differs from `mount_point` when a
    /// cache process fronts a private backing mount.
    pub mount_point_arg: PathBuf,
    pub cache: Vec<String>,
    pub dir_mode: u32,
    pub file_mode: u32,
    pub uid: u32,
    pub gid: u32,

    // Object storage
    pub endpoint: String,
    pub region: String,
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
    pub subdomain: bool,
    /// Derived: `!subdomain`
    pub path_style: bool,
    /// Selected storage backend, attached by the orchestrator
    pub backend: Option<BackendConfig>,

    // Tuning
    pub cheap: bool,
    pub explicit_dir: bool,
    pub stat_cache_ttl: Duration,
    pub type_cache_ttl: Duration,
    pub http_timeout: Duration,

    // Debugging
    pub debug_fuse: bool,
    pub debug_s3: bool,
    pub foreground: bool,
}

impl RuntimeFlags {
    /// Translate user configuration into runtime flags.
    ///
    /// The destructuring below names every field of [`UserConfig`] with no
    /// rest pattern, so a field added there fails to compile until it is
    /// carried over here.
    pub fn from_user_config(config: &UserConfig) -> Self {
        let UserConfig {
            mount_options,
            mount_point,
            cache,
            dir_mode,
            file_mode,
            uid,
            gid,
            endpoint,
            region,
            region_set,
            storage_class,
            requester_pays,
            access_key,
            secret_key,
            profile,
            use_content_type,
            use_sse,
            use_kms,
            kms_key_id,
            acl,
            subdomain,
            cheap,
            explicit_dir,
            stat_cache_ttl,
            type_cache_ttl,
            http_timeout,
            debug_fuse,
            debug_s3,
            foreground,
        } = config.clone();

        Self {
            mount_options,
            mount_point_arg: mount_point.clone(),
            mount_point,
            cache,
            dir_mode,
            file_mode,
            uid,
            gid,
            endpoint,
            region,
            region_set,
            storage_class,
            requester_pays,
            access_key,
            secret_key,
            profile,
            use_content_type,
            use_sse,
            use_kms,
            kms_key_id,
            acl,
            subdomain,
            path_style: !subdomain,
            backend: None,
            cheap,
            explicit_dir,
            stat_cache_ttl,
            type_cache_ttl,
            http_timeout,
            debug_fuse,
            debug_s3,
            foreground,
        }
    }

    /// Mount the engine at `backing` while the cache process serves the
    /// user's mount point.
    pub fn with_backing_mount_point(mut self, backing: impl Into<PathBuf>) -> Self {
        self.mount_point = backing.into();
        self
    }

    /// Whether the engine is mounted somewhere other than the user's mount point
    pub fn has_backing_mount(&self) -> bool {
        self.mount_point != self.mount_point_arg
    }
}

impl From<&UserConfig> for RuntimeFlags {
    fn from(config: &UserConfig) -> Self {
        Self::from_user_config(config)
    }
}
