//! S3 backend configuration
//!
//! Holds the connection parameters for Amazon S3 or S3-compatible storage
//! (MinIO, LocalStack, etc.) and turns them into an SDK client config.

use std::fmt;

use aws_config::profile::ProfileFileCredentialsProvider;
use aws_config::timeout::TimeoutConfig;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use tracing::debug;

use crate::flags::RuntimeFlags;

/// Where S3 credentials come from
#[derive(Clone)]
pub enum S3Credentials {
    /// SDK default chain (environment, shared config, instance metadata)
    Default,
    /// Named profile from the shared credentials file
    Profile(String),
    Static {
        access_key: String,
        secret_key: String,
    },
}

impl fmt::Debug for S3Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            S3Credentials::Default => write!(f, "Default"),
            S3Credentials::Profile(name) => f.debug_tuple("Profile").field(name).finish(),
            S3Credentials::Static { access_key, .. } => f
                .debug_struct("Static")
                .field("access_key", access_key)
                .field("secret_key", &"<redacted>")
                .finish(),
        }
    }
}

/// S3 connection parameters
#[derive(Debug, Clone)]
pub struct S3Config {
    pub credentials: S3Credentials,
    pub region: String,
    /// Whether `region` was chosen by the user rather than defaulted
    pub region_set: bool,
    /// Custom endpoint URL (for S3-compatible stores)
    pub endpoint: Option<String>,
    /// Path-style addressing instead of virtual-hosted style
    pub force_path_style: bool,
    pub storage_class: String,
    pub acl: Option<String>,
    pub requester_pays: bool,
    pub use_sse: bool,
    pub use_kms: bool,
    pub kms_key_id: Option<String>,
    pub http_timeout: std::time::Duration,
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

impl S3Config {
    /// S3 parameters from the runtime flags. The endpoint is left for the
    /// selector to override.
    pub fn from_flags(flags: &RuntimeFlags, credentials: S3Credentials) -> Self {
        Self {
            credentials,
            region: flags.region.clone(),
            region_set: flags.region_set,
            endpoint: None,
            force_path_style: flags.path_style,
            storage_class: flags.storage_class.clone(),
            acl: non_empty(&flags.acl),
            requester_pays: flags.requester_pays,
            use_sse: flags.use_sse,
            use_kms: flags.use_kms,
            kms_key_id: non_empty(&flags.kms_key_id),
            http_timeout: flags.http_timeout,
        }
    }

    /// Build the SDK client configuration.
    ///
    /// Loading the shared config may read local files or query instance
    /// metadata, so this is async.
    pub async fn sdk_config(&self) -> aws_sdk_s3::Config {
        let mut sdk_config_builder = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(self.region.clone()))
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_attempt_timeout(self.http_timeout)
                    .build(),
            );

        sdk_config_builder = match &self.credentials {
            S3Credentials::Default => sdk_config_builder,
            S3Credentials::Profile(name) => {
                debug!("Loading S3 credentials from profile {}", name);
                sdk_config_builder.credentials_provider(
                    ProfileFileCredentialsProvider::builder()
                        .profile_name(name)
                        .build(),
                )
            }
            S3Credentials::Static {
                access_key,
                secret_key,
            } => sdk_config_builder.credentials_provider(Credentials::new(
                access_key.clone(),
                secret_key.clone(),
                None,
                None,
                "bucketfs-static",
            )),
        };

        let sdk_config = sdk_config_builder.load().await;

        let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&sdk_config);

        if let Some(endpoint) = &self.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        s3_config_builder = s3_config_builder.force_path_style(self.force_path_style);

        s3_config_builder.build()
    }
}
