//! Storage backend selection
//!
//! A single bucket identifier can point at several storage services. The
//! selector looks at explicit credentials first and only falls back to
//! scheme-based detection when none are given.

pub mod azure;
pub mod s3;

use crate::bucket::{parse_bucket_spec, Scheme};
use crate::env::EnvSource;
use crate::flags::RuntimeFlags;
use crate::logging::Logger;

pub use azure::{AdlV1Config, AzureAuthorizer, AzureBlobConfig};
pub use s3::{S3Config, S3Credentials};

/// Backend construction failure. Fatal to the mount attempt.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("couldn't load azure credentials: {0}")]
    AzureCredentials(String),

    #[error("invalid azure blob endpoint {endpoint:?}: {reason}")]
    AzureEndpoint { endpoint: String, reason: String },
}

/// Connection parameters for the selected storage backend
#[derive(Debug, Clone)]
pub enum BackendConfig {
    S3(S3Config),
    AdlV1(AdlV1Config),
    AzureBlob(AzureBlobConfig),
}

impl BackendConfig {
    pub fn name(&self) -> &'static str {
        match self {
            BackendConfig::S3(_) => "s3",
            BackendConfig::AdlV1(_) => "adlv1",
            BackendConfig::AzureBlob(_) => "azblob",
        }
    }

    pub fn as_s3(&self) -> Option<&S3Config> {
        match self {
            BackendConfig::S3(config) => Some(config),
            _ => None,
        }
    }
}

/// Outcome of backend selection
#[derive(Debug, Clone)]
pub struct SelectedBackend {
    pub backend: BackendConfig,
    /// Bucket name handed to the engine, possibly rewritten from the identifier
    pub bucket: String,
}

/// Effective bucket name for backends that encode the prefix as `:prefix`
pub fn rewrite_prefix(bucket: &str, prefix: &str) -> String {
    if prefix.is_empty() {
        bucket.to_string()
    } else {
        format!(":{}", prefix)
    }
}

/// Choose the backend for `bucket`.
///
/// Explicit static credentials or a named profile pin the default S3
/// backend. Otherwise the identifier's scheme decides; an identifier that
/// does not parse simply means no alternate backend. Failing to build an
/// alternate backend's credentials is an error.
pub fn select_backend(
    bucket: &str,
    flags: &RuntimeFlags,
    env: &impl EnvSource,
    log: &Logger,
) -> Result<SelectedBackend, BackendError> {
    let s3 = |credentials: S3Credentials| {
        let mut config = S3Config::from_flags(flags, credentials);
        if !flags.endpoint.is_empty() {
            config.endpoint = Some(flags.endpoint.clone());
        }
        BackendConfig::S3(config)
    };

    if !flags.access_key.is_empty() {
        return Ok(SelectedBackend {
            backend: s3(S3Credentials::Static {
                access_key: flags.access_key.clone(),
                secret_key: flags.secret_key.clone(),
            }),
            bucket: bucket.to_string(),
        });
    }

    if !flags.profile.is_empty() {
        return Ok(SelectedBackend {
            backend: s3(S3Credentials::Profile(flags.profile.clone())),
            bucket: bucket.to_string(),
        });
    }

    let spec = match parse_bucket_spec(bucket) {
        Ok(spec) => spec,
        Err(e) => {
            log.debug(format_args!("Using default backend for {:?}: {}", bucket, e));
            return Ok(SelectedBackend {
                backend: s3(S3Credentials::Default),
                bucket: bucket.to_string(),
            });
        }
    };

    match spec.scheme {
        Scheme::Adl => {
            let authorizer = AzureAuthorizer::from_env(env)?;
            log.info(format_args!("Using ADLv1 endpoint {}", spec.bucket));
            Ok(SelectedBackend {
                backend: BackendConfig::AdlV1(AdlV1Config {
                    endpoint: spec.bucket.clone(),
                    authorizer,
                }),
                // ADLv1 has no bucket namespace, only the prefix survives
                bucket: rewrite_prefix("", &spec.prefix),
            })
        }
        Scheme::Wasb | Scheme::Wasbs => {
            let mut config = AzureBlobConfig::from_endpoint(&flags.endpoint, env)?;
            config.container = spec.bucket.clone();
            config.tls = spec.scheme == Scheme::Wasbs || config.tls;
            log.info(format_args!(
                "Using Azure Blob account {} container {}",
                config.account_name, config.container
            ));
            Ok(SelectedBackend {
                backend: BackendConfig::AzureBlob(config),
                bucket: rewrite_prefix(&spec.bucket, &spec.prefix),
            })
        }
        // The engine parses its own identifiers
        Scheme::S3 | Scheme::Default => Ok(SelectedBackend {
            backend: s3(S3Credentials::Default),
            bucket: bucket.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use tracing::Level;

    use super::*;
    use crate::config::UserConfig;

    fn flags() -> RuntimeFlags {
        RuntimeFlags::from_user_config(&UserConfig::new("/mnt"))
    }

    fn azure_env() -> HashMap<String, String> {
        [
            ("AZURE_CLIENT_ID", "client"),
            ("AZURE_CLIENT_SECRET", "secret"),
            ("AZURE_TENANT_ID", "tenant"),
            ("AZURE_STORAGE_ACCOUNT", "myaccount"),
            ("AZURE_STORAGE_KEY", "c2VjcmV0"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    fn log() -> Logger {
        Logger::new("main", Level::INFO)
    }

    #[test]
    fn test_plain_bucket_uses_default_backend() {
        let selected = select_backend("mybucket", &flags(), &azure_env(), &log()).unwrap();
        assert_eq!(selected.bucket, "mybucket");
        let s3 = selected.backend.as_s3().expect("Expected S3 backend");
        assert!(matches!(s3.credentials, S3Credentials::Default));
        assert!(s3.force_path_style);
    }

    #[test]
    fn test_addressing_follows_subdomain_flag() {
        let mut flags = flags();
        flags.subdomain = true;
        flags.path_style = false;
        let selected = select_backend("mybucket", &flags, &azure_env(), &log()).unwrap();
        assert!(!selected.backend.as_s3().unwrap().force_path_style);
    }

    #[test]
    fn test_explicit_access_key_dominates_scheme() {
        let mut flags = flags();
        flags.access_key = "AKIA".to_string();
        flags.secret_key = "secret".to_string();

        for bucket in ["adl://myendpoint/p", "wasb://c/p", "s3://b/p", "mybucket", "ftp://x"] {
            let selected = select_backend(bucket, &flags, &HashMap::new(), &log()).unwrap();
            assert_eq!(selected.bucket, bucket);
            match selected.backend {
                BackendConfig::S3(s3) => assert!(matches!(
                    s3.credentials,
                    S3Credentials::Static { ref access_key, .. } if access_key == "AKIA"
                )),
                other => panic!("Expected S3 backend for {}, got {}", bucket, other.name()),
            }
        }
    }

    #[test]
    fn test_profile_dominates_scheme() {
        let mut flags = flags();
        flags.profile = "work".to_string();
        let selected = select_backend("adl://myendpoint", &flags, &HashMap::new(), &log()).unwrap();
        match selected.backend {
            BackendConfig::S3(s3) => {
                assert!(matches!(s3.credentials, S3Credentials::Profile(ref p) if p == "work"))
            }
            other => panic!("Expected S3 backend, got {}", other.name()),
        }
    }

    #[test]
    fn test_adl_with_prefix() {
        let selected =
            select_backend("adl://myendpoint/some/prefix", &flags(), &azure_env(), &log()).unwrap();
        assert_eq!(selected.bucket, ":some/prefix");
        match selected.backend {
            BackendConfig::AdlV1(adl) => assert_eq!(adl.endpoint, "myendpoint"),
            other => panic!("Expected ADLv1 backend, got {}", other.name()),
        }
    }

    #[test]
    fn test_adl_without_prefix_has_empty_bucket() {
        let selected = select_backend("adl://myendpoint", &flags(), &azure_env(), &log()).unwrap();
        assert_eq!(selected.bucket, "");
    }

    #[test]
    fn test_adl_without_credentials_is_fatal() {
        let err = select_backend("adl://myendpoint", &flags(), &HashMap::new(), &log()).unwrap_err();
        assert!(matches!(err, BackendError::AzureCredentials(_)));
        assert!(err.to_string().starts_with("couldn't load azure credentials"));
    }

    #[test]
    fn test_wasb_bucket_and_prefix() {
        let selected = select_backend("wasb://container", &flags(), &azure_env(), &log()).unwrap();
        assert_eq!(selected.bucket, "container");

        let selected = select_backend("wasb://container/dir", &flags(), &azure_env(), &log()).unwrap();
        assert_eq!(selected.bucket, ":dir");
        match selected.backend {
            BackendConfig::AzureBlob(blob) => {
                assert_eq!(blob.account_name, "myaccount");
                assert_eq!(blob.container, "container");
            }
            other => panic!("Expected Azure Blob backend, got {}", other.name()),
        }
    }

    #[test]
    fn test_wasb_without_account_is_fatal() {
        let err = select_backend("wasb://container", &flags(), &HashMap::new(), &log()).unwrap_err();
        assert!(matches!(err, BackendError::AzureCredentials(_)));
    }

    #[test]
    fn test_unparseable_identifier_falls_back_to_default() {
        let selected = select_backend("ftp://host/path", &flags(), &HashMap::new(), &log()).unwrap();
        assert_eq!(selected.bucket, "ftp://host/path");
        assert!(selected.backend.as_s3().is_some());
    }

    #[test]
    fn test_s3_scheme_passes_identifier_through() {
        for bucket in ["s3://bucket/dir", "s3://bucket", "mybucket:dir"] {
            let selected = select_backend(bucket, &flags(), &HashMap::new(), &log()).unwrap();
            assert_eq!(selected.bucket, bucket);
            assert!(selected.backend.as_s3().is_some());
        }
    }

    #[test]
    fn test_endpoint_override_applies_to_s3() {
        let mut flags = flags();
        flags.endpoint = "http://minio:9000".to_string();
        let selected = select_backend("mybucket", &flags, &HashMap::new(), &log()).unwrap();
        assert_eq!(
            selected.backend.as_s3().unwrap().endpoint.as_deref(),
            Some("http://minio:9000")
        );
    }

    #[test]
    fn test_rewrite_prefix() {
        assert_eq!(rewrite_prefix("bucket", ""), "bucket");
        assert_eq!(rewrite_prefix("bucket", "a/b"), ":a/b");
        assert_eq!(rewrite_prefix("", "a"), ":a");
    }
}
