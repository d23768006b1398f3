use std::io;
use thiserror::Error;

use crate::backend::BackendError;
use crate::config::ConfigError;
use crate::unmount::UnmountError;

/// Main error type for bucketfs mount operations.
///
/// Every variant identifies the stage that failed so a single error value is
/// enough to tell the user where a mount attempt stopped.
#[derive(Error, Debug)]
pub enum BucketFsError {
    #[error("Malformed bucket spec: {0}")]
    MalformedSpec(String),

    #[error("{0}")]
    Credential(#[from] BackendError),

    #[error("Mount: initialization failed")]
    InitializationFailed,

    #[error("Mount: {0}")]
    MountFailed(#[source] io::Error),

    #[error("Failed to start catfs: {source}{}", unmount_suffix(.unmount))]
    CacheStartFailed {
        #[source]
        source: io::Error,
        /// Rollback failure, appended to the start failure
        unmount: Option<UnmountError>,
    },

    #[error("catfs exited: {0}")]
    CacheExit(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Mount: cancelled")]
    Cancelled,
}

fn unmount_suffix(unmount: &Option<UnmountError>) -> String {
    match unmount {
        Some(e) => format!(". Failed to unmount: {}", e),
        None => String::new(),
    }
}

/// Result type alias for bucketfs operations
pub type Result<T> = std::result::Result<T, BucketFsError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_cache_start_failure_without_unmount_error() {
        let err = BucketFsError::CacheStartFailed {
            source: io::Error::new(io::ErrorKind::NotFound, "no such file"),
            unmount: None,
        };
        assert_eq!(err.to_string(), "Failed to start catfs: no such file");
    }

    #[test]
    fn test_cache_start_failure_appends_unmount_error() {
        let err = BucketFsError::CacheStartFailed {
            source: io::Error::new(io::ErrorKind::NotFound, "no such file"),
            unmount: Some(UnmountError::Failed {
                path: PathBuf::from("/mount"),
                reason: "device busy".to_string(),
            }),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("Failed to start catfs: no such file"));
        assert!(msg.contains("Failed to unmount"));
        assert!(msg.contains("device busy"));
    }

    #[test]
    fn test_mount_failure_names_stage() {
        let err = BucketFsError::MountFailed(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "fusermount: permission denied",
        ));
        assert_eq!(err.to_string(), "Mount: fusermount: permission denied");
    }
}
