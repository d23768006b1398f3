//! Unmount primitive
//!
//! Unmounting goes through a trait so the cache supervisor can be exercised
//! without a real FUSE mount. The system implementation shells out to the
//! platform tools, the same way an operator would.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

/// Unmount failure
#[derive(Debug, Clone, thiserror::Error)]
pub enum UnmountError {
    #[error("unmount {path:?}: {reason}")]
    Failed { path: PathBuf, reason: String },

    #[error("unmount not supported on this platform")]
    Unsupported,
}

/// Something that can tear down a mount point.
///
/// Unmounting an already unmounted path is expected to fail harmlessly.
#[async_trait]
pub trait Unmount: Send + Sync {
    async fn unmount(&self, path: &Path) -> Result<(), UnmountError>;
}

/// Unmounts through the operating system's FUSE tooling
#[derive(Debug, Clone, Default)]
pub struct SystemUnmounter;

impl SystemUnmounter {
    pub fn new() -> Self {
        Self
    }
}

/// Run a command and turn a non-zero exit into an [`UnmountError`]
async fn run(path: &Path, program: &str, args: &[&str]) -> Result<(), UnmountError> {
    debug!("Running {} {:?} {:?}", program, args, path);

    let output = Command::new(program)
        .args(args)
        .arg(path)
        .output()
        .await
        .map_err(|e| UnmountError::Failed {
            path: path.to_path_buf(),
            reason: format!("{}: {}", program, e),
        })?;

    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(UnmountError::Failed {
        path: path.to_path_buf(),
        reason: format!("{} failed: {}", program, stderr.trim()),
    })
}

#[async_trait]
impl Unmount for SystemUnmounter {
    #[cfg(target_os = "linux")]
    async fn unmount(&self, path: &Path) -> Result<(), UnmountError> {
        // fusermount works unprivileged; umount is the fallback for root mounts
        match run(path, "fusermount", &["-u"]).await {
            Ok(()) => Ok(()),
            Err(first) => {
                debug!("fusermount failed, falling back to umount: {}", first);
                run(path, "umount", &[]).await
            }
        }
    }

    #[cfg(target_os = "macos")]
    async fn unmount(&self, path: &Path) -> Result<(), UnmountError> {
        run(path, "umount", &[]).await
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    async fn unmount(&self, _path: &Path) -> Result<(), UnmountError> {
        Err(UnmountError::Unsupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unmount_of_unmounted_path_fails_harmlessly() {
        let dir = tempfile::tempdir().unwrap();
        let result = SystemUnmounter::new().unmount(dir.path()).await;
        assert!(result.is_err());
        // The directory itself is untouched
        assert!(dir.path().is_dir());
    }

    #[test]
    fn test_unmount_error_mentions_path() {
        let err = UnmountError::Failed {
            path: PathBuf::from("/mnt/bucket"),
            reason: "not mounted".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("/mnt/bucket"));
        assert!(msg.contains("not mounted"));
    }
}
