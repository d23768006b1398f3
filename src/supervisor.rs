//! Cache subprocess supervision
//!
//! When caching is enabled a `catfs` process is started in front of the
//! already mounted file system. The supervisor keeps the visible mount point
//! consistent with that process: if it cannot start, the mount is rolled
//! back; if it dies later, the mount is torn down and this process exits.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use tokio::process::{Child, Command};
use tracing::Level;

use crate::error::{BucketFsError, Result};
use crate::flags::RuntimeFlags;
use crate::logging::{LogContext, Logger};
use crate::unmount::Unmount;

/// Default cache program
pub const CACHE_PROGRAM: &str = "catfs";

/// Unmounting right after a mount tends to fail with EBUSY
const START_FAILURE_UNMOUNT_DELAY: Duration = Duration::from_secs(1);

/// Called with the exit code when the cache process dies abnormally
pub type ExitHook = Arc<dyn Fn(i32) + Send + Sync>;

/// Lifecycle of the cache process
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheProcessState {
    NotStarted,
    Running,
    ExitedClean,
    ExitedError(String),
}

impl CacheProcessState {
    fn from_wait(result: std::io::Result<ExitStatus>) -> Self {
        match result {
            Ok(status) if status.success() => CacheProcessState::ExitedClean,
            Ok(status) => CacheProcessState::ExitedError(status.to_string()),
            Err(e) => CacheProcessState::ExitedError(e.to_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, CacheProcessState::ExitedError(_))
    }
}

/// Starts and watches the cache process
#[derive(Clone)]
pub struct CacheSupervisor {
    program: OsString,
    unmount_delay: Duration,
    log: LogContext,
    exit: ExitHook,
}

impl CacheSupervisor {
    pub fn new(log: LogContext) -> Self {
        Self {
            program: CACHE_PROGRAM.into(),
            unmount_delay: START_FAILURE_UNMOUNT_DELAY,
            log,
            exit: Arc::new(|code| std::process::exit(code)),
        }
    }

    /// Run a different cache program
    pub fn with_program(mut self, program: impl Into<OsString>) -> Self {
        self.program = program.into();
        self
    }

    /// Delay before rolling back a mount whose cache process failed to start
    pub fn with_unmount_delay(mut self, delay: Duration) -> Self {
        self.unmount_delay = delay;
        self
    }

    /// Replace `std::process::exit` as the reaction to an abnormal exit
    pub fn with_exit_hook(mut self, exit: impl Fn(i32) + Send + Sync + 'static) -> Self {
        self.exit = Arc::new(exit);
        self
    }

    /// Start the cache process for an established mount.
    ///
    /// A start failure rolls the mount back and is returned. Once started,
    /// the process is watched by a background task that reports only through
    /// logs and, on abnormal exit, the exit hook.
    pub async fn launch<U>(&self, flags: &RuntimeFlags, unmounter: Arc<U>) -> Result<()>
    where
        U: Unmount + 'static,
    {
        let level = if flags.debug_fuse {
            Level::DEBUG
        } else {
            Level::INFO
        };
        self.log.catfs.set_level(level);

        self.log.main.info(format_args!(
            "Starting {} {:?}",
            self.program.to_string_lossy(),
            flags.cache
        ));

        let spawned = Command::new(&self.program)
            .args(&flags.cache)
            .env("RUST_LOG", level.as_str().to_lowercase())
            .stdin(Stdio::null())
            .stderr(Stdio::piped())
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(source) => {
                self.log.main.error(format_args!(
                    "Failed to start {}: {}",
                    self.program.to_string_lossy(),
                    source
                ));
                tokio::time::sleep(self.unmount_delay).await;
                let unmount = unmounter.unmount(&flags.mount_point).await.err();
                return Err(BucketFsError::CacheStartFailed { source, unmount });
            }
        };

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(self.log.catfs.sink(level).forward(stderr));
        }

        let monitor = Monitor {
            mount_point: flags.mount_point.clone(),
            mount_point_arg: flags.mount_point_arg.clone(),
            unmounter,
            log: self.log.main.clone(),
            exit: self.exit.clone(),
        };
        tokio::spawn(monitor.run(child));

        Ok(())
    }
}

/// Background watcher for one cache process
struct Monitor<U> {
    mount_point: PathBuf,
    mount_point_arg: PathBuf,
    unmounter: Arc<U>,
    log: Logger,
    exit: ExitHook,
}

impl<U: Unmount> Monitor<U> {
    async fn run(self, mut child: Child) {
        let mut state = CacheProcessState::Running;
        self.log
            .debug(format_args!("catfs pid {:?} is {:?}", child.id(), state));

        state = CacheProcessState::from_wait(child.wait().await);

        match &state {
            CacheProcessState::ExitedError(status) => self.log.error(format_args!(
                "{}",
                BucketFsError::CacheExit(status.clone())
            )),
            _ => self.log.info(format_args!("catfs exited cleanly")),
        }

        if state.is_error() {
            // A clean exit means catfs unmounted the front mount itself
            self.try_unmount(&self.mount_point_arg).await;
        }

        if self.mount_point_arg != self.mount_point {
            self.try_unmount(&self.mount_point).await;
        }

        if state.is_error() {
            (self.exit)(1);
        }
    }

    async fn try_unmount(&self, path: &Path) {
        if let Err(e) = self.unmounter.unmount(path).await {
            self.log.error(format_args!("Failed to unmount: {}", e));
        }
    }
}
