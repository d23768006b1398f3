//! Mount orchestration and lifecycle

use std::path::PathBuf;
use std::sync::Arc;

use fuser::Filesystem;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::Level;

use crate::backend::{select_backend, BackendConfig};
use crate::config::UserConfig;
use crate::env::{EnvSource, ProcessEnv};
use crate::error::{BucketFsError, Result};
use crate::flags::RuntimeFlags;
use crate::fuse::{Bridge, FileSystemServer, FuserBridge, MountConfig, SharedEngine};
use crate::logging::LogContext;
use crate::supervisor::CacheSupervisor;
use crate::unmount::{SystemUnmounter, Unmount};

/// Builds the file-system engine for a mount.
///
/// Returning `None` means the engine could not be initialized.
pub trait EngineFactory: Send + Sync {
    /// The engine receives the kernel's `init` unchanged. It must not add
    /// `FUSE_WRITEBACK_CACHE` to the [`fuser::KernelConfig`] capabilities;
    /// writes are buffered by the engine and must reach it as issued.
    type Engine: Filesystem + Send + 'static;

    fn new_engine(
        &self,
        ctx: &CancellationToken,
        bucket: &str,
        backend: &BackendConfig,
        flags: &RuntimeFlags,
    ) -> Option<Self::Engine>;
}

/// A live mount
pub struct MountSession<E, H> {
    /// Mount path
    pub mount_point: PathBuf,
    engine: SharedEngine<E>,
    /// Session handle (for unmounting)
    handle: Option<H>,
}

impl<E, H> MountSession<E, H> {
    pub fn engine(&self) -> &SharedEngine<E> {
        &self.engine
    }

    pub fn is_mounted(&self) -> bool {
        self.handle.is_some()
    }

    /// Unmount this filesystem.
    ///
    /// Dropping the bridge handle tears the mount down.
    pub fn unmount(&mut self) {
        if let Some(handle) = self.handle.take() {
            tracing::info!("Unmounting {:?}", self.mount_point);
            drop(handle);
        }
    }
}

impl<E, H> Drop for MountSession<E, H> {
    fn drop(&mut self) {
        self.unmount();
    }
}

/// Establishes mounts and hands the mount point to the cache supervisor
pub struct Mounter<F, B, U = SystemUnmounter, V = ProcessEnv> {
    factory: F,
    bridge: B,
    unmounter: Arc<U>,
    env: V,
    log: LogContext,
    supervisor: CacheSupervisor,
}

impl<F: EngineFactory> Mounter<F, FuserBridge> {
    /// Mounter using fuser, the system unmount tools and the process environment
    pub fn new(factory: F, log: LogContext) -> Self {
        Self {
            factory,
            bridge: FuserBridge,
            unmounter: Arc::new(SystemUnmounter::new()),
            env: ProcessEnv,
            supervisor: CacheSupervisor::new(log.clone()),
            log,
        }
    }
}

impl<F, B, U, V> Mounter<F, B, U, V>
where
    F: EngineFactory,
    B: Bridge,
    U: Unmount + 'static,
    V: EnvSource,
{
    /// Mounter with every collaborator supplied by the caller
    pub fn with_parts(
        factory: F,
        bridge: B,
        unmounter: Arc<U>,
        env: V,
        log: LogContext,
        supervisor: CacheSupervisor,
    ) -> Self {
        Self {
            factory,
            bridge,
            unmounter,
            env,
            log,
            supervisor,
        }
    }

    pub fn log(&self) -> &LogContext {
        &self.log
    }

    /// Mount `bucket` as described by `config`.
    pub async fn mount(
        &self,
        ctx: CancellationToken,
        bucket: &str,
        config: &UserConfig,
    ) -> Result<MountSession<F::Engine, B::Handle>> {
        self.mount_flags(ctx, bucket, RuntimeFlags::from_user_config(config))
            .await
    }

    /// Mount with already translated flags.
    ///
    /// Used directly when the engine mounts at a backing directory that a
    /// cache process fronts; see [`RuntimeFlags::with_backing_mount_point`].
    pub async fn mount_flags(
        &self,
        ctx: CancellationToken,
        bucket: &str,
        mut flags: RuntimeFlags,
    ) -> Result<MountSession<F::Engine, B::Handle>> {
        let log = &self.log;

        // Every mount sets all three levels; nothing carries over
        log.s3.set_level(debug_level(flags.debug_s3));
        log.fuse.set_level(debug_level(flags.debug_fuse));
        log.main.set_level(debug_level(flags.debug_fuse));

        let mount_config = MountConfig {
            fs_name: bucket.to_string(),
            options: flags.mount_options.clone(),
            error_log: log.fuse.sink(Level::ERROR),
            debug_log: flags.debug_fuse.then(|| log.fuse.sink(Level::DEBUG)),
        };

        let selected = select_backend(bucket, &flags, &self.env, &log.main)?;
        log.main.debug(format_args!(
            "Selected {} backend, bucket {:?}",
            selected.backend.name(),
            selected.bucket
        ));
        flags.backend = Some(selected.backend.clone());

        if ctx.is_cancelled() {
            return Err(BucketFsError::Cancelled);
        }

        let engine = self
            .factory
            .new_engine(&ctx, &selected.bucket, &selected.backend, &flags)
            .ok_or(BucketFsError::InitializationFailed)?;
        let engine = Arc::new(Mutex::new(engine));

        let server = FileSystemServer::new(engine.clone(), &mount_config);
        let handle = self
            .bridge
            .mount(&flags.mount_point, server, &mount_config)
            .map_err(BucketFsError::MountFailed)?;

        log.main.info(format_args!(
            "Mounted {} at {:?}",
            bucket, flags.mount_point
        ));

        let session = MountSession {
            mount_point: flags.mount_point.clone(),
            engine,
            handle: Some(handle),
        };

        if !flags.cache.is_empty() {
            // On failure the supervisor has already tried to unmount; dropping
            // the session makes a second, harmless attempt.
            self.supervisor
                .launch(&flags, self.unmounter.clone())
                .await?;
        }

        Ok(session)
    }
}

fn debug_level(debug: bool) -> Level {
    if debug {
        Level::DEBUG
    } else {
        Level::INFO
    }
}

/// Mount `bucket` with the fuser bridge and a fresh logging context.
pub async fn mount<F: EngineFactory>(
    ctx: CancellationToken,
    bucket: &str,
    config: &UserConfig,
    factory: F,
) -> Result<MountSession<F::Engine, fuser::BackgroundSession>> {
    Mounter::new(factory, LogContext::new())
        .mount(ctx, bucket, config)
        .await
}
