//! Common test fixtures
//!
//! Stand-ins for the collaborators the mount layer talks to: an engine
//! factory, a FUSE bridge and an unmounter. Each records what it was asked
//! to do so tests can check ordering and rollback.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use bucketfs::backend::BackendConfig;
use bucketfs::flags::RuntimeFlags;
use bucketfs::fuse::{Bridge, FileSystemServer, MountConfig};
use bucketfs::logging::LogContext;
use bucketfs::mount::{EngineFactory, Mounter};
use bucketfs::supervisor::CacheSupervisor;
use bucketfs::unmount::{Unmount, UnmountError};

// ============================================================================
// Engine
// ============================================================================

/// Engine that implements no operations
pub struct NullEngine {
    pub bucket: String,
}

impl fuser::Filesystem for NullEngine {}

/// What the factory was asked to build
#[derive(Debug, Clone)]
pub struct EngineRequest {
    pub bucket: String,
    pub backend: String,
    pub backend_attached: bool,
}

/// Factory that records requests and can be told to fail
#[derive(Clone, Default)]
pub struct MockFactory {
    pub fail: bool,
    pub requests: Arc<Mutex<Vec<EngineRequest>>>,
}

impl MockFactory {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }
}

impl EngineFactory for MockFactory {
    type Engine = NullEngine;

    fn new_engine(
        &self,
        _ctx: &CancellationToken,
        bucket: &str,
        backend: &BackendConfig,
        flags: &RuntimeFlags,
    ) -> Option<NullEngine> {
        self.requests.lock().push(EngineRequest {
            bucket: bucket.to_string(),
            backend: backend.name().to_string(),
            backend_attached: flags.backend.is_some(),
        });
        if self.fail {
            None
        } else {
            Some(NullEngine {
                bucket: bucket.to_string(),
            })
        }
    }
}

// ============================================================================
// Bridge
// ============================================================================

/// Shared record of bridge activity
#[derive(Debug, Default)]
pub struct BridgeLog {
    pub mounts: Vec<PathBuf>,
    pub configs: Vec<MountConfig>,
    pub unmounted: Vec<PathBuf>,
}

/// Bridge that never touches the kernel
#[derive(Clone, Default)]
pub struct MockBridge {
    pub fail: Option<String>,
    pub log: Arc<Mutex<BridgeLog>>,
}

impl MockBridge {
    pub fn failing(reason: &str) -> Self {
        Self {
            fail: Some(reason.to_string()),
            ..Default::default()
        }
    }
}

/// Mount handle that records when it is dropped
pub struct MockHandle {
    path: PathBuf,
    log: Arc<Mutex<BridgeLog>>,
}

impl Drop for MockHandle {
    fn drop(&mut self) {
        self.log.lock().unmounted.push(self.path.clone());
    }
}

impl Bridge for MockBridge {
    type Handle = MockHandle;

    fn mount<E>(
        &self,
        mount_point: &Path,
        _server: FileSystemServer<E>,
        config: &MountConfig,
    ) -> io::Result<MockHandle>
    where
        E: fuser::Filesystem + Send + 'static,
    {
        let mut log = self.log.lock();
        log.mounts.push(mount_point.to_path_buf());
        log.configs.push(config.clone());

        if let Some(reason) = &self.fail {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, reason.clone()));
        }

        Ok(MockHandle {
            path: mount_point.to_path_buf(),
            log: self.log.clone(),
        })
    }
}

// ============================================================================
// Unmounter
// ============================================================================

/// Unmounter that records calls and optionally fails
#[derive(Default)]
pub struct MockUnmounter {
    pub fail: bool,
    pub calls: Mutex<Vec<PathBuf>>,
}

impl MockUnmounter {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }
}

#[async_trait]
impl Unmount for MockUnmounter {
    async fn unmount(&self, path: &Path) -> Result<(), UnmountError> {
        self.calls.lock().push(path.to_path_buf());
        if self.fail {
            Err(UnmountError::Failed {
                path: path.to_path_buf(),
                reason: "Device or resource busy".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

// ============================================================================
// Assembly
// ============================================================================

/// Azure credentials as they would appear in the environment
pub fn azure_env() -> HashMap<String, String> {
    [
        ("AZURE_CLIENT_ID", "client"),
        ("AZURE_CLIENT_SECRET", "secret"),
        ("AZURE_TENANT_ID", "tenant"),
        ("AZURE_STORAGE_ACCOUNT", "account"),
        ("AZURE_STORAGE_KEY", "a2V5"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

pub type TestMounter = Mounter<MockFactory, MockBridge, MockUnmounter, HashMap<String, String>>;

/// A mounter wired to the given fakes; the cache program never exists
pub fn mounter(
    factory: MockFactory,
    bridge: MockBridge,
    unmounter: Arc<MockUnmounter>,
    env: HashMap<String, String>,
) -> TestMounter {
    mounter_with_cache(
        factory,
        bridge,
        unmounter,
        env,
        "/nonexistent/bucketfs-test-catfs",
    )
}

/// A mounter that runs `program` as its cache process
pub fn mounter_with_cache(
    factory: MockFactory,
    bridge: MockBridge,
    unmounter: Arc<MockUnmounter>,
    env: HashMap<String, String>,
    program: &str,
) -> TestMounter {
    let log = LogContext::new();
    let supervisor = CacheSupervisor::new(log.clone())
        .with_program(program)
        .with_unmount_delay(Duration::ZERO)
        .with_exit_hook(|code| panic!("unexpected exit({})", code));
    Mounter::with_parts(factory, bridge, unmounter, env, log, supervisor)
}
