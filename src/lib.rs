//! bucketfs: mount an object-storage bucket as a local file system
//!
//! This crate is the orchestration layer around a FUSE file-system engine.
//! The engine itself (any [`fuser::Filesystem`]) is supplied by the caller.
//!
//! # Architecture
//!
//! - **Bucket specs**: a bucket identifier such as `s3://bucket/prefix` or
//!   `adl://account/dir` is parsed into scheme, bucket and prefix.
//! - **Runtime flags**: the user-facing [`config::UserConfig`] is translated
//!   field for field into [`flags::RuntimeFlags`].
//! - **Backend selection**: explicit credentials pin S3; otherwise the
//!   scheme picks S3, Azure Data Lake Gen1 or Azure Blob Storage.
//! - **Mounting**: [`mount::Mounter`] builds the engine, wraps it for fuser
//!   and mounts it.
//! - **Cache supervision**: an optional `catfs` process fronts the mount and
//!   is watched for the rest of its life.
//!
//! # Example
//!
//! ```no_run
//! use bucketfs::config::Config;
//! use bucketfs::logging::{init_tracing, LogContext};
//! use bucketfs::mount::{EngineFactory, Mounter};
//! # use bucketfs::backend::BackendConfig;
//! # use bucketfs::flags::RuntimeFlags;
//! # use tokio_util::sync::CancellationToken;
//! # struct MyEngine;
//! # impl fuser::Filesystem for MyEngine {}
//! # struct MyFactory;
//! # impl EngineFactory for MyFactory {
//! #     type Engine = MyEngine;
//! #     fn new_engine(&self, _: &CancellationToken, _: &str, _: &BackendConfig, _: &RuntimeFlags) -> Option<MyEngine> { Some(MyEngine) }
//! # }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_file("bucketfs.yaml".as_ref())?;
//! config.validate()?;
//! init_tracing(&config.logging);
//!
//! let mounter = Mounter::new(MyFactory, LogContext::new());
//! let session = mounter
//!     .mount(CancellationToken::new(), "s3://my-bucket/data", &config.mount)
//!     .await?;
//! // ... the bucket stays mounted until `session` is dropped
//! # drop(session);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod bucket;
pub mod config;
pub mod env;
pub mod error;
pub mod flags;
pub mod fuse;
pub mod logging;
pub mod mount;
pub mod supervisor;
pub mod unmount;

pub use error::{BucketFsError, Result};
pub use mount::{mount, EngineFactory, MountSession, Mounter};
