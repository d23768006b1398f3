//! FUSE bridge
//!
//! The engine is any [`fuser::Filesystem`]. The caller keeps a handle to it
//! after mounting, so [`FileSystemServer`] adapts a shared engine to the
//! owned filesystem fuser wants and dispatches every operation to it.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use fuser::{
    Filesystem, KernelConfig, MountOption, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory,
    ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, ReplyXattr, Request, TimeOrNow,
};
use libc::c_int;
use parking_lot::Mutex;

use crate::logging::LogSink;

/// An engine shared between the caller and the FUSE server
pub type SharedEngine<E> = Arc<Mutex<E>>;

/// Options for one FUSE mount
#[derive(Debug, Clone)]
pub struct MountConfig {
    /// Name shown in the mount table
    pub fs_name: String,
    /// `-o` style options; empty values are bare flags
    pub options: BTreeMap<String, String>,
    pub error_log: LogSink,
    pub debug_log: Option<LogSink>,
}

impl MountConfig {
    /// Translate into fuser mount options
    pub fn mount_options(&self) -> Vec<MountOption> {
        let mut options = vec![MountOption::FSName(self.fs_name.clone())];

        for (key, value) in &self.options {
            let option = match (key.as_str(), value.is_empty()) {
                ("allow_other", true) => MountOption::AllowOther,
                ("allow_root", true) => MountOption::AllowRoot,
                ("auto_unmount", true) => MountOption::AutoUnmount,
                ("default_permissions", true) => MountOption::DefaultPermissions,
                ("ro", true) => MountOption::RO,
                ("rw", true) => MountOption::RW,
                ("subtype", false) => MountOption::Subtype(value.clone()),
                (_, true) => MountOption::CUSTOM(key.clone()),
                (_, false) => MountOption::CUSTOM(format!("{}={}", key, value)),
            };
            options.push(option);
        }

        options
    }
}

/// Dispatches FUSE operations to a shared engine
pub struct FileSystemServer<E> {
    engine: SharedEngine<E>,
    debug_log: Option<LogSink>,
}

impl<E: Filesystem> FileSystemServer<E> {
    pub fn new(engine: SharedEngine<E>, config: &MountConfig) -> Self {
        Self {
            engine,
            debug_log: config.debug_log.clone(),
        }
    }

    pub fn engine(&self) -> &SharedEngine<E> {
        &self.engine
    }

    fn trace(&self, args: std::fmt::Arguments<'_>) {
        if let Some(log) = &self.debug_log {
            log.line(args);
        }
    }
}

impl<E: Filesystem> Filesystem for FileSystemServer<E> {
    fn init(&mut self, req: &Request<'_>, config: &mut KernelConfig) -> Result<(), c_int> {
        self.trace(format_args!("init"));
        self.engine.lock().init(req, config)
    }

    fn destroy(&mut self) {
        self.trace(format_args!("destroy"));
        self.engine.lock().destroy()
    }

    fn lookup(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        self.trace(format_args!("lookup: parent={} name={:?}", parent, name));
        self.engine.lock().lookup(req, parent, name, reply)
    }

    fn forget(&mut self, req: &Request<'_>, ino: u64, nlookup: u64) {
        self.trace(format_args!("forget: ino={} nlookup={}", ino, nlookup));
        self.engine.lock().forget(req, ino, nlookup)
    }

    fn getattr(&mut self, req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        self.trace(format_args!("getattr: ino={}", ino));
        self.engine.lock().getattr(req, ino, reply)
    }

    fn setattr(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        ctime: Option<SystemTime>,
        fh: Option<u64>,
        crtime: Option<SystemTime>,
        chgtime: Option<SystemTime>,
        bkuptime: Option<SystemTime>,
        flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        self.trace(format_args!(
            "setattr: ino={} mode={:?} size={:?}",
            ino, mode, size
        ));
        self.engine.lock().setattr(
            req, ino, mode, uid, gid, size, atime, mtime, ctime, fh, crtime, chgtime, bkuptime,
            flags, reply,
        )
    }

    fn readlink(&mut self, req: &Request<'_>, ino: u64, reply: ReplyData) {
        self.trace(format_args!("readlink: ino={}", ino));
        self.engine.lock().readlink(req, ino, reply)
    }

    fn mknod(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        rdev: u32,
        reply: ReplyEntry,
    ) {
        self.trace(format_args!("mknod: parent={} name={:?}", parent, name));
        self.engine
            .lock()
            .mknod(req, parent, name, mode, umask, rdev, reply)
    }

    fn mkdir(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        reply: ReplyEntry,
    ) {
        self.trace(format_args!("mkdir: parent={} name={:?}", parent, name));
        self.engine.lock().mkdir(req, parent, name, mode, umask, reply)
    }

    fn unlink(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        self.trace(format_args!("unlink: parent={} name={:?}", parent, name));
        self.engine.lock().unlink(req, parent, name, reply)
    }

    fn rmdir(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        self.trace(format_args!("rmdir: parent={} name={:?}", parent, name));
        self.engine.lock().rmdir(req, parent, name, reply)
    }

    fn symlink(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        link_name: &OsStr,
        target: &Path,
        reply: ReplyEntry,
    ) {
        self.trace(format_args!(
            "symlink: parent={} name={:?} target={:?}",
            parent, link_name, target
        ));
        self.engine
            .lock()
            .symlink(req, parent, link_name, target, reply)
    }

    fn rename(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        flags: u32,
        reply: ReplyEmpty,
    ) {
        self.trace(format_args!(
            "rename: {}/{:?} -> {}/{:?}",
            parent, name, newparent, newname
        ));
        self.engine
            .lock()
            .rename(req, parent, name, newparent, newname, flags, reply)
    }

    fn link(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        newparent: u64,
        newname: &OsStr,
        reply: ReplyEntry,
    ) {
        self.trace(format_args!(
            "link: ino={} -> {}/{:?}",
            ino, newparent, newname
        ));
        self.engine.lock().link(req, ino, newparent, newname, reply)
    }

    fn open(&mut self, req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        self.trace(format_args!("open: ino={} flags={:#x}", ino, flags));
        self.engine.lock().open(req, ino, flags, reply)
    }

    fn read(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        flags: i32,
        lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        self.trace(format_args!(
            "read: ino={} fh={} offset={} size={}",
            ino, fh, offset, size
        ));
        self.engine
            .lock()
            .read(req, ino, fh, offset, size, flags, lock_owner, reply)
    }

    fn write(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        write_flags: u32,
        flags: i32,
        lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        self.trace(format_args!(
            "write: ino={} fh={} offset={} len={}",
            ino,
            fh,
            offset,
            data.len()
        ));
        self.engine.lock().write(
            req,
            ino,
            fh,
            offset,
            data,
            write_flags,
            flags,
            lock_owner,
            reply,
        )
    }

    fn flush(&mut self, req: &Request<'_>, ino: u64, fh: u64, lock_owner: u64, reply: ReplyEmpty) {
        self.trace(format_args!("flush: ino={} fh={}", ino, fh));
        self.engine.lock().flush(req, ino, fh, lock_owner, reply)
    }

    fn release(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        fh: u64,
        flags: i32,
        lock_owner: Option<u64>,
        flush: bool,
        reply: ReplyEmpty,
    ) {
        self.trace(format_args!("release: ino={} fh={}", ino, fh));
        self.engine
            .lock()
            .release(req, ino, fh, flags, lock_owner, flush, reply)
    }

    fn fsync(&mut self, req: &Request<'_>, ino: u64, fh: u64, datasync: bool, reply: ReplyEmpty) {
        self.trace(format_args!("fsync: ino={} fh={}", ino, fh));
        self.engine.lock().fsync(req, ino, fh, datasync, reply)
    }

    fn opendir(&mut self, req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        self.trace(format_args!("opendir: ino={}", ino));
        self.engine.lock().opendir(req, ino, flags, reply)
    }

    fn readdir(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        reply: ReplyDirectory,
    ) {
        self.trace(format_args!(
            "readdir: ino={} fh={} offset={}",
            ino, fh, offset
        ));
        self.engine.lock().readdir(req, ino, fh, offset, reply)
    }

    fn releasedir(&mut self, req: &Request<'_>, ino: u64, fh: u64, flags: i32, reply: ReplyEmpty) {
        self.trace(format_args!("releasedir: ino={} fh={}", ino, fh));
        self.engine.lock().releasedir(req, ino, fh, flags, reply)
    }

    fn fsyncdir(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        fh: u64,
        datasync: bool,
        reply: ReplyEmpty,
    ) {
        self.trace(format_args!("fsyncdir: ino={} fh={}", ino, fh));
        self.engine.lock().fsyncdir(req, ino, fh, datasync, reply)
    }

    fn statfs(&mut self, req: &Request<'_>, ino: u64, reply: ReplyStatfs) {
        self.trace(format_args!("statfs: ino={}", ino));
        self.engine.lock().statfs(req, ino, reply)
    }

    fn setxattr(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        name: &OsStr,
        value: &[u8],
        flags: i32,
        position: u32,
        reply: ReplyEmpty,
    ) {
        self.trace(format_args!("setxattr: ino={} name={:?}", ino, name));
        self.engine
            .lock()
            .setxattr(req, ino, name, value, flags, position, reply)
    }

    fn getxattr(&mut self, req: &Request<'_>, ino: u64, name: &OsStr, size: u32, reply: ReplyXattr) {
        self.trace(format_args!("getxattr: ino={} name={:?}", ino, name));
        self.engine.lock().getxattr(req, ino, name, size, reply)
    }

    fn listxattr(&mut self, req: &Request<'_>, ino: u64, size: u32, reply: ReplyXattr) {
        self.trace(format_args!("listxattr: ino={}", ino));
        self.engine.lock().listxattr(req, ino, size, reply)
    }

    fn removexattr(&mut self, req: &Request<'_>, ino: u64, name: &OsStr, reply: ReplyEmpty) {
        self.trace(format_args!("removexattr: ino={} name={:?}", ino, name));
        self.engine.lock().removexattr(req, ino, name, reply)
    }

    fn access(&mut self, req: &Request<'_>, ino: u64, mask: i32, reply: ReplyEmpty) {
        self.trace(format_args!("access: ino={} mask={:#o}", ino, mask));
        self.engine.lock().access(req, ino, mask, reply)
    }

    fn create(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        flags: i32,
        reply: ReplyCreate,
    ) {
        self.trace(format_args!("create: parent={} name={:?}", parent, name));
        self.engine
            .lock()
            .create(req, parent, name, mode, umask, flags, reply)
    }
}

/// Mounts a server into the kernel
pub trait Bridge: Send + Sync {
    /// Keeps the mount alive; dropping it unmounts
    type Handle: Send + 'static;

    fn mount<E>(
        &self,
        mount_point: &Path,
        server: FileSystemServer<E>,
        config: &MountConfig,
    ) -> io::Result<Self::Handle>
    where
        E: Filesystem + Send + 'static;
}

/// Bridge backed by fuser's background session
#[derive(Debug, Clone, Default)]
pub struct FuserBridge;

impl Bridge for FuserBridge {
    type Handle = fuser::BackgroundSession;

    fn mount<E>(
        &self,
        mount_point: &Path,
        server: FileSystemServer<E>,
        config: &MountConfig,
    ) -> io::Result<Self::Handle>
    where
        E: Filesystem + Send + 'static,
    {
        check_mount_point(mount_point)?;

        let options = config.mount_options();
        if let Some(log) = &config.debug_log {
            log.line(format_args!("mounting {:?} with {:?}", mount_point, options));
        }

        fuser::spawn_mount2(server, mount_point, &options).map_err(|e| {
            config
                .error_log
                .line(format_args!("mount {:?} failed: {}", mount_point, e));
            e
        })
    }
}

/// Check the mount point exists and is a directory
pub fn check_mount_point(path: &Path) -> io::Result<()> {
    if !path.exists() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("Mount point does not exist: {:?}", path),
        ));
    }

    if !path.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("Mount point is not a directory: {:?}", path),
        ));
    }

    Ok(())
}
