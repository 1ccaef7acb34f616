#![deny(unsafe_code)]

//! # Overview
//!
//! The client-side VFS adapter: a [`fuse_mt::FilesystemMT`] implementation
//! that turns each upcall into one RPC through the [`rpc::Client`]
//! multiplexer and translates the result into the kernel's integer error
//! convention. Only the upcalls Filebox actually supports are overridden;
//! everything else inherits `fuse_mt`'s `ENOSYS` default.
//!
//! Every method here blocks its calling `fuse_mt` worker thread on the
//! async RPC call via a captured [`tokio::runtime::Handle`]. The upcall
//! contract is synchronous return, so there is no way around blocking
//! *some* thread; this keeps the kernel-facing thread and the blocked
//! thread the same one, same as upstream FUSE bindings expect.

use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use fuse_mt::{
    CallbackResult, DirectoryEntry, FileAttr, FileType, FilesystemMT, RequestInfo, ResultCreate,
    ResultData, ResultEmpty, ResultEntry, ResultOpen, ResultReaddir, ResultWrite,
};
use protocol::{FileInfo, Payload};
use rpc::Client;
use tokio::runtime::Handle;

/// Sentinel file handle sent when the kernel has no live handle for a call
/// (e.g. a `Truncate`/`Getattr` against a path that isn't currently open).
/// Any value past the server's handle counter routes to the path-based
/// branch there, so an all-ones value is always safe to use.
const NO_HANDLE: u64 = u64::MAX;

const DEFAULT_TTL: Duration = Duration::from_secs(1);

/// Translates kernel FUSE upcalls into Filebox RPCs.
pub struct FileboxFs {
    client: Arc<Client>,
    runtime: Handle,
}

impl FileboxFs {
    pub fn new(client: Arc<Client>, runtime: Handle) -> Self {
        FileboxFs { client, runtime }
    }

    fn call(&self, payload: Payload) -> (Payload, bool) {
        self.runtime.block_on(self.client.call(payload))
    }

    fn path_str(path: &Path) -> String {
        path.to_string_lossy().into_owned()
    }

    fn joined(parent: &Path, name: &OsStr) -> String {
        Self::path_str(&parent.join(name))
    }
}

fn file_info_to_attr(info: &FileInfo) -> FileAttr {
    let kind = if info.is_dir_bit_set() || info.is_directory {
        FileType::Directory
    } else {
        FileType::RegularFile
    };

    let mtime = info.modification_time;

    FileAttr {
        size: info.size.max(0) as u64,
        blocks: 0,
        atime: mtime,
        mtime,
        ctime: mtime,
        crtime: mtime,
        kind,
        // Base permission bits are widened regardless of the server's mode,
        // matching the original design's fixed `0777`-plus-type-bit mapping —
        // Filebox performs no permission enforcement of its own.
        perm: 0o777,
        nlink: 1,
        uid: 0,
        gid: 0,
        rdev: 0,
        flags: 0,
    }
}

impl FilesystemMT for FileboxFs {
    fn init(&self, _req: RequestInfo) -> ResultEmpty {
        Ok(())
    }

    fn destroy(&self) {}

    fn getattr(&self, _req: RequestInfo, path: &Path, fh: Option<u64>) -> ResultEntry {
        let (payload, ok) = self.call(Payload::GetFileAttributes {
            path: Self::path_str(path),
            file_handle: fh.unwrap_or(NO_HANDLE),
        });
        if !ok {
            return Err(libc::ENOENT);
        }
        match payload {
            Payload::GetFileAttributesResp { file_info } => {
                Ok((DEFAULT_TTL, file_info_to_attr(&file_info)))
            }
            _ => Err(libc::ENOENT),
        }
    }

    fn truncate(&self, _req: RequestInfo, path: &Path, fh: Option<u64>, size: u64) -> ResultEmpty {
        let (_payload, ok) = self.call(Payload::Truncate {
            path: Self::path_str(path),
            file_handle: fh.unwrap_or(NO_HANDLE),
            size: size as i64,
        });
        if ok { Ok(()) } else { Err(libc::EIO) }
    }

    fn opendir(&self, _req: RequestInfo, _path: &Path, _flags: u32) -> ResultOpen {
        // Directory handles aren't meaningful on the wire: `ReadDirectory`
        // only ever carries a path. A handle is still required to satisfy
        // the kernel's open/release-pair contract, so we hand back an inert
        // one.
        Ok((0, 0))
    }

    fn releasedir(&self, _req: RequestInfo, _path: &Path, _fh: u64, _flags: u32) -> ResultEmpty {
        Ok(())
    }

    fn readdir(&self, _req: RequestInfo, path: &Path, _fh: u64) -> ResultReaddir {
        let (payload, ok) = self.call(Payload::ReadDirectory {
            path: Self::path_str(path),
        });
        if !ok {
            return Err(libc::ENOENT);
        }
        let files = match payload {
            Payload::ReadDirectoryResp { files } => files,
            _ => return Err(libc::ENOENT),
        };

        let mut entries = Vec::with_capacity(files.len() + 2);
        entries.push(DirectoryEntry {
            name: ".".into(),
            kind: FileType::Directory,
        });
        entries.push(DirectoryEntry {
            name: "..".into(),
            kind: FileType::Directory,
        });
        for file in files {
            let kind = if file.is_dir_bit_set() || file.is_directory {
                FileType::Directory
            } else {
                FileType::RegularFile
            };
            entries.push(DirectoryEntry {
                name: file.name.into(),
                kind,
            });
        }
        Ok(entries)
    }

    fn open(&self, _req: RequestInfo, path: &Path, flags: u32) -> ResultOpen {
        let (payload, ok) = self.call(Payload::OpenFile {
            path: Self::path_str(path),
            flags: flags as i32,
        });
        if !ok {
            return Err(libc::ENOENT);
        }
        match payload {
            Payload::OpenFileResp { file_handle } => Ok((file_handle, 0)),
            _ => Err(libc::ENOENT),
        }
    }

    fn read(
        &self,
        _req: RequestInfo,
        _path: &Path,
        fh: u64,
        offset: u64,
        size: u32,
        callback: impl FnOnce(ResultData) -> CallbackResult,
    ) -> CallbackResult {
        let (payload, ok) = self.call(Payload::ReadFile {
            file_handle: fh,
            offset: offset as i64,
            size: size as i32,
        });

        // Return the RPC's data on success; an empty read only on failure.
        let result = if ok {
            match payload {
                Payload::ReadFileResp { data, .. } => Ok(data),
                _ => Err(libc::EIO),
            }
        } else {
            Ok(Vec::new())
        };
        callback(result)
    }

    fn write(
        &self,
        _req: RequestInfo,
        _path: &Path,
        fh: u64,
        offset: u64,
        data: Vec<u8>,
        _flags: u32,
    ) -> ResultWrite {
        let (payload, ok) = self.call(Payload::WriteFile {
            file_handle: fh,
            offset: offset as i64,
            data,
        });
        if !ok {
            return Err(libc::EIO);
        }
        match payload {
            Payload::WriteFileResp { bytes_written } => Ok(bytes_written.max(0) as u32),
            _ => Err(libc::EIO),
        }
    }

    fn release(
        &self,
        _req: RequestInfo,
        _path: &Path,
        fh: u64,
        _flags: u32,
        _lock_owner: u64,
        _flush: bool,
    ) -> ResultEmpty {
        // Release failures are swallowed by design: the kernel has already
        // dropped its last reference and has no use for an error here.
        let _ = self.call(Payload::CloseFile { file_handle: fh });
        Ok(())
    }

    fn mkdir(&self, _req: RequestInfo, parent: &Path, name: &OsStr, mode: u32) -> ResultEntry {
        let path = Self::joined(parent, name);
        let (_payload, ok) = self.call(Payload::CreateDirectory {
            path: path.clone(),
            mode,
        });
        if !ok {
            return Err(libc::EIO);
        }
        Ok((
            DEFAULT_TTL,
            FileAttr {
                kind: FileType::Directory,
                perm: 0o777,
                ..zero_attr()
            },
        ))
    }

    fn mknod(
        &self,
        _req: RequestInfo,
        parent: &Path,
        name: &OsStr,
        mode: u32,
        _rdev: u32,
    ) -> ResultEntry {
        // Filebox only models regular-file creation; device/special nodes
        // are rejected rather than silently accepted.
        if mode & libc::S_IFMT != libc::S_IFREG {
            return Err(libc::EINVAL);
        }
        let path = Self::joined(parent, name);
        let (_payload, ok) = self.call(Payload::CreateFile { path });
        if !ok {
            return Err(libc::EIO);
        }
        Ok((
            DEFAULT_TTL,
            FileAttr {
                kind: FileType::RegularFile,
                perm: 0o777,
                ..zero_attr()
            },
        ))
    }

    fn create(
        &self,
        _req: RequestInfo,
        _parent: &Path,
        _name: &OsStr,
        _mode: u32,
        _flags: u32,
    ) -> ResultCreate {
        // Not part of the supported upcall surface: the client always goes
        // through mknod-then-open. Inherits ENOSYS.
        Err(libc::ENOSYS)
    }

    fn unlink(&self, _req: RequestInfo, parent: &Path, name: &OsStr) -> ResultEmpty {
        let path = Self::joined(parent, name);
        let (_payload, ok) = self.call(Payload::DeleteFile { path });
        if ok { Ok(()) } else { Err(libc::EIO) }
    }

    fn rmdir(&self, _req: RequestInfo, parent: &Path, name: &OsStr) -> ResultEmpty {
        let path = Self::joined(parent, name);
        let (_payload, ok) = self.call(Payload::DeleteDirectory { path });
        if ok { Ok(()) } else { Err(libc::EIO) }
    }

    fn rename(
        &self,
        _req: RequestInfo,
        parent: &Path,
        name: &OsStr,
        newparent: &Path,
        newname: &OsStr,
    ) -> ResultEmpty {
        let old_path = Self::joined(parent, name);
        let new_path = Self::joined(newparent, newname);
        let (_payload, ok) = self.call(Payload::Rename { old_path, new_path });
        // Surface a failed rename as -EIO instead of masking it as success.
        if ok { Ok(()) } else { Err(libc::EIO) }
    }
}

fn zero_attr() -> FileAttr {
    FileAttr {
        size: 0,
        blocks: 0,
        atime: std::time::UNIX_EPOCH,
        mtime: std::time::UNIX_EPOCH,
        ctime: std::time::UNIX_EPOCH,
        crtime: std::time::UNIX_EPOCH,
        kind: FileType::RegularFile,
        perm: 0o777,
        nlink: 1,
        uid: 0,
        gid: 0,
        rdev: 0,
        flags: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn req() -> RequestInfo {
        RequestInfo {
            unique: 0,
            uid: 0,
            gid: 0,
            pid: 0,
        }
    }

    async fn start_server() -> (tempfile::TempDir, std::net::SocketAddr) {
        let dir = tempfile::tempdir().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let base = dir.path().to_path_buf();
        tokio::spawn(async move {
            let _ = server::serve(listener, base).await;
        });
        (dir, addr)
    }

    #[tokio::test]
    async fn readdir_synthesizes_dot_and_dotdot_first() {
        let (dir, addr) = start_server().await;
        std::fs::write(dir.path().join("a.txt"), b"hi").unwrap();

        let (client, _exit) = Client::connect(addr).await.unwrap();
        let fs = FileboxFs::new(client, Handle::current());

        let entries = tokio::task::spawn_blocking(move || fs.readdir(req(), Path::new("/"), 0))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(entries[0].name, ".");
        assert_eq!(entries[1].name, "..");
        assert!(entries.iter().any(|e| e.name == "a.txt"));
    }

    #[tokio::test]
    async fn open_missing_file_maps_to_enoent() {
        let (_dir, addr) = start_server().await;
        let (client, _exit) = Client::connect(addr).await.unwrap();
        let fs = FileboxFs::new(client, Handle::current());

        let result = tokio::task::spawn_blocking(move || {
            fs.open(req(), Path::new("/missing"), libc::O_RDONLY as u32)
        })
        .await
        .unwrap();

        assert_eq!(result, Err(libc::ENOENT));
    }

    #[tokio::test]
    async fn rename_failure_surfaces_as_eio_not_success() {
        let (_dir, addr) = start_server().await;
        let (client, _exit) = Client::connect(addr).await.unwrap();
        let fs = FileboxFs::new(client, Handle::current());

        let result = tokio::task::spawn_blocking(move || {
            fs.rename(
                req(),
                Path::new("/"),
                OsStr::new("missing.txt"),
                Path::new("/"),
                OsStr::new("also-missing.txt"),
            )
        })
        .await
        .unwrap();

        assert_eq!(result, Err(libc::EIO));
    }

    #[tokio::test]
    async fn mknod_rejects_non_regular_file_types() {
        let (_dir, addr) = start_server().await;
        let (client, _exit) = Client::connect(addr).await.unwrap();
        let fs = FileboxFs::new(client, Handle::current());

        let result = tokio::task::spawn_blocking(move || {
            fs.mknod(req(), Path::new("/"), OsStr::new("fifo"), libc::S_IFIFO, 0)
        })
        .await
        .unwrap();

        assert_eq!(result, Err(libc::EINVAL));
    }

    #[tokio::test]
    async fn mknod_accepts_regular_file_type() {
        let (_dir, addr) = start_server().await;
        let (client, _exit) = Client::connect(addr).await.unwrap();
        let fs = FileboxFs::new(client, Handle::current());

        let result = tokio::task::spawn_blocking(move || {
            fs.mknod(req(), Path::new("/"), OsStr::new("new.bin"), libc::S_IFREG | 0o644, 0)
        })
        .await
        .unwrap();

        assert!(result.is_ok());
    }
}
