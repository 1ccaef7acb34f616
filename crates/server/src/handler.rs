//! Stateless per-call logic: validates nothing beyond what the OS syscalls
//! themselves reject, joins every path to the exported base path, and
//! performs the requested local filesystem operation.
//!
//! Every handler here is idempotent at the level of the underlying OS
//! semantics; there is no server-side journaling or retry logic.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::fs::{FileExt, MetadataExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use handles::Registry;
use protocol::{FileInfo, S_IFDIR, S_IFREG};

/// The exclusive-create bit is deliberately stripped server-side (see
/// `DESIGN.md`) — callers should be aware this breaks `O_EXCL` semantics
/// for reopen-on-create patterns.
const O_EXCL_MASK: i32 = !libc::O_EXCL;

/// No-sandbox by design: a client path containing `..` is joined verbatim to
/// `base_path` without containment checking, matching both the original
/// design and the still-flagged open question about path escaping.
pub struct Handler {
    base_path: PathBuf,
    registry: Registry,
}

impl Handler {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Handler {
            base_path: base_path.into(),
            registry: Registry::new(),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.base_path.join(path.trim_start_matches('/'))
    }

    pub fn open_file(&self, path: &str, flags: i32) -> io::Result<u64> {
        let full = self.resolve(path);
        let file = OpenOptions::new()
            .custom_flags(flags & O_EXCL_MASK)
            .read(true)
            .write(flags & (libc::O_WRONLY | libc::O_RDWR) != 0)
            .mode(0o777)
            .open(&full)?;
        Ok(self.registry.insert(file))
    }

    pub fn read_file(&self, handle: u64, offset: i64, size: i32) -> io::Result<(Vec<u8>, i32)> {
        let mut buf = vec![0u8; size.max(0) as usize];
        let n = self
            .registry
            .with(handle, |file| file.read_at(&mut buf, offset.max(0) as u64))
            .ok_or_else(handle_not_found)??;
        buf.truncate(n);
        Ok((buf, n as i32))
    }

    pub fn write_file(&self, handle: u64, offset: i64, data: &[u8]) -> io::Result<i32> {
        let n = self
            .registry
            .with(handle, |file| file.write_at(data, offset.max(0) as u64))
            .ok_or_else(handle_not_found)??;
        Ok(n as i32)
    }

    pub fn read_directory(&self, path: &str) -> io::Result<Vec<FileInfo>> {
        let full = self.resolve(path);
        let mut out = Vec::new();
        for entry in fs::read_dir(full)? {
            let entry = entry?;
            let meta = entry.metadata()?;
            out.push(FileInfo {
                name: entry.file_name().to_string_lossy().into_owned(),
                size: meta.len() as i64,
                mode: mode_bits(&meta),
                modification_time: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                is_directory: meta.is_dir(),
            });
        }
        Ok(out)
    }

    pub fn get_file_attributes(&self, path: &str, handle: u64) -> io::Result<FileInfo> {
        if self.registry.plausible(handle) {
            if let Some(result) = self.registry.with(handle, |file| file.metadata()) {
                return result.map(|meta| metadata_to_info(&full_name(&self.resolve(path)), &meta));
            }
        }
        let full = self.resolve(path);
        let meta = fs::metadata(&full)?;
        Ok(metadata_to_info(&full_name(&full), &meta))
    }

    pub fn create_file(&self, path: &str) -> io::Result<()> {
        let full = self.resolve(path);
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o666)
            .open(full)?;
        Ok(())
    }

    pub fn create_directory(&self, path: &str, mode: u32) -> io::Result<()> {
        let full = self.resolve(path);
        fs::create_dir(&full)?;
        fs::set_permissions(full, fs::Permissions::from_mode(mode))
    }

    pub fn delete_file(&self, path: &str) -> io::Result<()> {
        fs::remove_file(self.resolve(path))
    }

    pub fn delete_directory(&self, path: &str) -> io::Result<()> {
        fs::remove_dir_all(self.resolve(path))
    }

    pub fn rename(&self, old_path: &str, new_path: &str) -> io::Result<()> {
        fs::rename(self.resolve(old_path), self.resolve(new_path))
    }

    pub fn truncate(&self, path: &str, handle: u64, size: i64) -> io::Result<()> {
        if self.registry.plausible(handle) {
            if let Some(result) = self.registry.with(handle, |file| file.set_len(size.max(0) as u64)) {
                return result;
            }
        }
        let file = File::options().write(true).open(self.resolve(path))?;
        file.set_len(size.max(0) as u64)
    }

    pub fn close_file(&self, handle: u64) -> io::Result<()> {
        if self.registry.close(handle) {
            Ok(())
        } else {
            Err(handle_not_found())
        }
    }
}

fn handle_not_found() -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, "no open file for handle")
}

fn full_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn mode_bits(meta: &fs::Metadata) -> u32 {
    let type_bit = if meta.is_dir() { S_IFDIR } else if meta.is_file() { S_IFREG } else { 0 };
    (meta.mode() & 0o7777) | type_bit
}

fn metadata_to_info(name: &str, meta: &fs::Metadata) -> FileInfo {
    FileInfo {
        name: name.to_string(),
        size: meta.len() as i64,
        mode: mode_bits(meta),
        modification_time: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        is_directory: meta.is_dir(),
    }
}
