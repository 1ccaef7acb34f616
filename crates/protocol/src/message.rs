use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// Bit set in [`FileInfo::mode`] when the entry is a regular file.
pub const S_IFREG: u32 = 0o100_000;
/// Bit set in [`FileInfo::mode`] when the entry is a directory.
pub const S_IFDIR: u32 = 0o040_000;

/// A uniform envelope wrapping every request and response exchanged between
/// the Filebox client and server.
///
/// `message_id` is assigned by the originator of a request and echoed back
/// verbatim on the matching response; it is the only thing that binds a
/// response to its request; requests on the same connection may complete out
/// of order. `success` is only meaningful when `is_response` is `true` — on
/// `false` the payload is [`Payload::Empty`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub message_id: u32,
    pub is_response: bool,
    pub success: bool,
    pub payload: Payload,
}

impl Message {
    /// Build the request half of an envelope. `success` is meaningless on a
    /// request and is fixed at `false` here purely so the field doesn't need
    /// an `Option`.
    pub fn request(message_id: u32, payload: Payload) -> Self {
        Message {
            message_id,
            is_response: false,
            success: false,
            payload,
        }
    }

    /// Build a successful response echoing `message_id`.
    pub fn response_ok(message_id: u32, payload: Payload) -> Self {
        Message {
            message_id,
            is_response: true,
            success: true,
            payload,
        }
    }

    /// Build a failed response. The payload carries no error detail —
    /// callers see only that the call failed.
    pub fn response_err(message_id: u32) -> Self {
        Message {
            message_id,
            is_response: true,
            success: false,
            payload: Payload::Empty,
        }
    }
}

/// Attributes of one directory entry or `stat`-able path, as reported by the
/// server's local filesystem.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileInfo {
    /// Base name of the entry (not a full path).
    pub name: String,
    /// Length in bytes for regular files; filesystem-dependent otherwise.
    pub size: i64,
    /// Raw POSIX file-mode bits, including the type bits.
    pub mode: u32,
    pub modification_time: SystemTime,
    pub is_directory: bool,
}

impl FileInfo {
    /// True if [`Self::mode`] carries the regular-file type bit.
    pub fn is_regular_file(&self) -> bool {
        self.mode & S_IFREG != 0
    }

    /// True if [`Self::mode`] carries the directory type bit.
    ///
    /// Kept alongside the explicit [`Self::is_directory`] flag because the
    /// wire format carries both independently (spec: `is_directory` is an
    /// "abbreviation" computed server-side, `mode`'s type bits are derived
    /// client-side from it) — they are expected to always agree.
    pub fn is_dir_bit_set(&self) -> bool {
        self.mode & S_IFDIR != 0
    }
}

/// The closed catalogue of request and response payloads. Every variant here
/// is part of the wire protocol; adding or removing one is a breaking
/// protocol change for both ends simultaneously, since a Rust enum's variant
/// set *is* the schema registration (unlike the original Go implementation's
/// runtime `gob.Register` calls).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Payload {
    OpenFile {
        path: String,
        flags: i32,
    },
    OpenFileResp {
        file_handle: u64,
    },

    ReadFile {
        file_handle: u64,
        offset: i64,
        size: i32,
    },
    ReadFileResp {
        data: Vec<u8>,
        bytes_read: i32,
    },

    WriteFile {
        file_handle: u64,
        offset: i64,
        data: Vec<u8>,
    },
    WriteFileResp {
        bytes_written: i32,
    },

    ReadDirectory {
        path: String,
    },
    ReadDirectoryResp {
        files: Vec<FileInfo>,
    },

    GetFileAttributes {
        path: String,
        file_handle: u64,
    },
    GetFileAttributesResp {
        file_info: FileInfo,
    },

    CreateFile {
        path: String,
    },
    CreateDirectory {
        path: String,
        mode: u32,
    },
    DeleteFile {
        path: String,
    },
    DeleteDirectory {
        path: String,
    },
    Rename {
        old_path: String,
        new_path: String,
    },
    Truncate {
        path: String,
        file_handle: u64,
        size: i64,
    },
    CloseFile {
        file_handle: u64,
    },

    /// Sentinel returned by operations that carry no data on success.
    Empty,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_has_success_false_and_response_false() {
        let m = Message::request(7, Payload::CloseFile { file_handle: 3 });
        assert_eq!(m.message_id, 7);
        assert!(!m.is_response);
        assert!(!m.success);
    }

    #[test]
    fn response_err_carries_empty_payload() {
        let m = Message::response_err(9);
        assert!(m.is_response);
        assert!(!m.success);
        assert_eq!(m.payload, Payload::Empty);
    }

    #[test]
    fn file_info_mode_predicates() {
        let mut fi = FileInfo {
            name: "a.txt".into(),
            size: 13,
            mode: 0o777 | S_IFREG,
            modification_time: SystemTime::UNIX_EPOCH,
            is_directory: false,
        };
        assert!(fi.is_regular_file());
        assert!(!fi.is_dir_bit_set());

        fi.mode = 0o777 | S_IFDIR;
        assert!(!fi.is_regular_file());
        assert!(fi.is_dir_bit_set());
    }
}
