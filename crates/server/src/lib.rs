#![deny(unsafe_code)]

//! # Overview
//!
//! The server half of Filebox: accept connections, decode requests,
//! dispatch them against the exported directory, and write back responses.
//!
//! The handle registry (see [`handles::Registry`], re-exported through
//! [`Handler::registry`]) is intentionally **process-scoped, not
//! connection-scoped** — one [`Handler`] is shared across every accepted
//! connection via `Arc`, including its known weakness: a client can in
//! principle guess another client's handle id. See `DESIGN.md` for why
//! this is flagged rather than silently changed to a safer
//! per-connection scheme.

pub mod connection;
pub mod handler;

pub use connection::handle_connection;
pub use handler::Handler;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::TcpListener;

/// Accept connections forever, dispatching each to its own task. Returns
/// only on a listener-level I/O error (e.g. the socket itself failing);
/// individual connection errors are logged and otherwise swallowed so one
/// bad client can't take down the server.
pub async fn serve(listener: TcpListener, base_path: impl Into<PathBuf>) -> std::io::Result<()> {
    let handler = Arc::new(Handler::new(base_path));

    loop {
        let (stream, peer) = listener.accept().await?;
        let handler = handler.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_connection(stream, handler).await {
                tracing::warn!(%peer, %err, "connection closed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::Payload;
    use rpc::Client;
    use tokio::net::TcpListener;

    async fn start_server() -> (tempfile::TempDir, std::net::SocketAddr) {
        let dir = tempfile::tempdir().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let base = dir.path().to_path_buf();
        tokio::spawn(async move {
            let _ = serve(listener, base).await;
        });
        (dir, addr)
    }

    #[tokio::test]
    async fn readdir_end_to_end() {
        let (dir, addr) = start_server().await;
        std::fs::write(dir.path().join("a.txt"), b"0123456789012").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let (client, _exit) = Client::connect(addr).await.unwrap();
        let (payload, ok) = client.call(Payload::ReadDirectory { path: "/".into() }).await;
        assert!(ok);
        let mut files = match payload {
            Payload::ReadDirectoryResp { files } => files,
            other => panic!("unexpected payload: {other:?}"),
        };
        files.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].name, "a.txt");
        assert_eq!(files[0].size, 13);
        assert_eq!(files[1].name, "sub");
        assert!(files[1].is_directory);
    }

    #[tokio::test]
    async fn open_write_release_reopen_read_round_trip() {
        let (_dir, addr) = start_server().await;
        let (client, _exit) = Client::connect(addr).await.unwrap();

        let (_payload, ok) = client.call(Payload::CreateFile { path: "/new.bin".into() }).await;
        assert!(ok);

        let (payload, ok) = client
            .call(Payload::OpenFile { path: "/new.bin".into(), flags: libc::O_WRONLY })
            .await;
        assert!(ok);
        let write_handle = match payload {
            Payload::OpenFileResp { file_handle } => file_handle,
            other => panic!("unexpected payload: {other:?}"),
        };

        let (payload, ok) = client
            .call(Payload::WriteFile { file_handle: write_handle, offset: 0, data: b"hello".to_vec() })
            .await;
        assert!(ok);
        assert_eq!(payload, Payload::WriteFileResp { bytes_written: 5 });

        client.call(Payload::CloseFile { file_handle: write_handle }).await;

        let (payload, ok) = client
            .call(Payload::OpenFile { path: "/new.bin".into(), flags: libc::O_RDONLY })
            .await;
        assert!(ok);
        let read_handle = match payload {
            Payload::OpenFileResp { file_handle } => file_handle,
            other => panic!("unexpected payload: {other:?}"),
        };

        let (payload, ok) = client
            .call(Payload::ReadFile { file_handle: read_handle, offset: 0, size: 5 })
            .await;
        assert!(ok);
        assert_eq!(payload, Payload::ReadFileResp { data: b"hello".to_vec(), bytes_read: 5 });
    }

    #[tokio::test]
    async fn getattr_via_all_ones_sentinel_routes_to_path_branch() {
        let (dir, addr) = start_server().await;
        std::fs::write(dir.path().join("a.txt"), b"abcd").unwrap();
        let (client, _exit) = Client::connect(addr).await.unwrap();

        let (payload, ok) = client
            .call(Payload::GetFileAttributes { path: "/a.txt".into(), file_handle: u64::MAX })
            .await;
        assert!(ok);
        match payload {
            Payload::GetFileAttributesResp { file_info } => assert_eq!(file_info.size, 4),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[tokio::test]
    async fn rename_end_to_end_moves_the_entry() {
        let (dir, addr) = start_server().await;
        std::fs::write(dir.path().join("a.txt"), b"x").unwrap();
        let (client, _exit) = Client::connect(addr).await.unwrap();

        let (_payload, ok) = client
            .call(Payload::Rename { old_path: "/a.txt".into(), new_path: "/b.txt".into() })
            .await;
        assert!(ok);

        let (payload, ok) = client.call(Payload::ReadDirectory { path: "/".into() }).await;
        assert!(ok);
        match payload {
            Payload::ReadDirectoryResp { files } => {
                assert!(files.iter().any(|f| f.name == "b.txt"));
                assert!(!files.iter().any(|f| f.name == "a.txt"));
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[tokio::test]
    async fn truncate_via_path_end_to_end_then_getattr_reflects_it() {
        let (dir, addr) = start_server().await;
        std::fs::write(dir.path().join("a.txt"), b"0123456789").unwrap();
        let (client, _exit) = Client::connect(addr).await.unwrap();

        let (_payload, ok) = client
            .call(Payload::Truncate { path: "/a.txt".into(), file_handle: u64::MAX, size: 4 })
            .await;
        assert!(ok);

        let (payload, ok) = client
            .call(Payload::GetFileAttributes { path: "/a.txt".into(), file_handle: u64::MAX })
            .await;
        assert!(ok);
        match payload {
            Payload::GetFileAttributesResp { file_info } => assert_eq!(file_info.size, 4),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[tokio::test]
    async fn concurrent_readdirs_all_return_the_same_entries() {
        let (dir, addr) = start_server().await;
        std::fs::write(dir.path().join("a.txt"), b"x").unwrap();
        let (client, _exit) = Client::connect(addr).await.unwrap();
        let client = std::sync::Arc::new(client);

        let mut handles = Vec::new();
        for _ in 0..100 {
            let client = client.clone();
            handles.push(tokio::spawn(async move {
                client.call(Payload::ReadDirectory { path: "/".into() }).await
            }));
        }

        for handle in handles {
            let (payload, ok) = handle.await.unwrap();
            assert!(ok);
            match payload {
                Payload::ReadDirectoryResp { files } => assert_eq!(files.len(), 1),
                other => panic!("unexpected payload: {other:?}"),
            }
        }
    }
}
