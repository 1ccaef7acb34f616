//! Per-connection dispatch loop.
//!
//! One task per accepted connection decodes messages serially; each decoded
//! message is handed to its own worker task so handlers run concurrently,
//! with responses serialized back through a single write-locked encoder.

use std::io;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use protocol::{Message, Payload};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::handler::Handler;

/// Run the per-connection loop until EOF or a transport error. A handler
/// error never ends the connection — only this function's own `Err` return
/// (a decode/encode failure) does.
pub async fn handle_connection(stream: TcpStream, handler: Arc<Handler>) -> io::Result<()> {
    let connection = protocol::frame(stream);
    let (writer, mut reader) = connection.split();
    let writer = Arc::new(Mutex::new(writer));

    loop {
        match reader.next().await {
            Some(Ok(message)) => {
                let handler = handler.clone();
                let writer = writer.clone();
                tokio::spawn(async move {
                    let response = dispatch(handler, message.message_id, message.payload).await;
                    let mut writer = writer.lock().await;
                    if let Err(err) = writer.send(response).await {
                        tracing::error!(%err, "failed to write response; connection likely already gone");
                    }
                });
            }
            Some(Err(err)) => {
                tracing::error!(%err, "decode error on connection; closing");
                return Err(io::Error::new(io::ErrorKind::InvalidData, err));
            }
            None => return Ok(()),
        }
    }
}

/// Dispatch on payload variant, run the matching handler method on a
/// blocking thread (these are synchronous filesystem syscalls), and build
/// the response envelope.
async fn dispatch(handler: Arc<Handler>, message_id: u32, payload: Payload) -> Message {
    let result: io::Result<Payload> = tokio::task::spawn_blocking(move || run(&handler, payload))
        .await
        .unwrap_or_else(|join_err| Err(io::Error::other(join_err)));

    match result {
        Ok(payload) => Message::response_ok(message_id, payload),
        Err(err) => {
            tracing::debug!(message_id, %err, "handler returned an error");
            Message::response_err(message_id)
        }
    }
}

fn run(handler: &Handler, payload: Payload) -> io::Result<Payload> {
    match payload {
        Payload::OpenFile { path, flags } => {
            let file_handle = handler.open_file(&path, flags)?;
            Ok(Payload::OpenFileResp { file_handle })
        }
        Payload::ReadFile {
            file_handle,
            offset,
            size,
        } => {
            let (data, bytes_read) = handler.read_file(file_handle, offset, size)?;
            Ok(Payload::ReadFileResp { data, bytes_read })
        }
        Payload::WriteFile {
            file_handle,
            offset,
            data,
        } => {
            let bytes_written = handler.write_file(file_handle, offset, &data)?;
            Ok(Payload::WriteFileResp { bytes_written })
        }
        Payload::ReadDirectory { path } => {
            let files = handler.read_directory(&path)?;
            Ok(Payload::ReadDirectoryResp { files })
        }
        Payload::GetFileAttributes { path, file_handle } => {
            let file_info = handler.get_file_attributes(&path, file_handle)?;
            Ok(Payload::GetFileAttributesResp { file_info })
        }
        Payload::CreateFile { path } => {
            handler.create_file(&path)?;
            Ok(Payload::Empty)
        }
        Payload::CreateDirectory { path, mode } => {
            handler.create_directory(&path, mode)?;
            Ok(Payload::Empty)
        }
        Payload::DeleteFile { path } => {
            handler.delete_file(&path)?;
            Ok(Payload::Empty)
        }
        Payload::DeleteDirectory { path } => {
            handler.delete_directory(&path)?;
            Ok(Payload::Empty)
        }
        Payload::Rename { old_path, new_path } => {
            handler.rename(&old_path, &new_path)?;
            Ok(Payload::Empty)
        }
        Payload::Truncate {
            path,
            file_handle,
            size,
        } => {
            handler.truncate(&path, file_handle, size)?;
            Ok(Payload::Empty)
        }
        Payload::CloseFile { file_handle } => {
            handler.close_file(file_handle)?;
            Ok(Payload::Empty)
        }
        // Response variants and Empty never arrive as requests from a
        // well-behaved client; treat them as a protocol violation.
        other => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("unexpected request payload: {other:?}"),
        )),
    }
}
