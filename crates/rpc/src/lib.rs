#![deny(unsafe_code)]

//! # Overview
//!
//! Client-side RPC multiplexer. Owns one TCP connection, assigns
//! correlation ids, and lets many concurrent callers share the connection:
//! each call gets its own single-shot rendezvous slot and blocks only on its
//! own response (or a 3-second timeout), never on anyone else's.
//!
//! # Design
//!
//! A single reader task loops over the framed connection, decoding one
//! [`protocol::Message`] at a time and handing it to whichever pending call
//! is waiting on that `message_id`. Writes are serialized through a
//! [`tokio::sync::Mutex`] around the sink half. If the reader ever observes
//! a decode error or a clean EOF, it closes a [`tokio::sync::broadcast`]
//! "exit" channel once; every other component (notably the VFS adapter's
//! mount watcher) holds a receiver and treats that as fatal.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt, stream::SplitSink, stream::SplitStream};
use protocol::{Connection, Message, Payload};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::{Mutex, broadcast, oneshot};

/// Hard wall-clock timeout imposed on every RPC.
pub const CALL_TIMEOUT: Duration = Duration::from_secs(3);

type PendingMap = DashMap<u32, oneshot::Sender<(Payload, bool)>>;

/// A connected RPC client multiplexing many concurrent callers over one
/// socket.
pub struct Client {
    writer: Mutex<SplitSink<Connection, Message>>,
    next_id: AtomicU32,
    pending: Arc<PendingMap>,
    exit: broadcast::Sender<()>,
}

impl Client {
    /// Dial `addr` and start the background reader task.
    ///
    /// Returns the client together with a receiver on the exit-broadcast
    /// channel; the embedding binary should hold onto it and unmount (or
    /// otherwise shut down) when it fires.
    pub async fn connect(addr: impl ToSocketAddrs) -> std::io::Result<(Arc<Client>, broadcast::Receiver<()>)> {
        let stream = TcpStream::connect(addr).await?;
        let connection = protocol::frame(stream);
        let (writer, reader) = connection.split();
        let (exit_tx, exit_rx) = broadcast::channel(1);

        let client = Arc::new(Client {
            writer: Mutex::new(writer),
            next_id: AtomicU32::new(1),
            pending: Arc::new(DashMap::new()),
            exit: exit_tx,
        });

        tokio::spawn(run_reader(reader, client.pending.clone(), client.exit.clone()));

        Ok((client, exit_rx))
    }

    /// Send `payload` as a new request and wait for its response.
    ///
    /// Mirrors the upcall-facing `send_receive` contract exactly: this never
    /// returns an `Err`. A transport failure, a decode failure on the
    /// reader, or the 3-second call timeout all surface identically as
    /// `ok = false` with an empty payload — the caller (the VFS adapter)
    /// maps that to the errno its specific upcall requires.
    pub async fn call(&self, payload: Payload) -> (Payload, bool) {
        let message_id = self.next_id.fetch_add(1, Ordering::SeqCst);

        let (tx, rx) = oneshot::channel();
        self.pending.insert(message_id, tx);

        {
            let mut writer = self.writer.lock().await;
            if let Err(err) = writer.send(Message::request(message_id, payload)).await {
                tracing::error!(message_id, %err, "failed to write request");
                self.pending.remove(&message_id);
                return (Payload::Empty, false);
            }
        }

        match tokio::time::timeout(CALL_TIMEOUT, rx).await {
            Ok(Ok((payload, success))) => (payload, success),
            Ok(Err(_canceled)) => {
                // The reader dropped the sender without ever delivering a
                // response — only happens if the connection died mid-call.
                (Payload::Empty, false)
            }
            Err(_elapsed) => {
                self.pending.remove(&message_id);
                tracing::warn!(message_id, "rpc call timed out after {:?}", CALL_TIMEOUT);
                (Payload::Empty, false)
            }
        }
    }
}

async fn run_reader(
    mut reader: SplitStream<Connection>,
    pending: Arc<PendingMap>,
    exit: broadcast::Sender<()>,
) {
    loop {
        match reader.next().await {
            Some(Ok(message)) => dispatch(&pending, message),
            Some(Err(err)) => {
                tracing::error!(%err, "connection decode error; shutting down");
                let _ = exit.send(());
                return;
            }
            None => {
                tracing::warn!("server closed the connection");
                let _ = exit.send(());
                return;
            }
        }
    }
}

fn dispatch(pending: &PendingMap, message: Message) {
    if !message.is_response {
        tracing::warn!(
            message_id = message.message_id,
            "received a request-shaped message from the server; protocol violation, ignoring"
        );
        return;
    }

    match pending.remove(&message.message_id) {
        Some((_, sender)) => {
            // A dropped receiver means the call already timed out; the
            // late response is discarded exactly as the design specifies.
            let _ = sender.send((message.payload, message.success));
        }
        None => {
            tracing::warn!(
                message_id = message.message_id,
                "no pending call for this message id; dropping duplicate or late response"
            );
        }
    }
}
