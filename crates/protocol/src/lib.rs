#![deny(unsafe_code)]

//! # Overview
//!
//! Wire codec and message catalogue shared by the Filebox client and server.
//! This crate has no knowledge of sockets beyond framing: [`codec::MessageCodec`]
//! turns a byte stream into a `Stream + Sink` of [`message::Message`] values via
//! [`tokio_util::codec::Framed`], and the `rpc`/`server` crates build the
//! request/response machinery on top.
//!
//! # Design
//!
//! [`message::Message`] is the uniform envelope (correlation id, response
//! flag, success flag) around the closed [`message::Payload`] catalogue.
//! Every request/response pair named in the system's wire protocol is a
//! variant of that one enum, so the two ends of a connection share their
//! schema simply by linking the same crate — no runtime registration step is
//! needed, unlike the original Go implementation's `gob.Register` calls.

pub mod codec;
pub mod message;

pub use codec::{CodecError, MessageCodec};
pub use message::{FileInfo, Message, Payload, S_IFDIR, S_IFREG};

use tokio::net::TcpStream;
use tokio_util::codec::Framed;

/// A `Message`-level framed connection over a raw `TcpStream`.
pub type Connection = Framed<TcpStream, MessageCodec>;

/// Wrap a freshly accepted or dialed `TcpStream` in the Filebox framing.
pub fn frame(stream: TcpStream) -> Connection {
    Framed::new(stream, MessageCodec::new())
}
