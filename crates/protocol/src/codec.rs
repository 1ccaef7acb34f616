use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::message::Message;

/// Anything that goes wrong decoding or encoding a [`Message`] is, per the
/// design, terminal for the connection — there is no partial-message
/// recovery.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("i/o error on connection: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed message: {0}")]
    Encoding(#[from] Box<bincode::ErrorKind>),

    #[error("message of {0} bytes exceeds the {MAX_MESSAGE_LEN} byte frame limit")]
    FrameTooLarge(usize),
}

/// Upper bound on a single encoded message. `WriteFile`/`ReadFile` payloads
/// are bounded by the kernel's own upcall buffer sizes in practice, so this
/// exists only to keep a corrupt length prefix from causing an unbounded
/// allocation.
const MAX_MESSAGE_LEN: usize = 64 * 1024 * 1024;

const LENGTH_PREFIX_BYTES: usize = 4;

/// Frames [`Message`] values onto a byte stream as `u32` big-endian
/// length-prefixed `bincode` records — a self-describing tagged encoding, as
/// required by the wire format: the payload's enum discriminant identifies
/// the variant and the length prefix delimits one message from the next on
/// the shared stream.
#[derive(Debug, Default)]
pub struct MessageCodec {
    next_len: Option<usize>,
}

impl MessageCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, CodecError> {
        let len = match self.next_len {
            Some(len) => len,
            None => {
                if src.len() < LENGTH_PREFIX_BYTES {
                    return Ok(None);
                }
                let len = u32::from_be_bytes(src[..LENGTH_PREFIX_BYTES].try_into().unwrap())
                    as usize;
                if len > MAX_MESSAGE_LEN {
                    return Err(CodecError::FrameTooLarge(len));
                }
                src.advance(LENGTH_PREFIX_BYTES);
                self.next_len = Some(len);
                len
            }
        };

        if src.len() < len {
            src.reserve(len - src.len());
            return Ok(None);
        }

        let frame = src.split_to(len);
        self.next_len = None;
        let message = bincode::deserialize(&frame)?;
        Ok(Some(message))
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = CodecError;

    fn encode(&mut self, message: Message, dst: &mut BytesMut) -> Result<(), CodecError> {
        let encoded = bincode::serialize(&message)?;
        if encoded.len() > MAX_MESSAGE_LEN {
            return Err(CodecError::FrameTooLarge(encoded.len()));
        }
        dst.reserve(LENGTH_PREFIX_BYTES + encoded.len());
        dst.put_u32(encoded.len() as u32);
        dst.extend_from_slice(&encoded);
        Ok(())
    }
}
