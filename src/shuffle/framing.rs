//! Length-prefixed message framing.
//!
//! # Stream Format
//!
//! ```text
//! [uvarint: len][len bytes: encoded message] ... [0x00 padding] ...
//! ```
//!
//! - A length of `1` stands for an empty message. No codec produces a
//!   one-byte encoding of a real message, so the value is free.
//! - A length of `0` is padding. Zero bytes only appear between messages,
//!   and when the reader knows the block size it skips straight to the next
//!   block boundary on the first zero it sees.
//!
//! Writing frames through an [`ExclusiveFile`](crate::record::ExclusiveFile)
//! produces exactly this layout: every frame is one padded append.

use super::codec::{DefaultCodec, MessageCodec};
use super::error::ShuffleError;
use crate::utils::varint::{put_uvarint, read_uvarint};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::marker::PhantomData;
use std::path::Path;
use tracing::trace;

/// Largest message body a reader accepts by default (256 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 256 * 1024 * 1024;

/// Length value reserved for the empty message.
const EMPTY_MESSAGE_LEN: u64 = 1;

/// A pull-based stream of messages.
///
/// `Ok(None)` marks the clean end of the stream and is never an error.
pub trait MessageSource<M> {
    /// Return the next message, or `Ok(None)` once the stream is exhausted.
    ///
    /// # Errors
    ///
    /// Returns any transport or decode error.
    fn recv(&mut self) -> Result<Option<M>, ShuffleError>;

    /// Release the source's resources.
    ///
    /// # Errors
    ///
    /// Returns the underlying close error, if any.
    fn close(&mut self) -> Result<(), ShuffleError> {
        Ok(())
    }
}

impl<M, S: MessageSource<M> + ?Sized> MessageSource<M> for Box<S> {
    fn recv(&mut self) -> Result<Option<M>, ShuffleError> {
        (**self).recv()
    }

    fn close(&mut self) -> Result<(), ShuffleError> {
        (**self).close()
    }
}

// ─── Writer ─────────────────────────────────────────────────────────────────

/// Writes length-prefixed messages to any [`Write`].
///
/// Each frame is handed to the writer in a single `write_all` call, so a
/// block-aligned log underneath keeps whole frames inside one block.
#[derive(Debug)]
pub struct MessageWriter<W: Write, C: MessageCodec = DefaultCodec> {
    inner: W,
    codec: C,
    frame: Vec<u8>,
    sent: u64,
}

impl<W: Write, C: MessageCodec> MessageWriter<W, C> {
    /// Frame messages into `inner` using `codec`.
    pub fn new(inner: W, codec: C) -> Self {
        Self {
            inner,
            codec,
            frame: Vec::new(),
            sent: 0,
        }
    }

    /// Encode and write one message.
    ///
    /// # Errors
    ///
    /// Returns [`ShuffleError::Serialization`] if the message cannot be
    /// encoded, or encodes to a single byte that would read back as the
    /// empty message. Write failures are returned as I/O or record errors.
    pub fn send<M: Serialize>(&mut self, message: &M) -> Result<(), ShuffleError> {
        let body = self.codec.encode(message)?;
        self.frame.clear();
        match body.len() {
            0 => put_uvarint(&mut self.frame, EMPTY_MESSAGE_LEN),
            1 => {
                return Err(ShuffleError::Serialization {
                    message: "one-byte encoding collides with the empty-message marker"
                        .to_string(),
                });
            }
            len => {
                put_uvarint(&mut self.frame, len as u64);
                self.frame.extend_from_slice(&body);
            }
        }
        self.inner.write_all(&self.frame)?;
        self.sent += 1;
        Ok(())
    }

    /// Number of messages written so far.
    #[must_use]
    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Flush the underlying writer.
    ///
    /// # Errors
    ///
    /// Returns the underlying flush error.
    pub fn flush(&mut self) -> Result<(), ShuffleError> {
        self.inner.flush()?;
        Ok(())
    }

    /// Borrow the underlying writer.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Mutably borrow the underlying writer.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Unwrap the underlying writer without flushing it.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

// ─── Reader ─────────────────────────────────────────────────────────────────

/// Reads length-prefixed messages from any [`Read`].
pub struct MessageReader<R: Read, M, C: MessageCodec = DefaultCodec> {
    inner: BufReader<R>,
    codec: C,
    block_size: Option<u64>,
    max_message_size: usize,
    position: u64,
    _message: PhantomData<fn() -> M>,
}

impl<R: Read, M, C: MessageCodec> std::fmt::Debug for MessageReader<R, M, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageReader")
            .field("codec", &self.codec)
            .field("block_size", &self.block_size)
            .field("position", &self.position)
            .finish()
    }
}

impl<M, C: MessageCodec> MessageReader<File, M, C> {
    /// Open the framed file at `path`.
    ///
    /// # Errors
    ///
    /// Returns the error from opening the file.
    pub fn open(path: impl AsRef<Path>, codec: C) -> Result<Self, ShuffleError> {
        let file = File::open(path.as_ref())?;
        Ok(Self::new(file, codec))
    }
}

impl<R: Read, M, C: MessageCodec> MessageReader<R, M, C> {
    /// Read frames from `inner` using `codec`. Without a block size, padding
    /// is skipped one zero byte at a time.
    pub fn new(inner: R, codec: C) -> Self {
        Self {
            inner: BufReader::new(inner),
            codec,
            block_size: None,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            position: 0,
            _message: PhantomData,
        }
    }

    /// Skip to the next multiple of `block_size` when padding is found.
    /// A zero block size disables skipping.
    #[must_use]
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = (block_size > 0).then_some(block_size as u64);
        self
    }

    /// Reject length prefixes above `limit` bytes.
    #[must_use]
    pub fn with_max_message_size(mut self, limit: usize) -> Self {
        self.max_message_size = limit;
        self
    }

    /// Bytes consumed from the underlying reader so far.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Unwrap the underlying reader. Buffered bytes are lost.
    pub fn into_inner(self) -> R {
        self.inner.into_inner()
    }

    /// Read the next non-zero length prefix, skipping padding.
    fn next_length(&mut self) -> Result<Option<u64>, ShuffleError> {
        loop {
            let Some((len, used)) = read_uvarint(&mut self.inner).map_err(length_error)? else {
                return Ok(None);
            };
            self.position += used as u64;
            if len != 0 {
                return Ok(Some(len));
            }

            if let Some(block) = self.block_size {
                let into_block = self.position % block;
                if into_block != 0 {
                    let skip = block - into_block;
                    let skipped = io::copy(&mut (&mut self.inner).take(skip), &mut io::sink())?;
                    self.position += skipped;
                    trace!(skipped, position = self.position, "skipped block padding");
                    if skipped < skip {
                        return Ok(None);
                    }
                }
            }
        }
    }
}

impl<R: Read, M: DeserializeOwned + Default, C: MessageCodec> MessageReader<R, M, C> {
    /// Return the next message, or `Ok(None)` at the clean end of the
    /// stream.
    ///
    /// # Errors
    ///
    /// Returns [`ShuffleError::UnexpectedEof`] if the stream ends inside a
    /// message body, [`ShuffleError::BadLength`] if it ends inside a length
    /// prefix, [`ShuffleError::MessageTooLarge`] for an oversized prefix,
    /// and decode or I/O errors otherwise.
    pub fn recv(&mut self) -> Result<Option<M>, ShuffleError> {
        let Some(len) = self.next_length()? else {
            return Ok(None);
        };
        if len == EMPTY_MESSAGE_LEN {
            return Ok(Some(M::default()));
        }
        if len > self.max_message_size as u64 {
            return Err(ShuffleError::MessageTooLarge {
                size: len,
                limit: self.max_message_size as u64,
            });
        }

        let expected = len as usize;
        let mut body = Vec::with_capacity(expected);
        let read = (&mut self.inner).take(len).read_to_end(&mut body)?;
        self.position += read as u64;
        if read < expected {
            return Err(ShuffleError::UnexpectedEof { expected, read });
        }
        self.codec.decode(&body).map(Some)
    }
}

impl<R: Read, M: DeserializeOwned + Default, C: MessageCodec> MessageSource<M>
    for MessageReader<R, M, C>
{
    fn recv(&mut self) -> Result<Option<M>, ShuffleError> {
        MessageReader::recv(self)
    }
}

fn length_error(err: io::Error) -> ShuffleError {
    match err.kind() {
        io::ErrorKind::UnexpectedEof | io::ErrorKind::InvalidData => ShuffleError::BadLength,
        _ => ShuffleError::from(err),
    }
}

// ─── In-Memory ──────────────────────────────────────────────────────────────

/// A message source over any iterator; never fails.
#[derive(Debug, Clone)]
pub struct IterSource<I> {
    iter: I,
}

impl<I: Iterator> IterSource<I> {
    /// Wrap `iter`.
    pub fn new(iter: impl IntoIterator<IntoIter = I>) -> Self {
        Self {
            iter: iter.into_iter(),
        }
    }
}

impl<I: Iterator> MessageSource<I::Item> for IterSource<I> {
    fn recv(&mut self) -> Result<Option<I::Item>, ShuffleError> {
        Ok(self.iter.next())
    }
}
