/*!
Incremental decoding across partial transport reads.

Socket and serial reads split the token stream at arbitrary points. The
[`StreamDecoder`] keeps the unfinished tail of the stream between reads and
only hands out complete tokens.
*/

use crate::decoder::{DecodeError, TokenDecoder};
use crate::error::{Result, XSigError};
use crate::protocol::SERIAL_SENTINEL;
use crate::token::Token;
use bytes::{Buf, BytesMut};
use std::collections::VecDeque;
use tracing::{debug, trace};

/// Default limit on buffered incomplete data
pub const DEFAULT_BUFFER_LIMIT: usize = 64 * 1024;

/// Stream decoder engine
///
/// Every push decodes as far as the data allows. The buffer only ever holds
/// the incomplete tail of the stream; finished tokens wait in a queue until
/// they are taken with [`StreamDecoder::next_token`].
pub struct StreamDecoder {
    buffer: BytesMut,
    pending: VecDeque<Token>,
    failure: Option<DecodeError>,
    /// The tail is a serial token still missing its sentinel
    awaiting_sentinel: bool,
    limit: usize,
    bytes_consumed: usize,
    tokens_decoded: u64,
}

impl StreamDecoder {
    /// Create a decoder with the default buffer limit
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_BUFFER_LIMIT)
    }

    /// Create a decoder holding at most `limit` bytes of incomplete data
    pub fn with_limit(limit: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            pending: VecDeque::new(),
            failure: None,
            awaiting_sentinel: false,
            limit,
            bytes_consumed: 0,
            tokens_decoded: 0,
        }
    }

    /// Append bytes received from the transport
    ///
    /// Fails with [`XSigError::BufferLimit`] when the incomplete tail left
    /// after decoding exceeds the limit. That tail is discarded; tokens
    /// completed before it stay available.
    ///
    /// Data arriving after a malformed token, and before that error has been
    /// returned by [`StreamDecoder::next_token`], is dropped.
    pub fn push(&mut self, chunk: &[u8]) -> Result<()> {
        if self.failure.is_some() {
            trace!(dropped = chunk.len(), "dropping data behind a malformed token");
            self.bytes_consumed += chunk.len();
            return Ok(());
        }

        self.buffer.extend_from_slice(chunk);
        // A serial payload only completes at its sentinel.
        if !self.awaiting_sentinel || chunk.contains(&SERIAL_SENTINEL) {
            self.decode_buffered();
        }
        trace!(chunk = chunk.len(), buffered = self.buffer.len(), "buffered stream data");

        let buffered = self.buffer.len();
        if buffered > self.limit {
            debug!(buffered, limit = self.limit, "stream buffer limit exceeded");
            self.discard_buffer();
            return Err(XSigError::BufferLimit {
                buffered,
                limit: self.limit,
            });
        }
        Ok(())
    }

    /// Move every complete buffered token to the pending queue
    fn decode_buffered(&mut self) {
        let base = self.bytes_consumed;
        let (stop, used) = {
            let mut decoder = TokenDecoder::new(&self.buffer);
            let mut stop = None;
            for item in decoder.by_ref() {
                match item {
                    Ok(token) => self.pending.push_back(token),
                    Err(err) => stop = Some(err),
                }
            }
            (stop, decoder.position())
        };

        self.buffer.advance(used);
        self.bytes_consumed += used;
        self.awaiting_sentinel = false;

        match stop {
            Some(DecodeError::UnterminatedSerial { .. }) => self.awaiting_sentinel = true,
            Some(err) if !err.is_incomplete() => {
                let err = err.rebased(base);
                debug!(offset = err.offset(), discarded = self.buffer.len(), "discarding malformed stream data");
                self.discard_buffer();
                self.failure = Some(err);
            }
            _ => {}
        }
    }

    fn discard_buffer(&mut self) {
        self.bytes_consumed += self.buffer.len();
        self.buffer.clear();
        self.awaiting_sentinel = false;
    }

    /// Next complete token, `None` if more data is needed
    ///
    /// A malformed token fails, after the tokens preceding it, with an offset
    /// relative to the start of the stream. The data behind it is discarded
    /// since the stream cannot be resynchronized.
    pub fn next_token(&mut self) -> Result<Option<Token>> {
        if let Some(token) = self.pending.pop_front() {
            self.tokens_decoded += 1;
            return Ok(Some(token));
        }
        match self.failure.take() {
            Some(err) => Err(err.into()),
            None => Ok(None),
        }
    }

    /// Every complete token currently buffered
    pub fn drain(&mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }
        Ok(tokens)
    }

    /// Signal the end of the stream
    ///
    /// Fails with an unreported malformed token, or if a partial token is
    /// still buffered. Complete tokens left undrained are not an error.
    pub fn finish(self) -> Result<()> {
        if let Some(err) = self.failure {
            return Err(err.into());
        }
        match TokenDecoder::new(&self.buffer).find_map(|item| item.err()) {
            Some(err) => Err(err.rebased(self.bytes_consumed).into()),
            None => Ok(()),
        }
    }

    /// Bytes of stream data turned into tokens (or discarded)
    pub fn bytes_consumed(&self) -> usize {
        self.bytes_consumed
    }

    /// Number of tokens handed out
    pub fn tokens_decoded(&self) -> u64 {
        self.tokens_decoded
    }

    /// Bytes waiting for the rest of their token
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self::new()
    }
}
