/*!
Multi-producer token queue.

Producers on any thread hold a [`TokenSender`]; a single [`TokenReceiver`]
drains everything queued into a [`TokenBatch`] for transmission. The channel
keeps each producer's tokens in the order they were sent.
*/

use crate::collection::TokenBatch;
use crate::error::{Result, XSigError};
use crate::token::Token;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;
use tracing::{debug, trace};

/// Create a queue holding at most `capacity` pending tokens
pub fn token_queue(capacity: usize) -> (TokenSender, TokenReceiver) {
    let (tx, rx) = bounded::<Token>(capacity);
    (
        TokenSender { tx },
        TokenReceiver {
            rx,
            coalesce: false,
        },
    )
}

/// Producer handle, one clone per producer
#[derive(Clone)]
pub struct TokenSender {
    tx: Sender<Token>,
}

impl TokenSender {
    /// Queue a token, blocking while the queue is full
    pub fn send(&self, token: impl Into<Token>) -> Result<()> {
        self.tx.send(token.into()).map_err(|_| XSigError::QueueClosed)
    }

    /// Queue several tokens in order
    pub fn send_all<I: IntoIterator<Item = Token>>(&self, tokens: I) -> Result<()> {
        for token in tokens {
            self.send(token)?;
        }
        Ok(())
    }
}

/// Single writer draining the queue
pub struct TokenReceiver {
    rx: Receiver<Token>,
    coalesce: bool,
}

impl TokenReceiver {
    /// Apply last-write-wins coalescing to every drained batch
    pub fn coalescing(mut self, enabled: bool) -> Self {
        self.coalesce = enabled;
        self
    }

    /// Number of tokens waiting
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    /// Everything queued right now, possibly empty
    pub fn drain(&self) -> TokenBatch {
        let mut batch: TokenBatch = self.rx.try_iter().collect();
        self.finish_batch(&mut batch);
        batch
    }

    /// Wait up to `timeout` for a first token, then drain the rest
    ///
    /// Returns `Ok(None)` on timeout and [`XSigError::QueueClosed`] once every
    /// sender is gone and the queue is empty.
    pub fn recv_batch_timeout(&self, timeout: Duration) -> Result<Option<TokenBatch>> {
        let first = match self.rx.recv_timeout(timeout) {
            Ok(token) => token,
            Err(RecvTimeoutError::Timeout) => return Ok(None),
            Err(RecvTimeoutError::Disconnected) => return Err(XSigError::QueueClosed),
        };

        let mut batch = TokenBatch::with_capacity(self.rx.len() + 1);
        batch.push(first);
        batch.extend(self.rx.try_iter());
        self.finish_batch(&mut batch);
        Ok(Some(batch))
    }

    fn finish_batch(&self, batch: &mut TokenBatch) {
        let drained = batch.len();
        if self.coalesce {
            batch.coalesce();
        }
        if drained > 0 {
            debug!(drained, kept = batch.len(), "drained token queue");
        } else {
            trace!("token queue empty");
        }
    }
}
