/*!
Token batching.

A [`TokenBatch`] collects tokens in the order they were produced, encodes them
into one contiguous buffer for a transport, and can drop superseded updates
before sending.
*/

use crate::decoder;
use crate::error::Result;
use crate::token::{SignalKind, Token, XSigToken};
use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;
use std::collections::HashSet;

/// Ordered collection of tokens
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TokenBatch {
    tokens: Vec<Token>,
}

impl TokenBatch {
    /// Create a new empty batch
    pub fn new() -> Self {
        Self { tokens: Vec::new() }
    }

    /// Create a batch with a specific capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            tokens: Vec::with_capacity(capacity),
        }
    }

    /// Decode a wire buffer into a batch, in buffer order
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let tokens = decoder::decode(bytes)?;
        Ok(Self { tokens })
    }

    /// Append a token
    pub fn push(&mut self, token: impl Into<Token>) {
        self.tokens.push(token.into());
    }

    /// Get the number of tokens
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Check if the batch is empty
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Remove every token
    pub fn clear(&mut self) {
        self.tokens.clear();
    }

    /// Tokens in batch order
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Token> {
        self.tokens.iter()
    }

    /// Take the tokens out of the batch
    pub fn into_tokens(self) -> Vec<Token> {
        self.tokens
    }

    /// Size of the encoded batch in bytes
    pub fn encoded_len(&self) -> usize {
        self.tokens.iter().map(XSigToken::encoded_len).sum()
    }

    /// Append the encoding of every token, in order, to `buf`
    pub fn encode_into<B: BufMut>(&self, buf: &mut B) {
        for token in &self.tokens {
            token.encode_into(buf);
        }
    }

    /// Encode the batch into one contiguous buffer
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Keep only the last token written to each signal
    ///
    /// Surviving tokens stay at the position of their last write, so the
    /// relative order of updates is unchanged.
    pub fn coalesce(&mut self) {
        let mut seen: HashSet<(SignalKind, u16)> = HashSet::with_capacity(self.tokens.len());
        let mut kept: Vec<Token> = Vec::with_capacity(self.tokens.len());

        for token in self.tokens.drain(..).rev() {
            if seen.insert(token.address()) {
                kept.push(token);
            }
        }

        kept.reverse();
        self.tokens = kept;
    }

    /// Coalesced copy of this batch
    pub fn coalesced(mut self) -> Self {
        self.coalesce();
        self
    }

    /// Shift every token by `delta`, failing on the first index out of range
    pub fn with_offset(self, delta: i32) -> Result<Self> {
        if delta == 0 {
            return Ok(self);
        }
        let tokens = self
            .tokens
            .into_iter()
            .map(|token| token.with_offset(delta))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { tokens })
    }
}

impl From<Vec<Token>> for TokenBatch {
    fn from(tokens: Vec<Token>) -> Self {
        Self { tokens }
    }
}

impl FromIterator<Token> for TokenBatch {
    fn from_iter<I: IntoIterator<Item = Token>>(iter: I) -> Self {
        Self {
            tokens: iter.into_iter().collect(),
        }
    }
}

impl Extend<Token> for TokenBatch {
    fn extend<I: IntoIterator<Item = Token>>(&mut self, iter: I) {
        self.tokens.extend(iter);
    }
}

impl IntoIterator for TokenBatch {
    type Item = Token;
    type IntoIter = std::vec::IntoIter<Token>;

    fn into_iter(self) -> Self::IntoIter {
        self.tokens.into_iter()
    }
}

impl<'a> IntoIterator for &'a TokenBatch {
    type Item = &'a Token;
    type IntoIter = std::slice::Iter<'a, Token>;

    fn into_iter(self) -> Self::IntoIter {
        self.tokens.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::XSigError;

    fn mixed_batch() -> TokenBatch {
        let mut batch = TokenBatch::new();
        batch.push(Token::digital(1, true).unwrap());
        batch.push(Token::analog(1, 0x1234).unwrap());
        batch.push(Token::serial(1, "AB").unwrap());
        batch.push(Token::digital(4095, false).unwrap());
        batch.push(Token::serial(1023, "").unwrap());
        batch.push(Token::analog(512, 65535).unwrap());
        batch
    }

    #[test]
    fn test_encode_concatenates_in_order() {
        let mut batch = TokenBatch::new();
        batch.push(Token::digital(1, true).unwrap());
        batch.push(Token::serial(1, "AB").unwrap());

        assert_eq!(batch.encoded_len(), 7);
        assert_eq!(&batch.encode()[..], &[0x80, 0x00, 0xC8, 0x00, 0x41, 0x42, 0xFF]);
    }

    #[test]
    fn test_batch_roundtrip() {
        let batch = mixed_batch();
        let bytes = batch.encode();

        assert_eq!(bytes.len(), batch.encoded_len());
        assert_eq!(TokenBatch::decode(&bytes).unwrap(), batch);
    }

    #[test]
    fn test_decode_error_is_reported() {
        let err = TokenBatch::decode(&[0x80, 0x00, 0x80]).unwrap_err();
        assert_eq!(err.decode_offset(), Some(2));
    }

    #[test]
    fn test_coalesce_keeps_last_write() {
        let mut batch: TokenBatch = vec![
            Token::digital(5, true).unwrap(),
            Token::analog(5, 1).unwrap(),
            Token::digital(5, false).unwrap(),
            Token::serial(5, "a").unwrap(),
            Token::analog(5, 2).unwrap(),
            Token::digital(6, true).unwrap(),
        ]
        .into();

        batch.coalesce();

        assert_eq!(
            batch.into_tokens(),
            vec![
                Token::digital(5, false).unwrap(),
                Token::serial(5, "a").unwrap(),
                Token::analog(5, 2).unwrap(),
                Token::digital(6, true).unwrap(),
            ]
        );
    }

    #[test]
    fn test_coalesce_without_duplicates_is_identity() {
        let batch = mixed_batch();
        assert_eq!(batch.clone().coalesced(), batch);
    }

    #[test]
    fn test_with_offset() {
        let batch: TokenBatch = [Token::digital(1, true).unwrap(), Token::serial(2, "x").unwrap()]
            .into_iter()
            .collect();

        let shifted = batch.clone().with_offset(10).unwrap();
        let indices: Vec<u16> = shifted.iter().map(XSigToken::index).collect();
        assert_eq!(indices, vec![11, 12]);

        let err = batch.with_offset(1022).unwrap_err();
        assert!(matches!(err, XSigError::IndexOutOfRange { kind: SignalKind::Serial, index: 1024, .. }));
    }

    #[test]
    fn test_empty_batch() {
        let batch = TokenBatch::new();
        assert!(batch.is_empty());
        assert!(batch.encode().is_empty());
        assert!(TokenBatch::decode(&[]).unwrap().is_empty());
    }
}
